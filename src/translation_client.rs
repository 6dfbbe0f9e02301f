use crate::errors::AppError;
use crate::models::ZoningInfo;
use serde_json::json;
use std::time::Duration;

/// Client for the LLM translation gateway used to translate zoning labels.
///
/// The gateway is optional; when unconfigured the pipeline keeps original
/// labels. Translation failures never abort an enrichment.
#[derive(Clone)]
pub struct TranslationClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

/// One translated label with the gateway's confidence, when reported.
#[derive(Debug, Clone)]
pub struct TranslationResult {
    pub translation: String,
    pub confidence: Option<f64>,
}

impl TranslationClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                AppError::ExternalApiError(format!("Failed to create translation client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    /// Translates `text` into `target_language`.
    pub async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<TranslationResult, AppError> {
        let url = format!("{}/v1/translate", self.base_url);
        tracing::info!("Translating zoning label to {}", target_language);

        let body = json!({
            "text": text,
            "target_language": target_language,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            AppError::ExternalApiError(format!("Translation request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::ExternalApiError(format!(
                "Translation gateway returned {}: {}",
                status, error_text
            )));
        }

        let data: serde_json::Value = response.json().await.map_err(|e| {
            AppError::ExternalApiError(format!("Failed to parse translation response: {}", e))
        })?;

        // Gateways disagree on the field name; accept the common ones.
        let translation = data
            .get("translation")
            .or_else(|| data.get("translated_text"))
            .or_else(|| data.get("text"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                AppError::ExternalApiError(
                    "Translation response missing 'translation' field".to_string(),
                )
            })?;

        let confidence = data.get("confidence").and_then(|v| v.as_f64());

        Ok(TranslationResult {
            translation,
            confidence,
        })
    }
}

/// Applies a translation to a zoning record in place.
///
/// Idempotent: an already-translated record is left untouched, so
/// `label_original` always traces back to the true untranslated label.
/// Failure degrades to the untranslated label and reports whether a
/// translation was applied.
pub async fn apply_zoning_translation(
    zoning: &mut ZoningInfo,
    client: &TranslationClient,
    target_language: &str,
) -> bool {
    if zoning.translated {
        tracing::debug!("Zoning label already translated, skipping");
        return false;
    }
    let Some(source_label) = zoning.label.clone() else {
        return false;
    };

    match client.translate(&source_label, target_language).await {
        Ok(result) => {
            zoning.label_original = Some(source_label);
            zoning.label = Some(result.translation);
            zoning.translated = true;
            zoning.translation_confidence = result.confidence;
            true
        }
        Err(e) => {
            tracing::warn!("⚠ Zoning label translation failed, keeping original: {}", e);
            false
        }
    }
}

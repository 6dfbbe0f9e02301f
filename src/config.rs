use serde::Deserialize;

/// Runtime configuration, loaded from the environment.
///
/// Every upstream base URL is overridable so integration tests can point the
/// connectors at mock servers; defaults are the public production services.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Nominatim reverse-geocoding endpoint (1 req/s usage policy).
    pub nominatim_base_url: String,
    /// Overpass API mirrors, tried in order on failure.
    pub overpass_endpoints: Vec<String>,
    /// Open-Elevation REST endpoint.
    pub elevation_base_url: String,
    /// CAOP administrative boundaries WFS (district/municipality/parish/NUTS3).
    pub pt_caop_base_url: String,
    /// Portugal cadastre, OGC API Features.
    pub pt_cadastre_base_url: String,
    /// BUPi property boundaries, continental Portugal.
    pub pt_bupi_base_url: String,
    /// BUPi property boundaries, Madeira.
    pub pt_bupi_madeira_base_url: String,
    /// DGT WMS used for COS/CLC/built-up/CRUS GetFeatureInfo queries.
    pub pt_wms_base_url: String,
    /// Spain Catastro INSPIRE cadastral parcel features.
    pub es_catastro_base_url: String,
    /// Spain regional zoning WFS.
    pub es_zoning_base_url: String,
    /// Germany Länder zoning WFS.
    pub de_zoning_base_url: String,
    /// Optional LLM translation gateway for zoning labels.
    pub translation_api_url: Option<String>,
    pub translation_api_key: Option<String>,
    /// Batch enrichment worker count.
    pub batch_concurrency: usize,
    /// Delay between plots per batch worker, milliseconds.
    pub batch_delay_ms: u64,
}

const DEFAULT_OVERPASS_ENDPOINTS: [&str; 3] = [
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "https://maps.mail.ru/osm/tools/overpass/api/interpreter",
];

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            database_url: std::env::var("DB_URL")
                .or_else(|_| std::env::var("DATABASE_URL"))
                .map_err(|_| {
                    anyhow::anyhow!("DB_URL or DATABASE_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DB_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DB_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            nominatim_base_url: url_var(
                "NOMINATIM_BASE_URL",
                "https://nominatim.openstreetmap.org",
            )?,
            overpass_endpoints: match std::env::var("OVERPASS_ENDPOINTS") {
                Ok(raw) => {
                    let endpoints: Vec<String> = raw
                        .split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect();
                    if endpoints.is_empty() {
                        anyhow::bail!("OVERPASS_ENDPOINTS must contain at least one URL");
                    }
                    for e in &endpoints {
                        if !e.starts_with("http://") && !e.starts_with("https://") {
                            anyhow::bail!("Overpass endpoint must start with http:// or https://");
                        }
                    }
                    endpoints
                }
                Err(_) => DEFAULT_OVERPASS_ENDPOINTS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            },
            elevation_base_url: url_var("ELEVATION_BASE_URL", "https://api.open-elevation.com")?,
            pt_caop_base_url: url_var(
                "PT_CAOP_BASE_URL",
                "https://geo2.dgterritorio.gov.pt/geoserver/wfs",
            )?,
            pt_cadastre_base_url: url_var(
                "PT_CADASTRE_BASE_URL",
                "https://ogcapi.dgterritorio.gov.pt",
            )?,
            pt_bupi_base_url: url_var(
                "PT_BUPI_BASE_URL",
                "https://bupi.gov.pt/arcgis/rest/services/BUPI/Continente/MapServer",
            )?,
            pt_bupi_madeira_base_url: url_var(
                "PT_BUPI_MADEIRA_BASE_URL",
                "https://bupi.gov.pt/arcgis/rest/services/BUPI/Madeira/MapServer",
            )?,
            pt_wms_base_url: url_var("PT_WMS_BASE_URL", "https://geo2.dgterritorio.gov.pt/wms")?,
            es_catastro_base_url: url_var(
                "ES_CATASTRO_BASE_URL",
                "https://ovc.catastro.meh.es/INSPIRE/wfsCP",
            )?,
            es_zoning_base_url: url_var(
                "ES_ZONING_BASE_URL",
                "https://idena.navarra.es/ogc/wfs",
            )?,
            de_zoning_base_url: url_var(
                "DE_ZONING_BASE_URL",
                "https://www.wfs.nrw.de/geobasis/wfs_nw_bplan",
            )?,
            translation_api_url: std::env::var("TRANSLATION_API_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            translation_api_key: std::env::var("TRANSLATION_API_KEY")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            batch_concurrency: std::env::var("BATCH_CONCURRENCY")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BATCH_CONCURRENCY must be a positive integer"))?,
            batch_delay_ms: std::env::var("BATCH_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("BATCH_DELAY_MS must be a non-negative integer"))?,
        };

        if config.batch_concurrency == 0 {
            anyhow::bail!("BATCH_CONCURRENCY must be at least 1");
        }

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            &config.database_url[..20.min(config.database_url.len())]
        );
        tracing::debug!("Nominatim: {}", config.nominatim_base_url);
        tracing::debug!("Overpass mirrors: {}", config.overpass_endpoints.len());
        tracing::debug!("PT cadastre: {}", config.pt_cadastre_base_url);
        tracing::debug!("ES catastro: {}", config.es_catastro_base_url);
        if config.translation_api_url.is_some() {
            tracing::info!("Zoning label translation gateway configured");
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

/// Read an URL environment variable with a default, enforcing an http(s) scheme.
fn url_var(name: &str, default: &str) -> anyhow::Result<String> {
    let url = std::env::var(name).unwrap_or_else(|_| default.to_string());
    if url.trim().is_empty() {
        anyhow::bail!("{} cannot be empty", name);
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    Ok(url)
}

use crate::clients::ClientRegistry;
use crate::config::Config;
use crate::connectors::wms::WmsService;
use crate::errors::AppError;
use serde_json::{json, Value};

/// Land-cover lookups against the DGT WMS: COS (national land cover), CLC
/// (CORINE) and built-up areas. All are GetFeatureInfo point queries.
pub struct LandUseService {
    wms: WmsService,
}

const COS_LAYER: &str = "COS2018v2";
const CLC_LAYER: &str = "CLC2018_PT";
const BUILT_UP_LAYER: &str = "AreasEdificadas2018";

/// Property keys that carry the class label, in provider preference order.
const CLASS_KEYS: [&str; 4] = ["COS2018_Leg", "label", "classe", "designacao"];
const CODE_KEYS: [&str; 3] = ["COS2018_n4", "code", "codigo"];

impl LandUseService {
    pub fn new(config: &Config, registry: &ClientRegistry) -> Result<Self, AppError> {
        Ok(Self {
            wms: WmsService::new(config, registry)?,
        })
    }

    pub async fn cos(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.classified(COS_LAYER, latitude, longitude).await
    }

    pub async fn clc(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.classified(CLC_LAYER, latitude, longitude).await
    }

    pub async fn built_up(&self, latitude: f64, longitude: f64) -> Result<Option<Value>, AppError> {
        self.classified(BUILT_UP_LAYER, latitude, longitude).await
    }

    async fn classified(
        &self,
        layer: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<Option<Value>, AppError> {
        let Some(properties) = self.wms.get_feature_info(layer, latitude, longitude).await? else {
            return Ok(None);
        };

        let class_label = first_string(&properties, &CLASS_KEYS);
        let class_code = first_string(&properties, &CODE_KEYS);

        // A feature with neither label nor code is not a classification hit.
        if class_label.is_none() && class_code.is_none() {
            return Ok(None);
        }

        Ok(Some(json!({
            "layer": layer,
            "class": class_label,
            "code": class_code,
        })))
    }
}

pub(crate) fn first_string(properties: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(value) = properties.get(*key).and_then(|v| v.as_str()) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

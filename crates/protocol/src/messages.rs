use serde::{Deserialize, Serialize};

pub const GENERATE_MAP_PATH: &str = "/api/generate-map";
pub const RESET_MAPS_PATH: &str = "/api/reset-maps";

/// URL prefix under which placed artifacts are served.
pub const MAPS_URL_PREFIX: &str = "/maps";

/// Store-relative reference for an artifact file name, e.g. `/maps/map123.html`.
pub fn artifact_reference(file_name: &str) -> String {
    format!("{MAPS_URL_PREFIX}/{file_name}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMapResponse {
    pub success: bool,
    /// Directly usable as an iframe `src`.
    pub html_file_path: String,
}

impl GenerateMapResponse {
    pub fn placed(html_file_path: impl Into<String>) -> Self {
        Self {
            success: true,
            html_file_path: html_file_path.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResetMapsResponse {
    pub message: String,
    #[serde(default)]
    pub removed: usize,
}

/// Body of every non-2xx API response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message, safe to show to the user.
    pub error: String,
    /// Stable machine-readable error code, e.g. `MALFORMED_OUTPUT`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

//! Domain routing configuration

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Domain assigned to untagged documents when detection finds nothing
    pub default_domain: String,
    /// Run keyword detection on documents ingested without a domain tag
    pub detect_untagged: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_domain: "general".to_string(),
            detect_untagged: true,
        }
    }
}

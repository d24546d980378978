use serde::{Deserialize, Serialize};

/// Manifest describing the application, used by the runtime to authorize API access.
///
/// Use `com.example.<something>` as `app_id` during development so no signed
/// certificate is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppManifest {
    pub app_id: String,
    pub display_name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl Default for AppManifest {
    fn default() -> Self {
        Self {
            app_id: "com.example.fish-observer".to_string(),
            display_name: "Fish Observer".to_string(),
            version: "0.0.1".to_string(),
            signature: None,
        }
    }
}

/// Where the runtime is reached. Unset fields use the runtime's defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionOpts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actyx_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actyx_port: Option<u16>,
}

/// Advanced session options, passed through to the runtime untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PondOptions {
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Static information about a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PondInfo {
    pub node_id: String,
}

/// Connectivity of the local node to its swarm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ConnectivityStatus {
    FullyConnected,
    PartiallyConnected {
        #[serde(rename = "swarmConnectivityLevel")]
        swarm_connectivity_level: u8,
    },
    NotConnected,
}

/// Internal activity of the pond.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PondState {
    pub hydrating: bool,
    pub commands_in_flight: u32,
}

impl PondState {
    pub fn is_busy(&self) -> bool {
        self.hydrating || self.commands_in_flight > 0
    }
}

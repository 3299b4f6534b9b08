use rollcall_core::SchoolSettings;
use serde::{Deserialize, Serialize};

fn default_beacon_port() -> u16 {
    rollcall_config::DEFAULT_BEACON_PORT
}

fn default_link_port() -> u16 {
    rollcall_config::DEFAULT_LINK_PORT
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    /// Start the background receiver as soon as the process comes up.
    #[serde(default)]
    pub auto_start: bool,
    /// Identifier embedded in pairing tokens this device issues.
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub school: SchoolSettings,
    #[serde(default = "default_beacon_port")]
    pub beacon_port: u16,
    #[serde(default = "default_link_port")]
    pub link_port: u16,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auto_start: false,
            device_id: String::new(),
            school: SchoolSettings::default(),
            beacon_port: default_beacon_port(),
            link_port: default_link_port(),
        }
    }
}

impl AppSettings {
    /// Assigns a random device id if none is set. Returns true when it did.
    pub fn ensure_device_id(&mut self) -> bool {
        if !self.device_id.trim().is_empty() {
            return false;
        }
        self.device_id = uuid::Uuid::new_v4().to_string();
        true
    }
}

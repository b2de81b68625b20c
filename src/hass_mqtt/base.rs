use crate::service::device::Device as ServiceDevice;
use crate::service::hass::topic_safe_id;
use crate::version_info::remi_version;
use serde::Serialize;

const ORIGIN: &str = "remi2mqtt";
const URL: &str = "https://remi2.urbanhello.com";
pub const MANUFACTURER: &str = "UrbanHello";
pub const MODEL: &str = "Rémi Clock";

#[derive(Serialize, Clone, Debug, Default)]
pub struct EntityConfig {
    pub availability_topic: String,
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub origin: Origin,
    pub device: Device,
    pub unique_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Origin {
    pub name: &'static str,
    pub sw_version: &'static str,
    pub url: &'static str,
}

impl Default for Origin {
    fn default() -> Self {
        Self {
            name: ORIGIN,
            sw_version: remi_version(),
            url: URL,
        }
    }
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct Device {
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sw_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via_device: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<String>,
}

impl Device {
    pub fn for_device(device: &ServiceDevice) -> Self {
        Self {
            name: device.display_name(),
            manufacturer: MANUFACTURER.to_string(),
            model: MODEL.to_string(),
            sw_version: device.firmware_version().map(|v| v.to_string()),
            via_device: Some(ORIGIN.to_string()),
            identifiers: vec![format!("remi2mqtt-{}", topic_safe_id(device))],
        }
    }

    pub fn this_service() -> Self {
        Self {
            name: "Rémi to MQTT".to_string(),
            manufacturer: ORIGIN.to_string(),
            model: ORIGIN.to_string(),
            sw_version: Some(remi_version().to_string()),
            via_device: None,
            identifiers: vec![ORIGIN.to_string()],
        }
    }
}

use crate::remi_api::{RemiApiClient, RemiInfo};
use crate::temperature::TemperatureValue;
use chrono::{DateTime, Utc};

const UNKNOWN_DEVICE_NAME: &str = "Unknown Device";

#[derive(Default, Clone, Debug)]
pub struct Device {
    pub id: String,

    /// The most recently polled state of the clock
    pub info: Option<RemiInfo>,
    pub last_polled: Option<DateTime<Utc>>,
}

impl std::fmt::Display for Device {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(fmt, "{} ({})", self.name(), self.id)
    }
}

impl Device {
    /// Create a new device given just its id.
    /// Its state will need to be polled by the caller.
    pub fn new<I: Into<String>>(id: I) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// The name assigned in the Rémi app, or a placeholder if it
    /// has none or hasn't been polled yet
    pub fn name(&self) -> String {
        self.info
            .as_ref()
            .and_then(|info| info.name.as_deref())
            .unwrap_or(UNKNOWN_DEVICE_NAME)
            .to_string()
    }

    /// The name used when presenting the device to Home Assistant
    pub fn display_name(&self) -> String {
        format!("Rémi {}", self.name())
    }

    pub fn set_info(&mut self, info: RemiInfo) {
        self.info.replace(info);
        self.last_polled.replace(Utc::now());
    }

    pub fn temperature(&self) -> Option<TemperatureValue> {
        self.info
            .as_ref()
            .map(|info| TemperatureValue::with_tenths(info.temperature))
    }

    pub fn firmware_version(&self) -> Option<&str> {
        self.info.as_ref()?.firmware_version.as_deref()
    }
}

/// Poll each device once, keeping only those that answered.
/// A device that fails is logged and left out; it does not
/// prevent the others from being set up.
pub async fn collect_devices(client: &RemiApiClient) -> Vec<Device> {
    let mut devices = vec![];
    for id in client.device_ids() {
        match client.get_device_info(&id).await {
            Ok(info) => {
                let mut device = Device::new(&id);
                device.set_info(info);
                devices.push(device);
            }
            Err(err) => {
                log::error!("Failed to get info for Remi {id}: {err:#}");
            }
        }
    }
    devices
}

use crate::hass_mqtt::base::{Device, EntityConfig, Origin};
use crate::hass_mqtt::instance::{publish_entity_config, EntityInstance};
use crate::service::device::Device as ServiceDevice;
use crate::service::hass::{availability_topic, topic_safe_id, topic_safe_string, HassClient};
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::StateHandle;
use crate::temperature::{DEVICE_CLASS_TEMPERATURE, UNIT_CELSIUS};
use async_trait::async_trait;
use serde::Serialize;

#[derive(Serialize, Clone, Debug)]
pub struct SensorConfig {
    #[serde(flatten)]
    pub base: EntityConfig,

    pub state_topic: String,
    pub unit_of_measurement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_display_precision: Option<u8>,
}

impl SensorConfig {
    pub async fn publish(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        publish_entity_config("sensor", state, client, &self.base, self).await
    }

    pub async fn notify_state(&self, client: &HassClient, value: &str) -> anyhow::Result<()> {
        client.publish(&self.state_topic, value).await
    }
}

#[derive(Clone)]
pub struct GlobalFixedDiagnostic {
    sensor: SensorConfig,
    value: String,
}

#[async_trait]
impl EntityInstance for GlobalFixedDiagnostic {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        self.sensor.publish(state, client).await
    }

    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        self.sensor.notify_state(client, &self.value).await
    }
}

impl GlobalFixedDiagnostic {
    pub fn new<NAME: Into<String>, VALUE: Into<String>>(name: NAME, value: VALUE) -> Self {
        let name = name.into();
        let unique_id = format!("global-{}", topic_safe_string(&name));

        Self {
            sensor: SensorConfig {
                base: EntityConfig {
                    availability_topic: availability_topic(),
                    name: Some(name),
                    entity_category: Some("diagnostic".to_string()),
                    origin: Origin::default(),
                    device: Device::this_service(),
                    unique_id: unique_id.clone(),
                    device_class: None,
                    icon: None,
                },
                state_topic: format!("remi2mqtt/sensor/{unique_id}/state"),
                unit_of_measurement: None,
                state_class: None,
                suggested_display_precision: None,
            },
            value: value.into(),
        }
    }
}

/// The readings each clock exposes as a sensor
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceReading {
    Temperature,
    FirmwareVersion,
    FirmwareUpdate,
    Face,
}

impl DeviceReading {
    pub const ALL: [Self; 4] = [
        Self::Temperature,
        Self::FirmwareVersion,
        Self::FirmwareUpdate,
        Self::Face,
    ];

    fn key(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::FirmwareVersion => "firmware-version",
            Self::FirmwareUpdate => "firmware-update",
            Self::Face => "face",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "Temperature",
            Self::FirmwareVersion => "Firmware Version",
            Self::FirmwareUpdate => "Firmware Update",
            Self::Face => "Current Face",
        }
    }

    fn icon(&self) -> Option<&'static str> {
        match self {
            Self::Temperature => None,
            Self::FirmwareVersion => Some("mdi:chip"),
            Self::FirmwareUpdate => Some("mdi:update"),
            Self::Face => Some("mdi:emoticon-outline"),
        }
    }

    /// Render the current value of this reading from the device
    /// snapshot, if it has been polled
    pub fn value(&self, device: &ServiceDevice) -> Option<String> {
        let info = device.info.as_ref()?;
        match self {
            Self::Temperature => device.temperature().map(|t| t.state_value()),
            Self::FirmwareVersion => info.firmware_version.clone(),
            Self::FirmwareUpdate => Some(
                if info.firmware_need_update {
                    "Update available"
                } else {
                    "Up to date"
                }
                .to_string(),
            ),
            Self::Face => info.face_name.clone().or_else(|| info.face_id.clone()),
        }
    }
}

pub struct DeviceSensor {
    sensor: SensorConfig,
    device_id: String,
    state: StateHandle,
    reading: DeviceReading,
}

impl DeviceSensor {
    pub fn new(device: &ServiceDevice, state: &StateHandle, reading: DeviceReading) -> Self {
        let unique_id = format!(
            "remi2mqtt-{id}-{key}",
            id = topic_safe_id(device),
            key = reading.key()
        );

        let (device_class, unit_of_measurement, state_class, precision, entity_category) =
            match reading {
                DeviceReading::Temperature => (
                    Some(DEVICE_CLASS_TEMPERATURE),
                    Some(UNIT_CELSIUS.to_string()),
                    Some("measurement"),
                    Some(1),
                    None,
                ),
                _ => (None, None, None, None, Some("diagnostic".to_string())),
            };

        Self {
            sensor: SensorConfig {
                base: EntityConfig {
                    availability_topic: availability_topic(),
                    name: Some(reading.label().to_string()),
                    entity_category,
                    origin: Origin::default(),
                    device: Device::for_device(device),
                    unique_id: unique_id.clone(),
                    device_class,
                    icon: reading.icon().map(|s| s.to_string()),
                },
                state_topic: format!("remi2mqtt/sensor/{unique_id}/state"),
                unit_of_measurement,
                state_class,
                suggested_display_precision: precision,
            },
            device_id: device.id.to_string(),
            state: state.clone(),
            reading,
        }
    }
}

#[async_trait]
impl EntityInstance for DeviceSensor {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        self.sensor.publish(state, client).await
    }

    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        let Some(device) = self.state.device_by_id(&self.device_id).await else {
            anyhow::bail!("device {} not found", self.device_id);
        };

        match self.reading.value(&device) {
            Some(value) => self.sensor.notify_state(client, &value).await,
            None => {
                log::trace!(
                    "DeviceSensor::notify_state: no {:?} for {device}",
                    self.reading
                );
                Ok(())
            }
        }
    }
}

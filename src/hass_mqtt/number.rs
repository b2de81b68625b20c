use crate::hass_mqtt::base::{Device, EntityConfig, Origin};
use crate::hass_mqtt::instance::{publish_entity_config, EntityInstance};
use crate::service::device::Device as ServiceDevice;
use crate::service::hass::{availability_topic, topic_safe_id, HassClient};
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::StateHandle;
use async_trait::async_trait;
use serde::Serialize;

/// <https://www.home-assistant.io/integrations/number.mqtt/>
#[derive(Serialize, Clone, Debug)]
pub struct NumberConfig {
    #[serde(flatten)]
    pub base: EntityConfig,

    pub command_topic: String,
    pub state_topic: String,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
}

/// A writable level on the clock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceLevel {
    Luminosity,
    Volume,
}

impl DeviceLevel {
    pub fn property(&self) -> &'static str {
        match self {
            Self::Luminosity => "luminosity",
            Self::Volume => "volume",
        }
    }

    pub fn from_property(property: &str) -> Option<Self> {
        match property {
            "luminosity" => Some(Self::Luminosity),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Luminosity => "Luminosity",
            Self::Volume => "Volume",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Self::Luminosity => "mdi:brightness-6",
            Self::Volume => "mdi:volume-high",
        }
    }

    pub fn value(&self, device: &ServiceDevice) -> Option<i64> {
        let info = device.info.as_ref()?;
        Some(match self {
            Self::Luminosity => info.luminosity,
            Self::Volume => info.volume,
        })
    }
}

pub fn number_command_topic(device: &ServiceDevice, level: DeviceLevel) -> String {
    format!(
        "remi2mqtt/number/{id}/command/{property}",
        id = topic_safe_id(device),
        property = level.property()
    )
}

pub fn number_state_topic(device: &ServiceDevice, level: DeviceLevel) -> String {
    format!(
        "remi2mqtt/number/{id}/{property}/state",
        id = topic_safe_id(device),
        property = level.property()
    )
}

pub struct DeviceNumber {
    number: NumberConfig,
    device_id: String,
    state: StateHandle,
    level: DeviceLevel,
}

impl DeviceNumber {
    pub fn new(device: &ServiceDevice, state: &StateHandle, level: DeviceLevel) -> Self {
        let unique_id = format!(
            "remi2mqtt-{id}-{property}",
            id = topic_safe_id(device),
            property = level.property()
        );

        Self {
            number: NumberConfig {
                base: EntityConfig {
                    availability_topic: availability_topic(),
                    name: Some(level.label().to_string()),
                    entity_category: None,
                    origin: Origin::default(),
                    device: Device::for_device(device),
                    unique_id,
                    device_class: None,
                    icon: Some(level.icon().to_string()),
                },
                command_topic: number_command_topic(device, level),
                state_topic: number_state_topic(device, level),
                min: 0.,
                max: 100.,
                step: 1.,
                unit_of_measurement: Some("%"),
            },
            device_id: device.id.to_string(),
            state: state.clone(),
            level,
        }
    }
}

#[async_trait]
impl EntityInstance for DeviceNumber {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        publish_entity_config("number", state, client, &self.number.base, &self.number).await
    }

    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        let Some(device) = self.state.device_by_id(&self.device_id).await else {
            anyhow::bail!("device {} not found", self.device_id);
        };
        if let Some(value) = self.level.value(&device) {
            client
                .publish(&self.number.state_topic, value.to_string())
                .await?;
        }
        Ok(())
    }
}

use crate::hass_mqtt::base::{Device, EntityConfig, Origin};
use crate::hass_mqtt::instance::{publish_entity_config, EntityInstance};
use crate::service::device::Device as ServiceDevice;
use crate::service::hass::{availability_topic, topic_safe_id, HassClient};
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::StateHandle;
use async_trait::async_trait;
use serde::Serialize;

/// The night light. The clock has no light switch as such: it is
/// "on" while showing the sleepy face and "off" on the awake face.
/// <https://www.home-assistant.io/integrations/light.mqtt/#default-schema>
#[derive(Serialize, Clone, Debug)]
pub struct LightConfig {
    #[serde(flatten)]
    pub base: EntityConfig,

    pub command_topic: String,
    pub state_topic: String,
    pub payload_on: String,
    pub payload_off: String,
    pub optimistic: bool,
}

pub fn light_command_topic(device: &ServiceDevice) -> String {
    format!("remi2mqtt/light/{id}/command", id = topic_safe_id(device))
}

pub fn light_state_topic(device: &ServiceDevice) -> String {
    format!("remi2mqtt/light/{id}/state", id = topic_safe_id(device))
}

pub struct DeviceLight {
    light: LightConfig,
    device_id: String,
    state: StateHandle,
}

impl DeviceLight {
    pub fn for_device(device: &ServiceDevice, state: &StateHandle) -> Self {
        let unique_id = format!("remi2mqtt-{id}-light", id = topic_safe_id(device));

        Self {
            light: LightConfig {
                base: EntityConfig {
                    availability_topic: availability_topic(),
                    name: Some("Night Light".to_string()),
                    device_class: None,
                    origin: Origin::default(),
                    device: Device::for_device(device),
                    unique_id,
                    entity_category: None,
                    icon: Some("mdi:weather-night".to_string()),
                },
                command_topic: light_command_topic(device),
                state_topic: light_state_topic(device),
                payload_on: "ON".to_string(),
                payload_off: "OFF".to_string(),
                optimistic: false,
            },
            device_id: device.id.to_string(),
            state: state.clone(),
        }
    }
}

#[async_trait]
impl EntityInstance for DeviceLight {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        publish_entity_config("light", state, client, &self.light.base, &self.light).await
    }

    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        let Some(device) = self.state.device_by_id(&self.device_id).await else {
            anyhow::bail!("device {} not found", self.device_id);
        };

        match device.info.as_ref().and_then(|info| info.is_light_on()) {
            Some(on) => {
                client
                    .publish(&self.light.state_topic, if on { "ON" } else { "OFF" })
                    .await
            }
            None => {
                // An unknown face; leave the state alone rather
                // than guessing
                log::trace!("DeviceLight::notify_state: face unknown for {device}");
                Ok(())
            }
        }
    }
}

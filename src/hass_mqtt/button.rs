use crate::hass_mqtt::base::{Device, EntityConfig, Origin};
use crate::hass_mqtt::instance::{publish_entity_config, EntityInstance};
use crate::service::hass::{availability_topic, topic_safe_string, HassClient};
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::StateHandle;
use async_trait::async_trait;
use serde::Serialize;

#[derive(Serialize, Clone, Debug)]
pub struct ButtonConfig {
    #[serde(flatten)]
    pub base: EntityConfig,

    pub command_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_press: Option<String>,
}

impl ButtonConfig {
    /// A button attached to the bridge itself rather than to a clock
    pub fn new<NAME: Into<String>, TOPIC: Into<String>>(name: NAME, topic: TOPIC) -> Self {
        let name = name.into();
        let unique_id = format!("global-{}", topic_safe_string(&name));
        Self {
            base: EntityConfig {
                availability_topic: availability_topic(),
                name: Some(name),
                entity_category: None,
                origin: Origin::default(),
                device: Device::this_service(),
                unique_id,
                device_class: None,
                icon: None,
            },
            command_topic: topic.into(),
            payload_press: None,
        }
    }

    pub fn with_icon<ICON: Into<String>>(mut self, icon: ICON) -> Self {
        self.base.icon.replace(icon.into());
        self
    }
}

#[async_trait]
impl EntityInstance for ButtonConfig {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        publish_entity_config("button", state, client, &self.base, self).await
    }

    async fn notify_state(&self, _client: &HassClient) -> anyhow::Result<()> {
        // Buttons have no state
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn refresh_button() {
        let button = ButtonConfig::new("Refresh", "remi2mqtt/refresh").with_icon("mdi:refresh");
        let config = serde_json::to_value(&button).unwrap();
        assert_eq!(config["unique_id"], "global-refresh");
        assert_eq!(config["command_topic"], "remi2mqtt/refresh");
        assert_eq!(config["icon"], "mdi:refresh");
        assert_eq!(config["availability_topic"], "remi2mqtt/availability");
        assert!(config.get("payload_press").is_none());
    }
}

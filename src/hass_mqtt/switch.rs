use crate::hass_mqtt::base::{Device, EntityConfig, Origin};
use crate::hass_mqtt::instance::{publish_entity_config, EntityInstance};
use crate::remi_api::alarm::Alarm;
use crate::service::device::Device as ServiceDevice;
use crate::service::hass::{availability_topic, topic_safe_id, topic_safe_object_id, HassClient};
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::{StateHandle, PLACEHOLDER_SETTING_ID};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};

/// <https://www.home-assistant.io/integrations/switch.mqtt/>
#[derive(Serialize, Clone, Debug)]
pub struct SwitchConfig {
    #[serde(flatten)]
    pub base: EntityConfig,
    pub command_topic: String,
    pub state_topic: String,
    pub json_attributes_topic: String,
}

pub fn switch_command_topic(device: &ServiceDevice, setting_id: &str) -> String {
    format!(
        "remi2mqtt/switch/{id}/command/{setting_id}",
        id = topic_safe_id(device)
    )
}

pub fn switch_state_topic(device: &ServiceDevice, setting_id: &str) -> String {
    format!(
        "remi2mqtt/switch/{id}/{setting_id}/state",
        id = topic_safe_id(device)
    )
}

pub fn switch_attributes_topic(device: &ServiceDevice, setting_id: &str) -> String {
    format!(
        "remi2mqtt/switch/{id}/{setting_id}/attributes",
        id = topic_safe_id(device)
    )
}

/// The extra attributes shown alongside an alarm switch
pub fn alarm_attributes(setting_id: &str, alarm: Option<&Alarm>) -> JsonValue {
    match alarm {
        None => json!({
            "time": "Unknown",
            "days": [],
            "setting_id": setting_id,
        }),
        Some(alarm) if alarm.is_simulated() => json!({
            "time": alarm.time,
            "days": alarm.days,
            "setting_id": alarm.id,
            "simulated": true,
        }),
        Some(alarm) => json!({
            "time": alarm.time,
            "days": alarm.days,
            "setting_id": alarm.id,
            "recurrence": alarm.recurrence.map(|day| day as u8),
            "event_time": alarm.event_time,
            "cmd": alarm.cmd,
            "brightness": alarm.brightness,
            "volume": alarm.volume,
            "length_min": alarm.length_min,
            "lightnight": alarm.lightnight,
        }),
    }
}

fn alarm_display_name(alarm: &Alarm) -> String {
    if alarm.is_simulated() {
        format!("{} (Simulated)", alarm.name)
    } else {
        format!("{} (Event)", alarm.name)
    }
}

fn alarm_icon(enabled: bool) -> &'static str {
    if enabled {
        "mdi:alarm"
    } else {
        "mdi:alarm-off"
    }
}

/// One switch per alarm. A device without any alarms gets a single
/// placeholder switch that reports off and refuses commands.
pub struct AlarmSwitch {
    switch: SwitchConfig,
    device_id: String,
    setting_id: String,
    state: StateHandle,
}

impl AlarmSwitch {
    pub fn new(device: &ServiceDevice, state: &StateHandle, alarm: &Alarm) -> Self {
        Self::build(
            device,
            state,
            &alarm.id,
            alarm_display_name(alarm),
            alarm.enabled,
        )
    }

    pub fn placeholder(device: &ServiceDevice, state: &StateHandle) -> Self {
        Self::build(
            device,
            state,
            PLACEHOLDER_SETTING_ID,
            "Bedtime Setting".to_string(),
            false,
        )
    }

    fn build(
        device: &ServiceDevice,
        state: &StateHandle,
        setting_id: &str,
        name: String,
        enabled: bool,
    ) -> Self {
        let unique_id = format!(
            "remi2mqtt-{id}-{setting}",
            id = topic_safe_id(device),
            setting = topic_safe_object_id(setting_id)
        );

        Self {
            switch: SwitchConfig {
                base: EntityConfig {
                    availability_topic: availability_topic(),
                    name: Some(name),
                    device_class: None,
                    origin: Origin::default(),
                    device: Device::for_device(device),
                    unique_id,
                    entity_category: None,
                    icon: Some(alarm_icon(enabled).to_string()),
                },
                command_topic: switch_command_topic(device, setting_id),
                state_topic: switch_state_topic(device, setting_id),
                json_attributes_topic: switch_attributes_topic(device, setting_id),
            },
            device_id: device.id.to_string(),
            setting_id: setting_id.to_string(),
            state: state.clone(),
        }
    }
}

#[async_trait]
impl EntityInstance for AlarmSwitch {
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity> {
        publish_entity_config("switch", state, client, &self.switch.base, &self.switch).await
    }

    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        let alarm = self
            .state
            .bedtime_settings_for_device(&self.device_id)
            .await
            .into_iter()
            .find(|alarm| alarm.id == self.setting_id);

        if alarm.is_none() && self.setting_id != PLACEHOLDER_SETTING_ID {
            log::trace!(
                "AlarmSwitch::notify_state: {} is no longer known for {}",
                self.setting_id,
                self.device_id
            );
            return Ok(());
        }

        let enabled = alarm.as_ref().map(|a| a.enabled).unwrap_or(false);
        client
            .publish(&self.switch.state_topic, if enabled { "ON" } else { "OFF" })
            .await?;
        client
            .publish_obj(
                &self.switch.json_attributes_topic,
                alarm_attributes(&self.setting_id, alarm.as_ref()),
            )
            .await
    }
}

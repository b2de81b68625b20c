use crate::hass_mqtt::button::ButtonConfig;
use crate::hass_mqtt::instance::EntityList;
use crate::hass_mqtt::light::DeviceLight;
use crate::hass_mqtt::number::{DeviceLevel, DeviceNumber};
use crate::hass_mqtt::sensor::{DeviceReading, DeviceSensor, GlobalFixedDiagnostic};
use crate::hass_mqtt::switch::AlarmSwitch;
use crate::service::device::Device as ServiceDevice;
use crate::service::hass::refresh_topic;
use crate::service::state::StateHandle;
use crate::version_info::remi_version;

pub async fn enumerate_all_entites(state: &StateHandle) -> anyhow::Result<EntityList> {
    let mut entities = EntityList::new();

    enumerate_global_entities(state, &mut entities).await?;

    for d in state.devices().await {
        enumerate_entities_for_device(&d, state, &mut entities).await?;
    }

    Ok(entities)
}

async fn enumerate_global_entities(
    _state: &StateHandle,
    entities: &mut EntityList,
) -> anyhow::Result<()> {
    entities.add(GlobalFixedDiagnostic::new("Version", remi_version()));
    entities.add(ButtonConfig::new("Refresh", refresh_topic()).with_icon("mdi:refresh"));
    Ok(())
}

pub async fn enumerate_entities_for_device(
    d: &ServiceDevice,
    state: &StateHandle,
    entities: &mut EntityList,
) -> anyhow::Result<()> {
    for reading in DeviceReading::ALL {
        entities.add(DeviceSensor::new(d, state, reading));
    }

    entities.add(DeviceNumber::new(d, state, DeviceLevel::Luminosity));
    entities.add(DeviceNumber::new(d, state, DeviceLevel::Volume));
    entities.add(DeviceLight::for_device(d, state));

    let alarms = state.bedtime_settings_for_device(&d.id).await;
    log::debug!("Found {} bedtime settings for device {d}", alarms.len());
    if alarms.is_empty() {
        log::warn!("No bedtime settings found for device {d}, creating placeholder");
        entities.add(AlarmSwitch::placeholder(d, state));
    }
    for alarm in &alarms {
        entities.add(AlarmSwitch::new(d, state, alarm));
    }

    Ok(())
}

use crate::remi_api::alarm::{Alarm, ToggleAck};
use crate::remi_api::RemiApiClient;
use crate::service::device::Device;
use crate::service::hass::{topic_safe_id, HassClient};
use anyhow::Context;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tokio::time::{sleep, Duration};

/// The setting id of the switch offered for a device that has no
/// alarms at all. It cannot be toggled.
pub const PLACEHOLDER_SETTING_ID: &str = "placeholder";

#[derive(Default)]
pub struct State {
    devices_by_id: Mutex<HashMap<String, Device>>,
    bedtime_settings: Mutex<HashMap<String, Vec<Alarm>>>,
    remi_client: Mutex<Option<RemiApiClient>>,
    hass_client: Mutex<Option<HassClient>>,
    hass_discovery_prefix: Mutex<String>,
    poll_after_control_delay: Mutex<Option<Duration>>,
}

pub type StateHandle = Arc<State>;

/// (device id, setting id) of every cached alarm
fn alarm_ids(settings: &HashMap<String, Vec<Alarm>>) -> BTreeSet<(&str, &str)> {
    settings
        .iter()
        .flat_map(|(device_id, alarms)| {
            alarms
                .iter()
                .map(move |alarm| (device_id.as_str(), alarm.id.as_str()))
        })
        .collect()
}

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_hass_disco_prefix(&self, prefix: String) {
        *self.hass_discovery_prefix.lock().await = prefix;
    }

    pub async fn get_hass_disco_prefix(&self) -> String {
        self.hass_discovery_prefix.lock().await.to_string()
    }

    /// Returns a mutable version of the specified device, creating
    /// an entry for it if necessary.
    pub async fn device_mut(&self, id: &str) -> MappedMutexGuard<'_, Device> {
        let devices = self.devices_by_id.lock().await;
        MutexGuard::map(devices, |devices| {
            devices
                .entry(id.to_string())
                .or_insert_with(|| Device::new(id))
        })
    }

    pub async fn add_device(&self, device: Device) {
        self.devices_by_id
            .lock()
            .await
            .insert(device.id.clone(), device);
    }

    pub async fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices_by_id.lock().await.values().cloned().collect();
        devices.sort_by_key(|d| (d.name(), d.id.clone()));
        devices
    }

    /// Returns an immutable copy of the specified Device
    pub async fn device_by_id(&self, id: &str) -> Option<Device> {
        let devices = self.devices_by_id.lock().await;
        devices.get(id).cloned()
    }

    /// Resolve a device using its id or name, ignoring case.
    pub async fn resolve_device(&self, label: &str) -> Option<Device> {
        let devices = self.devices_by_id.lock().await;

        if let Some(device) = devices.get(label) {
            return Some(device.clone());
        }

        for d in devices.values() {
            if d.id.eq_ignore_ascii_case(label)
                || d.name().eq_ignore_ascii_case(label)
                || topic_safe_id(d).eq_ignore_ascii_case(label)
            {
                return Some(d.clone());
            }
        }

        None
    }

    pub async fn resolve_device_read_only(&self, label: &str) -> anyhow::Result<Device> {
        self.resolve_device(label)
            .await
            .ok_or_else(|| anyhow::anyhow!("device '{label}' not found"))
    }

    pub async fn set_remi_client(&self, client: RemiApiClient) {
        self.remi_client.lock().await.replace(client);
    }

    pub async fn get_remi_client(&self) -> Option<RemiApiClient> {
        self.remi_client.lock().await.clone()
    }

    async fn remi_client(&self) -> anyhow::Result<RemiApiClient> {
        self.get_remi_client()
            .await
            .ok_or_else(|| anyhow::anyhow!("Rémi API client is not available"))
    }

    pub async fn set_hass_client(&self, client: HassClient) {
        self.hass_client.lock().await.replace(client);
    }

    pub async fn get_hass_client(&self) -> Option<HassClient> {
        self.hass_client.lock().await.clone()
    }

    /// How long to wait after a control request before polling the
    /// device to reconcile its state. None disables the follow-up poll.
    pub async fn set_poll_after_control_delay(&self, delay: Option<Duration>) {
        *self.poll_after_control_delay.lock().await = delay;
    }

    /// Replace the whole bedtime settings cache.
    /// Returns true if alarms were added or removed.
    pub async fn set_bedtime_settings(&self, settings: HashMap<String, Vec<Alarm>>) -> bool {
        let mut cache = self.bedtime_settings.lock().await;
        let changed = alarm_ids(&cache) != alarm_ids(&settings);
        *cache = settings;
        changed
    }

    pub async fn bedtime_settings_for_device(&self, device_id: &str) -> Vec<Alarm> {
        self.bedtime_settings
            .lock()
            .await
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn find_alarm(&self, setting_id: &str) -> Option<Alarm> {
        self.bedtime_settings
            .lock()
            .await
            .values()
            .flatten()
            .find(|alarm| alarm.id == setting_id)
            .cloned()
    }

    /// Re-pull the alarm data for every device, replacing the cache.
    /// Returns true if the set of alarms changed.
    pub async fn refresh_alarms(&self) -> anyhow::Result<bool> {
        let client = self.remi_client().await?;
        let settings = client.get_all_bedtime_settings().await;
        log::info!(
            "Refreshed bedtime settings for {} device(s)",
            settings.len()
        );
        Ok(self.set_bedtime_settings(settings).await)
    }

    /// Periodic alarm refresh. New or vanished alarms need their
    /// switches (re)registered, otherwise only their state is reported.
    pub async fn refresh_alarms_and_advise(self: &Arc<Self>) -> anyhow::Result<()> {
        if self.refresh_alarms().await? {
            log::info!("The set of alarms changed, re-registering with Home Assistant");
            if let Some(hass) = self.get_hass_client().await {
                return hass
                    .register_with_hass(self)
                    .await
                    .context("register_with_hass");
            }
            return Ok(());
        }
        for d in self.devices().await {
            if let Err(err) = self.notify_of_state_change(&d.id).await {
                log::error!("while reporting alarms for {d}: {err:#}");
            }
        }
        Ok(())
    }

    pub async fn poll_device(self: &Arc<Self>, device_id: &str) -> anyhow::Result<()> {
        let client = self.remi_client().await?;
        let info = client
            .get_device_info(device_id)
            .await
            .with_context(|| format!("get_device_info {device_id}"))?;
        log::trace!("updated state for {device_id}: {info:?}");
        self.device_mut(device_id).await.set_info(info);
        self.notify_of_state_change(device_id)
            .await
            .context("state.notify_of_state_change")
    }

    pub async fn poll_all_devices(self: &Arc<Self>) {
        for d in self.devices().await {
            if let Err(err) = self.poll_device(&d.id).await {
                log::error!("while polling {d}: {err:#}");
            }
        }
    }

    /// Re-pull everything and present it to Home Assistant again
    pub async fn refresh_all(self: &Arc<Self>) -> anyhow::Result<()> {
        self.refresh_alarms().await?;
        self.poll_all_devices().await;
        if let Some(hass) = self.get_hass_client().await {
            hass.register_with_hass(self)
                .await
                .context("register_with_hass")?;
        }
        Ok(())
    }

    fn schedule_poll_after_control(self: &Arc<Self>, device_id: &str) {
        let state = self.clone();
        let device_id = device_id.to_string();
        tokio::spawn(async move {
            let Some(delay) = *state.poll_after_control_delay.lock().await else {
                return;
            };
            // The cloud doesn't always reflect a write right away
            sleep(delay).await;
            log::info!("Polling {device_id} to get latest state after control");
            if let Err(err) = state.poll_device(&device_id).await {
                log::error!("Polling {device_id} failed: {err:#}");
            }
        });
    }

    async fn after_control<F: FnOnce(&mut Device)>(
        self: &Arc<Self>,
        device: &Device,
        apply: F,
    ) -> anyhow::Result<()> {
        {
            let mut device = self.device_mut(&device.id).await;
            (apply)(&mut *device);
        }
        self.notify_of_state_change(&device.id).await?;
        self.schedule_poll_after_control(&device.id);
        Ok(())
    }

    pub async fn device_set_luminosity(
        self: &Arc<Self>,
        device: &Device,
        level: i64,
    ) -> anyhow::Result<()> {
        let client = self.remi_client().await?;
        log::info!("Setting {device} luminosity to {level}");
        client.set_brightness(&device.id, level).await?;
        self.after_control(device, |d| {
            if let Some(info) = d.info.as_mut() {
                info.luminosity = level;
            }
        })
        .await
    }

    pub async fn device_set_volume(
        self: &Arc<Self>,
        device: &Device,
        level: i64,
    ) -> anyhow::Result<()> {
        let client = self.remi_client().await?;
        log::info!("Setting {device} volume to {level}");
        client.set_volume(&device.id, level).await?;
        self.after_control(device, |d| {
            if let Some(info) = d.info.as_mut() {
                info.volume = level;
            }
        })
        .await
    }

    pub async fn device_light_power_on(
        self: &Arc<Self>,
        device: &Device,
        on: bool,
    ) -> anyhow::Result<()> {
        let client = self.remi_client().await?;
        log::info!("Turning {device} night light {}", if on { "on" } else { "off" });
        if on {
            client.turn_on(&device.id).await?;
        } else {
            client.turn_off(&device.id).await?;
        }

        let faces = client.faces();
        let face_name = if on {
            crate::remi_api::FACE_LIGHT_ON
        } else {
            crate::remi_api::FACE_LIGHT_OFF
        };
        let face_id = faces.id_for_name(face_name).map(|id| id.to_string());
        self.after_control(device, |d| {
            if let Some(info) = d.info.as_mut() {
                info.face_id = face_id;
                info.face_name = Some(face_name.to_string());
            }
        })
        .await
    }

    /// Enable or disable an alarm. Alarms found in the bedtime cache
    /// are dispatched on their known kind; anything else is classified
    /// from the shape of its id.
    pub async fn toggle_alarm(
        self: &Arc<Self>,
        setting_id: &str,
        enabled: bool,
    ) -> anyhow::Result<ToggleAck> {
        if setting_id == PLACEHOLDER_SETTING_ID {
            anyhow::bail!("Cannot toggle placeholder bedtime setting");
        }

        let client = self.remi_client().await?;
        let ack = match self.find_alarm(setting_id).await {
            Some(alarm) => client.toggle_alarm(&alarm, enabled).await?,
            None => client.toggle(setting_id, enabled).await?,
        };

        let device_id = {
            let mut settings = self.bedtime_settings.lock().await;
            let mut device_id = None;
            for alarm in settings.values_mut().flatten() {
                if alarm.id == setting_id {
                    alarm.enabled = enabled;
                    device_id.replace(alarm.device_id().to_string());
                }
            }
            device_id
        };

        if let Some(device_id) = device_id {
            if self.device_by_id(&device_id).await.is_some() {
                self.notify_of_state_change(&device_id).await?;
            }
        }

        Ok(ack)
    }

    // Take care not to call this while you hold a mutable device
    // reference, as that will deadlock!
    pub async fn notify_of_state_change(self: &Arc<Self>, device_id: &str) -> anyhow::Result<()> {
        let Some(canonical_device) = self.device_by_id(device_id).await else {
            anyhow::bail!("cannot find device {device_id}!?");
        };

        if let Some(hass) = self.get_hass_client().await {
            hass.advise_hass_of_device_state(&canonical_device, self)
                .await?;
        }

        Ok(())
    }
}

use crate::service::device::collect_devices;
use crate::service::hass::spawn_hass_integration;
use crate::service::http::run_http_server;
use crate::service::state::StateHandle;
use crate::version_info::remi_version;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(clap::Parser, Debug)]
pub struct ServeCommand {
    /// The port on which the HTTP API will listen
    #[arg(long, default_value_t = 8057)]
    http_port: u16,

    /// How often to poll each device for its state, in seconds
    #[arg(long, default_value_t = 60)]
    poll_interval: u64,

    /// How often to re-pull the alarm schedule, in seconds
    #[arg(long, default_value_t = 120)]
    alarm_poll_interval: u64,
}

async fn periodic_state_poll(state: StateHandle, interval: Duration) -> anyhow::Result<()> {
    loop {
        sleep(interval).await;
        state.poll_all_devices().await;
    }
}

async fn periodic_alarm_poll(state: StateHandle, interval: Duration) -> anyhow::Result<()> {
    loop {
        sleep(interval).await;
        if let Err(err) = state.refresh_alarms_and_advise().await {
            log::error!("while refreshing alarms: {err:#}");
        }
    }
}

impl ServeCommand {
    pub async fn run(&self, args: &crate::Args) -> anyhow::Result<()> {
        log::info!("Starting service. version {}", remi_version());
        let state = Arc::new(crate::service::state::State::new());
        state
            .set_poll_after_control_delay(Some(Duration::from_secs(5)))
            .await;

        let client = args.api_args.logged_in_client().await?;
        log::info!("Logged in. {} Rémi device(s) on the account", client.device_ids().len());

        for device in collect_devices(&client).await {
            state.add_device(device).await;
        }
        state.set_remi_client(client).await;
        state.refresh_alarms().await?;

        let now = Utc::now();
        log::info!("Devices returned from the Rémi API");
        for device in state.devices().await {
            log::info!("{device}");
            if let Some(info) = &device.info {
                log::info!(
                    "  temperature={:?} luminosity={} volume={} face={:?}",
                    device.temperature().map(|t| t.to_string()),
                    info.luminosity,
                    info.volume,
                    info.face_name
                );
                log::info!(
                    "  firmware={:?} update_needed={}",
                    info.firmware_version,
                    info.firmware_need_update
                );
            }
            let alarms = state.bedtime_settings_for_device(&device.id).await;
            log::info!("  {} alarm(s)", alarms.len());
            for alarm in &alarms {
                log::info!(
                    "    {} {} enabled={} kind={:?}",
                    alarm.id,
                    alarm.time,
                    alarm.enabled,
                    alarm.kind
                );
            }
            if let Some(polled) = device.last_polled {
                log::trace!("  polled {}s ago", (now - polled).num_seconds());
            }
            log::info!("");
        }

        // Start periodic status polling
        {
            let state = state.clone();
            let interval = Duration::from_secs(self.poll_interval);
            tokio::spawn(async move {
                if let Err(err) = periodic_state_poll(state, interval).await {
                    log::error!("periodic_state_poll: {err:#}");
                }
            });
        }
        {
            let state = state.clone();
            let interval = Duration::from_secs(self.alarm_poll_interval);
            tokio::spawn(async move {
                if let Err(err) = periodic_alarm_poll(state, interval).await {
                    log::error!("periodic_alarm_poll: {err:#}");
                }
            });
        }

        // start advertising on local mqtt
        spawn_hass_integration(state.clone(), &args.hass_args).await?;

        run_http_server(state.clone(), self.http_port).await
    }
}

use crate::hass_mqtt::enumerator::{enumerate_all_entites, enumerate_entities_for_device};
use crate::hass_mqtt::instance::{config_topic, EntityList};
use crate::hass_mqtt::number::DeviceLevel;
use crate::opt_env_var;
use crate::service::device::Device as ServiceDevice;
use crate::service::hass_gc::{
    load_published_entities, persistence_path, save_published_entities, stale_entities,
};
use crate::service::state::StateHandle;
use anyhow::Context;
use async_channel::Receiver;
use mosquitto_rs::router::{MqttRouter, Params, Payload, State};
use mosquitto_rs::{Client, Event, QoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(clap::Parser, Debug)]
pub struct HassArguments {
    /// The mqtt broker hostname or address.
    /// You may also set this via the REMI_MQTT_HOST environment variable.
    #[arg(long, global = true)]
    mqtt_host: Option<String>,

    /// The mqtt broker port
    /// You may also set this via the REMI_MQTT_PORT environment variable.
    /// If unspecified, uses 1883
    #[arg(long, global = true)]
    mqtt_port: Option<u16>,

    /// The username to authenticate against the broker
    /// You may also set this via the REMI_MQTT_USER environment variable.
    #[arg(long, global = true)]
    mqtt_username: Option<String>,

    /// The password to authenticate against the broker
    /// You may also set this via the REMI_MQTT_PASSWORD environment variable.
    #[arg(long, global = true)]
    mqtt_password: Option<String>,

    #[arg(long, global = true)]
    mqtt_bind_address: Option<String>,

    #[arg(long, global = true, default_value = "homeassistant")]
    hass_discovery_prefix: String,
}

impl HassArguments {
    pub fn opt_mqtt_host(&self) -> anyhow::Result<Option<String>> {
        match &self.mqtt_host {
            Some(h) => Ok(Some(h.to_string())),
            None => opt_env_var("REMI_MQTT_HOST"),
        }
    }

    pub fn mqtt_host(&self) -> anyhow::Result<String> {
        self.opt_mqtt_host()?.ok_or_else(|| {
            anyhow::anyhow!(
                "Please specify the mqtt broker either via the \
                --mqtt-host parameter or by setting $REMI_MQTT_HOST"
            )
        })
    }

    pub fn mqtt_port(&self) -> anyhow::Result<u16> {
        match self.mqtt_port {
            Some(p) => Ok(p),
            None => Ok(opt_env_var("REMI_MQTT_PORT")?.unwrap_or(1883)),
        }
    }

    pub fn mqtt_username(&self) -> anyhow::Result<Option<String>> {
        match self.mqtt_username.clone() {
            Some(u) => Ok(Some(u)),
            None => opt_env_var("REMI_MQTT_USER"),
        }
    }

    pub fn mqtt_password(&self) -> anyhow::Result<Option<String>> {
        match self.mqtt_password.clone() {
            Some(u) => Ok(Some(u)),
            None => opt_env_var("REMI_MQTT_PASSWORD"),
        }
    }
}

#[derive(Clone)]
pub struct HassClient {
    client: Client,
}

impl HassClient {
    /// Publish every entity config, retire the ones that vanished
    /// since the last registration, then report current state.
    pub async fn register_with_hass(&self, state: &StateHandle) -> anyhow::Result<()> {
        let entities = enumerate_all_entites(state).await?;

        log::trace!("register_with_hass: register {} entities", entities.len());
        let published = entities.publish_config(state, self).await?;

        if let Err(err) = self.remove_stale_entities(state, &published).await {
            log::warn!("Unable to remove stale entities: {err:#}");
        }

        // Mark as available
        log::trace!("register_with_hass: mark as online");
        self.publish_retained(availability_topic(), "online")
            .await
            .context("online -> availability_topic")?;

        // report initial state
        log::trace!("register_with_hass: reporting state");
        entities.notify_state(self).await.context("notify_state")?;

        log::trace!("register_with_hass: done");

        Ok(())
    }

    async fn remove_stale_entities(
        &self,
        state: &StateHandle,
        published: &std::collections::HashSet<crate::service::hass_gc::PublishedEntity>,
    ) -> anyhow::Result<()> {
        let path = persistence_path()?;
        let previous = load_published_entities(&path)
            .with_context(|| format!("loading {}", path.display()))?;

        let disco = state.get_hass_disco_prefix().await;
        for entity in stale_entities(&previous, published) {
            log::info!(
                "Removing stale {} entity {}",
                entity.integration,
                entity.unique_id
            );
            // An empty retained config tells HASS to delete the entity
            self.publish_retained(
                config_topic(&disco, &entity.integration, &entity.unique_id),
                "",
            )
            .await?;
        }

        save_published_entities(&path, published)
            .with_context(|| format!("saving {}", path.display()))
    }

    pub async fn publish<T: AsRef<str> + std::fmt::Display, P: AsRef<[u8]> + std::fmt::Display>(
        &self,
        topic: T,
        payload: P,
    ) -> anyhow::Result<()> {
        log::trace!("{topic} -> {payload}");
        self.client
            .publish(topic, payload, QoS::AtMostOnce, false)
            .await?;
        Ok(())
    }

    pub async fn publish_retained<
        T: AsRef<str> + std::fmt::Display,
        P: AsRef<[u8]> + std::fmt::Display,
    >(
        &self,
        topic: T,
        payload: P,
    ) -> anyhow::Result<()> {
        log::trace!("{topic} -> {payload} (retained)");
        self.client
            .publish(topic, payload, QoS::AtMostOnce, true)
            .await?;
        Ok(())
    }

    pub async fn publish_obj<T: AsRef<str> + std::fmt::Display, P: Serialize>(
        &self,
        topic: T,
        payload: P,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&payload)?;
        self.publish(topic, payload).await
    }

    pub async fn publish_obj_retained<T: AsRef<str> + std::fmt::Display, P: Serialize>(
        &self,
        topic: T,
        payload: P,
    ) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&payload)?;
        self.publish_retained(topic, payload).await
    }

    pub async fn advise_hass_of_device_state(
        &self,
        device: &ServiceDevice,
        state: &StateHandle,
    ) -> anyhow::Result<()> {
        let mut entities = EntityList::new();
        enumerate_entities_for_device(device, state, &mut entities).await?;
        entities.notify_state(self).await
    }
}

pub fn topic_safe_string(s: &str) -> String {
    let mut result = String::new();
    for c in s.chars() {
        if c == ':' || c == ' ' {
            result.push('_');
        } else {
            result.push(c.to_ascii_lowercase());
        }
    }
    result
}

/// Parse object ids are case sensitive, so unlike `topic_safe_string`
/// this preserves case
pub fn topic_safe_object_id(object_id: &str) -> String {
    let mut id = object_id.to_string();
    id.retain(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    id
}

pub fn topic_safe_id(device: &ServiceDevice) -> String {
    topic_safe_object_id(&device.id)
}

/// All entities use the same topic so that we can mark unavailable
/// via last-will
pub fn availability_topic() -> String {
    "remi2mqtt/availability".to_string()
}

pub fn refresh_topic() -> String {
    "remi2mqtt/refresh".to_string()
}

fn parse_switch_payload(command: &str) -> anyhow::Result<bool> {
    match command {
        "ON" | "on" => Ok(true),
        "OFF" | "off" => Ok(false),
        _ => anyhow::bail!("invalid command {command}"),
    }
}

#[derive(Deserialize)]
struct IdParameter {
    id: String,
}

/// HASS is sending a command to the night light
async fn mqtt_light_command(
    Payload(payload): Payload<String>,
    Params(IdParameter { id }): Params<IdParameter>,
    State(state): State<StateHandle>,
) -> anyhow::Result<()> {
    let device = state.resolve_device_read_only(&id).await?;
    log::info!("Command for {device}: {payload}");

    let on = parse_switch_payload(&payload).with_context(|| format!("light {id}"))?;
    state
        .device_light_power_on(&device, on)
        .await
        .context("mqtt_light_command: state.device_light_power_on")
}

#[derive(Deserialize)]
struct IdAndProperty {
    id: String,
    property: String,
}

async fn mqtt_number_command(
    Payload(payload): Payload<String>,
    Params(IdAndProperty { id, property }): Params<IdAndProperty>,
    State(state): State<StateHandle>,
) -> anyhow::Result<()> {
    let device = state.resolve_device_read_only(&id).await?;
    log::info!("{property} for {device}: {payload}");

    let level = DeviceLevel::from_property(&property)
        .ok_or_else(|| anyhow::anyhow!("unknown number {property} for {id}"))?;
    // HASS sends numbers as floats, eg: "42.0"
    let value: f64 = payload
        .trim()
        .parse()
        .with_context(|| format!("parsing {property} value {payload}"))?;
    let value = value.round() as i64;

    match level {
        DeviceLevel::Luminosity => state.device_set_luminosity(&device, value).await,
        DeviceLevel::Volume => state.device_set_volume(&device, value).await,
    }
}

#[derive(Deserialize)]
struct IdAndSetting {
    id: String,
    setting_id: String,
}

async fn mqtt_switch_command(
    Payload(command): Payload<String>,
    Params(IdAndSetting { id, setting_id }): Params<IdAndSetting>,
    State(state): State<StateHandle>,
) -> anyhow::Result<()> {
    log::info!("alarm {setting_id} for {id}: {command}");
    let on = parse_switch_payload(&command).with_context(|| format!("alarm {setting_id}"))?;
    let ack = state.toggle_alarm(&setting_id, on).await?;
    log::info!("alarm {setting_id} for {id}: {ack:?}");
    Ok(())
}

async fn mqtt_refresh(State(state): State<StateHandle>) -> anyhow::Result<()> {
    log::info!("mqtt_refresh");
    state.refresh_all().await
}

/// HASS is advising us that its status has changed
async fn mqtt_homeassitant_status(
    Payload(status): Payload<String>,
    State(state): State<StateHandle>,
) -> anyhow::Result<()> {
    log::info!("Home Assistant status changed: {status}");

    let client = state
        .get_hass_client()
        .await
        .ok_or_else(|| anyhow::anyhow!("hass client to be present"))?;

    client.register_with_hass(&state).await?;

    Ok(())
}

async fn run_mqtt_loop(
    state: StateHandle,
    subscriber: Receiver<Event>,
    client: Client,
) -> anyhow::Result<()> {
    async fn rebuild_router(
        client: &Client,
        state: &StateHandle,
    ) -> anyhow::Result<Arc<MqttRouter<StateHandle>>> {
        let disco_prefix = state.get_hass_disco_prefix().await;
        let mut router: MqttRouter<StateHandle> = MqttRouter::new(client.clone());

        router
            .route(format!("{disco_prefix}/status"), mqtt_homeassitant_status)
            .await?;

        router
            .route("remi2mqtt/light/:id/command", mqtt_light_command)
            .await?;
        router
            .route("remi2mqtt/number/:id/command/:property", mqtt_number_command)
            .await?;
        router
            .route("remi2mqtt/switch/:id/command/:setting_id", mqtt_switch_command)
            .await?;
        router.route(refresh_topic(), mqtt_refresh).await?;

        state
            .get_hass_client()
            .await
            .ok_or_else(|| anyhow::anyhow!("have hass client"))?
            .register_with_hass(state)
            .await
            .context("register_with_hass")?;

        Ok(Arc::new(router))
    }

    let mut router = rebuild_router(&client, &state).await?;
    let mut need_rebuild = false;

    while let Ok(event) = subscriber.recv().await {
        match event {
            Event::Message(msg) => {
                let router = router.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    if let Err(err) = router.dispatch(msg.clone(), state.clone()).await {
                        log::error!("While dispatching {msg:?}: {err:#}");
                    }
                });
            }
            Event::Disconnected(reason) => {
                log::warn!("MQTT disconnected with reason={reason}");
                need_rebuild = true;
            }
            Event::Connected(status) => {
                log::info!("MQTT connected with status={status}");
                if need_rebuild {
                    router = rebuild_router(&client, &state).await?;
                    need_rebuild = false;
                }
            }
        }
    }

    log::info!("subscriber.recv loop terminated");

    Ok(())
}

pub async fn spawn_hass_integration(
    state: StateHandle,
    args: &HassArguments,
) -> anyhow::Result<()> {
    let client = Client::with_auto_id()?;

    let mqtt_host = args.mqtt_host()?;
    let mqtt_username = args.mqtt_username()?;
    let mqtt_password = args.mqtt_password()?;
    let mqtt_port = args.mqtt_port()?;

    client.set_last_will(availability_topic(), "offline", QoS::AtMostOnce, true)?;

    if mqtt_username.is_some() != mqtt_password.is_some() {
        log::error!(
            "MQTT username and password either both need to be set, or both need to be unset"
        );
    }
    client.set_username_and_password(mqtt_username.as_deref(), mqtt_password.as_deref())?;
    client
        .connect(
            &mqtt_host,
            mqtt_port.into(),
            Duration::from_secs(120),
            args.mqtt_bind_address.as_deref(),
        )
        .await
        .with_context(|| format!("connecting to mqtt broker {mqtt_host}:{mqtt_port}"))?;
    let subscriber = client
        .subscriber()
        .ok_or_else(|| anyhow::anyhow!("mqtt subscriber was already taken"))?;

    state
        .set_hass_client(HassClient {
            client: client.clone(),
        })
        .await;

    let disco_prefix = args.hass_discovery_prefix.clone();
    state.set_hass_disco_prefix(disco_prefix).await;

    tokio::spawn(async move {
        let res = run_mqtt_loop(state, subscriber, client).await;
        if let Err(err) = res {
            log::error!("run_mqtt_loop: {err:#}");
            log::error!("The Home Assistant bridge cannot continue, exiting in 30 seconds");
            tokio::time::sleep(tokio::time::Duration::from_secs(30)).await;
            std::process::exit(1);
        } else {
            log::info!("MQTT event stream ended; exiting so the supervisor can restart us");
            std::process::exit(0);
        }
    });

    Ok(())
}

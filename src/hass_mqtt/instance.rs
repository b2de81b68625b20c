use crate::hass_mqtt::base::EntityConfig;
use crate::service::hass::HassClient;
use crate::service::hass_gc::PublishedEntity;
use crate::service::state::StateHandle;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;

/// Home Assistant needs a moment to digest each discovery config
const PUBLISH_SPACING: Duration = Duration::from_millis(100);

#[async_trait]
pub trait EntityInstance: Send + Sync {
    /// Emits the retained discovery config for this entity
    async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<PublishedEntity>;

    /// Emits the current state. Entities without state do nothing.
    async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()>;
}

pub fn config_topic(disco: &str, integration: &str, unique_id: &str) -> String {
    format!("{disco}/{integration}/{unique_id}/config")
}

pub async fn publish_entity_config<T: Serialize + Sync>(
    integration: &str,
    state: &StateHandle,
    client: &HassClient,
    base: &EntityConfig,
    config: &T,
) -> anyhow::Result<PublishedEntity> {
    let disco = state.get_hass_disco_prefix().await;
    client
        .publish_obj_retained(config_topic(&disco, integration, &base.unique_id), config)
        .await?;

    Ok(PublishedEntity {
        unique_id: base.unique_id.clone(),
        integration: integration.to_string(),
    })
}

/// The entities that make up a device (or the bridge itself).
/// A failure on one entity is logged and the rest are still processed.
#[derive(Default)]
pub struct EntityList {
    entities: Vec<Box<dyn EntityInstance>>,
}

impl EntityList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<E: EntityInstance + 'static>(&mut self, e: E) {
        self.entities.push(Box::new(e));
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Publishes every config, then fails if any of them failed
    pub async fn publish_config(
        &self,
        state: &StateHandle,
        client: &HassClient,
    ) -> anyhow::Result<HashSet<PublishedEntity>> {
        let mut published = HashSet::new();
        let mut failures = 0;
        for e in &self.entities {
            match e.publish_config(state, client).await {
                Ok(entity) => {
                    published.insert(entity);
                }
                Err(err) => {
                    log::error!("publishing entity config: {err:#}");
                    failures += 1;
                }
            }
            tokio::time::sleep(PUBLISH_SPACING).await;
        }
        // A partial set must not reach stale entity removal
        if failures > 0 {
            anyhow::bail!(
                "{failures} of {} entity configs could not be published",
                self.entities.len()
            );
        }
        Ok(published)
    }

    pub async fn notify_state(&self, client: &HassClient) -> anyhow::Result<()> {
        let mut last_err = None;
        for e in &self.entities {
            if let Err(err) = e.notify_state(client).await {
                log::error!("reporting entity state: {err:#}");
                last_err.replace(err);
            }
        }
        match last_err {
            Some(err) => Err(err.context("EntityList::notify_state")),
            None => Ok(()),
        }
    }
}

//! Parental control settings, one document per (parent, child) pair

use std::sync::Arc;

use nestguard_core::settings::settings_key;
use nestguard_core::store::{collections, get_json, list_json, put_json};
use nestguard_core::{Clock, NestResult, ParentalControlSettings, Store};
use tracing::{debug, info};

#[derive(Clone)]
pub struct SettingsRepository {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl SettingsRepository {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Settings for a pair, creating and storing the defaults on first access
    pub async fn get_or_default(
        &self,
        parent_id: &str,
        child_id: &str,
    ) -> NestResult<ParentalControlSettings> {
        let key = settings_key(parent_id, child_id);
        if let Some(settings) = get_json(self.store.as_ref(), collections::SETTINGS, &key).await? {
            return Ok(settings);
        }

        let mut settings = ParentalControlSettings::defaults_for(parent_id, child_id);
        settings.updated_at = self.clock.now();
        put_json(self.store.as_ref(), collections::SETTINGS, &key, &settings).await?;
        debug!("Created default settings for {}", key);
        Ok(settings)
    }

    /// Settings for a pair, if any were ever stored
    pub async fn get(
        &self,
        parent_id: &str,
        child_id: &str,
    ) -> NestResult<Option<ParentalControlSettings>> {
        let key = settings_key(parent_id, child_id);
        get_json(self.store.as_ref(), collections::SETTINGS, &key).await
    }

    /// Validate and store settings, stamping `updated_at`
    pub async fn update(
        &self,
        mut settings: ParentalControlSettings,
    ) -> NestResult<ParentalControlSettings> {
        settings.validate()?;
        settings.updated_at = self.clock.now();
        put_json(self.store.as_ref(), collections::SETTINGS, &settings.key(), &settings).await?;
        info!("Updated settings for {}", settings.key());
        Ok(settings)
    }

    /// Every stored settings document, in key order
    pub async fn list_all(&self) -> NestResult<Vec<ParentalControlSettings>> {
        list_json(self.store.as_ref(), collections::SETTINGS, None).await
    }

    /// Settings of every parent configured for a child
    pub async fn list_for_child(&self, child_id: &str) -> NestResult<Vec<ParentalControlSettings>> {
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|s| s.child_id == child_id)
            .collect())
    }

    /// Settings for every child of a parent
    pub async fn list_for_parent(
        &self,
        parent_id: &str,
    ) -> NestResult<Vec<ParentalControlSettings>> {
        let prefix = format!("{}:", parent_id);
        list_json(self.store.as_ref(), collections::SETTINGS, Some(&prefix)).await
    }
}

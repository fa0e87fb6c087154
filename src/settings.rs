//! Module settings stored in the host's settings store.
//!
//! | Key                 | Scope | Value                                      |
//! |---------------------|-------|--------------------------------------------|
//! | `selectedFolderId`  | world | folder of the active phase set, or null    |
//! | `lastMasterSceneId` | world | most recently materialized master, or null |
//!
//! Both are world-scoped so every participant agrees on the active sequence.

use std::sync::Arc;

use serde_json::Value;

use crate::errors::StoreError;
use crate::flags::MODULE_ID;
use crate::store::{SettingScope, SettingsStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    SelectedFolderId,
    LastMasterSceneId,
}

impl SettingKey {
    pub fn name(self) -> &'static str {
        match self {
            SettingKey::SelectedFolderId => "selectedFolderId",
            SettingKey::LastMasterSceneId => "lastMasterSceneId",
        }
    }

    pub fn scope(self) -> SettingScope {
        match self {
            SettingKey::SelectedFolderId | SettingKey::LastMasterSceneId => SettingScope::World,
        }
    }

    /// Key under which the host stores the setting.
    pub fn storage_key(self) -> String {
        format!("{}.{}", MODULE_ID, self.name())
    }
}

/// Typed access to this module's settings.
#[derive(Clone)]
pub struct ModuleSettings {
    store: Arc<dyn SettingsStore>,
}

impl ModuleSettings {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self { store }
    }

    /// Read an id-valued setting. Unset, null and empty values read as `None`.
    pub async fn get_id(&self, key: SettingKey) -> Result<Option<String>, StoreError> {
        let value = self
            .store
            .get_setting(key.scope(), &key.storage_key())
            .await?;
        Ok(value
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string))
    }

    pub async fn set_id(&self, key: SettingKey, id: Option<&str>) -> Result<(), StoreError> {
        let value = id.map_or(Value::Null, |s| Value::String(s.to_string()));
        tracing::debug!(setting = key.name(), value = ?id, "writing setting");
        self.store
            .set_setting(key.scope(), &key.storage_key(), value)
            .await
    }
}

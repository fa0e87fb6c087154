//! Module flags on host documents.
//!
//! Every document this crate manages keeps its data under
//! `flags.easy-phasey.<flag>`. Flags are declared up front as [`FlagSetting`]s.
//! A flag marked `keyed` holds a map whose keys are free-form (scene uuids such
//! as `Scene.abc123`), and the host expands dotted keys into nested objects on
//! update. Such keys are protected with [`protect_key`] before they reach the
//! store and restored with [`unprotect_key`] when read back.
//!
//! [`FlaggedDocument`] wraps a document with a pending-update accumulator:
//! changes are staged locally and sent as one update by [`FlaggedDocument::save`].

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::store::object_path::{self, DELETE_PREFIX, PATH_SEPARATOR};
use crate::store::{Document, DocumentStore};

/// Flag namespace of this module.
pub const MODULE_ID: &str = "easy-phasey";

/// Stand-in for the path separator inside protected keys.
pub const PROTECTED_SEPARATOR: &str = "#&#";

/// Escape path separators in a key.
pub fn protect_key(key: &str) -> String {
    key.replace(PATH_SEPARATOR, PROTECTED_SEPARATOR)
}

/// Undo [`protect_key`].
pub fn unprotect_key(key: &str) -> String {
    key.replace(PROTECTED_SEPARATOR, &PATH_SEPARATOR.to_string())
}

/// Protect every top-level key of a map.
pub fn protect_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter().map(|(k, v)| (protect_key(&k), v)).collect()
}

/// Unprotect every top-level key of a map.
pub fn unprotect_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(k, v)| (unprotect_key(&k), v))
        .collect()
}

/// Declaration of one flag.
#[derive(Debug, Clone, Copy)]
pub struct FlagSetting {
    pub key: &'static str,
    pub default: fn() -> Value,
    /// Value is a map keyed by free-form strings that need protecting
    pub keyed: bool,
}

impl FlagSetting {
    pub const fn plain(key: &'static str, default: fn() -> Value) -> Self {
        Self {
            key,
            default,
            keyed: false,
        }
    }

    pub const fn keyed(key: &'static str, default: fn() -> Value) -> Self {
        Self {
            key,
            default,
            keyed: true,
        }
    }

    fn protect(&self, value: Value) -> Value {
        match value {
            Value::Object(map) if self.keyed => Value::Object(protect_map(map)),
            other => other,
        }
    }

    fn unprotect(&self, value: Value) -> Value {
        match value {
            Value::Object(map) if self.keyed => Value::Object(unprotect_map(map)),
            other => other,
        }
    }
}

/// A host document carrying module flags, with staged changes.
#[derive(Debug, Clone)]
pub struct FlaggedDocument {
    doc: Document,
    settings: &'static [FlagSetting],
    /// Staged flag values, unprotected, last write wins per flag
    pending: Map<String, Value>,
}

impl FlaggedDocument {
    pub fn new(doc: Document, settings: &'static [FlagSetting]) -> Self {
        Self {
            doc,
            settings,
            pending: Map::new(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Whether `marker` is set to `true` on the document.
    pub fn is_marked(&self, marker: &str) -> bool {
        self.doc.get_flag(MODULE_ID, marker).and_then(Value::as_bool) == Some(true)
    }

    fn setting(&self, key: &str) -> Option<&FlagSetting> {
        self.settings.iter().find(|s| s.key == key)
    }

    /// Current value of a flag, or its default when unset. Keyed maps come back
    /// unprotected. Undeclared flags read as `null`.
    pub fn get(&self, key: &str) -> Value {
        let Some(setting) = self.setting(key) else {
            return Value::Null;
        };
        let stored = self
            .doc
            .get_flag(MODULE_ID, key)
            .cloned()
            .unwrap_or_else(setting.default);
        setting.unprotect(stored)
    }

    /// Typed read. A value that does not decode falls back to the default.
    pub fn get_as<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        serde_json::from_value(self.get(key)).unwrap_or_else(|e| {
            tracing::warn!(flag = key, error = %e, "flag value did not decode, using default");
            self.setting(key)
                .and_then(|s| serde_json::from_value((s.default)()).ok())
                .unwrap_or_default()
        })
    }

    /// Stage a flag value. The local document reflects it immediately, with the
    /// same merge semantics the store will apply; nothing is written until
    /// [`save`](Self::save).
    pub fn stage(&mut self, key: &str, value: Value) {
        let Some(setting) = self.setting(key).copied() else {
            tracing::warn!(flag = key, "ignoring undeclared flag");
            return;
        };
        object_path::merge_object(
            &mut self.doc.source,
            flags_update(Map::from_iter([(key.to_string(), setting.protect(value.clone()))])),
        );

        // Keyed maps accumulate entries across stages; everything else replaces.
        if setting.keyed
            && let (Some(Value::Object(existing)), Value::Object(incoming)) =
                (self.pending.get_mut(key), &value)
        {
            for (k, v) in incoming {
                // an entry and its deletion marker cancel out
                match k.strip_prefix(DELETE_PREFIX) {
                    Some(entry) => existing.remove(entry),
                    None => existing.remove(&format!("{DELETE_PREFIX}{k}")),
                };
                existing.insert(k.clone(), v.clone());
            }
            return;
        }
        self.pending.insert(key.to_string(), value);
    }

    /// Stage removal of one entry of a keyed flag.
    pub fn stage_unset_entry(&mut self, key: &str, entry: &str) {
        self.stage(
            key,
            Value::Object(Map::from_iter([(
                format!("{DELETE_PREFIX}{entry}"),
                Value::Null,
            )])),
        );
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// The update object `save` would send, with keyed flags protected.
    pub fn prepare_update(&self) -> Map<String, Value> {
        let flags: Map<String, Value> = self
            .pending
            .iter()
            .map(|(key, value)| {
                let value = match self.setting(key) {
                    Some(setting) => setting.protect(value.clone()),
                    None => value.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        flags_update(flags)
    }

    /// Send staged changes as one update. On success the document is replaced by
    /// the store's copy and the accumulator cleared; on failure the accumulator is
    /// kept so the call can be retried.
    pub async fn save(&mut self, store: &dyn DocumentStore) -> Result<(), StoreError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let update = self.prepare_update();
        let id = self.doc.id().to_string();
        match store.update(self.doc.kind, &id, update).await? {
            Some(updated) => self.doc = updated,
            None => tracing::debug!(id = %id, "update changed nothing"),
        }
        self.pending.clear();
        Ok(())
    }
}

fn flags_update(flags: Map<String, Value>) -> Map<String, Value> {
    let namespaced = Map::from_iter([(MODULE_ID.to_string(), Value::Object(flags))]);
    Map::from_iter([("flags".to_string(), Value::Object(namespaced))])
}

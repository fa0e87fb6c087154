//! In-memory host world backed by an optional JSON world file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;

use super::object_path::merge_object;
use super::{Document, DocumentKind, DocumentStore, EmbeddedKind, SettingScope, SettingsStore};
use crate::errors::StoreError;

/// Serialized form of a world file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorldSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub documents: BTreeMap<String, Document>,
    #[serde(default)]
    pub world_settings: BTreeMap<String, Value>,
    #[serde(default)]
    pub client_settings: BTreeMap<String, Value>,
    /// Scene the local client is looking at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewed_scene: Option<String>,
}

/// Document and settings store held in memory.
///
/// Ids are unique across document kinds. The presented scene is the scene whose
/// `active` field is true.
#[derive(Debug, Default)]
pub struct MemoryWorld {
    state: RwLock<WorldSnapshot>,
    /// Number of upcoming document updates to reject
    reject_updates: AtomicUsize,
}

/// Generate a host-style 16 character id.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: WorldSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            reject_updates: AtomicUsize::new(0),
        }
    }

    /// Load a world file.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let snapshot: WorldSnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    /// Write the world to a file.
    pub async fn save(&self, path: &Path) -> Result<(), StoreError> {
        let mut snapshot = self.snapshot().await;
        snapshot.saved_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, content).map_err(|source| StoreError::Io {
            path: PathBuf::from(path),
            source,
        })
    }

    pub async fn snapshot(&self) -> WorldSnapshot {
        self.state.read().await.clone()
    }

    /// Make the next `count` document updates fail with `StoreError::Rejected`.
    pub fn reject_next_updates(&self, count: usize) {
        self.reject_updates.store(count, Ordering::SeqCst);
    }

    pub async fn create_folder(&self, name: &str) -> Result<Document, StoreError> {
        let data = json!({"name": name, "type": "Scene"});
        self.create(DocumentKind::Folder, object(data)).await
    }

    /// Create a scene in `folder` with extra source fields.
    pub async fn create_scene(
        &self,
        name: &str,
        folder: Option<&str>,
        fields: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let mut data = fields;
        data.insert("name".into(), json!(name));
        data.insert("folder".into(), json!(folder));
        data.entry("active").or_insert(json!(false));
        data.entry("tokens").or_insert(json!([]));
        self.create(DocumentKind::Scene, data).await
    }

    /// Present a scene to players, deactivating every other scene.
    pub async fn present(&self, scene_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.documents.contains_key(scene_id) {
            return Err(missing(DocumentKind::Scene, scene_id));
        }
        for (id, doc) in state.documents.iter_mut() {
            if doc.kind == DocumentKind::Scene {
                doc.source.insert("active".into(), json!(id == scene_id));
            }
        }
        Ok(())
    }

    /// Point the local client's view at a scene.
    pub async fn view(&self, scene_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.documents.contains_key(scene_id) {
            return Err(missing(DocumentKind::Scene, scene_id));
        }
        state.viewed_scene = Some(scene_id.to_string());
        Ok(())
    }

    fn take_rejection(&self) -> bool {
        self.reject_updates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn missing(kind: DocumentKind, id: &str) -> StoreError {
    StoreError::Missing {
        kind,
        id: id.to_string(),
    }
}

#[async_trait]
impl DocumentStore for MemoryWorld {
    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state.documents.get(id).filter(|d| d.kind == kind).cloned())
    }

    async fn create(
        &self,
        kind: DocumentKind,
        mut data: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let id = new_id();
        data.insert("_id".into(), json!(id));
        data.entry("name").or_insert(json!(""));
        let doc = Document::new(kind, data);
        self.state.write().await.documents.insert(id, doc.clone());
        tracing::debug!(kind = %kind, id = %doc.id(), name = %doc.name(), "created document");
        Ok(doc)
    }

    async fn update(
        &self,
        kind: DocumentKind,
        id: &str,
        mut changes: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError> {
        if self.take_rejection() {
            return Err(StoreError::Rejected(format!("update of {kind} {id} refused")));
        }
        changes.remove("_id");
        let mut state = self.state.write().await;
        let doc = state
            .documents
            .get_mut(id)
            .filter(|d| d.kind == kind)
            .ok_or_else(|| missing(kind, id))?;
        if merge_object(&mut doc.source, changes) {
            Ok(Some(doc.clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if !state.documents.get(id).is_some_and(|d| d.kind == kind) {
            return Err(missing(kind, id));
        }
        state.documents.remove(id);
        if state.viewed_scene.as_deref() == Some(id) {
            state.viewed_scene = None;
        }
        Ok(())
    }

    async fn create_embedded(
        &self,
        scene_id: &str,
        kind: EmbeddedKind,
        data: Vec<Map<String, Value>>,
    ) -> Result<Vec<Map<String, Value>>, StoreError> {
        let mut state = self.state.write().await;
        let scene = state
            .documents
            .get_mut(scene_id)
            .filter(|d| d.kind == DocumentKind::Scene)
            .ok_or_else(|| missing(DocumentKind::Scene, scene_id))?;

        let created: Vec<Map<String, Value>> = data
            .into_iter()
            .map(|mut doc| {
                doc.insert("_id".into(), json!(new_id()));
                doc
            })
            .collect();

        let collection = scene
            .source
            .entry(kind.collection())
            .or_insert_with(|| json!([]));
        if !collection.is_array() {
            *collection = json!([]);
        }
        if let Value::Array(docs) = collection {
            docs.extend(created.iter().cloned().map(Value::Object));
        }
        Ok(created)
    }

    async fn delete_embedded(
        &self,
        scene_id: &str,
        kind: EmbeddedKind,
        ids: &[String],
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let scene = state
            .documents
            .get_mut(scene_id)
            .filter(|d| d.kind == DocumentKind::Scene)
            .ok_or_else(|| missing(DocumentKind::Scene, scene_id))?;
        if let Some(Value::Array(docs)) = scene.source.get_mut(kind.collection()) {
            docs.retain(|d| {
                d.get("_id")
                    .and_then(Value::as_str)
                    .is_none_or(|id| !ids.iter().any(|x| x == id))
            });
        }
        Ok(())
    }

    async fn folders(&self) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.kind == DocumentKind::Folder)
            .cloned()
            .collect())
    }

    async fn folder_scenes(&self, folder_id: &str) -> Result<Vec<Document>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .filter(|d| d.kind == DocumentKind::Scene && d.folder() == Some(folder_id))
            .cloned()
            .collect())
    }

    async fn presented_scene_id(&self) -> Result<Option<String>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .values()
            .find(|d| {
                d.kind == DocumentKind::Scene
                    && d.field("active").and_then(Value::as_bool) == Some(true)
            })
            .map(|d| d.id().to_string()))
    }

    async fn viewed_scene_id(&self) -> Result<Option<String>, StoreError> {
        Ok(self.state.read().await.viewed_scene.clone())
    }
}

#[async_trait]
impl SettingsStore for MemoryWorld {
    async fn get_setting(
        &self,
        scope: SettingScope,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        let state = self.state.read().await;
        let settings = match scope {
            SettingScope::World => &state.world_settings,
            SettingScope::Client => &state.client_settings,
        };
        Ok(settings.get(key).cloned())
    }

    async fn set_setting(
        &self,
        scope: SettingScope,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let settings = match scope {
            SettingScope::World => &mut state.world_settings,
            SettingScope::Client => &mut state.client_settings,
        };
        settings.insert(key.to_string(), value);
        Ok(())
    }
}

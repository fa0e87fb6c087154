//! Host collaborator contracts.
//!
//! The phase logic never talks to the host application directly. It goes
//! through two traits:
//! - [`DocumentStore`]: folders, scenes and their embedded documents
//! - [`SettingsStore`]: world- and client-scoped key/value settings
//!
//! [`MemoryWorld`] implements both in memory and can be snapshotted to a JSON
//! world file.

pub mod memory;
pub mod object_path;

pub use memory::MemoryWorld;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;

/// Top-level document types the phase logic touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    Folder,
    Scene,
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentKind::Folder => write!(f, "Folder"),
            DocumentKind::Scene => write!(f, "Scene"),
        }
    }
}

/// Document types embedded in a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddedKind {
    Token,
    AmbientLight,
    AmbientSound,
    Note,
    Drawing,
    MeasuredTemplate,
    Tile,
    Wall,
}

impl EmbeddedKind {
    /// Name of the array field holding this collection on a scene.
    pub fn collection(self) -> &'static str {
        match self {
            EmbeddedKind::Token => "tokens",
            EmbeddedKind::AmbientLight => "lights",
            EmbeddedKind::AmbientSound => "sounds",
            EmbeddedKind::Note => "notes",
            EmbeddedKind::Drawing => "drawings",
            EmbeddedKind::MeasuredTemplate => "templates",
            EmbeddedKind::Tile => "tiles",
            EmbeddedKind::Wall => "walls",
        }
    }
}

/// Settings visibility: shared by every participant, or local to one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingScope {
    World,
    Client,
}

/// A host document: its kind plus the raw source object.
///
/// The source always carries `_id` and `name`; scenes carry `folder`, `active`,
/// their display fields and one array per embedded collection. Module data lives
/// under `flags.<namespace>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub kind: DocumentKind,
    pub source: Map<String, Value>,
}

impl Document {
    pub fn new(kind: DocumentKind, source: Map<String, Value>) -> Self {
        Self { kind, source }
    }

    pub fn id(&self) -> &str {
        self.source.get("_id").and_then(Value::as_str).unwrap_or("")
    }

    /// Host-style uuid, e.g. `Scene.abc123`.
    pub fn uuid(&self) -> String {
        format!("{}.{}", self.kind, self.id())
    }

    pub fn name(&self) -> &str {
        self.source.get("name").and_then(Value::as_str).unwrap_or("")
    }

    /// Parent folder id, if any.
    pub fn folder(&self) -> Option<&str> {
        self.source.get("folder").and_then(Value::as_str)
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.source.get(key)
    }

    /// Documents of one embedded collection.
    pub fn embedded(&self, kind: EmbeddedKind) -> Vec<&Map<String, Value>> {
        self.source
            .get(kind.collection())
            .and_then(Value::as_array)
            .map(|docs| docs.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default()
    }

    /// Ids of one embedded collection.
    pub fn embedded_ids(&self, kind: EmbeddedKind) -> Vec<String> {
        self.embedded(kind)
            .into_iter()
            .filter_map(|d| d.get("_id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn get_flag(&self, namespace: &str, path: &str) -> Option<&Value> {
        object_path::get_path(&self.source, &format!("flags.{namespace}.{path}"))
    }

    pub fn set_flag(&mut self, namespace: &str, path: &str, value: Value) {
        object_path::set_path(&mut self.source, &format!("flags.{namespace}.{path}"), value);
    }

    pub fn unset_flag(&mut self, namespace: &str, path: &str) -> Option<Value> {
        object_path::remove_path(&mut self.source, &format!("flags.{namespace}.{path}"))
    }

    /// Full data with the id stripped, suitable for creating a copy.
    pub fn to_clone_data(&self) -> Map<String, Value> {
        let mut data = self.source.clone();
        data.remove("_id");
        data
    }
}

/// Access to folders, scenes and embedded documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, kind: DocumentKind, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create a document. An `_id` in `data` is ignored; the store assigns one.
    async fn create(
        &self,
        kind: DocumentKind,
        data: Map<String, Value>,
    ) -> Result<Document, StoreError>;

    /// Apply a partial update with host merge semantics.
    /// Returns `None` when the update changed nothing.
    async fn update(
        &self,
        kind: DocumentKind,
        id: &str,
        changes: Map<String, Value>,
    ) -> Result<Option<Document>, StoreError>;

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<(), StoreError>;

    /// Create embedded documents on a scene. Returns the created documents with
    /// their assigned ids.
    async fn create_embedded(
        &self,
        scene_id: &str,
        kind: EmbeddedKind,
        data: Vec<Map<String, Value>>,
    ) -> Result<Vec<Map<String, Value>>, StoreError>;

    async fn delete_embedded(
        &self,
        scene_id: &str,
        kind: EmbeddedKind,
        ids: &[String],
    ) -> Result<(), StoreError>;

    /// Every folder document.
    async fn folders(&self) -> Result<Vec<Document>, StoreError>;

    /// Scenes whose `folder` is `folder_id`, in no particular order.
    async fn folder_scenes(&self, folder_id: &str) -> Result<Vec<Document>, StoreError>;

    /// The scene presented to players, if any.
    async fn presented_scene_id(&self) -> Result<Option<String>, StoreError>;

    /// The scene the operator's own client is looking at, if any.
    async fn viewed_scene_id(&self) -> Result<Option<String>, StoreError>;
}

/// Key/value settings, world- or client-scoped.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn get_setting(&self, scope: SettingScope, key: &str)
    -> Result<Option<Value>, StoreError>;

    async fn set_setting(
        &self,
        scope: SettingScope,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError>;
}

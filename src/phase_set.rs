//! Persisted phase configuration of one scene folder.
//!
//! A `PhaseSet` wraps a folder document. Its configuration lives in the
//! folder's module flags:
//!
//! | Flag                | Type                 | Default                   |
//! |---------------------|----------------------|---------------------------|
//! | `isPhaseFolder`     | bool                 | true (marks the folder)   |
//! | `currentPhaseIndex` | integer              | 0                         |
//! | `phaseSceneIds`     | list of scene ids    | folder scenes, by name    |
//! | `skippedSceneIds`   | list of scene ids    | empty                     |
//! | `mergeTokens`       | bool                 | true                      |
//! | `masterSceneId`     | scene id or null     | null                      |
//! | `phaseLabels`       | scene uuid -> label  | empty (keyed)             |
//!
//! Setters only stage changes; [`PhaseSet::save`] writes them in one update.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};

use crate::errors::{PhaseyError, Result};
use crate::flags::{FlagSetting, FlaggedDocument};
use crate::store::{Document, DocumentKind, DocumentStore};

pub const IS_PHASE_FOLDER: &str = "isPhaseFolder";
pub const CURRENT_PHASE_INDEX: &str = "currentPhaseIndex";
pub const PHASE_SCENE_IDS: &str = "phaseSceneIds";
pub const SKIPPED_SCENE_IDS: &str = "skippedSceneIds";
pub const MERGE_TOKENS: &str = "mergeTokens";
pub const MASTER_SCENE_ID: &str = "masterSceneId";
pub const PHASE_LABELS: &str = "phaseLabels";

/// Flags kept on a phase folder.
pub static FOLDER_FLAGS: &[FlagSetting] = &[
    FlagSetting::plain(IS_PHASE_FOLDER, || json!(true)),
    FlagSetting::plain(CURRENT_PHASE_INDEX, || json!(0)),
    FlagSetting::plain(PHASE_SCENE_IDS, || json!([])),
    FlagSetting::plain(SKIPPED_SCENE_IDS, || json!([])),
    FlagSetting::plain(MERGE_TOKENS, || json!(true)),
    FlagSetting::plain(MASTER_SCENE_ID, || Value::Null),
    FlagSetting::keyed(PHASE_LABELS, || json!({})),
];

/// Key of a scene in the `phaseLabels` map.
fn label_key(scene_id: &str) -> String {
    format!("{}.{}", DocumentKind::Scene, scene_id)
}

/// Phase configuration of one folder.
pub struct PhaseSet {
    folder: FlaggedDocument,
    store: Arc<dyn DocumentStore>,
    current_phase_index: usize,
    phase_scene_ids: Vec<String>,
    skipped_scene_ids: Vec<String>,
    merge_tokens: bool,
    master_scene_id: Option<String>,
    phase_labels: BTreeMap<String, String>,
}

impl std::fmt::Debug for PhaseSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseSet")
            .field("id", &self.id())
            .field("current_phase_index", &self.current_phase_index)
            .field("phase_scene_ids", &self.phase_scene_ids)
            .field("skipped_scene_ids", &self.skipped_scene_ids)
            .field("merge_tokens", &self.merge_tokens)
            .field("master_scene_id", &self.master_scene_id)
            .finish()
    }
}

impl PhaseSet {
    /// Load the phase set of a folder.
    ///
    /// A folder that was never configured gets default configuration, persisted
    /// immediately. A configured folder whose scene membership no longer matches
    /// `phase_scene_ids` is reset to defaults, also persisted immediately.
    pub async fn load_by_id(store: Arc<dyn DocumentStore>, id: &str) -> Result<Self> {
        let doc = store
            .get(DocumentKind::Folder, id)
            .await?
            .ok_or_else(|| PhaseyError::not_found(DocumentKind::Folder, id))?;

        let folder = FlaggedDocument::new(doc, FOLDER_FLAGS);
        let marked = folder.is_marked(IS_PHASE_FOLDER);
        let mut set = Self::from_flags(folder, store);

        if !marked {
            tracing::info!(folder = %set.name(), "initializing phase folder");
            set.folder.stage(IS_PHASE_FOLDER, json!(true));
            set.reset_to_defaults().await?;
            set.save().await?;
        } else if !set.membership_matches().await? {
            tracing::info!(
                folder = %set.name(),
                "folder scenes changed, resetting phase configuration"
            );
            set.reset_to_defaults().await?;
            set.save().await?;
        }

        Ok(set)
    }

    fn from_flags(folder: FlaggedDocument, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            current_phase_index: folder.get_as(CURRENT_PHASE_INDEX),
            phase_scene_ids: folder.get_as(PHASE_SCENE_IDS),
            skipped_scene_ids: folder.get_as(SKIPPED_SCENE_IDS),
            merge_tokens: folder.get_as::<Option<bool>>(MERGE_TOKENS).unwrap_or(true),
            master_scene_id: folder.get_as(MASTER_SCENE_ID),
            phase_labels: folder.get_as(PHASE_LABELS),
            folder,
            store,
        }
    }

    /// Scene ids currently inside the folder, excluding the master, sorted by name.
    async fn live_scene_ids(&self) -> Result<Vec<String>> {
        let mut scenes: Vec<Document> = self
            .store
            .folder_scenes(self.id())
            .await?
            .into_iter()
            .filter(|s| Some(s.id()) != self.master_scene_id.as_deref())
            .collect();
        scenes.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
        Ok(scenes.into_iter().map(|s| s.id().to_string()).collect())
    }

    async fn membership_matches(&self) -> Result<bool> {
        let mut live = self.live_scene_ids().await?;
        let mut configured = self.phase_scene_ids.clone();
        live.sort();
        configured.sort();
        Ok(live == configured)
    }

    /// Stage the default configuration: every folder scene in name order, none
    /// skipped, first phase current, tokens merged, no master, no labels.
    pub async fn reset_to_defaults(&mut self) -> Result<()> {
        self.set_master_scene_id(None);
        let ids = self.live_scene_ids().await?;
        self.set_phase_scene_ids(ids);
        self.set_skipped_scene_ids(Vec::new());
        self.set_current_phase_index(0);
        self.set_merge_tokens(true);
        self.set_phase_labels(BTreeMap::new());
        Ok(())
    }

    /// Persist staged changes. A failed save keeps them staged for a retry.
    pub async fn save(&mut self) -> Result<()> {
        self.folder.save(self.store.as_ref()).await?;
        Ok(())
    }

    pub fn has_pending_changes(&self) -> bool {
        self.folder.has_pending()
    }

    pub fn id(&self) -> &str {
        self.folder.document().id()
    }

    pub fn uuid(&self) -> String {
        self.folder.document().uuid()
    }

    pub fn name(&self) -> &str {
        self.folder.document().name()
    }

    pub fn current_phase_index(&self) -> usize {
        self.current_phase_index
    }

    pub fn set_current_phase_index(&mut self, index: usize) {
        self.current_phase_index = index;
        self.folder.stage(CURRENT_PHASE_INDEX, json!(index));
    }

    pub fn phase_scene_ids(&self) -> &[String] {
        &self.phase_scene_ids
    }

    pub fn set_phase_scene_ids(&mut self, ids: Vec<String>) {
        self.folder.stage(PHASE_SCENE_IDS, json!(ids));
        self.phase_scene_ids = ids;
    }

    pub fn skipped_scene_ids(&self) -> &[String] {
        &self.skipped_scene_ids
    }

    pub fn set_skipped_scene_ids(&mut self, ids: Vec<String>) {
        self.folder.stage(SKIPPED_SCENE_IDS, json!(ids));
        self.skipped_scene_ids = ids;
    }

    pub fn is_skipped(&self, scene_id: &str) -> bool {
        self.skipped_scene_ids.iter().any(|s| s == scene_id)
    }

    pub fn merge_tokens(&self) -> bool {
        self.merge_tokens
    }

    pub fn set_merge_tokens(&mut self, merge: bool) {
        self.merge_tokens = merge;
        self.folder.stage(MERGE_TOKENS, json!(merge));
    }

    pub fn master_scene_id(&self) -> Option<&str> {
        self.master_scene_id.as_deref()
    }

    pub fn set_master_scene_id(&mut self, id: Option<String>) {
        self.folder.stage(MASTER_SCENE_ID, json!(id));
        self.master_scene_id = id;
    }

    /// Labels keyed by scene uuid.
    pub fn phase_labels(&self) -> &BTreeMap<String, String> {
        &self.phase_labels
    }

    pub fn label_for(&self, scene_id: &str) -> Option<&str> {
        self.phase_labels
            .get(&label_key(scene_id))
            .map(String::as_str)
    }

    /// Replace every label. Labels missing from `labels` are staged for removal.
    pub fn set_phase_labels(&mut self, labels: BTreeMap<String, String>) {
        let removed: Vec<String> = self
            .phase_labels
            .keys()
            .filter(|k| !labels.contains_key(*k))
            .cloned()
            .collect();
        for key in removed {
            self.folder.stage_unset_entry(PHASE_LABELS, &key);
        }
        self.folder.stage(PHASE_LABELS, json!(labels));
        self.phase_labels = labels;
    }

    pub fn set_phase_label(&mut self, scene_id: &str, label: &str) {
        let key = label_key(scene_id);
        self.folder.stage(
            PHASE_LABELS,
            Value::Object(Map::from_iter([(key.clone(), json!(label))])),
        );
        self.phase_labels.insert(key, label.to_string());
    }

    pub fn clear_phase_label(&mut self, scene_id: &str) {
        let key = label_key(scene_id);
        if self.phase_labels.remove(&key).is_some() {
            self.folder.stage_unset_entry(PHASE_LABELS, &key);
        }
    }

    /// Number of phases that are not skipped.
    pub fn valid_phase_count(&self) -> usize {
        self.phase_scene_ids
            .iter()
            .filter(|id| !self.is_skipped(id))
            .count()
    }

    /// Phase scenes in cycle order, excluding the master and any id that no
    /// longer resolves.
    pub async fn scenes(&self) -> Result<Vec<Document>> {
        let mut scenes = Vec::with_capacity(self.phase_scene_ids.len());
        for id in &self.phase_scene_ids {
            if Some(id.as_str()) == self.master_scene_id.as_deref() {
                continue;
            }
            match self.store.get(DocumentKind::Scene, id).await? {
                Some(scene) => scenes.push(scene),
                None => tracing::warn!(scene = %id, "phase scene no longer exists"),
            }
        }
        Ok(scenes)
    }

    /// The scene at the current phase index, if it resolves.
    pub async fn current_phase(&self) -> Result<Option<Document>> {
        match self.phase_scene_ids.get(self.current_phase_index) {
            Some(id) => Ok(self.store.get(DocumentKind::Scene, id).await?),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StoreError;
    use crate::flags::MODULE_ID;
    use crate::store::MemoryWorld;

    async fn world_with_folder(names: &[&str]) -> (Arc<MemoryWorld>, String, Vec<String>) {
        let world = Arc::new(MemoryWorld::new());
        let folder = world.create_folder("Dungeon").await.unwrap();
        let mut ids = Vec::new();
        for name in names {
            let scene = world
                .create_scene(name, Some(folder.id()), Map::new())
                .await
                .unwrap();
            ids.push(scene.id().to_string());
        }
        (world, folder.id().to_string(), ids)
    }

    #[tokio::test]
    async fn test_first_load_initializes_and_persists_defaults() {
        let (world, folder_id, ids) = world_with_folder(&["B", "A", "C"]).await;

        let set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        // sorted by name: A, B, C
        assert_eq!(set.phase_scene_ids(), &[ids[1].clone(), ids[0].clone(), ids[2].clone()]);
        assert!(set.skipped_scene_ids().is_empty());
        assert_eq!(set.current_phase_index(), 0);
        assert!(set.merge_tokens());
        assert_eq!(set.master_scene_id(), None);
        assert!(!set.has_pending_changes());

        let stored = world
            .get(DocumentKind::Folder, &folder_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.get_flag(MODULE_ID, IS_PHASE_FOLDER), Some(&json!(true)));
        assert_eq!(stored.get_flag(MODULE_ID, PHASE_SCENE_IDS).unwrap().as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_load_missing_folder_is_not_found() {
        let world = Arc::new(MemoryWorld::new());
        let err = PhaseSet::load_by_id(world, "nope").await.unwrap_err();
        assert!(matches!(
            err,
            PhaseyError::NotFound {
                kind: DocumentKind::Folder,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_setters_round_trip_through_save() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B", "C"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();

        let reordered = vec![ids[2].clone(), ids[0].clone(), ids[1].clone()];
        set.set_phase_scene_ids(reordered.clone());
        set.set_skipped_scene_ids(vec![ids[0].clone()]);
        set.set_merge_tokens(false);
        set.set_current_phase_index(2);
        assert!(set.has_pending_changes());
        set.save().await.unwrap();

        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.phase_scene_ids(), reordered.as_slice());
        assert_eq!(reloaded.skipped_scene_ids(), &[ids[0].clone()]);
        assert!(!reloaded.merge_tokens());
        assert_eq!(reloaded.current_phase_index(), 2);
    }

    #[tokio::test]
    async fn test_setters_do_not_touch_store_before_save() {
        let (world, folder_id, _) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_merge_tokens(false);

        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert!(reloaded.merge_tokens());
    }

    #[tokio::test]
    async fn test_membership_change_resets_configuration() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_phase_scene_ids(vec![ids[1].clone(), ids[0].clone()]);
        set.set_skipped_scene_ids(vec![ids[1].clone()]);
        set.set_merge_tokens(false);
        set.set_current_phase_index(1);
        set.save().await.unwrap();

        let added = world
            .create_scene("C", Some(&folder_id), Map::new())
            .await
            .unwrap();

        let reloaded = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        assert_eq!(
            reloaded.phase_scene_ids(),
            &[ids[0].clone(), ids[1].clone(), added.id().to_string()]
        );
        assert!(reloaded.skipped_scene_ids().is_empty());
        assert_eq!(reloaded.current_phase_index(), 0);
        assert!(reloaded.merge_tokens());
    }

    #[tokio::test]
    async fn test_deleted_scene_resets_configuration() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B", "C"]).await;
        PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        world.delete(DocumentKind::Scene, &ids[1]).await.unwrap();

        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.phase_scene_ids(), &[ids[0].clone(), ids[2].clone()]);
    }

    #[tokio::test]
    async fn test_master_in_folder_is_not_a_membership_change() {
        let (world, folder_id, _) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        let master = world
            .create_scene("Master", Some(&folder_id), Map::new())
            .await
            .unwrap();
        set.set_master_scene_id(Some(master.id().to_string()));
        set.set_current_phase_index(1);
        set.save().await.unwrap();

        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.current_phase_index(), 1);
        assert_eq!(reloaded.master_scene_id(), Some(master.id()));
        assert_eq!(reloaded.scenes().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_save_can_be_retried() {
        let (world, folder_id, _) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_current_phase_index(1);

        world.reject_next_updates(1);
        let err = set.save().await.unwrap_err();
        assert!(matches!(
            err,
            PhaseyError::PersistenceFailure(StoreError::Rejected(_))
        ));
        assert!(set.has_pending_changes());

        set.save().await.unwrap();
        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.current_phase_index(), 1);
    }

    #[tokio::test]
    async fn test_labels_with_dotted_keys_persist() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_phase_label(&ids[0], "Calm");
        set.set_phase_label(&ids[1], "Storm");
        set.save().await.unwrap();

        let mut reloaded = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        assert_eq!(reloaded.label_for(&ids[0]), Some("Calm"));
        assert_eq!(reloaded.label_for(&ids[1]), Some("Storm"));

        reloaded.clear_phase_label(&ids[0]);
        reloaded.save().await.unwrap();
        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.label_for(&ids[0]), None);
        assert_eq!(reloaded.phase_labels().len(), 1);
    }

    #[tokio::test]
    async fn test_label_set_then_cleared_before_save_stays_cleared() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_phase_label(&ids[0], "Calm");
        set.clear_phase_label(&ids[0]);
        set.set_phase_label(&ids[1], "Storm");
        set.save().await.unwrap();
        assert_eq!(set.label_for(&ids[0]), None);

        let mut reloaded = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        assert_eq!(reloaded.label_for(&ids[0]), None);
        assert_eq!(reloaded.label_for(&ids[1]), Some("Storm"));

        // cleared then set again in one session keeps the new label
        reloaded.clear_phase_label(&ids[1]);
        reloaded.set_phase_label(&ids[1], "Squall");
        reloaded.save().await.unwrap();
        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert_eq!(reloaded.label_for(&ids[1]), Some("Squall"));
    }

    #[tokio::test]
    async fn test_reset_clears_labels() {
        let (world, folder_id, ids) = world_with_folder(&["A"]).await;
        let mut set = PhaseSet::load_by_id(world.clone(), &folder_id).await.unwrap();
        set.set_phase_label(&ids[0], "Only");
        set.save().await.unwrap();

        set.reset_to_defaults().await.unwrap();
        set.save().await.unwrap();
        let reloaded = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        assert!(reloaded.phase_labels().is_empty());
    }

    #[tokio::test]
    async fn test_current_phase_and_valid_count() {
        let (world, folder_id, ids) = world_with_folder(&["A", "B", "C"]).await;
        let mut set = PhaseSet::load_by_id(world, &folder_id).await.unwrap();
        set.set_skipped_scene_ids(vec![ids[1].clone()]);
        set.set_current_phase_index(2);

        assert_eq!(set.valid_phase_count(), 2);
        assert!(set.is_skipped(&ids[1]));
        assert_eq!(set.current_phase().await.unwrap().unwrap().name(), "C");
    }
}

//! Phase sequencing: activating a phase folder and advancing through it.
//!
//! The controller owns the active-sequence pointer (`selectedFolderId`) and
//! drives the master scene. Each advance picks the next phase that is not
//! skipped, materializes the master on first use and merges the phase into it.
//! Operations are serialized through one async mutex.

pub mod merge;
pub mod state;

pub use merge::{MergeReport, MergeStrategy};
pub use state::SequenceState;

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::cycle::{NextPhase, next_phase_index};
use crate::errors::{PhaseyError, Result};
use crate::flags::MODULE_ID;
use crate::notify::Notifier;
use crate::phase_set::{IS_PHASE_FOLDER, MASTER_SCENE_ID, PhaseSet};
use crate::settings::{ModuleSettings, SettingKey};
use crate::store::{Document, DocumentKind, DocumentStore, SettingsStore};

/// Result of a successful advance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The phase at `index` was merged into the master
    Advanced {
        index: usize,
        scene_id: String,
        master_scene_id: String,
        master_created: bool,
        report: MergeReport,
    },
    /// Only the current phase is valid; nothing changed
    OnlyValidPhase { index: usize },
}

impl AdvanceOutcome {
    pub fn index(&self) -> usize {
        match self {
            AdvanceOutcome::Advanced { index, .. } | AdvanceOutcome::OnlyValidPhase { index } => {
                *index
            }
        }
    }
}

pub struct PhaseController {
    documents: Arc<dyn DocumentStore>,
    settings: ModuleSettings,
    notifier: Arc<dyn Notifier>,
    strategy: MergeStrategy,
    in_flight: Mutex<()>,
}

impl PhaseController {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        settings: Arc<dyn SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            documents,
            settings: ModuleSettings::new(settings),
            notifier,
            strategy: MergeStrategy::default(),
            in_flight: Mutex::new(()),
        }
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> MergeStrategy {
        self.strategy
    }

    pub fn documents(&self) -> Arc<dyn DocumentStore> {
        Arc::clone(&self.documents)
    }

    /// Id of the active phase folder.
    pub async fn active_folder_id(&self) -> Result<Option<String>> {
        Ok(self.settings.get_id(SettingKey::SelectedFolderId).await?)
    }

    /// Load a phase set by folder id, running reconciliation.
    pub async fn load_phase_set(&self, folder_id: &str) -> Result<PhaseSet> {
        PhaseSet::load_by_id(self.documents(), folder_id).await
    }

    /// Make `phase_set` the active sequence and apply its first phase.
    ///
    /// On return `phase_set` reflects what was persisted, including the master.
    pub async fn activate(&self, phase_set: &mut PhaseSet) -> Result<AdvanceOutcome> {
        let _guard = self.in_flight.lock().await;
        tracing::info!(folder = %phase_set.name(), "activating phase sequence");

        self.settings
            .set_id(SettingKey::SelectedFolderId, Some(phase_set.id()))
            .await?;
        phase_set.set_current_phase_index(0);
        phase_set.save().await?;

        let outcome = self.advance_locked(0).await?;
        let folder_id = phase_set.id().to_string();
        *phase_set = self.load_phase_set(&folder_id).await?;
        Ok(outcome)
    }

    /// Advance the active sequence by `steps` (negative steps go back).
    pub async fn advance_phase(&self, steps: i64) -> Result<AdvanceOutcome> {
        let _guard = self.in_flight.lock().await;
        self.advance_locked(steps).await
    }

    async fn advance_locked(&self, steps: i64) -> Result<AdvanceOutcome> {
        let folder_id = self
            .active_folder_id()
            .await?
            .ok_or(PhaseyError::NoSelection)?;
        let mut set = self.load_phase_set(&folder_id).await?;
        let current = set.current_phase_index();

        let index = match next_phase_index(
            set.phase_scene_ids(),
            set.skipped_scene_ids(),
            current,
            steps,
        ) {
            NextPhase::Phase(index) => index,
            NextPhase::OnlyValidPhase => {
                tracing::info!(folder = %set.name(), index = current, "only one valid phase");
                self.notifier
                    .warn("There is only one valid phase in this sequence. Nothing to advance to.");
                return Ok(AdvanceOutcome::OnlyValidPhase { index: current });
            }
            NextPhase::NoValidPhases => {
                return Err(PhaseyError::NoValidScenes {
                    folder: set.name().to_string(),
                });
            }
        };

        let scene_id = set.phase_scene_ids()[index].clone();
        let phase = self
            .documents
            .get(DocumentKind::Scene, &scene_id)
            .await?
            .ok_or_else(|| PhaseyError::not_found(DocumentKind::Scene, &scene_id))?;

        let (master, master_created) = self.resolve_master(&mut set, &phase).await?;

        // a fresh master already carries the phase's tokens from the clone
        let with_tokens = set.merge_tokens() && !master_created;
        let report = merge::merge_phase(
            self.documents.as_ref(),
            self.strategy,
            &master,
            &phase,
            with_tokens,
        )
        .await?;

        set.set_current_phase_index(index);
        set.save().await?;

        tracing::info!(
            folder = %set.name(),
            from = current,
            to = index,
            phase = %phase.name(),
            master = %master.id(),
            "advanced phase"
        );

        Ok(AdvanceOutcome::Advanced {
            index,
            scene_id,
            master_scene_id: master.id().to_string(),
            master_created,
            report,
        })
    }

    /// Find the master scene, cloning `phase` into a new one when the recorded
    /// master is missing. Returns the master and whether it was just created.
    async fn resolve_master(&self, set: &mut PhaseSet, phase: &Document) -> Result<(Document, bool)> {
        if let Some(id) = set.master_scene_id()
            && let Some(master) = self.documents.get(DocumentKind::Scene, id).await?
        {
            return Ok((master, false));
        }

        let mut data = phase.to_clone_data();
        data.insert("name".into(), json!(format!("{} (Master)", set.name())));
        data.insert("folder".into(), Value::Null);
        data.insert("active".into(), json!(false));
        let master = self.documents.create(DocumentKind::Scene, data).await?;
        tracing::info!(folder = %set.name(), master = %master.id(), "created master scene");

        set.set_master_scene_id(Some(master.id().to_string()));
        set.save().await?;
        self.settings
            .set_id(SettingKey::LastMasterSceneId, Some(master.id()))
            .await?;

        let viewed = self.documents.viewed_scene_id().await?;
        if viewed.as_deref() != Some(master.id()) {
            self.notifier.warn(&format!(
                "Created master scene \"{}\". You are not viewing it; switch to it to see phase changes.",
                master.name()
            ));
        }

        Ok((master, true))
    }

    /// True when a sequence is selected and its master is the presented scene.
    pub async fn phase_in_progress(&self) -> Result<bool> {
        let Some(folder_id) = self.active_folder_id().await? else {
            return Ok(false);
        };
        let Some(folder) = self.documents.get(DocumentKind::Folder, &folder_id).await? else {
            return Ok(false);
        };
        let Some(master_id) = folder
            .get_flag(MODULE_ID, MASTER_SCENE_ID)
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
        else {
            return Ok(false);
        };
        let presented = self.documents.presented_scene_id().await?;
        Ok(presented.as_deref() == Some(master_id))
    }

    /// Delete the most recently created master scene and forget it.
    pub async fn cleanup_master_scene(&self) -> Result<()> {
        if let Some(id) = self.settings.get_id(SettingKey::LastMasterSceneId).await? {
            self.delete_scene_if_present(&id).await?;
        }
        self.settings
            .set_id(SettingKey::LastMasterSceneId, None)
            .await?;
        Ok(())
    }

    async fn delete_scene_if_present(&self, id: &str) -> Result<()> {
        if self.documents.get(DocumentKind::Scene, id).await?.is_some() {
            self.documents.delete(DocumentKind::Scene, id).await?;
            tracing::info!(scene = %id, "deleted master scene");
        }
        Ok(())
    }

    /// End the active sequence: delete its master and clear the selection.
    pub async fn deactivate(&self) -> Result<()> {
        let _guard = self.in_flight.lock().await;
        let folder_id = self
            .active_folder_id()
            .await?
            .ok_or(PhaseyError::NoSelection)?;

        match self.load_phase_set(&folder_id).await {
            Ok(mut set) => {
                if let Some(master) = set.master_scene_id().map(str::to_string) {
                    self.delete_scene_if_present(&master).await?;
                    set.set_master_scene_id(None);
                    set.save().await?;
                }
            }
            Err(PhaseyError::NotFound { .. }) => {
                tracing::warn!(folder = %folder_id, "active phase folder no longer exists");
            }
            Err(e) => return Err(e),
        }

        self.cleanup_master_scene().await?;
        self.settings
            .set_id(SettingKey::SelectedFolderId, None)
            .await?;
        tracing::info!(folder = %folder_id, "deactivated phase sequence");
        Ok(())
    }

    /// Lifecycle state of a folder. Lookups only.
    pub async fn sequence_state(&self, folder_id: &str) -> Result<SequenceState> {
        let folder = self
            .documents
            .get(DocumentKind::Folder, folder_id)
            .await?
            .ok_or_else(|| PhaseyError::not_found(DocumentKind::Folder, folder_id))?;

        let marked = folder.get_flag(MODULE_ID, IS_PHASE_FOLDER).and_then(Value::as_bool)
            == Some(true);
        let selected = self.active_folder_id().await?.as_deref() == Some(folder_id);
        let master_exists = match folder
            .get_flag(MODULE_ID, MASTER_SCENE_ID)
            .and_then(Value::as_str)
        {
            Some(id) => self.documents.get(DocumentKind::Scene, id).await?.is_some(),
            None => false,
        };
        Ok(SequenceState::derive(marked, selected, master_exists))
    }
}

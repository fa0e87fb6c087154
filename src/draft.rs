//! Editable working copy of a phase set's configuration.
//!
//! The configure command edits a [`PhaseConfigDraft`] and only writes it back
//! to the folder on [`PhaseConfigDraft::apply`]. Nothing here touches a store
//! until then.

use crate::controller::{AdvanceOutcome, PhaseController};
use crate::errors::Result;
use crate::phase_set::PhaseSet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftEntry {
    pub scene_id: String,
    pub skipped: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhaseConfigDraft {
    scene_ids: Vec<String>,
    skipped_scene_ids: Vec<String>,
    merge_tokens: bool,
    selected: Option<String>,
}

impl PhaseConfigDraft {
    pub fn for_phase_set(set: &PhaseSet) -> Self {
        Self {
            scene_ids: set.phase_scene_ids().to_vec(),
            skipped_scene_ids: set.skipped_scene_ids().to_vec(),
            merge_tokens: set.merge_tokens(),
            selected: None,
        }
    }

    pub fn scene_ids(&self) -> &[String] {
        &self.scene_ids
    }

    pub fn skipped_scene_ids(&self) -> &[String] {
        &self.skipped_scene_ids
    }

    pub fn merge_tokens(&self) -> bool {
        self.merge_tokens
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn entries(&self) -> Vec<DraftEntry> {
        self.scene_ids
            .iter()
            .map(|id| DraftEntry {
                scene_id: id.clone(),
                skipped: self.is_skipped(id),
                selected: self.selected.as_deref() == Some(id.as_str()),
            })
            .collect()
    }

    fn is_skipped(&self, id: &str) -> bool {
        self.skipped_scene_ids.iter().any(|s| s == id)
    }

    fn selected_index(&self) -> Option<usize> {
        let selected = self.selected.as_deref()?;
        self.scene_ids.iter().position(|id| id == selected)
    }

    /// Select a scene for move/skip. `None` clears the selection.
    pub fn select_scene(&mut self, id: Option<&str>) {
        self.selected = id.map(str::to_string);
    }

    /// Move the selected scene by `delta` positions, clamped to the list.
    pub fn move_selected(&mut self, delta: i64) {
        let Some(index) = self.selected_index() else {
            return;
        };
        let last = self.scene_ids.len() as i64 - 1;
        let target = (index as i64 + delta).clamp(0, last) as usize;
        let id = self.scene_ids.remove(index);
        self.scene_ids.insert(target, id);
    }

    /// Skip the selected scene, or unskip it if it already is.
    pub fn toggle_skip(&mut self) {
        let Some(selected) = self.selected.clone() else {
            return;
        };
        if self.is_skipped(&selected) {
            self.skipped_scene_ids.retain(|id| *id != selected);
        } else {
            self.skipped_scene_ids.push(selected);
        }
    }

    pub fn set_merge_tokens(&mut self, merge: bool) {
        self.merge_tokens = merge;
    }

    pub fn disable_up(&self) -> bool {
        matches!(self.selected_index(), None | Some(0))
    }

    pub fn disable_down(&self) -> bool {
        match self.selected_index() {
            None => true,
            Some(index) => index + 1 == self.scene_ids.len(),
        }
    }

    pub fn disable_toggle_skip(&self) -> bool {
        self.selected.is_none()
    }

    pub fn toggle_skip_active(&self) -> bool {
        self.selected.as_deref().is_some_and(|id| self.is_skipped(id))
    }

    pub fn toggle_skip_title(&self) -> &'static str {
        if self.toggle_skip_active() {
            "Unskip"
        } else {
            "Skip"
        }
    }

    /// Write the draft into `set` and save it.
    pub async fn apply(&self, set: &mut PhaseSet) -> Result<()> {
        set.set_phase_scene_ids(self.scene_ids.clone());
        set.set_skipped_scene_ids(self.skipped_scene_ids.clone());
        set.set_merge_tokens(self.merge_tokens);
        set.save().await?;
        tracing::info!(folder = %set.name(), "saved phase configuration");
        Ok(())
    }

    /// [`apply`](Self::apply), then make `set` the active sequence.
    pub async fn apply_and_activate(
        &self,
        set: &mut PhaseSet,
        controller: &PhaseController,
    ) -> Result<AdvanceOutcome> {
        self.apply(set).await?;
        controller.activate(set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(ids: &[&str]) -> PhaseConfigDraft {
        PhaseConfigDraft {
            scene_ids: ids.iter().map(|s| s.to_string()).collect(),
            merge_tokens: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_nothing_selected_disables_everything() {
        let d = draft(&["a", "b"]);
        assert!(d.disable_up());
        assert!(d.disable_down());
        assert!(d.disable_toggle_skip());
        assert!(!d.toggle_skip_active());
        assert_eq!(d.toggle_skip_title(), "Skip");
    }

    #[test]
    fn test_move_is_clamped() {
        let mut d = draft(&["a", "b", "c"]);
        d.select_scene(Some("a"));
        assert!(d.disable_up());
        assert!(!d.disable_down());

        d.move_selected(1);
        assert_eq!(d.scene_ids(), &["b", "a", "c"]);
        d.move_selected(10);
        assert_eq!(d.scene_ids(), &["b", "c", "a"]);
        assert!(d.disable_down());
        d.move_selected(-10);
        assert_eq!(d.scene_ids(), &["a", "b", "c"]);
    }

    #[test]
    fn test_move_without_selection_is_noop() {
        let mut d = draft(&["a", "b"]);
        d.move_selected(1);
        assert_eq!(d.scene_ids(), &["a", "b"]);
        d.select_scene(Some("zzz"));
        d.move_selected(1);
        assert_eq!(d.scene_ids(), &["a", "b"]);
    }

    #[test]
    fn test_toggle_skip() {
        let mut d = draft(&["a", "b"]);
        d.select_scene(Some("b"));
        d.toggle_skip();
        assert_eq!(d.skipped_scene_ids(), &["b"]);
        assert!(d.toggle_skip_active());
        assert_eq!(d.toggle_skip_title(), "Unskip");

        d.toggle_skip();
        assert!(d.skipped_scene_ids().is_empty());
        assert_eq!(d.toggle_skip_title(), "Skip");
    }

    #[test]
    fn test_entries_mark_selection_and_skips() {
        let mut d = draft(&["a", "b"]);
        d.select_scene(Some("a"));
        d.toggle_skip();
        let entries = d.entries();
        assert!(entries[0].selected && entries[0].skipped);
        assert!(!entries[1].selected && !entries[1].skipped);
    }
}

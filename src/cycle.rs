//! Next-phase computation.
//!
//! Steps wrap around the phase list in both directions. When the step lands
//! on a skipped phase the walk continues forward one phase at a time until it
//! finds one that is not skipped.

/// Where an advance should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextPhase {
    /// Move to (or re-apply) the phase at this index
    Phase(usize),
    /// The current phase is the only one not skipped, so moving is a no-op
    OnlyValidPhase,
    /// The list is empty or every phase is skipped
    NoValidPhases,
}

/// Compute the phase reached from `current` after `steps` (negative = backward).
pub fn next_phase_index(
    phase_ids: &[String],
    skipped_ids: &[String],
    current: usize,
    steps: i64,
) -> NextPhase {
    let is_skipped = |index: usize| skipped_ids.contains(&phase_ids[index]);
    let len = phase_ids.len();
    let valid = (0..len).filter(|&i| !is_skipped(i)).count();
    if valid == 0 {
        return NextPhase::NoValidPhases;
    }

    let mut candidate = (current as i64).wrapping_add(steps).rem_euclid(len as i64) as usize;
    while is_skipped(candidate) {
        candidate = (candidate + 1) % len;
    }

    if steps != 0 && valid == 1 && candidate == current {
        return NextPhase::OnlyValidPhase;
    }
    NextPhase::Phase(candidate)
}

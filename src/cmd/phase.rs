//! Phase sequence commands: list, status, configure, activate, advance, deactivate.

use anyhow::{Context, Result};
use console::style;

use phasey::config::PhaseyConfig;
use phasey::controller::{AdvanceOutcome, SequenceState};
use phasey::draft::PhaseConfigDraft;
use phasey::errors::PhaseyError;
use phasey::store::{DocumentKind, DocumentStore};

use super::Session;

/// Edits requested by `phasey configure`.
#[derive(Debug, Default)]
pub struct ConfigureEdits {
    pub moves: Vec<String>,
    pub toggle_skip: Vec<String>,
    pub merge_tokens: Option<bool>,
    pub labels: Vec<String>,
    pub clear_labels: Vec<String>,
    pub activate: bool,
}

/// Save the world whatever the outcome, then surface the outcome.
async fn finish<T>(session: &Session, result: phasey::errors::Result<T>) -> Result<T> {
    session.save().await?;
    Ok(result?)
}

pub async fn cmd_list(config: &PhaseyConfig) -> Result<()> {
    let session = Session::open(config)?;
    let documents = session.controller.documents();
    let mut folders = documents.folders().await?;
    folders.sort_by(|a, b| a.name().cmp(b.name()));

    println!();
    if folders.is_empty() {
        println!("No scene folders. Create one with 'phasey world folder <name>'.");
        println!();
        return Ok(());
    }

    println!("{:<18} {:<24} {:<8} State", "Folder", "Name", "Scenes");
    println!(
        "{:<18} {:<24} {:<8} -----",
        "------------------", "------------------------", "------"
    );
    for folder in &folders {
        let scenes = documents.folder_scenes(folder.id()).await?.len();
        let state = session.controller.sequence_state(folder.id()).await?;
        let state = match state {
            SequenceState::Active => style(state.to_string()).green().bold(),
            SequenceState::ConfiguredInactive => style(state.to_string()).cyan(),
            SequenceState::Unconfigured => style(state.to_string()).dim(),
        };
        println!(
            "{:<18} {:<24} {:<8} {}",
            folder.id(),
            folder.name(),
            scenes,
            state
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_status(config: &PhaseyConfig) -> Result<()> {
    let session = Session::open(config)?;
    let controller = &session.controller;

    println!();
    println!("Easy Phasey Status");
    println!("==================");
    println!();

    let Some(folder_id) = controller.active_folder_id().await? else {
        println!("Active sequence: none");
        println!();
        println!("Run 'phasey activate <folder>' to start one.");
        println!();
        return Ok(());
    };

    let set = controller.load_phase_set(&folder_id).await;
    let set = finish(&session, set).await?;
    println!("Active sequence: {} ({})", set.name(), set.id());
    match set.master_scene_id() {
        Some(id) => println!("Master scene:    {}", id),
        None => println!("Master scene:    not created"),
    }
    println!(
        "In progress:     {}",
        if controller.phase_in_progress().await? {
            "yes"
        } else {
            "no (master is not presented)"
        }
    );
    println!("Merge tokens:    {}", set.merge_tokens());
    println!();

    let documents = controller.documents();
    for (index, id) in set.phase_scene_ids().iter().enumerate() {
        let name = documents
            .get(DocumentKind::Scene, id)
            .await?
            .map(|s| s.name().to_string())
            .unwrap_or_default();
        let marker = if index == set.current_phase_index() {
            style(">").green().bold().to_string()
        } else {
            " ".to_string()
        };
        let label = set
            .label_for(id)
            .map(|l| format!(" \"{}\"", l))
            .unwrap_or_default();
        let skipped = if set.is_skipped(id) {
            style(" (skipped)").dim().to_string()
        } else {
            String::new()
        };
        println!("{} {:>2}. {:<24} {}{}{}", marker, index + 1, name, id, label, skipped);
    }
    println!();
    Ok(())
}

pub async fn cmd_configure(config: &PhaseyConfig, folder: &str, edits: ConfigureEdits) -> Result<()> {
    let session = Session::open(config)?;
    let controller = &session.controller;

    let set = controller.load_phase_set(folder).await;
    let mut set = finish(&session, set).await?;
    let mut draft = PhaseConfigDraft::for_phase_set(&set);

    for arg in &edits.moves {
        let (scene, delta) = arg
            .rsplit_once(':')
            .with_context(|| format!("Invalid move '{}': expected SCENE:DELTA", arg))?;
        let delta: i64 = delta
            .parse()
            .with_context(|| format!("Invalid move delta in '{}'", arg))?;
        ensure_in_draft(&draft, scene)?;
        draft.select_scene(Some(scene));
        draft.move_selected(delta);
    }
    for scene in &edits.toggle_skip {
        ensure_in_draft(&draft, scene)?;
        draft.select_scene(Some(scene.as_str()));
        draft.toggle_skip();
    }
    draft.select_scene(None);
    if let Some(merge) = edits.merge_tokens {
        draft.set_merge_tokens(merge);
    }

    for arg in &edits.labels {
        let (scene, label) = arg
            .split_once('=')
            .with_context(|| format!("Invalid label '{}': expected SCENE=LABEL", arg))?;
        ensure_in_draft(&draft, scene)?;
        set.set_phase_label(scene, label);
    }
    for scene in &edits.clear_labels {
        set.clear_phase_label(scene);
    }

    if edits.activate {
        let outcome = draft.apply_and_activate(&mut set, controller).await;
        let outcome = finish(&session, outcome).await?;
        println!("Configuration saved.");
        print_outcome(&outcome);
    } else {
        let applied = draft.apply(&mut set).await;
        finish(&session, applied).await?;
        println!("Configuration saved.");
    }
    Ok(())
}

fn ensure_in_draft(draft: &PhaseConfigDraft, scene: &str) -> Result<()> {
    if draft.scene_ids().iter().any(|id| id == scene) {
        Ok(())
    } else {
        Err(PhaseyError::InvalidConfig(format!(
            "Scene {} is not a phase of this folder",
            scene
        ))
        .into())
    }
}

pub async fn cmd_activate(config: &PhaseyConfig, folder: &str) -> Result<()> {
    let session = Session::open(config)?;
    let set = session.controller.load_phase_set(folder).await;
    let mut set = finish(&session, set).await?;
    let outcome = session.controller.activate(&mut set).await;
    let outcome = finish(&session, outcome).await?;
    println!("Activated {}.", set.name());
    print_outcome(&outcome);
    Ok(())
}

pub async fn cmd_advance(config: &PhaseyConfig, steps: i64) -> Result<()> {
    let session = Session::open(config)?;
    let outcome = session.controller.advance_phase(steps).await;
    let outcome = finish(&session, outcome).await?;
    print_outcome(&outcome);
    Ok(())
}

pub async fn cmd_deactivate(config: &PhaseyConfig) -> Result<()> {
    let session = Session::open(config)?;
    let result = session.controller.deactivate().await;
    finish(&session, result).await?;
    println!("Deactivated. The master scene was removed.");
    Ok(())
}

fn print_outcome(outcome: &AdvanceOutcome) {
    match outcome {
        AdvanceOutcome::Advanced {
            index,
            scene_id,
            master_scene_id,
            master_created,
            ..
        } => {
            if *master_created {
                println!("Created master scene {}.", master_scene_id);
            }
            println!(
                "Phase {} ({}) applied to master {}.",
                index + 1,
                scene_id,
                master_scene_id
            );
        }
        AdvanceOutcome::OnlyValidPhase { index } => {
            println!("Still on phase {}.", index + 1);
        }
    }
}

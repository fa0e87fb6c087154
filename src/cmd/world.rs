//! World file editing: `phasey world`.

use anyhow::{Context, Result};
use serde_json::{Map, Value, json};

use phasey::config::PhaseyConfig;
use phasey::store::{DocumentKind, DocumentStore, EmbeddedKind, MemoryWorld};

use super::super::WorldCommands;
use super::Session;

pub async fn cmd_world(config: &PhaseyConfig, command: WorldCommands) -> Result<()> {
    if let WorldCommands::Init { force } = command {
        let path = config.world_path();
        if path.exists() && !force {
            println!("World file already exists at {}", path.display());
            println!("Use --force to overwrite it.");
            return Ok(());
        }
        MemoryWorld::new().save(&path).await?;
        println!("Initialized world at {}", path.display());
        return Ok(());
    }

    let session = Session::open(config)?;
    let world = &session.world;

    match command {
        WorldCommands::Init { .. } => {}
        WorldCommands::Folder { name } => {
            let folder = world.create_folder(&name).await?;
            println!("{}", folder.id());
        }
        WorldCommands::Scene {
            name,
            folder,
            fields,
        } => {
            if let Some(ref id) = folder
                && world.get(DocumentKind::Folder, id).await?.is_none()
            {
                anyhow::bail!("Folder {} not found", id);
            }
            let fields = parse_fields(&fields)?;
            let scene = world.create_scene(&name, folder.as_deref(), fields).await?;
            println!("{}", scene.id());
        }
        WorldCommands::Token { scene, name, x, y } => {
            let data = json!({"name": name, "x": x, "y": y});
            let created = world
                .create_embedded(&scene, EmbeddedKind::Token, vec![object(data)])
                .await?;
            for token in created {
                println!("{}", token.get("_id").and_then(Value::as_str).unwrap_or(""));
            }
        }
        WorldCommands::Present { scene } => world.present(&scene).await?,
        WorldCommands::View { scene } => world.view(&scene).await?,
        WorldCommands::Show { id } => {
            let doc = match world.get(DocumentKind::Scene, &id).await? {
                Some(doc) => doc,
                None => world
                    .get(DocumentKind::Folder, &id)
                    .await?
                    .with_context(|| format!("No scene or folder with id {}", id))?,
            };
            let content = serde_json::to_string_pretty(&doc.source)
                .context("Failed to serialize document")?;
            println!("{}", content);
        }
    }

    session.save().await
}

/// Parse `key=value` pairs. Values are JSON when they parse, text otherwise.
fn parse_fields(fields: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for field in fields {
        let (key, raw) = field
            .split_once('=')
            .with_context(|| format!("Invalid field '{}': expected KEY=VALUE", field))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.to_string(), value);
    }
    Ok(map)
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

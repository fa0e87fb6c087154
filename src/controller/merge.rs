//! Merging a phase scene into the master scene.
//!
//! Two strategies are available:
//!
//! | Strategy           | Scene fields                     | Embedded documents                      |
//! |--------------------|----------------------------------|-----------------------------------------|
//! | `overwrite`        | full allow-list, one update      | carried by the field update             |
//! | `replace-embedded` | display fields only, one update  | per collection delete/create            |
//!
//! Both leave `active`, `name` and `tokens` alone; tokens are handled by
//! [`merge_tokens`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StoreError;
use crate::flags::MODULE_ID;
use crate::store::object_path::get_path;
use crate::store::{Document, DocumentKind, DocumentStore, EmbeddedKind};

/// Scene fields copied from the phase onto the master by `overwrite`.
pub const MERGED_SCENE_FIELDS: &[&str] = &[
    "background",
    "backgroundColor",
    "darkness",
    "environment",
    "drawings",
    "fog",
    "foreground",
    "foregroundElevation",
    "grid",
    "height",
    "width",
    "initial",
    "journal",
    "journalEntryPage",
    "lights",
    "navigation",
    "navName",
    "navOrder",
    "notes",
    "ownership",
    "padding",
    "playlist",
    "playlistSound",
    "regions",
    "sort",
    "sounds",
    "templates",
    "thumb",
    "tiles",
    "tokenVision",
    "walls",
    "weather",
];

/// Scene fields copied by `replace-embedded`.
pub const DISPLAY_FIELDS: &[&str] = &[
    "background",
    "backgroundColor",
    "foreground",
    "weather",
    "playlistSound",
    "tokenVision",
];

/// Collections rebuilt by `replace-embedded`, in order.
pub const REPLACED_COLLECTIONS: &[EmbeddedKind] = &[
    EmbeddedKind::AmbientLight,
    EmbeddedKind::AmbientSound,
    EmbeddedKind::Note,
    EmbeddedKind::Drawing,
    EmbeddedKind::MeasuredTemplate,
    EmbeddedKind::Tile,
    EmbeddedKind::Wall,
];

/// Embedded documents flagged with this survive `replace-embedded`.
pub const PERSIST_FLAG: &str = "persist";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStrategy {
    /// Overwrite the full field allow-list in one update (default)
    #[default]
    Overwrite,
    /// Copy display fields, then rebuild each embedded collection
    ReplaceEmbedded,
}

impl std::fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeStrategy::Overwrite => write!(f, "overwrite"),
            MergeStrategy::ReplaceEmbedded => write!(f, "replace-embedded"),
        }
    }
}

impl std::str::FromStr for MergeStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(MergeStrategy::Overwrite),
            "replace-embedded" | "replace_embedded" => Ok(MergeStrategy::ReplaceEmbedded),
            _ => anyhow::bail!(
                "Invalid merge strategy '{}'. Valid values: overwrite, replace-embedded",
                s
            ),
        }
    }
}

/// What a merge did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub fields_changed: bool,
    pub tokens_added: usize,
    pub documents_deleted: usize,
    pub documents_created: usize,
}

/// Build the update copying `fields` from `phase`. Fields the phase lacks are
/// written as `null` so the master mirrors the phase.
pub fn field_overwrite(phase: &Document, fields: &[&str]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| {
            let value = phase.field(field).cloned().unwrap_or(Value::Null);
            (field.to_string(), value)
        })
        .collect()
}

/// Copy every token of `phase` onto the master, keeping the master's tokens.
pub async fn merge_tokens(
    store: &dyn DocumentStore,
    master_id: &str,
    phase: &Document,
) -> Result<usize, StoreError> {
    let copies = copies_of(phase, EmbeddedKind::Token);
    if copies.is_empty() {
        return Ok(0);
    }
    let created = store
        .create_embedded(master_id, EmbeddedKind::Token, copies)
        .await?;
    Ok(created.len())
}

fn copies_of(scene: &Document, kind: EmbeddedKind) -> Vec<Map<String, Value>> {
    scene
        .embedded(kind)
        .into_iter()
        .map(|doc| {
            let mut copy = doc.clone();
            copy.remove("_id");
            copy
        })
        .collect()
}

fn is_persistent(doc: &Map<String, Value>) -> bool {
    get_path(doc, &format!("flags.{MODULE_ID}.{PERSIST_FLAG}")).and_then(Value::as_bool)
        == Some(true)
}

/// Rebuild one embedded collection of the master from the phase. Documents on
/// the master flagged `persist` are kept. Walls are created before the old ones
/// are deleted so vision never opens up between the two calls.
pub async fn replace_embedded(
    store: &dyn DocumentStore,
    master: &Document,
    phase: &Document,
    kind: EmbeddedKind,
) -> Result<(usize, usize), StoreError> {
    let to_delete: Vec<String> = master
        .embedded(kind)
        .into_iter()
        .filter(|doc| !is_persistent(doc))
        .filter_map(|doc| doc.get("_id").and_then(Value::as_str).map(str::to_string))
        .collect();
    let to_create = copies_of(phase, kind);
    let (deleted, created) = (to_delete.len(), to_create.len());

    if kind == EmbeddedKind::Wall {
        if !to_create.is_empty() {
            store.create_embedded(master.id(), kind, to_create).await?;
        }
        if !to_delete.is_empty() {
            store.delete_embedded(master.id(), kind, &to_delete).await?;
        }
    } else {
        if !to_delete.is_empty() {
            store.delete_embedded(master.id(), kind, &to_delete).await?;
        }
        if !to_create.is_empty() {
            store.create_embedded(master.id(), kind, to_create).await?;
        }
    }
    Ok((deleted, created))
}

/// Merge `phase` into `master` with the given strategy.
pub async fn merge_phase(
    store: &dyn DocumentStore,
    strategy: MergeStrategy,
    master: &Document,
    phase: &Document,
    with_tokens: bool,
) -> Result<MergeReport, StoreError> {
    let mut report = MergeReport::default();

    if with_tokens {
        report.tokens_added = merge_tokens(store, master.id(), phase).await?;
    }

    match strategy {
        MergeStrategy::Overwrite => {
            let update = field_overwrite(phase, MERGED_SCENE_FIELDS);
            report.fields_changed = store
                .update(DocumentKind::Scene, master.id(), update)
                .await?
                .is_some();
        }
        MergeStrategy::ReplaceEmbedded => {
            let update = field_overwrite(phase, DISPLAY_FIELDS);
            report.fields_changed = store
                .update(DocumentKind::Scene, master.id(), update)
                .await?
                .is_some();
            for &kind in REPLACED_COLLECTIONS {
                let (deleted, created) = replace_embedded(store, master, phase, kind).await?;
                report.documents_deleted += deleted;
                report.documents_created += created;
            }
        }
    }

    tracing::debug!(
        master = %master.id(),
        phase = %phase.id(),
        strategy = %strategy,
        ?report,
        "merged phase into master"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryWorld;
    use serde_json::json;

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_field_overwrite_never_touches_identity_or_tokens() {
        assert!(!MERGED_SCENE_FIELDS.contains(&"name"));
        assert!(!MERGED_SCENE_FIELDS.contains(&"active"));
        assert!(!MERGED_SCENE_FIELDS.contains(&"tokens"));
        assert!(!DISPLAY_FIELDS.contains(&"tokens"));
    }

    #[test]
    fn test_field_overwrite_nulls_missing_fields() {
        let phase = Document::new(
            DocumentKind::Scene,
            fields(json!({"_id": "p", "name": "P", "weather": "rain"})),
        );
        let update = field_overwrite(&phase, &["weather", "fog"]);
        assert_eq!(Value::Object(update), json!({"weather": "rain", "fog": null}));
    }

    #[test]
    fn test_merge_strategy_parse_and_display() {
        assert_eq!(
            "replace-embedded".parse::<MergeStrategy>().unwrap(),
            MergeStrategy::ReplaceEmbedded
        );
        assert_eq!("Overwrite".parse::<MergeStrategy>().unwrap(), MergeStrategy::Overwrite);
        assert!("swap".parse::<MergeStrategy>().is_err());
        assert_eq!(MergeStrategy::ReplaceEmbedded.to_string(), "replace-embedded");
    }

    #[tokio::test]
    async fn test_overwrite_copies_fields_and_keeps_name() {
        let world = MemoryWorld::new();
        let master = world
            .create_scene("Master", None, fields(json!({"weather": "snow", "walls": [{"_id": "w0"}]})))
            .await
            .unwrap();
        let phase = world
            .create_scene("Storm", None, fields(json!({"weather": "rain", "walls": [{"_id": "w1"}, {"_id": "w2"}]})))
            .await
            .unwrap();

        let report = merge_phase(&world, MergeStrategy::Overwrite, &master, &phase, false)
            .await
            .unwrap();
        assert!(report.fields_changed);

        let master = world.get(DocumentKind::Scene, master.id()).await.unwrap().unwrap();
        assert_eq!(master.name(), "Master");
        assert_eq!(master.field("weather"), Some(&json!("rain")));
        assert_eq!(master.embedded_ids(EmbeddedKind::Wall), vec!["w1", "w2"]);
    }

    #[tokio::test]
    async fn test_merge_tokens_is_additive() {
        let world = MemoryWorld::new();
        let master = world
            .create_scene("Master", None, fields(json!({"tokens": [{"_id": "m1", "name": "Hero"}]})))
            .await
            .unwrap();
        let phase = world
            .create_scene("P", None, fields(json!({"tokens": [{"_id": "p1", "name": "Goblin"}]})))
            .await
            .unwrap();

        let added = merge_tokens(&world, master.id(), &phase).await.unwrap();
        assert_eq!(added, 1);

        let master = world.get(DocumentKind::Scene, master.id()).await.unwrap().unwrap();
        let tokens = master.embedded(EmbeddedKind::Token);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0]["_id"], json!("m1"));
        assert_eq!(tokens[1]["name"], json!("Goblin"));
        assert_ne!(tokens[1]["_id"], json!("p1"));
    }

    #[tokio::test]
    async fn test_replace_embedded_keeps_persistent_documents() {
        let world = MemoryWorld::new();
        let master = world
            .create_scene(
                "Master",
                None,
                fields(json!({"lights": [
                    {"_id": "l1"},
                    {"_id": "l2", "flags": {"easy-phasey": {"persist": true}}}
                ]})),
            )
            .await
            .unwrap();
        let phase = world
            .create_scene("P", None, fields(json!({"lights": [{"_id": "l3", "x": 5}]})))
            .await
            .unwrap();

        let (deleted, created) =
            replace_embedded(&world, &master, &phase, EmbeddedKind::AmbientLight)
                .await
                .unwrap();
        assert_eq!((deleted, created), (1, 1));

        let master = world.get(DocumentKind::Scene, master.id()).await.unwrap().unwrap();
        let lights = master.embedded(EmbeddedKind::AmbientLight);
        assert_eq!(lights.len(), 2);
        assert_eq!(lights[0]["_id"], json!("l2"));
        assert_eq!(lights[1]["x"], json!(5));
    }

    #[tokio::test]
    async fn test_replace_embedded_strategy_rebuilds_walls_and_display_fields() {
        let world = MemoryWorld::new();
        let master = world
            .create_scene(
                "Master",
                None,
                fields(json!({"background": {"src": "a.png"}, "walls": [{"_id": "old"}], "grid": 100})),
            )
            .await
            .unwrap();
        let phase = world
            .create_scene(
                "P",
                None,
                fields(json!({"background": {"src": "b.png"}, "walls": [{"_id": "n1"}, {"_id": "n2"}], "grid": 50})),
            )
            .await
            .unwrap();

        let report = merge_phase(&world, MergeStrategy::ReplaceEmbedded, &master, &phase, false)
            .await
            .unwrap();
        assert_eq!(report.documents_deleted, 1);
        assert_eq!(report.documents_created, 2);

        let master = world.get(DocumentKind::Scene, master.id()).await.unwrap().unwrap();
        assert_eq!(master.field("background"), Some(&json!({"src": "b.png"})));
        // grid is not a display field
        assert_eq!(master.field("grid"), Some(&json!(100)));
        let walls = master.embedded_ids(EmbeddedKind::Wall);
        assert_eq!(walls.len(), 2);
        assert!(!walls.contains(&"old".to_string()));
    }
}

//! Graph snapshot persistence
//!
//! The snapshot is the JSON document the engine reads entities and edges
//! from and, with `--write`, stores updated properties and resources into.

use anyhow::{Context, Result};
use intelligence::{EntityGraph, GraphSnapshot};
use std::fs;
use std::path::Path;

/// Load a snapshot file
pub fn load(path: &Path) -> Result<GraphSnapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let snapshot: GraphSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
    log::debug!(
        "Loaded snapshot from {} ({} entities, {} edges)",
        path.display(),
        snapshot.entities.len(),
        snapshot.edges.len()
    );
    Ok(snapshot)
}

/// Load and validate a snapshot into a graph
pub fn load_graph(path: &Path) -> Result<EntityGraph> {
    let snapshot = load(path)?;
    EntityGraph::from_snapshot(snapshot)
        .with_context(|| format!("Invalid entity graph in {}", path.display()))
}

/// Save a snapshot, replacing the file atomically
pub fn save(path: &Path, snapshot: &GraphSnapshot) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create snapshot directory: {}", dir.display()))?;
    }

    let content =
        serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content)
        .with_context(|| format!("Failed to write snapshot: {}", tmp.display()))?;
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace snapshot: {}", path.display()))?;

    log::debug!("Saved snapshot to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use intelligence::{Edge, Entity};
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_graph() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("graph.json");
        let snapshot = GraphSnapshot {
            entities: vec![
                Entity::new("svc", "service", "web"),
                Entity::new("img", "dockerImage", "web-image"),
            ],
            edges: vec![Edge::new("svc", "img")],
        };

        save(&path, &snapshot).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let graph = load_graph(&path).unwrap();
        assert_eq!(graph.len(), 2);
        assert!(graph.has_edge(&"svc".into(), &"img".into()));
    }

    #[test]
    fn test_load_reads_camel_case_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.json");
        fs::write(
            &path,
            r#"{
                "entities": [
                    {"id": "a", "objectType": "service", "name": "api",
                     "properties": {"explicit": {"__baseline": {"port": 80}}}}
                ],
                "edges": []
            }"#,
        )
        .unwrap();

        let snapshot = load(&path).unwrap();
        assert_eq!(snapshot.entities[0].object_type, "service");
        assert_eq!(snapshot.entities[0].properties.get("port").unwrap(), 80);
    }

    #[test]
    fn test_cyclic_snapshot_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("graph.json");
        let snapshot = GraphSnapshot {
            entities: vec![
                Entity::new("a", "service", "a"),
                Entity::new("b", "service", "b"),
            ],
            edges: vec![Edge::new("a", "b"), Edge::new("b", "a")],
        };
        save(&path, &snapshot).unwrap();

        let err = load_graph(&path).unwrap_err();
        assert!(format!("{err:#}").contains("cycle"));
    }

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let temp = TempDir::new().unwrap();
        let err = load(&temp.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read snapshot"));
    }
}

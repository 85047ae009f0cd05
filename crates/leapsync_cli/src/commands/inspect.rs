//! Inspect command implementation.

use leapsync_storage::{FileSnapshotStore, SnapshotStore};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Snapshot inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Snapshot path.
    pub path: String,
    /// File size in bytes.
    pub file_size: u64,
    /// Number of entities.
    pub entity_count: usize,
    /// Number of fields across all entities.
    pub field_count: usize,
    /// Entities per type.
    pub types: BTreeMap<String, usize>,
}

/// Reads and summarizes the snapshot at `path`.
pub fn inspect(path: &Path) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No snapshot found at {:?}", path).into());
    }

    let snapshot = FileSnapshotStore::open(path)?.load()?;
    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: std::fs::metadata(path)?.len(),
        entity_count: snapshot.len(),
        field_count: snapshot.iter().map(|(_, record)| record.len()).sum(),
        types: snapshot.type_counts(),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("LeapSync Snapshot Inspection");
    println!("============================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {}", format_size(result.file_size));
    println!();
    println!("Entities: {}", result.entity_count);
    println!("Fields:   {}", result.field_count);

    if !result.types.is_empty() {
        println!();
        println!("Types:");
        let width = result.types.keys().map(String::len).max().unwrap_or(0);
        for (type_name, count) in &result.types {
            println!("  {type_name:<width$}  {count}");
        }
    }
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} bytes", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_entities_per_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.json");
        std::fs::write(
            &path,
            r#"{
                "Organization:ROOT": {"__typename": "Organization", "id": "ROOT", "name": "Leap Office"},
                "Room:lobby": {"__typename": "Room", "id": "lobby"},
                "Room:kitchen": {"__typename": "Room", "id": "kitchen"}
            }"#,
        )
        .unwrap();

        let result = inspect(&path).unwrap();
        assert_eq!(result.entity_count, 3);
        assert_eq!(result.types["Room"], 2);
        assert_eq!(result.types["Organization"], 1);
    }

    #[test]
    fn missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(inspect(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn sizes() {
        assert_eq!(format_size(10), "10 bytes");
        assert_eq!(format_size(2048), "2.0 KB");
    }
}

//! Roster persistence: the saved list of patient names and addresses.
//!
//! The format is two index-aligned ordered lists (`name[i]` pairs with
//! `address[i]`). Callers hand in display order (newest first); the lists
//! are reversed before writing so that natural add order is preserved when
//! the roster is reloaded and re-committed one by one.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

#[derive(Debug, Default, Serialize, Deserialize)]
struct RosterFile {
    names: Vec<String>,
    addresses: Vec<String>,
}

/// Write the roster to `path`.
///
/// `display_order` is newest-first, as a patient list view would hand it
/// over; on disk the lists end up oldest-first.
pub fn save_roster<P: AsRef<Path>>(
    path: P,
    display_order: &[(String, String)],
) -> Result<(), StoreError> {
    let mut names: Vec<String> = display_order.iter().map(|(n, _)| n.clone()).collect();
    let mut addresses: Vec<String> = display_order.iter().map(|(_, a)| a.clone()).collect();
    names.reverse();
    addresses.reverse();

    let json = serde_json::to_string_pretty(&RosterFile { names, addresses })?;
    fs::write(path, json)?;
    Ok(())
}

/// Load the roster from `path`, in add order (oldest first).
///
/// A missing file is an empty roster. Mismatched list lengths pair up to the
/// shorter list.
pub fn load_roster<P: AsRef<Path>>(path: P) -> Result<Vec<(String, String)>, StoreError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let roster: RosterFile = serde_json::from_str(&content)?;
    Ok(roster.names.into_iter().zip(roster.addresses).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn pair(name: &str, address: &str) -> (String, String) {
        (name.to_string(), address.to_string())
    }

    #[test]
    fn test_round_trip_restores_add_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roster.json");

        // P1 was added first, so a newest-first view lists P2 first.
        let display = vec![pair("P2", "192.0.2.6"), pair("P1", "192.0.2.5")];
        save_roster(&path, &display).unwrap();

        let loaded = load_roster(&path).unwrap();
        assert_eq!(loaded, vec![pair("P1", "192.0.2.5"), pair("P2", "192.0.2.6")]);
    }

    #[test]
    fn test_missing_file_is_empty_roster() {
        let dir = tempdir().unwrap();
        assert!(load_roster(dir.path().join("roster.json")).unwrap().is_empty());
    }

    #[test]
    fn test_mismatched_lengths_pair_to_shorter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roster.json");
        fs::write(
            &path,
            r#"{"names": ["P1", "P2"], "addresses": ["192.0.2.5"]}"#,
        )
        .unwrap();

        let loaded = load_roster(&path).unwrap();
        assert_eq!(loaded, vec![pair("P1", "192.0.2.5")]);
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("roster.json");
        fs::write(&path, "[not an object]").unwrap();
        assert!(load_roster(&path).is_err());
    }
}

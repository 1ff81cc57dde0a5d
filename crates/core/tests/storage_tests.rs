// ═══════════════════════════════════════════════════════════════════
// Storage Tests — MemoryStorage, FileStorage, snapshot helpers
// ═══════════════════════════════════════════════════════════════════

use advisor_session_core::errors::CoreError;
use advisor_session_core::storage::file::FileStorage;
use advisor_session_core::storage::memory::MemoryStorage;
use advisor_session_core::storage::snapshot::{self, IDENTITY_KEY, PENDING_SAVES_KEY};
use advisor_session_core::storage::traits::KeyValueStorage;
use serde::{Deserialize, Serialize};

/// A store that refuses every operation, like a browser with storage disabled.
struct UnavailableStorage;

impl KeyValueStorage for UnavailableStorage {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn get_item(&self, _key: &str) -> Result<Option<String>, CoreError> {
        Err(CoreError::Storage("storage disabled".into()))
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), CoreError> {
        Err(CoreError::Storage("quota exceeded".into()))
    }

    fn remove_item(&self, _key: &str) -> Result<(), CoreError> {
        Err(CoreError::Storage("storage disabled".into()))
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct Sample {
    name: String,
    count: u32,
}

// ═══════════════════════════════════════════════════════════════════
// MemoryStorage
// ═══════════════════════════════════════════════════════════════════

mod memory_storage {
    use super::*;

    #[test]
    fn set_get_remove() {
        let storage = MemoryStorage::new();
        assert!(storage.is_empty());
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v1").unwrap();
        storage.set_item("k", "v2").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v2"));
        assert_eq!(storage.len(), 1);

        storage.remove_item("k").unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);
        assert!(storage.is_empty());
    }

    #[test]
    fn removing_missing_key_is_ok() {
        let storage = MemoryStorage::new();
        assert!(storage.remove_item("missing").is_ok());
    }

    #[test]
    fn name() {
        assert_eq!(MemoryStorage::new().name(), "memory");
    }
}

// ═══════════════════════════════════════════════════════════════════
// FileStorage
// ═══════════════════════════════════════════════════════════════════

mod file_storage {
    use super::*;

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "\"two\"").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get_item("b").unwrap().as_deref(), Some("\"two\""));
        assert_eq!(reopened.path(), path.as_path());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("absent.json")).unwrap();
        assert_eq!(storage.get_item("a").unwrap(), None);
        assert!(!storage.path().exists());
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("session.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("k", "v").unwrap();

        assert!(path.exists());
    }

    #[test]
    fn corrupt_file_reads_as_empty_and_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let storage = FileStorage::open(&path).unwrap();
        assert_eq!(storage.get_item("k").unwrap(), None);

        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k").unwrap().as_deref(), Some("v"));

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({ "k": "v" }));
    }

    #[test]
    fn remove_item() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();
        storage.set_item("keep", "1").unwrap();
        storage.set_item("drop", "2").unwrap();

        storage.remove_item("drop").unwrap();
        storage.remove_item("never-there").unwrap();

        assert_eq!(storage.get_item("drop").unwrap(), None);
        assert_eq!(storage.get_item("keep").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("k", "v").unwrap();

        assert!(!dir.path().join("session.json.tmp").exists());
    }

    #[test]
    fn sibling_with_tmp_extension_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sibling = dir.path().join("session.tmp");
        std::fs::write(&sibling, b"unrelated").unwrap();

        let storage = FileStorage::open(dir.path().join("session.json")).unwrap();
        storage.set_item("k", "v").unwrap();

        assert_eq!(std::fs::read(&sibling).unwrap(), b"unrelated");
    }

    #[test]
    fn store_file_ending_in_tmp_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scratch.tmp");

        let storage = FileStorage::open(&path).unwrap();
        storage.set_item("a", "1").unwrap();
        storage.set_item("b", "2").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.get_item("a").unwrap().as_deref(), Some("1"));
        assert_eq!(reopened.get_item("b").unwrap().as_deref(), Some("2"));
        assert!(!dir.path().join("scratch.tmp.tmp").exists());
    }

    #[test]
    fn two_handles_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let first = FileStorage::open(&path).unwrap();
        let second = FileStorage::open(&path).unwrap();

        first.set_item("k", "from-first").unwrap();
        assert_eq!(second.get_item("k").unwrap().as_deref(), Some("from-first"));
    }
}

// ═══════════════════════════════════════════════════════════════════
// Snapshot helpers
// ═══════════════════════════════════════════════════════════════════

mod snapshots {
    use super::*;

    #[test]
    fn json_roundtrip() {
        let storage = MemoryStorage::new();
        let value = Sample {
            name: "growth".into(),
            count: 3,
        };

        assert!(snapshot::write_json(&storage, IDENTITY_KEY, &value));
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), Some(value));
    }

    #[test]
    fn slices_are_written_as_arrays() {
        let storage = MemoryStorage::new();
        let values = [1, 2, 3];
        assert!(snapshot::write_json(&storage, PENDING_SAVES_KEY, &values[..]));
        assert_eq!(
            storage.get_item(PENDING_SAVES_KEY).unwrap().as_deref(),
            Some("[1,2,3]")
        );
    }

    #[test]
    fn missing_key_reads_as_none() {
        let storage = MemoryStorage::new();
        assert_eq!(snapshot::read_raw(&storage, IDENTITY_KEY), None);
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), None);
    }

    #[test]
    fn malformed_json_reads_as_none() {
        let storage = MemoryStorage::new();
        storage.set_item(IDENTITY_KEY, "{\"name\": ").unwrap();
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), None);
        // The raw value is still there.
        assert!(snapshot::read_raw(&storage, IDENTITY_KEY).is_some());
    }

    #[test]
    fn wrong_shape_reads_as_none() {
        let storage = MemoryStorage::new();
        storage.set_item(IDENTITY_KEY, r#"{"name": 5, "count": "x"}"#).unwrap();
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), None);

        storage.set_item(IDENTITY_KEY, "[]").unwrap();
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), None);
    }

    #[test]
    fn unavailable_storage_never_fails() {
        let storage = UnavailableStorage;

        assert_eq!(snapshot::read_raw(&storage, IDENTITY_KEY), None);
        assert_eq!(snapshot::read_json::<Sample>(&storage, IDENTITY_KEY), None);
        assert!(!snapshot::write_raw(&storage, IDENTITY_KEY, "x"));
        assert!(!snapshot::write_json(
            &storage,
            IDENTITY_KEY,
            &Sample {
                name: "n".into(),
                count: 1
            }
        ));
        assert!(!snapshot::remove(&storage, IDENTITY_KEY));
    }

    #[test]
    fn remove_deletes_key() {
        let storage = MemoryStorage::new();
        assert!(snapshot::write_raw(&storage, IDENTITY_KEY, "x"));
        assert!(snapshot::remove(&storage, IDENTITY_KEY));
        assert_eq!(storage.get_item(IDENTITY_KEY).unwrap(), None);
    }
}

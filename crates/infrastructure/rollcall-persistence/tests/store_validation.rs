use camino::Utf8PathBuf;
use rollcall_persistence::{DbState, LogStore, RedbLogStore, CURRENT_SCHEMA};
use redb::TableDefinition;

const META: TableDefinition<&str, &str> = TableDefinition::new("meta");

fn root() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, root)
}

#[test]
fn missing_store_is_reported_without_creating_it() {
    let (_dir, root) = root();
    let store = RedbLogStore::new(root.clone());
    assert_eq!(store.validate().unwrap(), DbState::Missing);
    assert!(!store.path().exists());
}

#[test]
fn corrupt_store_is_quarantined_and_recreated() {
    let (_dir, root) = root();
    let store = RedbLogStore::new(root.clone());
    std::fs::write(store.path(), b"not a database at all").unwrap();

    assert_eq!(store.validate().unwrap(), DbState::Corrupt);
    assert!(!store.path().exists());
    let quarantined = std::fs::read_dir(&root)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter(|n| n.starts_with("rollcall.redb.corrupt."))
        .count();
    assert_eq!(quarantined, 1);

    assert!(store.load_logs().unwrap().is_empty());
    assert_eq!(store.validate().unwrap(), DbState::Valid);
}

#[test]
fn locked_store_is_busy() {
    let (_dir, root) = root();
    let path = RedbLogStore::path_for_root(&root);
    let _lock = redb::Database::create(path.as_std_path()).unwrap();

    assert_eq!(RedbLogStore::new(root).validate().unwrap(), DbState::Busy);
}

#[test]
fn newer_schema_is_left_in_place() {
    let (_dir, root) = root();
    let path = RedbLogStore::path_for_root(&root);
    let db = redb::Database::create(path.as_std_path()).unwrap();
    let write_tx = db.begin_write().unwrap();
    {
        let mut meta = write_tx.open_table(META).unwrap();
        let version = (CURRENT_SCHEMA + 1).to_string();
        meta.insert("format", "rollcall-redb").unwrap();
        meta.insert("schema_version", version.as_str()).unwrap();
    }
    write_tx.commit().unwrap();
    drop(db);

    assert_eq!(
        RedbLogStore::new(root).validate().unwrap(),
        DbState::NewerSchema {
            found: CURRENT_SCHEMA + 1,
            supported: CURRENT_SCHEMA
        }
    );
    assert!(path.exists());
}

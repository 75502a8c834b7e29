use teslabus::persistence::{PersistenceManager, PersistentState};

#[test]
fn default_state_values() {
    let s = PersistentState::default();
    assert!(s.charge_session_start.is_none());
    assert!(s.vin.is_none());
}

#[test]
fn load_save_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("state.json");
    let path = path.to_string_lossy().to_string();

    let mut mgr = PersistenceManager::new(&path);
    mgr.set_charge_session(1_700_000_000, "abc").unwrap();
    mgr.set_identity("5YJ3E1EA7KF000000", "2024.20.9").unwrap();

    let mut mgr2 = PersistenceManager::new(&path);
    mgr2.load().unwrap();
    assert_eq!(mgr2.state().charge_session_start, Some(1_700_000_000));
    assert_eq!(mgr2.state().session_id.as_deref(), Some("abc"));
    assert_eq!(mgr2.state().vin.as_deref(), Some("5YJ3E1EA7KF000000"));
    assert_eq!(mgr2.state().firmware.as_deref(), Some("2024.20.9"));
}

#[test]
fn missing_or_empty_file_keeps_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    let mut mgr = PersistenceManager::new(&path.to_string_lossy());
    mgr.load().unwrap();
    assert_eq!(mgr.state(), &PersistentState::default());

    std::fs::write(&path, "  \n").unwrap();
    mgr.load().unwrap();
    assert_eq!(mgr.state(), &PersistentState::default());
}

#[test]
fn partial_file_fills_defaults() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), r#"{"charge_session_start": 42}"#).unwrap();
    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    mgr.load().unwrap();
    assert_eq!(mgr.state().charge_session_start, Some(42));
    assert!(mgr.state().firmware.is_none());
}

#[test]
fn corrupt_file_is_an_error() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), "{not json").unwrap();
    let mut mgr = PersistenceManager::new(&tmp.path().to_string_lossy());
    assert!(mgr.load().is_err());
}

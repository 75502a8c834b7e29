use chrono::{Duration, TimeZone, Utc};
use teslabus::persistence::PersistenceManager;
use teslabus::session::{ChargeSessionTracker, SessionChange};

#[test]
fn session_start_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json").to_string_lossy().to_string();
    let t0 = Utc.with_ymd_and_hms(2024, 6, 2, 9, 30, 0).unwrap();

    let mut tracker = ChargeSessionTracker::new();
    assert_eq!(tracker.observe_charging(0.0, t0), Some(SessionChange::Reset));
    let mut mgr = PersistenceManager::new(&path);
    mgr.set_charge_session(t0.timestamp(), tracker.session_id().unwrap())
        .unwrap();

    let mut reloaded = PersistenceManager::new(&path);
    reloaded.load().unwrap();
    let mut restored = ChargeSessionTracker::from_state(reloaded.state());
    assert_eq!(restored.start(), Some(t0));
    assert_eq!(restored.session_id(), tracker.session_id());

    let later = t0 + Duration::seconds(900);
    assert_eq!(restored.observe_charging(1.2, later), None);
    assert_eq!(restored.charging_time(later), 900);
}

#[test]
fn charging_time_is_zero_without_start_or_before_it() {
    let t0 = Utc.with_ymd_and_hms(2024, 6, 2, 9, 30, 0).unwrap();
    let mut tracker = ChargeSessionTracker::default();
    assert_eq!(tracker.charging_time(t0), 0);

    tracker.observe_charging(0.0, t0);
    assert_eq!(tracker.charging_time(t0 - Duration::seconds(30)), 0);
}

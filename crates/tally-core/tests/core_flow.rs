use std::fs;

use chrono::{TimeZone, Utc};
use tally_core::clock::{DisplayZone, FixedClock, TimestampFormat};
use tally_core::session::{Action, Outcome, Session};
use tally_core::storage::{FileStore, KeyValueStore, TASKS_KEY, THEME_KEY};
use tally_core::task::Task;
use tally_core::theme::{FixedProbe, Theme};
use tempfile::tempdir;

fn format() -> TimestampFormat {
    TimestampFormat {
        zone: DisplayZone::Named(chrono_tz::UTC),
        ..TimestampFormat::default()
    }
}

fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 10, 19, 14, 30, 0).single().expect("valid time"))
}

#[test]
fn buy_milk_scenario_survives_restart() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    let mut session = Session::open(store.clone(), clock(), format(), &FixedProbe(None));

    assert_eq!(session.apply(Action::Add("Buy milk".to_string())), Outcome::Changed);
    let board = session.board();
    assert_eq!((board.total, board.completed), (1, 0));
    let id = board.tasks[0].id().clone();
    assert_eq!(board.tasks[0].created_at(), "10/19/2026, 2:30:00 PM");

    session.apply(Action::Toggle(id.clone()));
    assert_eq!(session.board().completed, 1);

    assert_eq!(session.apply(Action::Add("  ".to_string())), Outcome::Ignored);
    assert_eq!(session.board().total, 1);

    let reopened = Session::open(store.clone(), clock(), format(), &FixedProbe(None));
    assert_eq!(reopened.tasks().tasks(), session.tasks().tasks());

    session.apply(Action::Delete(id));
    assert_eq!(session.board().total, 0);

    let raw = store.read(TASKS_KEY).expect("read").expect("tasks stored");
    let stored: Vec<Task> = serde_json::from_str(&raw).expect("decode");
    assert!(stored.is_empty());
}

#[test]
fn stored_json_uses_browser_compatible_shape() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    let mut session = Session::open(store.clone(), clock(), format(), &FixedProbe(None));

    session.apply(Action::Add("Write report".to_string()));

    let raw = fs::read_to_string(store.path_for(TASKS_KEY)).expect("tasks file");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("json");
    let record = &value.as_array().expect("array")[0];

    assert_eq!(record["text"], "Write report");
    assert_eq!(record["completed"], false);
    assert_eq!(record["createdAt"], "10/19/2026, 2:30:00 PM");
    assert!(record["id"].is_string());
}

#[test]
fn theme_preference_round_trips_through_files() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");

    let mut session = Session::open(store.clone(), clock(), format(), &FixedProbe(Some(true)));
    assert_eq!(session.theme(), Theme::Dark);
    assert_eq!(store.read(THEME_KEY).expect("read"), None);

    session.apply(Action::ToggleTheme);
    assert_eq!(store.read(THEME_KEY).expect("read").as_deref(), Some("light"));

    let reopened = Session::open(store, clock(), format(), &FixedProbe(Some(true)));
    assert_eq!(reopened.theme(), Theme::Light);
}

#[test]
fn corrupt_task_file_degrades_to_empty_list() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    fs::write(store.path_for(TASKS_KEY), "[{\"id\": 1").expect("write garbage");

    let mut session = Session::open(store.clone(), clock(), format(), &FixedProbe(None));
    assert_eq!(session.board().total, 0);

    session.apply(Action::Add("fresh start".to_string()));
    let reopened = Session::open(store, clock(), format(), &FixedProbe(None));
    assert_eq!(reopened.board().total, 1);
}

#[test]
fn unreadable_files_fall_back_to_defaults() {
    let temp = tempdir().expect("tempdir");
    let store = FileStore::open(temp.path()).expect("open store");
    fs::create_dir(store.path_for(TASKS_KEY)).expect("tasks dir");
    fs::create_dir(store.path_for(THEME_KEY)).expect("theme dir");

    let session = Session::open(store, clock(), format(), &FixedProbe(Some(true)));
    assert_eq!(session.board().total, 0);
    assert_eq!(session.theme(), Theme::Dark);
}

/*
 * autopilot.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for AutoPilot: entry files, engine configuration and
 * unattended course runs through the synchronizer.
 *
 * Run with:
 *   cargo test -p tagliacarte_sync --test autopilot
 */

mod common;

use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{eventually, FakeAccount, FakeSessions, Harness, Log, RecordingObserver};
use tagliacarte_sync::autopilot::load_entries;
use tagliacarte_sync::config::AutoPilotConfig;
use tagliacarte_sync::{
    AutoPilot, AutoPilotCallback, AutoPilotEntry, AutoPilotWriter, CourseCatalog, CourseLauncher, NoDialup,
    SyncConfig, SyncFilterManager, SyncType, Synchronizer,
};

struct Gate(AtomicBool);

impl AutoPilotCallback for Gate {
    fn can_auto_pilot(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Launches(Mutex<Vec<String>>);

impl CourseLauncher for Launches {
    fn launch_course(&self, course: &str) -> bool {
        self.0.lock().unwrap().push(course.to_string());
        true
    }
}

#[test]
fn entries_survive_write_and_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.xml");
    assert!(load_entries(&path).unwrap().is_empty());

    let mut weekly = AutoPilotEntry::new("weekly <all>", 10080);
    weekly.enabled = false;
    let entries = vec![AutoPilotEntry::new("morning", 15), weekly];
    AutoPilotWriter::write(&path, &entries).unwrap();
    assert_eq!(load_entries(&path).unwrap(), entries);
}

#[test]
fn bad_interval_fails_the_whole_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("autopilot.xml");
    fs::write(
        &path,
        "<autoPilot><entry><course>a</course><interval>5</interval></entry>\
         <entry><course>b</course><interval>0</interval></entry></autoPilot>",
    )
    .unwrap();
    assert!(load_entries(&path).is_err());
    fs::write(&path, "<autoPilot><entry><course>a</course><interval>often</interval></entry></autoPilot>").unwrap();
    assert!(load_entries(&path).is_err());
}

#[test]
fn sync_config_reads_engine_settings() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.xml");
    let defaults = SyncConfig::load(&path).unwrap();
    assert_eq!(defaults, SyncConfig::with_dir(dir.path()));

    fs::write(
        &path,
        r#"<sync>
  <autoPilot enabled="true" onlyWhenConnected="true" tickSeconds="30"/>
  <queue delayMillis="250"/>
  <manager maxBatches="4"/>
  <courses path="plans.xml"/>
</sync>"#,
    )
    .unwrap();
    let config = SyncConfig::load(&path).unwrap();
    assert!(config.auto_pilot.enabled && config.auto_pilot.only_when_connected);
    assert_eq!(config.auto_pilot.tick, Duration::from_secs(30));
    assert_eq!(config.queue_delay, Duration::from_millis(250));
    assert_eq!(config.max_batches, 4);
    assert_eq!(config.courses_path, dir.path().join("plans.xml"));
    assert_eq!(config.filters_path, dir.path().join("syncfilters.xml"));
}

#[test]
fn deferred_entry_runs_once_when_allowed() {
    let gate = Arc::new(Gate(AtomicBool::new(false)));
    let launches = Arc::new(Launches::default());
    let config = AutoPilotConfig {
        enabled: true,
        ..Default::default()
    };
    let pilot = AutoPilot::new(
        &config,
        vec![AutoPilotEntry::new("hourly", 60)],
        Arc::new(NoDialup),
        gate.clone(),
        launches.clone(),
    );

    // Tick 0 is due but blocked; the entry waits.
    assert!(pilot.tick().is_empty());
    assert!(pilot.entries()[0].is_pending());
    assert!(pilot.tick().is_empty());

    gate.0.store(true, Ordering::SeqCst);
    assert_eq!(pilot.tick(), vec!["hourly".to_string()]);
    assert!(pilot.tick().is_empty());
    assert_eq!(*launches.0.lock().unwrap(), vec!["hourly".to_string()]);
}

#[test]
fn timer_drives_the_synchronizer() {
    let dir = tempfile::tempdir().unwrap();
    let courses = dir.path().join("courses.xml");
    fs::write(
        &courses,
        r#"<courses><course name="poll"><parallel><entry account="work" receive="true" folder="^INBOX$"/></parallel></course></courses>"#,
    )
    .unwrap();
    let log = Arc::new(Log::default());
    let harness = Harness::new(vec![FakeAccount::mailbox("work", &log)], log.clone(), FakeSessions::new(&log));
    let observer = Arc::new(RecordingObserver::default());
    let synchronizer = Arc::new(Synchronizer::new(
        harness.manager.clone(),
        Arc::new(CourseCatalog::new(courses)),
        Arc::new(SyncFilterManager::new(dir.path().join("syncfilters.xml"))),
        observer.clone(),
    ));
    let config = AutoPilotConfig {
        enabled: true,
        ..Default::default()
    };
    let pilot = Arc::new(AutoPilot::new(
        &config,
        vec![AutoPilotEntry::new("poll", 1)],
        Arc::new(NoDialup),
        Arc::new(Gate(AtomicBool::new(true))),
        synchronizer,
    ));
    let timer = pilot.start(Duration::from_millis(20)).unwrap();
    assert!(eventually(|| log.count("download work/INBOX") > 0));
    timer.stop();
    harness.manager.dispose();

    assert!(observer.starts().iter().all(|t| *t == SyncType::Auto));
    assert!(observer.errors().is_empty());
}

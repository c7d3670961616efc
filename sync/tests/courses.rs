/*
 * courses.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Integration tests for the course catalog and for running courses
 * through the synchronizer.
 *
 * Run with:
 *   cargo test -p tagliacarte_sync --test courses
 */

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{FakeAccount, FakeSessions, Harness, Log, RecordingObserver};
use tagliacarte_sync::course::parse_courses;
use tagliacarte_sync::store::{Account, FolderInfo, ReceiveBeforeSend};
use tagliacarte_sync::{
    CourseCatalog, CourseLauncher, CourseType, CourseWriter, FolderSelector, SyncFilterManager, SyncType,
    Synchronizer, WorkItem,
};

const COURSES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<courses>
  <course name="morning" confirm="true">
    <dialup name="isp" disconnectWait="5" wheneverNotConnected="true"/>
    <parallel>
      <entry account="work" receive="true" folder="^INBOX$" filter="light"/>
      <entry account="work" send="true" connectReceiveBeforeSend="false"/>
      <entry account="ghost"/>
      <entry account="home" applyRules="true"/>
    </parallel>
  </course>
  <course name="evening">
    <sequential>
      <entry account="work" receive="true"/>
      <entry account="home" receive="true" selectFolder="true"/>
    </sequential>
  </course>
</courses>
"#;

const FILTERS: &str = r#"<filters>
  <filterSet name="light">
    <filter folder="^INBOX$" match="@Size() > 10000">
      <action name="download">
        <param name="type">header</param>
      </action>
    </filter>
  </filterSet>
</filters>
"#;

fn touch_later(path: &Path, secs: u64) {
    let later = SystemTime::now() + Duration::from_secs(secs);
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(later)
        .unwrap();
}

#[test]
fn catalog_keeps_the_same_list_until_the_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courses.xml");
    let catalog = CourseCatalog::new(&path);
    assert!(catalog.course_list().is_empty());

    fs::write(&path, COURSES).unwrap();
    let first = catalog.course_list();
    assert_eq!(first.len(), 2);
    assert!(Arc::ptr_eq(&first, &catalog.course_list()));
    assert!(Arc::ptr_eq(&first.course("morning").unwrap(), &catalog.course("morning").unwrap()));

    fs::write(&path, r#"<courses><course name="only"><sequential><entry account="a"/></sequential></course></courses>"#)
        .unwrap();
    touch_later(&path, 5);
    let second = catalog.course_list();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.len(), 1);
    assert!(catalog.course("morning").is_none());
}

#[test]
fn broken_file_keeps_previous_courses() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courses.xml");
    fs::write(&path, COURSES).unwrap();
    let catalog = CourseCatalog::new(&path);
    let good = catalog.course_list();

    fs::write(&path, r#"<courses><course name="x"><parallel><entry/></parallel></course></courses>"#).unwrap();
    touch_later(&path, 5);
    assert!(catalog.reload().is_err());
    assert!(Arc::ptr_eq(&good, &catalog.course_list()));
}

#[test]
fn written_courses_load_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("courses.xml");
    let list = parse_courses(COURSES).unwrap();
    CourseWriter::write(&path, &list).unwrap();

    let loaded = CourseCatalog::new(&path).reload().unwrap();
    assert_eq!(loaded.len(), list.len());
    for (a, b) in list.courses().iter().zip(loaded.courses()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.confirm, b.confirm);
        assert_eq!(a.course_type, b.course_type);
        assert_eq!(a.dialup, b.dialup);
        assert_eq!(a.entries.len(), b.entries.len());
        for (x, y) in a.entries.iter().zip(&b.entries) {
            assert_eq!(x.account, y.account);
            assert_eq!((x.send, x.receive), (y.send, y.receive));
            assert_eq!(x.folder_pattern().map(|r| r.as_str()), y.folder_pattern().map(|r| r.as_str()));
            assert_eq!(x.filter, y.filter);
            assert_eq!(x.select_folder, y.select_folder);
            assert_eq!(x.apply_rules, y.apply_rules);
            assert_eq!(x.receive_before_send, y.receive_before_send);
        }
    }
}

struct PickWork;

impl FolderSelector for PickWork {
    fn select_folders(&self, _account: &dyn Account, candidates: &[FolderInfo]) -> Option<Vec<String>> {
        assert!(candidates.iter().any(|f| f.name == "Work"));
        Some(vec!["Work".to_string()])
    }
}

struct Setup {
    _dir: tempfile::TempDir,
    log: Arc<Log>,
    harness: Harness,
    observer: Arc<RecordingObserver>,
    synchronizer: Synchronizer,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let courses = dir.path().join("courses.xml");
    let filters = dir.path().join("syncfilters.xml");
    fs::write(&courses, COURSES).unwrap();
    fs::write(&filters, FILTERS).unwrap();

    let log = Arc::new(Log::default());
    let harness = Harness::new(
        vec![FakeAccount::mailbox("work", &log), FakeAccount::mailbox("home", &log)],
        log.clone(),
        FakeSessions::new(&log),
    );
    let observer = Arc::new(RecordingObserver::default());
    let synchronizer = Synchronizer::new(
        harness.manager.clone(),
        Arc::new(CourseCatalog::new(courses)),
        Arc::new(SyncFilterManager::new(filters)),
        observer.clone(),
    )
    .with_folder_selector(Arc::new(PickWork));
    Setup {
        _dir: dir,
        log,
        harness,
        observer,
        synchronizer,
    }
}

fn describe(item: &WorkItem) -> String {
    match item {
        WorkItem::Receive(r) => format!("receive {}/{}/{}", r.account, r.sub_account, r.folder),
        WorkItem::Send(s) => format!("send {}/{}", s.account, s.sub_account),
    }
}

#[test]
fn parallel_course_gives_one_slot_per_entry() {
    let s = setup();
    let course = s.synchronizer.catalog().course("morning").unwrap();
    let plan = s.synchronizer.course_plan(&course);
    let groups: Vec<_> = plan.groups().collect();
    assert_eq!(groups.len(), 1);
    let slots: Vec<Vec<String>> = groups[0].iter().map(|slot| slot.iter().map(describe).collect()).collect();
    assert_eq!(
        slots,
        vec![
            vec!["receive work/main/INBOX".to_string()],
            vec!["send work/main".to_string()],
            vec![
                "receive home/main/INBOX".to_string(),
                "receive home/main/Work".to_string(),
                "send home/main".to_string(),
            ],
        ]
    );

    let WorkItem::Receive(inbox) = &groups[0][0][0] else {
        panic!("expected a receive item");
    };
    assert_eq!(inbox.filter_set.as_ref().map(|f| f.name.as_str()), Some("light"));
    let WorkItem::Send(send) = &groups[0][1][0] else {
        panic!("expected a send item");
    };
    assert_eq!(send.receive_before_send, ReceiveBeforeSend::Never);
    let WorkItem::Receive(home) = &groups[0][2][0] else {
        panic!("expected a receive item");
    };
    assert!(home.apply_rules);
}

#[test]
fn sequential_course_gives_one_group_per_entry() {
    let s = setup();
    let course = s.synchronizer.catalog().course("evening").unwrap();
    assert_eq!(course.course_type, CourseType::Sequential);
    let plan = s.synchronizer.course_plan(&course);
    let groups: Vec<Vec<Vec<String>>> = plan
        .groups()
        .map(|g| g.iter().map(|slot| slot.iter().map(describe).collect()).collect())
        .collect();
    assert_eq!(
        groups,
        vec![
            vec![vec!["receive work/main/INBOX".to_string(), "receive work/main/Work".to_string()]],
            vec![vec!["receive home/main/Work".to_string()]],
        ]
    );
}

#[test]
fn run_course_synchronizes_every_entry() {
    let s = setup();
    assert!(s.synchronizer.run_course("evening", SyncType::Manual));
    s.harness.manager.dispose();

    assert_eq!(s.log.count("download work/INBOX"), 1);
    assert_eq!(s.log.count("download work/Work"), 1);
    assert_eq!(s.log.count("download home/Work"), 1);
    assert_eq!(s.log.count("download home/INBOX"), 0);
    assert!(s.observer.errors().is_empty());
    assert_eq!(s.observer.starts(), vec![SyncType::Manual]);
}

#[test]
fn unknown_course_does_not_start_a_batch() {
    let s = setup();
    assert!(!s.synchronizer.run_course("midnight", SyncType::Manual));
    assert!(!s.harness.manager.is_syncing());
    assert!(s.observer.starts().is_empty());
}

#[test]
fn autopilot_launches_run_as_auto() {
    let s = setup();
    assert!(s.synchronizer.launch_course("evening"));
    s.harness.manager.dispose();
    assert_eq!(s.observer.starts(), vec![SyncType::Auto]);
}

#[test]
fn direct_folder_sync_and_send() {
    let s = setup();
    let home = s.harness.directory.fake("home");
    home.queue_outgoing(tagliacarte_sync::store::MessageHolder::new("m1"));
    assert!(s.synchronizer.sync_folders("work", &["Work".to_string()], SyncType::Manual));
    assert!(s.synchronizer.send("home", None, Some("m1")));
    assert!(!s.synchronizer.send("home", Some("nobody"), None));
    assert!(!s.synchronizer.sync_folders("ghost", &["INBOX".to_string()], SyncType::Manual));
    s.harness.manager.dispose();

    assert_eq!(s.log.count("download work/Work"), 1);
    assert_eq!(s.log.count("smtp send m1"), 1);
    assert_eq!(home.folder_messages("Sent"), vec!["m1"]);
}

/*
 * mod.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * Shared fixtures for the sync integration tests: in-memory accounts,
 * scripted receive/send sessions and a recording observer.
 */
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing_subscriber::EnvFilter;

use tagliacarte_sync::dialup::{DialupCallback, DialupConnector, DialupParams, DialupResult};
use tagliacarte_sync::error::SessionError;
use tagliacarte_sync::filter::SyncFilterSet;
use tagliacarte_sync::observer::{Cancellation, ProgressId, SessionErrorInfo, SyncObserver, SyncStatusEvent, SyncStatusHandler, SyncType};
use tagliacarte_sync::session::{ReceiveFlags, ReceiveSession, SendSession, SessionCallback, SessionFactory};
use tagliacarte_sync::store::{
    Account, AccountDirectory, FolderFlag, FolderInfo, MessageFlag, MessageHolder, OutgoingMessage, SubAccount,
};
use tagliacarte_sync::{NoDialup, SyncContext, SyncManager};

/// Route engine logs to the test output, filtered by `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ordered event log shared by fakes.
#[derive(Default)]
pub struct Log(Mutex<Vec<String>>);

impl Log {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

pub struct FakeAccount {
    name: String,
    subs: Vec<SubAccount>,
    folders: Vec<FolderInfo>,
    messages: Mutex<HashMap<String, Vec<MessageHolder>>>,
    message_lock: Mutex<()>,
    synced: Mutex<HashMap<String, DateTime<Utc>>>,
    log: Arc<Log>,
}

impl FakeAccount {
    /// Account with a current sub-account `main` and the given folders.
    pub fn new(name: &str, folders: Vec<FolderInfo>, log: &Arc<Log>) -> Self {
        Self {
            name: name.to_string(),
            subs: vec![SubAccount::new("main")],
            folders,
            messages: Mutex::new(HashMap::new()),
            message_lock: Mutex::new(()),
            synced: Mutex::new(HashMap::new()),
            log: Arc::clone(log),
        }
    }

    /// Typical mailbox: syncable INBOX and Work, a local-only Archive, outbox and sent box.
    pub fn mailbox(name: &str, log: &Arc<Log>) -> Self {
        Self::new(
            name,
            vec![
                FolderInfo::new("INBOX", &[FolderFlag::Syncable, FolderFlag::Inbox, FolderFlag::SyncWhenOpen]),
                FolderInfo::new("Work", &[FolderFlag::Syncable, FolderFlag::SyncWhenOpen]),
                FolderInfo::new("Archive", &[]),
                FolderInfo::new("Outbox", &[FolderFlag::Outbox]),
                FolderInfo::new("Sent", &[FolderFlag::Sentbox]),
            ],
            log,
        )
    }

    pub fn with_sub_account(mut self, sub: SubAccount) -> Self {
        self.subs.push(sub);
        self
    }

    pub fn with_current(mut self, sub: SubAccount) -> Self {
        self.subs.retain(|s| s.name != sub.name);
        self.subs.insert(0, sub);
        self
    }

    pub fn queue_outgoing(&self, holder: MessageHolder) {
        self.messages.lock().unwrap().entry("Outbox".into()).or_default().push(holder);
    }

    pub fn folder_messages(&self, folder: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .get(folder)
            .map(|m| m.iter().map(|h| h.id.clone()).collect())
            .unwrap_or_default()
    }

    pub fn was_synced(&self, folder: &str) -> bool {
        self.synced.lock().unwrap().contains_key(folder)
    }
}

impl Account for FakeAccount {
    fn name(&self) -> &str {
        &self.name
    }

    fn sub_account(&self, name: &str) -> Option<SubAccount> {
        self.subs.iter().find(|s| s.name == name).cloned()
    }

    fn current_sub_account(&self) -> SubAccount {
        self.subs[0].clone()
    }

    fn folders(&self) -> Vec<FolderInfo> {
        self.folders.clone()
    }

    fn message_lock(&self) -> &Mutex<()> {
        &self.message_lock
    }

    fn load_messages(&self, folder: &str) -> Result<(), SessionError> {
        self.log.push(format!("load {}/{}", self.name, folder));
        Ok(())
    }

    fn save_messages(&self, folder: &str) -> Result<(), SessionError> {
        self.log.push(format!("save {}/{}", self.name, folder));
        Ok(())
    }

    fn flush_message_store(&self) -> Result<(), SessionError> {
        Ok(())
    }

    fn set_last_sync_time(&self, folder: &str, time: DateTime<Utc>) {
        self.synced.lock().unwrap().insert(folder.to_string(), time);
    }

    fn messages(&self, folder: &str) -> Vec<MessageHolder> {
        self.messages.lock().unwrap().get(folder).cloned().unwrap_or_default()
    }

    fn load_outgoing(&self, _folder: &str, holder: &MessageHolder) -> Result<OutgoingMessage, SessionError> {
        Ok(OutgoingMessage {
            id: holder.id.clone(),
            data: format!("Message-ID: <{}@example.org>\r\n\r\nbody\r\n", holder.id).into_bytes(),
        })
    }

    fn mark_sent(&self, outbox: &str, sentbox: &str, holder: &MessageHolder) -> Result<(), SessionError> {
        let mut messages = self.messages.lock().unwrap();
        let moved = {
            let list = messages.entry(outbox.to_string()).or_default();
            let pos = list
                .iter()
                .position(|m| m.id == holder.id)
                .ok_or_else(|| SessionError::store(format!("{} not in {}", holder.id, outbox)))?;
            list.remove(pos)
        };
        messages
            .entry(sentbox.to_string())
            .or_default()
            .push(moved.with_flag(MessageFlag::Sent));
        Ok(())
    }

    fn apply_rules(&self, folder: &str) -> Result<(), SessionError> {
        self.log.push(format!("rules {}/{}", self.name, folder));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    accounts: Vec<Arc<FakeAccount>>,
    pub offline: AtomicBool,
    pub internal_online: AtomicI32,
}

impl FakeDirectory {
    pub fn new(accounts: Vec<FakeAccount>) -> Self {
        Self {
            accounts: accounts.into_iter().map(Arc::new).collect(),
            ..Default::default()
        }
    }

    pub fn fake(&self, name: &str) -> Arc<FakeAccount> {
        self.accounts.iter().find(|a| a.name == name).cloned().unwrap()
    }
}

impl AccountDirectory for FakeDirectory {
    fn account(&self, name: &str) -> Option<Arc<dyn Account>> {
        self.accounts
            .iter()
            .find(|a| a.name == name)
            .map(|a| Arc::clone(a) as Arc<dyn Account>)
    }

    fn accounts(&self) -> Vec<Arc<dyn Account>> {
        self.accounts.iter().map(|a| Arc::clone(a) as Arc<dyn Account>).collect()
    }

    fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    fn increment_internal_online(&self) {
        self.internal_online.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_internal_online(&self) {
        self.internal_online.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Session factory whose sessions write to the shared log.
pub struct FakeSessions {
    log: Arc<Log>,
    /// `account/sub` keys whose receive connect fails.
    refuse: Mutex<HashSet<String>>,
    /// Time spent in `update_messages`, to make overlaps observable.
    pub delay: Duration,
    active: Mutex<usize>,
    max_active: Mutex<usize>,
    busy_folders: Mutex<HashSet<String>>,
    overlap: AtomicBool,
}

impl FakeSessions {
    pub fn new(log: &Arc<Log>) -> Self {
        Self {
            log: Arc::clone(log),
            refuse: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            active: Mutex::new(0),
            max_active: Mutex::new(0),
            busy_folders: Mutex::new(HashSet::new()),
            overlap: AtomicBool::new(false),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn refuse(&self, account: &str, sub: &str) {
        self.refuse.lock().unwrap().insert(format!("{}/{}", account, sub));
    }

    /// Most receive sessions updating at once.
    pub fn max_active(&self) -> usize {
        *self.max_active.lock().unwrap()
    }

    /// True if two sessions ever updated the same folder at once.
    pub fn saw_folder_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }
}

pub struct FakeReceive {
    key: String,
    account: String,
    folder: Option<String>,
    connected: bool,
    shared: Arc<FakeSessions>,
    callback: Arc<dyn SessionCallback>,
}

impl ReceiveSession for FakeReceive {
    fn connect(&mut self) -> Result<(), SessionError> {
        self.shared.log.push(format!("connect {}", self.key));
        if self.shared.refuse.lock().unwrap().contains(&self.key) {
            return Err(SessionError::Connect("connection refused".into()));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.shared.log.push(format!("disconnect {}", self.key));
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn apply_offline_jobs(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    fn select_folder(&mut self, folder: &str, _flags: ReceiveFlags) -> Result<(), SessionError> {
        let path = format!("{}/{}", self.account, folder);
        self.shared.log.push(format!("select {}", path));
        self.folder = Some(path);
        Ok(())
    }

    fn update_messages(&mut self) -> Result<(), SessionError> {
        let folder = self.folder.clone().unwrap_or_default();
        {
            let mut active = self.shared.active.lock().unwrap();
            *active += 1;
            let mut max = self.shared.max_active.lock().unwrap();
            *max = (*max).max(*active);
            if !self.shared.busy_folders.lock().unwrap().insert(folder.clone()) {
                self.shared.overlap.store(true, Ordering::SeqCst);
            }
        }
        if !self.shared.delay.is_zero() {
            thread::sleep(self.shared.delay);
        }
        self.shared.busy_folders.lock().unwrap().remove(&folder);
        *self.shared.active.lock().unwrap() -= 1;
        self.shared.log.push(format!("update {}", folder));
        Ok(())
    }

    fn download_messages(&mut self, filter_set: Option<&SyncFilterSet>) -> Result<(), SessionError> {
        let folder = self.folder.clone().unwrap_or_default();
        match filter_set {
            Some(set) => self.shared.log.push(format!("download {} filter {}", folder, set.name)),
            None => self.shared.log.push(format!("download {}", folder)),
        }
        self.callback.notify_new_message();
        Ok(())
    }

    fn close_folder(&mut self) -> Result<(), SessionError> {
        if let Some(folder) = self.folder.take() {
            self.shared.log.push(format!("close {}", folder));
        }
        Ok(())
    }
}

pub struct FakeSend {
    key: String,
    shared: Arc<FakeSessions>,
}

impl SendSession for FakeSend {
    fn connect(&mut self) -> Result<(), SessionError> {
        self.shared.log.push(format!("smtp connect {}", self.key));
        Ok(())
    }

    fn send_message(&mut self, message: &OutgoingMessage) -> Result<(), SessionError> {
        self.shared.log.push(format!("smtp send {}", message.id));
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), SessionError> {
        self.shared.log.push(format!("smtp disconnect {}", self.key));
        Ok(())
    }
}

/// Wraps the shared fake so the factory can hand an `Arc` to each session.
pub struct Factory(pub Arc<FakeSessions>);

impl SessionFactory for Factory {
    fn receive_session(
        &self,
        account: Arc<dyn Account>,
        sub_account: &SubAccount,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Box<dyn ReceiveSession>, SessionError> {
        Ok(Box::new(FakeReceive {
            key: format!("{}/{}", account.name(), sub_account.name),
            account: account.name().to_string(),
            folder: None,
            connected: false,
            shared: Arc::clone(&self.0),
            callback,
        }))
    }

    fn send_session(
        &self,
        account: Arc<dyn Account>,
        sub_account: &SubAccount,
        _callback: Arc<dyn SessionCallback>,
    ) -> Result<Box<dyn SendSession>, SessionError> {
        Ok(Box::new(FakeSend {
            key: format!("{}/{}", account.name(), sub_account.name),
            shared: Arc::clone(&self.0),
        }))
    }
}

/// Dial-up connector with a scripted answer.
pub struct FakeDialup {
    pub network: bool,
    pub answer: Result<DialupResult, String>,
    pub log: Arc<Log>,
}

impl DialupConnector for FakeDialup {
    fn is_network_connected(&self) -> bool {
        self.network
    }

    fn connect(&self, entry: &str, callback: &dyn DialupCallback) -> Result<DialupResult, String> {
        self.log.push(format!("dial {}", entry));
        let mut params = DialupParams {
            entry: entry.to_string(),
            ..Default::default()
        };
        if !callback.pre_connect(&mut params) {
            return Ok(DialupResult::Canceled);
        }
        self.answer.clone()
    }

    fn disconnect(&self, _wait_seconds: u32) -> Result<(), String> {
        self.log.push("hang up");
        Ok(())
    }
}

/// Observer recording errors, progress threads and notifications.
#[derive(Default)]
pub struct RecordingObserver {
    /// Cancel each batch as soon as it starts.
    pub cancel_on_start: AtomicBool,
    cancellation: Cancellation,
    request: AtomicU64,
    errors: Mutex<Vec<SessionErrorInfo>>,
    threads: Mutex<Vec<ProgressId>>,
    starts: Mutex<Vec<SyncType>>,
    ends: Mutex<usize>,
    notifications: Mutex<usize>,
}

impl RecordingObserver {
    /// Cancel the batches started so far.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn errors(&self) -> Vec<SessionErrorInfo> {
        self.errors.lock().unwrap().clone()
    }

    pub fn threads(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    pub fn starts(&self) -> Vec<SyncType> {
        self.starts.lock().unwrap().clone()
    }

    pub fn ends(&self) -> usize {
        *self.ends.lock().unwrap()
    }

    pub fn notifications(&self) -> usize {
        *self.notifications.lock().unwrap()
    }
}

impl SyncObserver for RecordingObserver {
    fn start(&self, sync_type: SyncType) {
        self.request.store(self.cancellation.begin(), Ordering::SeqCst);
        if self.cancel_on_start.load(Ordering::SeqCst) {
            self.cancellation.cancel();
        }
        self.starts.lock().unwrap().push(sync_type);
    }

    fn end(&self) {
        *self.ends.lock().unwrap() += 1;
    }

    fn start_thread(&self, id: ProgressId, _sync_type: SyncType) {
        self.threads.lock().unwrap().push(id);
    }

    fn add_error(&self, _id: ProgressId, info: SessionErrorInfo) {
        self.errors.lock().unwrap().push(info);
    }

    fn is_canceled(&self, _id: ProgressId, _force: bool) -> bool {
        self.cancellation.is_canceled(self.request.load(Ordering::SeqCst))
    }

    fn notify_new_message(&self, _id: ProgressId) {
        *self.notifications.lock().unwrap() += 1;
    }
}

#[derive(Default)]
pub struct StatusLog(pub Mutex<Vec<SyncStatusEvent>>);

impl SyncStatusHandler for StatusLog {
    fn status_changed(&self, event: SyncStatusEvent) {
        self.0.lock().unwrap().push(event);
    }
}

/// Everything a manager test needs, wired together.
pub struct Harness {
    pub log: Arc<Log>,
    pub directory: Arc<FakeDirectory>,
    pub sessions: Arc<FakeSessions>,
    pub manager: SyncManager,
}

impl Harness {
    pub fn new(accounts: Vec<FakeAccount>, log: Arc<Log>, sessions: FakeSessions) -> Self {
        Self::with_dialup(accounts, log, sessions, Arc::new(NoDialup))
    }

    pub fn with_dialup(
        accounts: Vec<FakeAccount>,
        log: Arc<Log>,
        sessions: FakeSessions,
        dialup: Arc<dyn DialupConnector>,
    ) -> Self {
        init_tracing();
        let directory = Arc::new(FakeDirectory::new(accounts));
        let sessions = Arc::new(sessions);
        let manager = SyncManager::new(
            SyncContext {
                accounts: directory.clone(),
                sessions: Arc::new(Factory(Arc::clone(&sessions))),
                dialup,
            },
            16,
        );
        Self {
            log,
            directory,
            sessions,
            manager,
        }
    }
}

/// Poll `cond` for up to two seconds.
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

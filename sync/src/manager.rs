/*
 * manager.rs
 * Copyright (C) 2026 Chris Burdess
 *
 * This file is part of Tagliacarte, a cross-platform email client.
 *
 * Tagliacarte is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tagliacarte is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tagliacarte.  If not, see <http://www.gnu.org/licenses/>.
 */

//! Sync manager: runs work plans as background batches.
//!
//! Each [`SyncManager::sync`] call starts one batch thread. A batch brings the dial-up line up if its
//! plan asks for it, marks the application internally online, then takes groups of slots from the plan
//! until it runs dry. The slots of a group run concurrently: all but the last on scoped threads, the last
//! on the batch thread, joined before the next group is taken.
//!
//! Within a slot, items run in order and share one receive session per sub-account. A failing item is
//! reported to the observer and the slot moves on; a sub-account whose connect failed is skipped for the
//! rest of the slot. Nothing is retried.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::dialup::{Dial, DialupConnector, DialupLine};
use crate::error::{SessionError, SyncError};
use crate::filter::SyncFilterSet;
use crate::folder_wait::FolderRegistry;
use crate::lock;
use crate::observer::{ProgressId, SessionErrorInfo, SyncObserver, SyncStatusEvent, SyncStatusHandler, SyncType};
use crate::plan::{ReceiveItem, SendItem, WorkItem, WorkPlan};
use crate::session::{Host, ReceiveFlags, ReceiveSession, SessionCallback, SessionFactory};
use crate::store::{Account, AccountDirectory, FolderFlag, FolderId, FolderInfo, FolderKind, MessageHolder, SubAccount};

/// Collaborators a sync manager drives.
#[derive(Clone)]
pub struct SyncContext {
    pub accounts: Arc<dyn AccountDirectory>,
    pub sessions: Arc<dyn SessionFactory>,
    pub dialup: Arc<dyn DialupConnector>,
}

#[derive(Default)]
struct Batches {
    next_id: u64,
    running: HashMap<u64, JoinHandle<()>>,
    /// Handles of batches that removed themselves, joined lazily.
    finished: Vec<JoinHandle<()>>,
    disposed: bool,
}

impl Batches {
    /// Finished handles, minus the calling batch's own: a status handler runs on that thread.
    fn take_finished(&mut self) -> Vec<JoinHandle<()>> {
        let current = thread::current().id();
        let (own, others): (Vec<_>, Vec<_>) = std::mem::take(&mut self.finished)
            .into_iter()
            .partition(|h| h.thread().id() == current);
        self.finished = own;
        others
    }
}

fn join_finished(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            warn!("sync batch thread panicked");
        }
    }
}

struct Inner {
    context: SyncContext,
    max_batches: usize,
    batches: Mutex<Batches>,
    idle: Condvar,
    folders: FolderRegistry,
    line: DialupLine,
    handlers: Mutex<Vec<Arc<dyn SyncStatusHandler>>>,
}

/// Owns batch threads, the folder registry and the dial-up line. Cheap to clone.
#[derive(Clone)]
pub struct SyncManager {
    inner: Arc<Inner>,
}

impl SyncManager {
    pub fn new(context: SyncContext, max_batches: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                context,
                max_batches: max_batches.max(1),
                batches: Mutex::new(Batches::default()),
                idle: Condvar::new(),
                folders: FolderRegistry::new(),
                line: DialupLine::new(),
                handlers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn from_config(context: SyncContext, config: &SyncConfig) -> Self {
        Self::new(context, config.max_batches)
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.context
    }

    pub fn max_batches(&self) -> usize {
        self.inner.max_batches
    }

    /// Start a batch for `plan`. Returns false, without running anything, when the thread cannot be
    /// created, the batch limit is reached or the manager was disposed.
    pub fn sync(&self, plan: WorkPlan) -> bool {
        let finished;
        let started = {
            let mut batches = lock(&self.inner.batches);
            finished = batches.take_finished();
            if batches.disposed {
                warn!("sync manager disposed, batch refused");
                false
            } else if batches.running.len() >= self.inner.max_batches {
                warn!(max = self.inner.max_batches, "too many sync batches, batch refused");
                false
            } else {
                batches.next_id += 1;
                let id = batches.next_id;
                let inner = Arc::clone(&self.inner);
                let spawned = thread::Builder::new()
                    .name(format!("sync-batch-{}", id))
                    .spawn(move || {
                        let sync_type = plan.sync_type;
                        inner.run_batch(id, plan);
                        inner.finish_batch(id);
                        inner.fire(SyncStatusEvent::Finished(sync_type));
                    });
                match spawned {
                    Ok(handle) => {
                        batches.running.insert(id, handle);
                        true
                    }
                    Err(e) => {
                        error!(error = %SyncError::Thread(e), "could not start sync batch");
                        false
                    }
                }
            }
        };
        join_finished(finished);
        started
    }

    /// True while at least one batch is running.
    pub fn is_syncing(&self) -> bool {
        !lock(&self.inner.batches).running.is_empty()
    }

    /// Refuse new batches and block until every running batch, including its slot threads, is done.
    pub fn dispose(&self) {
        let finished = {
            let mut batches = lock(&self.inner.batches);
            batches.disposed = true;
            while !batches.running.is_empty() {
                batches = match self.inner.idle.wait(batches) {
                    Ok(b) => b,
                    Err(p) => p.into_inner(),
                };
            }
            batches.take_finished()
        };
        join_finished(finished);
    }

    pub fn add_handler(&self, handler: Arc<dyn SyncStatusHandler>) {
        lock(&self.inner.handlers).push(handler);
    }

    pub fn remove_handler(&self, handler: &Arc<dyn SyncStatusHandler>) {
        lock(&self.inner.handlers).retain(|h| !Arc::ptr_eq(h, handler));
    }

    /// Batches currently sharing the dial-up line.
    pub fn dialup_refs(&self) -> usize {
        self.inner.line.refs()
    }

    /// Folders currently locked or waited on.
    pub fn busy_folders(&self) -> usize {
        self.inner.folders.len()
    }
}

/// Calls `end()` on the observer when the batch scope exits.
struct EndGuard<'a>(&'a dyn SyncObserver);

impl Drop for EndGuard<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Keeps the account directory internally online for the batch.
struct InternalOnline<'a>(&'a dyn AccountDirectory);

impl<'a> InternalOnline<'a> {
    fn new(accounts: &'a dyn AccountDirectory) -> Self {
        accounts.increment_internal_online();
        Self(accounts)
    }
}

impl Drop for InternalOnline<'_> {
    fn drop(&mut self) {
        self.0.decrement_internal_online();
    }
}

struct Batch {
    observer: Arc<dyn SyncObserver>,
    sync_type: SyncType,
}

impl Batch {
    fn canceled(&self, id: ProgressId) -> bool {
        self.observer.is_canceled(id, false)
    }

    fn report(&self, id: ProgressId, account: &str, sub_account: &str, folder: Option<&str>, e: &SyncError) {
        if matches!(e, SyncError::Session(SessionError::Cancelled)) {
            debug!(account, "operation cancelled");
            return;
        }
        warn!(account, sub_account, folder = folder.unwrap_or(""), error = %e, "sync item failed");
        let mut info = SessionErrorInfo::new(account, e.to_string());
        if !sub_account.is_empty() {
            info = info.sub_account(sub_account);
        }
        if let Some(folder) = folder {
            info = info.folder(folder);
        }
        self.observer.add_error(id, info);
    }
}

/// Session callback for one slot and sub-account.
struct SlotCallback {
    observer: Arc<dyn SyncObserver>,
    id: ProgressId,
    account: String,
    sub_account: String,
    notify: bool,
}

impl SessionCallback for SlotCallback {
    fn is_canceled(&self, force: bool) -> bool {
        self.observer.is_canceled(self.id, force)
    }

    fn set_pos(&self, pos: usize) {
        self.observer.set_pos(self.id, false, pos);
    }

    fn set_range(&self, min: usize, max: usize) {
        self.observer.set_range(self.id, false, min, max);
    }

    fn set_sub_pos(&self, pos: usize) {
        self.observer.set_pos(self.id, true, pos);
    }

    fn set_sub_range(&self, min: usize, max: usize) {
        self.observer.set_range(self.id, true, min, max);
    }

    fn set_message(&self, message: &str) {
        self.observer.set_message(self.id, message);
    }

    fn add_error(&self, info: SessionErrorInfo) {
        self.observer.add_error(self.id, info);
    }

    fn notify_new_message(&self) {
        if self.notify {
            self.observer.notify_new_message(self.id);
        }
    }

    fn get_password(&self, host: Host, user: &str) -> Option<String> {
        self.observer
            .get_password(self.id, &self.account, &self.sub_account, host, user)
    }

    fn set_password(&self, host: Host, user: &str, password: &str, permanent: bool) {
        self.observer
            .set_password(self.id, &self.account, &self.sub_account, host, user, password, permanent);
    }
}

type SessionKey = (String, String);

struct OpenSession {
    key: SessionKey,
    session: Box<dyn ReceiveSession>,
}

/// Receive session reused across the items of a slot.
#[derive(Default)]
struct SlotSessions {
    open: Option<OpenSession>,
    failed: HashSet<SessionKey>,
}

fn is_normal(folder: &FolderInfo) -> bool {
    folder.kind == FolderKind::Normal
}

fn save_error(e: SessionError) -> SyncError {
    SyncError::Save(e.to_string())
}

impl Inner {
    fn fire(&self, event: SyncStatusEvent) {
        let handlers = lock(&self.handlers).clone();
        for h in handlers {
            h.status_changed(event);
        }
    }

    fn finish_batch(&self, id: u64) {
        {
            let mut batches = lock(&self.batches);
            if let Some(handle) = batches.running.remove(&id) {
                batches.finished.push(handle);
            }
        }
        self.idle.notify_all();
    }

    fn run_batch(&self, id: u64, mut plan: WorkPlan) {
        let batch = Batch {
            observer: Arc::clone(&plan.observer),
            sync_type: plan.sync_type,
        };
        batch.observer.start(batch.sync_type);
        let _end = EndGuard(batch.observer.as_ref());
        self.fire(SyncStatusEvent::Started(batch.sync_type));
        info!(batch = id, sync_type = ?batch.sync_type, "sync batch started");

        let dialup = plan.dialup.clone();
        let _lease = match &dialup {
            Some(profile) => match self.line.acquire(profile, self.context.dialup.as_ref(), batch.observer.as_ref()) {
                Ok(Dial::Up(lease)) => Some(lease),
                Ok(Dial::Skipped) => None,
                Ok(Dial::Canceled) => {
                    info!(batch = id, "dial-up cancelled, batch ends");
                    return;
                }
                Err(e) => {
                    error!(batch = id, error = %e, "dial-up failed, batch aborted");
                    batch.observer.add_error(ProgressId::BATCH, SessionErrorInfo::new("", e.to_string()));
                    return;
                }
            },
            None => None,
        };

        {
            let _online = InternalOnline::new(self.context.accounts.as_ref());
            let mut groups = 0usize;
            loop {
                if batch.canceled(ProgressId::BATCH) {
                    debug!(batch = id, "batch cancelled");
                    break;
                }
                let Some(mut group) = plan.next_group() else {
                    break;
                };
                group.retain(|slot| !slot.is_empty());
                groups += 1;
                self.run_group(&batch, &group);
            }
            debug!(batch = id, groups, "work plan drained");
        }
        drop(plan);
        drop(_lease);
        info!(batch = id, "sync batch finished");
    }

    /// All slots but the last on their own threads, the last here, then join.
    fn run_group(&self, batch: &Batch, group: &[Vec<WorkItem>]) {
        let Some((last, parallel)) = group.split_last() else {
            return;
        };
        if parallel.is_empty() {
            self.sync_slot(batch, last);
            return;
        }
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(parallel.len());
            let mut inline = Vec::new();
            for slot in parallel {
                let spawned = thread::Builder::new()
                    .name("sync-slot".into())
                    .spawn_scoped(scope, move || self.sync_slot(batch, slot));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        warn!(error = %e, "could not start slot thread, running slot inline");
                        inline.push(slot);
                    }
                }
            }
            for slot in inline {
                self.sync_slot(batch, slot);
            }
            self.sync_slot(batch, last);
            for handle in handles {
                if handle.join().is_err() {
                    error!("sync slot thread panicked");
                }
            }
        });
    }

    fn sync_slot(&self, batch: &Batch, slot: &[WorkItem]) {
        let id = ProgressId::next();
        batch.observer.start_thread(id, batch.sync_type);
        let mut sessions = SlotSessions::default();
        for item in slot {
            if batch.canceled(id) {
                debug!("slot cancelled");
                break;
            }
            self.sync_item(batch, id, &mut sessions, item);
        }
        if let Some(mut open) = sessions.open.take() {
            if let Err(e) = open.session.disconnect() {
                batch.report(id, &open.key.0, &open.key.1, None, &e.into());
            }
        }
        batch.observer.end_thread(id);
    }

    fn sync_item(&self, batch: &Batch, id: ProgressId, sessions: &mut SlotSessions, item: &WorkItem) {
        let Some(account) = self.context.accounts.account(item.account()) else {
            let e = SyncError::UnknownAccount(item.account().to_string());
            batch.report(id, item.account(), item.sub_account(), None, &e);
            return;
        };
        let sub = if item.sub_account().is_empty() {
            account.current_sub_account()
        } else {
            match account.sub_account(item.sub_account()) {
                Some(sub) => sub,
                None => {
                    let e = SyncError::UnknownAccount(format!("{}/{}", item.account(), item.sub_account()));
                    batch.report(id, item.account(), item.sub_account(), None, &e);
                    return;
                }
            }
        };
        let key = (account.name().to_string(), sub.name.clone());
        if sessions.failed.contains(&key) {
            debug!(account = %key.0, sub_account = %key.1, "skipping item, connect failed earlier");
            return;
        }
        match item {
            WorkItem::Receive(r) => self.receive_item(batch, id, sessions, &account, &sub, key, r),
            WorkItem::Send(s) => self.send_item(batch, id, sessions, &account, &sub, key, s),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn receive_item(
        &self,
        batch: &Batch,
        id: ProgressId,
        sessions: &mut SlotSessions,
        account: &Arc<dyn Account>,
        sub: &SubAccount,
        key: SessionKey,
        item: &ReceiveItem,
    ) {
        let folder = match account.folder(&item.folder) {
            Some(f) if is_normal(&f) => f,
            _ => {
                let e = SyncError::UnknownFolder(item.folder.clone());
                batch.report(id, account.name(), &sub.name, Some(&item.folder), &e);
                return;
            }
        };
        if !folder.is_syncable() {
            debug!(folder = %folder.name, "folder not syncable, skipped");
            return;
        }
        let Some(session) = self.receive_session(batch, id, sessions, account, sub, key) else {
            return;
        };
        let result = self.sync_folder(
            batch,
            id,
            account.as_ref(),
            session,
            &folder.name,
            item.filter_set.as_deref(),
            item.flags,
            item.apply_rules,
        );
        if let Err(e) = result {
            batch.report(id, account.name(), &sub.name, Some(&folder.name), &e);
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn send_item(
        &self,
        batch: &Batch,
        id: ProgressId,
        sessions: &mut SlotSessions,
        account: &Arc<dyn Account>,
        sub: &SubAccount,
        key: SessionKey,
        item: &SendItem,
    ) {
        let outbox = account.folder_by_flag(FolderFlag::Outbox).filter(is_normal);
        let sync_outbox = outbox.as_ref().is_some_and(FolderInfo::is_syncable);
        if sync_outbox || sub.receive_before_send(item.receive_before_send) {
            let Some(session) = self.receive_session(batch, id, sessions, account, sub, key) else {
                return;
            };
            if let Some(outbox) = outbox.as_ref().filter(|_| sync_outbox) {
                let result = self.sync_folder(
                    batch,
                    id,
                    account.as_ref(),
                    session,
                    &outbox.name,
                    None,
                    ReceiveFlags::default(),
                    false,
                );
                if let Err(e) = result {
                    batch.report(id, account.name(), &sub.name, Some(&outbox.name), &e);
                }
            }
            if batch.canceled(id) {
                return;
            }
        }
        if let Err(e) = self.send(batch, id, account, sub, item) {
            batch.report(id, account.name(), &sub.name, None, &e);
        }
    }

    /// Receive session for `key`: the open one if it belongs to the same sub-account and is still
    /// connected, otherwise a fresh one. A failed open marks the sub-account for the rest of the slot.
    fn receive_session<'s>(
        &self,
        batch: &Batch,
        id: ProgressId,
        sessions: &'s mut SlotSessions,
        account: &Arc<dyn Account>,
        sub: &SubAccount,
        key: SessionKey,
    ) -> Option<&'s mut (dyn ReceiveSession + 'static)> {
        let reuse = sessions
            .open
            .as_ref()
            .is_some_and(|o| o.key == key && o.session.is_connected());
        if reuse {
            debug!(account = %key.0, sub_account = %key.1, "reusing receive session");
        } else {
            if let Some(mut old) = sessions.open.take() {
                if let Err(e) = old.session.disconnect() {
                    batch.report(id, &old.key.0, &old.key.1, None, &e.into());
                }
            }
            match self.open_receive_session(batch, id, account, sub) {
                Ok(session) => sessions.open = Some(OpenSession { key, session }),
                Err(e) => {
                    batch.report(id, account.name(), &sub.name, None, &e);
                    sessions.failed.insert(key);
                    return None;
                }
            }
        }
        sessions.open.as_mut().map(|o| o.session.as_mut())
    }

    fn open_receive_session(
        &self,
        batch: &Batch,
        id: ProgressId,
        account: &Arc<dyn Account>,
        sub: &SubAccount,
    ) -> Result<Box<dyn ReceiveSession>, SyncError> {
        batch.observer.set_account(id, account.name(), &sub.name);
        let callback = Arc::new(SlotCallback {
            observer: Arc::clone(&batch.observer),
            id,
            account: account.name().to_string(),
            sub_account: sub.name.clone(),
            notify: batch.sync_type.notifies_new_messages(),
        });
        let mut session = self
            .context
            .sessions
            .receive_session(Arc::clone(account), sub, callback)?;
        session.connect()?;
        debug!(account = %account.name(), sub_account = %sub.name, "receive session connected");
        if let Err(e) = session.apply_offline_jobs() {
            let _ = session.disconnect();
            return Err(e.into());
        }
        Ok(session)
    }

    /// Select, update, download and optionally apply rules, then persist and close. Cancellation skips the
    /// remaining network phases but the folder is still saved and closed.
    #[allow(clippy::too_many_arguments)]
    fn sync_folder(
        &self,
        batch: &Batch,
        id: ProgressId,
        account: &dyn Account,
        session: &mut dyn ReceiveSession,
        folder: &str,
        filter_set: Option<&SyncFilterSet>,
        flags: ReceiveFlags,
        apply_rules: bool,
    ) -> Result<(), SyncError> {
        batch.observer.set_folder(id, folder);
        let _guard = self.folders.acquire(&FolderId::new(account.name(), folder));
        if batch.canceled(id) {
            return Ok(());
        }
        account.load_messages(folder)?;
        session.select_folder(folder, flags)?;
        account.set_last_sync_time(folder, Utc::now());

        let mut phases = || -> Result<(), SyncError> {
            if batch.canceled(id) {
                return Ok(());
            }
            session.update_messages()?;
            if batch.canceled(id) {
                return Ok(());
            }
            session.download_messages(filter_set)?;
            if apply_rules && !batch.canceled(id) {
                account.apply_rules(folder)?;
            }
            Ok(())
        };
        let result = phases();
        let saved = account
            .flush_message_store()
            .and_then(|_| account.save_messages(folder))
            .map_err(save_error);
        let closed = session.close_folder().map_err(SyncError::from);
        debug!(account = %account.name(), folder, ok = result.is_ok(), "folder synchronized");
        result.and(saved).and(closed)
    }

    fn send(
        &self,
        batch: &Batch,
        id: ProgressId,
        account: &Arc<dyn Account>,
        sub: &SubAccount,
        item: &SendItem,
    ) -> Result<(), SyncError> {
        batch.observer.set_account(id, account.name(), &sub.name);
        let outbox = account
            .folder_by_flag(FolderFlag::Outbox)
            .filter(is_normal)
            .ok_or_else(|| SyncError::UnavailableFolder("outbox".into()))?;
        let sentbox = account
            .folder_by_flag(FolderFlag::Sentbox)
            .filter(is_normal)
            .ok_or_else(|| SyncError::UnavailableFolder("sentbox".into()))?;
        account.load_messages(&outbox.name)?;

        let messages: Vec<MessageHolder> = {
            let _lock = lock(account.message_lock());
            account
                .messages(&outbox.name)
                .into_iter()
                .filter(MessageHolder::is_sendable)
                .filter(|m| item.message_id.as_deref().map_or(true, |wanted| m.id == wanted))
                .filter(|m| {
                    sub.identity.is_empty()
                        || m.sub_account
                            .as_deref()
                            .and_then(|name| account.sub_account(name))
                            .is_some_and(|s| s.identity == sub.identity)
                })
                .collect()
        };
        if messages.is_empty() {
            debug!(account = %account.name(), sub_account = %sub.name, "nothing to send");
            return Ok(());
        }

        let _guard = self.folders.acquire(&FolderId::new(account.name(), outbox.name.as_str()));
        let callback = Arc::new(SlotCallback {
            observer: Arc::clone(&batch.observer),
            id,
            account: account.name().to_string(),
            sub_account: sub.name.clone(),
            notify: false,
        });
        let mut session = self.context.sessions.send_session(Arc::clone(account), sub, callback)?;
        session.connect()?;
        batch.observer.set_range(id, false, 0, messages.len());

        let mut send_all = || -> Result<(), SyncError> {
            for (n, holder) in messages.iter().enumerate() {
                if batch.canceled(id) {
                    debug!(sent = n, "send cancelled");
                    break;
                }
                let message = account.load_outgoing(&outbox.name, holder)?;
                session.send_message(&message)?;
                account.mark_sent(&outbox.name, &sentbox.name, holder).map_err(save_error)?;
                batch.observer.set_pos(id, false, n + 1);
            }
            Ok(())
        };
        let result = send_all();
        let disconnected = session.disconnect().map_err(SyncError::from);
        info!(account = %account.name(), sub_account = %sub.name, count = messages.len(), ok = result.is_ok(), "outbox sent");
        result.and(disconnected)
    }
}

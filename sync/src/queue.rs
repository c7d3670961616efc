/*
 * queue.rs
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

//! Change-driven sync: folders touched by the user are queued and synchronized in the background.
//!
//! [`SyncQueue::push_folder`] records the folder and, unless its account is already being synchronized,
//! schedules a drain. Drains are debounced: a burst of pushes produces one drain. Each drain starts one
//! active batch per account whose work plan keeps pulling that account's queued folders until none are
//! left, so folders pushed while the batch runs are picked up by the same batch.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::lock;
use crate::manager::SyncManager;
use crate::observer::{SyncObserver, SyncType};
use crate::plan::{ReceiveItem, Slot, WorkItem, WorkPlan, WorkSource};
use crate::session::ReceiveFlags;
use crate::store::{AccountDirectory, FolderFlag, FolderId, FolderKind};

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingFolder {
    /// `//account/folder` path form.
    path: String,
    cancelable: bool,
}

struct QueueInner {
    manager: SyncManager,
    observer: Arc<dyn SyncObserver>,
    /// Lock order: `pending` before `syncing`.
    pending: Mutex<Vec<PendingFolder>>,
    syncing: Mutex<HashSet<String>>,
    scheduled: AtomicBool,
    wake: Mutex<Option<mpsc::Sender<()>>>,
}

pub struct SyncQueue {
    inner: Arc<QueueInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SyncQueue {
    /// Queue feeding `manager`; active batches report to `observer`. Call [`SyncQueue::start`] to drain
    /// automatically, or [`SyncQueue::drain`] to drain by hand.
    pub fn new(manager: SyncManager, observer: Arc<dyn SyncObserver>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                manager,
                observer,
                pending: Mutex::new(Vec::new()),
                syncing: Mutex::new(HashSet::new()),
                scheduled: AtomicBool::new(false),
                wake: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Start the drain thread. Each drain waits until no push arrived for `delay`.
    pub fn start(&self, delay: Duration) -> Result<(), SyncError> {
        let mut worker = lock(&self.worker);
        if worker.is_some() {
            return Ok(());
        }
        let (tx, rx) = mpsc::channel::<()>();
        let inner = Arc::clone(&self.inner);
        let handle = thread::Builder::new()
            .name("sync-queue".into())
            .spawn(move || {
                while rx.recv().is_ok() {
                    loop {
                        match rx.recv_timeout(delay) {
                            Ok(()) => continue,
                            Err(RecvTimeoutError::Timeout) => break,
                            Err(RecvTimeoutError::Disconnected) => return,
                        }
                    }
                    inner.drain();
                }
            })
            .map_err(SyncError::Thread)?;
        *worker = Some(handle);
        *lock(&self.inner.wake) = Some(tx.clone());
        // Pushes made before the thread existed may have set `scheduled` without waking anyone.
        if !lock(&self.inner.pending).is_empty() {
            self.inner.scheduled.store(true, Ordering::SeqCst);
            let _ = tx.send(());
        }
        Ok(())
    }

    /// Stop the drain thread. Queued folders stay queued.
    pub fn stop(&self) {
        lock(&self.inner.wake).take();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                warn!("sync queue thread panicked");
            }
        }
    }

    /// Queue `folder`. A cancelable push replaces every queued cancelable entry.
    pub fn push_folder(&self, folder: &FolderId, cancelable: bool) {
        let busy = {
            let mut pending = lock(&self.inner.pending);
            if cancelable {
                pending.retain(|p| !p.cancelable);
            }
            pending.push(PendingFolder {
                path: folder.to_path(),
                cancelable,
            });
            lock(&self.inner.syncing).contains(&folder.account)
        };
        debug!(folder = %folder, cancelable, busy, "folder queued");
        if !busy {
            self.inner.schedule();
        }
    }

    pub fn push_folders(&self, folders: &[FolderId], cancelable: bool) {
        for folder in folders {
            self.push_folder(folder, cancelable);
        }
    }

    /// Queued folders with their cancelable flag, in push order. Unparseable entries are skipped.
    pub fn pending_entries(&self) -> Vec<(FolderId, bool)> {
        lock(&self.inner.pending)
            .iter()
            .filter_map(|p| FolderId::parse_path(&p.path).map(|id| (id, p.cancelable)))
            .collect()
    }

    /// Accounts with an active batch pulling from this queue.
    pub fn syncing_accounts(&self) -> Vec<String> {
        let mut accounts: Vec<String> = lock(&self.inner.syncing).iter().cloned().collect();
        accounts.sort();
        accounts
    }

    /// True when a drain was requested and has not run yet.
    pub fn is_scheduled(&self) -> bool {
        self.inner.scheduled.load(Ordering::SeqCst)
    }

    /// Start a batch for every queued account not already syncing. Returns the accounts started.
    pub fn drain(&self) -> Vec<String> {
        self.inner.drain()
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.stop();
    }
}

impl QueueInner {
    /// Request a drain. Repeated requests before the drain runs collapse into one.
    fn schedule(&self) {
        if self.scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(tx) = lock(&self.wake).as_ref() {
            let _ = tx.send(());
        }
    }

    fn drain(self: &Arc<Self>) -> Vec<String> {
        self.scheduled.store(false, Ordering::SeqCst);
        let accounts: BTreeSet<String> = {
            let pending = lock(&self.pending);
            let mut syncing = lock(&self.syncing);
            let accounts: BTreeSet<String> = pending
                .iter()
                .filter_map(|p| FolderId::parse_path(&p.path))
                .map(|id| id.account)
                .filter(|a| !syncing.contains(a))
                .collect();
            syncing.extend(accounts.iter().cloned());
            accounts
        };
        let mut started = Vec::new();
        for account in accounts {
            let source = QueueSource {
                queue: Arc::clone(self),
                account: account.clone(),
                done: false,
            };
            let plan = WorkPlan::new(SyncType::Active, Arc::clone(&self.observer), Box::new(source));
            if self.manager.sync(plan) {
                info!(account = %account, "active sync started");
                started.push(account);
            } else {
                warn!(account = %account, "active sync refused");
            }
        }
        started
    }
}

/// Work source pulling one account's queued folders.
struct QueueSource {
    queue: Arc<QueueInner>,
    account: String,
    done: bool,
}

impl QueueSource {
    fn directory(&self) -> &dyn AccountDirectory {
        self.queue.manager.context().accounts.as_ref()
    }
}

impl WorkSource for QueueSource {
    fn next_group(&mut self) -> Option<Vec<Slot>> {
        if self.done {
            return None;
        }
        let mut pending = lock(&self.queue.pending);
        let mut folders: Vec<String> = Vec::new();
        pending.retain(|p| match FolderId::parse_path(&p.path) {
            Some(id) if id.account == self.account => {
                folders.push(id.folder);
                false
            }
            Some(_) => true,
            None => false,
        });

        let account = self.directory().account(&self.account);
        let mut seen = HashSet::new();
        let slot: Slot = folders
            .into_iter()
            .filter(|f| seen.insert(f.clone()))
            .filter(|f| {
                let valid = account
                    .as_ref()
                    .and_then(|a| a.folder(f))
                    .is_some_and(|info| info.kind == FolderKind::Normal && !info.has_flag(FolderFlag::NoSelect));
                if !valid {
                    debug!(account = %self.account, folder = %f, "dropping stale queued folder");
                }
                valid
            })
            .map(|folder| {
                WorkItem::Receive(ReceiveItem {
                    account: self.account.clone(),
                    sub_account: String::new(),
                    folder,
                    filter_set: None,
                    flags: ReceiveFlags::default(),
                    apply_rules: false,
                })
            })
            .collect();

        if slot.is_empty() {
            lock(&self.queue.syncing).remove(&self.account);
            self.done = true;
            debug!(account = %self.account, "active sync queue empty");
            return None;
        }
        Some(vec![slot])
    }
}

impl Drop for QueueSource {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        // Batch ended early (cancelled, refused or dial-up aborted). Folders still queued for the
        // account wait for the next push.
        let _pending = lock(&self.queue.pending);
        if lock(&self.queue.syncing).remove(&self.account) {
            debug!(account = %self.account, "active sync ended early");
        }
    }
}

/// Pushes folders to the queue when the user changes them.
pub struct ActiveSyncInvoker {
    queue: Arc<SyncQueue>,
    accounts: Arc<dyn AccountDirectory>,
}

impl ActiveSyncInvoker {
    pub fn new(queue: Arc<SyncQueue>, accounts: Arc<dyn AccountDirectory>) -> Self {
        Self { queue, accounts }
    }

    /// Messages were appended to `folder`. Returns true if the folder was queued.
    pub fn message_appended(&self, folder: &FolderId, active: bool) -> bool {
        self.invoke(folder, active, false)
    }

    /// Messages were copied or moved into `to`.
    pub fn message_copied(&self, to: &FolderId, active: bool) -> bool {
        self.invoke(to, active, false)
    }

    /// The user opened `folder`. A later open supersedes this one if it has not run yet.
    pub fn folder_opened(&self, folder: &FolderId) -> bool {
        self.invoke(folder, true, true)
    }

    fn invoke(&self, folder: &FolderId, active: bool, cancelable: bool) -> bool {
        if !active || self.accounts.is_offline() {
            return false;
        }
        let wanted = self
            .accounts
            .account(&folder.account)
            .and_then(|a| a.folder(&folder.folder))
            .is_some_and(|f| f.is_syncable() && f.has_flag(FolderFlag::SyncWhenOpen));
        if wanted {
            self.queue.push_folder(folder, cancelable);
        }
        wanted
    }
}

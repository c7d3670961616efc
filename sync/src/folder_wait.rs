/*
 * folder_wait.rs
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

//! Per-folder mutual exclusion for sync items.
//!
//! At most one item works on a folder at a time, across all batches. Entries are created on first
//! acquire and removed when the last holder or waiter lets go, so the map only contains folders
//! currently in use. Each account also keeps a count of the logical locks held on each of its folders,
//! which debug builds check is exactly one while a guard is alive.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use tracing::trace;

use crate::lock;
use crate::store::FolderId;

#[derive(Default)]
struct FolderEntry {
    held: Mutex<bool>,
    released: Condvar,
}

struct Slot {
    entry: Arc<FolderEntry>,
    /// Holder plus waiters.
    users: usize,
}

#[derive(Default)]
pub struct FolderRegistry {
    folders: Mutex<HashMap<FolderId, Slot>>,
    /// Account name to held folder names and their lock counts.
    accounts: Mutex<HashMap<String, HashMap<String, usize>>>,
}

impl FolderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `folder` is free, then hold it until the guard drops.
    pub fn acquire(&self, folder: &FolderId) -> FolderGuard<'_> {
        let entry = {
            let mut folders = lock(&self.folders);
            let slot = folders.entry(folder.clone()).or_insert_with(|| Slot {
                entry: Arc::new(FolderEntry::default()),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.entry)
        };
        {
            let mut held = lock(&entry.held);
            if *held {
                trace!(folder = %folder, "waiting for folder");
            }
            while *held {
                held = match entry.released.wait(held) {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
            }
            debug_assert!(!*held);
            *held = true;
        }
        self.count_lock(folder);
        FolderGuard {
            registry: self,
            folder: folder.clone(),
            entry,
        }
    }

    /// Folders currently held or waited on.
    pub fn len(&self) -> usize {
        lock(&self.folders).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical locks currently held on folders of `account`.
    pub fn account_locks(&self, account: &str) -> usize {
        lock(&self.accounts).get(account).map_or(0, |held| held.values().sum())
    }

    fn count_lock(&self, folder: &FolderId) {
        let mut accounts = lock(&self.accounts);
        let count = accounts
            .entry(folder.account.clone())
            .or_default()
            .entry(folder.folder.clone())
            .or_insert(0);
        *count += 1;
        debug_assert_eq!(*count, 1, "folder {} locked more than once", folder);
    }

    fn count_unlock(&self, folder: &FolderId) {
        let mut accounts = lock(&self.accounts);
        let Some(held) = accounts.get_mut(&folder.account) else {
            debug_assert!(false, "unlocking {} with no account locks", folder);
            return;
        };
        let count = held.remove(&folder.folder).unwrap_or(0);
        debug_assert_eq!(count, 1, "folder {} had {} locks at release", folder, count);
        if held.is_empty() {
            accounts.remove(&folder.account);
        }
    }

    fn release(&self, folder: &FolderId, entry: &FolderEntry) {
        self.count_unlock(folder);
        let mut folders = lock(&self.folders);
        {
            let mut held = lock(&entry.held);
            debug_assert!(*held, "releasing a folder that is not held");
            *held = false;
        }
        entry.released.notify_one();
        if let Some(slot) = folders.get_mut(folder) {
            slot.users -= 1;
            if slot.users == 0 {
                folders.remove(folder);
            }
        }
    }
}

/// Exclusive hold on one folder.
pub struct FolderGuard<'a> {
    registry: &'a FolderRegistry,
    folder: FolderId,
    entry: Arc<FolderEntry>,
}

impl FolderGuard<'_> {
    pub fn folder(&self) -> &FolderId {
        &self.folder
    }
}

impl Drop for FolderGuard<'_> {
    fn drop(&mut self) {
        self.registry.release(&self.folder, &self.entry);
    }
}

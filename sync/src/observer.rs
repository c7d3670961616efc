/*
 * observer.rs
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

//! Observer contract between the sync engine and the UI.
//!
//! The engine never blocks on the UI beyond these calls; every runtime failure is delivered through
//! [`SyncObserver::add_error`]. Progress is keyed by [`ProgressId`]: [`ProgressId::BATCH`] for the batch
//! itself, and a fresh id per slot thread.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::dialup::DialupParams;
use crate::session::Host;

/// What started a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncType {
    /// User asked for it.
    Manual,
    /// AutoPilot fired a course.
    Auto,
    /// Change-driven sync after a user touched a folder.
    Active,
}

impl SyncType {
    /// New-message notifications are raised for manual and automatic batches only.
    pub fn notifies_new_messages(self) -> bool {
        !matches!(self, SyncType::Active)
    }
}

/// Identifies a progress line (batch or slot thread).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u32);

impl ProgressId {
    pub const BATCH: ProgressId = ProgressId(0);

    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let mut id = NEXT.fetch_add(1, Ordering::Relaxed);
        if id == 0 {
            id = NEXT.fetch_add(1, Ordering::Relaxed);
        }
        ProgressId(id)
    }
}

/// One reported failure.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionErrorInfo {
    pub account: String,
    pub sub_account: Option<String>,
    pub folder: Option<String>,
    pub message: String,
    /// Extra lines (server response, cause chain).
    pub details: Vec<String>,
}

impl SessionErrorInfo {
    pub fn new(account: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn sub_account(mut self, sub_account: impl Into<String>) -> Self {
        self.sub_account = Some(sub_account.into());
        self
    }

    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    pub fn detail(mut self, line: impl std::fmt::Display) -> Self {
        self.details.push(line.to_string());
        self
    }
}

/// Progress, error and cancellation sink implemented by the UI.
pub trait SyncObserver: Send + Sync {
    fn start(&self, sync_type: SyncType);

    fn end(&self);

    fn start_thread(&self, _id: ProgressId, _sync_type: SyncType) {}

    fn end_thread(&self, _id: ProgressId) {}

    fn set_pos(&self, _id: ProgressId, _sub: bool, _pos: usize) {}

    fn set_range(&self, _id: ProgressId, _sub: bool, _min: usize, _max: usize) {}

    fn set_account(&self, _id: ProgressId, _account: &str, _sub_account: &str) {}

    fn set_folder(&self, _id: ProgressId, _folder: &str) {}

    fn set_message(&self, _id: ProgressId, _message: &str) {}

    fn add_error(&self, id: ProgressId, info: SessionErrorInfo);

    /// Polled at every checkpoint. `force` asks whether the user insists (e.g. second click).
    fn is_canceled(&self, id: ProgressId, force: bool) -> bool;

    fn get_password(&self, _id: ProgressId, _account: &str, _sub_account: &str, _host: Host, _user: &str) -> Option<String> {
        None
    }

    fn set_password(&self, _id: ProgressId, _account: &str, _sub_account: &str, _host: Host, _user: &str, _password: &str, _permanent: bool) {}

    /// Ask the user which dial-up entry to use. `None` means do not dial.
    fn select_dialup_entry(&self) -> Option<String> {
        None
    }

    /// Show the dial-up dialog; the user may edit `params`. Returns false if cancelled.
    fn show_dialup_dialog(&self, _params: &mut DialupParams) -> bool {
        true
    }

    fn notify_new_message(&self, _id: ProgressId) {}
}

/// Batch lifecycle events delivered to status handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatusEvent {
    Started(SyncType),
    Finished(SyncType),
}

/// Listener for batch start and end (status bar, tray icon).
pub trait SyncStatusHandler: Send + Sync {
    fn status_changed(&self, event: SyncStatusEvent);
}

/// Cooperative cancellation keyed by monotonic request ids.
///
/// Each batch takes a request id with [`Cancellation::begin`]. [`Cancellation::cancel`] cancels every
/// request started so far; requests started afterwards are unaffected.
#[derive(Debug, Default)]
pub struct Cancellation {
    last_request: AtomicU64,
    canceled_upto: AtomicU64,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> u64 {
        self.last_request.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn cancel(&self) {
        let last = self.last_request.load(Ordering::SeqCst);
        self.canceled_upto.fetch_max(last, Ordering::SeqCst);
    }

    pub fn is_canceled(&self, request: u64) -> bool {
        request != 0 && request <= self.canceled_upto.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_applies_to_started_requests_only() {
        let c = Cancellation::new();
        let a = c.begin();
        let b = c.begin();
        assert!(!c.is_canceled(a));
        c.cancel();
        assert!(c.is_canceled(a));
        assert!(c.is_canceled(b));
        let d = c.begin();
        assert!(!c.is_canceled(d));
    }

    #[test]
    fn progress_ids_never_collide_with_batch() {
        for _ in 0..100 {
            assert_ne!(ProgressId::next(), ProgressId::BATCH);
        }
    }

    #[test]
    fn active_sync_is_silent() {
        assert!(SyncType::Manual.notifies_new_messages());
        assert!(SyncType::Auto.notifies_new_messages());
        assert!(!SyncType::Active.notifies_new_messages());
    }
}

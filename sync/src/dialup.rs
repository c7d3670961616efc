/*
 * dialup.rs
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

//! Dial-up profiles and the shared dial-up line.
//!
//! Several batches may run at once (an AutoPilot course and a manual sync, say). They share one physical
//! connection: the first batch dials, later batches reuse it, and only the batch that drops the reference
//! count to zero hangs up, unless its profile says not to.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::lock;
use crate::observer::{ProgressId, SessionErrorInfo, SyncObserver};

/// Dial-up settings attached to a course.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialupProfile {
    /// Phonebook entry. `None` asks the user at sync time.
    pub entry: Option<String>,
    pub show_dialog: bool,
    /// Only dial when no network connection exists.
    pub whenever_not_connected: bool,
    /// Leave the line up after the batch.
    pub do_not_disconnect: bool,
    /// Dialing location (area code rules).
    pub dial_from: Option<String>,
    /// Seconds to wait before hanging up.
    pub disconnect_wait: u32,
}

/// Parameters shown in the dial-up dialog; the user may edit them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialupParams {
    pub entry: String,
    pub phone_number: String,
    pub user: String,
    pub password: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialupResult {
    Connected,
    Canceled,
}

/// Hooks a connector calls while dialing.
pub trait DialupCallback: Send + Sync {
    fn is_canceled(&self) -> bool;

    /// Called before dialing. Returns false if the user cancelled.
    fn pre_connect(&self, params: &mut DialupParams) -> bool;

    fn set_message(&self, message: &str);

    fn error(&self, message: &str);
}

/// Platform dial-up (RAS, NetworkManager, ...). Errors are human-readable messages.
pub trait DialupConnector: Send + Sync {
    fn is_network_connected(&self) -> bool;

    fn set_location(&self, _location: &str) {}

    fn connect(&self, entry: &str, callback: &dyn DialupCallback) -> Result<DialupResult, String>;

    fn disconnect(&self, wait_seconds: u32) -> Result<(), String>;
}

/// Connector for machines that are always online.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDialup;

impl DialupConnector for NoDialup {
    fn is_network_connected(&self) -> bool {
        true
    }

    fn connect(&self, _entry: &str, _callback: &dyn DialupCallback) -> Result<DialupResult, String> {
        Ok(DialupResult::Connected)
    }

    fn disconnect(&self, _wait_seconds: u32) -> Result<(), String> {
        Ok(())
    }
}

/// Forwards connector callbacks to the batch observer.
struct ObserverDialupCallback<'a> {
    observer: &'a dyn SyncObserver,
    show_dialog: bool,
}

impl DialupCallback for ObserverDialupCallback<'_> {
    fn is_canceled(&self) -> bool {
        self.observer.is_canceled(ProgressId::BATCH, false)
    }

    fn pre_connect(&self, params: &mut DialupParams) -> bool {
        !self.show_dialog || self.observer.show_dialup_dialog(params)
    }

    fn set_message(&self, message: &str) {
        self.observer.set_message(ProgressId::BATCH, message);
    }

    fn error(&self, message: &str) {
        self.observer.add_error(
            ProgressId::BATCH,
            SessionErrorInfo::new("", "dial-up failed").detail(message),
        );
    }
}

/// Outcome of [`DialupLine::acquire`].
pub(crate) enum Dial<'a> {
    /// No dialing needed; the batch proceeds without a reference.
    Skipped,
    /// Line is up; dropping the lease releases the reference.
    Up(DialupLease<'a>),
    /// The user declined (no entry chosen or dialog cancelled). The batch ends quietly.
    Canceled,
}

/// Reference-counted dial-up connection shared by all batches of one engine.
#[derive(Debug, Default)]
pub(crate) struct DialupLine {
    refs: AtomicUsize,
    lock: Mutex<()>,
}

impl DialupLine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn refs(&self) -> usize {
        self.refs.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire<'a>(
        &'a self,
        profile: &'a DialupProfile,
        connector: &'a dyn DialupConnector,
        observer: &dyn SyncObserver,
    ) -> Result<Dial<'a>, SyncError> {
        let _guard = lock(&self.lock);
        if self.refs.load(Ordering::SeqCst) > 0 {
            self.refs.fetch_add(1, Ordering::SeqCst);
            debug!("reusing dial-up connection");
            return Ok(Dial::Up(DialupLease::new(self, profile, connector)));
        }
        if profile.whenever_not_connected && connector.is_network_connected() {
            debug!("network connected, not dialing");
            return Ok(Dial::Skipped);
        }
        if let Some(location) = profile.dial_from.as_deref() {
            connector.set_location(location);
        }
        let entry = match profile.entry.clone().or_else(|| observer.select_dialup_entry()) {
            Some(entry) => entry,
            None => return Ok(Dial::Canceled),
        };
        let callback = ObserverDialupCallback {
            observer,
            show_dialog: profile.show_dialog,
        };
        let result = connector.connect(&entry, &callback).map_err(SyncError::Dialup)?;
        observer.set_message(ProgressId::BATCH, "");
        match result {
            DialupResult::Connected => {
                info!(entry = %entry, "dial-up connected");
                self.refs.fetch_add(1, Ordering::SeqCst);
                Ok(Dial::Up(DialupLease::new(self, profile, connector)))
            }
            DialupResult::Canceled => Ok(Dial::Canceled),
        }
    }

    fn release(&self, profile: &DialupProfile, connector: &dyn DialupConnector) {
        let _guard = lock(&self.lock);
        if self.refs.fetch_sub(1, Ordering::SeqCst) == 1 && !profile.do_not_disconnect {
            if let Err(e) = connector.disconnect(profile.disconnect_wait) {
                warn!(error = %e, "dial-up disconnect failed");
            } else {
                info!("dial-up disconnected");
            }
        }
    }
}

/// One batch's reference to the dial-up line.
pub(crate) struct DialupLease<'a> {
    line: &'a DialupLine,
    profile: &'a DialupProfile,
    connector: &'a dyn DialupConnector,
}

impl<'a> DialupLease<'a> {
    fn new(line: &'a DialupLine, profile: &'a DialupProfile, connector: &'a dyn DialupConnector) -> Self {
        Self { line, profile, connector }
    }
}

impl Drop for DialupLease<'_> {
    fn drop(&mut self) {
        self.line.release(self.profile, self.connector);
    }
}

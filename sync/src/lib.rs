/*
 * lib.rs
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

//! Tagliacarte sync engine: fetches and sends mail across accounts in background batches.
//!
//! Work arrives three ways: named courses from the [`CourseCatalog`] (run by hand or by the
//! [`AutoPilot`]), folders queued by the [`SyncQueue`] as the user touches them, and direct requests
//! through the [`Synchronizer`]. Each becomes a [`WorkPlan`] that the [`SyncManager`] runs on its own
//! thread, driving protocol sessions from the [`session`] layer against accounts from the [`store`]
//! layer and reporting to a [`SyncObserver`].

pub mod autopilot;
pub mod config;
pub mod course;
pub mod dialup;
pub mod error;
pub mod filter;
pub mod folder_wait;
pub mod launcher;
pub mod manager;
pub mod observer;
pub mod plan;
pub mod queue;
pub mod session;
pub mod store;

use std::sync::{Mutex, MutexGuard};

pub use autopilot::{AutoPilot, AutoPilotCallback, AutoPilotEntry, AutoPilotWriter, CourseLauncher};
pub use config::{default_config_dir, SyncConfig};
pub use course::{Course, CourseCatalog, CourseEntry, CourseList, CourseType, CourseWriter};
pub use dialup::{DialupConnector, DialupProfile, NoDialup};
pub use error::{ConfigError, SessionError, SyncError};
pub use filter::{SyncFilterManager, SyncFilterSet};
pub use launcher::{FolderSelector, Synchronizer};
pub use manager::{SyncContext, SyncManager};
pub use observer::{Cancellation, ProgressId, SessionErrorInfo, SyncObserver, SyncStatusEvent, SyncType};
pub use plan::{PlanBuilder, WorkItem, WorkPlan, WorkSource};
pub use queue::{ActiveSyncInvoker, SyncQueue};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(g) => g,
        Err(p) => p.into_inner(),
    }
}

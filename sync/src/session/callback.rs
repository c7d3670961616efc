/*
 * callback.rs
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

//! Callback a session uses to report progress, ask for passwords and poll for cancellation.

use crate::observer::SessionErrorInfo;
use crate::session::Host;

/// Handed to every session at creation. The sync engine forwards these calls to the observer
/// under the progress id of the slot the session runs in.
pub trait SessionCallback: Send + Sync {
    fn is_canceled(&self, force: bool) -> bool;

    fn set_pos(&self, pos: usize);

    fn set_range(&self, min: usize, max: usize);

    fn set_sub_pos(&self, pos: usize);

    fn set_sub_range(&self, min: usize, max: usize);

    fn set_message(&self, message: &str);

    fn add_error(&self, info: SessionErrorInfo);

    /// A new message arrived in the folder being synchronized.
    fn notify_new_message(&self);

    fn get_password(&self, host: Host, user: &str) -> Option<String>;

    fn set_password(&self, host: Host, user: &str, password: &str, permanent: bool);
}

/*
 * receive.rs
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

//! Receive session: the lifecycle of pulling one folder's state from a server.

use crate::error::SessionError;
use crate::filter::SyncFilterSet;

/// Per-item options for a receive pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiveFlags {
    /// Drop the local copy of the folder before updating.
    pub empty_first: bool,
    /// Expunge deleted messages on close.
    pub expunge: bool,
}

/// Protocol-specific receive session (POP3, IMAP, NNTP, feeds).
///
/// A session is connected once and may then process several folders in turn:
/// `select_folder` → `update_messages` → `download_messages` → `close_folder`.
pub trait ReceiveSession: Send {
    fn connect(&mut self) -> Result<(), SessionError>;

    fn disconnect(&mut self) -> Result<(), SessionError>;

    fn is_connected(&self) -> bool;

    /// Replay operations recorded while offline (flag changes, moves, deletes).
    fn apply_offline_jobs(&mut self) -> Result<(), SessionError>;

    fn select_folder(&mut self, folder: &str, flags: ReceiveFlags) -> Result<(), SessionError>;

    /// Reconcile the local message list with the server's.
    fn update_messages(&mut self) -> Result<(), SessionError>;

    /// Fetch message bodies. The filter set, when present, decides which messages to download and how.
    fn download_messages(&mut self, filter_set: Option<&SyncFilterSet>) -> Result<(), SessionError>;

    fn close_folder(&mut self) -> Result<(), SessionError>;
}

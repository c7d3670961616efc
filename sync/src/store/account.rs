/*
 * account.rs
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

//! Account and account directory traits: the storage engine the sync engine drives.
//!
//! Implementations live outside this crate (local maildir/mbox stores backed by IMAP, POP3, ...).
//! All methods may be called from sync threads concurrently.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::error::SessionError;
use crate::store::folder::{FolderFlag, FolderInfo};
use crate::store::message::{MessageHolder, OutgoingMessage};

/// Whether a receive session must be connected before sending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiveBeforeSend {
    /// Use the sub-account's setting.
    #[default]
    Default,
    Always,
    Never,
}

/// A named identity/server configuration inside an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAccount {
    pub name: String,
    /// Identity used to pick outbox messages. Empty means every message.
    pub identity: String,
    /// Connect the receive host before sending (POP-before-SMTP style servers).
    pub connect_receive_before_send: bool,
}

impl SubAccount {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            identity: String::new(),
            connect_receive_before_send: false,
        }
    }

    pub fn receive_before_send(&self, mode: ReceiveBeforeSend) -> bool {
        match mode {
            ReceiveBeforeSend::Default => self.connect_receive_before_send,
            ReceiveBeforeSend::Always => true,
            ReceiveBeforeSend::Never => false,
        }
    }
}

/// A mail account: folders, sub-accounts and message persistence.
pub trait Account: Send + Sync {
    fn name(&self) -> &str;

    /// Sub-account by name.
    fn sub_account(&self, name: &str) -> Option<SubAccount>;

    /// Sub-account currently selected by the user.
    fn current_sub_account(&self) -> SubAccount;

    /// All folders, in hierarchy order.
    fn folders(&self) -> Vec<FolderInfo>;

    fn folder(&self, name: &str) -> Option<FolderInfo> {
        self.folders().into_iter().find(|f| f.name == name)
    }

    /// First folder carrying `flag` (inbox, outbox, sent box).
    fn folder_by_flag(&self, flag: FolderFlag) -> Option<FolderInfo> {
        self.folders().into_iter().find(|f| f.has_flag(flag))
    }

    /// Account-wide lock held around reads of mutable folder message lists.
    fn message_lock(&self) -> &Mutex<()>;

    /// Load the folder's message list from the local store before a session touches it.
    fn load_messages(&self, folder: &str) -> Result<(), SessionError>;

    /// Persist the folder's message list after a session changed it.
    fn save_messages(&self, folder: &str) -> Result<(), SessionError>;

    /// Flush downloaded message bodies to disk.
    fn flush_message_store(&self) -> Result<(), SessionError>;

    fn set_last_sync_time(&self, folder: &str, time: DateTime<Utc>);

    /// Message holders of a folder. Callers hold [`Account::message_lock`].
    fn messages(&self, folder: &str) -> Vec<MessageHolder>;

    fn load_outgoing(&self, folder: &str, holder: &MessageHolder) -> Result<OutgoingMessage, SessionError>;

    /// Flag `holder` as sent and move it from `outbox` to `sentbox`.
    fn mark_sent(&self, outbox: &str, sentbox: &str, holder: &MessageHolder) -> Result<(), SessionError>;

    /// Run the account's rules over newly downloaded messages of a folder.
    fn apply_rules(&self, _folder: &str) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Registry of accounts plus the process-wide online state.
pub trait AccountDirectory: Send + Sync {
    fn account(&self, name: &str) -> Option<Arc<dyn Account>>;

    fn accounts(&self) -> Vec<Arc<dyn Account>>;

    /// True when the user put the application in offline mode.
    fn is_offline(&self) -> bool;

    /// Sync batches mark a temporary online period so collaborators can tell it from real online mode.
    fn increment_internal_online(&self);

    fn decrement_internal_online(&self);
}

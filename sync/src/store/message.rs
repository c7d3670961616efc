/*
 * message.rs
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

//! Message holders and outgoing messages as seen by the sync engine.

use std::collections::HashSet;

/// Message flags the sync engine reads or sets.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum MessageFlag {
    Seen,
    Draft,
    Deleted,
    /// Message in the outbox was handed to the send session.
    Sent,
    /// Message was sent while offline and is waiting for the next send.
    Pending,
}

/// Lightweight per-message record in a folder (no body).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHolder {
    /// Store-specific message identifier (UID, file name, ...).
    pub id: String,
    /// Sub-account the message was composed with, when recorded.
    pub sub_account: Option<String>,
    pub flags: HashSet<MessageFlag>,
}

impl MessageHolder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sub_account: None,
            flags: HashSet::new(),
        }
    }

    pub fn with_sub_account(mut self, sub_account: impl Into<String>) -> Self {
        self.sub_account = Some(sub_account.into());
        self
    }

    pub fn with_flag(mut self, flag: MessageFlag) -> Self {
        self.flags.insert(flag);
        self
    }

    pub fn has_flag(&self, flag: MessageFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// True when the message can be picked from the outbox for sending.
    pub fn is_sendable(&self) -> bool {
        !self.has_flag(MessageFlag::Draft) && !self.has_flag(MessageFlag::Deleted)
    }
}

/// Fully loaded message ready to be handed to a send session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub id: String,
    /// RFC 5322 message bytes.
    pub data: Vec<u8>,
}

/*
 * folder.rs
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

//! Folder identity and metadata as seen by the sync engine.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashSet;
use std::fmt;

/// Encode the separator and escape characters so one `/` separates account from folder.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b'[')
    .add(b']')
    .add(b'%')
    .add(b' ');

/// Folder attributes relevant to synchronization.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum FolderFlag {
    /// Folder cannot be selected (container only).
    NoSelect,
    Hidden,
    /// Folder has a server-side counterpart that can be synchronized.
    Syncable,
    /// Synchronize as soon as the user touches the folder.
    SyncWhenOpen,
    Inbox,
    Outbox,
    Sentbox,
}

/// Kind of folder: normal folders hold messages, query folders are saved searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderKind {
    Normal,
    Query,
}

/// Metadata for a folder in an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Full (hierarchical) folder name, e.g. `INBOX/Work`.
    pub name: String,
    pub delimiter: Option<char>,
    pub kind: FolderKind,
    pub flags: HashSet<FolderFlag>,
}

impl FolderInfo {
    pub fn new(name: impl Into<String>, flags: &[FolderFlag]) -> Self {
        Self {
            name: name.into(),
            delimiter: Some('/'),
            kind: FolderKind::Normal,
            flags: flags.iter().copied().collect(),
        }
    }

    pub fn has_flag(&self, flag: FolderFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_syncable(&self) -> bool {
        self.has_flag(FolderFlag::Syncable)
    }

    /// True for folders a course may pick up when enumerating an account:
    /// normal, selectable, visible and syncable.
    pub fn is_sync_candidate(&self) -> bool {
        self.kind == FolderKind::Normal
            && !self.has_flag(FolderFlag::NoSelect)
            && !self.has_flag(FolderFlag::Hidden)
            && self.is_syncable()
    }
}

/// Process-wide identity of a folder: owning account plus full folder name.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct FolderId {
    pub account: String,
    pub folder: String,
}

impl FolderId {
    pub fn new(account: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            folder: folder.into(),
        }
    }

    /// Path form used in queues: `//account/folder`, both parts percent-encoded.
    pub fn to_path(&self) -> String {
        format!(
            "//{}/{}",
            utf8_percent_encode(&self.account, PATH_SEGMENT),
            utf8_percent_encode(&self.folder, PATH_SEGMENT)
        )
    }

    /// Parse the path form produced by [`FolderId::to_path`].
    pub fn parse_path(path: &str) -> Option<Self> {
        let rest = path.strip_prefix("//")?;
        let (account, folder) = rest.split_once('/')?;
        if account.is_empty() || folder.is_empty() {
            return None;
        }
        Some(Self {
            account: percent_decode_str(account).decode_utf8().ok()?.into_owned(),
            folder: percent_decode_str(folder).decode_utf8().ok()?.into_owned(),
        })
    }
}

impl fmt::Display for FolderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.folder)
    }
}

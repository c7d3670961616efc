/*
 * error.rs
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

//! Synchronization, session and configuration errors.
//!
//! Configuration errors are returned to the caller of a load. Everything that happens inside a
//! sync batch is converted to a [`SessionErrorInfo`](crate::observer::SessionErrorInfo) and handed
//! to the observer instead of being propagated.

use std::io;

use thiserror::Error;

/// Errors from loading or saving course, autopilot, filter and engine configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("XML error: {0}")]
    Xml(String),

    /// Well-formed XML whose element structure is not what the file format allows.
    #[error("invalid structure: {0}")]
    Structure(String),

    #[error("invalid value for {name}: {value}")]
    Value { name: String, value: String },

    #[error("invalid pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

impl ConfigError {
    pub(crate) fn io(path: &std::path::Path, source: io::Error) -> Self {
        ConfigError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    pub(crate) fn xml(e: impl std::fmt::Display) -> Self {
        ConfigError::Xml(e.to_string())
    }

    pub(crate) fn structure(msg: impl Into<String>) -> Self {
        ConfigError::Structure(msg.into())
    }

    pub(crate) fn value(name: impl Into<String>, value: impl Into<String>) -> Self {
        ConfigError::Value {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Errors reported by receive and send sessions and by the account store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{phase} failed: {message}")]
    Protocol { phase: Phase, message: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn protocol(phase: Phase, message: impl Into<String>) -> Self {
        SessionError::Protocol {
            phase,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        SessionError::Store(message.into())
    }
}

/// Session lifecycle phase, used to label protocol failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Connect,
    OfflineJobs,
    Select,
    Update,
    Download,
    ApplyRules,
    Close,
    Send,
    Disconnect,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Connect => "connect",
            Phase::OfflineJobs => "offline jobs",
            Phase::Select => "select folder",
            Phase::Update => "update messages",
            Phase::Download => "download messages",
            Phase::ApplyRules => "apply rules",
            Phase::Close => "close folder",
            Phase::Send => "send message",
            Phase::Disconnect => "disconnect",
        };
        f.write_str(s)
    }
}

/// Errors raised while executing a sync batch.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// Persisting downloaded or sent messages failed.
    #[error("save failed: {0}")]
    Save(String),

    #[error("dial-up failed: {0}")]
    Dialup(String),

    #[error("could not start sync thread: {0}")]
    Thread(#[source] io::Error),

    #[error("unknown account: {0}")]
    UnknownAccount(String),

    #[error("unknown folder: {0}")]
    UnknownFolder(String),

    #[error("unknown course: {0}")]
    UnknownCourse(String),

    #[error("folder {0} is not available for this operation")]
    UnavailableFolder(String),
}

/*
 * autopilot.rs
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

//! AutoPilot: periodic, unattended course runs.
//!
//! ```xml
//! <autoPilot>
//!   <entry enabled="true">
//!     <course>morning</course>
//!     <interval>15</interval>
//!   </entry>
//! </autoPilot>
//! ```
//!
//! Intervals count ticks (one tick per minute by default). An entry whose tick arrives while the pilot
//! cannot run becomes pending and fires once on the next tick where it can.

use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{parse_document, write_file, AutoPilotConfig, XmlOut};
use crate::dialup::DialupConnector;
use crate::error::{ConfigError, SyncError};
use crate::lock;

/// Tick counter wraps here.
const COUNT_LIMIT: u32 = 100_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPilotEntry {
    pub course: String,
    /// Ticks between runs, at least 1.
    pub interval: u32,
    pub enabled: bool,
    pending: bool,
}

impl AutoPilotEntry {
    pub fn new(course: impl Into<String>, interval: u32) -> Self {
        Self {
            course: course.into(),
            interval: interval.max(1),
            enabled: true,
            pending: false,
        }
    }

    /// A run was due but could not start yet.
    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Parse an `autopilot.xml` document. A missing, non-numeric or zero interval fails the whole load.
pub fn parse_entries(content: &str) -> Result<Vec<AutoPilotEntry>, ConfigError> {
    let root = parse_document(content)?;
    root.expect_name("autoPilot")?;
    let mut entries = Vec::with_capacity(root.children.len());
    for e in &root.children {
        e.expect_name("entry")?;
        e.check_attributes(&["enabled"])?;
        let mut course = None;
        let mut interval = None;
        for child in &e.children {
            match child.name.as_str() {
                "course" => course = Some(child.text.clone()),
                "interval" => {
                    let n: u32 = child
                        .text
                        .parse()
                        .map_err(|_| ConfigError::value("interval", child.text.clone()))?;
                    if n == 0 {
                        return Err(ConfigError::value("interval", "0"));
                    }
                    interval = Some(n);
                }
                other => return Err(ConfigError::structure(format!("unexpected <{}> in entry", other))),
            }
        }
        let course = course.ok_or_else(|| ConfigError::structure("<entry> needs a <course>"))?;
        let interval = interval.ok_or_else(|| ConfigError::structure("<entry> needs an <interval>"))?;
        entries.push(AutoPilotEntry {
            course,
            interval,
            enabled: e.attr("enabled") != Some("false"),
            pending: false,
        });
    }
    Ok(entries)
}

/// Load entries from `path`; a missing file means no entries.
pub fn load_entries(path: &Path) -> Result<Vec<AutoPilotEntry>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_entries(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(ConfigError::io(path, e)),
    }
}

/// Serializes AutoPilot entries to `autopilot.xml`.
pub struct AutoPilotWriter;

impl AutoPilotWriter {
    pub fn to_bytes(entries: &[AutoPilotEntry]) -> Result<Vec<u8>, ConfigError> {
        let mut out = XmlOut::new()?;
        out.start("autoPilot", &[])?;
        for entry in entries {
            if entry.enabled {
                out.start("entry", &[])?;
            } else {
                out.start("entry", &[("enabled", "false")])?;
            }
            out.text_element("course", &[], &entry.course)?;
            out.text_element("interval", &[], &entry.interval.to_string())?;
            out.end("entry")?;
        }
        out.end("autoPilot")?;
        Ok(out.finish())
    }

    pub fn write(path: &Path, entries: &[AutoPilotEntry]) -> Result<(), ConfigError> {
        write_file(path, &Self::to_bytes(entries)?)
    }
}

/// Asked on every tick whether an unattended run is acceptable right now (e.g. no modal dialog open).
pub trait AutoPilotCallback: Send + Sync {
    fn can_auto_pilot(&self) -> bool;
}

/// Starts a course by name as an automatic batch.
pub trait CourseLauncher: Send + Sync {
    fn launch_course(&self, course: &str) -> bool;
}

struct State {
    enabled: bool,
    only_when_connected: bool,
    count: u32,
    entries: Vec<AutoPilotEntry>,
}

pub struct AutoPilot {
    state: Mutex<State>,
    network: Arc<dyn DialupConnector>,
    callback: Arc<dyn AutoPilotCallback>,
    launcher: Arc<dyn CourseLauncher>,
}

impl AutoPilot {
    pub fn new(
        config: &AutoPilotConfig,
        entries: Vec<AutoPilotEntry>,
        network: Arc<dyn DialupConnector>,
        callback: Arc<dyn AutoPilotCallback>,
        launcher: Arc<dyn CourseLauncher>,
    ) -> Self {
        Self {
            state: Mutex::new(State {
                enabled: config.enabled,
                only_when_connected: config.only_when_connected,
                count: 0,
                entries,
            }),
            network,
            callback,
            launcher,
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    pub fn is_enabled(&self) -> bool {
        self.state().enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.state().enabled = enabled;
    }

    pub fn entries(&self) -> Vec<AutoPilotEntry> {
        self.state().entries.clone()
    }

    /// Replace the entries (after the user edited them). Pending state is dropped.
    pub fn set_entries(&self, entries: Vec<AutoPilotEntry>) {
        self.state().entries = entries;
    }

    /// One timer tick. Returns the courses launched.
    pub fn tick(&self) -> Vec<String> {
        let mut due = Vec::new();
        {
            let mut state = self.state();
            let can_run = state.enabled
                && (!state.only_when_connected || self.network.is_network_connected())
                && self.callback.can_auto_pilot();
            let count = state.count;
            for entry in state.entries.iter_mut().filter(|e| e.enabled) {
                if count % entry.interval != 0 && !entry.pending {
                    continue;
                }
                if can_run {
                    entry.pending = false;
                    due.push(entry.course.clone());
                } else {
                    if !entry.pending {
                        debug!(course = %entry.course, "autopilot run deferred");
                    }
                    entry.pending = true;
                }
            }
            state.count = (count + 1) % COUNT_LIMIT;
        }
        for course in &due {
            info!(course = %course, "autopilot starting course");
            if !self.launcher.launch_course(course) {
                warn!(course = %course, "autopilot could not start course");
            }
        }
        due
    }

    /// Tick every `period` on a background thread until the returned timer is stopped or dropped.
    pub fn start(self: &Arc<Self>, period: Duration) -> Result<AutoPilotTimer, SyncError> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let pilot = Arc::clone(self);
        let handle = thread::Builder::new()
            .name("autopilot".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        pilot.tick();
                    }
                    _ => break,
                }
            })
            .map_err(SyncError::Thread)?;
        Ok(AutoPilotTimer {
            stop: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

/// Running AutoPilot timer thread.
pub struct AutoPilotTimer {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl AutoPilotTimer {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("autopilot thread panicked");
            }
        }
    }
}

impl Drop for AutoPilotTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

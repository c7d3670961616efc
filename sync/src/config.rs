/*
 * config.rs
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

//! Engine configuration (`~/.tagliacarte/sync.xml`) and the XML plumbing shared by the course,
//! AutoPilot and filter files.
//!
//! All XML read/write uses the quick_xml reader/writer. Files are small, so they are read into a
//! lightweight element tree and interpreted from there.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use quick_xml::writer::Writer;
use tracing::{debug, warn};

use crate::error::ConfigError;
use crate::lock;

pub const SYNC_CONFIG_FILE: &str = "sync.xml";
pub const COURSES_FILE: &str = "courses.xml";
pub const AUTOPILOT_FILE: &str = "autopilot.xml";
pub const FILTERS_FILE: &str = "syncfilters.xml";

/// Default config directory: ~/.tagliacarte.
pub fn default_config_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from).map(|h| h.join(".tagliacarte"))
}

/// AutoPilot switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoPilotConfig {
    pub enabled: bool,
    /// Skip ticks while the network is down (entries become pending instead).
    pub only_when_connected: bool,
    pub tick: Duration,
}

impl Default for AutoPilotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            only_when_connected: false,
            tick: Duration::from_secs(60),
        }
    }
}

/// Engine settings from `sync.xml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub auto_pilot: AutoPilotConfig,
    /// Debounce before the change-driven queue drains.
    pub queue_delay: Duration,
    /// Concurrent batches the manager accepts.
    pub max_batches: usize,
    pub courses_path: PathBuf,
    pub auto_pilot_path: PathBuf,
    pub filters_path: PathBuf,
}

impl SyncConfig {
    /// Defaults with catalog files in `dir`.
    pub fn with_dir(dir: &Path) -> Self {
        Self {
            auto_pilot: AutoPilotConfig::default(),
            queue_delay: Duration::from_millis(500),
            max_batches: 16,
            courses_path: dir.join(COURSES_FILE),
            auto_pilot_path: dir.join(AUTOPILOT_FILE),
            filters_path: dir.join(FILTERS_FILE),
        }
    }

    /// Load `sync.xml` from the default config directory.
    pub fn load_default() -> Result<Self, ConfigError> {
        let dir = default_config_dir().ok_or_else(|| ConfigError::structure("HOME is not set"))?;
        Self::load(&dir.join(SYNC_CONFIG_FILE))
    }

    /// Load from `path`. A missing file yields defaults; relative file paths resolve against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut config = Self::with_dir(dir);
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(config),
            Err(e) => return Err(ConfigError::io(path, e)),
        };
        let root = parse_document(&content)?;
        root.expect_name("sync")?;
        for child in &root.children {
            match child.name.as_str() {
                "autoPilot" => {
                    child.check_attributes(&["enabled", "onlyWhenConnected", "tickSeconds"])?;
                    config.auto_pilot.enabled = child.bool_attr("enabled");
                    config.auto_pilot.only_when_connected = child.bool_attr("onlyWhenConnected");
                    if let Some(secs) = child.number_attr("tickSeconds")? {
                        config.auto_pilot.tick = Duration::from_secs(secs);
                    }
                }
                "queue" => {
                    child.check_attributes(&["delayMillis"])?;
                    if let Some(ms) = child.number_attr("delayMillis")? {
                        config.queue_delay = Duration::from_millis(ms);
                    }
                }
                "manager" => {
                    child.check_attributes(&["maxBatches"])?;
                    if let Some(n) = child.number_attr("maxBatches")? {
                        config.max_batches = n as usize;
                    }
                }
                "courses" => config.courses_path = child.path_attr(dir)?,
                "autoPilotEntries" => config.auto_pilot_path = child.path_attr(dir)?,
                "filters" => config.filters_path = child.path_attr(dir)?,
                other => return Err(ConfigError::structure(format!("unexpected element <{}>", other))),
            }
        }
        Ok(config)
    }
}

/// Minimal element tree built from a quick_xml event stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    fn from_start(e: &BytesStart<'_>) -> Result<Self, ConfigError> {
        let name = std::str::from_utf8(e.name().as_ref()).map_err(ConfigError::xml)?.to_string();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(ConfigError::xml)?;
            let key = std::str::from_utf8(attr.key.as_ref()).map_err(ConfigError::xml)?.to_string();
            let value = attr.unescape_value().map_err(ConfigError::xml)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            ..Default::default()
        })
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// `true` only for the literal value `true`.
    pub fn bool_attr(&self, name: &str) -> bool {
        self.attr(name) == Some("true")
    }

    pub fn number_attr(&self, name: &str) -> Result<Option<u64>, ConfigError> {
        match self.attr(name) {
            None => Ok(None),
            Some(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::value(name, v)),
        }
    }

    fn path_attr(&self, dir: &Path) -> Result<PathBuf, ConfigError> {
        self.check_attributes(&["path"])?;
        let path = self
            .attr("path")
            .ok_or_else(|| ConfigError::structure(format!("<{}> needs a path attribute", self.name)))?;
        Ok(dir.join(path))
    }

    /// Fail on any attribute not in `allowed`.
    pub fn check_attributes(&self, allowed: &[&str]) -> Result<(), ConfigError> {
        match self.attributes.iter().find(|(k, _)| !allowed.contains(&k.as_str())) {
            Some((k, _)) => Err(ConfigError::structure(format!("unknown attribute {} on <{}>", k, self.name))),
            None => Ok(()),
        }
    }

    pub fn expect_name(&self, name: &str) -> Result<(), ConfigError> {
        if self.name == name {
            Ok(())
        } else {
            Err(ConfigError::structure(format!("expected <{}>, found <{}>", name, self.name)))
        }
    }
}

/// Parse a whole document and return its root element.
pub(crate) fn parse_document(content: &str) -> Result<Element, ConfigError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(ConfigError::xml(e)),
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => stack.push(Element::from_start(&e)?),
            Ok(Event::Empty(e)) => {
                let element = Element::from_start(&e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(ConfigError::xml)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(text.trim());
                }
            }
            Ok(Event::End(_)) => {
                let element = stack.pop().ok_or_else(|| ConfigError::structure("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            _ => {}
        }
        buf.clear();
    }
    if !stack.is_empty() {
        return Err(ConfigError::structure("unclosed element"));
    }
    root.ok_or_else(|| ConfigError::structure("empty document"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), ConfigError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(ConfigError::structure("more than one root element")),
    }
    Ok(())
}

/// Indented XML document writer.
pub(crate) struct XmlOut {
    writer: Writer<Vec<u8>>,
}

impl XmlOut {
    pub fn new() -> Result<Self, ConfigError> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
            .map_err(ConfigError::xml)?;
        Ok(Self { writer })
    }

    fn tag<'a>(name: &'a str, attributes: &[(&'a str, &'a str)]) -> BytesStart<'a> {
        let mut start = BytesStart::new(name);
        for attr in attributes {
            start.push_attribute(*attr);
        }
        start
    }

    pub fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ConfigError> {
        self.writer
            .write_event(Event::Start(Self::tag(name, attributes)))
            .map_err(ConfigError::xml)
    }

    pub fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), ConfigError> {
        self.writer
            .write_event(Event::Empty(Self::tag(name, attributes)))
            .map_err(ConfigError::xml)
    }

    pub fn end(&mut self, name: &str) -> Result<(), ConfigError> {
        self.writer.write_event(Event::End(BytesEnd::new(name))).map_err(ConfigError::xml)
    }

    /// `<name attrs>text</name>`.
    pub fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<(), ConfigError> {
        self.start(name, attributes)?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(ConfigError::xml)?;
        self.end(name)
    }

    pub fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }
}

/// Write via a temporary file in the same directory, then rename over `path`.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes).map_err(|e| ConfigError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| ConfigError::io(path, e))
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A parsed file cached by modification time.
///
/// [`ReloadingFile::get`] re-reads the file only when its modification time differs from the one last
/// seen; otherwise the same `Arc` is returned. A missing file reads as `T::default()`. A file that
/// fails to parse leaves the previous value in place.
pub(crate) struct ReloadingFile<T> {
    path: PathBuf,
    parse: fn(&str) -> Result<T, ConfigError>,
    state: Mutex<Cached<T>>,
}

struct Cached<T> {
    modified: Option<SystemTime>,
    loaded: bool,
    value: Arc<T>,
}

impl<T: Default> ReloadingFile<T> {
    pub fn new(path: PathBuf, parse: fn(&str) -> Result<T, ConfigError>) -> Self {
        Self {
            path,
            parse,
            state: Mutex::new(Cached {
                modified: None,
                loaded: false,
                value: Arc::new(T::default()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value, reloading if the file changed. Parse errors are logged and the old value kept.
    pub fn get(&self) -> Arc<T> {
        match self.try_get() {
            Ok(v) => v,
            Err((e, previous)) => {
                warn!(path = %self.path.display(), error = %e, "keeping previous configuration");
                previous
            }
        }
    }

    /// Like [`ReloadingFile::get`] but reports a failed reload together with the retained value.
    pub fn try_get(&self) -> Result<Arc<T>, (ConfigError, Arc<T>)> {
        let mut state = lock(&self.state);
        let modified = modified(&self.path);
        if state.loaded && modified == state.modified {
            return Ok(state.value.clone());
        }
        state.modified = modified;
        state.loaded = true;
        if modified.is_none() {
            debug!(path = %self.path.display(), "configuration file missing");
            state.value = Arc::new(T::default());
            return Ok(state.value.clone());
        }
        let parsed = fs::read_to_string(&self.path)
            .map_err(|e| ConfigError::io(&self.path, e))
            .and_then(|content| (self.parse)(&content));
        match parsed {
            Ok(value) => {
                debug!(path = %self.path.display(), "configuration reloaded");
                state.value = Arc::new(value);
                Ok(state.value.clone())
            }
            Err(e) => Err((e, state.value.clone())),
        }
    }
}

/*
 * course.rs
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

//! Course catalog: named synchronization plans loaded from `courses.xml`.
//!
//! ```xml
//! <courses>
//!   <course name="morning" confirm="true">
//!     <dialup name="isp" dialFrom="home" showDialog="true" disconnectWait="10" wheneverNotConnected="true"/>
//!     <parallel>
//!       <entry account="work" receive="true" folder="^INBOX" filter="light"/>
//!       <entry account="home" subaccount="mobile" send="true"/>
//!     </parallel>
//!   </course>
//! </courses>
//! ```
//!
//! The catalog re-reads the file only when its modification time changes, so callers may poll
//! [`CourseCatalog::course_list`] freely. A file that fails to parse leaves the previous list in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::Regex;

use crate::config::{parse_document, write_file, Element, ReloadingFile, XmlOut};
use crate::dialup::DialupProfile;
use crate::error::ConfigError;
use crate::store::ReceiveBeforeSend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseType {
    /// Entries run one after another.
    Sequential,
    /// Entries run concurrently, one thread per entry.
    Parallel,
}

/// One account/folder/filter unit of a course.
#[derive(Debug, Clone)]
pub struct CourseEntry {
    pub account: String,
    pub sub_account: Option<String>,
    folder: Option<Regex>,
    pub filter: Option<String>,
    pub send: bool,
    pub receive: bool,
    /// Ask the user which folders to synchronize.
    pub select_folder: bool,
    pub apply_rules: bool,
    pub receive_before_send: ReceiveBeforeSend,
}

impl CourseEntry {
    /// Receive-only entry for every syncable folder of `account`.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            sub_account: None,
            folder: None,
            filter: None,
            send: false,
            receive: true,
            select_folder: false,
            apply_rules: false,
            receive_before_send: ReceiveBeforeSend::Default,
        }
    }

    pub fn with_folder_pattern(mut self, pattern: &str) -> Result<Self, ConfigError> {
        self.folder = Some(compile(pattern)?);
        Ok(self)
    }

    pub fn folder_pattern(&self) -> Option<&Regex> {
        self.folder.as_ref()
    }

    fn parse(e: &Element) -> Result<Self, ConfigError> {
        e.expect_name("entry")?;
        e.check_attributes(&[
            "account",
            "subaccount",
            "send",
            "receive",
            "folder",
            "selectFolder",
            "filter",
            "applyRules",
            "connectReceiveBeforeSend",
        ])?;
        let account = e
            .attr("account")
            .filter(|a| !a.is_empty())
            .ok_or_else(|| ConfigError::structure("<entry> needs an account"))?;
        let mut send = e.bool_attr("send");
        let mut receive = e.bool_attr("receive");
        if !send && !receive {
            send = true;
            receive = true;
        }
        let select_folder = e.bool_attr("selectFolder");
        let folder = match e.attr("folder") {
            Some(p) if !select_folder => Some(compile(p)?),
            _ => None,
        };
        Ok(Self {
            account: account.to_string(),
            sub_account: e.attr("subaccount").map(str::to_string),
            folder,
            filter: e.attr("filter").filter(|f| !f.is_empty()).map(str::to_string),
            send,
            receive,
            select_folder,
            apply_rules: e.bool_attr("applyRules"),
            receive_before_send: match e.attr("connectReceiveBeforeSend") {
                None => ReceiveBeforeSend::Default,
                Some("true") => ReceiveBeforeSend::Always,
                Some(_) => ReceiveBeforeSend::Never,
            },
        })
    }
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A named synchronization plan.
#[derive(Debug, Clone)]
pub struct Course {
    pub name: String,
    /// Ask before running.
    pub confirm: bool,
    pub course_type: CourseType,
    pub dialup: Option<DialupProfile>,
    pub entries: Vec<CourseEntry>,
}

impl Course {
    fn parse(e: &Element) -> Result<Self, ConfigError> {
        e.expect_name("course")?;
        e.check_attributes(&["name", "confirm"])?;
        let name = e
            .attr("name")
            .ok_or_else(|| ConfigError::structure("<course> needs a name"))?
            .to_string();
        let mut dialup = None;
        let mut body: Option<(CourseType, Vec<CourseEntry>)> = None;
        for child in &e.children {
            match child.name.as_str() {
                "dialup" if dialup.is_none() => dialup = Some(parse_dialup(child)?),
                "sequential" | "parallel" if body.is_none() => {
                    child.check_attributes(&[])?;
                    let course_type = if child.name == "sequential" {
                        CourseType::Sequential
                    } else {
                        CourseType::Parallel
                    };
                    let entries = child.children.iter().map(CourseEntry::parse).collect::<Result<_, _>>()?;
                    body = Some((course_type, entries));
                }
                other => return Err(ConfigError::structure(format!("unexpected <{}> in course {}", other, name))),
            }
        }
        let (course_type, entries) =
            body.ok_or_else(|| ConfigError::structure(format!("course {} has no <sequential> or <parallel>", name)))?;
        Ok(Self {
            confirm: e.bool_attr("confirm"),
            name,
            course_type,
            dialup,
            entries,
        })
    }
}

fn parse_dialup(e: &Element) -> Result<DialupProfile, ConfigError> {
    e.check_attributes(&[
        "name",
        "dialFrom",
        "showDialog",
        "disconnectWait",
        "wheneverNotConnected",
        "doNotDisconnect",
    ])?;
    let disconnect_wait = match e.number_attr("disconnectWait")? {
        Some(n) => u32::try_from(n).map_err(|_| ConfigError::value("disconnectWait", n.to_string()))?,
        None => 0,
    };
    Ok(DialupProfile {
        entry: e.attr("name").filter(|n| !n.is_empty()).map(str::to_string),
        show_dialog: e.bool_attr("showDialog"),
        whenever_not_connected: e.bool_attr("wheneverNotConnected"),
        do_not_disconnect: e.bool_attr("doNotDisconnect"),
        dial_from: e.attr("dialFrom").map(str::to_string),
        disconnect_wait,
    })
}

/// All courses, in file order.
#[derive(Debug, Clone, Default)]
pub struct CourseList {
    courses: Vec<Arc<Course>>,
}

impl CourseList {
    pub fn new(courses: Vec<Course>) -> Self {
        Self {
            courses: courses.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn courses(&self) -> &[Arc<Course>] {
        &self.courses
    }

    pub fn course(&self, name: &str) -> Option<Arc<Course>> {
        self.courses.iter().find(|c| c.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.courses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courses.is_empty()
    }
}

/// Parse a `courses.xml` document.
pub fn parse_courses(content: &str) -> Result<CourseList, ConfigError> {
    let root = parse_document(content)?;
    root.expect_name("courses")?;
    root.check_attributes(&[])?;
    let courses = root.children.iter().map(Course::parse).collect::<Result<Vec<_>, _>>()?;
    Ok(CourseList::new(courses))
}

/// Courses backed by a file, reloaded when it changes.
pub struct CourseCatalog {
    file: ReloadingFile<CourseList>,
}

impl CourseCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: ReloadingFile::new(path.into(), parse_courses),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Current course list. Returns the same `Arc` until the file's modification time changes.
    pub fn course_list(&self) -> Arc<CourseList> {
        self.file.get()
    }

    /// Reload if needed and report a parse failure instead of logging it.
    pub fn reload(&self) -> Result<Arc<CourseList>, ConfigError> {
        self.file.try_get().map_err(|(e, _)| e)
    }

    pub fn course(&self, name: &str) -> Option<Arc<Course>> {
        self.course_list().course(name)
    }
}

/// Serializes a course list back to `courses.xml`, omitting attributes at their default.
pub struct CourseWriter;

impl CourseWriter {
    pub fn to_bytes(list: &CourseList) -> Result<Vec<u8>, ConfigError> {
        let mut out = XmlOut::new()?;
        out.start("courses", &[])?;
        for course in list.courses() {
            let mut attrs = vec![("name", course.name.as_str())];
            if course.confirm {
                attrs.push(("confirm", "true"));
            }
            out.start("course", &attrs)?;
            if let Some(dialup) = &course.dialup {
                write_dialup(&mut out, dialup)?;
            }
            let body = match course.course_type {
                CourseType::Sequential => "sequential",
                CourseType::Parallel => "parallel",
            };
            out.start(body, &[])?;
            for entry in &course.entries {
                write_entry(&mut out, entry)?;
            }
            out.end(body)?;
            out.end("course")?;
        }
        out.end("courses")?;
        Ok(out.finish())
    }

    pub fn write(path: &Path, list: &CourseList) -> Result<(), ConfigError> {
        write_file(path, &Self::to_bytes(list)?)
    }
}

fn write_dialup(out: &mut XmlOut, dialup: &DialupProfile) -> Result<(), ConfigError> {
    let wait = dialup.disconnect_wait.to_string();
    let mut attrs = Vec::new();
    if let Some(entry) = &dialup.entry {
        attrs.push(("name", entry.as_str()));
    }
    if let Some(from) = &dialup.dial_from {
        attrs.push(("dialFrom", from.as_str()));
    }
    if dialup.show_dialog {
        attrs.push(("showDialog", "true"));
    }
    if dialup.disconnect_wait != 0 {
        attrs.push(("disconnectWait", wait.as_str()));
    }
    if dialup.whenever_not_connected {
        attrs.push(("wheneverNotConnected", "true"));
    }
    if dialup.do_not_disconnect {
        attrs.push(("doNotDisconnect", "true"));
    }
    out.empty("dialup", &attrs)
}

fn write_entry(out: &mut XmlOut, entry: &CourseEntry) -> Result<(), ConfigError> {
    let mut attrs = vec![("account", entry.account.as_str())];
    if let Some(sub) = &entry.sub_account {
        attrs.push(("subaccount", sub.as_str()));
    }
    if let Some(folder) = entry.folder.as_ref().filter(|_| !entry.select_folder) {
        attrs.push(("folder", folder.as_str()));
    }
    if let Some(filter) = &entry.filter {
        attrs.push(("filter", filter.as_str()));
    }
    // Both flags set is the default and is written as neither.
    if entry.send != entry.receive {
        attrs.push((if entry.send { "send" } else { "receive" }, "true"));
    }
    if entry.select_folder {
        attrs.push(("selectFolder", "true"));
    }
    if entry.apply_rules {
        attrs.push(("applyRules", "true"));
    }
    match entry.receive_before_send {
        ReceiveBeforeSend::Default => {}
        ReceiveBeforeSend::Always => attrs.push(("connectReceiveBeforeSend", "true")),
        ReceiveBeforeSend::Never => attrs.push(("connectReceiveBeforeSend", "false")),
    }
    out.empty("entry", &attrs)
}

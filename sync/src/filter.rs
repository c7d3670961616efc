/*
 * filter.rs
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

//! Sync filter sets: per-folder download rules referenced by name from courses.
//!
//! ```xml
//! <filters>
//!   <filterSet name="headers-only" account="^work$">
//!     <filter folder="^INBOX$" match="@Size() > 10000">
//!       <action name="download">
//!         <param name="type">header</param>
//!       </action>
//!     </filter>
//!   </filterSet>
//! </filters>
//! ```
//!
//! The `match` expression is evaluated by the receive session; this module only stores it.

use std::path::PathBuf;
use std::sync::Arc;

use regex::Regex;

use crate::config::{parse_document, Element, ReloadingFile};
use crate::error::ConfigError;

/// What to do with a message a filter matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFilterAction {
    /// e.g. `download`, `delete`, `ignore`.
    pub name: String,
    pub params: Vec<(String, String)>,
}

impl SyncFilterAction {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct SyncFilter {
    folder: Option<Regex>,
    /// Condition expression, empty for "always".
    pub condition: String,
    pub actions: Vec<SyncFilterAction>,
}

impl SyncFilter {
    pub fn folder_pattern(&self) -> Option<&str> {
        self.folder.as_ref().map(Regex::as_str)
    }

    pub fn applies_to(&self, folder: &str) -> bool {
        self.folder.as_ref().map_or(true, |re| re.is_match(folder))
    }
}

/// Named, ordered list of filters.
#[derive(Debug, Clone)]
pub struct SyncFilterSet {
    pub name: String,
    account: Option<Regex>,
    filters: Vec<SyncFilter>,
}

impl SyncFilterSet {
    pub fn filters(&self) -> &[SyncFilter] {
        &self.filters
    }

    pub fn applies_to_account(&self, account: &str) -> bool {
        self.account.as_ref().map_or(true, |re| re.is_match(account))
    }

    /// Filters whose folder pattern matches `folder`, in file order.
    pub fn filters_for<'a>(&'a self, folder: &'a str) -> impl Iterator<Item = &'a SyncFilter> + 'a {
        self.filters.iter().filter(move |f| f.applies_to(folder))
    }

    /// First filter for `folder` whose condition `eval` accepts.
    pub fn first_match(&self, folder: &str, mut eval: impl FnMut(&str) -> bool) -> Option<&SyncFilter> {
        self.filters
            .iter()
            .find(|f| f.applies_to(folder) && (f.condition.is_empty() || eval(&f.condition)))
    }
}

fn pattern(value: Option<&str>) -> Result<Option<Regex>, ConfigError> {
    match value {
        None => Ok(None),
        Some(p) => Regex::new(p).map(Some).map_err(|source| ConfigError::Pattern {
            pattern: p.to_string(),
            source,
        }),
    }
}

fn parse_action(e: &Element) -> Result<SyncFilterAction, ConfigError> {
    e.expect_name("action")?;
    e.check_attributes(&["name"])?;
    let name = e
        .attr("name")
        .ok_or_else(|| ConfigError::structure("<action> needs a name"))?
        .to_string();
    let mut params = Vec::new();
    for p in &e.children {
        p.expect_name("param")?;
        p.check_attributes(&["name"])?;
        let key = p.attr("name").ok_or_else(|| ConfigError::structure("<param> needs a name"))?;
        params.push((key.to_string(), p.text.clone()));
    }
    Ok(SyncFilterAction { name, params })
}

fn parse_filter(e: &Element) -> Result<SyncFilter, ConfigError> {
    e.expect_name("filter")?;
    e.check_attributes(&["folder", "match"])?;
    Ok(SyncFilter {
        folder: pattern(e.attr("folder"))?,
        condition: e.attr("match").unwrap_or("").to_string(),
        actions: e.children.iter().map(parse_action).collect::<Result<_, _>>()?,
    })
}

/// Parse a `syncfilters.xml` document.
pub fn parse_filter_sets(content: &str) -> Result<Vec<SyncFilterSet>, ConfigError> {
    let root = parse_document(content)?;
    root.expect_name("filters")?;
    let mut sets = Vec::with_capacity(root.children.len());
    for e in &root.children {
        e.expect_name("filterSet")?;
        e.check_attributes(&["name", "account"])?;
        let name = e
            .attr("name")
            .ok_or_else(|| ConfigError::structure("<filterSet> needs a name"))?
            .to_string();
        sets.push(SyncFilterSet {
            name,
            account: pattern(e.attr("account"))?,
            filters: e.children.iter().map(parse_filter).collect::<Result<_, _>>()?,
        });
    }
    Ok(sets)
}

/// Filter sets backed by `syncfilters.xml`, reloaded when the file changes.
pub struct SyncFilterManager {
    file: ReloadingFile<Vec<Arc<SyncFilterSet>>>,
}

fn parse_shared(content: &str) -> Result<Vec<Arc<SyncFilterSet>>, ConfigError> {
    Ok(parse_filter_sets(content)?.into_iter().map(Arc::new).collect())
}

impl SyncFilterManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: ReloadingFile::new(path.into(), parse_shared),
        }
    }

    pub fn filter_sets(&self) -> Arc<Vec<Arc<SyncFilterSet>>> {
        self.file.get()
    }

    /// Set named `name` that applies to `account`. Unknown names mean "no filter".
    pub fn get_filter_set(&self, account: &str, name: &str) -> Option<Arc<SyncFilterSet>> {
        if name.is_empty() {
            return None;
        }
        self.filter_sets()
            .iter()
            .find(|s| s.name == name && s.applies_to_account(account))
            .cloned()
    }
}

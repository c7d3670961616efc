/*
 * plan.rs
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

//! Work plans: what a sync batch does, grouped for parallel execution.
//!
//! A plan hands out *groups* of *slots*. Items in one slot run in order on one thread. The slots of a
//! group run concurrently and are joined before the next group is taken. Plans are either built up front
//! ([`PlanBuilder`]) or pull work on demand (the change-driven queue), which is why the batch asks for
//! groups one at a time until the source runs dry.

use std::collections::VecDeque;
use std::sync::Arc;

use regex::Regex;

use crate::course::CourseType;
use crate::dialup::DialupProfile;
use crate::filter::SyncFilterSet;
use crate::observer::{SyncObserver, SyncType};
use crate::session::ReceiveFlags;
use crate::store::{Account, FolderInfo, ReceiveBeforeSend};

/// Synchronize one folder through a receive session.
#[derive(Debug, Clone)]
pub struct ReceiveItem {
    pub account: String,
    pub sub_account: String,
    pub folder: String,
    pub filter_set: Option<Arc<SyncFilterSet>>,
    pub flags: ReceiveFlags,
    pub apply_rules: bool,
}

/// Send the outbox of one sub-account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendItem {
    pub account: String,
    pub sub_account: String,
    /// Send only this message.
    pub message_id: Option<String>,
    pub receive_before_send: ReceiveBeforeSend,
}

#[derive(Debug, Clone)]
pub enum WorkItem {
    Receive(ReceiveItem),
    Send(SendItem),
}

impl WorkItem {
    pub fn account(&self) -> &str {
        match self {
            WorkItem::Receive(r) => &r.account,
            WorkItem::Send(s) => &s.account,
        }
    }

    pub fn sub_account(&self) -> &str {
        match self {
            WorkItem::Receive(r) => &r.sub_account,
            WorkItem::Send(s) => &s.sub_account,
        }
    }
}

/// Items executed in order on one thread.
pub type Slot = Vec<WorkItem>;

/// Supplies groups of slots to a running batch. `None` ends the batch.
pub trait WorkSource: Send {
    fn next_group(&mut self) -> Option<Vec<Slot>>;
}

/// Fixed list of groups.
#[derive(Debug, Default)]
pub struct StaticPlan {
    groups: VecDeque<Vec<Slot>>,
}

impl StaticPlan {
    pub fn new(groups: Vec<Vec<Slot>>) -> Self {
        Self {
            groups: groups.into_iter().filter(|g| g.iter().any(|s| !s.is_empty())).collect(),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = &Vec<Slot>> {
        self.groups.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl WorkSource for StaticPlan {
    fn next_group(&mut self) -> Option<Vec<Slot>> {
        self.groups.pop_front()
    }
}

/// Everything a batch needs: where work comes from, who to report to, how to get online.
pub struct WorkPlan {
    pub sync_type: SyncType,
    pub dialup: Option<DialupProfile>,
    pub observer: Arc<dyn SyncObserver>,
    source: Box<dyn WorkSource>,
}

impl WorkPlan {
    pub fn new(sync_type: SyncType, observer: Arc<dyn SyncObserver>, source: Box<dyn WorkSource>) -> Self {
        Self {
            sync_type,
            dialup: None,
            observer,
            source,
        }
    }

    pub fn with_dialup(mut self, dialup: Option<DialupProfile>) -> Self {
        self.dialup = dialup;
        self
    }

    pub(crate) fn next_group(&mut self) -> Option<Vec<Slot>> {
        self.source.next_group()
    }
}

/// Folders of `account` a course may synchronize, optionally filtered by name, sorted by full name.
pub fn sync_folders(account: &dyn Account, pattern: Option<&Regex>) -> Vec<FolderInfo> {
    let mut folders: Vec<FolderInfo> = account
        .folders()
        .into_iter()
        .filter(|f| f.is_sync_candidate())
        .filter(|f| pattern.map_or(true, |re| re.is_match(&f.name)))
        .collect();
    folders.sort_by(|a, b| a.name.cmp(&b.name));
    folders
}

/// Builds a static plan slot by slot.
///
/// Items go to the current slot. [`PlanBuilder::new_slot`] starts a new slot only if the current one
/// already has items, so calling it before every entry never produces empty slots.
#[derive(Debug)]
pub struct PlanBuilder {
    slots: Vec<Slot>,
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self { slots: vec![Vec::new()] }
    }
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_slot(&mut self) {
        if self.slots.last().map_or(true, |s| !s.is_empty()) {
            self.slots.push(Vec::new());
        }
    }

    pub fn add_item(&mut self, item: WorkItem) {
        match self.slots.last_mut() {
            Some(slot) => slot.push(item),
            None => self.slots.push(vec![item]),
        }
    }

    pub fn add_folder(
        &mut self,
        account: &str,
        sub_account: &str,
        folder: &str,
        filter_set: Option<Arc<SyncFilterSet>>,
        flags: ReceiveFlags,
        apply_rules: bool,
    ) {
        self.add_item(WorkItem::Receive(ReceiveItem {
            account: account.to_string(),
            sub_account: sub_account.to_string(),
            folder: folder.to_string(),
            filter_set,
            flags,
            apply_rules,
        }));
    }

    /// Add every sync candidate folder of `account` matching `pattern`, in name order. Returns the count.
    pub fn add_folders(
        &mut self,
        account: &dyn Account,
        sub_account: &str,
        pattern: Option<&Regex>,
        filter_set: Option<Arc<SyncFilterSet>>,
        apply_rules: bool,
    ) -> usize {
        let folders = sync_folders(account, pattern);
        for folder in &folders {
            self.add_folder(
                account.name(),
                sub_account,
                &folder.name,
                filter_set.clone(),
                ReceiveFlags::default(),
                apply_rules,
            );
        }
        folders.len()
    }

    pub fn add_send(
        &mut self,
        account: &str,
        sub_account: &str,
        message_id: Option<&str>,
        receive_before_send: ReceiveBeforeSend,
    ) {
        self.add_item(WorkItem::Send(SendItem {
            account: account.to_string(),
            sub_account: sub_account.to_string(),
            message_id: message_id.map(str::to_string),
            receive_before_send,
        }));
    }

    /// Non-empty slots so far.
    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter().filter(|s| !s.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.slots().next().is_none()
    }

    /// Group the slots: one group with every slot for parallel, one group per slot for sequential.
    pub fn build(self, course_type: CourseType) -> StaticPlan {
        let slots: Vec<Slot> = self.slots.into_iter().filter(|s| !s.is_empty()).collect();
        match course_type {
            CourseType::Parallel => StaticPlan::new(vec![slots]),
            CourseType::Sequential => StaticPlan::new(slots.into_iter().map(|s| vec![s]).collect()),
        }
    }
}

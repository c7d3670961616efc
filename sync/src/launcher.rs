/*
 * launcher.rs
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

//! Turns courses, folder lists and send requests into work plans and hands them to the sync manager.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::autopilot::CourseLauncher;
use crate::course::{Course, CourseCatalog, CourseType};
use crate::filter::SyncFilterManager;
use crate::manager::SyncManager;
use crate::observer::{SyncObserver, SyncType};
use crate::plan::{sync_folders, PlanBuilder, StaticPlan, WorkPlan};
use crate::session::ReceiveFlags;
use crate::store::{Account, FolderInfo, ReceiveBeforeSend, SubAccount};

/// Lets the user pick folders for course entries marked select-folder.
pub trait FolderSelector: Send + Sync {
    /// Folder names to synchronize, or `None` to skip the entry.
    fn select_folders(&self, account: &dyn Account, candidates: &[FolderInfo]) -> Option<Vec<String>>;
}

pub struct Synchronizer {
    manager: SyncManager,
    catalog: Arc<CourseCatalog>,
    filters: Arc<SyncFilterManager>,
    observer: Arc<dyn SyncObserver>,
    selector: Option<Arc<dyn FolderSelector>>,
}

impl Synchronizer {
    pub fn new(
        manager: SyncManager,
        catalog: Arc<CourseCatalog>,
        filters: Arc<SyncFilterManager>,
        observer: Arc<dyn SyncObserver>,
    ) -> Self {
        Self {
            manager,
            catalog,
            filters,
            observer,
            selector: None,
        }
    }

    pub fn with_folder_selector(mut self, selector: Arc<dyn FolderSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }

    pub fn catalog(&self) -> &CourseCatalog {
        &self.catalog
    }

    fn resolve(&self, account: &str, sub_account: Option<&str>) -> Option<(Arc<dyn Account>, SubAccount)> {
        let Some(a) = self.manager.context().accounts.account(account) else {
            warn!(account, "unknown account");
            return None;
        };
        let sub = match sub_account {
            Some(name) => match a.sub_account(name) {
                Some(sub) => sub,
                None => {
                    warn!(account, sub_account = name, "unknown sub-account");
                    return None;
                }
            },
            None => a.current_sub_account(),
        };
        Some((a, sub))
    }

    /// Plan for `course`: one slot per entry, receive items before the entry's send item. The course's
    /// `confirm` flag is for the caller to honor before running.
    pub fn course_plan(&self, course: &Course) -> StaticPlan {
        let mut builder = PlanBuilder::new();
        for entry in &course.entries {
            builder.new_slot();
            let Some((account, sub)) = self.resolve(&entry.account, entry.sub_account.as_deref()) else {
                continue;
            };
            if entry.receive {
                let filter = entry
                    .filter
                    .as_deref()
                    .and_then(|name| self.filters.get_filter_set(account.name(), name));
                if entry.select_folder {
                    let candidates = sync_folders(account.as_ref(), None);
                    let chosen = self
                        .selector
                        .as_ref()
                        .and_then(|s| s.select_folders(account.as_ref(), &candidates));
                    for folder in chosen.unwrap_or_default() {
                        builder.add_folder(
                            account.name(),
                            &sub.name,
                            &folder,
                            filter.clone(),
                            ReceiveFlags::default(),
                            entry.apply_rules,
                        );
                    }
                } else {
                    let n = builder.add_folders(
                        account.as_ref(),
                        &sub.name,
                        entry.folder_pattern(),
                        filter,
                        entry.apply_rules,
                    );
                    debug!(course = %course.name, account = %account.name(), folders = n, "entry folders");
                }
            }
            if entry.send {
                builder.add_send(account.name(), &sub.name, None, entry.receive_before_send);
            }
        }
        builder.build(course.course_type)
    }

    /// Run the named course. False if the course is unknown, has nothing to do, or the batch was refused.
    pub fn run_course(&self, name: &str, sync_type: SyncType) -> bool {
        let Some(course) = self.catalog.course(name) else {
            warn!(course = name, "unknown course");
            return false;
        };
        let plan = self.course_plan(&course);
        if plan.is_empty() {
            info!(course = name, "course has nothing to synchronize");
            return false;
        }
        info!(course = name, sync_type = ?sync_type, "running course");
        let plan = WorkPlan::new(sync_type, Arc::clone(&self.observer), Box::new(plan)).with_dialup(course.dialup.clone());
        self.manager.sync(plan)
    }

    /// Synchronize the given folders of one account in a single slot.
    pub fn sync_folders(&self, account: &str, folders: &[String], sync_type: SyncType) -> bool {
        let Some((account, sub)) = self.resolve(account, None) else {
            return false;
        };
        let mut builder = PlanBuilder::new();
        for folder in folders {
            builder.add_folder(account.name(), &sub.name, folder, None, ReceiveFlags::default(), false);
        }
        if builder.is_empty() {
            return false;
        }
        let plan = builder.build(CourseType::Parallel);
        self.manager
            .sync(WorkPlan::new(sync_type, Arc::clone(&self.observer), Box::new(plan)))
    }

    /// Send the outbox of a sub-account (the current one if `None`), optionally just one message.
    pub fn send(&self, account: &str, sub_account: Option<&str>, message_id: Option<&str>) -> bool {
        let Some((account, sub)) = self.resolve(account, sub_account) else {
            return false;
        };
        let mut builder = PlanBuilder::new();
        builder.add_send(account.name(), &sub.name, message_id, ReceiveBeforeSend::Default);
        let plan = builder.build(CourseType::Parallel);
        self.manager
            .sync(WorkPlan::new(SyncType::Manual, Arc::clone(&self.observer), Box::new(plan)))
    }
}

impl CourseLauncher for Synchronizer {
    fn launch_course(&self, course: &str) -> bool {
        self.run_course(course, SyncType::Auto)
    }
}

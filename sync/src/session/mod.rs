/*
 * mod.rs
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

//! Session collaborators: protocol sessions created per sub-account and driven by the sync engine.

mod callback;
mod kinds;
mod receive;
mod send;

use std::sync::Arc;

use crate::error::SessionError;
use crate::store::{Account, SubAccount};

pub use callback::SessionCallback;
pub use kinds::Host;
pub use receive::{ReceiveFlags, ReceiveSession};
pub use send::SendSession;

/// Creates protocol sessions for a sub-account. Implemented by the protocol layer, which picks
/// POP3/IMAP/SMTP/... from the sub-account's configuration.
pub trait SessionFactory: Send + Sync {
    fn receive_session(
        &self,
        account: Arc<dyn Account>,
        sub_account: &SubAccount,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Box<dyn ReceiveSession>, SessionError>;

    fn send_session(
        &self,
        account: Arc<dyn Account>,
        sub_account: &SubAccount,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Box<dyn SendSession>, SessionError>;
}

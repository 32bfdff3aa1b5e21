/*
 * vSMTP mail transfer agent
 * Copyright (C) 2022 viridIT SAS
 *
 * This program is free software: you can redistribute it and/or modify it under
 * the terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or any later version.
 *
 * This program is distributed in the hope that it will be useful, but WITHOUT
 * ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
 * FOR A PARTICULAR PURPOSE.  See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * this program. If not, see https://www.gnu.org/licenses/.
 *
*/

//! Listener of the relay: accepts the SMTP sessions of the trusted senders
//! and hands every message to the [`Relay`], which sends it through the
//! Gmail API on behalf of the delegated mailbox.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::significant_drop_tightening)]

mod relay;
mod runtime;
mod server;
mod receiver {
    pub mod handler;
    mod post_transaction;
    mod pre_transaction;
}

pub use receiver::handler::Handler;
pub use relay::{AllowList, Relay};
pub use runtime::{build_relay, run, start_runtime};
pub use server::{socket_bind_anyhow, Server};

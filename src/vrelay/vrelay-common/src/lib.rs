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

//! vRelay common definitions

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

mod types {
    pub mod address;
    pub mod client_name;
    pub mod reply;
    pub mod reply_code;
}

/// The envelope state machine of an SMTP transaction.
pub mod context;
mod relay;

pub use context::{Context, ContextFinished, Stage};
pub use relay::{MessageHandler, RelayOutcome, Rejection};
pub use types::{
    address::Address,
    client_name::ClientName,
    reply::{ParseReplyError, Reply},
    reply_code::ReplyCode,
};

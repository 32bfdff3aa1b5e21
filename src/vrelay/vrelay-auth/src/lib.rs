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

//! Delegated credential of a service account, authorizing the relay to send
//! mails on behalf of one mailbox (domain-wide delegation).
//!
//! The credential is validated once against the identity provider when created,
//! then refreshed transparently before each call made with an [`AuthorizedClient`].

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

mod client;
mod credential;
mod key;
mod token;

pub use client::AuthorizedClient;
pub use credential::{DelegatedCredential, Endpoints};
pub use key::ServiceAccountKey;
pub use token::AccessToken;

/// Privilege granted to the credential.
///
/// There is only one: the relay can send mails, and nothing else.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::Display, strum::EnumString,
)]
#[non_exhaustive]
pub enum Scope {
    /// Send messages only, no read, modify or delete access to the mailbox.
    #[strum(serialize = "https://www.googleapis.com/auth/gmail.send")]
    GmailSend,
}

/// Errors of the credential lifecycle.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The service account key file is unreadable or invalid.
    #[error("invalid service account key: {0}")]
    Configuration(String),
    /// The identity provider rejected the credential or the scope grant, or is unreachable.
    #[error("authentication failed: {0}")]
    Authentication(String),
}

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
pub mod field;

use field::{FieldRelay, FieldServer};
use vrelay_common::Address;

/// Invalid values, detected before anything is started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No address would be allowed to send.
    #[error("the list of allowed senders is empty")]
    EmptyAllowList,
    /// An entry of the allow-list is not an email address.
    #[error("allowed sender '{sender}' is invalid: {reason}")]
    InvalidSender {
        /// The entry.
        sender: String,
        /// Why it has been refused.
        reason: String,
    },
    /// The impersonated mailbox is not an email address.
    #[error("subject '{subject}' is invalid: {reason}")]
    InvalidSubject {
        /// The configured subject.
        subject: String,
        /// Why it has been refused.
        reason: String,
    },
    /// The listener would not be bound to anything.
    #[error("no interface to listen on")]
    NoInterface,
    /// A message could not even hold its headers.
    #[error("message size limit must be greater than zero")]
    NullMessageSize,
}

/// Configuration of the relay.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// See [`FieldServer`].
    #[serde(default)]
    pub server: FieldServer,
    /// See [`FieldRelay`].
    pub relay: FieldRelay,
}

impl Config {
    /// Create a configuration with the default server section.
    ///
    /// # Errors
    ///
    /// * see [`Config::ensure`]
    #[inline]
    pub fn new(relay: FieldRelay) -> Result<Self, Error> {
        Self {
            server: FieldServer::default(),
            relay,
        }
        .ensure()
    }

    /// Check the values which cannot be expressed by the types.
    ///
    /// # Errors
    ///
    /// * the allow-list is empty, or one of its entries is not an address
    /// * the subject is not an address
    /// * there is no interface to listen on
    /// * the message size limit is zero
    #[inline]
    pub fn ensure(self) -> Result<Self, Error> {
        if self.relay.sender_emails.is_empty() {
            return Err(Error::EmptyAllowList);
        }
        for sender in &self.relay.sender_emails {
            if let Err(e) = sender.parse::<Address>() {
                return Err(Error::InvalidSender {
                    sender: sender.clone(),
                    reason: e.to_string(),
                });
            }
        }
        if let Err(e) = self.relay.subject.parse::<Address>() {
            return Err(Error::InvalidSubject {
                subject: self.relay.subject.clone(),
                reason: e.to_string(),
            });
        }
        if self.server.interfaces.addr.is_empty() {
            return Err(Error::NoInterface);
        }
        if self.server.message_size_limit == 0 {
            return Err(Error::NullMessageSize);
        }
        Ok(self)
    }

    /// Parse a JSON document, as printed by `config-show`.
    ///
    /// # Errors
    ///
    /// * the document is not a valid configuration
    #[inline]
    pub fn from_json(input: &str) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(serde_json::from_str::<Self>(input)?.ensure()?)
    }
}

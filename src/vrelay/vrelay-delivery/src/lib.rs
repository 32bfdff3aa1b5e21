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

//! Outbound side of the relay: a message framed for the Gmail API and sent
//! on behalf of the delegated mailbox.

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

mod gmail;

pub use gmail::GmailApi;

/// Body of a `users.messages.send` call.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GmailMessage {
    /// The full RFC 5322 message, url-safe base64 encoded.
    pub raw: String,
}

impl GmailMessage {
    /// Frame a raw message: url-safe base64 with padding, no line wrapping.
    #[inline]
    #[must_use]
    pub fn new(message: &[u8]) -> Self {
        use base64::Engine;
        Self {
            raw: base64::engine::general_purpose::URL_SAFE.encode(message),
        }
    }
}

/// Resource returned by the Gmail API once the message is accepted.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    /// Immutable identifier of the message.
    pub id: String,
    /// Identifier of the thread the message belongs to.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Labels applied to the message.
    #[serde(default)]
    pub label_ids: Vec<String>,
}

/// Errors of the send-mail call.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The credential could not produce a token.
    #[error("{0}")]
    Auth(#[from] vrelay_auth::Error),
    /// The API could not be reached, or its answer could not be read.
    #[error("gmail api unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    /// The API answered with an error.
    #[error("gmail api error {code} [{status}]: {message}")]
    Api {
        /// HTTP status, or the `error.code` field of the body.
        code: u16,
        /// `error.status` field of the body, `UNKNOWN` if absent.
        status: String,
        /// `error.message` field of the body, or the raw body.
        message: String,
    },
}

impl Error {
    /// Decode the `{"error": {"code", "message", "status"}}` envelope of Google APIs,
    /// the raw body is kept as message when it is not one.
    #[must_use]
    #[inline]
    pub fn from_api_response(status_code: u16, body: &str) -> Self {
        #[derive(serde::Deserialize)]
        struct ApiErrorInner {
            code: Option<u16>,
            message: Option<String>,
            status: Option<String>,
        }
        #[derive(serde::Deserialize)]
        struct ApiErrorWrapper {
            error: ApiErrorInner,
        }

        match serde_json::from_str::<ApiErrorWrapper>(body) {
            Ok(ApiErrorWrapper { error }) => Self::Api {
                code: error.code.unwrap_or(status_code),
                status: error.status.unwrap_or_else(|| "UNKNOWN".to_owned()),
                message: error.message.unwrap_or_default(),
            },
            Err(_) => Self::Api {
                code: status_code,
                status: "UNKNOWN".to_owned(),
                message: if body.is_empty() {
                    format!("HTTP {status_code}")
                } else {
                    body.chars().take(500).collect()
                },
            },
        }
    }
}

/// Send a framed message.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    /// Send `message` as the delegated mailbox.
    ///
    /// # Errors
    ///
    /// * see [`Error`]
    async fn send(&self, message: &GmailMessage) -> Result<SentMessage, Error>;
}

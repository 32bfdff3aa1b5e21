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
use crate::ContextFinished;

/// Reason a message has been refused before reaching the remote API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Rejection {
    /// The `From` header is missing, or not of the form `Display Name <address>`.
    #[error("invalid 'From' header: {header:?}")]
    InvalidFromHeader {
        /// Raw value of the header, `None` if absent.
        header: Option<String>,
    },
    /// The declared sender is not part of the allow-list.
    #[error("sender '{sender}' is not allowed, expected one of {allowed:?}")]
    SenderNotAllowed {
        /// The address extracted from the `From` header.
        sender: String,
        /// The configured allow-list.
        allowed: Vec<String>,
    },
}

/// Result of the handling of one message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RelayOutcome {
    /// The remote API accepted the message.
    Sent {
        /// Identifier attributed by the remote API.
        id: String,
    },
    /// The message has not been sent, see [`Rejection`].
    Rejected(Rejection),
    /// The remote API (or the credential refresh) failed.
    RemoteError(String),
}

impl RelayOutcome {
    /// Short name of the outcome, used in logs.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Rejected(Rejection::InvalidFromHeader { .. }) => "invalid_from_header",
            Self::Rejected(Rejection::SenderNotAllowed { .. }) => "sender_not_allowed",
            Self::RemoteError(_) => "remote_error",
        }
    }
}

/// Entry point called by the SMTP transport for each message fully received.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Relay one message. Never fails: every failure is reported as a [`RelayOutcome`].
    async fn handle(&self, envelope: &ContextFinished, message: &[u8]) -> RelayOutcome;
}

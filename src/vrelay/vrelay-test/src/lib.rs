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

//! Test harness of vRelay: fake Google endpoints, SMTP sessions driven
//! in-process, and the end-to-end tests of the relay.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod google;
pub mod session;

#[cfg(test)]
mod tests;

use vrelay_common::{ContextFinished, MessageHandler, RelayOutcome};

/// A [`MessageHandler`] answering the same outcome to every message, and keeping them.
pub struct Recorder {
    outcome: RelayOutcome,
    received: tokio::sync::Mutex<Vec<(ContextFinished, Vec<u8>)>>,
}

impl Recorder {
    ///
    #[must_use]
    pub fn new(outcome: RelayOutcome) -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            outcome,
            received: tokio::sync::Mutex::new(vec![]),
        })
    }

    /// The envelopes and messages handled so far.
    pub async fn received(&self) -> Vec<(ContextFinished, Vec<u8>)> {
        self.received.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, envelope: &ContextFinished, message: &[u8]) -> RelayOutcome {
        self.received
            .lock()
            .await
            .push((envelope.clone(), message.to_vec()));
        self.outcome.clone()
    }
}

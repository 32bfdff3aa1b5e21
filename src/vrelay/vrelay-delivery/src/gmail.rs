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
use crate::{Error, GmailMessage, Mailer, SentMessage};

/// The Gmail API, `users.messages.send` on the delegated mailbox (`me`).
#[derive(Debug, Clone)]
pub struct GmailApi {
    client: vrelay_auth::AuthorizedClient,
    send_url: String,
}

impl GmailApi {
    /// Production endpoint.
    pub const DEFAULT_BASE_URL: &'static str = "https://gmail.googleapis.com";

    /// Create a transport sending through `base_url`.
    #[inline]
    #[must_use]
    pub fn new(client: vrelay_auth::AuthorizedClient, base_url: &str) -> Self {
        Self {
            client,
            send_url: format!(
                "{}/gmail/v1/users/me/messages/send",
                base_url.trim_end_matches('/')
            ),
        }
    }
}

#[async_trait::async_trait]
impl Mailer for GmailApi {
    #[tracing::instrument(name = "gmail-send", skip_all, err)]
    async fn send(&self, message: &GmailMessage) -> Result<SentMessage, Error> {
        let response = self
            .client
            .post(&self.send_url)
            .await?
            .json(message)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_api_response(status.as_u16(), &body));
        }

        let sent = response.json::<SentMessage>().await?;
        tracing::debug!(id = %sent.id, thread_id = ?sent.thread_id, labels = ?sent.label_ids, "Message accepted.");

        Ok(sent)
    }
}

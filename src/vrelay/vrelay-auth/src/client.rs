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
use crate::{DelegatedCredential, Error};

/// Http client whose requests carry the bearer token of a [`DelegatedCredential`].
#[derive(Debug, Clone)]
pub struct AuthorizedClient {
    http: reqwest::Client,
    credential: std::sync::Arc<DelegatedCredential>,
}

impl AuthorizedClient {
    /// Create a client sharing `credential`.
    ///
    /// # Errors
    ///
    /// * [`Error::Configuration`] if the http client cannot be built
    #[inline]
    pub fn new(credential: std::sync::Arc<DelegatedCredential>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build the http client: {e}")))?;

        Ok(Self { http, credential })
    }

    /// The shared credential.
    #[inline]
    #[must_use]
    pub fn credential(&self) -> &DelegatedCredential {
        &self.credential
    }

    /// Start a `POST` request, the token is refreshed first if needed.
    ///
    /// # Errors
    ///
    /// * [`Error::Authentication`] if the token could not be refreshed
    #[inline]
    pub async fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, Error> {
        let token = self.credential.access_token().await?;
        Ok(self.http.post(url).bearer_auth(token.secret()))
    }
}

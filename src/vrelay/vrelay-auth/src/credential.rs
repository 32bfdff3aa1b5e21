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
use crate::{
    token::{Claims, TokenResponse},
    AccessToken, Error, Scope, ServiceAccountKey,
};

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Endpoints of the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Where assertions are exchanged for access tokens,
    /// `None` to use the one declared in the key file.
    pub token_uri: Option<String>,
    /// Token introspection, queried once when the credential is created.
    pub token_info: String,
}

impl Default for Endpoints {
    #[inline]
    fn default() -> Self {
        Self {
            token_uri: None,
            token_info: "https://oauth2.googleapis.com/tokeninfo".to_string(),
        }
    }
}

/// Credential of a service account impersonating `subject`, with a cached access token.
///
/// The cache is refreshed under an async lock, concurrent callers wait for the
/// refresh in flight instead of starting their own.
pub struct DelegatedCredential {
    key: ServiceAccountKey,
    signing_key: jsonwebtoken::EncodingKey,
    scope: Scope,
    subject: String,
    token_uri: String,
    http: reqwest::Client,
    cached: tokio::sync::Mutex<Option<AccessToken>>,
}

impl std::fmt::Debug for DelegatedCredential {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelegatedCredential")
            .field("key", &self.key)
            .field("scope", &self.scope)
            .field("subject", &self.subject)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl DelegatedCredential {
    /// Load the key file, obtain a first access token and validate it
    /// against the introspection endpoint.
    ///
    /// # Errors
    ///
    /// * [`Error::Configuration`] if the key file is unusable
    /// * [`Error::Authentication`] if the identity provider refuses the credential
    #[inline]
    #[tracing::instrument(name = "credential", skip_all, err, fields(%subject))]
    pub async fn new(
        key_file: &std::path::Path,
        scope: Scope,
        subject: &str,
        endpoints: Endpoints,
    ) -> Result<Self, Error> {
        let key = ServiceAccountKey::from_file(key_file).await?;
        tracing::debug!(
            client_email = key.client_email(),
            "Service account key loaded."
        );

        let this = Self::with_key(key, scope, subject, endpoints.token_uri)?;
        let token = this.access_token().await?;
        this.introspect(&endpoints.token_info, &token).await?;

        Ok(this)
    }

    /// Build a credential without contacting the identity provider.
    ///
    /// # Errors
    ///
    /// * [`Error::Configuration`] if the private key cannot be loaded,
    ///   or the http client cannot be built
    #[inline]
    pub fn with_key(
        key: ServiceAccountKey,
        scope: Scope,
        subject: &str,
        token_uri: Option<String>,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build the http client: {e}")))?;

        Ok(Self {
            signing_key: key.encoding_key()?,
            token_uri: token_uri.unwrap_or_else(|| key.token_uri().to_string()),
            key,
            scope,
            subject: subject.to_string(),
            http,
            cached: tokio::sync::Mutex::new(None),
        })
    }

    /// The mailbox impersonated by this credential.
    #[inline]
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// A valid access token, refreshed if the cached one is about to expire.
    ///
    /// # Errors
    ///
    /// * [`Error::Authentication`] if the refresh failed
    #[inline]
    pub async fn access_token(&self) -> Result<AccessToken, Error> {
        let mut cached = self.cached.lock().await;
        match &*cached {
            Some(token) if !token.is_expired() => Ok(token.clone()),
            _ => {
                let token = self.fetch_token().await?;
                *cached = Some(token.clone());
                Ok(token)
            }
        }
    }

    fn assertion(&self) -> Result<String, Error> {
        let mut header = jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256);
        header.kid = Some(self.key.private_key_id().to_string());

        let claims = Claims::new(
            self.key.client_email(),
            self.scope.as_ref(),
            &self.token_uri,
            &self.subject,
        );

        jsonwebtoken::encode(&header, &claims, &self.signing_key)
            .map_err(|e| Error::Authentication(format!("cannot sign the assertion: {e}")))
    }

    async fn fetch_token(&self) -> Result<AccessToken, Error> {
        let assertion = self.assertion()?;

        let response = self
            .http
            .post(&self.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "token endpoint answered {status}: {body}"
            )));
        }

        let token = response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::Authentication(format!("unexpected token response: {e}")))?;

        tracing::debug!(
            expires_in = token.expires_in,
            token_type = token.token_type.as_deref().unwrap_or("unknown"),
            "Access token refreshed."
        );

        Ok(AccessToken::new(token.access_token, token.expires_in))
    }

    async fn introspect(&self, token_info: &str, token: &AccessToken) -> Result<(), Error> {
        let response = self
            .http
            .get(token_info)
            .query(&[("access_token", token.secret())])
            .send()
            .await
            .map_err(|e| Error::Authentication(format!("introspection unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Authentication(format!(
                "introspection answered {status}: {body}"
            )));
        }

        let info = response
            .json::<serde_json::Map<String, serde_json::Value>>()
            .await
            .map_err(|e| Error::Authentication(format!("unexpected introspection response: {e}")))?;

        for (field, value) in &info {
            tracing::info!(%field, %value, "Token info.");
        }
        tracing::info!("Credential validated.");

        Ok(())
    }
}

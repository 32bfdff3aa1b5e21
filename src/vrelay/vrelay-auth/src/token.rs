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

/// A token is considered expired this long before its actual expiration.
const EXPIRY_LEEWAY: time::Duration = time::Duration::seconds(60);

/// Lifetime requested for the signed assertions.
pub const ASSERTION_LIFETIME: time::Duration = time::Duration::hours(1);

/// Short-lived bearer token obtained from the identity provider.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: time::OffsetDateTime,
}

impl std::fmt::Debug for AccessToken {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessToken {
    pub(crate) fn new(secret: String, expires_in: i64) -> Self {
        Self {
            secret,
            expires_at: time::OffsetDateTime::now_utc() + time::Duration::seconds(expires_in),
        }
    }

    /// The bearer value to put in the `Authorization` header.
    #[inline]
    #[must_use]
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Instant at which the identity provider stops accepting the token.
    #[inline]
    #[must_use]
    pub const fn expires_at(&self) -> time::OffsetDateTime {
        self.expires_at
    }

    /// Is the token expired, or about to be?
    #[inline]
    #[must_use]
    pub fn is_expired(&self) -> bool {
        time::OffsetDateTime::now_utc() + EXPIRY_LEEWAY >= self.expires_at
    }
}

/// Body of a successful token exchange.
#[derive(Debug, serde::Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Claims of the assertion exchanged for an access token.
#[derive(Debug, serde::Serialize)]
pub struct Claims<'a> {
    pub iss: &'a str,
    pub scope: &'a str,
    pub aud: &'a str,
    pub exp: i64,
    pub iat: i64,
    pub sub: &'a str,
}

impl<'a> Claims<'a> {
    pub fn new(iss: &'a str, scope: &'a str, aud: &'a str, sub: &'a str) -> Self {
        let now = time::OffsetDateTime::now_utc();
        Self {
            iss,
            scope,
            aud,
            iat: now.unix_timestamp(),
            exp: (now + ASSERTION_LIFETIME).unix_timestamp(),
            sub,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token() {
        let token = AccessToken::new("ya29.secret".to_string(), 3600);
        assert!(!token.is_expired());
        assert_eq!(token.secret(), "ya29.secret");
        assert!(!format!("{token:?}").contains("ya29"));
    }

    #[test]
    fn within_leeway() {
        assert!(AccessToken::new("t".to_string(), 30).is_expired());
        assert!(AccessToken::new("t".to_string(), 0).is_expired());
    }

    #[test]
    fn claims() {
        let claims = Claims::new("iss@sa", "scope", "https://aud", "user@domain");
        assert_eq!(claims.exp - claims.iat, 3600);

        let json = serde_json::to_value(&claims).unwrap();
        pretty_assertions::assert_eq!(
            json.as_object()
                .unwrap()
                .keys()
                .map(String::as_str)
                .collect::<Vec<_>>(),
            vec!["aud", "exp", "iat", "iss", "scope", "sub"]
        );
    }
}

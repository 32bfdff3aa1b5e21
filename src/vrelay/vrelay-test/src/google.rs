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
//! In-process stand-in for the Google endpoints the relay talks to: the
//! OAuth 2.0 token endpoint, the token introspection endpoint and
//! `users.messages.send` of the Gmail API.

use axum::{
    extract::{Form, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use vrelay_config::field::FieldRelayApi;

const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const GMAIL_SEND: &str = "https://www.googleapis.com/auth/gmail.send";

/// How the endpoints answer.
#[derive(Debug, Clone, Copy)]
pub struct Behaviour {
    /// The token endpoint refuses the assertion (delegation not granted).
    pub refuse_token: bool,
    /// The introspection endpoint refuses the token.
    pub refuse_tokeninfo: bool,
    /// Number of the next `send` calls answered with a 403.
    pub send_failures: usize,
    /// Lifetime of the issued tokens, in seconds.
    pub expires_in: i64,
}

impl Default for Behaviour {
    fn default() -> Self {
        Self {
            refuse_token: false,
            refuse_tokeninfo: false,
            send_failures: 0,
            expires_in: 3599,
        }
    }
}

/// A `users.messages.send` call accepted by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentRequest {
    /// Value of the `Authorization` header.
    pub authorization: Option<String>,
    /// The `raw` field of the body.
    pub raw: String,
}

impl SentRequest {
    /// The message, decoded from its url-safe base64 framing.
    ///
    /// # Panics
    ///
    /// * `raw` is not url-safe base64
    #[must_use]
    pub fn message(&self) -> String {
        use base64::Engine;
        String::from_utf8(
            base64::engine::general_purpose::URL_SAFE
                .decode(&self.raw)
                .unwrap(),
        )
        .unwrap()
    }
}

/// What the endpoints have seen so far.
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    /// Number of access tokens issued.
    pub tokens_issued: usize,
    /// Number of introspection calls.
    pub introspections: usize,
    /// Claims of every assertion received by the token endpoint, signature verified.
    pub assertions: Vec<Value>,
    /// Accepted send calls.
    pub sent: Vec<SentRequest>,
}

#[derive(Debug, Default)]
struct Shared {
    behaviour: Behaviour,
    recorded: Recorded,
}

type SharedState = std::sync::Arc<tokio::sync::Mutex<Shared>>;

/// The fake endpoints, served on an ephemeral port of the loopback.
pub struct FakeGoogle {
    /// `http://127.0.0.1:<port>`
    pub base_url: String,
    state: SharedState,
    server: tokio::task::JoinHandle<()>,
}

impl Drop for FakeGoogle {
    fn drop(&mut self) {
        self.server.abort();
    }
}

impl FakeGoogle {
    /// Serve the endpoints.
    ///
    /// # Errors
    ///
    /// * failed to bind the loopback
    pub async fn start(behaviour: Behaviour) -> anyhow::Result<Self> {
        let state = SharedState::new(tokio::sync::Mutex::new(Shared {
            behaviour,
            recorded: Recorded::default(),
        }));

        let app = Router::new()
            .route("/token", post(token))
            .route("/tokeninfo", get(tokeninfo))
            .route("/gmail/v1/users/me/messages/send", post(send))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let base_url = format!("http://{}", listener.local_addr()?);

        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!(%e, "Fake Google endpoints stopped.");
            }
        });

        Ok(Self {
            base_url,
            state,
            server,
        })
    }

    /// The endpoints of the relay configuration, pointing to this fake.
    #[must_use]
    pub fn api(&self) -> FieldRelayApi {
        FieldRelayApi {
            gmail_base_url: self.base_url.clone(),
            token_uri: Some(format!("{}/token", self.base_url)),
            token_info_url: format!("{}/tokeninfo", self.base_url),
        }
    }

    /// Snapshot of what the endpoints have seen.
    pub async fn recorded(&self) -> Recorded {
        self.state.lock().await.recorded.clone()
    }

    /// Answer the next `count` send calls with a 403.
    pub async fn fail_next_sends(&self, count: usize) {
        self.state.lock().await.behaviour.send_failures = count;
    }
}

fn decode_assertion(assertion: &str) -> Result<Value, jsonwebtoken::errors::Error> {
    let key =
        jsonwebtoken::DecodingKey::from_rsa_pem(include_bytes!("../fixtures/test_key.pub.pem"))?;
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.validate_aud = false;

    Ok(jsonwebtoken::decode::<Value>(assertion, &key, &validation)?.claims)
}

async fn token(
    State(state): State<SharedState>,
    Form(form): Form<std::collections::HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    if form.get("grant_type").map(String::as_str) != Some(JWT_BEARER) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "unsupported_grant_type" })),
        );
    }
    let claims = match form.get("assertion").map(|a| decode_assertion(a)) {
        Some(Ok(claims)) => claims,
        Some(Err(e)) => {
            tracing::warn!(%e, "Bad assertion.");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_grant", "error_description": "Invalid JWT Signature." })),
            );
        }
        None => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "invalid_request" })),
            )
        }
    };

    let mut shared = state.lock().await;
    shared.recorded.assertions.push(claims);

    if shared.behaviour.refuse_token {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "error": "unauthorized_client",
                "error_description": "Client is unauthorized to retrieve access tokens using this method."
            })),
        );
    }

    shared.recorded.tokens_issued += 1;
    (
        StatusCode::OK,
        Json(json!({
            "access_token": format!("ya29.fake-{}", shared.recorded.tokens_issued),
            "expires_in": shared.behaviour.expires_in,
            "token_type": "Bearer"
        })),
    )
}

async fn tokeninfo(
    State(state): State<SharedState>,
    Query(query): Query<std::collections::HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let mut shared = state.lock().await;
    shared.recorded.introspections += 1;

    let known = query
        .get("access_token")
        .map_or(false, |token| token.starts_with("ya29.fake-"));
    if shared.behaviour.refuse_tokeninfo || !known {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_token", "error_description": "Invalid Value" })),
        );
    }

    (
        StatusCode::OK,
        Json(json!({
            "azp": "104242424242424242424",
            "aud": "104242424242424242424",
            "scope": GMAIL_SEND,
            "expires_in": shared.behaviour.expires_in.to_string(),
            "access_type": "online"
        })),
    )
}

async fn send(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let mut shared = state.lock().await;

    if shared.behaviour.send_failures > 0 {
        shared.behaviour.send_failures -= 1;
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": {
                    "code": 403,
                    "message": "Delegation denied for relay@example.com",
                    "status": "PERMISSION_DENIED"
                }
            })),
        );
    }

    let Some(raw) = body.get("raw").and_then(Value::as_str) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": { "code": 400, "message": "'raw' RFC822 payload message string or uploading message via /upload/* URL required", "status": "INVALID_ARGUMENT" }
            })),
        );
    };

    shared.recorded.sent.push(SentRequest {
        authorization: headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        raw: raw.to_owned(),
    });

    let id = format!("18c{:05x}", shared.recorded.sent.len());
    (
        StatusCode::OK,
        Json(json!({ "id": id, "threadId": id, "labelIds": ["SENT"] })),
    )
}

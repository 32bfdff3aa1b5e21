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
use crate::{socket_bind_anyhow, AllowList, Relay, Server};
use anyhow::Context;
use vrelay_auth::{AuthorizedClient, DelegatedCredential, Endpoints, Scope};
use vrelay_config::Config;
use vrelay_delivery::GmailApi;

/// Validate the delegated credential against the identity provider, and build
/// the [`Relay`] sending through the Gmail API with it.
///
/// # Errors
///
/// * the service account key is unusable
/// * the identity provider refused the credential
#[inline]
pub async fn build_relay(config: &Config) -> anyhow::Result<Relay> {
    let credential = DelegatedCredential::new(
        &config.relay.service_account_file,
        Scope::GmailSend,
        &config.relay.subject,
        Endpoints {
            token_uri: config.relay.api.token_uri.clone(),
            token_info: config.relay.api.token_info_url.clone(),
        },
    )
    .await
    .with_context(|| {
        format!(
            "Failed to validate the credential of '{}'",
            config.relay.service_account_file.display()
        )
    })?;

    let client = AuthorizedClient::new(std::sync::Arc::new(credential))?;
    let mailer = GmailApi::new(client, &config.relay.api.gmail_base_url);

    Ok(Relay::new(
        AllowList::new(&config.relay.sender_emails),
        std::sync::Arc::new(mailer),
    ))
}

/// Validate the credential, then bind the interfaces and serve the clients.
///
/// Nothing is bound if the credential is refused.
///
/// # Errors
///
/// * see [`build_relay`]
/// * failed to bind an interface
#[inline]
pub async fn run(config: std::sync::Arc<Config>) -> anyhow::Result<()> {
    let relay = build_relay(&config).await?;
    tracing::info!(
        subject = %config.relay.subject,
        allowed = ?config.relay.sender_emails,
        "Relay ready."
    );

    let sockets = config
        .server
        .interfaces
        .addr
        .iter()
        .map(socket_bind_anyhow)
        .collect::<anyhow::Result<Vec<_>>>()?;

    Server::new(config, std::sync::Arc::new(relay))
        .listen(sockets)
        .await
}

/// Start the multi-thread runtime and [`run`] the relay on it.
///
/// # Errors
///
/// * failed to build the runtime
/// * see [`run`]
#[inline]
pub fn start_runtime(config: Config) -> anyhow::Result<()> {
    let config = std::sync::Arc::new(config);

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.system.worker_threads.get())
        .enable_all()
        .thread_name("vrelay-worker")
        .build()
        .context("Failed to build the runtime")?
        .block_on(run(config))
}

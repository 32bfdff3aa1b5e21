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

//! Sections of the [`Config`](crate::Config).

/// Remote answer given to the client when the Gmail API fails.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RemoteErrorPolicy {
    /// Log the failure and accept the message anyway (`250`), it is lost.
    #[default]
    Drop,
    /// Log the failure and answer a transient error (`451`), the client can retry.
    Defer,
}

/// Listener and SMTP session.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServer {
    /// Name of the server, sent in the greeting and the EHLO reply.
    #[serde(default = "FieldServer::hostname")]
    pub name: String,
    /// Maximum number of clients served at the same time, others are refused.
    ///
    /// -1 to disable
    #[serde(default = "FieldServer::default_client_count_max")]
    pub client_count_max: i64,
    /// Maximum size of a message in bytes, advertised with `SIZE`.
    #[serde(default = "FieldServer::default_message_size_limit")]
    pub message_size_limit: usize,
    /// See [`FieldServerSystem`].
    #[serde(default)]
    pub system: FieldServerSystem,
    /// See [`FieldServerInterfaces`].
    #[serde(default)]
    pub interfaces: FieldServerInterfaces,
    /// See [`FieldServerLogs`].
    #[serde(default)]
    pub logs: FieldServerLogs,
    /// See [`FieldServerSMTP`].
    #[serde(default)]
    pub smtp: FieldServerSMTP,
}

/// Resources of the process.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServerSystem {
    /// Number of worker threads of the runtime.
    #[serde(default = "FieldServerSystem::default_worker_threads")]
    pub worker_threads: std::num::NonZeroUsize,
}

/// Addresses the listener is bound to.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServerInterfaces {
    /// One socket per address.
    pub addr: Vec<std::net::SocketAddr>,
}

/// Logs of the process.
#[serde_with::serde_as]
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServerLogs {
    /// Write the logs in this file instead of the standard output.
    #[serde(default)]
    pub filename: Option<std::path::PathBuf>,
    /// Filtering directives, `RUST_LOG` syntax.
    #[serde_as(as = "Vec<serde_with::DisplayFromStr>")]
    #[serde(default = "FieldServerLogs::default_level")]
    pub level: Vec<tracing_subscriber::filter::Directive>,
}

/// How the client is handled.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServerSMTP {
    /// Maximum number of recipients of a message.
    #[serde(default = "FieldServerSMTP::default_rcpt_count_max")]
    pub rcpt_count_max: usize,
    /// Accept batches of commands, advertised with `PIPELINING`.
    #[serde(default = "FieldServerSMTP::default_pipelining")]
    pub pipelining: bool,
    /// See [`FieldServerSMTPError`].
    #[serde(default)]
    pub error: FieldServerSMTPError,
}

/// Specify how the client's errors are handled.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldServerSMTPError {
    /// After `soft_count` errors, each reply is delayed by `delay`.
    ///
    /// -1 to disable
    pub soft_count: i64,
    /// After `hard_count` errors, the connection is closed.
    ///
    /// -1 to disable
    pub hard_count: i64,
    /// Delay applied after `soft_count` errors.
    #[serde(with = "humantime_serde")]
    pub delay: std::time::Duration,
}

/// The mailbox messages are relayed through, and who can use it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRelay {
    /// JSON key of the service account with domain-wide delegation.
    pub service_account_file: std::path::PathBuf,
    /// Mailbox impersonated by the service account.
    pub subject: String,
    /// Addresses allowed in the `From` header of the relayed messages.
    pub sender_emails: Vec<String>,
    /// See [`RemoteErrorPolicy`].
    #[serde(default)]
    pub on_remote_error: RemoteErrorPolicy,
    /// See [`FieldRelayApi`].
    #[serde(default)]
    pub api: FieldRelayApi,
}

/// Remote endpoints, overridden in tests or behind a proxy.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRelayApi {
    /// Base url of the Gmail API.
    #[serde(default = "FieldRelayApi::default_gmail_base_url")]
    pub gmail_base_url: String,
    /// Token endpoint, the `token_uri` of the key file if none.
    #[serde(default)]
    pub token_uri: Option<String>,
    /// Token introspection endpoint.
    #[serde(default = "FieldRelayApi::default_token_info_url")]
    pub token_info_url: String,
}

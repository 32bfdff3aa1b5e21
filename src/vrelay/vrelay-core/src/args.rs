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
use vrelay_config::{
    field::{
        FieldRelay, FieldRelayApi, FieldServer, FieldServerInterfaces, FieldServerLogs,
        RemoteErrorPolicy,
    },
    Config,
};

///
#[derive(Debug, PartialEq, Eq, clap::Subcommand)]
pub enum Commands {
    /// Show the loaded config (as serialized json format)
    ConfigShow,
    /// Show the difference between the loaded config and the default one
    ConfigDiff,
}

///
#[derive(Debug, PartialEq, Eq, clap::Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    ///
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Address the SMTP listener is bound to
    #[arg(short = 'H', long, env = "VRELAY_HOST", default_value = "0.0.0.0")]
    pub host: std::net::IpAddr,

    /// Port of the SMTP listener
    #[arg(short, long, env = "VRELAY_PORT", default_value_t = 2525)]
    pub port: u16,

    /// JSON key of the service account, with domain-wide delegation
    #[arg(short = 'f', long, env = "VRELAY_SERVICE_ACCOUNT_FILE")]
    pub service_account_file: std::path::PathBuf,

    /// Mailbox the messages are sent as
    #[arg(short = 'u', long, env = "VRELAY_SUBJECT")]
    pub subject: String,

    /// Addresses allowed in the 'From' header, comma separated
    #[arg(
        short = 'e',
        long,
        env = "VRELAY_SENDER_EMAILS",
        value_delimiter = ',',
        required = true
    )]
    pub sender_emails: Vec<String>,

    /// Log at debug level
    #[arg(long, env = "VRELAY_DEBUG")]
    pub debug: bool,

    /// Reply to the client when the Gmail API fails: 'drop' (250) or 'defer' (451)
    #[arg(long, env = "VRELAY_ON_REMOTE_ERROR", default_value_t = RemoteErrorPolicy::Drop)]
    pub on_remote_error: RemoteErrorPolicy,

    /// Maximum size of a message, in bytes
    #[arg(long, default_value_t = 10_000_000)]
    pub message_size_limit: usize,

    /// Maximum number of clients served at the same time, -1 to disable
    #[arg(long, default_value_t = 16, allow_negative_numbers = true)]
    pub client_count_max: i64,

    /// Write the logs to this file instead of the standard output
    #[arg(long)]
    pub log_file: Option<std::path::PathBuf>,
}

/// Targets logged at debug level with `--debug`, the http stack stays at info.
const RELAY_TARGETS: [&str; 7] = [
    "vrelay",
    "vrelay_auth",
    "vrelay_common",
    "vrelay_config",
    "vrelay_delivery",
    "vrelay_protocol",
    "vrelay_server",
];

impl Args {
    /// Build the configuration from the arguments.
    ///
    /// # Errors
    ///
    /// * see [`Config::ensure`]
    pub fn to_config(&self) -> Result<Config, vrelay_config::Error> {
        let mut level: Vec<tracing_subscriber::filter::Directive> =
            vec![tracing_subscriber::filter::LevelFilter::INFO.into()];
        if self.debug {
            level.extend(
                RELAY_TARGETS
                    .iter()
                    .filter_map(|target| format!("{target}=debug").parse().ok()),
            );
        }

        Config {
            server: FieldServer {
                client_count_max: self.client_count_max,
                message_size_limit: self.message_size_limit,
                interfaces: FieldServerInterfaces {
                    addr: vec![std::net::SocketAddr::new(self.host, self.port)],
                },
                logs: FieldServerLogs {
                    filename: self.log_file.clone(),
                    level,
                },
                ..FieldServer::default()
            },
            relay: FieldRelay {
                service_account_file: self.service_account_file.clone(),
                subject: self.subject.clone(),
                sender_emails: self
                    .sender_emails
                    .iter()
                    .map(|s| s.trim().to_owned())
                    .filter(|s| !s.is_empty())
                    .collect(),
                on_remote_error: self.on_remote_error,
                api: FieldRelayApi::default(),
            },
        }
        .ensure()
    }
}

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
use crate::field::{
    FieldRelayApi, FieldServer, FieldServerInterfaces, FieldServerLogs, FieldServerSMTP,
    FieldServerSMTPError, FieldServerSystem,
};

impl Default for FieldServer {
    fn default() -> Self {
        Self {
            name: Self::hostname(),
            client_count_max: Self::default_client_count_max(),
            message_size_limit: Self::default_message_size_limit(),
            system: FieldServerSystem::default(),
            interfaces: FieldServerInterfaces::default(),
            logs: FieldServerLogs::default(),
            smtp: FieldServerSMTP::default(),
        }
    }
}

impl FieldServer {
    pub(crate) fn hostname() -> String {
        hostname::get().map_or_else(
            |_| "localhost".to_owned(),
            |name| name.to_string_lossy().to_string(),
        )
    }

    pub(crate) const fn default_client_count_max() -> i64 {
        16
    }

    pub(crate) const fn default_message_size_limit() -> usize {
        10_000_000
    }
}

impl Default for FieldServerSystem {
    fn default() -> Self {
        Self {
            worker_threads: Self::default_worker_threads(),
        }
    }
}

impl FieldServerSystem {
    pub(crate) fn default_worker_threads() -> std::num::NonZeroUsize {
        std::thread::available_parallelism().unwrap_or(std::num::NonZeroUsize::MIN)
    }
}

impl Default for FieldServerInterfaces {
    fn default() -> Self {
        Self {
            addr: vec![Self::default_addr()],
        }
    }
}

impl FieldServerInterfaces {
    pub(crate) const fn default_addr() -> std::net::SocketAddr {
        std::net::SocketAddr::V4(std::net::SocketAddrV4::new(
            std::net::Ipv4Addr::UNSPECIFIED,
            2525,
        ))
    }
}

impl Default for FieldServerLogs {
    fn default() -> Self {
        Self {
            filename: None,
            level: Self::default_level(),
        }
    }
}

impl FieldServerLogs {
    #[allow(clippy::expect_used)]
    pub(crate) fn default_level() -> Vec<tracing_subscriber::filter::Directive> {
        vec!["info".parse().expect("hardcoded value is valid")]
    }
}

impl Default for FieldServerSMTP {
    fn default() -> Self {
        Self {
            rcpt_count_max: Self::default_rcpt_count_max(),
            pipelining: Self::default_pipelining(),
            error: FieldServerSMTPError::default(),
        }
    }
}

impl FieldServerSMTP {
    pub(crate) const fn default_rcpt_count_max() -> usize {
        1000
    }

    pub(crate) const fn default_pipelining() -> bool {
        true
    }
}

impl Default for FieldServerSMTPError {
    fn default() -> Self {
        Self {
            soft_count: 10,
            hard_count: 20,
            delay: std::time::Duration::from_millis(5000),
        }
    }
}

impl Default for FieldRelayApi {
    fn default() -> Self {
        Self {
            gmail_base_url: Self::default_gmail_base_url(),
            token_uri: None,
            token_info_url: Self::default_token_info_url(),
        }
    }
}

impl FieldRelayApi {
    pub(crate) fn default_gmail_base_url() -> String {
        "https://gmail.googleapis.com".to_owned()
    }

    pub(crate) fn default_token_info_url() -> String {
        "https://oauth2.googleapis.com/tokeninfo".to_owned()
    }
}

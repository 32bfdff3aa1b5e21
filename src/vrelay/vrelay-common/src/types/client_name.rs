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

/// Name announced by the client with HELO / EHLO.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[allow(clippy::exhaustive_enums)]
pub enum ClientName {
    /// FQDN of the client.
    Domain(String),
    /// IPv4 address literal, `[127.0.0.1]`.
    Ip4(std::net::Ipv4Addr),
    /// IPv6 address literal, `[IPv6:::1]`.
    Ip6(std::net::Ipv6Addr),
}

impl std::fmt::Display for ClientName {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domain(domain) => write!(f, "{domain}"),
            Self::Ip4(ip) => write!(f, "[{ip}]"),
            Self::Ip6(ip) => write!(f, "[IPv6:{ip}]"),
        }
    }
}

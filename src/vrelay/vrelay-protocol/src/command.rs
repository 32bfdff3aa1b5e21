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

use crate::{Error, ParseArgsError};
use vrelay_common::{Address, ClientName};

macro_rules! strip_suffix_crlf {
    ($v:expr) => {
        $v.0.strip_suffix(b"\r\n")
            .ok_or(ParseArgsError::InvalidArgs)?
    };
}

fn strip_quote(input: &[u8]) -> Result<&[u8], ParseArgsError> {
    input
        .strip_prefix(b"<")
        .ok_or(ParseArgsError::InvalidArgs)?
        .strip_suffix(b">")
        .ok_or(ParseArgsError::InvalidArgs)
}

fn parse_domain(domain: &str) -> Result<String, ParseArgsError> {
    addr::parse_domain_name(domain)
        .map(|domain| domain.as_str().to_owned())
        .map_err(|_err| ParseArgsError::InvalidArgs)
}

/// Buffer received from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedArgs(pub Vec<u8>);

pub type Command<Verb, Args> = (Verb, Args);

/// Information received from the client at the connection TCP/IP.
#[non_exhaustive]
pub struct AcceptArgs {
    /// Peer address of the connection.
    pub client_addr: std::net::SocketAddr,
    /// Address of the server which accepted the connection.
    pub server_addr: std::net::SocketAddr,
    /// Instant when the connection was accepted.
    pub timestamp: time::OffsetDateTime,
    /// Universal unique identifier of the connection.
    pub uuid: uuid::Uuid,
}

impl AcceptArgs {
    /// Create a new instance.
    #[inline]
    #[must_use]
    pub const fn new(
        client_addr: std::net::SocketAddr,
        server_addr: std::net::SocketAddr,
        timestamp: time::OffsetDateTime,
        uuid: uuid::Uuid,
    ) -> Self {
        Self {
            client_addr,
            server_addr,
            timestamp,
            uuid,
        }
    }
}

/// Information received from the client at the HELO command.
#[non_exhaustive]
pub struct HeloArgs {
    /// Name of the client.
    pub client_name: String,
}

/// Information received from the client at the EHLO command.
#[non_exhaustive]
pub struct EhloArgs {
    /// Name of the client.
    pub client_name: ClientName,
}

/// See "SMTP Service Extension for 8-bit MIME Transport"
/// <https://datatracker.ietf.org/doc/html/rfc6152>
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumVariantNames, strum::EnumString)]
pub enum MimeBodyType {
    ///
    #[strum(serialize = "7BIT")]
    SevenBit,
    ///
    #[strum(serialize = "8BITMIME")]
    EightBitMime,
}

/// Information received from the client at the MAIL FROM command.
#[non_exhaustive]
pub struct MailFromArgs {
    /// Sender address, `None` for the null reverse path `<>`.
    pub reverse_path: Option<Address>,
    /// (8BITMIME)
    pub mime_body_type: Option<MimeBodyType>,
    /// (SIZE)
    pub size: Option<usize>,
    /// smtputf8 extension allowing utf8 email
    pub use_smtputf8: bool,
}

/// Information received from the client at the RCPT TO command.
#[non_exhaustive]
pub struct RcptToArgs {
    /// Recipient address.
    pub forward_path: Address,
}

fn split_args(slice: &[u8]) -> Option<(&[u8], &[u8])> {
    slice.iter().position(|c| *c == b'=').map(|pos| {
        let (k, v) = slice.split_at(pos);
        (k, &v[1..])
    })
}

impl TryFrom<UnparsedArgs> for HeloArgs {
    type Error = ParseArgsError;

    #[inline]
    fn try_from(value: UnparsedArgs) -> Result<Self, Self::Error> {
        let value = String::from_utf8(strip_suffix_crlf!(value).to_vec())?;

        Ok(Self {
            client_name: parse_domain(&value)?,
        })
    }
}

impl TryFrom<UnparsedArgs> for EhloArgs {
    type Error = ParseArgsError;

    #[inline]
    fn try_from(value: UnparsedArgs) -> Result<Self, Self::Error> {
        let value = String::from_utf8(strip_suffix_crlf!(value).to_vec())?;

        if !value.is_ascii() {
            return Err(ParseArgsError::InvalidArgs);
        }

        let client_name = match &value {
            ipv6 if ipv6.to_lowercase().starts_with("[ipv6:") && ipv6.ends_with(']') => {
                match ipv6.get("[IPv6:".len()..ipv6.len() - 1) {
                    Some(ipv6) => ClientName::Ip6(ipv6.parse::<std::net::Ipv6Addr>()?),
                    None => return Err(ParseArgsError::InvalidArgs),
                }
            }
            ipv4 if ipv4.starts_with('[') && ipv4.ends_with(']') => {
                match ipv4.get(1..ipv4.len() - 1) {
                    Some(ipv4) => ClientName::Ip4(ipv4.parse::<std::net::Ipv4Addr>()?),
                    None => return Err(ParseArgsError::InvalidArgs),
                }
            }
            domain => ClientName::Domain(parse_domain(domain)?),
        };

        Ok(Self { client_name })
    }
}

impl MailFromArgs {
    fn parse_arguments(&mut self, raw_args: &[u8]) -> Result<(), ParseArgsError> {
        match split_args(raw_args) {
            Some((key, value)) if key.eq_ignore_ascii_case(b"BODY") => {
                if self.mime_body_type.is_some() {
                    return Err(ParseArgsError::InvalidArgs);
                }
                self.mime_body_type = Some(
                    <MimeBodyType as strum::VariantNames>::VARIANTS
                        .iter()
                        .find(|i| value.eq_ignore_ascii_case(i.as_bytes()))
                        .and_then(|body| body.parse().ok())
                        .ok_or(ParseArgsError::InvalidArgs)?,
                );
                Ok(())
            }
            Some((key, value)) if key.eq_ignore_ascii_case(b"SIZE") => {
                if self.size.is_some() {
                    return Err(ParseArgsError::InvalidArgs);
                }
                self.size = Some(
                    std::str::from_utf8(value)?
                        .parse()
                        .map_err(|_e| ParseArgsError::InvalidArgs)?,
                );
                Ok(())
            }
            _ => Err(ParseArgsError::InvalidArgs),
        }
    }

    fn parse_options(&mut self, raw_args: &[u8]) -> Result<(), ParseArgsError> {
        if raw_args.eq_ignore_ascii_case(b"SMTPUTF8") {
            self.use_smtputf8 = true;
            Ok(())
        } else {
            Err(ParseArgsError::InvalidArgs)
        }
    }
}

impl TryFrom<UnparsedArgs> for MailFromArgs {
    type Error = ParseArgsError;

    #[inline]
    fn try_from(value: UnparsedArgs) -> Result<Self, Self::Error> {
        let value = strip_suffix_crlf!(value);

        let mut args = value
            .split(u8::is_ascii_whitespace)
            .filter(|s| !s.is_empty());

        let mailbox = strip_quote(args.next().ok_or(ParseArgsError::InvalidArgs)?)?;
        let mailbox = if mailbox.is_empty() {
            None
        } else {
            Some(String::from_utf8(mailbox.to_vec())?)
        };

        let mut result = Self {
            reverse_path: None,
            mime_body_type: None,
            size: None,
            use_smtputf8: false,
        };

        for arg in args {
            if arg.contains(&b'=') {
                result.parse_arguments(arg)?;
            } else {
                result.parse_options(arg)?;
            }
        }

        result.reverse_path = match mailbox {
            Some(mailbox) => {
                if !result.use_smtputf8 && !mailbox.is_ascii() {
                    return Err(ParseArgsError::EmailUnavailable);
                }
                Some(
                    <Address as std::str::FromStr>::from_str(&mailbox)
                        .map_err(|_error| ParseArgsError::InvalidMailAddress { mail: mailbox })?,
                )
            }
            None => None,
        };
        Ok(result)
    }
}

impl TryFrom<UnparsedArgs> for RcptToArgs {
    type Error = ParseArgsError;

    #[inline]
    fn try_from(value: UnparsedArgs) -> Result<Self, Self::Error> {
        let value = strip_suffix_crlf!(value);

        let mut args = value
            .split(u8::is_ascii_whitespace)
            .filter(|s| !s.is_empty());

        let mailbox = strip_quote(args.next().ok_or(ParseArgsError::InvalidArgs)?)?;
        if mailbox.is_empty() {
            return Err(ParseArgsError::InvalidArgs);
        }
        let mailbox = String::from_utf8(mailbox.to_vec())?;

        // no DSN support, any parameter is refused
        if args.next().is_some() {
            return Err(ParseArgsError::InvalidArgs);
        }

        Ok(Self {
            forward_path: <Address as std::str::FromStr>::from_str(&mailbox)
                .map_err(|_error| ParseArgsError::InvalidMailAddress { mail: mailbox })?,
        })
    }
}

/// SMTP Command.
#[derive(
    Debug, Copy, Clone, PartialEq, Eq, strum::AsRefStr, strum::EnumString, strum::EnumVariantNames,
)]
#[non_exhaustive]
pub enum Verb {
    /// Used to identify the SMTP client to the SMTP server. (historical)
    #[strum(serialize = "HELO ")]
    Helo,
    /// Used to identify the SMTP client to the SMTP server and request smtp extensions.
    #[strum(serialize = "EHLO ")]
    Ehlo,
    /// Initiate a mail transaction.
    #[strum(serialize = "MAIL FROM:")]
    MailFrom,
    /// Identify one recipient of the mail transaction.
    #[strum(serialize = "RCPT TO:")]
    RcptTo,
    /// The following lines are the message, up to `<CRLF>.<CRLF>`.
    #[strum(serialize = "DATA\r\n")]
    Data,
    /// The receiver sends "221" and closes the transmission channel.
    #[strum(serialize = "QUIT\r\n")]
    Quit,
    /// Abort the current mail transaction.
    #[strum(serialize = "RSET\r\n")]
    Rset,
    /// Ask for helpful information, optionally about a command.
    #[strum(serialize = "HELP")]
    Help,
    /// Does nothing.
    #[strum(serialize = "NOOP\r\n")]
    Noop,
    /// Any other buffer received while expecting a command is considered an
    /// unknown.
    Unknown,
}

impl Verb {
    /// check if the answer of the verb is bufferable (cf. pipelining)
    #[inline]
    #[must_use]
    pub const fn is_bufferable(self) -> bool {
        !matches!(self, Self::Ehlo | Self::Data | Self::Quit | Self::Noop)
    }
}

pub type Batch = Vec<Result<Command<Verb, UnparsedArgs>, Error>>;

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
use crate::{Address, ClientName};

/// Stage of the step-by-step SMTP transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Stage {
    /// The client has just connected to the server
    Connect,
    /// The client has sent the HELO/EHLO command
    Helo,
    /// The client has sent the MAIL FROM command
    #[strum(serialize = "mail")]
    MailFrom,
    /// The client has sent the RCPT TO command
    #[strum(serialize = "rcpt")]
    RcptTo,
    /// The client has sent the complete message
    #[strum(serialize = "preq")]
    Finished,
}

/// A step-by-step SMTP envelop produced by the transaction
#[derive(Debug, Clone, serde::Serialize)]
pub enum Context {
    /// See [`Stage::Connect`]
    Connect(ContextConnect),
    /// See [`Stage::Helo`]
    Helo(ContextHelo),
    /// See [`Stage::MailFrom`]
    MailFrom(ContextMailFrom),
    /// See [`Stage::RcptTo`]
    RcptTo(ContextRcptTo),
    /// See [`Stage::Finished`]
    Finished(ContextFinished),
}

/// Error produced when accessing a field not available in the current stage.
#[derive(Debug)]
pub struct FieldAccessError {
    field: String,
    stage: Vec<Stage>,
}

impl std::error::Error for FieldAccessError {}

impl std::fmt::Display for FieldAccessError {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "field '{}' is available in [{}]",
            self.field,
            self.stage
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

///
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error produce when converting the state to another after a command
    #[error("cannot go from stage '{from}' to stage '{to}'")]
    Conversion {
        /// Current stage.
        from: Stage,
        /// Requested stage.
        to: Stage,
    },
    /// Error produce when accessing a field not available in the current state
    #[error("{0}")]
    BadState(#[from] FieldAccessError),
}

macro_rules! after {
    (Helo) => {
        vec![Stage::Helo, Stage::MailFrom, Stage::RcptTo, Stage::Finished]
    };
    (MailFrom) => {
        vec![Stage::MailFrom, Stage::RcptTo, Stage::Finished]
    };
    (RcptTo) => {
        vec![Stage::RcptTo, Stage::Finished]
    };
    (Finished) => {
        vec![Stage::Finished]
    };
}

/// Properties available from the TCP/IP connection.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectProperties {
    /// Instant when the connection was accepted.
    #[serde(with = "time::serde::iso8601")]
    pub connect_timestamp: time::OffsetDateTime,
    /// Universal unique identifier of the connection.
    pub connect_uuid: uuid::Uuid,
    /// Peer address of the connection.
    pub client_addr: std::net::SocketAddr,
    /// Address of the server which accepted the connection.
    pub server_addr: std::net::SocketAddr,
    /// Name of the server.
    pub server_name: String,
}

/// Properties available after the HELO / EHLO command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HeloProperties {
    /// Name announced by the client.
    pub client_name: ClientName,
    /// The client used HELO instead of EHLO.
    pub using_deprecated: bool,
}

/// Properties available after the MAIL FROM command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MailFromProperties {
    /// Envelope sender, `None` for the null reverse path.
    pub reverse_path: Option<Address>,
    /// Instant of the MAIL FROM command.
    #[serde(with = "time::serde::iso8601")]
    pub mail_timestamp: time::OffsetDateTime,
    /// Universal unique identifier of the message.
    pub message_uuid: uuid::Uuid,
    /// The client asked for the SMTPUTF8 extension.
    pub utf8: bool,
}

/// Properties available after the RCPT TO command.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RcptToProperties {
    /// Envelope recipients.
    pub forward_paths: Vec<Address>,
}

/// See [`Stage::Connect`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextConnect {
    /// See [`ConnectProperties`]
    pub connect: ConnectProperties,
}

/// See [`Stage::Helo`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextHelo {
    /// See [`ConnectProperties`]
    pub connect: ConnectProperties,
    /// See [`HeloProperties`]
    pub helo: HeloProperties,
}

/// See [`Stage::MailFrom`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextMailFrom {
    /// See [`ConnectProperties`]
    pub connect: ConnectProperties,
    /// See [`HeloProperties`]
    pub helo: HeloProperties,
    /// See [`MailFromProperties`]
    pub mail_from: MailFromProperties,
}

/// See [`Stage::RcptTo`]
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextRcptTo {
    /// See [`ConnectProperties`]
    pub connect: ConnectProperties,
    /// See [`HeloProperties`]
    pub helo: HeloProperties,
    /// See [`MailFromProperties`]
    pub mail_from: MailFromProperties,
    /// See [`RcptToProperties`]
    pub rcpt_to: RcptToProperties,
}

/// The envelope of a complete transaction, handed over with the message.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ContextFinished {
    /// See [`ConnectProperties`]
    pub connect: ConnectProperties,
    /// See [`HeloProperties`]
    pub helo: HeloProperties,
    /// See [`MailFromProperties`]
    pub mail_from: MailFromProperties,
    /// See [`RcptToProperties`]
    pub rcpt_to: RcptToProperties,
}

impl Context {
    /// Create a context in the [`Stage::Connect`].
    #[inline]
    #[must_use]
    pub fn new(
        client_addr: std::net::SocketAddr,
        server_addr: std::net::SocketAddr,
        server_name: String,
        timestamp: time::OffsetDateTime,
        uuid: uuid::Uuid,
    ) -> Self {
        Self::Connect(ContextConnect {
            connect: ConnectProperties {
                connect_timestamp: timestamp,
                connect_uuid: uuid,
                client_addr,
                server_addr,
                server_name,
            },
        })
    }

    /// Get the current SMTP stage of the transaction
    #[inline]
    #[must_use]
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Connect { .. } => Stage::Connect,
            Self::Helo { .. } => Stage::Helo,
            Self::MailFrom { .. } => Stage::MailFrom,
            Self::RcptTo { .. } => Stage::RcptTo,
            Self::Finished { .. } => Stage::Finished,
        }
    }

    /// Called when a "RSET" is issued, or after a message has been handled.
    #[inline]
    pub fn reset(&mut self) {
        match self {
            Self::Connect(_) => (),
            Self::Helo(ContextHelo { connect, helo })
            | Self::MailFrom(ContextMailFrom { connect, helo, .. })
            | Self::RcptTo(ContextRcptTo { connect, helo, .. })
            | Self::Finished(ContextFinished { connect, helo, .. }) => {
                *self = Self::Helo(ContextHelo {
                    connect: connect.clone(),
                    helo: helo.clone(),
                });
            }
        }
    }

    /// Convert the context to a [`ContextHelo`] or overwrite the existing one.
    ///
    /// A new HELO / EHLO in the middle of a transaction drops the transaction.
    #[inline]
    pub fn to_helo(&mut self, client_name: ClientName, using_deprecated: bool) {
        let connect = self.connect().clone();
        *self = Self::Helo(ContextHelo {
            connect,
            helo: HeloProperties {
                client_name,
                using_deprecated,
            },
        });
    }

    /// Convert the context to a [`ContextMailFrom`].
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::Helo`]
    #[inline]
    pub fn to_mail_from(&mut self, reverse_path: Option<Address>, utf8: bool) -> Result<(), Error> {
        match self {
            Self::Helo(ContextHelo { connect, helo }) => {
                *self = Self::MailFrom(ContextMailFrom {
                    connect: connect.clone(),
                    helo: helo.clone(),
                    mail_from: MailFromProperties {
                        reverse_path,
                        mail_timestamp: time::OffsetDateTime::now_utc(),
                        message_uuid: uuid::Uuid::new_v4(),
                        utf8,
                    },
                });
                Ok(())
            }
            otherwise => Err(Error::Conversion {
                from: otherwise.stage(),
                to: Stage::MailFrom,
            }),
        }
    }

    /// Add a recipient to the envelope.
    /// If the state was [`Stage::MailFrom`], the state is changed to [`Stage::RcptTo`].
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::MailFrom`] or [`Stage::RcptTo`]
    #[inline]
    pub fn add_forward_path(&mut self, forward_path: Address) -> Result<(), Error> {
        match self {
            Self::MailFrom(ContextMailFrom {
                connect,
                helo,
                mail_from,
            }) => {
                *self = Self::RcptTo(ContextRcptTo {
                    connect: connect.clone(),
                    helo: helo.clone(),
                    mail_from: mail_from.clone(),
                    rcpt_to: RcptToProperties {
                        forward_paths: vec![forward_path],
                    },
                });
                Ok(())
            }
            Self::RcptTo(ContextRcptTo { rcpt_to, .. }) => {
                rcpt_to.forward_paths.push(forward_path);
                Ok(())
            }
            otherwise => Err(Error::Conversion {
                from: otherwise.stage(),
                to: Stage::RcptTo,
            }),
        }
    }

    /// Convert the context to a [`ContextFinished`]
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::RcptTo`]
    #[inline]
    pub fn to_finished(&mut self) -> Result<(), Error> {
        match self {
            Self::RcptTo(ContextRcptTo {
                connect,
                helo,
                mail_from,
                rcpt_to,
            }) => {
                *self = Self::Finished(ContextFinished {
                    connect: connect.clone(),
                    helo: helo.clone(),
                    mail_from: mail_from.clone(),
                    rcpt_to: rcpt_to.clone(),
                });
                Ok(())
            }
            otherwise => Err(Error::Conversion {
                from: otherwise.stage(),
                to: Stage::Finished,
            }),
        }
    }

    /// Take the finished envelope out of the context, and go back to [`Stage::Helo`]
    /// for the next transaction of the connection.
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::Finished`]
    #[inline]
    #[function_name::named]
    pub fn take_finished(&mut self) -> Result<ContextFinished, Error> {
        match self {
            Self::Finished(finished) => {
                let finished = finished.clone();
                self.reset();
                Ok(finished)
            }
            _ => Err(FieldAccessError {
                field: function_name!().to_owned(),
                stage: after!(Finished),
            }
            .into()),
        }
    }

    /// Get the properties of the connection.
    #[inline]
    #[must_use]
    pub const fn connect(&self) -> &ConnectProperties {
        match self {
            Self::Connect(ContextConnect { connect })
            | Self::Helo(ContextHelo { connect, .. })
            | Self::MailFrom(ContextMailFrom { connect, .. })
            | Self::RcptTo(ContextRcptTo { connect, .. })
            | Self::Finished(ContextFinished { connect, .. }) => connect,
        }
    }

    /// Get the name announced by the client.
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::Helo`] or after
    #[inline]
    #[function_name::named]
    pub fn client_name(&self) -> Result<&ClientName, Error> {
        match self {
            Self::Connect(_) => Err(FieldAccessError {
                field: function_name!().to_owned(),
                stage: after!(Helo),
            }
            .into()),
            Self::Helo(ContextHelo { helo, .. })
            | Self::MailFrom(ContextMailFrom { helo, .. })
            | Self::RcptTo(ContextRcptTo { helo, .. })
            | Self::Finished(ContextFinished { helo, .. }) => Ok(&helo.client_name),
        }
    }

    /// Get the envelope sender.
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::MailFrom`] or after
    #[inline]
    #[function_name::named]
    pub fn reverse_path(&self) -> Result<Option<&Address>, Error> {
        match self {
            Self::Connect(_) | Self::Helo(_) => Err(FieldAccessError {
                field: function_name!().to_owned(),
                stage: after!(MailFrom),
            }
            .into()),
            Self::MailFrom(ContextMailFrom { mail_from, .. })
            | Self::RcptTo(ContextRcptTo { mail_from, .. })
            | Self::Finished(ContextFinished { mail_from, .. }) => {
                Ok(mail_from.reverse_path.as_ref())
            }
        }
    }

    /// Has the client asked for the SMTPUTF8 extension in the current transaction.
    #[inline]
    #[must_use]
    pub const fn is_utf8_advertised(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Helo(_) => false,
            Self::MailFrom(ContextMailFrom { mail_from, .. })
            | Self::RcptTo(ContextRcptTo { mail_from, .. })
            | Self::Finished(ContextFinished { mail_from, .. }) => mail_from.utf8,
        }
    }

    /// Get the envelope recipients.
    ///
    /// # Errors
    ///
    /// * state if not [`Stage::RcptTo`] or after
    #[inline]
    #[function_name::named]
    pub fn forward_paths(&self) -> Result<&[Address], Error> {
        match self {
            Self::Connect(_) | Self::Helo(_) | Self::MailFrom(_) => Err(FieldAccessError {
                field: function_name!().to_owned(),
                stage: after!(RcptTo),
            }
            .into()),
            Self::RcptTo(ContextRcptTo { rcpt_to, .. })
            | Self::Finished(ContextFinished { rcpt_to, .. }) => Ok(&rcpt_to.forward_paths),
        }
    }
}

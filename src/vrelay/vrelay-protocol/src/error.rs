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

/// Error of the SMTP session.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The underlying connection failed, the session cannot continue.
    #[error("smtp protocol error: {0}")]
    Io(#[from] std::io::Error),
    /// The client sent an invalid buffer, the session can continue.
    #[error("{0}")]
    ParseArgs(#[from] ParseArgsError),
}

impl Error {
    pub(crate) const fn buffer_too_long(expected: usize, got: usize) -> Self {
        Self::ParseArgs(ParseArgsError::BufferTooLong { expected, got })
    }

    pub(crate) fn no_crlf() -> Self {
        std::io::Error::new(std::io::ErrorKind::InvalidData, "No CRLF found").into()
    }

    pub(crate) fn unexpected_eof(context: &str) -> Self {
        std::io::Error::new(std::io::ErrorKind::UnexpectedEof, context.to_owned()).into()
    }

    /// Get the kind of the io error, if any.
    #[inline]
    #[must_use]
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            Self::Io(e) => Some(e.kind()),
            Self::ParseArgs(_) => None,
        }
    }
}

/// Error while parsing the arguments of a command.
#[allow(clippy::module_name_repetitions)]
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ParseArgsError {
    /// Non-UTF8 buffer.
    #[error("{0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
    /// Non-UTF8 buffer.
    #[error("{0}")]
    InvalidUtf8ref(#[from] std::str::Utf8Error),
    /// Invalid IP address.
    #[error("{0}")]
    BadTypeAddr(#[from] std::net::AddrParseError),
    /// The buffer is too big (between each "\r\n").
    #[error("buffer is not supposed to be longer than {expected} bytes but got {got}")]
    BufferTooLong {
        /// buffer size limit
        expected: usize,
        /// actual size of the buffer we got
        got: usize,
    },
    /// mail address is invalid (for rcpt, mail from ...)
    #[error("invalid mail address: '{mail}'")]
    InvalidMailAddress {
        /// ill-formatted mail address
        mail: String,
    },
    /// The address is in utf8 and the SMTPUTF8 option was not provided.
    #[error("mailbox name not allowed without SMTPUTF8")]
    EmailUnavailable,
    /// Any other syntax error.
    #[error("syntax error in parameters or arguments")]
    InvalidArgs,
}

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
use crate::ReplyCode;

/// Error produced when a buffer is not a valid SMTP reply.
#[derive(Debug, thiserror::Error)]
pub enum ParseReplyError {
    /// The buffer does not contain any line.
    #[error("reply is empty")]
    Empty,
    /// A line does not start with a valid reply code.
    #[error("line '{line}' does not start with a valid reply code")]
    InvalidCode {
        /// The faulty line.
        line: String,
    },
    /// Multi-line reply with inconsistent codes or separators.
    #[error("line '{line}' is not a valid continuation of the reply")]
    InvalidLine {
        /// The faulty line.
        line: String,
    },
}

/// SMTP message send by the server to the client as defined in RFC5321#4.2
///
/// The wire representation is kept, each line terminated by `\r\n`.
#[derive(Debug, Clone, PartialEq, Eq, serde_with::SerializeDisplay, serde_with::DeserializeFromStr)]
pub struct Reply {
    code: ReplyCode,
    text: String,
}

fn parse_code(line: &str) -> Result<u16, ParseReplyError> {
    line.get(..3)
        .filter(|code| code.bytes().all(|c| c.is_ascii_digit()))
        .and_then(|code| code.parse::<u16>().ok())
        .filter(|code| (200..600).contains(code))
        .ok_or_else(|| ParseReplyError::InvalidCode {
            line: line.to_owned(),
        })
}

impl std::str::FromStr for Reply {
    type Err = ParseReplyError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = if s.ends_with("\r\n") {
            s.to_owned()
        } else {
            format!("{s}\r\n")
        };

        let lines = text.split_inclusive("\r\n").collect::<Vec<_>>();
        let Some(first) = lines.first() else {
            return Err(ParseReplyError::Empty);
        };
        let code = parse_code(first)?;

        for (idx, line) in lines.iter().enumerate() {
            let is_last = idx == lines.len() - 1;
            let separator = line.as_bytes().get(3).copied();

            let valid_separator = match separator {
                Some(b'-') => !is_last,
                Some(b' ') => is_last,
                Some(b'\r') => is_last && line.len() == 5,
                _ => false,
            };
            if parse_code(line)? != code || !valid_separator || !line.ends_with("\r\n") {
                return Err(ParseReplyError::InvalidLine {
                    line: (*line).to_owned(),
                });
            }
        }

        let enhanced = first
            .get(4..)
            .and_then(|rest| rest.trim_end().split(' ').next())
            .filter(|candidate| ReplyCode::is_enhanced(candidate));

        Ok(Self {
            code: enhanced.map_or(ReplyCode::Code { code }, |enhanced| {
                ReplyCode::Enhanced {
                    code,
                    enhanced: enhanced.to_owned(),
                }
            }),
            text,
        })
    }
}

impl AsRef<str> for Reply {
    #[inline]
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for Reply {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

impl Reply {
    /// Build a single-line reply, the text must not contain `\r\n`.
    ///
    /// # Errors
    ///
    /// * the text contains a line break
    #[inline]
    pub fn new(code: ReplyCode, text: impl AsRef<str>) -> Result<Self, ParseReplyError> {
        format!("{code} {}\r\n", text.as_ref()).parse()
    }

    /// Get the code of the reply.
    #[inline]
    #[must_use]
    pub const fn code(&self) -> &ReplyCode {
        &self.code
    }

    /// Get the text of the reply, without codes and line terminators.
    #[inline]
    #[must_use]
    pub fn text(&self) -> String {
        let skip = match &self.code {
            ReplyCode::Code { .. } => 4,
            ReplyCode::Enhanced { enhanced, .. } => 5 + enhanced.len(),
        };
        self.text
            .split_inclusive("\r\n")
            .map(|line| line.trim_end_matches("\r\n").get(skip..).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Prepend the lines of this reply to `other`, producing a multi-line reply
    /// with the code of `other` on every line.
    #[inline]
    #[must_use]
    pub fn extended(&self, other: &Self) -> Self {
        let code = other.code.value();
        let mut text = String::with_capacity(self.text.len() + other.text.len());
        for line in self.text.split_inclusive("\r\n") {
            let rest = line.trim_end_matches("\r\n").get(4..).unwrap_or_default();
            text.push_str(&format!("{code}-{rest}\r\n"));
        }
        text.push_str(&other.text);

        Self {
            code: other.code.clone(),
            text,
        }
    }
}

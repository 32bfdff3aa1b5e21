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

/// Code of a SMTP reply, optionally followed by an enhanced status code (RFC3463).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[allow(clippy::exhaustive_enums)]
pub enum ReplyCode {
    /// Simple reply code, `250`.
    Code {
        /// The three digits code.
        code: u16,
    },
    /// Reply code with an enhanced status, `550 5.7.1`.
    Enhanced {
        /// The three digits code.
        code: u16,
        /// The enhanced status code, `class.subject.detail`.
        enhanced: String,
    },
}

impl ReplyCode {
    /// Get the three digits code.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> u16 {
        match self {
            Self::Code { code } | Self::Enhanced { code, .. } => *code,
        }
    }

    /// Get the enhanced status code, if any.
    #[inline]
    #[must_use]
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::Code { .. } => None,
            Self::Enhanced { enhanced, .. } => Some(enhanced),
        }
    }

    /// Is the code a transient (4yz) or permanent (5yz) negative completion.
    #[inline]
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.value() / 100 >= 4
    }

    pub(crate) fn is_enhanced(input: &str) -> bool {
        let mut parts = input.split('.');
        let (Some(class), Some(subject), Some(detail), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return false;
        };

        matches!(class, "2" | "4" | "5")
            && [subject, detail]
                .iter()
                .all(|i| (1..=3).contains(&i.len()) && i.bytes().all(|c| c.is_ascii_digit()))
    }
}

impl std::fmt::Display for ReplyCode {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code { code } => write!(f, "{code}"),
            Self::Enhanced { code, enhanced } => write!(f, "{code} {enhanced}"),
        }
    }
}

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
use mailparse::MailHeaderMap;
use vrelay_common::{ContextFinished, MessageHandler, RelayOutcome, Rejection};
use vrelay_delivery::{GmailMessage, Mailer};

/// Addresses allowed in the `From` header, compared without case.
#[derive(Debug, Clone)]
pub struct AllowList {
    entries: std::collections::BTreeSet<String>,
    configured: Vec<String>,
}

impl AllowList {
    /// Build the list from the configured addresses.
    #[inline]
    #[must_use]
    pub fn new(senders: &[String]) -> Self {
        Self {
            entries: senders.iter().map(|s| s.to_ascii_lowercase()).collect(),
            configured: senders.to_vec(),
        }
    }

    /// Is `address` part of the list.
    #[inline]
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.entries.contains(&address.to_ascii_lowercase())
    }

    /// The addresses, as configured.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.configured
    }
}

#[allow(clippy::expect_used)]
fn display_form() -> &'static regex::Regex {
    static DISPLAY_FORM: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    DISPLAY_FORM.get_or_init(|| regex::Regex::new("^[^<]+ <(.+)>$").expect("valid syntax"))
}

/// Relay the messages of the trusted senders through a [`Mailer`].
pub struct Relay {
    allow_list: AllowList,
    mailer: std::sync::Arc<dyn Mailer>,
}

impl std::fmt::Debug for Relay {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("allow_list", &self.allow_list)
            .finish_non_exhaustive()
    }
}

impl Relay {
    /// Create a relay sending the messages allowed by `allow_list` with `mailer`.
    #[inline]
    #[must_use]
    pub fn new(allow_list: AllowList, mailer: std::sync::Arc<dyn Mailer>) -> Self {
        Self { allow_list, mailer }
    }

    /// Get the declared sender of `message`, the address of its `From` header.
    ///
    /// Only the header section is parsed, the header must be of the form
    /// `Display Name <address>`.
    ///
    /// # Errors
    ///
    /// * [`Rejection::InvalidFromHeader`] if the headers cannot be parsed, if there is
    ///   no `From` header or if it is not of the expected form
    #[inline]
    pub fn extract_sender(message: &[u8]) -> Result<String, Rejection> {
        let Ok((headers, _)) = mailparse::parse_headers(message) else {
            return Err(Rejection::InvalidFromHeader { header: None });
        };
        let Some(from) = headers.get_first_value("From") else {
            return Err(Rejection::InvalidFromHeader { header: None });
        };

        let from = from.trim().to_owned();

        let sender = display_form()
            .captures(&from)
            .and_then(|captures| captures.get(1))
            .map(|address| address.as_str().to_owned());

        sender.ok_or(Rejection::InvalidFromHeader { header: Some(from) })
    }

    /// Check `sender` against the allow-list.
    ///
    /// # Errors
    ///
    /// * [`Rejection::SenderNotAllowed`] if it is not part of it
    #[inline]
    pub fn authorize(&self, sender: String) -> Result<String, Rejection> {
        if self.allow_list.contains(&sender) {
            Ok(sender)
        } else {
            Err(Rejection::SenderNotAllowed {
                sender,
                allowed: self.allow_list.as_slice().to_vec(),
            })
        }
    }

    async fn relay(&self, message: &[u8]) -> RelayOutcome {
        let sender = match Self::extract_sender(message).and_then(|s| self.authorize(s)) {
            Ok(sender) => sender,
            Err(rejection) => return RelayOutcome::Rejected(rejection),
        };
        tracing::debug!(%sender, size = message.len(), "Sender allowed, sending...");

        match self.mailer.send(&GmailMessage::new(message)).await {
            Ok(sent) => RelayOutcome::Sent { id: sent.id },
            Err(error) => RelayOutcome::RemoteError(error.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl MessageHandler for Relay {
    #[tracing::instrument(name = "relay", skip_all, fields(uuid = %envelope.mail_from.message_uuid))]
    async fn handle(&self, envelope: &ContextFinished, message: &[u8]) -> RelayOutcome {
        tracing::debug!(
            client = %envelope.connect.client_addr,
            helo = %envelope.helo.client_name,
            mail_from = ?envelope.mail_from.reverse_path.as_ref().map(ToString::to_string),
            rcpt_to = ?envelope.rcpt_to.forward_paths.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "Message received."
        );

        let outcome = self.relay(message).await;
        match &outcome {
            RelayOutcome::Sent { id } => {
                tracing::info!(%id, "Message sent.");
            }
            RelayOutcome::Rejected(Rejection::InvalidFromHeader { header }) => {
                tracing::warn!(?header, "Invalid 'From' header, message not sent.");
            }
            RelayOutcome::Rejected(Rejection::SenderNotAllowed { sender, allowed }) => {
                tracing::warn!(%sender, ?allowed, "Sender not allowed, message not sent.");
            }
            RelayOutcome::RemoteError(detail) => {
                tracing::error!(%detail, "Gmail API failure, message not sent.");
            }
            _ => {}
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vrelay_common::{addr, ClientName, Context};
    use vrelay_delivery::{Error, SentMessage};

    #[derive(Default)]
    struct Recorder {
        sent: std::sync::Mutex<Vec<GmailMessage>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Mailer for Recorder {
        async fn send(&self, message: &GmailMessage) -> Result<SentMessage, Error> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(Error::from_api_response(
                    403,
                    r#"{"error":{"code":403,"message":"Delegation denied","status":"PERMISSION_DENIED"}}"#,
                ));
            }
            Ok(SentMessage {
                id: "18c1f".to_owned(),
                thread_id: None,
                label_ids: vec![],
            })
        }
    }

    fn envelope() -> ContextFinished {
        let mut ctx = Context::new(
            "127.0.0.1:49152".parse().unwrap(),
            "127.0.0.1:2525".parse().unwrap(),
            "relay.example.com".to_owned(),
            time::OffsetDateTime::now_utc(),
            uuid::Uuid::new_v4(),
        );
        ctx.to_helo(ClientName::Domain("client.example.com".to_owned()), false);
        ctx.to_mail_from(Some(addr!("no-reply@example.com")), false)
            .unwrap();
        ctx.add_forward_path(addr!("john.doe@example.org")).unwrap();
        ctx.to_finished().unwrap();
        ctx.take_finished().unwrap()
    }

    fn relay(recorder: std::sync::Arc<Recorder>) -> Relay {
        Relay::new(
            AllowList::new(&["no-reply@example.com".to_owned()]),
            recorder,
        )
    }

    #[rstest::rstest]
    #[case("From: Bot <no-reply@example.com>\r\n\r\nhi\r\n", "no-reply@example.com")]
    #[case("from: \"Bot, Inc.\" <bot@example.com>\r\n\r\n", "bot@example.com")]
    #[case("Subject: x\r\nFrom: Bot\r\n <bot@example.com>\r\n\r\n", "bot@example.com")]
    #[case(
        "From: Bot <first@example.com>\r\nFrom: Other <second@example.com>\r\n\r\n",
        "first@example.com"
    )]
    fn extract(#[case] message: &str, #[case] expected: &str) {
        assert_eq!(Relay::extract_sender(message.as_bytes()).unwrap(), expected);
    }

    #[rstest::rstest]
    #[case("Subject: no from\r\n\r\nhi\r\n", None)]
    #[case("From: no-reply@example.com\r\n\r\n", Some("no-reply@example.com"))]
    #[case("From: <no-reply@example.com>\r\n\r\n", Some("<no-reply@example.com>"))]
    #[case("From: Bot <>\r\n\r\n", Some("Bot <>"))]
    fn extract_invalid(#[case] message: &str, #[case] header: Option<&str>) {
        assert_eq!(
            Relay::extract_sender(message.as_bytes()),
            Err(Rejection::InvalidFromHeader {
                header: header.map(str::to_owned)
            })
        );
    }

    #[test]
    fn allow_list_ignores_case() {
        let allow_list = AllowList::new(&["No-Reply@Example.com".to_owned()]);
        assert!(allow_list.contains("no-reply@example.com"));
        assert!(allow_list.contains("NO-REPLY@EXAMPLE.COM"));
        assert!(!allow_list.contains("no-reply@example.org"));
        assert_eq!(allow_list.as_slice(), ["No-Reply@Example.com".to_owned()]);
    }

    #[tokio::test]
    async fn sent() {
        let recorder = std::sync::Arc::new(Recorder::default());
        let message = b"From: Bot <no-reply@example.com>\r\nSubject: hi\r\n\r\nhello\r\n";

        let outcome = relay(recorder.clone()).handle(&envelope(), message).await;

        assert_eq!(
            outcome,
            RelayOutcome::Sent {
                id: "18c1f".to_owned()
            }
        );
        assert_eq!(
            *recorder.sent.lock().unwrap(),
            vec![GmailMessage::new(message)]
        );
    }

    #[tokio::test]
    async fn sender_not_allowed() {
        let recorder = std::sync::Arc::new(Recorder::default());

        let outcome = relay(recorder.clone())
            .handle(&envelope(), b"From: Eve <eve@example.com>\r\n\r\nhello\r\n")
            .await;

        assert_eq!(
            outcome,
            RelayOutcome::Rejected(Rejection::SenderNotAllowed {
                sender: "eve@example.com".to_owned(),
                allowed: vec!["no-reply@example.com".to_owned()]
            })
        );
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_from_header() {
        let recorder = std::sync::Arc::new(Recorder::default());

        let outcome = relay(recorder.clone())
            .handle(&envelope(), b"Subject: hi\r\n\r\nhello\r\n")
            .await;

        assert_eq!(outcome.as_str(), "invalid_from_header");
        assert!(recorder.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn remote_error() {
        let recorder = std::sync::Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });

        let outcome = relay(recorder.clone())
            .handle(&envelope(), b"From: Bot <no-reply@example.com>\r\n\r\nhello\r\n")
            .await;

        assert_eq!(
            outcome,
            RelayOutcome::RemoteError(
                "gmail api error 403 [PERMISSION_DENIED]: Delegation denied".to_owned()
            )
        );
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
    }
}

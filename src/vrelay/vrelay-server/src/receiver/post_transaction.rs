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
use super::handler::reply;
use crate::Handler;
use tokio_stream::StreamExt;
use vrelay_common::{ContextFinished, RelayOutcome, Rejection, Reply};
use vrelay_config::field::RemoteErrorPolicy;
use vrelay_protocol::{Error, ParseArgsError, ReceiverContext};

impl Handler {
    pub(super) async fn on_message_inner<S>(
        &mut self,
        ctx: &mut ReceiverContext,
        mut stream: S,
    ) -> Result<(ContextFinished, Vec<u8>), Reply>
    where
        S: tokio_stream::Stream<Item = Result<Vec<u8>, Error>> + Send + Unpin,
    {
        tracing::info!("SMTP handshake completed, fetching message...");

        let mut message = Vec::new();
        while let Some(line) = stream.next().await {
            match line {
                Ok(line) => message.extend_from_slice(&line),
                Err(Error::ParseArgs(ParseArgsError::BufferTooLong { expected, got })) => {
                    tracing::warn!(
                        expected,
                        got,
                        "Message size limit exceeded, discarding the rest."
                    );
                    self.context.reset();
                    while let Some(rest) = stream.next().await {
                        if let Err(error) = rest {
                            tracing::warn!(%error, "Message not fully received.");
                            ctx.deny();
                            return Err(reply("451 4.3.0 Message not fully received\r\n"));
                        }
                    }
                    return Err(reply(
                        "552 4.3.1 Message size exceeds fixed maximum message size\r\n",
                    ));
                }
                Err(error) => {
                    tracing::warn!(%error, "Message not fully received.");
                    self.context.reset();
                    ctx.deny();
                    return Err(reply("451 4.3.0 Message not fully received\r\n"));
                }
            }
        }
        tracing::info!(size = message.len(), "Message fully received, relaying...");

        match self.context.take_finished() {
            Ok(envelope) => Ok((envelope, message)),
            Err(error) => {
                tracing::error!(%error, "Message received out of sequence.");
                self.context.reset();
                Err(reply("503 Bad sequence of commands\r\n"))
            }
        }
    }

    pub(super) async fn on_message_completed_inner(
        &self,
        envelope: ContextFinished,
        message: Vec<u8>,
    ) -> Reply {
        let outcome = self.relay.handle(&envelope, &message).await;
        self.reply_of(&outcome)
    }

    /// Reply sent to the client once the message has been handled.
    pub(super) fn reply_of(&self, outcome: &RelayOutcome) -> Reply {
        match outcome {
            RelayOutcome::Sent { .. } => reply("250 Ok\r\n"),
            RelayOutcome::Rejected(Rejection::InvalidFromHeader { .. }) => {
                reply("550 5.6.0 Invalid From header\r\n")
            }
            RelayOutcome::Rejected(Rejection::SenderNotAllowed { .. }) => {
                reply("550 5.7.1 Sender address not allowed\r\n")
            }
            RelayOutcome::RemoteError(_) => match self.config.relay.on_remote_error {
                RemoteErrorPolicy::Drop => reply("250 Ok\r\n"),
                RemoteErrorPolicy::Defer => reply("451 4.3.0 Temporary delivery failure\r\n"),
            },
            _ => reply("451 4.3.0 Temporary delivery failure\r\n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::Handler;
    use pretty_assertions::assert_eq;
    use vrelay_common::{ContextFinished, MessageHandler, RelayOutcome, Rejection};
    use vrelay_config::{
        field::{FieldRelay, FieldRelayApi, RemoteErrorPolicy},
        Config,
    };
    use vrelay_protocol::AcceptArgs;

    struct Unused;

    #[async_trait::async_trait]
    impl MessageHandler for Unused {
        async fn handle(&self, _: &ContextFinished, _: &[u8]) -> RelayOutcome {
            unreachable!()
        }
    }

    fn handler(on_remote_error: RemoteErrorPolicy) -> Handler {
        let config = Config::new(FieldRelay {
            service_account_file: "service_account.json".into(),
            subject: "relay@example.com".to_owned(),
            sender_emails: vec!["no-reply@example.com".to_owned()],
            on_remote_error,
            api: FieldRelayApi::default(),
        })
        .unwrap();

        Handler::new(
            std::sync::Arc::new(config),
            std::sync::Arc::new(Unused),
            &AcceptArgs::new(
                "127.0.0.1:49152".parse().unwrap(),
                "127.0.0.1:2525".parse().unwrap(),
                time::OffsetDateTime::now_utc(),
                uuid::Uuid::new_v4(),
            ),
        )
    }

    #[rstest::rstest]
    #[case(RelayOutcome::Sent { id: "18c1f".to_owned() }, "250 Ok\r\n")]
    #[case(
        RelayOutcome::Rejected(Rejection::InvalidFromHeader { header: None }),
        "550 5.6.0 Invalid From header\r\n"
    )]
    #[case(
        RelayOutcome::Rejected(Rejection::SenderNotAllowed {
            sender: "eve@example.com".to_owned(),
            allowed: vec!["no-reply@example.com".to_owned()],
        }),
        "550 5.7.1 Sender address not allowed\r\n"
    )]
    #[case(RelayOutcome::RemoteError("gmail api unreachable".to_owned()), "250 Ok\r\n")]
    fn reply_when_dropping(#[case] outcome: RelayOutcome, #[case] expected: &str) {
        assert_eq!(
            handler(RemoteErrorPolicy::Drop).reply_of(&outcome).as_ref(),
            expected
        );
    }

    #[test]
    fn reply_when_deferring() {
        let handler = handler(RemoteErrorPolicy::Defer);
        assert_eq!(
            handler
                .reply_of(&RelayOutcome::RemoteError("gmail api unreachable".to_owned()))
                .as_ref(),
            "451 4.3.0 Temporary delivery failure\r\n"
        );
        assert_eq!(
            handler
                .reply_of(&RelayOutcome::Sent {
                    id: "18c1f".to_owned()
                })
                .as_ref(),
            "250 Ok\r\n"
        );
    }
}

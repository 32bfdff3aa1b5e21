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
use vrelay_common::{Context, ContextFinished, MessageHandler, Reply, Stage};
use vrelay_config::Config;
use vrelay_protocol::{
    EhloArgs, Error, HeloArgs, MailFromArgs, ParseArgsError, RcptToArgs, ReceiverContext,
    UnparsedArgs, Verb,
};

/// Replies of one SMTP session, the envelope being built in a [`Context`].
pub struct Handler {
    pub(super) context: Context,
    pub(super) config: std::sync::Arc<Config>,
    pub(super) relay: std::sync::Arc<dyn MessageHandler>,
}

#[allow(clippy::expect_used)]
pub(super) fn reply(text: &str) -> Reply {
    text.parse().expect("valid syntax")
}

#[async_trait::async_trait]
impl vrelay_protocol::ReceiverHandler for Handler {
    async fn on_helo(&mut self, _: &mut ReceiverContext, args: HeloArgs) -> Reply {
        self.on_helo_inner(args)
    }

    async fn on_ehlo(&mut self, _: &mut ReceiverContext, args: EhloArgs) -> Reply {
        self.on_ehlo_inner(args)
    }

    async fn on_mail_from(&mut self, _: &mut ReceiverContext, args: MailFromArgs) -> Reply {
        self.on_mail_from_inner(args)
    }

    async fn on_rcpt_to(&mut self, _: &mut ReceiverContext, args: RcptToArgs) -> Reply {
        self.on_rcpt_to_inner(args)
    }

    async fn on_data(&mut self) -> Reply {
        match self.context.to_finished() {
            Ok(()) => reply("354 Start mail input; end with <CRLF>.<CRLF>\r\n"),
            Err(error) => {
                tracing::warn!(%error, "DATA out of sequence.");
                reply("503 Bad sequence of commands\r\n")
            }
        }
    }

    async fn on_message<S>(
        &mut self,
        ctx: &mut ReceiverContext,
        stream: S,
    ) -> Result<(ContextFinished, Vec<u8>), Reply>
    where
        S: tokio_stream::Stream<Item = Result<Vec<u8>, Error>> + Send + Unpin,
    {
        self.on_message_inner(ctx, stream).await
    }

    async fn on_message_completed(
        &mut self,
        _: &mut ReceiverContext,
        envelope: ContextFinished,
        message: Vec<u8>,
    ) -> Reply {
        self.on_message_completed_inner(envelope, message).await
    }

    async fn on_rset(&mut self) -> Reply {
        self.context.reset();
        reply("250 Ok\r\n")
    }

    async fn on_noop(&mut self) -> Reply {
        reply("250 Ok\r\n")
    }

    async fn on_quit(&mut self) -> Reply {
        reply("221 Service closing transmission channel\r\n")
    }

    async fn on_help(&mut self, _: UnparsedArgs) -> Reply {
        reply("214 Commands: HELO EHLO MAIL RCPT DATA RSET NOOP QUIT HELP\r\n")
    }

    async fn on_unknown(&mut self, buffer: Vec<u8>) -> Reply {
        tracing::debug!(command = ?String::from_utf8_lossy(&buffer), "Unknown command.");
        reply("500 Syntax error command unrecognized\r\n")
    }

    async fn on_bad_sequence(&mut self, (verb, stage): (Verb, Stage)) -> Reply {
        tracing::debug!(?verb, %stage, "Bad sequence of commands.");
        reply("503 Bad sequence of commands\r\n")
    }

    async fn on_args_error(&mut self, error: &ParseArgsError) -> Reply {
        tracing::debug!(%error, "Invalid arguments.");
        match error {
            ParseArgsError::EmailUnavailable => reply("553 mailbox name not allowed\r\n"),
            ParseArgsError::BufferTooLong { .. } => reply("500 Syntax error line too long\r\n"),
            _ => reply("501 Syntax error in parameters or arguments\r\n"),
        }
    }

    async fn on_soft_error(&mut self, _: &mut ReceiverContext, reply: Reply) -> Reply {
        tokio::time::sleep(self.config.server.smtp.error.delay).await;
        reply
    }

    async fn on_hard_error(&mut self, ctx: &mut ReceiverContext, reply: Reply) -> Reply {
        ctx.deny();
        reply.extended(&self::reply("451 Too many errors from the client\r\n"))
    }

    fn get_stage(&self) -> Stage {
        self.context.stage()
    }
}

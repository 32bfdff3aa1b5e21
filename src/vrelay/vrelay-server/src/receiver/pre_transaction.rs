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
use vrelay_common::{ClientName, Context, MessageHandler, Reply};
use vrelay_config::Config;
use vrelay_protocol::{AcceptArgs, EhloArgs, HeloArgs, MailFromArgs, RcptToArgs, ReceiverContext};

impl Handler {
    /// Create the handler of a new connection.
    #[inline]
    #[must_use]
    pub fn new(
        config: std::sync::Arc<Config>,
        relay: std::sync::Arc<dyn MessageHandler>,
        args: &AcceptArgs,
    ) -> Self {
        Self {
            context: Context::new(
                args.client_addr,
                args.server_addr,
                config.server.name.clone(),
                args.timestamp,
                args.uuid,
            ),
            config,
            relay,
        }
    }

    /// Create the handler and the greeting of a new connection.
    #[inline]
    #[must_use]
    pub fn on_accept(
        args: AcceptArgs,
        config: std::sync::Arc<Config>,
        relay: std::sync::Arc<dyn MessageHandler>,
    ) -> (Self, ReceiverContext, Option<Reply>) {
        let this = Self::new(config, relay, &args);
        let greeting = format!("220 {} Service ready\r\n", this.config.server.name)
            .parse::<Reply>()
            .unwrap_or_else(|_| reply("220 Service ready\r\n"));

        (this, ReceiverContext::default(), Some(greeting))
    }

    pub(super) fn on_helo_inner(&mut self, args: HeloArgs) -> Reply {
        self.context
            .to_helo(ClientName::Domain(args.client_name), true);
        reply("250 Ok\r\n")
    }

    pub(super) fn on_ehlo_inner(&mut self, args: EhloArgs) -> Reply {
        self.context.to_helo(args.client_name, false);

        let server = &self.config.server;
        [
            Some(format!("250-{}\r\n", server.name)),
            Some("250-8BITMIME\r\n".to_owned()),
            Some("250-SMTPUTF8\r\n".to_owned()),
            server
                .smtp
                .pipelining
                .then(|| "250-PIPELINING\r\n".to_owned()),
            Some(format!("250 SIZE {}\r\n", server.message_size_limit)),
        ]
        .into_iter()
        .flatten()
        .collect::<String>()
        .parse::<Reply>()
        .unwrap_or_else(|_| reply("250 Ok\r\n"))
    }

    pub(super) fn on_mail_from_inner(&mut self, args: MailFromArgs) -> Reply {
        if args
            .size
            .map_or(false, |size| size > self.config.server.message_size_limit)
        {
            return reply("552 4.3.1 Message size exceeds fixed maximum message size\r\n");
        }

        match self
            .context
            .to_mail_from(args.reverse_path, args.use_smtputf8)
        {
            Ok(()) => reply("250 Ok\r\n"),
            Err(error) => {
                tracing::warn!(%error, "MAIL FROM out of sequence.");
                reply("503 Bad sequence of commands\r\n")
            }
        }
    }

    pub(super) fn on_rcpt_to_inner(&mut self, args: RcptToArgs) -> Reply {
        if self.context.forward_paths().map_or(0, <[_]>::len)
            >= self.config.server.smtp.rcpt_count_max
        {
            return reply("452 Requested action not taken: too many recipients\r\n");
        }
        if !self.context.is_utf8_advertised() && !args.forward_path.full().is_ascii() {
            return reply("553 mailbox name not allowed\r\n");
        }

        match self.context.add_forward_path(args.forward_path) {
            Ok(()) => reply("250 Ok\r\n"),
            Err(error) => {
                tracing::warn!(%error, "RCPT TO out of sequence.");
                reply("503 Bad sequence of commands\r\n")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vrelay_common::{ContextFinished, RelayOutcome, Stage};
    use vrelay_config::field::{FieldRelay, FieldRelayApi, RemoteErrorPolicy};
    use vrelay_protocol::UnparsedArgs;

    fn args<T: TryFrom<UnparsedArgs>>(line: &str) -> T
    where
        T::Error: std::fmt::Debug,
    {
        T::try_from(UnparsedArgs(line.as_bytes().to_vec())).unwrap()
    }

    struct Unused;

    #[async_trait::async_trait]
    impl MessageHandler for Unused {
        async fn handle(&self, _: &ContextFinished, _: &[u8]) -> RelayOutcome {
            unreachable!()
        }
    }

    fn handler() -> (Handler, Option<Reply>) {
        let mut config = Config::new(FieldRelay {
            service_account_file: "service_account.json".into(),
            subject: "relay@example.com".to_owned(),
            sender_emails: vec!["no-reply@example.com".to_owned()],
            on_remote_error: RemoteErrorPolicy::Drop,
            api: FieldRelayApi::default(),
        })
        .unwrap();
        config.server.name = "relay.example.com".to_owned();
        config.server.smtp.rcpt_count_max = 2;

        let (handler, _, greeting) = Handler::on_accept(
            AcceptArgs::new(
                "127.0.0.1:49152".parse().unwrap(),
                "127.0.0.1:2525".parse().unwrap(),
                time::OffsetDateTime::now_utc(),
                uuid::Uuid::new_v4(),
            ),
            std::sync::Arc::new(config),
            std::sync::Arc::new(Unused),
        );
        (handler, greeting)
    }

    #[test]
    fn greeting() {
        let (handler, greeting) = handler();
        assert_eq!(
            greeting.unwrap().as_ref(),
            "220 relay.example.com Service ready\r\n"
        );
        assert_eq!(handler.context.stage(), Stage::Connect);
    }

    #[test]
    fn ehlo() {
        let (mut handler, _) = handler();
        let reply = handler.on_ehlo_inner(args::<EhloArgs>("client.example.com\r\n"));

        assert_eq!(
            reply.as_ref(),
            [
                "250-relay.example.com\r\n",
                "250-8BITMIME\r\n",
                "250-SMTPUTF8\r\n",
                "250-PIPELINING\r\n",
                "250 SIZE 10000000\r\n",
            ]
            .concat()
        );
        assert_eq!(handler.context.stage(), Stage::Helo);
    }

    #[test]
    fn too_many_recipients() {
        let (mut handler, _) = handler();
        handler.on_helo_inner(args::<HeloArgs>("client.example.com\r\n"));
        let reply = handler.on_mail_from_inner(args::<MailFromArgs>("<>\r\n"));
        assert_eq!(reply.as_ref(), "250 Ok\r\n");

        for rcpt in ["<a@example.org>\r\n", "<b@example.org>\r\n"] {
            let reply = handler.on_rcpt_to_inner(args::<RcptToArgs>(rcpt));
            assert_eq!(reply.as_ref(), "250 Ok\r\n");
        }
        let reply = handler.on_rcpt_to_inner(args::<RcptToArgs>("<c@example.org>\r\n"));
        assert_eq!(reply.code().value(), 452);
        assert_eq!(handler.context.forward_paths().unwrap().len(), 2);
    }

    #[test]
    fn declared_size_too_big() {
        let (mut handler, _) = handler();
        handler.on_helo_inner(args::<HeloArgs>("client.example.com\r\n"));

        let reply =
            handler.on_mail_from_inner(args::<MailFromArgs>("<a@example.com> SIZE=10000001\r\n"));
        assert_eq!(reply.code().value(), 552);
        assert_eq!(handler.context.stage(), Stage::Helo);

        let reply =
            handler.on_mail_from_inner(args::<MailFromArgs>("<a@example.com> SIZE=10000000\r\n"));
        assert_eq!(reply.code().value(), 250);
        assert_eq!(handler.context.stage(), Stage::MailFrom);
    }
}

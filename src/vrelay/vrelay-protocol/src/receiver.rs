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
use crate::{
    reader::Reader, writer::WindowWriter, AcceptArgs, EhloArgs, Error, HeloArgs, MailFromArgs,
    RcptToArgs, ReceiverHandler, Verb,
};
use tokio_stream::StreamExt;
use vrelay_common::{Reply, Stage};

/// Delay without any command before the connection is closed.
const COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

enum HandshakeOutcome {
    Message,
    Quit,
}

pub struct ErrorCounter {
    pub error_count: i64,
    pub threshold_soft_error: i64,
    pub threshold_hard_error: i64,
}

/// An handle to send event from the [`ReceiverHandler`] to the [`Receiver`].
#[allow(clippy::module_name_repetitions)]
#[derive(Default)]
pub struct ReceiverContext {
    outcome: Option<HandshakeOutcome>,
}

impl ReceiverContext {
    /// Make the [`Receiver`] quit the connection early, and close cleanly.
    #[inline]
    pub fn deny(&mut self) {
        self.outcome = Some(HandshakeOutcome::Quit);
    }

    /// Has the connection been denied?
    #[inline]
    #[must_use]
    pub const fn is_denied(&self) -> bool {
        matches!(self.outcome, Some(HandshakeOutcome::Quit))
    }
}

/// A SMTP receiver.
pub struct Receiver<
    H: ReceiverHandler + Send,
    W: tokio::io::AsyncWrite + Unpin + Send,
    R: tokio::io::AsyncRead + Unpin + Send,
> {
    pub(crate) sink: WindowWriter<W>,
    pub(crate) stream: Reader<R>,
    error_counter: ErrorCounter,
    context: ReceiverContext,
    message_size_max: usize,
    h: std::marker::PhantomData<H>,
}

impl<H: ReceiverHandler + Send>
    Receiver<H, tokio::net::tcp::OwnedWriteHalf, tokio::net::tcp::OwnedReadHalf>
{
    /// Create a new [`Receiver`] from a TCP/IP stream.
    #[inline]
    pub fn new(
        tcp_stream: tokio::net::TcpStream,
        threshold_soft_error: i64,
        threshold_hard_error: i64,
        message_size_max: usize,
        support_pipelining: bool,
    ) -> Self {
        let (read, write) = tcp_stream.into_split();
        Self::from_parts(
            read,
            write,
            threshold_soft_error,
            threshold_hard_error,
            message_size_max,
            support_pipelining,
        )
    }
}

impl<
        H: ReceiverHandler + Send,
        W: tokio::io::AsyncWrite + Unpin + Send,
        R: tokio::io::AsyncRead + Unpin + Send,
    > Receiver<H, W, R>
{
    /// Create a new [`Receiver`] from both halves of a stream.
    #[inline]
    pub fn from_parts(
        read: R,
        write: W,
        threshold_soft_error: i64,
        threshold_hard_error: i64,
        message_size_max: usize,
        support_pipelining: bool,
    ) -> Self {
        Self {
            sink: WindowWriter::new(write),
            stream: Reader::new(read, support_pipelining),
            error_counter: ErrorCounter {
                error_count: 0,
                threshold_soft_error,
                threshold_hard_error,
            },
            context: ReceiverContext { outcome: None },
            message_size_max,
            h: std::marker::PhantomData,
        }
    }

    /// Handle the inner stream to produce a [`tokio_stream::Stream`], each item
    /// being a completed SMTP transaction.
    #[inline]
    pub fn into_stream<Fun, Future>(
        self,
        on_accept: Fun,
        args: AcceptArgs,
    ) -> impl tokio_stream::Stream<Item = Result<(), ()>>
    where
        Fun: FnOnce(AcceptArgs) -> Future,
        Future: std::future::Future<Output = (H, ReceiverContext, Option<Reply>)>,
    {
        self.into_stream_with_error(on_accept, args)
            .map(|e| match e {
                Ok(()) => Ok(()),
                Err(e) => {
                    tracing::error!(%e, "Session ended with an error.");
                    Err(())
                }
            })
    }

    fn into_stream_with_error<Fun, Future>(
        mut self,
        on_accept: Fun,
        args: AcceptArgs,
    ) -> impl tokio_stream::Stream<Item = Result<(), Error>>
    where
        Fun: FnOnce(AcceptArgs) -> Future,
        Future: std::future::Future<Output = (H, ReceiverContext, Option<Reply>)>,
    {
        async_stream::try_stream! {
            let (mut handler, mut context, reply_accept) = on_accept(args).await;
            if let Some(reply_accept) = reply_accept {
                self.sink
                    .direct_send_reply(&mut context, &mut self.error_counter, &mut handler, reply_accept)
                    .await?;
            }
            if context.is_denied() {
                return;
            }

            loop {
                match self.smtp_handshake(&mut handler).await? {
                    HandshakeOutcome::Message => {
                        let message_stream = self.stream.as_message_stream(self.message_size_max).fuse();
                        tokio::pin!(message_stream);

                        let reply = match handler.on_message(&mut self.context, message_stream).await {
                            Ok((envelope, message)) => {
                                handler.on_message_completed(&mut self.context, envelope, message).await
                            }
                            Err(reply) => reply,
                        };
                        self.sink
                            .direct_send_reply(&mut self.context, &mut self.error_counter, &mut handler, reply)
                            .await?;

                        if matches!(std::mem::take(&mut self.context).outcome, Some(HandshakeOutcome::Quit)) {
                            return;
                        }
                        yield ();
                    },
                    HandshakeOutcome::Quit => break,
                }
            }
        }
    }

    /// SMTP handshake (generate the envelope and metadata).
    async fn smtp_handshake(&mut self, handler: &mut H) -> Result<HandshakeOutcome, Error> {
        macro_rules! handle_args {
            ($args_output:ty, $args:expr, $on_event:tt) => {
                match <$args_output>::try_from($args) {
                    Ok(args) => handler.$on_event(&mut self.context, args).await,
                    Err(e) => handler.on_args_error(&e).await,
                }
            };
        }

        let command_stream = self.stream.as_window_stream().timeout(COMMAND_TIMEOUT);
        tokio::pin!(command_stream);

        loop {
            let commands_batch = match command_stream.next().await {
                Some(Ok(Ok(commands_batch))) if !commands_batch.is_empty() => commands_batch,
                Some(Ok(Err(e))) => return Err(e.into()),
                Some(Err(e)) => {
                    tracing::warn!("Closing after {} without receiving a command", e);
                    self.sink
                        .direct_send_reply(
                            &mut self.context,
                            &mut self.error_counter,
                            handler,
                            timeout_reply(),
                        )
                        .await?;

                    return Ok(HandshakeOutcome::Quit);
                }
                _ => return Ok(HandshakeOutcome::Quit),
            };
            for command in commands_batch {
                let (verb, args) = match command {
                    Ok(command) => command,
                    Err(Error::ParseArgs(e)) => {
                        let reply = handler.on_args_error(&e).await;
                        self.sink
                            .direct_send_reply(
                                &mut self.context,
                                &mut self.error_counter,
                                handler,
                                reply,
                            )
                            .await?;
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                tracing::trace!("<< {:?} ; {:?}", verb, std::str::from_utf8(&args.0));

                let stage = handler.get_stage();
                let reply = match (verb, stage) {
                    (Verb::Helo, _) => handle_args!(HeloArgs, args, on_helo),
                    (Verb::Ehlo, _) => handle_args!(EhloArgs, args, on_ehlo),
                    (Verb::Noop, _) => handler.on_noop().await,
                    (Verb::Rset, _) => handler.on_rset().await,
                    (Verb::MailFrom, Stage::Helo) => {
                        handle_args!(MailFromArgs, args, on_mail_from)
                    }
                    (Verb::RcptTo, Stage::MailFrom | Stage::RcptTo) => {
                        handle_args!(RcptToArgs, args, on_rcpt_to)
                    }
                    (Verb::Data, Stage::RcptTo) => {
                        self.context.outcome = Some(HandshakeOutcome::Message);
                        handler.on_data().await
                    }
                    (Verb::Quit, _) => {
                        self.context.outcome = Some(HandshakeOutcome::Quit);
                        handler.on_quit().await
                    }
                    (Verb::Help, _) => handler.on_help(args).await,
                    (Verb::Unknown, _) => handler.on_unknown(args.0).await,
                    otherwise => handler.on_bad_sequence(otherwise).await,
                };
                self.sink
                    .send_reply(
                        &mut self.context,
                        &mut self.error_counter,
                        handler,
                        reply,
                        verb,
                    )
                    .await?;

                // DATA and QUIT end a pipelined group
                if self.context.outcome.is_some() {
                    break;
                }
            }

            if !self.sink.is_empty() {
                self.sink.flush().await?;
            }
            if let Some(done) = std::mem::take(&mut self.context).outcome {
                return Ok(done);
            }
        }
    }
}

#[allow(clippy::expect_used)]
fn timeout_reply() -> Reply {
    "451 Timeout - closing connection\r\n"
        .parse()
        .expect("valid syntax")
}

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

//! SMTP receiver of the relay: reads and parses the commands of a client,
//! asks a [`ReceiverHandler`] for the replies and streams the DATA payload.

#![doc(html_no_source)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]
//
#![warn(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::cargo)]
//
#![allow(clippy::multiple_crate_versions)]

mod command;
mod error;
mod reader;
mod receiver;
mod writer;

pub use command::{
    AcceptArgs, EhloArgs, HeloArgs, MailFromArgs, MimeBodyType, RcptToArgs, UnparsedArgs, Verb,
};
pub use error::{Error, ParseArgsError};
pub use receiver::{Receiver, ReceiverContext};

use vrelay_common::{ContextFinished, Reply, Stage};

/// Produce the replies of the SMTP session, one callback per command.
#[async_trait::async_trait]
pub trait ReceiverHandler {
    /// Called after receiving a [`Verb::Helo`] command.
    async fn on_helo(&mut self, ctx: &mut ReceiverContext, args: HeloArgs) -> Reply;

    /// Called after receiving a [`Verb::Ehlo`] command.
    async fn on_ehlo(&mut self, ctx: &mut ReceiverContext, args: EhloArgs) -> Reply;

    /// Called after receiving a [`Verb::MailFrom`] command.
    async fn on_mail_from(&mut self, ctx: &mut ReceiverContext, args: MailFromArgs) -> Reply;

    /// Called after receiving a [`Verb::RcptTo`] command.
    async fn on_rcpt_to(&mut self, ctx: &mut ReceiverContext, args: RcptToArgs) -> Reply;

    /// Called after receiving a [`Verb::Data`] command, before the payload.
    async fn on_data(&mut self) -> Reply;

    /// Consume the DATA payload, one dot-unstuffed line per item.
    ///
    /// Return the envelope and the message, or the reply refusing it.
    async fn on_message<S>(
        &mut self,
        ctx: &mut ReceiverContext,
        stream: S,
    ) -> Result<(ContextFinished, Vec<u8>), Reply>
    where
        S: tokio_stream::Stream<Item = Result<Vec<u8>, Error>> + Send + Unpin;

    /// Process a message fully received, and produce the final reply of the transaction.
    async fn on_message_completed(
        &mut self,
        ctx: &mut ReceiverContext,
        envelope: ContextFinished,
        message: Vec<u8>,
    ) -> Reply;

    /// Called after receiving a [`Verb::Rset`] command.
    async fn on_rset(&mut self) -> Reply;

    /// Called after receiving a [`Verb::Noop`] command.
    async fn on_noop(&mut self) -> Reply;

    /// Called after receiving a [`Verb::Quit`] command.
    async fn on_quit(&mut self) -> Reply;

    /// Called after receiving a [`Verb::Help`] command.
    async fn on_help(&mut self, args: UnparsedArgs) -> Reply;

    /// Called after receiving a line which is not a known command.
    async fn on_unknown(&mut self, buffer: Vec<u8>) -> Reply;

    /// Called when a command is received at the wrong stage of the transaction.
    async fn on_bad_sequence(&mut self, sequence: (Verb, Stage)) -> Reply;

    /// Called when the arguments of a command cannot be parsed.
    async fn on_args_error(&mut self, error: &ParseArgsError) -> Reply;

    /// Called when the error count reaches the soft threshold.
    async fn on_soft_error(&mut self, ctx: &mut ReceiverContext, reply: Reply) -> Reply;

    /// Called when the error count reaches the hard threshold.
    async fn on_hard_error(&mut self, ctx: &mut ReceiverContext, reply: Reply) -> Reply;

    /// Stage of the transaction, used to validate the sequence of commands.
    fn get_stage(&self) -> Stage;
}

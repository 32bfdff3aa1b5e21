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
use crate::{receiver::ErrorCounter, ReceiverContext, ReceiverHandler, Verb};
use tokio::io::AsyncWriteExt;
use vrelay_common::Reply;

/// writer used for pipelining
/// it keep a buffer of answers
#[allow(clippy::module_name_repetitions)]
pub struct WindowWriter<W: tokio::io::AsyncWrite + Unpin + Send> {
    inner: W,
    buffer: Vec<Reply>,
}

impl<W: tokio::io::AsyncWrite + Unpin + Send> WindowWriter<W> {
    /// Create a new `WindowWriter`.
    #[inline]
    #[must_use]
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            buffer: Vec::<Reply>::new(),
        }
    }

    /// check if the internal writer is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Send the buffer to the client.
    ///
    /// # Errors
    ///
    /// * [`std::io::Error`] produced by the underlying writer
    #[inline]
    pub async fn write_all(&mut self, buffer: &str) -> std::io::Result<()> {
        tracing::trace!(">> {:?}", buffer);
        self.inner.write_all(buffer.as_bytes()).await?;
        self.inner.flush().await
    }

    /// update error counters and return appropriate message based on these counters.
    async fn handle_error<T: ReceiverHandler + Send>(
        ctx: &mut ReceiverContext,
        error_counter: &mut ErrorCounter,
        handler: &mut T,
        reply: Reply,
    ) -> Reply {
        if !reply.code().is_error() {
            return reply;
        }
        error_counter.error_count += 1;

        let hard_error = error_counter.threshold_hard_error;
        let soft_error = error_counter.threshold_soft_error;

        if hard_error != -1 && error_counter.error_count >= hard_error {
            return handler.on_hard_error(ctx, reply).await;
        }
        if soft_error != -1 && error_counter.error_count >= soft_error {
            return handler.on_soft_error(ctx, reply).await;
        }
        reply
    }

    /// Send a reply right away, without buffering.
    ///
    /// # Errors
    ///
    /// * [`std::io::Error`] produced by the underlying writer
    #[inline]
    pub async fn direct_send_reply<T: ReceiverHandler + Send>(
        &mut self,
        ctx: &mut ReceiverContext,
        error_counter: &mut ErrorCounter,
        handler: &mut T,
        reply: Reply,
    ) -> std::io::Result<()> {
        let final_reply = Self::handle_error(ctx, error_counter, handler, reply).await;
        self.write_all(final_reply.as_ref()).await
    }

    /// Buffer the reply if the verb allows it, otherwise send the pending replies
    /// followed by this one.
    ///
    /// # Errors
    ///
    /// * [`std::io::Error`] produced by the underlying writer
    #[inline]
    pub async fn send_reply<T: ReceiverHandler + Send>(
        &mut self,
        ctx: &mut ReceiverContext,
        error_counter: &mut ErrorCounter,
        handler: &mut T,
        reply: Reply,
        verb: Verb,
    ) -> std::io::Result<()> {
        let final_reply = Self::handle_error(ctx, error_counter, handler, reply).await;
        self.buffer.push(final_reply);
        if verb.is_bufferable() {
            return Ok(());
        }
        self.flush().await
    }

    /// send all buffered response in one go.
    ///
    /// # Errors
    ///
    /// * [`std::io::Error`] produced by the underlying writer
    #[inline]
    pub async fn flush(&mut self) -> std::io::Result<()> {
        let full_response = self
            .buffer
            .drain(..)
            .map(|r| r.to_string())
            .collect::<String>();
        self.write_all(&full_response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_and_flush() {
        let mut writer = WindowWriter::new(Vec::<u8>::new());
        assert!(writer.is_empty());

        writer.buffer.push("250 Ok\r\n".parse().unwrap());
        writer.buffer.push("250 Ok\r\n".parse().unwrap());
        assert!(!writer.is_empty());

        writer.flush().await.unwrap();
        assert!(writer.is_empty());
        writer.write_all("354 Start mail input\r\n").await.unwrap();

        pretty_assertions::assert_eq!(
            String::from_utf8(writer.inner).unwrap(),
            "250 Ok\r\n250 Ok\r\n354 Start mail input\r\n"
        );
    }
}

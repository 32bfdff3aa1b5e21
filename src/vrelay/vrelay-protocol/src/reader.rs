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

use crate::{command::Batch, command::Command, Error, ParseArgsError, UnparsedArgs, Verb};
use tokio::io::AsyncReadExt;
use tokio_stream::StreamExt;

/// max size of a received command, including the SMTPUTF8 extension.
const MAX_LINE_SIZE: usize = 1024;

fn find(bytes: &[u8], search: &[u8]) -> Option<usize> {
    bytes
        .windows(search.len())
        .position(|window| window == search)
}

fn parse_command_line(line: &[u8]) -> Result<Command<Verb, UnparsedArgs>, Error> {
    if line.len() >= MAX_LINE_SIZE {
        return Err(Error::buffer_too_long(MAX_LINE_SIZE, line.len()));
    }
    if find(line, b"\r\n").is_none() {
        return Err(Error::no_crlf());
    }
    Ok(<Verb as strum::VariantNames>::VARIANTS
        .iter()
        .find(|i| line.len() >= i.len() && line[..i.len()].eq_ignore_ascii_case(i.as_bytes()))
        .and_then(|verb| Some((verb.parse::<Verb>().ok()?, verb.len())))
        .map_or_else(
            || (Verb::Unknown, UnparsedArgs(line.to_vec())),
            |(verb, len)| (verb, UnparsedArgs(line[len..].to_vec())),
        ))
}

/// Reader for TCP window
/// it is used only for the internal reader logic and is not exposed to external.
struct ReaderWindow<'win, R: tokio::io::AsyncRead + Unpin + Send> {
    inner: &'win mut R,
    buffer: &'win mut bytes::BytesMut,
    additional_reserve: usize,
}

impl<'win, R> ReaderWindow<'win, R>
where
    R: tokio::io::AsyncRead + Unpin + Send,
{
    /// return the full read tcp window (~= buffer)
    fn flush_window(
        &'win mut self,
    ) -> impl tokio_stream::Stream<Item = std::io::Result<Vec<u8>>> + 'win {
        async_stream::try_stream! {
            loop {
                if let Some(pos) = find(&self.buffer[..], b"\r\n") {
                    let out = self.buffer.split_to(pos + 2);
                    yield Vec::<u8>::from(out);
                    if self.buffer.is_empty() {
                        return;
                    }
                } else {
                    if self.buffer.len() > MAX_LINE_SIZE {
                        Err(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("no CRLF in the first {MAX_LINE_SIZE} bytes of the command"),
                        ))?;
                    }
                    self.buffer.reserve(self.additional_reserve);
                    let read_size = self.inner.read_buf(self.buffer).await?;
                    if read_size == 0 {
                        return;
                    }
                }
            }
        }
    }
}

/// Stream for reading commands from the client.
pub struct Reader<R: tokio::io::AsyncRead + Unpin + Send> {
    inner: R,
    additional_reserve: usize,
    buffer: bytes::BytesMut,
    pipelining_enabled: bool,
}

impl<R: tokio::io::AsyncRead + Unpin + Send> Reader<R> {
    /// Create a new stream.
    #[must_use]
    #[inline]
    pub fn new(tcp_stream: R, enable_pipelining: bool) -> Self {
        Self {
            inner: tcp_stream,
            additional_reserve: 100,
            buffer: bytes::BytesMut::with_capacity(80),
            pipelining_enabled: enable_pipelining,
        }
    }

    // instantiate a new ReaderWindow object from an existing reader
    #[allow(clippy::wrong_self_convention)]
    fn to_window_reader(&mut self) -> ReaderWindow<'_, R> {
        ReaderWindow {
            inner: &mut self.inner,
            buffer: &mut self.buffer,
            additional_reserve: self.additional_reserve,
        }
    }

    /// convert a stream to read tcp window.
    /// It returns a batch of command, which is a simple vector of commands.
    /// An empty batch means the client closed the connection.
    #[inline]
    pub fn as_window_stream(
        &mut self,
    ) -> impl tokio_stream::Stream<Item = std::io::Result<Batch>> + '_ {
        let pipelined = self.pipelining_enabled;
        async_stream::stream! {
            loop {
                let mut batch: Batch = vec![];
                let mut window_reader = self.to_window_reader();

                let window_content = window_reader.flush_window();
                tokio::pin!(window_content);
                while let Some(cmd) = window_content.next().await {
                    match cmd {
                        Ok(cmd) => batch.push(parse_command_line(&cmd)),
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                    if !pipelined {
                        break;
                    }
                }
                yield Ok(batch);
            }
        }
    }

    /// Produce a stream of "\r\n" terminated lines.
    ///
    /// A line growing past `max_line` bytes without a CRLF produces a single
    /// [`Error::ParseArgs`] `BufferTooLong`, its bytes are then discarded up to the
    /// next CRLF and the stream resumes with the following line.
    #[inline]
    pub fn as_line_stream(
        &mut self,
        max_line: usize,
    ) -> impl tokio_stream::Stream<Item = Result<Vec<u8>, Error>> + '_ {
        async_stream::stream! {
            let mut discarding = false;
            loop {
                if let Some(pos) = find(&self.buffer[..], b"\r\n") {
                    let out = self.buffer.split_to(pos + 2);
                    if discarding {
                        discarding = false;
                        continue;
                    }
                    yield Ok(Vec::<u8>::from(out));
                    continue;
                }

                if !discarding && self.buffer.len() > max_line {
                    discarding = true;
                    yield Err(Error::buffer_too_long(max_line, self.buffer.len()));
                }
                if discarding {
                    // a trailing '\r' can be the first half of the CRLF
                    let keep = usize::from(self.buffer.last() == Some(&b'\r'));
                    drop(self.buffer.split_to(self.buffer.len() - keep));
                }

                self.buffer.reserve(self.additional_reserve);
                match self.inner.read_buf(&mut self.buffer).await {
                    Ok(0) => {
                        if discarding || !self.buffer.is_empty() {
                            yield Err(Error::unexpected_eof("connection closed in the middle of a line"));
                        }
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(e.into());
                        return;
                    }
                }
            }
        }
    }

    /// Produce a stream of lines to generate IMF compliant messages.
    ///
    /// Lines are dot-unstuffed, the stream ends at the `<CRLF>.<CRLF>` terminator.
    /// As soon as the message grows past `size_limit` a single error is produced,
    /// the remaining lines are then consumed and discarded up to the terminator.
    #[inline]
    pub fn as_message_stream(
        &mut self,
        size_limit: usize,
    ) -> impl tokio_stream::Stream<Item = Result<Vec<u8>, Error>> + '_ {
        async_stream::stream! {
            let mut size = 0_usize;
            let mut too_long = false;

            for await line in self.as_line_stream(size_limit) {
                let mut line = match line {
                    Ok(line) => line,
                    Err(Error::ParseArgs(ParseArgsError::BufferTooLong { got, .. })) => {
                        if !too_long {
                            too_long = true;
                            yield Err(Error::buffer_too_long(size_limit, size.saturating_add(got)));
                        }
                        continue;
                    }
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                tracing::trace!("<< {:?}", std::str::from_utf8(&line));

                if line == b".\r\n" {
                    return;
                }
                if too_long {
                    continue;
                }
                if line.first() == Some(&b'.') {
                    line = line[1..].to_vec();
                }

                size += line.len();
                if size > size_limit {
                    too_long = true;
                    yield Err(Error::buffer_too_long(size_limit, size));
                    continue;
                }

                yield Ok(line);
            }

            yield Err(Error::unexpected_eof("connection closed before the end of the message"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flush_window_several_lines() {
        let input = [
            "MAIL FROM:<mrose@dbc.mtview.ca.us>\r\n",
            "RCPT TO:<ned@innosoft.com>\r\n",
            "RCPT TO:<dan@innosoft.com>\r\n",
        ]
        .concat();

        let cursor = std::io::Cursor::new(input);
        let mut reader = Reader::new(cursor, true);
        let mut window = reader.to_window_reader();

        let output_stream = window.flush_window();
        tokio::pin!(output_stream);

        assert_eq!(
            output_stream.try_next().await.unwrap(),
            Some(b"MAIL FROM:<mrose@dbc.mtview.ca.us>\r\n".to_vec()),
        );
        assert_eq!(
            output_stream.try_next().await.unwrap(),
            Some(b"RCPT TO:<ned@innosoft.com>\r\n".to_vec()),
        );
        assert_eq!(
            output_stream.try_next().await.unwrap(),
            Some(b"RCPT TO:<dan@innosoft.com>\r\n".to_vec()),
        );
        assert_eq!(output_stream.try_next().await.unwrap(), None);
    }

    fn verbs(batch: &Batch) -> Vec<Verb> {
        batch
            .iter()
            .map(|cmd| cmd.as_ref().map(|(verb, _)| *verb).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn window_stream_pipelined() {
        let input = [
            "mail from:<mrose@dbc.mtview.ca.us>\r\n",
            "RCPT TO:<ned@innosoft.com>\r\n",
            "DATA\r\n",
        ]
        .concat();

        let mut reader = Reader::new(std::io::Cursor::new(input), true);
        let stream = reader.as_window_stream();
        tokio::pin!(stream);

        let batch = stream.try_next().await.unwrap().unwrap();
        pretty_assertions::assert_eq!(verbs(&batch), vec![Verb::MailFrom, Verb::RcptTo, Verb::Data]);
        assert_eq!(
            batch[0].as_ref().unwrap().1,
            UnparsedArgs(b"<mrose@dbc.mtview.ca.us>\r\n".to_vec())
        );

        assert!(stream.try_next().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn window_stream_not_pipelined() {
        let input = ["NOOP\r\n", "QUIT\r\n"].concat();

        let mut reader = Reader::new(std::io::Cursor::new(input), false);
        let stream = reader.as_window_stream();
        tokio::pin!(stream);

        assert_eq!(
            verbs(&stream.try_next().await.unwrap().unwrap()),
            vec![Verb::Noop]
        );
        assert_eq!(
            verbs(&stream.try_next().await.unwrap().unwrap()),
            vec![Verb::Quit]
        );
    }

    #[tokio::test]
    async fn window_stream_unknown_and_too_long() {
        // exactly the limit, CRLF included
        let input = format!("FOO bar\r\nHELO {}\r\n", "a".repeat(MAX_LINE_SIZE - 7));

        let mut reader = Reader::new(std::io::Cursor::new(input), true);
        let stream = reader.as_window_stream();
        tokio::pin!(stream);

        let batch = stream.try_next().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch[0].as_ref().unwrap(),
            &(Verb::Unknown, UnparsedArgs(b"FOO bar\r\n".to_vec()))
        );
        assert!(matches!(
            batch[1],
            Err(Error::ParseArgs(ParseArgsError::BufferTooLong { .. }))
        ));
    }

    #[tokio::test]
    async fn window_stream_no_lines() {
        let mut reader = Reader::new(std::io::Cursor::new(String::new()), true);
        let stream = reader.as_window_stream();
        tokio::pin!(stream);
        assert!(stream.try_next().await.unwrap().unwrap().is_empty());
    }

    async fn read_message(input: &str, size_limit: usize) -> Vec<Result<Vec<u8>, Error>> {
        let mut reader = Reader::new(std::io::Cursor::new(input.to_owned()), true);
        let stream = reader.as_message_stream(size_limit);
        tokio::pin!(stream);

        let mut out = vec![];
        while let Some(line) = stream.next().await {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn message_dot_unstuffing() {
        let lines = read_message("From: a <a@b.c>\r\n\r\n..hidden\r\n.\r\nQUIT\r\n", 1000).await;
        pretty_assertions::assert_eq!(
            lines.into_iter().map(Result::unwrap).collect::<Vec<_>>(),
            vec![
                b"From: a <a@b.c>\r\n".to_vec(),
                b"\r\n".to_vec(),
                b".hidden\r\n".to_vec(),
            ]
        );
    }

    #[tokio::test]
    async fn message_too_big() {
        let lines = read_message("0123456789\r\n0123456789\r\n.\r\n", 15).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_ok());
        assert!(matches!(
            lines[1],
            Err(Error::ParseArgs(ParseArgsError::BufferTooLong {
                expected: 15,
                got: 24
            }))
        ));
    }

    #[tokio::test]
    async fn message_eof_without_terminator() {
        let lines = read_message("Subject: cut\r\n", 1000).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1].as_ref().unwrap_err().io_kind(),
            Some(std::io::ErrorKind::UnexpectedEof)
        );
    }

    #[tokio::test]
    async fn data_line_without_crlf_is_bounded() {
        let mut reader = Reader::new(tokio::io::repeat(b'a'), true);
        {
            let stream = reader.as_message_stream(1024);
            tokio::pin!(stream);
            assert!(matches!(
                stream.next().await,
                Some(Err(Error::ParseArgs(ParseArgsError::BufferTooLong {
                    expected: 1024,
                    ..
                })))
            ));
        }
        assert!(reader.buffer.len() < 64 * 1024);
    }

    #[tokio::test]
    async fn line_stream_skips_the_overlong_line() {
        let input = format!("{}\r\nnext\r\n", "a".repeat(5000));
        let mut reader = Reader::new(std::io::Cursor::new(input), true);
        let stream = reader.as_line_stream(1024);
        tokio::pin!(stream);

        assert!(matches!(
            stream.next().await,
            Some(Err(Error::ParseArgs(ParseArgsError::BufferTooLong { .. })))
        ));
        assert_eq!(stream.next().await.unwrap().unwrap(), b"next\r\n".to_vec());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn message_with_overlong_line() {
        let input = format!("Subject: x\r\n\r\n{}\r\nend\r\n.\r\nQUIT\r\n", "X".repeat(3000));
        let mut reader = Reader::new(std::io::Cursor::new(input), true);
        {
            let stream = reader.as_message_stream(100);
            tokio::pin!(stream);

            assert_eq!(stream.next().await.unwrap().unwrap(), b"Subject: x\r\n".to_vec());
            assert_eq!(stream.next().await.unwrap().unwrap(), b"\r\n".to_vec());
            assert!(matches!(
                stream.next().await,
                Some(Err(Error::ParseArgs(ParseArgsError::BufferTooLong {
                    expected: 100,
                    ..
                })))
            ));
            assert!(stream.next().await.is_none());
        }

        let stream = reader.as_window_stream();
        tokio::pin!(stream);
        assert_eq!(
            verbs(&stream.try_next().await.unwrap().unwrap()),
            vec![Verb::Quit]
        );
    }

    #[tokio::test]
    async fn connection_closed_in_discarded_line() {
        let lines = read_message(&"X".repeat(3000), 100).await;
        assert_eq!(lines.len(), 2);
        assert!(lines[0].is_err());
        assert_eq!(
            lines[1].as_ref().unwrap_err().io_kind(),
            Some(std::io::ErrorKind::UnexpectedEof)
        );
    }
}

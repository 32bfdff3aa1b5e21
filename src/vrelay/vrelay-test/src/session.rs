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
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_stream::StreamExt;
use vrelay_common::MessageHandler;
use vrelay_config::Config;
use vrelay_protocol::{AcceptArgs, Receiver};
use vrelay_server::{socket_bind_anyhow, Handler, Server};

const REPLY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

async fn read_reply<R: tokio::io::AsyncRead + Unpin>(read: &mut R, len: usize) -> String {
    let mut buffer = vec![0; len];
    let mut filled = 0;
    while filled < len {
        match tokio::time::timeout(REPLY_TIMEOUT, read.read(&mut buffer[filled..])).await {
            Ok(Ok(0) | Err(_)) | Err(_) => break,
            Ok(Ok(n)) => filled += n,
        }
    }
    buffer.truncate(filled);
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Run a SMTP session with a client sending `input` one chunk at a time,
/// and waiting for the replies before the next one.
///
/// `expected[0]` is the greeting, `expected[i + 1]` the replies to `input[i]`,
/// empty if there is none: their length is the number of bytes read. The replies
/// actually received are returned, to be compared to `expected`.
pub async fn run_session(
    config: std::sync::Arc<Config>,
    relay: std::sync::Arc<dyn MessageHandler>,
    input: &[&str],
    expected: &[&str],
) -> Vec<String> {
    let (client, server) = tokio::io::duplex(64 * 1024);

    let session = tokio::spawn(async move {
        let (server_read, server_write) = tokio::io::split(server);
        let receiver = Receiver::<Handler, _, _>::from_parts(
            server_read,
            server_write,
            config.server.smtp.error.soft_count,
            config.server.smtp.error.hard_count,
            config.server.message_size_limit,
            config.server.smtp.pipelining,
        );
        let smtp_stream = receiver.into_stream(
            |args| async move { Handler::on_accept(args, config, relay) },
            AcceptArgs::new(
                "127.0.0.1:49152".parse().unwrap(),
                "127.0.0.1:2525".parse().unwrap(),
                time::OffsetDateTime::now_utc(),
                uuid::Uuid::new_v4(),
            ),
        );
        tokio::pin!(smtp_stream);

        while matches!(smtp_stream.next().await, Some(Ok(()))) {}
    });

    let (mut read, mut write) = tokio::io::split(client);
    let mut replies = Vec::with_capacity(input.len() + 1);

    for i in 0..=input.len() {
        if let Some(chunk) = i.checked_sub(1).and_then(|i| input.get(i)) {
            if let Err(e) = write.write_all(chunk.as_bytes()).await {
                tracing::warn!(%e, "Session closed by the server.");
                break;
            }
        }
        let len = expected.get(i).map_or(0, |expected| expected.len());
        replies.push(read_reply(&mut read, len).await);
    }

    write.shutdown().await.ok();
    if tokio::time::timeout(REPLY_TIMEOUT, session).await.is_err() {
        tracing::warn!("Session still running after the last reply.");
    }

    replies
}

/// Serve `relay` on an ephemeral port of the loopback.
///
/// # Errors
///
/// * failed to bind the socket
pub fn start_server(
    config: std::sync::Arc<Config>,
    relay: std::sync::Arc<dyn MessageHandler>,
) -> anyhow::Result<std::net::SocketAddr> {
    let listener = socket_bind_anyhow("127.0.0.1:0")?;
    let addr = listener.local_addr()?;

    tokio::spawn(Server::new(config, relay).listen(vec![listener]));

    Ok(addr)
}

/// A port of the loopback nothing listens on.
///
/// # Errors
///
/// * failed to bind the loopback
pub fn free_port() -> anyhow::Result<std::net::SocketAddr> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?)
}

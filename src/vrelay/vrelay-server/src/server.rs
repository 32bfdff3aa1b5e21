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
use crate::Handler;
use anyhow::Context;
use tokio_stream::StreamExt;
use vrelay_common::{MessageHandler, Reply};
use vrelay_config::Config;
use vrelay_protocol::{AcceptArgs, Receiver};

/// TCP/IP server
pub struct Server {
    conn_max_reach_reply: Reply,

    config: std::sync::Arc<Config>,
    relay: std::sync::Arc<dyn MessageHandler>,
}

/// Create a `TCPListener` ready to be listened to
///
/// # Errors
///
/// * failed to bind to the socket address
/// * failed to set the listener to non blocking
#[inline]
pub fn socket_bind_anyhow<A: std::net::ToSocketAddrs + std::fmt::Debug>(
    addr: A,
) -> anyhow::Result<std::net::TcpListener> {
    let socket = std::net::TcpListener::bind(&addr)
        .with_context(|| format!("Failed to bind socket on addr: '{addr:?}'"))?;

    socket
        .set_nonblocking(true)
        .with_context(|| format!("Failed to set non-blocking socket on addr: '{addr:?}'"))?;

    Ok(socket)
}

type ListenerStreamItem = std::io::Result<(tokio::net::TcpStream, std::net::SocketAddr)>;

fn listener_to_stream(
    listener: &tokio::net::TcpListener,
) -> impl tokio_stream::Stream<Item = ListenerStreamItem> + '_ {
    async_stream::stream! {
        loop {
            yield listener.accept().await;
        }
    }
}

impl Server {
    /// Create a server relaying the messages to `relay`.
    #[inline]
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(config: std::sync::Arc<Config>, relay: std::sync::Arc<dyn MessageHandler>) -> Self {
        Self {
            conn_max_reach_reply: "554 Cannot process connection, closing\r\n"
                .parse::<Reply>()
                .expect("valid syntax"),
            config,
            relay,
        }
    }

    #[tracing::instrument(name = "handle-client", skip_all, fields(client = %client_addr, server = %server_addr))]
    async fn handle_client(
        &self,
        client_counter: std::sync::Arc<std::sync::atomic::AtomicI64>,
        mut stream: tokio::net::TcpStream,
        client_addr: std::net::SocketAddr,
        server_addr: std::net::SocketAddr,
    ) {
        tracing::info!("Connection accepted.");

        if self.config.server.client_count_max != -1
            && client_counter.load(std::sync::atomic::Ordering::SeqCst)
                >= self.config.server.client_count_max
        {
            tracing::warn!(
                max = self.config.server.client_count_max,
                "Connection count max reached, rejecting connection.",
            );

            if let Err(error) = tokio::io::AsyncWriteExt::write_all(
                &mut stream,
                self.conn_max_reach_reply.as_ref().as_bytes(),
            )
            .await
            {
                tracing::error!(%error, "Code delivery failure.");
            }

            if let Err(error) = tokio::io::AsyncWriteExt::shutdown(&mut stream).await {
                tracing::error!(%error, "Closing connection failure.");
            }
            return;
        }

        client_counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let session = Self::serve(
            AcceptArgs::new(
                client_addr,
                stream.local_addr().unwrap_or(server_addr),
                time::OffsetDateTime::now_utc(),
                uuid::Uuid::new_v4(),
            ),
            stream,
            self.config.clone(),
            self.relay.clone(),
        );
        tokio::spawn(async move {
            let _err = session.await;

            client_counter.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        });
    }

    /// Main loop of the relay, accept the clients until a listener fails.
    ///
    /// # Errors
    ///
    /// * failed to convert sockets to `[tokio::net::TcpListener]`
    #[tracing::instrument(skip_all)]
    pub async fn listen(self, sockets: Vec<std::net::TcpListener>) -> anyhow::Result<()> {
        let client_counter = std::sync::Arc::new(std::sync::atomic::AtomicI64::new(0));

        let listeners = sockets
            .into_iter()
            .map(tokio::net::TcpListener::from_std)
            .collect::<std::io::Result<Vec<tokio::net::TcpListener>>>()?;

        let mut map = tokio_stream::StreamMap::new();
        for listener in &listeners {
            map.insert(
                listener.local_addr()?,
                Box::pin(listener_to_stream(listener)),
            );
        }

        tracing::info!(
            interfaces = ?map.keys().collect::<Vec<_>>(),
            "Listening for clients.",
        );

        while let Some((server_addr, client)) = map.next().await {
            let (stream, client_addr) = match client {
                Ok(client) => client,
                Err(error) => {
                    tracing::warn!(%error, %server_addr, "Failed to accept a client.");
                    continue;
                }
            };

            self.handle_client(client_counter.clone(), stream, client_addr, server_addr)
                .await;
        }
        Ok(())
    }

    /// Run the SMTP session of one client, until it quits or fails.
    ///
    /// # Errors
    ///
    /// * never, failures of the session are logged
    #[tracing::instrument(skip_all, err, fields(uuid = %args.uuid))]
    pub async fn serve(
        args: AcceptArgs,
        tcp_stream: tokio::net::TcpStream,
        config: std::sync::Arc<Config>,
        relay: std::sync::Arc<dyn MessageHandler>,
    ) -> anyhow::Result<()> {
        let smtp_receiver = Receiver::<Handler, _, _>::new(
            tcp_stream,
            config.server.smtp.error.soft_count,
            config.server.smtp.error.hard_count,
            config.server.message_size_limit,
            config.server.smtp.pipelining,
        );
        let smtp_stream = smtp_receiver.into_stream(
            |args| async move { Handler::on_accept(args, config, relay) },
            args,
        );
        tokio::pin!(smtp_stream);

        while matches!(smtp_stream.next().await, Some(Ok(()))) {}

        tracing::info!("Connection closed.");
        Ok(())
    }
}

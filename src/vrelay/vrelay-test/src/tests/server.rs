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
    config::local_test,
    google::{Behaviour, FakeGoogle},
    session::{free_port, start_server},
};
use pretty_assertions::assert_eq;
use tokio::io::AsyncReadExt;

fn mail(from: &str) -> lettre::Message {
    lettre::Message::builder()
        .from(from.parse().unwrap())
        .to("John Doe <john.doe@example.org>".parse().unwrap())
        .subject("Disk usage")
        .body(String::from("/var is 91% full."))
        .unwrap()
}

fn transport(addr: std::net::SocketAddr) -> lettre::AsyncSmtpTransport<lettre::Tokio1Executor> {
    lettre::AsyncSmtpTransport::<lettre::Tokio1Executor>::builder_dangerous(addr.ip().to_string())
        .port(addr.port())
        .hello_name(lettre::transport::smtp::extension::ClientId::Domain(
            "client.example.com".to_owned(),
        ))
        .build()
}

async fn serve(google: &FakeGoogle) -> std::net::SocketAddr {
    let mut config = local_test();
    config.relay.api = google.api();

    let relay = vrelay_server::build_relay(&config).await.unwrap();
    start_server(std::sync::Arc::new(config), std::sync::Arc::new(relay)).unwrap()
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn lettre_sent() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let addr = serve(&google).await;

    let response = lettre::AsyncTransport::send(
        &transport(addr),
        mail("No Reply <no-reply@example.com>"),
    )
    .await
    .unwrap();
    assert_eq!(response.code().to_string(), "250");

    let recorded = google.recorded().await;
    assert_eq!(recorded.sent.len(), 1);

    let message = recorded.sent[0].message();
    assert!(
        message.contains("From: No Reply <no-reply@example.com>\r\n"),
        "{message}"
    );
    assert!(message.contains("Subject: Disk usage\r\n"), "{message}");
    assert!(message.ends_with("/var is 91% full.\r\n"), "{message}");
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn lettre_sender_not_allowed() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let addr = serve(&google).await;

    let error =
        lettre::AsyncTransport::send(&transport(addr), mail("Eve <eve@example.com>"))
            .await
            .unwrap_err();
    assert!(error.is_permanent(), "{error}");

    assert!(google.recorded().await.sent.is_empty());
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn client_count_max_reached() {
    let mut config = local_test();
    config.server.client_count_max = 0;

    let addr = start_server(
        std::sync::Arc::new(config),
        crate::Recorder::new(vrelay_common::RelayOutcome::Sent { id: String::new() }),
    )
    .unwrap();

    let mut client = tokio::net::TcpStream::connect(addr).await.unwrap();
    let mut reply = String::new();
    client.read_to_string(&mut reply).await.unwrap();

    assert_eq!(reply, "554 Cannot process connection, closing\r\n");
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn run_serves_once_validated() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();

    let addr = free_port().unwrap();
    let mut config = local_test();
    config.relay.api = google.api();
    config.server.interfaces.addr = vec![addr];

    let server = tokio::spawn(vrelay_server::run(std::sync::Arc::new(config)));

    let mut connected = false;
    for _ in 0..100 {
        if tokio::net::TcpStream::connect(addr).await.is_ok() {
            connected = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(connected);

    let response = lettre::AsyncTransport::send(
        &transport(addr),
        mail("Alerts <alerts@example.com>"),
    )
    .await
    .unwrap();
    assert_eq!(response.code().to_string(), "250");
    assert_eq!(google.recorded().await.sent.len(), 1);

    server.abort();
}

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
use vrelay_common::{addr, ClientName, Context, ContextFinished};
use vrelay_config::{
    field::{FieldRelay, FieldRelayApi, RemoteErrorPolicy},
    Config,
};

/// Key of the service account used by the tests, its private key is `fixtures/test_key.pem`.
pub const SERVICE_ACCOUNT_FILE: &str =
    concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/service_account.json");

/// Configuration of the relay used by the tests.
///
/// The API endpoints are the production ones, see [`crate::google::FakeGoogle::api`].
///
/// # Panics
///
/// * the configuration is invalid
#[must_use]
pub fn local_test() -> Config {
    let mut config = Config::new(FieldRelay {
        service_account_file: SERVICE_ACCOUNT_FILE.into(),
        subject: "relay@example.com".to_owned(),
        sender_emails: vec![
            "no-reply@example.com".to_owned(),
            "Alerts@Example.com".to_owned(),
        ],
        on_remote_error: RemoteErrorPolicy::Drop,
        api: FieldRelayApi::default(),
    })
    .unwrap();

    config.server.name = "relay.example.com".to_owned();
    config.server.interfaces.addr = vec!["127.0.0.1:0".parse().unwrap()];
    config.server.smtp.error.delay = std::time::Duration::from_millis(1);
    config
}

/// An envelope of a complete transaction.
///
/// # Panics
///
/// * never
#[must_use]
pub fn local_ctx() -> ContextFinished {
    let mut ctx = Context::new(
        "127.0.0.1:49152".parse().unwrap(),
        "127.0.0.1:2525".parse().unwrap(),
        "relay.example.com".to_owned(),
        time::OffsetDateTime::now_utc(),
        uuid::Uuid::new_v4(),
    );
    ctx.to_helo(ClientName::Domain("client.example.com".to_owned()), false);
    ctx.to_mail_from(Some(addr!("app@client.example.com")), false)
        .unwrap();
    ctx.add_forward_path(addr!("john.doe@example.org")).unwrap();
    ctx.to_finished().unwrap();
    ctx.take_finished().unwrap()
}

/// A message with the `From` header `from`, and CRLF line endings.
#[must_use]
pub fn local_msg(from: &str) -> Vec<u8> {
    format!(
        "From: {from}\r\n\
        To: John Doe <john.doe@example.org>\r\n\
        Subject: Disk usage\r\n\
        Date: Mon, 16 Oct 2023 09:00:00 +0000\r\n\
        \r\n\
        /var is 91% full.\r\n"
    )
    .into_bytes()
}

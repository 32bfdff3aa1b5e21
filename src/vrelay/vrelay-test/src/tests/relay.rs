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
use super::{payload, ENVELOPE, ENVELOPE_OK, EHLO, GREETING, QUIT};
use crate::{
    config::{local_msg, local_test},
    google::{Behaviour, FakeGoogle},
    session::run_session,
};
use pretty_assertions::assert_eq;
use vrelay_common::MessageHandler;
use vrelay_config::{field::RemoteErrorPolicy, Config};

async fn relay_with(
    google: &FakeGoogle,
    policy: RemoteErrorPolicy,
) -> (std::sync::Arc<Config>, std::sync::Arc<dyn MessageHandler>) {
    let mut config = local_test();
    config.relay.api = google.api();
    config.relay.on_remote_error = policy;

    let relay = vrelay_server::build_relay(&config).await.unwrap();
    (std::sync::Arc::new(config), std::sync::Arc::new(relay))
}

/// Run a session carrying a single transaction of `message`, expecting `reply` to the payload.
async fn relay_one(google: &FakeGoogle, message: &[u8], reply: &str) {
    let (config, relay) = relay_with(google, RemoteErrorPolicy::Drop).await;

    let expected = [GREETING, EHLO, ENVELOPE_OK, reply, QUIT];
    let replies = run_session(
        config,
        relay,
        &[
            "EHLO client.example.com\r\n",
            ENVELOPE,
            &payload(message),
            "QUIT\r\n",
        ],
        &expected,
    )
    .await;
    assert_eq!(replies, expected);
}

#[test_log::test(tokio::test)]
async fn sent() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let message = local_msg("No Reply <no-reply@example.com>");

    relay_one(&google, &message, "250 Ok\r\n").await;

    let recorded = google.recorded().await;
    assert_eq!(recorded.tokens_issued, 1);
    assert_eq!(recorded.introspections, 1);
    assert_eq!(recorded.sent.len(), 1);
    assert_eq!(recorded.sent[0].message(), String::from_utf8(message).unwrap());
    assert_eq!(
        recorded.sent[0].authorization.as_deref(),
        Some("Bearer ya29.fake-1")
    );

    let claims = &recorded.assertions[0];
    assert_eq!(claims["sub"], "relay@example.com");
    assert_eq!(claims["iss"], "relay@vrelay-test.iam.gserviceaccount.com");
    assert_eq!(claims["scope"], "https://www.googleapis.com/auth/gmail.send");
    assert_eq!(claims["aud"], format!("{}/token", google.base_url));
}

#[test_log::test(tokio::test)]
async fn raw_is_url_safe() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let message = [
        local_msg("No Reply <no-reply@example.com>"),
        b"subjects??>>\r\n".to_vec(),
    ]
    .concat();

    relay_one(&google, &message, "250 Ok\r\n").await;

    let recorded = google.recorded().await;
    let raw = &recorded.sent[0].raw;
    assert!(!raw.contains('+') && !raw.contains('/'), "{raw}");
    assert_eq!(recorded.sent[0].message(), String::from_utf8(message).unwrap());
}

#[rstest::rstest]
#[case::alerts("Alerts <alerts@example.com>")]
#[case::upper_case("No Reply <NO-REPLY@EXAMPLE.COM>")]
#[case::quoted_name("\"Monitoring, prod\" <alerts@example.com>")]
#[test_log::test(tokio::test)]
async fn allowed_sender(#[case] from: &str) {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();

    relay_one(&google, &local_msg(from), "250 Ok\r\n").await;
    assert_eq!(google.recorded().await.sent.len(), 1);
}

#[rstest::rstest]
#[case::unknown("Eve <eve@example.com>")]
#[case::other_domain("No Reply <no-reply@example.org>")]
#[test_log::test(tokio::test)]
async fn sender_not_allowed(#[case] from: &str) {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();

    relay_one(
        &google,
        &local_msg(from),
        "550 5.7.1 Sender address not allowed\r\n",
    )
    .await;
    assert!(google.recorded().await.sent.is_empty());
}

#[rstest::rstest]
#[case::bare_address("no-reply@example.com")]
#[case::no_display_name("<no-reply@example.com>")]
#[case::empty_address("No Reply <>")]
#[test_log::test(tokio::test)]
async fn invalid_from_header(#[case] from: &str) {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();

    relay_one(
        &google,
        &local_msg(from),
        "550 5.6.0 Invalid From header\r\n",
    )
    .await;
    assert!(google.recorded().await.sent.is_empty());
}

#[test_log::test(tokio::test)]
async fn missing_from_header() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();

    relay_one(
        &google,
        b"To: John Doe <john.doe@example.org>\r\nSubject: hi\r\n\r\nhi\r\n",
        "550 5.6.0 Invalid From header\r\n",
    )
    .await;
    assert!(google.recorded().await.sent.is_empty());
}

#[rstest::rstest]
#[case::drop(RemoteErrorPolicy::Drop, "250 Ok\r\n")]
#[case::defer(RemoteErrorPolicy::Defer, "451 4.3.0 Temporary delivery failure\r\n")]
#[test_log::test(tokio::test)]
async fn remote_error(#[case] policy: RemoteErrorPolicy, #[case] on_failure: &str) {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let (config, relay) = relay_with(&google, policy).await;
    google.fail_next_sends(1).await;

    let first = local_msg("No Reply <no-reply@example.com>");
    let second = local_msg("Alerts <alerts@example.com>");

    let expected = [
        GREETING,
        EHLO,
        ENVELOPE_OK,
        on_failure,
        ENVELOPE_OK,
        "250 Ok\r\n",
        QUIT,
    ];
    let replies = run_session(
        config,
        relay,
        &[
            "EHLO client.example.com\r\n",
            ENVELOPE,
            &payload(&first),
            ENVELOPE,
            &payload(&second),
            "QUIT\r\n",
        ],
        &expected,
    )
    .await;
    assert_eq!(replies, expected);

    let recorded = google.recorded().await;
    assert_eq!(recorded.sent.len(), 1);
    assert_eq!(recorded.sent[0].message(), String::from_utf8(second).unwrap());
}

#[test_log::test(tokio::test)]
async fn token_reused() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let (_, relay) = relay_with(&google, RemoteErrorPolicy::Drop).await;

    let envelope = crate::config::local_ctx();
    let message = local_msg("No Reply <no-reply@example.com>");
    for _ in 0..3 {
        assert!(matches!(
            relay.handle(&envelope, &message).await,
            vrelay_common::RelayOutcome::Sent { .. }
        ));
    }

    let recorded = google.recorded().await;
    assert_eq!(recorded.tokens_issued, 1);
    assert_eq!(recorded.sent.len(), 3);
}

#[test_log::test(tokio::test)]
async fn token_refreshed_when_expiring() {
    let google = FakeGoogle::start(Behaviour {
        expires_in: 30,
        ..Behaviour::default()
    })
    .await
    .unwrap();
    let (_, relay) = relay_with(&google, RemoteErrorPolicy::Drop).await;

    let envelope = crate::config::local_ctx();
    let message = local_msg("No Reply <no-reply@example.com>");
    for _ in 0..2 {
        assert!(matches!(
            relay.handle(&envelope, &message).await,
            vrelay_common::RelayOutcome::Sent { .. }
        ));
    }

    let recorded = google.recorded().await;
    assert_eq!(recorded.tokens_issued, 3);
    assert_eq!(recorded.introspections, 1);
    assert_eq!(
        recorded
            .sent
            .iter()
            .map(|s| s.authorization.clone().unwrap())
            .collect::<Vec<_>>(),
        vec!["Bearer ya29.fake-2", "Bearer ya29.fake-3"]
    );
}

#[test_log::test(tokio::test)]
async fn sent_outcome_carries_the_id() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let (_, relay) = relay_with(&google, RemoteErrorPolicy::Drop).await;

    assert_eq!(
        relay
            .handle(
                &crate::config::local_ctx(),
                &local_msg("No Reply <no-reply@example.com>")
            )
            .await,
        vrelay_common::RelayOutcome::Sent {
            id: "18c00001".to_owned()
        }
    );
}

#[test_log::test(tokio::test)]
async fn remote_error_outcome() {
    let google = FakeGoogle::start(Behaviour::default()).await.unwrap();
    let (_, relay) = relay_with(&google, RemoteErrorPolicy::Drop).await;
    google.fail_next_sends(1).await;

    assert_eq!(
        relay
            .handle(
                &crate::config::local_ctx(),
                &local_msg("No Reply <no-reply@example.com>")
            )
            .await,
        vrelay_common::RelayOutcome::RemoteError(
            "gmail api error 403 [PERMISSION_DENIED]: Delegation denied for relay@example.com"
                .to_owned()
        )
    );
}

// SPDX-License-Identifier: AGPL-3.0-or-later

mod common;

/// A pooled connection older than `max_idle_time` must be redialed on the
/// next send rather than reused, even though the original socket is still
/// technically open (spec §8 Scenario 5 "reconnect on expiry").
#[tokio::test]
async fn idle_connection_past_max_idle_time_triggers_fresh_dial() {
    let (server, addr) = common::spawn_server(100, 0, common::echo_dispatcher()).await;
    let client = common::client_for_with_idle(&addr, 3_000, 200);

    let first = client
        .invoke(None, None, "Echo", &serde_json::json!({"round": 1}), None)
        .await
        .expect("first call dials and succeeds");
    assert_eq!(first, serde_json::json!({"round": 1}));

    let accepts_after_first = server.connection_count();
    assert_eq!(accepts_after_first, 1, "first call should have dialed exactly one connection");

    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    let second = client
        .invoke(None, None, "Echo", &serde_json::json!({"round": 2}), None)
        .await
        .expect("second call succeeds via a fresh dial after the idle connection expired");
    assert_eq!(second, serde_json::json!({"round": 2}));

    assert_eq!(
        server.connection_count(),
        accepts_after_first + 1,
        "expiry should force exactly one fresh accept on the server side"
    );

    server.stop();
}

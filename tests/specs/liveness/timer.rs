//! Liveness specs
//!
//! One keepalive timer exists while any session is tracked, and none
//! otherwise.

use crate::prelude::*;
use similar_asserts::assert_eq;
use std::time::Duration;

async fn end(council: &Council, id: &SessionId) {
    let response = council
        .request(Request::EndSession {
            session_id: id.clone(),
        })
        .await;
    assert_eq!(response, Response::Ok);
}

#[tokio::test]
async fn timer_follows_the_tracked_sessions() {
    let council = Council::start().await;
    assert_eq!(council.liveness().await, (0, false));

    let ids = vec![
        council.create_session().await,
        council.create_session().await,
        council.create_session().await,
    ];
    assert_eq!(council.liveness().await, (3, true));

    end(&council, &ids[0]).await;
    end(&council, &ids[1]).await;
    assert_eq!(council.liveness().await, (1, true));

    end(&council, &ids[2]).await;
    assert_eq!(council.liveness().await, (0, false));

    // ending a session keeps its state
    assert_eq!(council.session(&ids[0]).await.id, ids[0]);

    council.create_session().await;
    assert_eq!(council.liveness().await, (1, true));
}

#[tokio::test]
async fn armed_timer_writes_heartbeat() {
    let council = Council::with_settings("keepalive_interval = \"1s\"").await;
    let heartbeat = council.config.volatile_path.join("keepalive_ping.json");
    assert!(!heartbeat.exists());

    council.create_session().await;
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(heartbeat.exists());
}

#[tokio::test]
async fn deleted_session_stops_being_tracked() {
    let council = Council::start().await;
    let id = council.create_session().await;

    council
        .request(Request::DeleteSession {
            session_id: id.clone(),
        })
        .await;

    assert_eq!(council.liveness().await, (0, false));
}

//! Broadcast specs
//!
//! Every listening worker gets its own request; one failure never affects
//! the others.

use crate::prelude::*;
use similar_asserts::assert_eq;

fn outcomes(response: Response) -> Vec<(String, bool)> {
    match response {
        Response::Broadcast { outcomes } => outcomes
            .into_iter()
            .map(|entry| (entry.identity.to_string(), entry.ok))
            .collect(),
        other => panic!("expected broadcast, got {:?}", other),
    }
}

#[tokio::test]
async fn one_unreachable_worker_fails_alone() {
    let council = Council::start().await;
    let workers: Vec<Worker> = ["tab-1", "tab-3", "tab-4"]
        .into_iter()
        .map(|name| Worker::spawn(council.workers_dir(), name, Answer::Ack(json!({}))))
        .collect();
    dead_socket(council.workers_dir(), "tab-2");

    let response = council
        .request(Request::Broadcast {
            kind: "reset".to_string(),
            payload: json!({ "reason": "new round" }),
        })
        .await;

    assert_eq!(
        outcomes(response),
        vec![
            ("tab-1".to_string(), true),
            ("tab-2".to_string(), false),
            ("tab-3".to_string(), true),
            ("tab-4".to_string(), true),
        ]
    );
    for worker in &workers {
        assert_eq!(worker.seen_kinds(), vec!["reset".to_string()]);
    }
}

#[tokio::test]
async fn silent_worker_does_not_hold_back_the_rest() {
    let council = Council::with_settings("request_timeout = \"200ms\"").await;
    let _fast = Worker::spawn(council.workers_dir(), "tab-1", Answer::Ack(json!({})));
    let _silent = Worker::spawn(council.workers_dir(), "tab-2", Answer::Silent);

    let response = council
        .request(Request::Broadcast {
            kind: "ping".to_string(),
            payload: serde_json::Value::Null,
        })
        .await;

    assert_eq!(
        outcomes(response),
        vec![("tab-1".to_string(), true), ("tab-2".to_string(), false)]
    );
}

#[tokio::test]
async fn broadcast_with_no_workers_is_empty() {
    let council = Council::start().await;
    let response = council
        .request(Request::Broadcast {
            kind: "reset".to_string(),
            payload: serde_json::Value::Null,
        })
        .await;
    assert_eq!(outcomes(response), Vec::<(String, bool)>::new());
}

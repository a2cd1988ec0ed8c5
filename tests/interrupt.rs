#![cfg(unix)]

mod common;

use std::{process::Command, time::Duration};

use common::{captured_output, FakeServer, Reply};
use houseq::{
    config::ProgressMode,
    executor::{ExecutionOutcome, QueryExecutor},
    query::Settings,
    session::{Session, SessionOptions},
    transport::QueryBody,
};

fn interrupt_self() {
    let status = Command::new("kill")
        .args(["-s", "INT", &std::process::id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
}

// Runs alone in its own binary: the signal reaches every listener in the
// process.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ctrl_c_during_a_query_kills_it() {
    let server = FakeServer::start(|request| {
        if request.param("replace_running_query") == Some("1") {
            Reply::ok("query_id killed by replace\n")
        } else {
            // The listener is already in place once the query reaches the
            // server.
            interrupt_self();
            Reply::ok("1\n").then(Duration::from_secs(30), "2\n")
        }
    })
    .await;
    let executor = QueryExecutor::new(server.transport(), ProgressMode::Off);
    let (output, _, service) = captured_output();
    let mut session = Session::new(
        executor,
        "default",
        Settings::new(),
        output,
        SessionOptions {
            default_format: "TabSeparated".to_string(),
            ..SessionOptions::default()
        },
    );

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        session.execute(
            QueryBody::Text("SELECT sleepEachRow(1)".to_string()),
            "TabSeparated",
            None,
        ),
    )
    .await
    .expect("the interrupt must end the query")
    .unwrap();

    assert!(matches!(outcome, ExecutionOutcome::Cancelled { killed: true }));
    assert!(service.text().contains("killed!"));

    let requests = server.requests();
    let query_id = requests[0].param("query_id").unwrap().to_string();
    let kills: Vec<_> = requests
        .iter()
        .filter(|r| r.param("replace_running_query") == Some("1"))
        .collect();
    assert_eq!(kills.len(), 1);
    assert_eq!(kills[0].param("query_id"), Some(query_id.as_str()));
}

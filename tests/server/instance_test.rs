//! Lifecycle tests for `ServerInstance`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use mc_supervisor::server::{
    Channel, Event, ExitReason, ServerBuilder, ServerError, ServerState, SpawnError,
};
use regex::Regex;

use super::fake_server::{FakeServer, CRASHING, GATED, STUBBORN, VANILLA};

const LIMIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_ready_after_banner() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    assert!(server.pid().is_some());

    tokio::time::timeout(LIMIT, server.ready())
        .await
        .expect("ready timed out")
        .unwrap();

    assert!(server.is_ready());
    assert_eq!(server.state(), ServerState::Ready);
    assert!(server.time_to_ready().is_some());

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_ready_resolves_for_late_callers() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    // A second await after the fact resolves immediately.
    tokio::time::timeout(Duration::from_millis(100), server.ready())
        .await
        .unwrap()
        .unwrap();

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_ready_only_on_banner_line() {
    let fake = FakeServer::new(GATED);
    let server = fake.factory().spawn().unwrap();

    let op_line = server.when(Regex::new("op sigmasoldier").unwrap());
    server.send("go").await.unwrap();
    tokio::time::timeout(LIMIT, op_line).await.unwrap().unwrap();
    assert!(!server.is_ready());
    assert_eq!(server.state(), ServerState::Starting);

    let banner = server.when(Regex::new(r"Done \(3\.2s\)").unwrap());
    server.send("go").await.unwrap();
    tokio::time::timeout(LIMIT, banner).await.unwrap().unwrap();
    assert!(server.is_ready());
    assert_eq!(server.state(), ServerState::Ready);

    tokio::time::timeout(Duration::from_millis(100), server.ready())
        .await
        .unwrap()
        .unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_lines_delivered_in_order() {
    let fake = FakeServer::new(GATED);
    let server = fake.factory().spawn().unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    server.on(Channel::Message, move |event| {
        if let Event::Message(line) = event {
            sink.lock().unwrap().push(line.clone());
        }
    });

    server.send("go").await.unwrap();
    server.send("go").await.unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();
    server.stop().await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            "[10:00:01] [Server thread/INFO]: <player> op sigmasoldier",
            "[10:00:03] [Server thread/INFO]: Done (3.2s)! For help, type \"help\"",
            "[10:00:10] [Server thread/INFO]: Stopping the server",
        ]
    );
}

#[tokio::test]
async fn test_second_banner_does_not_change_state() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();
    let first = server.time_to_ready();

    let ready_events = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&ready_events);
    server.on(Channel::Ready, move |_| *counter.lock().unwrap() += 1);

    let response = server.command("banner").await.unwrap();
    assert!(response.contains("Done (9.9s)!"));
    assert_eq!(server.time_to_ready(), first);
    assert_eq!(*ready_events.lock().unwrap(), 0);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_is_final() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let reason = tokio::time::timeout(LIMIT, server.stop()).await.unwrap().unwrap();
    assert_eq!(reason, ExitReason::Code(0));
    assert!(server.is_stopped());
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(server.exit_reason(), Some(ExitReason::Code(0)));

    assert!(matches!(server.send("list").await, Err(ServerError::Stopped)));
    assert!(matches!(server.command("list").await, Err(ServerError::Stopped)));
    assert!(matches!(server.line().await, Err(ServerError::Stopped)));

    // Stopping again reports the same exit.
    assert_eq!(server.stop().await.unwrap(), ExitReason::Code(0));
}

#[tokio::test]
async fn test_stop_event_fires_once() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();

    let stops = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&stops);
    server.on(Channel::Stop, move |event| {
        if let Event::Stop(reason) = event {
            sink.lock().unwrap().push(*reason);
        }
    });

    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();
    server.stop().await.unwrap();
    assert_eq!(*stops.lock().unwrap(), vec![ExitReason::Code(0)]);
}

#[tokio::test]
async fn test_exit_before_ready() {
    let fake = FakeServer::new(CRASHING);
    let server = fake.factory().spawn().unwrap();

    let result = tokio::time::timeout(LIMIT, server.ready()).await.unwrap();
    match result {
        Err(ServerError::ExitedBeforeReady(reason)) => assert_eq!(reason, ExitReason::Code(2)),
        other => panic!("Expected ExitedBeforeReady, got {other:?}"),
    }
    assert_eq!(server.wait_stopped().await, ExitReason::Code(2));
    assert!(!server.is_ready());
}

#[tokio::test]
async fn test_custom_ready_pattern() {
    let fake = FakeServer::new(VANILLA);
    let server = fake
        .builder()
        .ready_pattern(Regex::new("Starting minecraft server").unwrap())
        .build()
        .unwrap()
        .spawn()
        .unwrap();

    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_or_kill_falls_back_to_kill() {
    let fake = FakeServer::new(STUBBORN);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let reason = tokio::time::timeout(LIMIT, server.stop_or_kill(Duration::from_millis(200)))
        .await
        .unwrap();
    assert!(!reason.success());
    assert!(server.is_stopped());
}

#[cfg(unix)]
#[tokio::test]
async fn test_terminate_sends_sigterm() {
    let fake = FakeServer::new(STUBBORN);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let reason = tokio::time::timeout(LIMIT, server.terminate(Duration::from_secs(5)))
        .await
        .unwrap();
    assert_eq!(reason, ExitReason::Signal(15));
}

#[tokio::test]
async fn test_spawn_in_other_directory() {
    let fake = FakeServer::new(VANILLA);
    let elsewhere = tempfile::TempDir::new().unwrap();
    let server = fake.factory().spawn_in(elsewhere.path()).unwrap();

    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();
    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_spawn_missing_executable() {
    let fake = FakeServer::new(VANILLA);
    let result = fake
        .builder()
        .executable("definitely-not-a-real-java-binary")
        .build()
        .unwrap()
        .spawn();

    assert!(matches!(result, Err(SpawnError::NotFound(_))));
}

#[test]
fn test_build_without_file() {
    assert!(ServerBuilder::new().build().is_err());
}

//! Command and wait tests against a running process.

use std::time::Duration;

use mc_supervisor::server::{list_players, OutputParser, ServerError};
use regex::Regex;

use super::fake_server::{FakeServer, VANILLA};

const LIMIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_command_returns_next_line() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let response = tokio::time::timeout(LIMIT, server.command("say hi"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(response, "[10:00:04] [Server thread/INFO]: echo: say hi");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_commands_resolve_in_order() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let (first, second, third) = tokio::time::timeout(
        LIMIT,
        async { tokio::join!(server.command("one"), server.command("two"), server.command("three")) },
    )
    .await
    .unwrap();

    assert_eq!(first.unwrap(), "[10:00:04] [Server thread/INFO]: echo: one");
    assert_eq!(second.unwrap(), "[10:00:04] [Server thread/INFO]: echo: two");
    assert_eq!(third.unwrap(), "[10:00:04] [Server thread/INFO]: echo: three");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_sequential_commands_pair_exactly() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    for word in ["alpha", "beta", "gamma"] {
        let response = server.command(word).await.unwrap();
        assert!(response.ends_with(&format!("echo: {word}")), "{response}");
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_line_wait_does_not_steal_response() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    drop(server.line());
    let response = tokio::time::timeout(LIMIT, server.command("list"))
        .await
        .expect("list response went to an abandoned waiter")
        .unwrap();
    assert!(response.contains("There are 1 of a max of 20 players online"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_when_matches_later_output() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let pending = server.when(Regex::new(r"echo: (?P<word>\w+)$").unwrap());
    server.send("ping").await.unwrap();

    let found = tokio::time::timeout(LIMIT, pending).await.unwrap().unwrap();
    assert_eq!(found.name("word"), Some("ping"));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_wait_for_times_out() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let result = server
        .wait_for(Regex::new("never printed").unwrap(), Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(ServerError::Timeout)));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn test_pending_command_fails_on_exit() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let result = tokio::time::timeout(LIMIT, server.command("crash")).await.unwrap();
    assert!(matches!(result, Err(ServerError::Stopped)));
    assert_eq!(server.wait_stopped().await.to_string(), "exit code 3");
}

#[tokio::test]
async fn test_list_players() {
    let fake = FakeServer::new(VANILLA);
    let server = fake.factory().spawn().unwrap();
    tokio::time::timeout(LIMIT, server.ready()).await.unwrap().unwrap();

    let parser = OutputParser::new().unwrap();
    let list = list_players(&server, &parser).await.unwrap().unwrap();
    assert_eq!(list.online, 1);
    assert_eq!(list.max, 20);
    assert_eq!(list.players, vec!["sigmasoldier"]);

    server.stop().await.unwrap();
}

//! End-to-end behavior of the live store: watcher, cache, and fan-out
//! working against real directories.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::TestBoard;
use corkboard::events::{ChangeKind, PushKind, PushMessage};
use corkboard::store::Store;
use tokio::time::{sleep, timeout};

async fn next_data_message(
    sub: &mut corkboard::broadcast::Subscription,
    secs: u64,
) -> PushMessage {
    loop {
        let msg = timeout(Duration::from_secs(secs), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("broadcaster gone");
        if !matches!(msg.kind, PushKind::Connection | PushKind::Heartbeat) {
            return msg;
        }
    }
}

async fn started_store(board: &TestBoard) -> Arc<Store> {
    let store = Arc::new(board.store());
    store.start_watching().unwrap();
    // Give the OS watcher a moment to register.
    sleep(Duration::from_millis(200)).await;
    store
}

#[tokio::test]
async fn reads_after_a_change_event_see_fresh_data() {
    let board = TestBoard::new("MDT");
    let path = board.write_ticket("MDT-1-live.md", "MDT-1", "# Old Title\n");

    let store = started_store(&board).await;
    let mut sub = store.subscribe();

    // Warm the cache with the pre-change content.
    let metadata = store.file_metadata(&path).await.unwrap();
    assert_eq!(metadata.title.as_deref(), Some("Old Title"));

    board.write_ticket("MDT-1-live.md", "MDT-1", "# New Title\n");
    let msg = next_data_message(&mut sub, 5).await;
    assert_eq!(msg.kind, PushKind::FileChange);

    // The invalidation happened before the event was emitted, so this read
    // must reflect the on-disk state at or after the event.
    let metadata = store.file_metadata(&path).await.unwrap();
    assert_eq!(metadata.title.as_deref(), Some("New Title"));
    let content = store.read_file(&path).await.unwrap();
    assert!(content.contains("# New Title"));
}

#[tokio::test]
async fn deleting_a_ticket_yields_deleted_event_and_not_found() {
    let board = TestBoard::new("MDT");
    let path = board.write_ticket("MDT-2-doomed.md", "MDT-2", "# Doomed\n");

    let store = started_store(&board).await;
    let mut sub = store.subscribe();
    assert!(store.read_file(&path).await.is_ok());

    fs::remove_file(&path).unwrap();
    let msg = next_data_message(&mut sub, 5).await;
    assert_eq!(msg.data.unwrap().event_type, ChangeKind::Deleted);

    assert!(store.read_file(&path).await.is_err());
}

#[tokio::test]
async fn every_subscriber_gets_the_connection_message_then_events() {
    let board = TestBoard::new("MDT");
    let store = started_store(&board).await;

    let mut first = store.subscribe();
    let mut second = store.subscribe();

    board.write_ticket("MDT-3-shared.md", "MDT-3", "# Shared\n");

    for sub in [&mut first, &mut second] {
        let connection = timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(connection.kind, PushKind::Connection);

        let event = next_data_message(sub, 5).await;
        assert_eq!(event.data.unwrap().project_id.as_deref(), Some("MDT"));
    }
}

#[tokio::test]
async fn registry_changes_flow_before_ticket_events_from_new_roots() {
    let board = TestBoard::new("MDT");
    let store = started_store(&board).await;
    let mut sub = store.subscribe();

    // Register a brand-new project while running.
    let other = corkboard::project::Project {
        code: "AB".to_string(),
        name: "Other".to_string(),
        path: board.root().join("other"),
        tickets_path: "tickets".to_string(),
        active: true,
        document_discovery: None,
        descriptor_path: None,
    };
    fs::create_dir_all(other.tickets_dir()).unwrap();
    board.registry.save(&other).unwrap();

    let registry_msg = next_data_message(&mut sub, 5).await;
    assert_eq!(registry_msg.kind, PushKind::RegistryChange);

    // The new root is live: a ticket write there is observed.
    sleep(Duration::from_millis(200)).await;
    fs::write(
        other.tickets_dir().join("AB-1-first.md"),
        "---\ncode: AB-1\n---\n# First\n",
    )
    .unwrap();

    let ticket_msg = next_data_message(&mut sub, 5).await;
    assert_eq!(ticket_msg.kind, PushKind::FileChange);
    assert_eq!(ticket_msg.data.unwrap().project_id.as_deref(), Some("AB"));
}

#[tokio::test]
async fn removing_a_project_descriptor_stops_its_events() {
    let board = TestBoard::new("MDT");
    let store = started_store(&board).await;
    let mut sub = store.subscribe();

    fs::remove_file(board.registry.descriptor_path_for("MDT")).unwrap();
    let msg = next_data_message(&mut sub, 5).await;
    assert_eq!(msg.kind, PushKind::RegistryChange);
    assert_eq!(msg.data.unwrap().event_type, ChangeKind::Deleted);

    // Writes under the unregistered root no longer produce events.
    sleep(Duration::from_millis(200)).await;
    board.write_ticket("MDT-9-orphan.md", "MDT-9", "# Orphan\n");
    sleep(Duration::from_millis(500)).await;
    while let Some(msg) = sub.try_recv() {
        assert!(
            matches!(msg.kind, PushKind::Connection | PushKind::Heartbeat),
            "unexpected event after deregistration: {msg:?}"
        );
    }
}

#[tokio::test]
async fn stop_watching_halts_event_delivery() {
    let board = TestBoard::new("MDT");
    let store = started_store(&board).await;
    let mut sub = store.subscribe();

    store.stop_watching();
    sleep(Duration::from_millis(100)).await;

    board.write_ticket("MDT-5-silent.md", "MDT-5", "# Silent\n");
    sleep(Duration::from_millis(500)).await;
    while let Some(msg) = sub.try_recv() {
        assert!(matches!(
            msg.kind,
            PushKind::Connection | PushKind::Heartbeat
        ));
    }

    // The store still answers reads without the watcher.
    let path = board.project.tickets_dir().join("MDT-5-silent.md");
    assert!(store.read_file(&path).await.is_ok());
}

#[tokio::test]
async fn concurrent_external_writes_tolerated_between_list_and_read() {
    let board = TestBoard::new("MDT");
    let store = started_store(&board).await;

    board.write_ticket("MDT-1-here.md", "MDT-1", "# Here\n");
    let (_, _, path) = store.locate("MDT-1").unwrap();

    // The file disappears between locate and read; the store reports a
    // clean not-found instead of failing oddly.
    fs::remove_file(&path).unwrap();
    assert!(store.read_file(&path).await.is_err());
}

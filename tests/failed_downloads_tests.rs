//! Integration tests for the failed-downloads replay
//!
//! Season groups and single episodes are copied and refreshed independently;
//! a broken item is skipped without stopping the pass.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;

use common::{FakeDownloadClient, FakeMediaServer, Workspace, queue_record};
use courier::jobs::{FailedDownloadsHandler, Handler};
use courier::services::InstantClock;

#[tokio::test]
async fn replays_seasons_then_episodes() {
    let ws = Workspace::new();
    ws.add_season_download("Show.S02.1080p", &["E01.mkv", "E02.mkv"]);
    ws.add_download("Other.S05E07.mkv");
    let client = Arc::new(
        FakeDownloadClient::new()
            .with_record(queue_record(20, 3, "Other S05E07", "/dl/Other.S05E07.mkv", "X"))
            .with_record(queue_record(10, 1, "Show S02 1080p", "/dl/Show.S02.1080p", "S"))
            .with_record(queue_record(11, 1, "Show S02 1080p", "/dl/Show.S02.1080p", "S"))
            .with_series(1, "Show", "/tv/Show")
            .with_series(3, "Other", "/tv/Other"),
    );
    let plex = Arc::new(FakeMediaServer::default());
    let handler = FailedDownloadsHandler::new(ws.services(
        client.clone(),
        plex.clone(),
        Arc::new(InstantClock::new()),
    ));

    handler.handle().await.unwrap();

    assert!(ws.library_file("Show", "Temporada 02", "E01.mkv").exists());
    assert!(ws.library_file("Show", "Temporada 02", "E02.mkv").exists());
    assert!(ws.library_file("Other", "Temporada 05", "Other.S05E07.mkv").exists());
    assert_eq!(
        client.calls(),
        vec![
            "list_queue",
            "get_series 1",
            "refresh_series 1",
            "delete_queue_item 10",
            "get_series 3",
            "refresh_series 3",
            "delete_queue_item 20",
        ]
    );
    assert_eq!(*plex.rescans.lock(), vec!["/mnt/series/Show", "/mnt/series/Other"]);
}

#[tokio::test]
async fn broken_items_are_skipped() {
    let ws = Workspace::new();
    ws.add_download("Good.S01E01.mkv");
    let client = Arc::new(
        FakeDownloadClient::new()
            // season folder never downloaded
            .with_record(queue_record(1, 1, "Missing S04", "/dl/Missing.S04", "M"))
            .with_record(queue_record(2, 1, "Missing S04", "/dl/Missing.S04", "M"))
            // unknown series
            .with_record(queue_record(3, 42, "Ghost S01E01", "/dl/Ghost.S01E01.mkv", "G"))
            // no season marker in the title
            .with_record(queue_record(4, 1, "Special Feature", "/dl/Special.mkv", "F"))
            .with_record(queue_record(5, 1, "Good S01E01", "/dl/Good.S01E01.mkv", "OK"))
            .with_series(1, "Good", "/tv/Good"),
    );
    let handler = FailedDownloadsHandler::new(ws.services(
        client.clone(),
        Arc::new(FakeMediaServer::default()),
        Arc::new(InstantClock::new()),
    ));

    handler.handle().await.unwrap();

    assert!(ws.library_file("Good", "Temporada 01", "Good.S01E01.mkv").exists());
    let deleted: Vec<String> = client
        .calls()
        .into_iter()
        .filter(|c| c.starts_with("delete_queue_item"))
        .collect();
    assert_eq!(deleted, vec!["delete_queue_item 5"]);
}

#[tokio::test]
async fn empty_queue_is_a_no_op() {
    let ws = Workspace::new();
    let client = Arc::new(FakeDownloadClient::new());
    let handler = FailedDownloadsHandler::new(ws.services(
        client.clone(),
        Arc::new(FakeMediaServer::default()),
        Arc::new(InstantClock::new()),
    ));

    handler.handle().await.unwrap();

    assert_eq!(client.calls(), vec!["list_queue"]);
}

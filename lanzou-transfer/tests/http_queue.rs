use std::time::Duration;

use lanzou_core::{DownloadSource, HttpRemoteApi, RemoteId, Session};
use lanzou_transfer::{
    DownloadRequest, QueueConfig, TaskEvent, TaskStatus, TransferQueue, TransferRequest,
    plan_directory_upload,
};
use serde_json::json;
use tempfile::tempdir;
use tokio::time::timeout;
use wiremock::matchers::{body_bytes, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transfer_queue(server: &MockServer) -> TransferQueue<HttpRemoteApi> {
    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    TransferQueue::new(
        api,
        Session::new("ylogin=1"),
        QueueConfig::default().with_chunk_size(4),
    )
    .unwrap()
}

#[tokio::test]
async fn downloads_land_on_disk() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/files/5/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/blob/5", server.uri()),
            "name": "song.mp3"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/5"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"la la la"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let target = dir.path().join("music/song.mp3");
    let queue = transfer_queue(&server);
    let mut events = queue.subscribe();
    let ids = queue
        .submit([TransferRequest::from(DownloadRequest::new(
            DownloadSource::File(RemoteId::new("5")),
            &target,
        ))])
        .unwrap();

    timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    let task = queue.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.size, Some(8));
    assert_eq!(task.progress, 8);
    assert_eq!(std::fs::read(&target).unwrap(), b"la la la");

    let mut last_progress = 0;
    while let Some(event) = events.try_recv() {
        if let TaskEvent::Progress { transferred, .. } = event {
            assert!(transferred > last_progress);
            last_progress = transferred;
        }
    }
    assert_eq!(last_progress, 8);
}

#[tokio::test]
async fn missing_file_fails_only_its_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/files/404/download"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let queue = transfer_queue(&server);
    let ids = queue
        .submit([TransferRequest::from(DownloadRequest::new(
            DownloadSource::File(RemoteId::new("404")),
            dir.path().join("x"),
        ))])
        .unwrap();
    timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    let task = queue.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(
        task.error.map(|err| err.to_string()),
        Some("not found: no such file".to_string())
    );
}

#[tokio::test]
async fn directory_upload_creates_folder_then_streams_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/folders/-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "folder_id": "-1",
            "items": []
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/folders"))
        .and(body_json(json!({
            "parent_id": "-1",
            "name": "notes"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "300" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/folders/300/upload"))
        .and(query_param("name", "todo.txt"))
        .and(query_param("size", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/put/todo", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/put/todo"))
        .and(body_bytes(b"buy coffee"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "f-9" })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    let notes = dir.path().join("notes");
    std::fs::create_dir(&notes).unwrap();
    std::fs::write(notes.join("todo.txt"), b"buy coffee").unwrap();

    let plan = plan_directory_upload(&notes, &RemoteId::root(), 0).unwrap();
    let queue = transfer_queue(&server);
    let ids = queue
        .submit(plan.into_iter().map(TransferRequest::from))
        .unwrap();
    timeout(Duration::from_secs(10), queue.wait_idle())
        .await
        .unwrap();

    let task = queue.task(ids[0]).unwrap();
    assert_eq!(task.status, TaskStatus::Completed, "{:?}", task.error);
    assert_eq!(task.remote_file, Some(RemoteId::new("f-9")));
}

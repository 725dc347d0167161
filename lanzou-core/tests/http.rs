use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use lanzou_core::{
    ApiError, DownloadSource, EntryKind, EntryRef, HttpRemoteApi, RemoteApi, RemoteId, Session,
    ShareLink,
};
use serde_json::json;
use wiremock::matchers::{body_bytes, body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session() -> Session {
    Session::new("ylogin=7; phpdisk_info=abc").with_user("tester")
}

#[tokio::test]
async fn list_folder_sends_session_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/folders/-1"))
        .and(header("cookie", "ylogin=7; phpdisk_info=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "folder_id": "-1",
            "path": [],
            "items": [
                { "id": "11", "name": "Docs", "type": "folder" },
                { "id": "12", "name": "a.txt", "type": "file", "size": 5, "downloads": 3 }
            ]
        })))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let listing = api.list_folder(&session(), &RemoteId::root()).await.unwrap();

    assert_eq!(listing.depth(), 0);
    assert_eq!(listing.items.len(), 2);
    assert_eq!(listing.find_folder("Docs").unwrap().id, RemoteId::new("11"));
    assert_eq!(listing.items[1].downloads, 3);
}

#[tokio::test]
async fn base_url_prefix_is_preserved() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/gateway/v1/folders/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "folder_id": "42",
            "path": [{ "id": "42", "name": "Music" }]
        })))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&format!("{}/gateway/", server.uri())).unwrap();
    let listing = api
        .list_folder(&Session::anonymous(), &RemoteId::new("42"))
        .await
        .unwrap();

    assert_eq!(listing.depth(), 1);
    assert!(listing.items.is_empty());
}

#[tokio::test]
async fn create_folder_posts_parent_and_name() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/folders"))
        .and(body_json(json!({
            "parent_id": "-1",
            "name": "Photos",
            "description": "holiday"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "900" })))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let id = api
        .create_folder(&session(), &RemoteId::root(), "Photos", Some("holiday"))
        .await
        .unwrap();

    assert_eq!(id, RemoteId::new("900"));
}

#[tokio::test]
async fn rename_and_delete_target_the_right_collection() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/folders/5"))
        .and(body_json(json!({ "name": "Renamed" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/files/6"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    api.rename(&session(), &EntryRef::folder("5"), "Renamed")
        .await
        .unwrap();
    api.delete(&session(), &EntryRef::file("6")).await.unwrap();
}

#[tokio::test]
async fn set_password_puts_code_and_clears_with_null() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/files/6/password"))
        .and(header("cookie", "ylogin=7; phpdisk_info=abc"))
        .and(body_json(json!({ "password": "ab12" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/v1/folders/5/password"))
        .and(body_json(json!({ "password": null })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    api.set_password(&session(), &EntryRef::file("6"), Some("ab12"))
        .await
        .unwrap();
    api.set_password(&session(), &EntryRef::folder("5"), Some(""))
        .await
        .unwrap();
}

#[tokio::test]
async fn overlong_file_code_is_refused_before_sending() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let err = api
        .set_password(&session(), &EntryRef::file("6"), Some("toolong7"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidArgument(_)));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn set_description_and_move_entry() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/v1/files/6"))
        .and(body_json(json!({ "description": "scanned copy" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/folders/5/move"))
        .and(body_json(json!({ "folder_id": "900" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/files/6/move"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such folder"))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    api.set_description(&session(), &EntryRef::file("6"), "scanned copy")
        .await
        .unwrap();
    api.move_entry(&session(), &EntryRef::folder("5"), &RemoteId::new("900"))
        .await
        .unwrap();
    let err = api
        .move_entry(&session(), &EntryRef::file("6"), &RemoteId::new("gone"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::NotFound("no such folder".into()));
}

#[tokio::test]
async fn error_statuses_map_to_typed_errors() {
    let server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/v1/files/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such file"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/folders/locked"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let err = api
        .delete(&session(), &EntryRef::file("missing"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::NotFound("no such file".into()));

    let err = api
        .list_folder(&session(), &RemoteId::new("locked"))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Forbidden(_)));
}

#[tokio::test]
async fn unreachable_gateway_is_a_network_error() {
    let api = HttpRemoteApi::with_base_url("http://127.0.0.1:1").unwrap();
    let err = api
        .list_folder(&session(), &RemoteId::root())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Network(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn resolve_share_link_passes_url_and_code() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/share"))
        .and(query_param("url", "https://www.lanzous.com/b0abc"))
        .and(query_param("pwd", "x1y2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "shared",
            "type": "folder",
            "description": "stuff",
            "items": [{ "id": "1", "name": "f.zip", "type": "file", "size": 10 }]
        })))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let link = ShareLink::parse("https://www.lanzous.com/b0abc", Some("x1y2")).unwrap();
    let info = api.resolve_share_link(&session(), &link).await.unwrap();

    assert_eq!(info.kind, EntryKind::Folder);
    assert_eq!(info.items.len(), 1);
}

#[tokio::test]
async fn upload_streams_body_to_transfer_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/folders/77/upload"))
        .and(query_param("name", "report.pdf"))
        .and(query_param("size", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/put/abc", server.uri()),
            "method": "PUT"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/put/abc"))
        .and(body_bytes(b"payload"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "f-1" })))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let body = stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"pay")),
        Ok(Bytes::from_static(b"load")),
    ])
    .boxed();
    let id = api
        .upload(&session(), &RemoteId::new("77"), "report.pdf", 7, body)
        .await
        .unwrap();

    assert_eq!(id, RemoteId::new("f-1"));
}

#[tokio::test]
async fn download_follows_transfer_link() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/files/12/download"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/blob/12", server.uri()),
            "name": "a.txt"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/12"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello"))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let download = api
        .download(&session(), &DownloadSource::File(RemoteId::new("12")))
        .await
        .unwrap();

    assert_eq!(download.file_name.as_deref(), Some("a.txt"));
    assert_eq!(download.size, Some(5));
    let chunks: Vec<Bytes> = download.body.try_collect().await.unwrap();
    assert_eq!(chunks.concat(), b"hello");
}

#[tokio::test]
async fn share_download_uses_share_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/share/download"))
        .and(query_param("url", "https://lanzoux.com/iqq1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": format!("{}/blob/qq1", server.uri()),
            "size": 3
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/blob/qq1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc"))
        .mount(&server)
        .await;

    let api = HttpRemoteApi::with_base_url(&server.uri()).unwrap();
    let link = ShareLink::parse("https://lanzoux.com/iqq1", None).unwrap();
    let download = api
        .download(&Session::anonymous(), &DownloadSource::Share(link))
        .await
        .unwrap();

    assert_eq!(download.size, Some(3));
    assert!(download.file_name.is_none());
}

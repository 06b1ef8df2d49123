use camup_core::{ApiErrorClass, RemoteClient, ResourceType};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn get_account_info_includes_oauth_header() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/disk"))
        .and(header("authorization", "OAuth test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total_space": 1024,
            "used_space": 256,
            "trash_size": 0,
            "is_paid": false
        })))
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "test-token").unwrap();
    let info = client.get_account_info().await.unwrap();

    assert_eq!(info.total_space, 1024);
    assert_eq!(info.used_space, 256);
    assert!(!info.is_paid);
}

#[tokio::test]
async fn rejected_token_is_classified_as_auth() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/disk"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "UnauthorizedError",
            "description": "Unauthorized"
        })))
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "stale-token").unwrap();
    let err = client.get_account_info().await.unwrap_err();

    assert_eq!(err.classification(), Some(ApiErrorClass::Auth));
}

#[tokio::test]
async fn list_directory_all_follows_total() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "disk:/"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "limit": 1,
                "offset": 0,
                "total": 2,
                "items": [
                    { "path": "disk:/Camera Uploads", "name": "Camera Uploads", "type": "dir" }
                ]
            }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "disk:/"))
        .and(query_param("offset", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {
                "limit": 1,
                "offset": 1,
                "total": 2,
                "items": [
                    { "path": "disk:/notes.txt", "name": "notes.txt", "type": "file", "size": 3 }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "test-token").unwrap();
    let items = client.list_directory_all("disk:/", 1, None).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].resource_type, ResourceType::Dir);
    assert_eq!(items[1].name, "notes.txt");
}

#[tokio::test]
async fn list_files_all_stops_on_short_page() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/disk/resources/files"))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "limit": 2,
            "offset": 0,
            "items": [
                { "path": "disk:/a.jpg", "name": "a.jpg", "type": "file", "size": 1, "sha256": "aa" },
                { "path": "disk:/b.jpg", "name": "b.jpg", "type": "file", "size": 2, "sha256": "bb" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/disk/resources/files"))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "limit": 2,
            "offset": 2,
            "items": [
                { "path": "disk:/Docs/c.jpg", "name": "c.jpg", "type": "file", "size": 3, "sha256": "cc" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "test-token").unwrap();
    let files = client.list_files_all(2, None).await.unwrap();

    assert_eq!(files.len(), 3);
    assert_eq!(files[2].path, "disk:/Docs/c.jpg");
}

#[tokio::test]
async fn create_folder_uses_put_and_returns_link() {
    let server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/v1/disk/resources"))
        .and(query_param("path", "disk:/Camera Uploads"))
        .and(header("authorization", "OAuth test-token"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "href": "https://cloud-api.yandex.net/v1/disk/resources?path=disk%3A%2FCamera%20Uploads",
            "method": "GET",
            "templated": false
        })))
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "test-token").unwrap();
    let link = client.create_folder("disk:/Camera Uploads").await.unwrap();

    assert_eq!(link.method, "GET");
}

#[tokio::test]
async fn get_upload_link_sends_overwrite_flag() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/disk/resources/upload"))
        .and(query_param("path", "disk:/Camera Uploads/a.jpg"))
        .and(query_param("overwrite", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "href": "https://upload.example/a.jpg",
            "method": "PUT",
            "templated": false
        })))
        .mount(&server)
        .await;

    let client = RemoteClient::with_base_url(&server.uri(), "test-token").unwrap();
    let link = client
        .get_upload_link("disk:/Camera Uploads/a.jpg", false)
        .await
        .unwrap();

    assert_eq!(link.href.as_str(), "https://upload.example/a.jpg");
    assert_eq!(link.method, "PUT");
}

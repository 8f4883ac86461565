//! Integration tests for module CRUD, count, search and file transfer

use serde_json::json;
use std::io::Read;
use sugar_client::{ModuleClient, SearchOptions, SugarClient, SugarError};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v10/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sugar-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

async fn client_for(server: &MockServer) -> SugarClient {
    mount_token_endpoint(server).await;
    SugarClient::new(server.uri()).with_username("admin").with_password("secret")
}

#[tokio::test]
async fn create_then_retrieve_round_trip() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("POST"))
        .and(path("/rest/v10/Contacts"))
        .and(header("OAuth-Token", "sugar-token"))
        .and(body_json(json!({"first_name": "Emmanuel", "last_name": "Dyan"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1234-abcd",
            "first_name": "Emmanuel",
            "last_name": "Dyan",
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v10/Contacts/1234-abcd"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1234-abcd",
            "first_name": "Emmanuel",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = module
        .create("Contacts", json!({"first_name": "Emmanuel", "last_name": "Dyan"}))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap();

    let fetched = module.retrieve("Contacts", id).await.unwrap();
    assert_eq!(fetched["first_name"], "Emmanuel");
}

#[tokio::test]
async fn update_sends_nulls_as_empty_strings() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("PUT"))
        .and(path("/rest/v10/Contacts/1234"))
        .and(body_json(json!({"first_name": "Emmanuel", "description": ""})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "1234"})))
        .expect(1)
        .mount(&server)
        .await;

    module
        .update("Contacts", "1234", json!({"first_name": "Emmanuel", "description": null}))
        .await
        .unwrap();
}

#[tokio::test]
async fn delete_issues_a_delete_on_the_record() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("DELETE"))
        .and(path("/rest/v10/Contacts/1234"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"id": "1234", "status": "deleted"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let body = module.delete("Contacts", "1234").await.unwrap();
    assert_eq!(body["status"], "deleted");
}

#[tokio::test]
async fn retrieve_page_paginates_the_collection() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Contacts"))
        .and(query_param("offset", "40"))
        .and(query_param("max_num", "20"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{"id": "41"}],
            "next_offset": 60,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = module.retrieve_page("Contacts", 40, 20).await.unwrap();
    assert_eq!(page["records"][0]["id"], "41");
}

#[tokio::test]
async fn count_posts_the_filter_and_coerces_the_answer() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    let filters = json!([{"last_name": {"$starts": "D"}}]);

    // SugarCRM is known to answer with a numeric string here
    Mock::given(method("POST"))
        .and(path("/rest/v10/Contacts/filter/count"))
        .and(body_json(json!({"filter": filters.clone()})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"record_count": "37"})))
        .expect(1)
        .mount(&server)
        .await;

    let count = module.count("Contacts", filters).await.unwrap();
    assert_eq!(count, 37);
}

#[tokio::test]
async fn count_without_a_record_count_is_a_protocol_error() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("POST"))
        .and(path("/rest/v10/Contacts/filter/count"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let err = module.count("Contacts", json!([])).await.unwrap_err();
    assert!(matches!(err, SugarError::Protocol(_)));
}

#[tokio::test]
async fn search_sends_the_filter_envelope() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("POST"))
        .and(path("/rest/v10/Contacts/filter"))
        .and(body_json(json!({
            "filter": [{"last_name": "Dyan"}],
            "max_num": 5,
            "offset": 10,
            "fields": "id,last_name",
            "order_by": "last_name",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [{"id": "1234", "last_name": "Dyan"}],
        })))
        .expect(1)
        .mount(&server)
        .await;

    let options = SearchOptions::default()
        .with_fields(["id", "last_name"])
        .with_offset(10)
        .with_max(5)
        .with_order_by("last_name");
    let found = module.search("Contacts", json!([{"last_name": "Dyan"}]), options).await.unwrap();
    assert_eq!(found["records"][0]["id"], "1234");
}

#[tokio::test]
async fn a_404_names_the_module_and_id_and_keeps_the_server_diagnostics() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Contacts/does-not-exist"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": "not_found",
            "error_message": "Could not find record: does-not-exist in module: Contacts",
        })))
        .mount(&server)
        .await;

    let err = module.retrieve("Contacts", "does-not-exist").await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "module Contacts or id does-not-exist not found");
    assert_eq!(err.error_key(), Some("not_found"));
    assert_eq!(
        err.error_message(),
        Some("Could not find record: does-not-exist in module: Contacts")
    );
}

#[tokio::test]
async fn a_422_surfaces_as_an_unexpected_status() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("POST"))
        .and(path("/rest/v10/Contacts"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "error": "invalid_parameter",
            "error_message": "Invalid field value",
        })))
        .mount(&server)
        .await;

    let err = module.create("Contacts", json!({"bad_field": 1})).await.unwrap_err();
    match &err {
        SugarError::UnexpectedStatus { got, expected, .. } => {
            assert_eq!(*got, 422);
            assert_eq!(*expected, 200);
        }
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
    assert_eq!(err.to_string(), "bad status, got 422 (Unprocessable Entity) instead of 200");
}

#[tokio::test]
async fn a_500_surfaces_as_a_server_error() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Contacts/1234"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "fatal_error",
            "error_message": "Database failure.",
        })))
        .mount(&server)
        .await;

    let err = module.retrieve("Contacts", "1234").await.unwrap_err();
    assert!(matches!(err, SugarError::Server { .. }));
    assert_eq!(err.error_message(), Some("Database failure."));
}

#[tokio::test]
async fn upload_posts_multipart_into_the_file_field() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("POST"))
        .and(path("/rest/v10/Notes/1234/file/filename"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "filename": {"name": "report.pdf"},
        })))
        .expect(1)
        .mount(&server)
        .await;

    let body = module
        .upload("Notes", "1234", "filename", b"%PDF-1.4 fake".to_vec(), "report.pdf")
        .await
        .unwrap();
    assert_eq!(body["filename"]["name"], "report.pdf");
}

#[tokio::test]
async fn download_returns_the_raw_bytes() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Notes/1234/file/filename"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(b"%PDF-1.4 fake".to_vec(), "application/pdf"),
        )
        .mount(&server)
        .await;

    let contents = module.download("Notes", "1234", "filename").await.unwrap();
    assert_eq!(contents, b"%PDF-1.4 fake");
}

#[tokio::test]
async fn download_to_writes_the_bytes_into_the_sink() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Notes/1234/file/filename"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(b"attached bytes".to_vec(), "text/plain"),
        )
        .mount(&server)
        .await;

    let mut target = tempfile::tempfile().unwrap();
    let written = module.download_to("Notes", "1234", "filename", &mut target).await.unwrap();
    assert_eq!(written, b"attached bytes".len());

    use std::io::Seek;
    target.rewind().unwrap();
    let mut round_trip = Vec::new();
    target.read_to_end(&mut round_trip).unwrap();
    assert_eq!(round_trip, b"attached bytes");
}

#[tokio::test]
async fn dropdown_lists_the_enum_values() {
    let server = MockServer::start().await;
    let client = client_for(&server).await;
    let module = ModuleClient::new(&client);

    Mock::given(method("GET"))
        .and(path("/rest/v10/Accounts/enum/industry"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Banking": "Banking",
            "Education": "Education",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let values = module.dropdown("Accounts", "industry").await.unwrap();
    assert_eq!(values["Banking"], "Banking");
}

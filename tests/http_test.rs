use callboard::config::Webhooks;
use callboard::model::FilterCriteria;
use callboard::retell::{ListCallsRequest, RetellClient, SortOrder};
use callboard::webhook::{DashboardRequest, WebhookCallsRequest, WebhookClient};
use reqwest::Url;
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn retell(server: &MockServer) -> RetellClient {
    let base = Url::parse(&format!("{}/", server.uri())).unwrap();
    RetellClient::with_base_url("key_1".into(), base).unwrap()
}

fn hooks(server: &MockServer) -> WebhookClient {
    WebhookClient::from_config(&Webhooks {
        identity_url: format!("{}/identity", server.uri()),
        calls_url: format!("{}/calls", server.uri()),
        dashboard_url: format!("{}/dashboard", server.uri()),
        agendas_url: format!("{}/agendas", server.uri()),
    })
    .unwrap()
}

#[tokio::test]
async fn list_calls_posts_cursor_with_bearer_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/list-calls"))
        .and(header("authorization", "Bearer key_1"))
        .and(body_partial_json(json!({
            "limit": 1000,
            "pagination_key": "call_prev",
            "sort_order": "descending"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "call_id": "call_a", "duration": 61000 },
            { "call_id": "call_b" }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let res = retell(&server)
        .list_calls(&ListCallsRequest {
            limit: 1000,
            pagination_key: Some("call_prev".into()),
            sort_order: SortOrder::Descending,
            filter_criteria: FilterCriteria::default(),
        })
        .await
        .unwrap();
    assert_eq!(res.calls.len(), 2);
    assert_eq!(res.pagination_key.as_deref(), Some("call_b"));
    assert_eq!(res.calls[0].duration_seconds(), Some(61));
}

#[tokio::test]
async fn non_success_status_reports_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list-phone-numbers"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = retell(&server).list_phone_numbers().await.unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("500"), "{}", msg);
    assert!(msg.contains("upstream down"), "{}", msg);
}

#[tokio::test]
async fn malformed_listing_is_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list-batch-call"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "unexpected": true })))
        .mount(&server)
        .await;

    assert!(retell(&server).list_batch_calls().await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_batch_call_accepts_no_content() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/delete-batch-call/batch_9"))
        .and(header("authorization", "Bearer key_1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    retell(&server).delete_batch_call("batch_9").await.unwrap();
}

#[tokio::test]
async fn identity_webhook_resolves_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/identity"))
        .and(body_json(json!({ "email": "ana@example.com" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 1, "email": "ana@example.com", "client_id": "client_7", "api_key": "key_ana" }
        ])))
        .mount(&server)
        .await;

    let creds = hooks(&server)
        .resolve_client(" ana@example.com ")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(creds.client_id, "client_7");
    assert_eq!(creds.api_key, "key_ana");
}

#[tokio::test]
async fn calls_webhook_sends_paging_fields() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calls"))
        .and(body_partial_json(json!({ "per_page": 50, "page": 3, "client_id": "client_7" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "llamadas": [{ "call_id": "a" }],
            "total_paginas": 3,
            "total_llamadas": 101
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let page = hooks(&server)
        .list_calls_page(&WebhookCallsRequest {
            per_page: 50,
            page: 3,
            client_id: "client_7".into(),
            fecha_inicio: None,
            fecha_fin: None,
        })
        .await
        .unwrap();
    assert_eq!(page.calls.len(), 1);
    assert_eq!(page.total_pages, Some(3));
    assert_eq!(page.total_calls, Some(101));
}

#[tokio::test]
async fn dashboard_webhook_empty_body_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/dashboard"))
        .and(body_json(json!({ "client_id": "client_7" })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let data = hooks(&server)
        .dashboard(&DashboardRequest {
            client_id: "client_7".into(),
            fecha_inicio: None,
            fecha_fin: None,
        })
        .await
        .unwrap();
    assert!(data.is_none());
}

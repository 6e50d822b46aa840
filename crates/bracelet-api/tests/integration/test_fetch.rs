//! Integration tests for the generic REST verbs
//!
//! - Search with default limit, filters and item transformation
//! - Following pagination links, empty pages
//! - Mutation status handling (201, 204)
//! - Structured error bodies
//! - Authorization header injection

use bracelet_api::controller::BaseController;
use bracelet_api::fetch::{Fetch, MutationResult, RequestOptions};
use bracelet_api::transformer::Identity;
use bracelet_api::ApiError;
use bracelet_core::domain::{FilterTerm, Patient, QueryParams, SortTerm};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_search_applies_default_limit_and_transforms_items() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(query_param("q", "gender.EQ:'female'"))
        .and(query_param("sort_by", "code:ASC"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"id": 1, "code": "P-1", "birth_date": "1958-04-03"},
                {"id": 2, "code": "P-2"}
            ],
            "first": format!("{}/patients?limit=50&offset=0", server.uri()),
            "next": format!("{}/patients?limit=50&offset=50", server.uri()),
            "previous": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let params = QueryParams::new()
        .with_q(FilterTerm::eq("gender", "female"))
        .with_sort(vec![SortTerm::asc("code")]);
    let page = patients.search(params).await.expect("search failed");

    assert_eq!(page.items.len(), 2);
    assert_eq!(page.items[0].code.as_deref(), Some("P-1"));
    assert_eq!(page.items[1].id, Some(2));
    assert!(page.next.as_deref().unwrap().ends_with("offset=50"));
    assert!(page.previous.is_none());
}

#[tokio::test]
async fn test_search_follows_next_link() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(query_param("offset", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"id": 51, "code": "P-51"}],
            "first": null,
            "next": null,
            "previous": format!("{}/patients?limit=50&offset=0", server.uri())
        })))
        .expect(1)
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let link = format!("{}/patients?limit=50&offset=50", server.uri());
    let page = patients.page(&link).await.expect("page failed");

    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].id, Some(51));
    assert!(page.next.is_none());
}

#[tokio::test]
async fn test_empty_page_yields_empty_results() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/patients"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let link = format!("{}/patients?offset=100", server.uri());
    let page = patients.page(&link).await.expect("empty page failed");
    assert!(page.items.is_empty());
    assert!(page.next.is_none());
}

#[tokio::test]
async fn test_caller_limit_is_kept() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/patients"))
        .and(query_param("limit", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let page = patients
        .search(QueryParams::new().with_limit(5))
        .await
        .expect("search failed");
    assert!(page.items.is_empty());
}

#[tokio::test]
async fn test_post_created_and_put_no_content() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/patients"))
        .and(header("content-type", "application/json"))
        .and(body_json(serde_json::json!({"code": "P-9"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "id": 9,
            "code": "P-9"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/patients/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("DELETE"))
        .and(path("/patients/9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let new_patient = Patient {
        code: Some("P-9".into()),
        ..Default::default()
    };

    let created = patients.post(&new_patient).await.expect("post failed");
    let created = created.into_item().expect("expected a body");
    assert_eq!(created.id, Some(9));

    let updated = patients.put(9, &created).await.expect("put failed");
    assert!(updated.is_no_content());

    patients.delete(9).await.expect("delete failed");
}

#[tokio::test]
async fn test_patch_sends_partial_body() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/patients/4"))
        .and(body_json(serde_json::json!({"weight": 71.5})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 4,
            "weight": 71.5
        })))
        .expect(1)
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let result = patients
        .patch(4, serde_json::json!({"weight": 71.5}))
        .await
        .expect("patch failed");
    match result {
        MutationResult::Item(patient) => assert_eq!(patient.weight, Some(71.5)),
        MutationResult::NoContent => panic!("expected a body"),
    }
}

#[tokio::test]
async fn test_error_body_is_attached_to_http_error() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("POST"))
        .and(path("/patients"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "code": 2000,
            "type": "duplicated",
            "msg": "patient code already exists",
            "loc": ["body", "code"]
        })))
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let err = patients
        .post(&Patient::default())
        .await
        .expect_err("expected a conflict");

    assert_eq!(err.status(), Some(409));
    assert_eq!(err.entity(), Some("patient"));
    let ctx = err.api_ctx().expect("missing api context");
    assert_eq!(ctx.code, Some(2000));
    assert_eq!(ctx.message.as_deref(), Some("patient code already exists"));
}

#[tokio::test]
async fn test_get_not_found_without_body() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/patients/404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let patients = BaseController::<Patient>::new(api, None);
    let err = patients
        .get(404, QueryParams::new())
        .await
        .expect_err("expected not found");
    assert!(matches!(
        err,
        ApiError::HttpStatus {
            status: 404,
            api_ctx: None,
            ..
        }
    ));
}

#[tokio::test]
async fn test_session_token_is_sent_as_bearer() {
    let (server, api) = common::setup_api_mock().await;
    let token = common::token(5, 3600, Some("refresh-1"));
    let expected = token.authorization();
    let (session, _) = common::session_with(&api, Some(token)).await;

    Mock::given(method("GET"))
        .and(path("/alarms/3"))
        .and(header("authorization", expected.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 3})))
        .expect(1)
        .mount(&server)
        .await;

    let fetch = Fetch::new(api, "/alarms", "alarms").with_auth(session);
    let alarm = fetch
        .get(3, &RequestOptions::new(), &Identity)
        .await
        .expect("get failed");
    assert_eq!(alarm["id"], 3);
}

#[tokio::test]
async fn test_authenticated_fetch_without_session_fails_before_request() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, None).await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let fetch = Fetch::new(api, "/alarms", "alarms").with_auth(session);
    let err = fetch
        .get(3, &RequestOptions::new(), &Identity)
        .await
        .expect_err("expected invalid token");
    assert!(matches!(err, ApiError::InvalidToken));
}

#[tokio::test]
async fn test_delete_ignores_query_parameters() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("DELETE"))
        .and(path("/patients/4/studies"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let fetch = Fetch::new(api, "/patients", "patient");
    let opts = RequestOptions::new()
        .extra_path("/studies")
        .params(QueryParams::new().with_limit(3));
    fetch.delete(4, &opts).await.expect("delete failed");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.query(), None);
}

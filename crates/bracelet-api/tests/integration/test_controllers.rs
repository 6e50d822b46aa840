//! Integration tests for the entity controllers

use std::sync::Arc;

use bracelet_api::blob::BlobStorage;
use bracelet_api::controller::{
    AlarmsController, InstrumentsController, PasswordsController, PatientsController,
    StudiesController, UsersController,
};
use bracelet_core::config::UploadConfig;
use bracelet_core::domain::{PasswordChange, PathologyLink, QueryParams, User};
use chrono::NaiveDate;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_permissions_use_max_page_size() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;

    Mock::given(method("GET"))
        .and(path("/permissions"))
        .and(query_param("limit", "500"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [
                {"entity_name": "patient", "read": true, "write": true},
                {"entity_name": "user", "read": true}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/users/allowed-roles"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"name": "doctor"}, {"name": "patient"}]
        })))
        .mount(&server)
        .await;

    let users = UsersController::new(api, Some(session));
    let permissions = users
        .get_permissions(QueryParams::new())
        .await
        .expect("permissions failed");
    assert_eq!(permissions.items.len(), 2);
    assert!(permissions.items[0].write);
    assert!(!permissions.items[1].write);

    let roles = users.get_user_roles().await.expect("roles failed");
    let names: Vec<&str> = roles.items.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["doctor", "patient"]);
}

#[tokio::test]
async fn test_change_password_and_activate() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;
    let activation = common::token(21, 3600, None);

    Mock::given(method("PUT"))
        .and(path("/users/5/password"))
        .and(body_json(serde_json::json!({"old_password": "a", "new_password": "b"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/users/21/activate"))
        .and(header("authorization", activation.authorization().as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 21})))
        .expect(1)
        .mount(&server)
        .await;

    let users = UsersController::new(api, Some(session));
    users
        .change_password(
            5,
            &PasswordChange {
                old_password: "a".into(),
                new_password: "b".into(),
            },
        )
        .await
        .expect("change password failed");

    let user = User {
        password: Some("first-password".into()),
        ..Default::default()
    };
    users.activate(&activation, &user).await.expect("activate failed");
}

#[tokio::test]
async fn test_patient_lookups_and_pathology_links() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;

    Mock::given(method("GET"))
        .and(path("/patients/gender-types"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"name": "female"}, {"name": "male"}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/patients/myinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": 44,
            "code": "P-44"
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/patient-pathologies/multi"))
        .and(body_json(serde_json::json!({
            "patient_id": 44,
            "pathologies": [{"id": 2, "detection_date": "2024-01-10"}, {"id": 3}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
            {"id": 100, "patient_id": 44, "pathology_id": 2},
            {"id": 101, "patient_id": 44, "pathology_id": 3}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let patients = PatientsController::new(api, Some(session));
    let genders = patients.gender_types().await.expect("genders failed");
    assert_eq!(genders.items.len(), 2);

    let me = patients.my_info().await.expect("my info failed");
    assert_eq!(me.code.as_deref(), Some("P-44"));

    let links = patients
        .multi_link_pathologies(
            44,
            vec![
                PathologyLink {
                    id: 2,
                    detection_date: NaiveDate::from_ymd_opt(2024, 1, 10),
                },
                PathologyLink {
                    id: 3,
                    detection_date: None,
                },
            ],
        )
        .await
        .expect("multi link failed");
    assert_eq!(links.len(), 2);
    assert_eq!(links[1].pathology_id, Some(3));
}

#[tokio::test]
async fn test_study_dates_and_patient_alarms() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;

    Mock::given(method("GET"))
        .and(path("/studies/dates"))
        .and(query_param("patient_id", "44"))
        .and(query_param("cursor", "c1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{
                "studyDate": "2025-05-26",
                "count": 12,
                "firstTime": "08:00:00",
                "lastTime": "20:00:00",
                "lastStepCount": 900
            }],
            "cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/alarms"))
        .and(query_param("patient_id", "44"))
        .and(query_param("offset", "20"))
        .and(query_param("limit", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "items": [{"id": 1, "patient_id": 44, "is_urgent": true}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let studies = StudiesController::new(api.clone(), Some(session.clone()));
    let page = studies
        .list_study_dates(44, Some("c1"))
        .await
        .expect("study dates failed");
    assert_eq!(page.items[0].count, 12);
    assert!(page.cursor.is_none());

    let alarms = AlarmsController::new(api, Some(session));
    let page = alarms
        .search_by_patient(44, 20, 10)
        .await
        .expect("alarms failed");
    assert!(page.items[0].is_urgent);
}

#[tokio::test]
async fn test_password_reset_flow_is_anonymous() {
    let (server, api) = common::setup_api_mock().await;

    Mock::given(method("GET"))
        .and(path("/password/reset"))
        .and(query_param("email", "ana+1@clinic.test"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/password/reset"))
        .and(query_param("email", "nobody@clinic.test"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/password/edit"))
        .and(query_param("token", "t0k"))
        .and(body_json(serde_json::json!({"password": "n3w"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let passwords = PasswordsController::new(api);
    passwords.reset("ana+1@clinic.test").await.expect("reset failed");

    let err = passwords.reset("nobody@clinic.test").await.unwrap_err();
    assert_eq!(err.entity(), Some("email"));
    assert_eq!(err.status(), Some(404));

    passwords.save_password("t0k", "n3w").await.expect("save failed");
}

#[tokio::test]
async fn test_instrument_file_lifecycle() {
    let (server, api) = common::setup_api_mock().await;
    let (session, _) = common::session_with(&api, Some(common::token(5, 3600, None))).await;
    let storage_url = format!("{}/bucket/manual.pdf", server.uri());

    Mock::given(method("POST"))
        .and(path("/instruments/bs-signed-url"))
        .and(body_json(serde_json::json!({"filename": "manual.pdf", "num_parts": 1})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "urls": [format!("{storage_url}?sig=put")],
            "display_url": format!("{storage_url}?sig=get"),
            "reserved_id": 8
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/bucket/manual.pdf"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"e1\""))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/instruments/8/bs-signed-url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "delete_url": format!("{storage_url}?sig=del")
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/bucket/manual.pdf"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let instruments = InstrumentsController::new(
        api,
        Some(session),
        BlobStorage::new(UploadConfig::default()),
    );
    let (signed, result) = instruments
        .upload_file("manual.pdf", Arc::new(b"%PDF-1.7".to_vec()), None)
        .await
        .expect("upload failed");
    assert_eq!(signed.reserved_id, Some(8));
    assert_eq!(result.blob_url, storage_url);
    assert_eq!(result.etag.as_deref(), Some("e1"));

    instruments.delete_file(8).await.expect("delete failed");
}

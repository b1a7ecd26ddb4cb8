mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tower::ServiceExt;

use calendar_cell::{CalendarAccess, WatchChannel};
use session_sync_cell::{
    import_routes, session_routes, watch_routes, webhook_routes, NewSession, SessionStatus,
    SessionStore, StoreTransaction, SyncState,
};
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

use common::{fixture, timed_event, Fixture, MockCalendar, CALENDAR_ID, CHANNEL_ID};

fn state(fx: &Fixture, calendar: MockCalendar) -> Arc<SyncState> {
    Arc::new(SyncState::new(
        fx.store.clone(),
        Arc::new(calendar),
        fx.clock.clone(),
        Some("https://lvnotas.example.com/webhook".to_string()),
    ))
}

fn bearer() -> String {
    let token = JwtTestUtils::create_test_token(
        &TestUser::therapist("ana@lvnotas.com"),
        &TestConfig::default().jwt_secret,
        Some(1),
    );
    format!("Bearer {}", token)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn insert_session(fx: &Fixture, event_id: &str, date: chrono::DateTime<Utc>) -> uuid::Uuid {
    let patient = fx.add_patient("Paula Teixeira", Some("pat@x.com")).await;
    let mut tx = fx.store.begin().await.unwrap();
    let session = tx
        .insert_session(&NewSession {
            therapist_id: fx.therapist.id,
            patient_id: patient.id,
            date,
            google_event_id: event_id.to_string(),
            status: SessionStatus::Agendada,
            session_price: Some(patient.session_price),
        })
        .await
        .unwrap();
    tx.commit().await.unwrap();
    session.id
}

fn webhook_request(state: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("X-Goog-Channel-ID", CHANNEL_ID)
        .header("X-Goog-Resource-ID", "resource-1")
        .header("X-Goog-Resource-State", state)
        .header("X-Goog-Message-Number", "7")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_webhook_acknowledges_and_reconciles_in_background() {
    let fx = fixture().await;
    fx.add_patient("Paula Teixeira", Some("pat@x.com")).await;

    let mut calendar = MockCalendar::new();
    calendar.expect_recently_updated_events().times(1).returning(|_, _, _| {
        Ok(vec![timed_event("evt1", "confirmed", "2025-03-01T10:00:00Z", "pat@x.com")])
    });
    let app = webhook_routes(state(&fx, calendar));

    let response = app.oneshot(webhook_request("exists")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");

    let mut sessions = Vec::new();
    for _ in 0..50 {
        sessions = fx.store.sessions().await;
        if !sessions.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].google_event_id.as_deref(), Some("evt1"));
}

#[tokio::test]
async fn test_webhook_always_answers_ok() {
    let fx = fixture().await;
    let mut calendar = MockCalendar::new();
    calendar.expect_recently_updated_events().never();
    let app = webhook_routes(state(&fx, calendar));

    let response = app.clone().oneshot(webhook_request("sync")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bare = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(bare).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_session_routes_require_auth() {
    let fx = fixture().await;
    let app = session_routes(TestConfig::default().to_arc(), state(&fx, MockCalendar::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/?therapist_id={}&start=2025-03-01&end=2025-03-31", fx.therapist.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_sessions_applies_auto_check_in() {
    let fx = fixture().await;
    insert_session(&fx, "evt-past", Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()).await;
    insert_session(&fx, "evt-future", Utc.with_ymd_and_hms(2025, 3, 20, 10, 0, 0).unwrap()).await;
    let app = session_routes(TestConfig::default().to_arc(), state(&fx, MockCalendar::new()));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/?therapist_id={}&start=2025-03-01&end=2025-03-31", fx.therapist.id))
                .header("Authorization", bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["sessions"][0]["google_event_id"], "evt-past");
    assert_eq!(body["sessions"][0]["status"], "agendada");
    assert_eq!(body["sessions"][0]["effective_status"], "compareceu");
    assert_eq!(body["sessions"][0]["auto_checked_in"], true);
    assert_eq!(body["sessions"][1]["effective_status"], "agendada");

    // Read time only
    assert!(fx
        .store
        .sessions()
        .await
        .iter()
        .all(|s| s.status == SessionStatus::Agendada));
}

#[tokio::test]
async fn test_status_update_validates_transition() {
    let fx = fixture().await;
    let session_id = insert_session(&fx, "evt1", Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()).await;
    let app = session_routes(TestConfig::default().to_arc(), state(&fx, MockCalendar::new()));

    let patch = |status: &str| {
        Request::builder()
            .method("PATCH")
            .uri(format!("/{}/status", session_id))
            .header("Authorization", bearer())
            .header("Content-Type", "application/json")
            .body(Body::from(json!({ "status": status }).to_string()))
            .unwrap()
    };

    let response = app.clone().oneshot(patch("cancelada")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelada");

    let response = app.oneshot(patch("compareceu")).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = fx.store.find_session(session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Cancelada);
}

#[tokio::test]
async fn test_calendar_only_events_excludes_known_and_cancelled() {
    let fx = fixture().await;
    insert_session(&fx, "evt-known", Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap()).await;

    let mut calendar = MockCalendar::new();
    calendar
        .expect_list_events()
        .withf(|calendar_id, time_min, time_max, access| {
            calendar_id == CALENDAR_ID
                && *time_min == Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
                && *time_max == Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap()
                && *access == CalendarAccess::ServiceAccount
        })
        .returning(|_, _, _, _| {
            Ok(vec![
                timed_event("evt-known", "confirmed", "2025-03-03T10:00:00Z", "pat@x.com"),
                timed_event("evt-new", "confirmed", "2025-03-04T10:00:00Z", "pat@x.com"),
                timed_event("evt-dropped", "cancelled", "2025-03-05T10:00:00Z", "pat@x.com"),
            ])
        });
    let app = session_routes(TestConfig::default().to_arc(), state(&fx, calendar));

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/calendar-only?therapist_id={}&start=2025-03-01&end=2025-03-31",
                    fx.therapist.id
                ))
                .header("Authorization", bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["events"][0]["id"], "evt-new");
}

#[tokio::test]
async fn test_create_and_stop_watch_channel() {
    let fx = fixture().await;

    let mut calendar = MockCalendar::new();
    calendar
        .expect_watch_calendar()
        .withf(|calendar_id, _, webhook_url| {
            calendar_id == CALENDAR_ID && webhook_url == "https://lvnotas.example.com/webhook"
        })
        .times(1)
        .returning(|calendar_id, channel_id, _| {
            Ok(WatchChannel {
                channel_id: channel_id.to_string(),
                resource_id: "resource-2".to_string(),
                calendar_id: calendar_id.to_string(),
                expiration: Some(Utc.with_ymd_and_hms(2025, 3, 17, 12, 0, 0).unwrap()),
            })
        });
    calendar
        .expect_stop_channel()
        .withf(|_, resource_id| resource_id == "resource-2")
        .times(1)
        .returning(|_, _| Ok(()));

    let app: Router = watch_routes(TestConfig::default().to_arc(), state(&fx, calendar));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/watch")
                .header("Authorization", bearer())
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "therapist_id": fx.therapist.id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let channel_id = body["channel_id"].as_str().unwrap().to_string();
    assert_eq!(fx.store.watch_channels().await.len(), 2);

    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/watch/{}", channel_id))
                .header("Authorization", bearer())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let remaining = fx.store.watch_channels().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].channel_id, CHANNEL_ID);
}

#[tokio::test]
async fn test_import_patient_route() {
    let fx = fixture().await;
    let app = import_routes(TestConfig::default().to_arc(), state(&fx, MockCalendar::new()));

    let payload = json!({
        "therapist_id": fx.therapist.id,
        "name": "Maria Souza",
        "email": "maria@example.com",
        "phone": null,
        "session_price": 18000,
        "therapy_start_date": null,
        "billing_start_date": "2025-01-01",
        "sessions": [
            { "date": "2025-02-03T10:00:00Z", "google_event_id": "evt1", "status": "compareceu" },
            { "date": "2025-02-10T10:00:00Z", "google_event_id": "evt2", "status": "compareceu" }
        ]
    });

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/patient")
                .header("Authorization", bearer())
                .header("Content-Type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_sessions"], 2);
    assert!(body["patient_id"].is_string());
    assert_eq!(fx.store.sessions().await.len(), 2);
}

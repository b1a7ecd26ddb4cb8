// Runs against a real PostgreSQL database when DATABASE_URL is set.
use assert_matches::assert_matches;
use chrono::{TimeZone, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use patient_cell::PatientDraft;
use session_sync_cell::{
    NewSession, PaymentStatus, PgSessionStore, SessionStatus, SessionStore, StoreError,
    StoreTransaction,
};

async fn database() -> Option<PgPool> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        println!("Skipping PostgreSQL store tests (set DATABASE_URL to enable)");
        return None;
    };
    let pool = PgPool::connect(&url).await.unwrap();
    shared_database::run_migrations(&pool).await.unwrap();
    Some(pool)
}

async fn therapist(pool: &PgPool) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO therapists (id, name, email, google_calendar_id) VALUES ($1, $2, $3, $3)")
        .bind(id)
        .bind("Ana Lima")
        .bind(format!("{}@lvnotas.com", id))
        .execute(pool)
        .await
        .unwrap();
    id
}

fn draft(therapist_id: Uuid, name: &str, email: Option<&str>, price: Option<i64>) -> PatientDraft {
    PatientDraft {
        therapist_id,
        name: name.to_string(),
        email: email.map(str::to_string),
        phone: None,
        session_price: price,
        therapy_start_date: None,
        billing_start_date: None,
    }
}

#[tokio::test]
async fn test_upsert_session_reports_insert_and_keeps_status() {
    let Some(pool) = database().await else { return };
    let therapist_id = therapist(&pool).await;
    let store = PgSessionStore::new(pool);
    let event_id = format!("evt-{}", Uuid::new_v4());

    let mut tx = store.begin().await.unwrap();
    let patient = tx
        .upsert_patient(&draft(therapist_id, "Maria Souza", Some("maria@example.com"), Some(18000)))
        .await
        .unwrap();
    let new_session = NewSession {
        therapist_id,
        patient_id: patient.id,
        date: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
        google_event_id: event_id,
        status: SessionStatus::Agendada,
        session_price: Some(18000),
    };
    let (first, inserted) = tx.upsert_session(&new_session).await.unwrap();
    assert!(inserted);
    tx.set_session_status(first.id, SessionStatus::Compareceu).await.unwrap();

    let moved = NewSession {
        date: Utc.with_ymd_and_hms(2025, 3, 4, 10, 0, 0).unwrap(),
        session_price: Some(25000),
        ..new_session
    };
    let (second, inserted) = tx.upsert_session(&moved).await.unwrap();
    tx.commit().await.unwrap();

    assert!(!inserted);
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, SessionStatus::Compareceu);
    assert_eq!(second.session_price, Some(18000));
    assert_eq!(second.date, moved.date);
}

#[tokio::test]
async fn test_duplicate_insert_is_constraint_violation_and_rolls_back() {
    let Some(pool) = database().await else { return };
    let therapist_id = therapist(&pool).await;
    let store = PgSessionStore::new(pool);
    let event_id = format!("evt-{}", Uuid::new_v4());

    let mut tx = store.begin().await.unwrap();
    let patient = tx
        .upsert_patient(&draft(therapist_id, "João Lima", None, None))
        .await
        .unwrap();
    let session = NewSession {
        therapist_id,
        patient_id: patient.id,
        date: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
        google_event_id: event_id.clone(),
        status: SessionStatus::Agendada,
        session_price: Some(patient.session_price),
    };
    tx.insert_session(&session).await.unwrap();

    assert_matches!(
        tx.insert_session(&session).await,
        Err(StoreError::ConstraintViolation(_))
    );
    drop(tx);

    assert!(store.find_session_by_event_id(&event_id).await.unwrap().is_none());
    assert!(store.patients_for_therapist(therapist_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_patient_upsert_merges_by_email() {
    let Some(pool) = database().await else { return };
    let therapist_id = therapist(&pool).await;
    let store = PgSessionStore::new(pool);

    let mut tx = store.begin().await.unwrap();
    let mut first = draft(therapist_id, "Maria Souza", Some("Maria@Example.com"), Some(18000));
    first.phone = Some("+55 11 99999-0000".to_string());
    let created = tx.upsert_patient(&first).await.unwrap();
    let merged = tx
        .upsert_patient(&draft(therapist_id, "Maria S. Souza", Some("maria@example.com"), None))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(merged.id, created.id);
    assert_eq!(merged.name, "Maria S. Souza");
    assert_eq!(merged.email.as_deref(), Some("maria@example.com"));
    assert_eq!(merged.phone.as_deref(), Some("+55 11 99999-0000"));
    assert_eq!(merged.session_price, 18000);
    assert_eq!(store.patients_for_therapist(therapist_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_payment_status_round_trips_through_enum() {
    let Some(pool) = database().await else { return };
    let therapist_id = therapist(&pool).await;
    let store = PgSessionStore::new(pool);
    let event_id = format!("evt-{}", Uuid::new_v4());

    let mut tx = store.begin().await.unwrap();
    let patient = tx
        .upsert_patient(&draft(therapist_id, "Paula Teixeira", Some("paula@example.com"), Some(20000)))
        .await
        .unwrap();
    let session = tx
        .insert_session(&NewSession {
            therapist_id,
            patient_id: patient.id,
            date: Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
            google_event_id: event_id,
            status: SessionStatus::Cancelada,
            session_price: Some(20000),
        })
        .await
        .unwrap();
    tx.set_payment_status(session.id, Some(PaymentStatus::NotBilled)).await.unwrap();
    tx.commit().await.unwrap();

    let stored = store.find_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Cancelada);
    assert_eq!(stored.payment_status, Some(PaymentStatus::NotBilled));
}

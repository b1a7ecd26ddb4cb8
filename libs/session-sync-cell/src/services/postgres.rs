// libs/session-sync-cell/src/services/postgres.rs
use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use patient_cell::{Patient, PatientDraft, Therapist};

use crate::error::StoreError;
use crate::models::{
    CalendarEventLog, NewSession, PaymentStatus, Session, SessionStatus, SessionUpdate,
    StoredWatchChannel,
};
use crate::services::store::{SessionStore, StoreTransaction};

const SESSION_COLUMNS: &str = "id, therapist_id, patient_id, date, google_event_id, status, \
     payment_status, session_price, created_at, updated_at";

const PATIENT_COLUMNS: &str = "id, therapist_id, name, email, phone, session_price, \
     therapy_start_date, billing_start_date, created_at, updated_at";

/// PostgreSQL-backed session storage.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find_therapist(&self, therapist_id: Uuid) -> Result<Option<Therapist>, StoreError> {
        let therapist = sqlx::query_as::<_, Therapist>(
            "SELECT id, name, email, google_calendar_id FROM therapists WHERE id = $1",
        )
        .bind(therapist_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(therapist)
    }

    async fn find_therapist_by_calendar(&self, calendar_id: &str) -> Result<Option<Therapist>, StoreError> {
        let therapist = sqlx::query_as::<_, Therapist>(
            "SELECT id, name, email, google_calendar_id FROM therapists WHERE google_calendar_id = $1",
        )
        .bind(calendar_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(therapist)
    }

    async fn find_watch_channel(&self, channel_id: &str) -> Result<Option<StoredWatchChannel>, StoreError> {
        let channel = sqlx::query_as::<_, StoredWatchChannel>(
            r#"
            SELECT channel_id, resource_id, calendar_id, therapist_id, expiration
            FROM calendar_watch_channels
            WHERE channel_id = $1
            "#,
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(channel)
    }

    async fn patients_for_therapist(&self, therapist_id: Uuid) -> Result<Vec<Patient>, StoreError> {
        let patients = sqlx::query_as::<_, Patient>(&format!(
            "SELECT {} FROM patients WHERE therapist_id = $1 ORDER BY created_at, id",
            PATIENT_COLUMNS
        ))
        .bind(therapist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(patients)
    }

    async fn find_session(&self, session_id: Uuid) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn find_session_by_event_id(&self, google_event_id: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE google_event_id = $1",
            SESSION_COLUMNS
        ))
        .bind(google_event_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    async fn sessions_in_range(
        &self,
        therapist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>, StoreError> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE therapist_id = $1 AND date >= $2 AND date < $3 ORDER BY date, id",
            SESSION_COLUMNS
        ))
        .bind(therapist_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }

    async fn existing_event_ids(&self, google_event_ids: &[String]) -> Result<HashSet<String>, StoreError> {
        if google_event_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT google_event_id FROM sessions WHERE google_event_id = ANY($1)",
        )
        .bind(google_event_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }
}

#[derive(sqlx::FromRow)]
struct UpsertedSession {
    #[sqlx(flatten)]
    session: Session,
    inserted: bool,
}

pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn find_session_by_event_id(&mut self, google_event_id: &str) -> Result<Option<Session>, StoreError> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE google_event_id = $1 FOR UPDATE",
            SESSION_COLUMNS
        ))
        .bind(google_event_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(session)
    }

    async fn insert_session(&mut self, session: &NewSession) -> Result<Session, StoreError> {
        let inserted = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (id, therapist_id, patient_id, date, google_event_id, status, session_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(session.therapist_id)
        .bind(session.patient_id)
        .bind(session.date)
        .bind(&session.google_event_id)
        .bind(session.status)
        .bind(session.session_price)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(inserted)
    }

    async fn upsert_session(&mut self, session: &NewSession) -> Result<(Session, bool), StoreError> {
        let upserted = sqlx::query_as::<_, UpsertedSession>(&format!(
            r#"
            INSERT INTO sessions (id, therapist_id, patient_id, date, google_event_id, status, session_price)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (google_event_id) DO UPDATE SET
                therapist_id = EXCLUDED.therapist_id,
                patient_id = EXCLUDED.patient_id,
                date = EXCLUDED.date,
                updated_at = now()
            RETURNING {}, (xmax = 0) AS inserted
            "#,
            SESSION_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(session.therapist_id)
        .bind(session.patient_id)
        .bind(session.date)
        .bind(&session.google_event_id)
        .bind(session.status)
        .bind(session.session_price)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok((upserted.session, upserted.inserted))
    }

    async fn update_session(&mut self, session_id: Uuid, update: &SessionUpdate) -> Result<Session, StoreError> {
        let updated = sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions SET
                therapist_id = $2,
                patient_id = $3,
                date = $4,
                google_event_id = $5,
                status = COALESCE($6, status),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(update.therapist_id)
        .bind(update.patient_id)
        .bind(update.date)
        .bind(&update.google_event_id)
        .bind(update.status)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    async fn set_session_status(&mut self, session_id: Uuid, status: SessionStatus) -> Result<Session, StoreError> {
        let updated = sqlx::query_as::<_, Session>(&format!(
            "UPDATE sessions SET status = $2, updated_at = now() WHERE id = $1 RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .bind(status)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(updated)
    }

    async fn set_payment_status(
        &mut self,
        session_id: Uuid,
        payment_status: Option<PaymentStatus>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE sessions SET payment_status = $2, updated_at = now() WHERE id = $1",
        )
        .bind(session_id)
        .bind(payment_status)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("session {}", session_id)));
        }
        Ok(())
    }

    async fn upsert_patient(&mut self, draft: &PatientDraft) -> Result<Patient, StoreError> {
        if let Some(email) = draft.normalized_email() {
            let patient = sqlx::query_as::<_, Patient>(&format!(
                r#"
                INSERT INTO patients (id, therapist_id, name, email, phone, session_price,
                                      therapy_start_date, billing_start_date)
                VALUES ($1, $2, $3, $4, $5, COALESCE($6, 0), $7, $8)
                ON CONFLICT (therapist_id, email) DO UPDATE SET
                    name = EXCLUDED.name,
                    phone = COALESCE(EXCLUDED.phone, patients.phone),
                    session_price = COALESCE($6, patients.session_price),
                    therapy_start_date = COALESCE(EXCLUDED.therapy_start_date, patients.therapy_start_date),
                    billing_start_date = COALESCE(EXCLUDED.billing_start_date, patients.billing_start_date),
                    updated_at = now()
                RETURNING {}
                "#,
                PATIENT_COLUMNS
            ))
            .bind(Uuid::new_v4())
            .bind(draft.therapist_id)
            .bind(&draft.name)
            .bind(&email)
            .bind(&draft.phone)
            .bind(draft.session_price)
            .bind(draft.therapy_start_date)
            .bind(draft.billing_start_date)
            .fetch_one(&mut *self.tx)
            .await?;
            return Ok(patient);
        }

        let existing: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM patients
            WHERE therapist_id = $1 AND email IS NULL AND lower(name) = lower($2)
            ORDER BY created_at, id
            LIMIT 1
            FOR UPDATE
            "#,
        )
        .bind(draft.therapist_id)
        .bind(draft.name.trim())
        .fetch_optional(&mut *self.tx)
        .await?;

        let patient = match existing {
            Some((id,)) => {
                debug!("Updating patient {} matched by name", id);
                sqlx::query_as::<_, Patient>(&format!(
                    r#"
                    UPDATE patients SET
                        phone = COALESCE($2, phone),
                        session_price = COALESCE($3, session_price),
                        therapy_start_date = COALESCE($4, therapy_start_date),
                        billing_start_date = COALESCE($5, billing_start_date),
                        updated_at = now()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    PATIENT_COLUMNS
                ))
                .bind(id)
                .bind(&draft.phone)
                .bind(draft.session_price)
                .bind(draft.therapy_start_date)
                .bind(draft.billing_start_date)
                .fetch_one(&mut *self.tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, Patient>(&format!(
                    r#"
                    INSERT INTO patients (id, therapist_id, name, email, phone, session_price,
                                          therapy_start_date, billing_start_date)
                    VALUES ($1, $2, $3, NULL, $4, COALESCE($5, 0), $6, $7)
                    RETURNING {}
                    "#,
                    PATIENT_COLUMNS
                ))
                .bind(Uuid::new_v4())
                .bind(draft.therapist_id)
                .bind(draft.name.trim())
                .bind(&draft.phone)
                .bind(draft.session_price)
                .bind(draft.therapy_start_date)
                .bind(draft.billing_start_date)
                .fetch_one(&mut *self.tx)
                .await?
            }
        };

        Ok(patient)
    }

    async fn insert_event_log(&mut self, log: &CalendarEventLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO calendar_events (google_event_id, event_type, session_date, email)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&log.google_event_id)
        .bind(log.event_type.as_str())
        .bind(log.session_date)
        .bind(&log.email)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn save_watch_channel(&mut self, channel: &StoredWatchChannel) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO calendar_watch_channels (channel_id, resource_id, calendar_id, therapist_id, expiration)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (channel_id) DO UPDATE SET
                resource_id = EXCLUDED.resource_id,
                calendar_id = EXCLUDED.calendar_id,
                therapist_id = EXCLUDED.therapist_id,
                expiration = EXCLUDED.expiration
            "#,
        )
        .bind(&channel.channel_id)
        .bind(&channel.resource_id)
        .bind(&channel.calendar_id)
        .bind(channel.therapist_id)
        .bind(channel.expiration)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_watch_channel(&mut self, channel_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM calendar_watch_channels WHERE channel_id = $1")
            .bind(channel_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

//! `PostgreSQL` event store implementation for muster.
//!
//! Implements the `EventStore` trait from `muster-core` on top of sqlx with
//! connection pooling. Queries are runtime-checked (no compile-time query
//! macros) so the workspace builds without a live database.
//!
//! # Atomicity
//!
//! `append_participant` and `update_event` recompute the derived lock flag
//! inside the same transaction as the row change, so "read count, decide
//! lock state, write lock state" is atomic per event. The UNIQUE
//! (`event_id`, `identity_key`) constraint is the backstop for duplicate
//! confirmations that race past the coordinator.
//!
//! # Example
//!
//! ```ignore
//! use muster_postgres::PostgresEventStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEventStore::connect("postgres://localhost/muster").await?;
//!     store.run_migrations().await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)] // Counters are non-negative and fit the domain types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muster_core::{
    Event, EventChanges, EventFilter, EventId, EventStore, GeoPoint, Identity, LockState,
    NewEvent, NewParticipant, Participant, ParticipantId, StoreError,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLSTATE for serialization failures, the retryable conflict class.
const SQLSTATE_SERIALIZATION_FAILURE: &str = "40001";
/// SQLSTATE for deadlock detection, also surfaced as retryable.
const SQLSTATE_DEADLOCK_DETECTED: &str = "40P01";

/// Event columns plus the derived participant count, shared by every query
/// that returns an event row.
const EVENT_COLUMNS: &str = "e.id, e.title, e.description, e.lat, e.lng, e.address, \
     e.start_time, e.end_time, e.required_attendees, e.locked, e.created_at, \
     (SELECT COUNT(*) FROM participants p WHERE p.event_id = e.id) AS participant_count";

/// Production [`EventStore`] backed by `PostgreSQL`.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(30))
            .connect(url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool (the server binary builds its own from config).
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if a migration fails.
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        info!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn create_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let query = format!(
            "INSERT INTO events AS e \
             (id, title, description, lat, lng, address, start_time, end_time, \
              required_attendees, locked, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, FALSE, $10) \
             RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(event.id.as_uuid())
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.location.lat)
            .bind(event.location.lng)
            .bind(&event.address)
            .bind(event.start_time)
            .bind(event.end_time)
            .bind(i32::try_from(event.required_attendees).unwrap_or(i32::MAX))
            .bind(event.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!(event_id = %event.id, "event row inserted");
        event_from_row(&row)
    }

    async fn get_event(&self, id: EventId) -> Result<Option<Event>, StoreError> {
        let query = format!("SELECT {EVENT_COLUMNS} FROM events e WHERE e.id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events(
        &self,
        filter: EventFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<Event>, StoreError> {
        let query = match filter {
            EventFilter::Upcoming => format!(
                "SELECT {EVENT_COLUMNS} FROM events e \
                 WHERE e.end_time >= $1 ORDER BY e.start_time ASC"
            ),
            EventFilter::Historical => format!(
                "SELECT {EVENT_COLUMNS} FROM events e \
                 WHERE e.end_time < $1 ORDER BY e.start_time DESC"
            ),
            EventFilter::All => format!(
                "SELECT {EVENT_COLUMNS} FROM events e \
                 WHERE $1::timestamptz IS NOT NULL ORDER BY e.start_time ASC"
            ),
        };
        let rows = sqlx::query(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn append_participant(
        &self,
        participant: NewParticipant,
    ) -> Result<(Event, Participant), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let inserted = sqlx::query(
            "INSERT INTO participants \
             (id, event_id, display_name, identity_key, user_key, lat, lng, confirmed_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, event_id, display_name, user_key, lat, lng, confirmed_at",
        )
        .bind(participant.id.as_uuid())
        .bind(participant.event_id.as_uuid())
        .bind(&participant.identity.display_name)
        .bind(participant.identity.key())
        .bind(&participant.identity.user_key)
        .bind(participant.location.map(|p| p.lat))
        .bind(participant.location.map(|p| p.lng))
        .bind(participant.confirmed_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_participant_error(e, participant.event_id))?;

        // Recompute the derived lock flag against the post-insert count, in
        // the same transaction.
        let query = format!(
            "UPDATE events AS e SET locked = \
             ((SELECT COUNT(*) FROM participants p WHERE p.event_id = e.id) \
              >= e.required_attendees) \
             WHERE e.id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let event_row = sqlx::query(&query)
            .bind(participant.event_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        let event = event_from_row(&event_row)?;
        let stored = participant_from_row(&inserted)?;
        debug!(
            event_id = %event.id,
            participant_count = event.participant_count,
            "participant appended"
        );
        Ok((event, stored))
    }

    async fn count_participants(&self, id: EventId) -> Result<u64, StoreError> {
        self.require_event(id).await?;
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM participants WHERE event_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
        Ok(count as u64)
    }

    async fn list_participants(&self, id: EventId) -> Result<Vec<Participant>, StoreError> {
        self.require_event(id).await?;
        let rows = sqlx::query(
            "SELECT id, event_id, display_name, user_key, lat, lng, confirmed_at \
             FROM participants WHERE event_id = $1 ORDER BY confirmed_at ASC",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(participant_from_row).collect()
    }

    async fn update_event(&self, id: EventId, changes: EventChanges) -> Result<Event, StoreError> {
        let patch = changes.patch.unwrap_or_default();
        let query = format!(
            "UPDATE events AS e SET \
             required_attendees = COALESCE($2, e.required_attendees), \
             title = COALESCE($3, e.title), \
             description = COALESCE($4, e.description), \
             start_time = COALESCE($5, e.start_time), \
             end_time = COALESCE($6, e.end_time), \
             locked = ((SELECT COUNT(*) FROM participants p WHERE p.event_id = e.id) \
                       >= COALESCE($2, e.required_attendees)) \
             WHERE e.id = $1 RETURNING {EVENT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .bind(
                changes
                    .required_attendees
                    .map(|r| i32::try_from(r).unwrap_or(i32::MAX)),
            )
            .bind(patch.title)
            .bind(patch.description)
            .bind(patch.start_time)
            .bind(patch.end_time)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound(id))?;
        event_from_row(&row)
    }
}

impl PostgresEventStore {
    async fn require_event(&self, id: EventId) -> Result<(), StoreError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM events WHERE id = $1)")
            .bind(id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if exists {
            Ok(())
        } else {
            Err(StoreError::NotFound(id))
        }
    }
}

// ============================================================================
// Row mapping and error translation
// ============================================================================

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let required: i32 = read(row, "required_attendees")?;
    let count: i64 = read(row, "participant_count")?;
    let locked: bool = read(row, "locked")?;
    Ok(Event {
        id: EventId::from_uuid(read::<Uuid>(row, "id")?),
        title: read(row, "title")?,
        description: read(row, "description")?,
        location: GeoPoint {
            lat: read(row, "lat")?,
            lng: read(row, "lng")?,
        },
        address: read(row, "address")?,
        start_time: read(row, "start_time")?,
        end_time: read(row, "end_time")?,
        required_attendees: required as u32,
        lock_state: if locked {
            LockState::Locked
        } else {
            LockState::Open
        },
        participant_count: count as u64,
        created_at: read(row, "created_at")?,
    })
}

fn participant_from_row(row: &PgRow) -> Result<Participant, StoreError> {
    let lat: Option<f64> = read(row, "lat")?;
    let lng: Option<f64> = read(row, "lng")?;
    Ok(Participant {
        id: ParticipantId::from_uuid(read::<Uuid>(row, "id")?),
        event_id: EventId::from_uuid(read::<Uuid>(row, "event_id")?),
        identity: Identity {
            display_name: read(row, "display_name")?,
            user_key: read(row, "user_key")?,
        },
        location: lat.zip(lng).map(|(lat, lng)| GeoPoint { lat, lng }),
        confirmed_at: read(row, "confirmed_at")?,
    })
}

fn read<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Database(format!("column {column}: {e}")))
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if let Some(code) = db.code() {
            if code == SQLSTATE_SERIALIZATION_FAILURE || code == SQLSTATE_DEADLOCK_DETECTED {
                return StoreError::Conflict(db.to_string());
            }
        }
    }
    StoreError::Database(err.to_string())
}

/// Participant inserts additionally hit the uniqueness and foreign-key
/// constraints, which are client-attributable.
fn map_participant_error(err: sqlx::Error, event_id: EventId) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::Duplicate { event_id };
        }
        if db.is_foreign_key_violation() {
            return StoreError::NotFound(event_id);
        }
    }
    map_sqlx_error(err)
}

//! Audit event storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::event::{Event, EventData, NewEvent};
use crate::store::EventStore;

#[async_trait]
impl EventStore for super::Db {
    async fn insert_event(&self, event: NewEvent) -> Result<Event> {
        // The payload is stored whole; the type columns are for querying.
        let data = serde_json::to_value(&event.data)?;
        let (seq,): (i64,) = sqlx::query_as(
            "INSERT INTO events (resource_id, resource_type, event_type, timestamp, data)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING seq",
        )
        .bind(&event.resource_id)
        .bind(event.data.resource_type().as_str())
        .bind(event.data.event_type().as_str())
        .bind(event.timestamp)
        .bind(&data)
        .fetch_one(self.pool())
        .await?;

        Ok(Event {
            seq,
            resource_id: event.resource_id,
            timestamp: event.timestamp,
            data: event.data,
        })
    }

    async fn find_events(&self, resource_id: &str) -> Result<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT seq, resource_id, timestamp, data FROM events
             WHERE resource_id = $1
             ORDER BY timestamp ASC, seq ASC",
        )
        .bind(resource_id)
        .fetch_all(self.pool())
        .await?;

        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn clear_events(&self) -> Result<u64> {
        let removed = sqlx::query("DELETE FROM events")
            .execute(self.pool())
            .await?
            .rows_affected();
        Ok(removed)
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    seq: i64,
    resource_id: String,
    timestamp: DateTime<Utc>,
    data: serde_json::Value,
}

impl EventRow {
    fn try_into_event(self) -> Result<Event> {
        let data: EventData = serde_json::from_value(self.data)?;
        Ok(Event {
            seq: self.seq,
            resource_id: self.resource_id,
            timestamp: self.timestamp,
            data,
        })
    }
}

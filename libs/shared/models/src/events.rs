use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structured audit record emitted for every committed booking, cancellation,
/// reschedule, and leave approval. The audit collaborator owns storage and
/// formatting; the core only emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub actor: String,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    BookingCommitted,
    BookingCancelled,
    BookingRescheduled,
    BookingStatusChanged,
    LeaveApproved,
    LeaveRejected,
    SeriesCreated,
    SeriesCancelled,
}

impl AuditEvent {
    pub fn now(actor: impl Into<String>, action: AuditAction, entity_type: &str, entity_id: Uuid) -> Self {
        Self {
            actor: actor.into(),
            action,
            entity_type: entity_type.to_string(),
            entity_id,
            timestamp: Utc::now(),
        }
    }
}

/// A committed booking that an approved leave period now overlaps. Handed to
/// the notification collaborator so affected patients can be contacted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AffectedBooking {
    pub booking_id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn bookings_affected(&self, affected: Vec<AffectedBooking>);
}

/// Default sinks for callers that do not wire collaborators.
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _event: AuditEvent) {}
}

pub struct NoopNotificationSink;

#[async_trait]
impl NotificationSink for NoopNotificationSink {
    async fn bookings_affected(&self, _affected: Vec<AffectedBooking>) {}
}

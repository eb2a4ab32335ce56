pub mod error;
pub mod events;

pub use error::{ConflictReason, SchedulingError};
pub use events::{
    AffectedBooking, AuditAction, AuditEvent, AuditSink, NoopAuditSink, NoopNotificationSink,
    NotificationSink,
};

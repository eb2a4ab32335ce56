// libs/appointment-cell/src/services/booking.rs
use availability_cell::{AvailabilityService, LeavePeriod, LeaveStatus};
use chrono::{DateTime, Duration, Utc};
use shared_models::{
    AffectedBooking, AuditAction, AuditEvent, AuditSink, NotificationSink, SchedulingError,
};
use shared_utils::Interval;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AppointmentTypeCatalog, Booking, BookingRequest, BookingStatus, SchedulingConfig,
};
use crate::services::conflict::ConflictDetectionService;
use crate::store::BookingLedger;

/// Orchestrates validate-then-commit for booking requests with
/// at-most-one-winner semantics per provider.
///
/// Requests for different providers run fully in parallel; requests for the
/// same provider serialize on a per-provider mutex held across the whole
/// conflict-check + ledger-insert section. A pre-check without that exclusive
/// section would let two concurrent requests both observe "no conflict" and
/// both commit.
pub struct BookingCoordinator {
    ledger: Arc<dyn BookingLedger>,
    availability: Arc<AvailabilityService>,
    conflicts: Arc<ConflictDetectionService>,
    catalog: Arc<AppointmentTypeCatalog>,
    audit: Arc<dyn AuditSink>,
    notifier: Arc<dyn NotificationSink>,
    config: SchedulingConfig,
    provider_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn BookingLedger>,
        availability: Arc<AvailabilityService>,
        conflicts: Arc<ConflictDetectionService>,
        catalog: Arc<AppointmentTypeCatalog>,
        audit: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            ledger,
            availability,
            conflicts,
            catalog,
            audit,
            notifier,
            config,
            provider_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn provider_lock(&self, provider_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.provider_locks.lock().await;
        locks
            .entry(provider_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Book a single appointment. The end time is derived from the appointment
    /// type duration when the request omits it. On conflict the specific
    /// reason is returned and nothing is mutated; a deadline miss maps to
    /// `Timeout`, also with no partial mutation, so the caller may retry.
    #[instrument(skip(self, request), fields(provider_id = %request.provider_id, patient_id = %request.patient_id))]
    pub async fn book(&self, request: BookingRequest) -> Result<Booking, SchedulingError> {
        let settings = self
            .catalog
            .resolve(request.provider_id, request.appointment_type_id)?
            .clone();

        let start = request.date.and_time(request.start_time).and_utc();
        let end = match request.end_time {
            Some(end_time) => request.date.and_time(end_time).and_utc(),
            None => start + Duration::minutes(settings.duration_minutes),
        };
        let interval = Interval::new(start, end)?;

        let lock = self.provider_lock(request.provider_id).await;
        let deadline = std::time::Duration::from_millis(self.config.commit_timeout_ms);

        let committed = timeout(deadline, async {
            let _guard = lock.lock().await;

            if let Some(reason) = self
                .conflicts
                .check_buffered(
                    request.provider_id,
                    interval,
                    settings.buffer_after_minutes,
                    None,
                )
                .await?
            {
                warn!(%interval, %reason, "booking rejected");
                return Err(SchedulingError::Conflict(reason));
            }

            let booking = Booking::new(
                request.provider_id,
                request.patient_id,
                request.appointment_type_id,
                interval,
                request.series_id,
            );
            self.ledger.insert(booking.clone()).await?;
            Ok(booking)
        })
        .await
        .map_err(|_| SchedulingError::Timeout(self.config.commit_timeout_ms))??;

        info!(booking_id = %committed.id, %interval, "booking committed");
        self.audit
            .record(AuditEvent::now(
                request.requested_by,
                AuditAction::BookingCommitted,
                "booking",
                committed.id,
            ))
            .await;
        Ok(committed)
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor: impl Into<String>,
    ) -> Result<Booking, SchedulingError> {
        let booking = self
            .transition_inner(booking_id, BookingStatus::Cancelled)
            .await?;
        self.audit
            .record(AuditEvent::now(
                actor,
                AuditAction::BookingCancelled,
                "booking",
                booking_id,
            ))
            .await;
        Ok(booking)
    }

    /// Lifecycle transition with legality checking (scheduled → in-progress →
    /// completed, scheduled → cancelled/no-show).
    pub async fn transition(
        &self,
        booking_id: Uuid,
        next: BookingStatus,
        actor: impl Into<String>,
    ) -> Result<Booking, SchedulingError> {
        let booking = self.transition_inner(booking_id, next).await?;
        self.audit
            .record(AuditEvent::now(
                actor,
                AuditAction::BookingStatusChanged,
                "booking",
                booking_id,
            ))
            .await;
        Ok(booking)
    }

    async fn transition_inner(
        &self,
        booking_id: Uuid,
        next: BookingStatus,
    ) -> Result<Booking, SchedulingError> {
        let current = self.ledger.get(booking_id).await?;
        if !current.status.can_transition_to(&next) {
            return Err(SchedulingError::validation(format!(
                "booking {} cannot move from {} to {}",
                booking_id, current.status, next
            )));
        }
        self.ledger.set_status(booking_id, next).await
    }

    /// Move a scheduled booking to a new start, keeping its duration unless a
    /// new one is given. The conflict check ignores the booking being moved.
    #[instrument(skip(self, actor))]
    pub async fn reschedule(
        &self,
        booking_id: Uuid,
        new_start: DateTime<Utc>,
        new_duration_minutes: Option<i64>,
        actor: impl Into<String>,
    ) -> Result<Booking, SchedulingError> {
        let booking = self.ledger.get(booking_id).await?;
        if booking.status != BookingStatus::Scheduled {
            return Err(SchedulingError::validation(format!(
                "only scheduled bookings can be rescheduled, booking {} is {}",
                booking_id, booking.status
            )));
        }

        let settings = self
            .catalog
            .resolve(booking.provider_id, booking.appointment_type_id)?
            .clone();
        let duration = new_duration_minutes.unwrap_or(booking.interval.duration_minutes());
        let interval = Interval::from_start(new_start, duration)?;

        let lock = self.provider_lock(booking.provider_id).await;
        let deadline = std::time::Duration::from_millis(self.config.commit_timeout_ms);

        let moved = timeout(deadline, async {
            let _guard = lock.lock().await;

            if let Some(reason) = self
                .conflicts
                .check_buffered(
                    booking.provider_id,
                    interval,
                    settings.buffer_after_minutes,
                    Some(booking_id),
                )
                .await?
            {
                return Err(SchedulingError::Conflict(reason));
            }
            self.ledger.reschedule(booking_id, interval).await
        })
        .await
        .map_err(|_| SchedulingError::Timeout(self.config.commit_timeout_ms))??;

        info!(booking_id = %booking_id, %interval, "booking rescheduled");
        self.audit
            .record(AuditEvent::now(
                actor.into(),
                AuditAction::BookingRescheduled,
                "booking",
                booking_id,
            ))
            .await;
        Ok(moved)
    }

    /// Approve or reject a pending leave request. On approval, committed
    /// bookings the leave now overlaps are reported to the notification
    /// collaborator; availability itself is recomputed lazily on the next
    /// query, no cache is invalidated here.
    pub async fn apply_leave_decision(
        &self,
        leave_id: Uuid,
        approve: bool,
        actor: impl Into<String>,
    ) -> Result<Vec<AffectedBooking>, SchedulingError> {
        let status = if approve {
            LeaveStatus::Approved
        } else {
            LeaveStatus::Rejected
        };
        let leave = self.availability.decide_leave(leave_id, status).await?;

        let action = if approve {
            AuditAction::LeaveApproved
        } else {
            AuditAction::LeaveRejected
        };
        self.audit
            .record(AuditEvent::now(actor, action, "leave_period", leave_id))
            .await;

        if !approve {
            return Ok(vec![]);
        }

        let span = leave_block_span(&leave)?;
        let affected: Vec<AffectedBooking> = self
            .ledger
            .bookings_in_range(leave.provider_id, span.start(), span.end())
            .await?
            .into_iter()
            .map(|b| AffectedBooking {
                booking_id: b.id,
                provider_id: b.provider_id,
                patient_id: b.patient_id,
                start_time: b.interval.start(),
                end_time: b.interval.end(),
            })
            .collect();

        if !affected.is_empty() {
            debug!(leave_id = %leave_id, count = affected.len(), "approved leave overlaps existing bookings");
            self.notifier.bookings_affected(affected.clone()).await;
        }
        Ok(affected)
    }
}

/// The span an approved leave blocks: the stated interval, widened to whole
/// calendar days when the leave is all-day.
fn leave_block_span(leave: &LeavePeriod) -> Result<Interval, SchedulingError> {
    if leave.all_day {
        let first = Interval::whole_day(leave.start_time.date_naive());
        let last = Interval::whole_day(leave.end_time.date_naive());
        Interval::new(first.start(), last.end())
    } else {
        Interval::new(leave.start_time, leave.end_time)
    }
}

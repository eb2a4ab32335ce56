// libs/appointment-cell/src/services/conflict.rs
use availability_cell::AvailabilityService;
use shared_models::{ConflictReason, SchedulingError};
use shared_utils::Interval;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::store::BookingLedger;

/// Pure conflict check for a candidate interval against a provider's working
/// hours, approved leave, breaks, and committed bookings.
///
/// Evaluation order is a contract: working-hours containment first, then
/// leave, then breaks, then existing bookings. The first failing check
/// short-circuits, and callers surface that reason to the end user.
pub struct ConflictDetectionService {
    availability: Arc<AvailabilityService>,
    ledger: Arc<dyn BookingLedger>,
}

impl ConflictDetectionService {
    pub fn new(availability: Arc<AvailabilityService>, ledger: Arc<dyn BookingLedger>) -> Self {
        Self {
            availability,
            ledger,
        }
    }

    /// Check a bare interval. `exclude_booking_id` lets a reschedule ignore
    /// the booking being moved.
    pub async fn check(
        &self,
        provider_id: Uuid,
        interval: Interval,
        exclude_booking_id: Option<Uuid>,
    ) -> Result<Option<ConflictReason>, SchedulingError> {
        self.check_buffered(provider_id, interval, 0, exclude_booking_id)
            .await
    }

    /// Check an interval together with its trailing buffer. Window containment
    /// is judged on the raw interval; leave, breaks, and bookings are tested
    /// against the buffered span. This is the exact predicate the slot
    /// generator applies, so the generator and the commit path agree on what
    /// counts as free.
    pub async fn check_buffered(
        &self,
        provider_id: Uuid,
        interval: Interval,
        buffer_after_minutes: i64,
        exclude_booking_id: Option<Uuid>,
    ) -> Result<Option<ConflictReason>, SchedulingError> {
        let date = interval.start().date_naive();
        debug!(%provider_id, %interval, "checking conflicts");

        let window = self.availability.effective_window(provider_id, date).await?;
        match window {
            Some(window) if window.contains(&interval) => {}
            _ => return Ok(Some(ConflictReason::OutsideWorkingHours)),
        }

        let buffered = interval.with_trailing(buffer_after_minutes);

        for leave in self.availability.leave_for(provider_id, date).await? {
            if leave.all_day {
                return Ok(Some(ConflictReason::OnApprovedLeave));
            }
            let leave_span = Interval::new(leave.start_time, leave.end_time)?;
            if leave_span.overlaps(&buffered) {
                return Ok(Some(ConflictReason::OnApprovedLeave));
            }
        }

        for break_span in self.availability.breaks_for(provider_id, date).await? {
            if break_span.overlaps(&buffered) {
                return Ok(Some(ConflictReason::DuringBreak));
            }
        }

        let existing = self
            .ledger
            .bookings_in_range(provider_id, buffered.start(), buffered.end())
            .await?;
        let conflicting = existing
            .into_iter()
            .filter(|b| Some(b.id) != exclude_booking_id)
            .find(|b| b.interval.overlaps(&buffered));
        if let Some(booking) = conflicting {
            warn!(%provider_id, conflicting_id = %booking.id, "candidate interval overlaps existing booking");
            return Ok(Some(ConflictReason::OverlapsBooking {
                booking_id: booking.id,
            }));
        }

        Ok(None)
    }
}

// libs/appointment-cell/src/services/slots.rs
use availability_cell::AvailabilityService;
use chrono::{Duration, NaiveDate};
use shared_models::SchedulingError;
use shared_utils::Interval;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    AppointmentTypeCatalog, AppointmentTypeSettings, CandidateSlot, SchedulingConfig, SlotQuery,
};
use crate::store::BookingLedger;

/// Derives the ordered list of bookable candidate slots for a provider and
/// date. Pure function of the availability and ledger snapshots: no state is
/// retained between calls, so an unchanged snapshot yields identical output.
pub struct SlotGeneratorService {
    availability: Arc<AvailabilityService>,
    ledger: Arc<dyn BookingLedger>,
    catalog: Arc<AppointmentTypeCatalog>,
    config: SchedulingConfig,
}

impl SlotGeneratorService {
    pub fn new(
        availability: Arc<AvailabilityService>,
        ledger: Arc<dyn BookingLedger>,
        catalog: Arc<AppointmentTypeCatalog>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            availability,
            ledger,
            catalog,
            config,
        }
    }

    pub async fn available_slots(
        &self,
        query: &SlotQuery,
    ) -> Result<Vec<CandidateSlot>, SchedulingError> {
        let settings = self
            .catalog
            .resolve(query.provider_id, query.appointment_type_id)?
            .clone();
        self.slots_for_settings(query.provider_id, query.date, &settings)
            .await
    }

    /// Candidate slots for explicit type settings. A duration longer than the
    /// whole working window yields an empty list, not an error.
    pub async fn slots_for_settings(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
        settings: &AppointmentTypeSettings,
    ) -> Result<Vec<CandidateSlot>, SchedulingError> {
        let window = match self.availability.effective_window(provider_id, date).await? {
            Some(window) => window,
            None => {
                debug!(%provider_id, %date, "not a working day, no slots");
                return Ok(vec![]);
            }
        };

        let leave = self.availability.leave_for(provider_id, date).await?;
        if leave.iter().any(|l| l.all_day) {
            debug!(%provider_id, %date, "all-day leave, no slots");
            return Ok(vec![]);
        }
        let mut blocked: Vec<Interval> = Vec::new();
        for entry in &leave {
            blocked.push(Interval::new(entry.start_time, entry.end_time)?);
        }
        blocked.extend(self.availability.breaks_for(provider_id, date).await?);
        // A buffered candidate near the end of the window reaches past it, so
        // the booking query must cover that reach as well; a booking can sit
        // outside the window when an exception shortened the day under it.
        let horizon = window.end() + Duration::minutes(settings.buffer_after_minutes.max(0));
        for booking in self
            .ledger
            .bookings_in_range(provider_id, window.start(), horizon)
            .await?
        {
            blocked.push(booking.interval);
        }

        let step = Duration::minutes(self.config.slot_step_minutes);
        let duration = Duration::minutes(settings.duration_minutes);
        let mut slots = Vec::new();
        let mut current = window.start();

        while current + duration <= window.end() {
            let candidate = Interval::from_start(current, settings.duration_minutes)?;
            let buffered = candidate.with_trailing(settings.buffer_after_minutes);
            if !blocked.iter().any(|b| b.overlaps(&buffered)) {
                slots.push(CandidateSlot {
                    start_time: candidate.start(),
                    end_time: candidate.end(),
                    duration_minutes: settings.duration_minutes,
                });
            }
            current += step;
        }

        debug!(%provider_id, %date, count = slots.len(), "candidate slots generated");
        Ok(slots)
    }
}

// libs/appointment-cell/src/services/recurring.rs
use availability_cell::AvailabilityService;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use shared_models::{AuditAction, AuditEvent, AuditSink, SchedulingError};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AppointmentTypeCatalog, AppointmentTypeSettings, Booking, BookingRequest, BookingStatus,
    CreateSeriesRequest, OccurrenceOutcome, OccurrenceResult, RecurrenceFrequency, RecurringSeries,
    SchedulingConfig, SeriesBookingReport, SeriesBound, SeriesStatus,
};
use crate::services::booking::BookingCoordinator;
use crate::services::slots::SlotGeneratorService;
use crate::store::BookingLedger;

/// One candidate occurrence produced by walking a recurrence rule. `Missing`
/// marks a month that cannot represent the rule's date (short month); the
/// carried date is the first of that month.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occurrence {
    On(NaiveDate),
    Missing(NaiveDate),
}

/// Expands a recurrence rule into occurrence dates and books each one through
/// the booking coordinator, sequentially, recording per-occurrence outcomes.
pub struct RecurringSeriesService {
    coordinator: Arc<BookingCoordinator>,
    slots: Arc<SlotGeneratorService>,
    availability: Arc<AvailabilityService>,
    ledger: Arc<dyn BookingLedger>,
    catalog: Arc<AppointmentTypeCatalog>,
    audit: Arc<dyn AuditSink>,
    config: SchedulingConfig,
}

impl RecurringSeriesService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        coordinator: Arc<BookingCoordinator>,
        slots: Arc<SlotGeneratorService>,
        availability: Arc<AvailabilityService>,
        ledger: Arc<dyn BookingLedger>,
        catalog: Arc<AppointmentTypeCatalog>,
        audit: Arc<dyn AuditSink>,
        config: SchedulingConfig,
    ) -> Self {
        Self {
            coordinator,
            slots,
            availability,
            ledger,
            catalog,
            audit,
            config,
        }
    }

    /// Expand and book a recurring series. Occurrence-level conflicts never
    /// abort the remaining occurrences; the full outcome list is returned.
    #[instrument(skip(self, request), fields(provider_id = %request.provider_id, patient_id = %request.patient_id))]
    pub async fn create_series(
        &self,
        request: CreateSeriesRequest,
    ) -> Result<SeriesBookingReport, SchedulingError> {
        let settings = self
            .catalog
            .resolve(request.provider_id, request.appointment_type_id)?
            .clone();
        let occurrences = expand_occurrences(&request, &self.config)?;

        let series = RecurringSeries {
            id: Uuid::new_v4(),
            provider_id: request.provider_id,
            patient_id: request.patient_id,
            appointment_type_id: request.appointment_type_id,
            frequency: request.frequency.clone(),
            time_of_day: request.time_of_day,
            start_date: request.start_date,
            bound: request.bound.clone(),
            exception_dates: request.exception_dates.clone(),
            skip_holidays: request.skip_holidays,
            status: SeriesStatus::Active,
            generated_booking_ids: Vec::new(),
            created_at: chrono::Utc::now(),
        };
        self.ledger.insert_series(series.clone()).await?;
        info!(series_id = %series.id, occurrences = occurrences.len(), "expanding recurring series");

        let mut outcomes = Vec::with_capacity(occurrences.len());
        for occurrence in occurrences {
            let date = match occurrence {
                Occurrence::Missing(anchor) => {
                    outcomes.push(OccurrenceOutcome {
                        date: anchor,
                        result: OccurrenceResult::SkippedInvalidDate,
                    });
                    continue;
                }
                Occurrence::On(date) => date,
            };

            if request.exception_dates.contains(&date) {
                outcomes.push(OccurrenceOutcome {
                    date,
                    result: OccurrenceResult::SkippedException,
                });
                continue;
            }
            if request.skip_holidays && self.availability.is_holiday(date).await? {
                outcomes.push(OccurrenceOutcome {
                    date,
                    result: OccurrenceResult::SkippedHoliday,
                });
                continue;
            }

            let result = self
                .book_occurrence(&request, &settings, series.id, date)
                .await?;
            if let OccurrenceResult::Booked { booking_id }
            | OccurrenceResult::Rescheduled { booking_id, .. } = &result
            {
                self.ledger
                    .append_series_booking(series.id, *booking_id)
                    .await?;
            }
            outcomes.push(OccurrenceOutcome { date, result });
        }

        self.audit
            .record(AuditEvent::now(
                request.requested_by.clone(),
                AuditAction::SeriesCreated,
                "recurring_series",
                series.id,
            ))
            .await;

        let series = self.ledger.get_series(series.id).await?;
        let report = SeriesBookingReport { series, outcomes };
        info!(
            series_id = %report.series.id,
            booked = report.booked_count(),
            failures = report.has_failures(),
            "series expansion finished"
        );
        Ok(report)
    }

    /// Attempt one occurrence; on conflict, optionally probe forward for a
    /// replacement slot before marking the occurrence failed.
    async fn book_occurrence(
        &self,
        request: &CreateSeriesRequest,
        settings: &AppointmentTypeSettings,
        series_id: Uuid,
        date: NaiveDate,
    ) -> Result<OccurrenceResult, SchedulingError> {
        let attempt = self
            .coordinator
            .book(BookingRequest {
                provider_id: request.provider_id,
                patient_id: request.patient_id,
                appointment_type_id: request.appointment_type_id,
                date,
                start_time: request.time_of_day,
                end_time: None,
                requested_by: request.requested_by.clone(),
                series_id: Some(series_id),
            })
            .await;

        match attempt {
            Ok(booking) => Ok(OccurrenceResult::Booked {
                booking_id: booking.id,
            }),
            Err(SchedulingError::Conflict(reason)) => {
                debug!(%date, %reason, "occurrence conflicts");
                if let Some(window_days) = request.reschedule_window_days.filter(|d| *d > 0) {
                    if let Some(booking) = self
                        .probe_forward(request, settings, series_id, date, window_days)
                        .await?
                    {
                        return Ok(OccurrenceResult::Rescheduled {
                            booking_id: booking.id,
                            moved_to: booking.interval.start(),
                        });
                    }
                }
                Ok(OccurrenceResult::Conflict { reason })
            }
            Err(SchedulingError::Timeout(_)) => {
                warn!(%date, "occurrence commit timed out");
                Ok(OccurrenceResult::TimedOut)
            }
            Err(other) => Err(other),
        }
    }

    /// Probe up to `window_days` forward for a free slot, preferring the
    /// series' time of day, and book the first one found.
    async fn probe_forward(
        &self,
        request: &CreateSeriesRequest,
        settings: &AppointmentTypeSettings,
        series_id: Uuid,
        date: NaiveDate,
        window_days: u32,
    ) -> Result<Option<Booking>, SchedulingError> {
        for offset in 1..=i64::from(window_days) {
            let probe_date = date + Duration::days(offset);
            if request.exception_dates.contains(&probe_date) {
                continue;
            }
            if request.skip_holidays && self.availability.is_holiday(probe_date).await? {
                continue;
            }

            let candidates = self
                .slots
                .slots_for_settings(request.provider_id, probe_date, settings)
                .await?;
            let preferred = candidates
                .iter()
                .find(|slot| slot.start_time.time() == request.time_of_day)
                .or_else(|| candidates.first());
            let Some(slot) = preferred else { continue };

            let attempt = self
                .coordinator
                .book(BookingRequest {
                    provider_id: request.provider_id,
                    patient_id: request.patient_id,
                    appointment_type_id: request.appointment_type_id,
                    date: probe_date,
                    start_time: slot.start_time.time(),
                    end_time: None,
                    requested_by: request.requested_by.clone(),
                    series_id: Some(series_id),
                })
                .await;
            match attempt {
                Ok(booking) => {
                    debug!(original = %date, moved_to = %booking.interval.start(), "occurrence auto-rescheduled");
                    return Ok(Some(booking));
                }
                // Lost a race for the probed slot; keep probing.
                Err(SchedulingError::Conflict(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(None)
    }

    /// Cancel a series: still-scheduled generated bookings are cancelled,
    /// completed and in-progress ones are left untouched.
    pub async fn cancel_series(
        &self,
        series_id: Uuid,
        actor: impl Into<String>,
    ) -> Result<RecurringSeries, SchedulingError> {
        let actor = actor.into();
        let series = self.ledger.get_series(series_id).await?;
        if series.status == SeriesStatus::Cancelled {
            return Err(SchedulingError::validation(format!(
                "series {} is already cancelled",
                series_id
            )));
        }

        for booking_id in &series.generated_booking_ids {
            let booking = self.ledger.get(*booking_id).await?;
            if booking.status == BookingStatus::Scheduled {
                self.coordinator.cancel(*booking_id, actor.clone()).await?;
            }
        }

        let cancelled = self
            .ledger
            .set_series_status(series_id, SeriesStatus::Cancelled)
            .await?;
        self.audit
            .record(AuditEvent::now(
                actor,
                AuditAction::SeriesCancelled,
                "recurring_series",
                series_id,
            ))
            .await;
        Ok(cancelled)
    }
}

// ==============================================================================
// OCCURRENCE EXPANSION
// ==============================================================================

fn expand_occurrences(
    request: &CreateSeriesRequest,
    config: &SchedulingConfig,
) -> Result<Vec<Occurrence>, SchedulingError> {
    if let SeriesBound::Until(until) = &request.bound {
        if *until < request.start_date {
            return Err(SchedulingError::validation(
                "series end date must not be before its start date",
            ));
        }
    }
    if let SeriesBound::Count(count) = &request.bound {
        if *count == 0 {
            return Err(SchedulingError::validation(
                "series occurrence count must be at least 1",
            ));
        }
    }

    let occurrences = match &request.frequency {
        RecurrenceFrequency::Weekly => expand_fixed_step(request, 7),
        RecurrenceFrequency::Biweekly => expand_fixed_step(request, 14),
        RecurrenceFrequency::EveryNDays { interval_days } => {
            if *interval_days == 0 {
                return Err(SchedulingError::validation(
                    "custom interval must be at least 1 day",
                ));
            }
            expand_fixed_step(request, i64::from(*interval_days))
        }
        RecurrenceFrequency::MonthlyByDate => {
            expand_monthly(request, MonthlyRule::ByDate(request.start_date.day()))
        }
        RecurrenceFrequency::MonthlyByWeekday => {
            let nth = (request.start_date.day0() / 7) + 1;
            expand_monthly(
                request,
                MonthlyRule::ByWeekday(request.start_date.weekday(), nth),
            )
        }
    };

    let cap = if request.frequency.is_weekly_class() {
        config.max_weekly_occurrences
    } else {
        config.max_monthly_occurrences
    };
    if occurrences.len() > cap as usize {
        return Err(SchedulingError::validation(format!(
            "series would generate {} occurrences, cap is {}",
            occurrences.len(),
            cap
        )));
    }
    Ok(occurrences)
}

fn expand_fixed_step(request: &CreateSeriesRequest, step_days: i64) -> Vec<Occurrence> {
    let mut dates = Vec::new();
    let mut current = request.start_date;
    match &request.bound {
        SeriesBound::Count(count) => {
            for _ in 0..*count {
                dates.push(Occurrence::On(current));
                current += Duration::days(step_days);
            }
        }
        SeriesBound::Until(until) => {
            while current <= *until {
                dates.push(Occurrence::On(current));
                current += Duration::days(step_days);
            }
        }
    }
    dates
}

enum MonthlyRule {
    ByDate(u32),
    ByWeekday(Weekday, u32),
}

fn expand_monthly(request: &CreateSeriesRequest, rule: MonthlyRule) -> Vec<Occurrence> {
    let mut occurrences = Vec::new();
    let start = request.start_date;
    let mut month_index = 0u32;

    loop {
        let (year, month) = add_months(start.year(), start.month(), month_index);
        // First of the month always exists.
        let month_anchor = NaiveDate::from_ymd_opt(year, month, 1)
            .unwrap_or(start);

        let resolved = match &rule {
            MonthlyRule::ByDate(day) => NaiveDate::from_ymd_opt(year, month, *day),
            MonthlyRule::ByWeekday(weekday, nth) => nth_weekday_of_month(year, month, *weekday, *nth),
        };

        match &request.bound {
            SeriesBound::Count(count) => {
                if month_index >= *count {
                    break;
                }
            }
            SeriesBound::Until(until) => {
                if month_anchor > *until {
                    break;
                }
                if let Some(date) = resolved {
                    if date > *until {
                        break;
                    }
                }
            }
        }

        occurrences.push(match resolved {
            Some(date) => Occurrence::On(date),
            // Skipped, not clamped to month end.
            None => Occurrence::Missing(month_anchor),
        });
        month_index += 1;

        // Count bounds terminate above; Until bounds terminate on the anchor
        // check. Either way no month is visited twice.
        if month_index > 1200 {
            break;
        }
    }
    occurrences
}

fn add_months(year: i32, month: u32, offset: u32) -> (i32, u32) {
    let zero_based = (month - 1) + offset;
    (year + (zero_based / 12) as i32, (zero_based % 12) + 1)
}

/// The Nth given weekday of a month, when the month has one.
fn nth_weekday_of_month(year: i32, month: u32, weekday: Weekday, nth: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let offset = (7 + weekday.num_days_from_sunday() - first.weekday().num_days_from_sunday()) % 7;
    let day = 1 + offset + (nth - 1) * 7;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    (date.month() == month).then_some(date)
}

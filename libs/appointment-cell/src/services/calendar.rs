// libs/appointment-cell/src/services/calendar.rs
use availability_cell::AvailabilityService;
use chrono::{Duration, NaiveDate};
use shared_models::SchedulingError;
use shared_utils::Interval;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{CalendarConflict, CalendarEvent, CalendarEventKind, CalendarReport};
use crate::store::BookingLedger;

/// Read-only merge of bookings, availability windows, breaks, leave, and
/// holidays over a date range, with a diagnostic overlap report.
///
/// This is a display and auditing view: by the time it renders, the booking
/// coordinator has already enforced the interval invariant, so any conflict
/// flagged here points at data written outside the coordinator.
pub struct CalendarService {
    ledger: Arc<dyn BookingLedger>,
    availability: Arc<AvailabilityService>,
}

impl CalendarService {
    pub fn new(ledger: Arc<dyn BookingLedger>, availability: Arc<AvailabilityService>) -> Self {
        Self {
            ledger,
            availability,
        }
    }

    pub async fn events_for_range(
        &self,
        provider_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CalendarReport, SchedulingError> {
        if from > to {
            return Err(SchedulingError::validation(
                "calendar range start must not be after its end",
            ));
        }

        let mut events = Vec::new();

        let mut date = from;
        while date <= to {
            if let Some(window) = self.availability.effective_window(provider_id, date).await? {
                events.push(CalendarEvent {
                    kind: CalendarEventKind::AvailabilityWindow,
                    interval: window,
                    label: None,
                });
            }
            for break_span in self.availability.breaks_for(provider_id, date).await? {
                events.push(CalendarEvent {
                    kind: CalendarEventKind::Break,
                    interval: break_span,
                    label: None,
                });
            }
            date += Duration::days(1);
        }

        let span_start = Interval::whole_day(from).start();
        let span_end = Interval::whole_day(to).end();

        for leave in self
            .availability
            .approved_leave_between(provider_id, span_start, span_end)
            .await?
        {
            let interval = if leave.all_day {
                Interval::new(
                    Interval::whole_day(leave.start_time.date_naive()).start(),
                    Interval::whole_day(leave.end_time.date_naive()).end(),
                )?
            } else {
                Interval::new(leave.start_time, leave.end_time)?
            };
            events.push(CalendarEvent {
                kind: CalendarEventKind::Leave { leave_id: leave.id },
                interval,
                label: leave.reason.clone(),
            });
        }

        for holiday in self.availability.holidays_between(from, to).await? {
            events.push(CalendarEvent {
                kind: CalendarEventKind::Holiday,
                interval: Interval::whole_day(holiday.date),
                label: Some(holiday.label),
            });
        }

        for booking in self
            .ledger
            .bookings_in_range(provider_id, span_start, span_end)
            .await?
        {
            events.push(CalendarEvent {
                kind: CalendarEventKind::Appointment {
                    booking_id: booking.id,
                    patient_id: booking.patient_id,
                    status: booking.status,
                },
                interval: booking.interval,
                label: None,
            });
        }

        events.sort_by_key(|e| e.interval.start());
        let conflicts = flag_conflicts(&events);
        debug!(%provider_id, events = events.len(), conflicts = conflicts.len(), "calendar aggregated");

        Ok(CalendarReport {
            provider_id,
            from,
            to,
            events,
            conflicts,
        })
    }
}

/// Pairwise overlap scan over blocking events. Appointment-vs-appointment,
/// appointment-vs-leave, and appointment-vs-break overlaps are reported;
/// leave and breaks coexisting is normal scheduling, not a conflict.
fn flag_conflicts(events: &[CalendarEvent]) -> Vec<CalendarConflict> {
    let blocking: Vec<&CalendarEvent> = events.iter().filter(|e| e.kind.is_blocking()).collect();
    let mut conflicts = Vec::new();

    for (i, first) in blocking.iter().enumerate() {
        for second in &blocking[i + 1..] {
            // Sorted by start, so once past the end of `first` we can stop.
            if second.interval.start() >= first.interval.end() {
                break;
            }
            let involves_appointment =
                matches!(first.kind, CalendarEventKind::Appointment { .. })
                    || matches!(second.kind, CalendarEventKind::Appointment { .. });
            if involves_appointment && first.interval.overlaps(&second.interval) {
                conflicts.push(CalendarConflict {
                    first: (*first).clone(),
                    second: (*second).clone(),
                });
            }
        }
    }
    conflicts
}

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use appointment_cell::{
    AppointmentTypeCatalog, AppointmentTypeSettings, BookingCoordinator, BookingLedger,
    BookingRequest, BookingStatus, ConflictDetectionService, CreateSeriesRequest,
    InMemoryBookingLedger, OccurrenceResult, RecurrenceFrequency, RecurringSeriesService,
    SchedulingConfig, SeriesBound, SeriesStatus, SlotGeneratorService,
};
use availability_cell::{AvailabilityService, InMemoryAvailabilityStore, SetWorkingHoursRequest};
use shared_models::{
    ConflictReason, NoopAuditSink, NoopNotificationSink, SchedulingError,
};

struct Harness {
    availability: Arc<AvailabilityService>,
    ledger: Arc<InMemoryBookingLedger>,
    coordinator: Arc<BookingCoordinator>,
    series: RecurringSeriesService,
    provider_id: Uuid,
    consult_id: Uuid,
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

async fn harness() -> Harness {
    let availability = Arc::new(AvailabilityService::new(Arc::new(
        InMemoryAvailabilityStore::new(),
    )));
    let ledger = Arc::new(InMemoryBookingLedger::new());

    let consult_id = Uuid::new_v4();
    let mut catalog = AppointmentTypeCatalog::new();
    catalog
        .register(AppointmentTypeSettings {
            id: consult_id,
            name: "consultation".to_string(),
            duration_minutes: 30,
            buffer_after_minutes: 0,
        })
        .unwrap();
    let catalog = Arc::new(catalog);

    let conflicts = Arc::new(ConflictDetectionService::new(
        availability.clone(),
        ledger.clone(),
    ));
    let config = SchedulingConfig::default();
    let coordinator = Arc::new(BookingCoordinator::new(
        ledger.clone(),
        availability.clone(),
        conflicts,
        catalog.clone(),
        Arc::new(NoopAuditSink),
        Arc::new(NoopNotificationSink),
        config.clone(),
    ));
    let slots = Arc::new(SlotGeneratorService::new(
        availability.clone(),
        ledger.clone(),
        catalog.clone(),
        config.clone(),
    ));
    let series = RecurringSeriesService::new(
        coordinator.clone(),
        slots,
        availability.clone(),
        ledger.clone(),
        catalog,
        Arc::new(NoopAuditSink),
        config,
    );

    // Open every day so monthly rules landing on weekends still book.
    let provider_id = Uuid::new_v4();
    for day in 0..=6 {
        availability
            .set_weekly_hours(
                provider_id,
                SetWorkingHoursRequest {
                    day_of_week: day,
                    is_working: true,
                    start_time: Some(hm(9, 0)),
                    end_time: Some(hm(17, 0)),
                },
            )
            .await
            .unwrap();
    }

    Harness {
        availability,
        ledger,
        coordinator,
        series,
        provider_id,
        consult_id,
    }
}

impl Harness {
    fn weekly_request(&self, start: NaiveDate, count: u32) -> CreateSeriesRequest {
        CreateSeriesRequest {
            provider_id: self.provider_id,
            patient_id: Uuid::new_v4(),
            appointment_type_id: self.consult_id,
            frequency: RecurrenceFrequency::Weekly,
            time_of_day: hm(10, 0),
            start_date: start,
            bound: SeriesBound::Count(count),
            exception_dates: BTreeSet::new(),
            skip_holidays: false,
            reschedule_window_days: None,
            requested_by: "reception".to_string(),
        }
    }
}

#[tokio::test]
async fn weekly_series_with_an_exception_books_the_rest() {
    let h = harness().await;
    let start = ymd(2025, 3, 10);
    let skipped = ymd(2025, 3, 24);

    let mut request = h.weekly_request(start, 10);
    request.exception_dates.insert(skipped);

    let report = h.series.create_series(request).await.unwrap();

    assert_eq!(report.outcomes.len(), 10);
    assert_eq!(report.booked_count(), 9);
    assert!(!report.has_failures());
    for (i, outcome) in report.outcomes.iter().enumerate() {
        assert_eq!(outcome.date, start + chrono::Duration::days(7 * i as i64));
        if outcome.date == skipped {
            assert_eq!(outcome.result, OccurrenceResult::SkippedException);
        } else {
            assert_matches!(outcome.result, OccurrenceResult::Booked { .. });
        }
    }

    assert!(h.ledger.bookings_on(h.provider_id, skipped).await.unwrap().is_empty());
    assert_eq!(report.series.generated_booking_ids.len(), 9);

    // Generated bookings carry the series id.
    let first_id = report.series.generated_booking_ids[0];
    let first = h.ledger.get(first_id).await.unwrap();
    assert_eq!(first.series_id, Some(report.series.id));
    assert_eq!(first.interval.start().time(), hm(10, 0));
}

#[tokio::test]
async fn biweekly_series_steps_fourteen_days() {
    let h = harness().await;
    let mut request = h.weekly_request(ymd(2025, 3, 10), 3);
    request.frequency = RecurrenceFrequency::Biweekly;

    let report = h.series.create_series(request).await.unwrap();
    let dates: Vec<NaiveDate> = report.outcomes.iter().map(|o| o.date).collect();
    assert_eq!(dates, vec![ymd(2025, 3, 10), ymd(2025, 3, 24), ymd(2025, 4, 7)]);
    assert_eq!(report.booked_count(), 3);
}

#[tokio::test]
async fn until_bound_includes_its_end_date() {
    let h = harness().await;
    let mut request = h.weekly_request(ymd(2025, 3, 10), 1);
    request.bound = SeriesBound::Until(ymd(2025, 3, 31));

    let report = h.series.create_series(request).await.unwrap();
    let dates: Vec<NaiveDate> = report.outcomes.iter().map(|o| o.date).collect();
    assert_eq!(
        dates,
        vec![ymd(2025, 3, 10), ymd(2025, 3, 17), ymd(2025, 3, 24), ymd(2025, 3, 31)]
    );
}

#[tokio::test]
async fn monthly_by_date_skips_short_months() {
    let h = harness().await;
    let mut request = h.weekly_request(ymd(2025, 1, 31), 3);
    request.frequency = RecurrenceFrequency::MonthlyByDate;

    let report = h.series.create_series(request).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_matches!(report.outcomes[0].result, OccurrenceResult::Booked { .. });
    assert_eq!(report.outcomes[0].date, ymd(2025, 1, 31));
    // February has no 31st; the occurrence is skipped, not moved to the 28th.
    assert_eq!(report.outcomes[1].result, OccurrenceResult::SkippedInvalidDate);
    assert_matches!(report.outcomes[2].result, OccurrenceResult::Booked { .. });
    assert_eq!(report.outcomes[2].date, ymd(2025, 3, 31));
}

#[tokio::test]
async fn monthly_by_weekday_skips_months_without_a_fifth() {
    let h = harness().await;
    // 2025-08-29 is the fifth Friday of August.
    let mut request = h.weekly_request(ymd(2025, 8, 29), 3);
    request.frequency = RecurrenceFrequency::MonthlyByWeekday;

    let report = h.series.create_series(request).await.unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.outcomes[0].date, ymd(2025, 8, 29));
    assert_matches!(report.outcomes[0].result, OccurrenceResult::Booked { .. });
    // September 2025 has only four Fridays.
    assert_eq!(report.outcomes[1].result, OccurrenceResult::SkippedInvalidDate);
    assert_eq!(report.outcomes[2].date, ymd(2025, 10, 31));
    assert_matches!(report.outcomes[2].result, OccurrenceResult::Booked { .. });
}

#[tokio::test]
async fn holiday_occurrences_are_skipped_when_asked() {
    let h = harness().await;
    let holiday = ymd(2025, 3, 17);
    h.availability.add_holiday(holiday, "St Patrick's Day").await.unwrap();

    let mut request = h.weekly_request(ymd(2025, 3, 10), 3);
    request.skip_holidays = true;
    let report = h.series.create_series(request).await.unwrap();
    assert_eq!(report.outcomes[1].result, OccurrenceResult::SkippedHoliday);
    assert_eq!(report.booked_count(), 2);

    // Without the flag the holiday books like any other working day.
    let mut request = h.weekly_request(ymd(2025, 3, 10), 3);
    request.time_of_day = hm(14, 0);
    let report = h.series.create_series(request).await.unwrap();
    assert_matches!(report.outcomes[1].result, OccurrenceResult::Booked { .. });
}

#[tokio::test]
async fn conflicting_occurrence_does_not_abort_the_series() {
    let h = harness().await;
    // Pre-book the second occurrence's slot for another patient.
    let blocker = h
        .coordinator
        .book(BookingRequest {
            provider_id: h.provider_id,
            patient_id: Uuid::new_v4(),
            appointment_type_id: h.consult_id,
            date: ymd(2025, 3, 17),
            start_time: hm(10, 0),
            end_time: None,
            requested_by: "reception".to_string(),
            series_id: None,
        })
        .await
        .unwrap();

    let report = h
        .series
        .create_series(h.weekly_request(ymd(2025, 3, 10), 3))
        .await
        .unwrap();

    assert_eq!(report.booked_count(), 2);
    assert!(report.has_failures());
    assert_matches!(
        report.outcomes[1].result,
        OccurrenceResult::Conflict {
            reason: ConflictReason::OverlapsBooking { booking_id }
        } if booking_id == blocker.id
    );
    assert_matches!(report.outcomes[0].result, OccurrenceResult::Booked { .. });
    assert_matches!(report.outcomes[2].result, OccurrenceResult::Booked { .. });
}

#[tokio::test]
async fn conflicting_occurrence_probes_forward_when_allowed() {
    let h = harness().await;
    h.coordinator
        .book(BookingRequest {
            provider_id: h.provider_id,
            patient_id: Uuid::new_v4(),
            appointment_type_id: h.consult_id,
            date: ymd(2025, 3, 17),
            start_time: hm(10, 0),
            end_time: None,
            requested_by: "reception".to_string(),
            series_id: None,
        })
        .await
        .unwrap();

    let mut request = h.weekly_request(ymd(2025, 3, 10), 3);
    request.reschedule_window_days = Some(2);
    let report = h.series.create_series(request).await.unwrap();

    assert_eq!(report.booked_count(), 3);
    assert!(!report.has_failures());
    // The replacement keeps the series' time of day on the next free day.
    assert_matches!(
        &report.outcomes[1].result,
        OccurrenceResult::Rescheduled { moved_to, .. }
            if *moved_to == ymd(2025, 3, 18).and_time(hm(10, 0)).and_utc()
    );
    assert_eq!(report.series.generated_booking_ids.len(), 3);
}

#[tokio::test]
async fn occurrence_caps_are_enforced() {
    let h = harness().await;
    assert_matches!(
        h.series.create_series(h.weekly_request(ymd(2025, 3, 10), 53)).await,
        Err(SchedulingError::Validation(_))
    );

    let mut request = h.weekly_request(ymd(2025, 3, 10), 25);
    request.frequency = RecurrenceFrequency::MonthlyByDate;
    assert_matches!(
        h.series.create_series(request).await,
        Err(SchedulingError::Validation(_))
    );

    let mut request = h.weekly_request(ymd(2025, 3, 10), 5);
    request.frequency = RecurrenceFrequency::EveryNDays { interval_days: 0 };
    assert_matches!(
        h.series.create_series(request).await,
        Err(SchedulingError::Validation(_))
    );

    let mut request = h.weekly_request(ymd(2025, 3, 10), 1);
    request.bound = SeriesBound::Until(ymd(2025, 3, 1));
    assert_matches!(
        h.series.create_series(request).await,
        Err(SchedulingError::Validation(_))
    );
}

#[tokio::test]
async fn cancelling_a_series_spares_completed_visits() {
    let h = harness().await;
    let report = h
        .series
        .create_series(h.weekly_request(ymd(2025, 3, 10), 3))
        .await
        .unwrap();
    assert_eq!(report.booked_count(), 3);

    // The first visit already happened.
    let first_id = report.series.generated_booking_ids[0];
    h.coordinator
        .transition(first_id, BookingStatus::InProgress, "reception")
        .await
        .unwrap();
    h.coordinator
        .transition(first_id, BookingStatus::Completed, "reception")
        .await
        .unwrap();

    let cancelled = h
        .series
        .cancel_series(report.series.id, "patient")
        .await
        .unwrap();
    assert_eq!(cancelled.status, SeriesStatus::Cancelled);

    assert_eq!(
        h.ledger.get(first_id).await.unwrap().status,
        BookingStatus::Completed
    );
    for booking_id in &report.series.generated_booking_ids[1..] {
        assert_eq!(
            h.ledger.get(*booking_id).await.unwrap().status,
            BookingStatus::Cancelled
        );
    }

    assert_matches!(
        h.series.cancel_series(report.series.id, "patient").await,
        Err(SchedulingError::Validation(_))
    );
}

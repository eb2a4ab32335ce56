// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use shared_models::{ConflictReason, SchedulingError};
use shared_utils::Interval;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub interval: Interval,
    pub status: BookingStatus,
    pub series_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        provider_id: Uuid,
        patient_id: Uuid,
        appointment_type_id: Uuid,
        interval: Interval,
        series_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            provider_id,
            patient_id,
            appointment_type_id,
            interval,
            status: BookingStatus::Scheduled,
            series_id,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl BookingStatus {
    /// Cancelled and no-show bookings free their interval; everything else
    /// still occupies the calendar for conflict purposes.
    pub fn occupies_calendar(&self) -> bool {
        matches!(
            self,
            BookingStatus::Scheduled | BookingStatus::InProgress | BookingStatus::Completed
        )
    }

    pub fn can_transition_to(&self, next: &BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Scheduled, BookingStatus::InProgress)
                | (BookingStatus::Scheduled, BookingStatus::Cancelled)
                | (BookingStatus::Scheduled, BookingStatus::NoShow)
                | (BookingStatus::InProgress, BookingStatus::Completed)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Scheduled => write!(f, "scheduled"),
            BookingStatus::InProgress => write!(f, "in_progress"),
            BookingStatus::Completed => write!(f, "completed"),
            BookingStatus::Cancelled => write!(f, "cancelled"),
            BookingStatus::NoShow => write!(f, "no_show"),
        }
    }
}

// ==============================================================================
// APPOINTMENT TYPE SETTINGS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentTypeSettings {
    pub id: Uuid,
    pub name: String,
    pub duration_minutes: i64,
    /// Mandatory gap after the appointment; never itself bookable.
    pub buffer_after_minutes: i64,
}

/// Appointment type durations and buffers, with optional per-provider
/// overrides resolved on read. Built once at wiring time and shared.
#[derive(Debug, Default)]
pub struct AppointmentTypeCatalog {
    defaults: HashMap<Uuid, AppointmentTypeSettings>,
    overrides: HashMap<(Uuid, Uuid), AppointmentTypeSettings>,
}

impl AppointmentTypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, settings: AppointmentTypeSettings) -> Result<(), SchedulingError> {
        validate_type_settings(&settings)?;
        self.defaults.insert(settings.id, settings);
        Ok(())
    }

    pub fn register_override(
        &mut self,
        provider_id: Uuid,
        settings: AppointmentTypeSettings,
    ) -> Result<(), SchedulingError> {
        validate_type_settings(&settings)?;
        self.overrides.insert((provider_id, settings.id), settings);
        Ok(())
    }

    pub fn resolve(
        &self,
        provider_id: Uuid,
        appointment_type_id: Uuid,
    ) -> Result<&AppointmentTypeSettings, SchedulingError> {
        self.overrides
            .get(&(provider_id, appointment_type_id))
            .or_else(|| self.defaults.get(&appointment_type_id))
            .ok_or_else(|| {
                SchedulingError::not_found(format!("appointment type {}", appointment_type_id))
            })
    }
}

fn validate_type_settings(settings: &AppointmentTypeSettings) -> Result<(), SchedulingError> {
    if settings.duration_minutes <= 0 {
        return Err(SchedulingError::validation(
            "appointment type duration must be positive",
        ));
    }
    if settings.buffer_after_minutes < 0 {
        return Err(SchedulingError::validation(
            "appointment type buffer must not be negative",
        ));
    }
    Ok(())
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    /// Derived from the appointment type duration when omitted.
    pub end_time: Option<NaiveTime>,
    pub requested_by: String,
    #[serde(default)]
    pub series_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub appointment_type_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

// ==============================================================================
// RECURRING SERIES MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecurrenceFrequency {
    Weekly,
    Biweekly,
    /// Same day-of-month as the start date; months without that day skip the
    /// occurrence rather than clamping to month end.
    MonthlyByDate,
    /// Same "Nth weekday of the month" as the start date; a month without an
    /// Nth such weekday skips the occurrence.
    MonthlyByWeekday,
    EveryNDays { interval_days: u32 },
}

impl RecurrenceFrequency {
    /// Weekly-class rules are bounded by the 52-occurrence cap.
    pub fn is_weekly_class(&self) -> bool {
        !matches!(
            self,
            RecurrenceFrequency::MonthlyByDate | RecurrenceFrequency::MonthlyByWeekday
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesBound {
    Until(NaiveDate),
    Count(u32),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSeriesRequest {
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub frequency: RecurrenceFrequency,
    pub time_of_day: NaiveTime,
    pub start_date: NaiveDate,
    pub bound: SeriesBound,
    #[serde(default)]
    pub exception_dates: BTreeSet<NaiveDate>,
    #[serde(default)]
    pub skip_holidays: bool,
    /// When set, a conflicting occurrence probes this many days forward for a
    /// free slot before being marked failed.
    #[serde(default)]
    pub reschedule_window_days: Option<u32>,
    pub requested_by: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeriesStatus {
    Active,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringSeries {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub patient_id: Uuid,
    pub appointment_type_id: Uuid,
    pub frequency: RecurrenceFrequency,
    pub time_of_day: NaiveTime,
    pub start_date: NaiveDate,
    pub bound: SeriesBound,
    pub exception_dates: BTreeSet<NaiveDate>,
    pub skip_holidays: bool,
    pub status: SeriesStatus,
    /// Bookings this series created, in occurrence order.
    pub generated_booking_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceResult {
    Booked { booking_id: Uuid },
    Rescheduled { booking_id: Uuid, moved_to: DateTime<Utc> },
    SkippedException,
    SkippedHoliday,
    /// The rule resolved to a date the month cannot represent (short month).
    SkippedInvalidDate,
    Conflict { reason: ConflictReason },
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccurrenceOutcome {
    /// For `SkippedInvalidDate` this is the first day of the short month.
    pub date: NaiveDate,
    pub result: OccurrenceResult,
}

/// Per-occurrence report for a series expansion. Expansion is not atomic:
/// individual conflicts never abort the remaining occurrences, and this full
/// list always reaches the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesBookingReport {
    pub series: RecurringSeries,
    pub outcomes: Vec<OccurrenceOutcome>,
}

impl SeriesBookingReport {
    pub fn booked_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.result,
                    OccurrenceResult::Booked { .. } | OccurrenceResult::Rescheduled { .. }
                )
            })
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| {
            matches!(
                o.result,
                OccurrenceResult::Conflict { .. } | OccurrenceResult::TimedOut
            )
        })
    }
}

// ==============================================================================
// CALENDAR AGGREGATION MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalendarEventKind {
    Appointment {
        booking_id: Uuid,
        patient_id: Uuid,
        status: BookingStatus,
    },
    AvailabilityWindow,
    Break,
    Leave {
        leave_id: Uuid,
    },
    Holiday,
}

impl CalendarEventKind {
    /// Whether this event claims the provider's time (as opposed to offering it).
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            CalendarEventKind::Appointment { .. }
                | CalendarEventKind::Break
                | CalendarEventKind::Leave { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub kind: CalendarEventKind,
    pub interval: Interval,
    pub label: Option<String>,
}

/// Diagnostic overlap between two blocking events. The coordinator remains
/// the enforcement point; this view only reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConflict {
    pub first: CalendarEvent,
    pub second: CalendarEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarReport {
    pub provider_id: Uuid,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub events: Vec<CalendarEvent>,
    pub conflicts: Vec<CalendarConflict>,
}

// ==============================================================================
// SCHEDULING CONFIGURATION
// ==============================================================================

#[derive(Debug, Clone)]
pub struct SchedulingConfig {
    /// Step between candidate slot starts.
    pub slot_step_minutes: i64,
    /// Deadline for one check-and-commit section.
    pub commit_timeout_ms: u64,
    /// Occurrence cap for weekly-class recurrence rules.
    pub max_weekly_occurrences: u32,
    /// Occurrence cap for monthly recurrence rules.
    pub max_monthly_occurrences: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 15,
            commit_timeout_ms: 5_000,
            max_weekly_occurrences: 52,
            max_monthly_occurrences: 24,
        }
    }
}

// libs/availability-cell/src/models.rs
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use shared_models::SchedulingError;
use uuid::Uuid;

// ==============================================================================
// PROVIDER SCHEDULE CONFIGURATION MODELS
// ==============================================================================

/// Recurring weekly working hours, one rule per provider per day of week.
/// Non-working days carry no times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingHoursRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u8,
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub updated_at: DateTime<Utc>,
}

/// A specific calendar date overriding the weekly rule. When present it fully
/// supersedes the weekly rule for that date, including `is_working = false`
/// holidays and special shortened hours.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateException {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub date: NaiveDate,
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub label: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
}

/// Leave request with a soft lifecycle: records are never deleted, only
/// status-transitioned. Only approved leave affects scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeavePeriod {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub status: LeaveStatus,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LeavePeriod {
    pub fn is_approved(&self) -> bool {
        self.status == LeaveStatus::Approved
    }

    /// Legal status transitions: pending is decided once, and anything not yet
    /// rejected can be cancelled by the requester.
    pub fn can_transition_to(&self, next: &LeaveStatus) -> bool {
        matches!(
            (&self.status, next),
            (LeaveStatus::Pending, LeaveStatus::Approved)
                | (LeaveStatus::Pending, LeaveStatus::Rejected)
                | (LeaveStatus::Pending, LeaveStatus::Cancelled)
                | (LeaveStatus::Approved, LeaveStatus::Cancelled)
        )
    }
}

/// Recurring per-day-of-week break (lunch, ward rounds). Active on a date when
/// the day of week matches and the date falls inside the effective range; open
/// ends are unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakRule {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

impl BreakRule {
    pub fn active_on(&self, date: NaiveDate) -> bool {
        if day_of_week_index(date.weekday()) != self.day_of_week {
            return false;
        }
        if let Some(from) = self.effective_from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.effective_to {
            if date > to {
                return false;
            }
        }
        true
    }
}

/// Practice-wide holiday, consulted by holiday-skipping series rules and the
/// calendar aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub date: NaiveDate,
    pub label: String,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetWorkingHoursRequest {
    pub day_of_week: u8,
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDateExceptionRequest {
    pub date: NaiveDate,
    pub is_working: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLeaveRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub all_day: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBreakRuleRequest {
    pub day_of_week: u8,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub effective_from: Option<NaiveDate>,
    pub effective_to: Option<NaiveDate>,
}

// ==============================================================================
// VALIDATION HELPERS
// ==============================================================================

/// 0 = Sunday .. 6 = Saturday, matching the stored `day_of_week` encoding.
pub fn day_of_week_index(weekday: Weekday) -> u8 {
    match weekday {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

pub fn validate_day_of_week(day_of_week: u8) -> Result<(), SchedulingError> {
    if day_of_week > 6 {
        return Err(SchedulingError::validation(format!(
            "day of week must be between 0 (Sunday) and 6 (Saturday), got {}",
            day_of_week
        )));
    }
    Ok(())
}

pub fn validate_wall_time_range(
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
) -> Result<(NaiveTime, NaiveTime), SchedulingError> {
    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok((start, end)),
        (Some(_), Some(_)) => Err(SchedulingError::validation(
            "start time must be before end time",
        )),
        _ => Err(SchedulingError::validation(
            "working entries require both start and end times",
        )),
    }
}

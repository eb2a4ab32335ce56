// libs/availability-cell/src/services/availability.rs
use chrono::{Datelike, NaiveDate, Utc};
use shared_models::SchedulingError;
use shared_utils::Interval;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::models::{
    day_of_week_index, validate_day_of_week, validate_wall_time_range, BreakRule,
    CreateBreakRuleRequest, CreateDateExceptionRequest, DateException, Holiday, LeavePeriod,
    LeaveStatus, RequestLeaveRequest, SetWorkingHoursRequest, WorkingHoursRule,
};
use crate::store::AvailabilityStore;

/// Resolves a provider's layered availability rules into concrete intervals
/// for a calendar date, and owns the configuration writes that feed them.
pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityStore>) -> Self {
        Self { store }
    }

    /// The provider's bookable window for a date: the date exception when one
    /// exists, otherwise the weekly rule. `None` means not a working day.
    /// Fails with `NotFound` when the provider has no configuration at all, so
    /// callers must choose their own default policy.
    pub async fn effective_window(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<Interval>, SchedulingError> {
        if let Some(exception) = self.store.exception_on(provider_id, date).await? {
            debug!(%provider_id, %date, label = ?exception.label, "date exception supersedes weekly rule");
            if !exception.is_working {
                return Ok(None);
            }
            let (start, end) = validate_wall_time_range(exception.start_time, exception.end_time)?;
            return Ok(Some(Interval::on_date(date, start, end)?));
        }

        let rules = self.store.working_hours(provider_id).await?;
        if rules.is_empty() {
            return Err(SchedulingError::not_found(format!(
                "availability configuration for provider {}",
                provider_id
            )));
        }

        let day = day_of_week_index(date.weekday());
        let rule = rules.iter().find(|r| r.day_of_week == day);
        match rule {
            Some(rule) if rule.is_working => {
                let (start, end) = validate_wall_time_range(rule.start_time, rule.end_time)?;
                Ok(Some(Interval::on_date(date, start, end)?))
            }
            _ => Ok(None),
        }
    }

    /// Approved leave overlapping the given date, ordered by start time.
    pub async fn leave_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<LeavePeriod>, SchedulingError> {
        let day = Interval::whole_day(date);
        let leave = self
            .store
            .leave_in_range(provider_id, day.start(), day.end())
            .await?;
        Ok(leave.into_iter().filter(|l| l.is_approved()).collect())
    }

    /// Approved leave overlapping `[from, to)`, ordered by start time.
    pub async fn approved_leave_between(
        &self,
        provider_id: Uuid,
        from: chrono::DateTime<Utc>,
        to: chrono::DateTime<Utc>,
    ) -> Result<Vec<LeavePeriod>, SchedulingError> {
        let leave = self.store.leave_in_range(provider_id, from, to).await?;
        Ok(leave.into_iter().filter(|l| l.is_approved()).collect())
    }

    /// Break rules active on the date, concretized to intervals on that date.
    pub async fn breaks_for(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Interval>, SchedulingError> {
        let rules = self.store.break_rules(provider_id).await?;
        let mut intervals = Vec::new();
        for rule in rules.iter().filter(|r| r.active_on(date)) {
            intervals.push(Interval::on_date(date, rule.start_time, rule.end_time)?);
        }
        intervals.sort_by_key(|iv| iv.start());
        Ok(intervals)
    }

    // ==========================================================================
    // CONFIGURATION WRITES
    // ==========================================================================

    pub async fn set_weekly_hours(
        &self,
        provider_id: Uuid,
        request: SetWorkingHoursRequest,
    ) -> Result<WorkingHoursRule, SchedulingError> {
        validate_day_of_week(request.day_of_week)?;
        let (start_time, end_time) = if request.is_working {
            let (start, end) = validate_wall_time_range(request.start_time, request.end_time)?;
            (Some(start), Some(end))
        } else {
            (None, None)
        };

        let rule = WorkingHoursRule {
            id: Uuid::new_v4(),
            provider_id,
            day_of_week: request.day_of_week,
            is_working: request.is_working,
            start_time,
            end_time,
            updated_at: Utc::now(),
        };
        self.store.upsert_working_hours(rule.clone()).await?;
        debug!(%provider_id, day = rule.day_of_week, working = rule.is_working, "weekly hours updated");
        Ok(rule)
    }

    /// At most one exception per provider per date; duplicates are rejected.
    pub async fn add_exception(
        &self,
        provider_id: Uuid,
        request: CreateDateExceptionRequest,
    ) -> Result<DateException, SchedulingError> {
        let (start_time, end_time) = if request.is_working {
            let (start, end) = validate_wall_time_range(request.start_time, request.end_time)?;
            (Some(start), Some(end))
        } else {
            (None, None)
        };

        let exception = DateException {
            id: Uuid::new_v4(),
            provider_id,
            date: request.date,
            is_working: request.is_working,
            start_time,
            end_time,
            label: request.label,
            created_at: Utc::now(),
        };
        self.store.insert_exception(exception.clone()).await?;
        debug!(%provider_id, date = %exception.date, "date exception created");
        Ok(exception)
    }

    pub async fn request_leave(
        &self,
        provider_id: Uuid,
        request: RequestLeaveRequest,
    ) -> Result<LeavePeriod, SchedulingError> {
        if request.start_time >= request.end_time {
            return Err(SchedulingError::validation(
                "leave start must be before leave end",
            ));
        }

        let now = Utc::now();
        let leave = LeavePeriod {
            id: Uuid::new_v4(),
            provider_id,
            start_time: request.start_time,
            end_time: request.end_time,
            all_day: request.all_day,
            status: LeaveStatus::Pending,
            reason: request.reason,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_leave(leave.clone()).await?;
        debug!(%provider_id, leave_id = %leave.id, all_day = leave.all_day, "leave requested");
        Ok(leave)
    }

    /// Status transition with legality checking; the soft lifecycle means the
    /// record itself is never deleted.
    pub async fn decide_leave(
        &self,
        leave_id: Uuid,
        status: LeaveStatus,
    ) -> Result<LeavePeriod, SchedulingError> {
        let current = self.store.get_leave(leave_id).await?;
        if !current.can_transition_to(&status) {
            return Err(SchedulingError::validation(format!(
                "leave {} cannot move from {:?} to {:?}",
                leave_id, current.status, status
            )));
        }
        self.store.set_leave_status(leave_id, status).await
    }

    pub async fn add_break_rule(
        &self,
        provider_id: Uuid,
        request: CreateBreakRuleRequest,
    ) -> Result<BreakRule, SchedulingError> {
        validate_day_of_week(request.day_of_week)?;
        if request.start_time >= request.end_time {
            return Err(SchedulingError::validation(
                "break start must be before break end",
            ));
        }
        if let (Some(from), Some(to)) = (request.effective_from, request.effective_to) {
            if from > to {
                return Err(SchedulingError::validation(
                    "break effective-from must not be after effective-to",
                ));
            }
        }

        let rule = BreakRule {
            id: Uuid::new_v4(),
            provider_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            effective_from: request.effective_from,
            effective_to: request.effective_to,
        };
        self.store.insert_break_rule(rule.clone()).await?;
        Ok(rule)
    }

    pub async fn add_holiday(
        &self,
        date: NaiveDate,
        label: impl Into<String>,
    ) -> Result<(), SchedulingError> {
        self.store
            .insert_holiday(Holiday {
                date,
                label: label.into(),
            })
            .await
    }

    pub async fn is_holiday(&self, date: NaiveDate) -> Result<bool, SchedulingError> {
        self.store.is_holiday(date).await
    }

    pub async fn holidays_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Holiday>, SchedulingError> {
        self.store.holidays_between(from, to).await
    }
}

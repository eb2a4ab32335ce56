// libs/availability-cell/src/store.rs
//
// Storage seam for provider schedule configuration. Any durable store with
// range queries over time can sit behind this trait; the in-memory
// implementation backs the tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared_models::SchedulingError;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{BreakRule, DateException, Holiday, LeavePeriod, LeaveStatus, WorkingHoursRule};

#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    /// Weekly rules for a provider; empty when the provider has never been
    /// configured.
    async fn working_hours(&self, provider_id: Uuid) -> Result<Vec<WorkingHoursRule>, SchedulingError>;

    /// Insert or replace the rule for the given provider + day of week.
    async fn upsert_working_hours(&self, rule: WorkingHoursRule) -> Result<(), SchedulingError>;

    async fn exception_on(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DateException>, SchedulingError>;

    async fn insert_exception(&self, exception: DateException) -> Result<(), SchedulingError>;

    /// Leave entries (any status) overlapping `[from, to)`.
    async fn leave_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeavePeriod>, SchedulingError>;

    async fn insert_leave(&self, leave: LeavePeriod) -> Result<(), SchedulingError>;

    async fn get_leave(&self, leave_id: Uuid) -> Result<LeavePeriod, SchedulingError>;

    async fn set_leave_status(
        &self,
        leave_id: Uuid,
        status: LeaveStatus,
    ) -> Result<LeavePeriod, SchedulingError>;

    async fn break_rules(&self, provider_id: Uuid) -> Result<Vec<BreakRule>, SchedulingError>;

    async fn insert_break_rule(&self, rule: BreakRule) -> Result<(), SchedulingError>;

    async fn insert_holiday(&self, holiday: Holiday) -> Result<(), SchedulingError>;

    async fn holidays_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Holiday>, SchedulingError>;

    async fn is_holiday(&self, date: NaiveDate) -> Result<bool, SchedulingError> {
        Ok(self
            .holidays_between(date, date)
            .await?
            .iter()
            .any(|h| h.date == date))
    }
}

#[derive(Default)]
struct AvailabilityTables {
    working_hours: HashMap<Uuid, Vec<WorkingHoursRule>>,
    exceptions: HashMap<Uuid, Vec<DateException>>,
    leave: HashMap<Uuid, LeavePeriod>,
    breaks: HashMap<Uuid, Vec<BreakRule>>,
    holidays: Vec<Holiday>,
}

#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    inner: RwLock<AvailabilityTables>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn working_hours(&self, provider_id: Uuid) -> Result<Vec<WorkingHoursRule>, SchedulingError> {
        let tables = self.inner.read().await;
        Ok(tables
            .working_hours
            .get(&provider_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_working_hours(&self, rule: WorkingHoursRule) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        let rules = tables.working_hours.entry(rule.provider_id).or_default();
        rules.retain(|existing| existing.day_of_week != rule.day_of_week);
        rules.push(rule);
        rules.sort_by_key(|r| r.day_of_week);
        Ok(())
    }

    async fn exception_on(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Option<DateException>, SchedulingError> {
        let tables = self.inner.read().await;
        Ok(tables
            .exceptions
            .get(&provider_id)
            .and_then(|entries| entries.iter().find(|e| e.date == date).cloned()))
    }

    async fn insert_exception(&self, exception: DateException) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        let entries = tables.exceptions.entry(exception.provider_id).or_default();
        if entries.iter().any(|e| e.date == exception.date) {
            return Err(SchedulingError::validation(format!(
                "a date exception already exists for {}",
                exception.date
            )));
        }
        entries.push(exception);
        Ok(())
    }

    async fn leave_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<LeavePeriod>, SchedulingError> {
        let tables = self.inner.read().await;
        let mut entries: Vec<LeavePeriod> = tables
            .leave
            .values()
            .filter(|leave| {
                leave.provider_id == provider_id && leave.start_time < to && from < leave.end_time
            })
            .cloned()
            .collect();
        entries.sort_by_key(|leave| leave.start_time);
        Ok(entries)
    }

    async fn insert_leave(&self, leave: LeavePeriod) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        tables.leave.insert(leave.id, leave);
        Ok(())
    }

    async fn get_leave(&self, leave_id: Uuid) -> Result<LeavePeriod, SchedulingError> {
        let tables = self.inner.read().await;
        tables
            .leave
            .get(&leave_id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("leave period {}", leave_id)))
    }

    async fn set_leave_status(
        &self,
        leave_id: Uuid,
        status: LeaveStatus,
    ) -> Result<LeavePeriod, SchedulingError> {
        let mut tables = self.inner.write().await;
        let leave = tables
            .leave
            .get_mut(&leave_id)
            .ok_or_else(|| SchedulingError::not_found(format!("leave period {}", leave_id)))?;
        leave.status = status;
        leave.updated_at = Utc::now();
        Ok(leave.clone())
    }

    async fn break_rules(&self, provider_id: Uuid) -> Result<Vec<BreakRule>, SchedulingError> {
        let tables = self.inner.read().await;
        Ok(tables.breaks.get(&provider_id).cloned().unwrap_or_default())
    }

    async fn insert_break_rule(&self, rule: BreakRule) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        tables.breaks.entry(rule.provider_id).or_default().push(rule);
        Ok(())
    }

    async fn insert_holiday(&self, holiday: Holiday) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        if !tables.holidays.iter().any(|h| h.date == holiday.date) {
            tables.holidays.push(holiday);
            tables.holidays.sort_by_key(|h| h.date);
        }
        Ok(())
    }

    async fn holidays_between(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Holiday>, SchedulingError> {
        let tables = self.inner.read().await;
        Ok(tables
            .holidays
            .iter()
            .filter(|h| h.date >= from && h.date <= to)
            .cloned()
            .collect())
    }
}

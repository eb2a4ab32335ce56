// libs/appointment-cell/src/store.rs
//
// Booking ledger seam. The ledger is the authoritative set of committed
// appointments; `insert` never performs conflict checking so the detector can
// be tested and reused for dry-run availability queries without side effects.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared_models::SchedulingError;
use shared_utils::Interval;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, RecurringSeries, SeriesStatus};

#[async_trait]
pub trait BookingLedger: Send + Sync {
    /// Mutation-only entry point used by the booking coordinator.
    async fn insert(&self, booking: Booking) -> Result<Uuid, SchedulingError>;

    async fn get(&self, booking_id: Uuid) -> Result<Booking, SchedulingError>;

    async fn set_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<Booking, SchedulingError>;

    async fn reschedule(
        &self,
        booking_id: Uuid,
        interval: Interval,
    ) -> Result<Booking, SchedulingError>;

    /// Calendar-occupying bookings whose interval overlaps the date, ordered
    /// by start time.
    async fn bookings_on(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, SchedulingError>;

    /// Calendar-occupying bookings overlapping `[from, to)`, ordered by start
    /// time.
    async fn bookings_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulingError>;

    async fn insert_series(&self, series: RecurringSeries) -> Result<(), SchedulingError>;

    async fn get_series(&self, series_id: Uuid) -> Result<RecurringSeries, SchedulingError>;

    async fn append_series_booking(
        &self,
        series_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), SchedulingError>;

    async fn set_series_status(
        &self,
        series_id: Uuid,
        status: SeriesStatus,
    ) -> Result<RecurringSeries, SchedulingError>;
}

#[derive(Default)]
struct LedgerTables {
    bookings: HashMap<Uuid, Booking>,
    series: HashMap<Uuid, RecurringSeries>,
}

/// Reference ledger used by tests and single-process deployments. A durable
/// store with time-range queries drops in behind the same trait.
#[derive(Default)]
pub struct InMemoryBookingLedger {
    inner: RwLock<LedgerTables>,
}

impl InMemoryBookingLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

fn collect_active(
    tables: &LedgerTables,
    provider_id: Uuid,
    span: &Interval,
) -> Vec<Booking> {
    let mut bookings: Vec<Booking> = tables
        .bookings
        .values()
        .filter(|b| {
            b.provider_id == provider_id
                && b.status.occupies_calendar()
                && b.interval.overlaps(span)
        })
        .cloned()
        .collect();
    bookings.sort_by_key(|b| b.interval.start());
    bookings
}

#[async_trait]
impl BookingLedger for InMemoryBookingLedger {
    async fn insert(&self, booking: Booking) -> Result<Uuid, SchedulingError> {
        let mut tables = self.inner.write().await;
        let id = booking.id;
        tables.bookings.insert(id, booking);
        Ok(id)
    }

    async fn get(&self, booking_id: Uuid) -> Result<Booking, SchedulingError> {
        let tables = self.inner.read().await;
        tables
            .bookings
            .get(&booking_id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("booking {}", booking_id)))
    }

    async fn set_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<Booking, SchedulingError> {
        let mut tables = self.inner.write().await;
        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| SchedulingError::not_found(format!("booking {}", booking_id)))?;
        booking.status = status;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn reschedule(
        &self,
        booking_id: Uuid,
        interval: Interval,
    ) -> Result<Booking, SchedulingError> {
        let mut tables = self.inner.write().await;
        let booking = tables
            .bookings
            .get_mut(&booking_id)
            .ok_or_else(|| SchedulingError::not_found(format!("booking {}", booking_id)))?;
        booking.interval = interval;
        booking.updated_at = Utc::now();
        Ok(booking.clone())
    }

    async fn bookings_on(
        &self,
        provider_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Booking>, SchedulingError> {
        let tables = self.inner.read().await;
        Ok(collect_active(&tables, provider_id, &Interval::whole_day(date)))
    }

    async fn bookings_in_range(
        &self,
        provider_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Booking>, SchedulingError> {
        let span = Interval::new(from, to)?;
        let tables = self.inner.read().await;
        Ok(collect_active(&tables, provider_id, &span))
    }

    async fn insert_series(&self, series: RecurringSeries) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        tables.series.insert(series.id, series);
        Ok(())
    }

    async fn get_series(&self, series_id: Uuid) -> Result<RecurringSeries, SchedulingError> {
        let tables = self.inner.read().await;
        tables
            .series
            .get(&series_id)
            .cloned()
            .ok_or_else(|| SchedulingError::not_found(format!("series {}", series_id)))
    }

    async fn append_series_booking(
        &self,
        series_id: Uuid,
        booking_id: Uuid,
    ) -> Result<(), SchedulingError> {
        let mut tables = self.inner.write().await;
        let series = tables
            .series
            .get_mut(&series_id)
            .ok_or_else(|| SchedulingError::not_found(format!("series {}", series_id)))?;
        series.generated_booking_ids.push(booking_id);
        Ok(())
    }

    async fn set_series_status(
        &self,
        series_id: Uuid,
        status: SeriesStatus,
    ) -> Result<RecurringSeries, SchedulingError> {
        let mut tables = self.inner.write().await;
        let series = tables
            .series
            .get_mut(&series_id)
            .ok_or_else(|| SchedulingError::not_found(format!("series {}", series_id)))?;
        series.status = status;
        Ok(series.clone())
    }
}

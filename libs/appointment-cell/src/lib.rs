pub mod models;
pub mod services;
pub mod store;

// Re-export models and services for external use
pub use models::*;
pub use services::booking::BookingCoordinator;
pub use services::calendar::CalendarService;
pub use services::conflict::ConflictDetectionService;
pub use services::recurring::RecurringSeriesService;
pub use services::slots::SlotGeneratorService;
pub use store::{BookingLedger, InMemoryBookingLedger};

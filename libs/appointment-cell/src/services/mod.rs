pub mod booking;
pub mod calendar;
pub mod conflict;
pub mod recurring;
pub mod slots;

pub use booking::BookingCoordinator;
pub use calendar::CalendarService;
pub use conflict::ConflictDetectionService;
pub use recurring::RecurringSeriesService;
pub use slots::SlotGeneratorService;

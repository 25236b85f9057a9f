pub mod holiday_notifier;
pub mod retraction_sweeper;

pub use holiday_notifier::{spawn_holiday_notifier_task, HolidayNotifier, NotifyOutcome};
pub use retraction_sweeper::{spawn_retraction_sweeper_task, RetractionSweeper, SweepReport};

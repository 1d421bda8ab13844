pub mod read_scheduler;
pub mod settings;

pub use read_scheduler::{ReadScheduler, ReadStats, SchedulerState};
pub use settings::{ReopenPolicy, ScheduleSettings, ThrottleMode};

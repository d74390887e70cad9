pub mod order_schedule;

pub use order_schedule::{OrderScheduleWorker, ScheduleError};

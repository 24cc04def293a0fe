pub mod attendance;
pub mod backup;
pub mod calendar;
pub mod core;
pub mod messages;
pub mod students;

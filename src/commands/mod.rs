pub mod alarms;
pub mod control;
pub mod list;
pub mod serve;

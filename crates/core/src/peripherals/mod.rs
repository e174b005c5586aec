pub mod gpio;
pub mod watchdog;

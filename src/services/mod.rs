pub mod availability;
pub mod calendar;
pub mod lifecycle;
pub mod retry;
pub mod scheduling;

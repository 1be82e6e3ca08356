pub mod actor;
pub mod availability;
pub mod enquiry;
pub mod interval;

pub use actor::Actor;
pub use availability::AvailabilityReport;
pub use enquiry::{EnquiryAction, EnquiryStatus, ServiceCategory, ServiceEnquiry, DEFAULT_RESOURCE};
pub use interval::{format_time, parse_time, parse_window_bound, Interval, InvalidTime, MINUTES_PER_DAY};

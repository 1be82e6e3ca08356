use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::interval::Interval;

pub const DEFAULT_RESOURCE: &str = "primary";

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEnquiry {
    pub id: String,
    pub requester_id: String,
    pub category: ServiceCategory,
    pub resource_id: String,
    pub requested_date: NaiveDate,
    pub start_minute: u32,
    pub duration_minutes: u32,
    pub status: EnquiryStatus,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ServiceEnquiry {
    pub fn interval(&self) -> Interval {
        Interval::from_start(self.start_minute, self.duration_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Planing,
    Resawing,
    Debarking,
    Sawing,
    Other,
}

impl ServiceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceCategory::Planing => "planing",
            ServiceCategory::Resawing => "resawing",
            ServiceCategory::Debarking => "debarking",
            ServiceCategory::Sawing => "sawing",
            ServiceCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "planing" => Some(ServiceCategory::Planing),
            "resawing" => Some(ServiceCategory::Resawing),
            "debarking" => Some(ServiceCategory::Debarking),
            "sawing" => Some(ServiceCategory::Sawing),
            "other" => Some(ServiceCategory::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryStatus {
    Requested,
    Confirmed,
    Rejected,
    Completed,
    Cancelled,
}

impl EnquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryStatus::Requested => "requested",
            EnquiryStatus::Confirmed => "confirmed",
            EnquiryStatus::Rejected => "rejected",
            EnquiryStatus::Completed => "completed",
            EnquiryStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(EnquiryStatus::Requested),
            "confirmed" => Some(EnquiryStatus::Confirmed),
            "rejected" => Some(EnquiryStatus::Rejected),
            "completed" => Some(EnquiryStatus::Completed),
            "cancelled" => Some(EnquiryStatus::Cancelled),
            _ => None,
        }
    }

    /// Whether an enquiry in this status still occupies its interval.
    pub fn is_blocking(&self) -> bool {
        matches!(self, EnquiryStatus::Requested | EnquiryStatus::Confirmed)
    }

    /// The status reached by applying `action`, or `None` if the transition is illegal.
    pub fn apply(self, action: EnquiryAction) -> Option<EnquiryStatus> {
        use EnquiryAction::*;
        use EnquiryStatus::*;
        match (self, action) {
            (Requested, Confirm) => Some(Confirmed),
            (Requested, Reject) => Some(Rejected),
            (Requested, Cancel) | (Confirmed, Cancel) => Some(Cancelled),
            (Confirmed, Complete) => Some(Completed),
            _ => None,
        }
    }
}

impl fmt::Display for EnquiryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EnquiryAction {
    Confirm,
    Reject,
    Cancel,
    Complete,
}

impl EnquiryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnquiryAction::Confirm => "confirm",
            EnquiryAction::Reject => "reject",
            EnquiryAction::Cancel => "cancel",
            EnquiryAction::Complete => "complete",
        }
    }
}

impl fmt::Display for EnquiryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Entity Models
// One module per record kind of the civic registry.
//
// Each entity has:
// - Stable identity (UUID string) assigned on creation
// - An input payload as it arrives from a form/API call
// - Validation that turns the payload into a stored record

pub mod citizen;
pub mod complaint;
pub mod family;
pub mod marriage;
pub mod official;
pub mod service;

pub use citizen::{Citizen, CitizenInput, CitizenUpdate};
pub use complaint::{
    Complaint, ComplaintCategory, ComplaintInput, ComplaintPriority, ComplaintStatus,
    StatusUpdate,
};
pub use family::{Family, FamilyDetail, FamilyInput};
pub use marriage::{Marriage, MarriageInput};
pub use official::{OfficialPosting, PostingInput};
pub use service::{IssueRequest, ServiceRecord, ServiceType, ServiceTypeInput};

use crate::error::{CivicError, CivicResult};
use chrono::NaiveDate;

/// Date format used for every calendar date in the registry
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Required text field: present and not blank after trimming
pub(crate) fn required(field: &str, value: Option<String>) -> CivicResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CivicError::validation(format!("{} is required", field))),
    }
}

/// Optional text field: blank strings collapse to None
pub(crate) fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_date(field: &str, value: &str) -> CivicResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| {
        CivicError::validation(format!("{} must be a date in YYYY-MM-DD format", field))
    })
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank() {
        assert!(required("full_name", None).is_err());
        assert!(required("full_name", Some("   ".to_string())).is_err());
        assert_eq!(
            required("full_name", Some("  Asha Rao ".to_string())).unwrap(),
            "Asha Rao"
        );
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("dob", "1990-04-12").unwrap();
        assert_eq!(format_date(&date), "1990-04-12");

        let err = parse_date("dob", "12/04/1990").unwrap_err();
        assert!(err.to_string().contains("dob"));
    }
}

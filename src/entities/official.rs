// Official postings: who holds which designation where, and for how long

use super::{format_date, new_id, optional, parse_date, required};
use crate::error::{CivicError, CivicResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficialPosting {
    pub id: String,
    pub official_name: String,
    pub designation: String,
    pub location: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl OfficialPosting {
    pub fn from_input(input: PostingInput) -> CivicResult<Self> {
        let official_name = required("official_name", input.official_name)?;
        let designation = required("designation", input.designation)?;
        let location = required("location", input.location)?;

        let start_date = optional(input.start_date)
            .map(|d| parse_date("start_date", &d))
            .transpose()?;
        let end_date = optional(input.end_date)
            .map(|d| parse_date("end_date", &d))
            .transpose()?;

        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(CivicError::validation(
                    "end_date must not be before start_date",
                ));
            }
        }

        Ok(OfficialPosting {
            id: new_id(),
            official_name,
            designation,
            location,
            start_date,
            end_date,
            created_at: Utc::now(),
        })
    }

    /// A posting with no end date is still active
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.start_date.map_or(true, |s| s <= day) && self.end_date.map_or(true, |e| day <= e)
    }

    pub fn start_date_string(&self) -> Option<String> {
        self.start_date.as_ref().map(format_date)
    }

    pub fn end_date_string(&self) -> Option<String> {
        self.end_date.as_ref().map(format_date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostingInput {
    #[serde(default)]
    pub official_name: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

// 💍 Marriage Entity - registration of a marriage between two citizens

use super::{format_date, new_id, optional, parse_date, required};
use crate::error::{CivicError, CivicResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marriage {
    pub id: String,
    pub spouse1_id: String,
    pub spouse2_id: String,
    pub marriage_date: NaiveDate,
    pub place: Option<String>,
    pub registration_number: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Marriage {
    /// Validates the payload shape. Whether both spouses exist is checked
    /// against the store by the registry.
    pub fn from_input(input: MarriageInput) -> CivicResult<Self> {
        let spouse1_id = required("spouse1_id", input.spouse1_id)?;
        let spouse2_id = required("spouse2_id", input.spouse2_id)?;
        if spouse1_id == spouse2_id {
            return Err(CivicError::validation(
                "spouse1_id and spouse2_id must be different citizens",
            ));
        }
        let marriage_date = required("marriage_date", input.marriage_date)?;
        let marriage_date = parse_date("marriage_date", &marriage_date)?;

        Ok(Marriage {
            id: new_id(),
            spouse1_id,
            spouse2_id,
            marriage_date,
            place: optional(input.place),
            registration_number: optional(input.registration_number),
            created_at: Utc::now(),
        })
    }

    pub fn marriage_date_string(&self) -> String {
        format_date(&self.marriage_date)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarriageInput {
    #[serde(default)]
    pub spouse1_id: Option<String>,
    #[serde(default)]
    pub spouse2_id: Option<String>,
    #[serde(default)]
    pub marriage_date: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub registration_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spouses_must_differ() {
        let err = Marriage::from_input(MarriageInput {
            spouse1_id: Some("a".to_string()),
            spouse2_id: Some("a".to_string()),
            marriage_date: Some("2020-02-14".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CivicError::Validation(_)));
    }

    #[test]
    fn test_valid_marriage() {
        let marriage = Marriage::from_input(MarriageInput {
            spouse1_id: Some("a".to_string()),
            spouse2_id: Some("b".to_string()),
            marriage_date: Some("2020-02-14".to_string()),
            place: Some("Mysuru".to_string()),
            registration_number: None,
        })
        .unwrap();

        assert_eq!(marriage.marriage_date_string(), "2020-02-14");
        assert_eq!(marriage.place.as_deref(), Some("Mysuru"));
    }
}

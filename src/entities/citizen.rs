// 🧑 Citizen Entity - identity record of a registered person
//
// A citizen optionally belongs to one family. The income figure feeds the
// family's derived total (see income.rs).

use super::{format_date, new_id, optional, parse_date, required};
use crate::error::{CivicError, CivicResult};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// CITIZEN ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citizen {
    /// Stable identity (UUID)
    pub id: String,

    pub full_name: String,
    pub dob: NaiveDate,
    pub gender: Option<String>,
    pub phone: Option<String>,

    /// National identity number
    pub aadhar_number: Option<String>,
    pub address: Option<String>,

    /// Annual income; None counts as zero in family totals
    pub income: Option<f64>,

    pub family_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Citizen {
    /// Build a new citizen record from a registration payload
    pub fn from_input(input: CitizenInput) -> CivicResult<Self> {
        let full_name = required("full_name", input.full_name)?;
        let dob = required("dob", input.dob)?;
        let dob = parse_date("dob", &dob)?;
        validate_income(input.income)?;

        Ok(Citizen {
            id: new_id(),
            full_name,
            dob,
            gender: optional(input.gender),
            phone: optional(input.phone),
            aadhar_number: optional(input.aadhar_number),
            address: optional(input.address),
            income: input.income,
            family_id: optional(input.family_id),
            created_at: Utc::now(),
        })
    }

    /// Apply an edit in place. Only fields present in the update change.
    pub fn apply(&mut self, update: &CitizenUpdate) -> CivicResult<()> {
        validate_income(update.income)?;

        if let Some(name) = &update.full_name {
            self.full_name = required("full_name", Some(name.clone()))?;
        }
        if let Some(dob) = &update.dob {
            self.dob = parse_date("dob", dob)?;
        }
        if update.gender.is_some() {
            self.gender = optional(update.gender.clone());
        }
        if update.phone.is_some() {
            self.phone = optional(update.phone.clone());
        }
        if update.aadhar_number.is_some() {
            self.aadhar_number = optional(update.aadhar_number.clone());
        }
        if update.address.is_some() {
            self.address = optional(update.address.clone());
        }
        if update.income.is_some() {
            self.income = update.income;
        }
        if let Some(family_id) = optional(update.family_id.clone()) {
            self.family_id = Some(family_id);
        }

        Ok(())
    }

    pub fn dob_string(&self) -> String {
        format_date(&self.dob)
    }
}

fn validate_income(income: Option<f64>) -> CivicResult<()> {
    match income {
        Some(value) if !value.is_finite() || value < 0.0 => Err(CivicError::validation(
            "Annual income must be >= 0.",
        )),
        _ => Ok(()),
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Registration payload. Accepts the legacy form names `name` and
/// `annual_income` as well.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitizenInput {
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub aadhar_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, alias = "annual_income")]
    pub income: Option<f64>,
    #[serde(default)]
    pub family_id: Option<String>,
}

/// Edit payload; absent fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CitizenUpdate {
    #[serde(default, alias = "name")]
    pub full_name: Option<String>,
    #[serde(default)]
    pub dob: Option<String>,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub aadhar_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, alias = "annual_income")]
    pub income: Option<f64>,
    #[serde(default)]
    pub family_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str, dob: &str, income: Option<f64>) -> CitizenInput {
        CitizenInput {
            full_name: Some(name.to_string()),
            dob: Some(dob.to_string()),
            income,
            ..Default::default()
        }
    }

    #[test]
    fn test_citizen_creation() {
        let citizen = Citizen::from_input(input("Asha Rao", "1990-04-12", Some(50000.0))).unwrap();

        assert!(!citizen.id.is_empty());
        assert_eq!(citizen.full_name, "Asha Rao");
        assert_eq!(citizen.dob_string(), "1990-04-12");
        assert_eq!(citizen.income, Some(50000.0));
        assert!(citizen.family_id.is_none());
    }

    #[test]
    fn test_name_and_dob_are_mandatory() {
        let missing_name = CitizenInput {
            dob: Some("1990-04-12".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Citizen::from_input(missing_name),
            Err(CivicError::Validation(_))
        ));

        let missing_dob = CitizenInput {
            full_name: Some("Asha".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Citizen::from_input(missing_dob),
            Err(CivicError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_income_rejected() {
        let err = Citizen::from_input(input("Asha", "1990-04-12", Some(-1.0))).unwrap_err();
        assert!(err.to_string().contains("income"));
    }

    #[test]
    fn test_legacy_field_names() {
        let json = r#"{"name": "Ravi", "dob": "1985-01-30", "annual_income": 1200.5}"#;
        let parsed: CitizenInput = serde_json::from_str(json).unwrap();
        let citizen = Citizen::from_input(parsed).unwrap();

        assert_eq!(citizen.full_name, "Ravi");
        assert_eq!(citizen.income, Some(1200.5));
    }

    #[test]
    fn test_apply_update_changes_only_given_fields() {
        let mut citizen = Citizen::from_input(input("Asha", "1990-04-12", None)).unwrap();
        citizen
            .apply(&CitizenUpdate {
                income: Some(30000.0),
                phone: Some("98450 00000".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(citizen.full_name, "Asha");
        assert_eq!(citizen.income, Some(30000.0));
        assert_eq!(citizen.phone.as_deref(), Some("98450 00000"));

        assert!(citizen
            .apply(&CitizenUpdate {
                income: Some(-5.0),
                ..Default::default()
            })
            .is_err());
        assert_eq!(citizen.income, Some(30000.0));
    }
}

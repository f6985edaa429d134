// 🏠 Family Entity - household record
//
// total_income is a cache over the members' incomes, never a source of truth.

use super::{new_id, optional, required, Citizen};
use crate::error::CivicResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Family {
    pub id: String,
    pub ration_card_number: String,
    pub address: Option<String>,

    /// Head of family (a citizen). Not cleared when that citizen leaves.
    pub head_id: Option<String>,

    /// Derived: sum of member incomes, refreshed on membership changes
    pub total_income: f64,

    pub created_at: DateTime<Utc>,
}

impl Family {
    pub fn from_input(input: FamilyInput) -> CivicResult<Self> {
        let ration_card_number = required("ration_card_number", input.ration_card_number)?;

        Ok(Family {
            id: new_id(),
            ration_card_number,
            address: optional(input.address),
            head_id: optional(input.head_id),
            total_income: 0.0,
            created_at: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FamilyInput {
    #[serde(default)]
    pub ration_card_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default, alias = "family_head_id")]
    pub head_id: Option<String>,
}

/// Family with its members, as shown on the family detail page
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyDetail {
    #[serde(flatten)]
    pub family: Family,
    pub head_name: Option<String>,
    pub members: Vec<Citizen>,
}

impl FamilyDetail {
    pub fn new(family: Family, members: Vec<Citizen>) -> Self {
        let head_name = family.head_id.as_ref().and_then(|head_id| {
            members
                .iter()
                .find(|m| &m.id == head_id)
                .map(|m| m.full_name.clone())
        });

        FamilyDetail {
            family,
            head_name,
            members,
        }
    }
}

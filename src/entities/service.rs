// 📜 Service Entities - certificate definitions and issuance records

use super::{new_id, optional, required};
use crate::error::{CivicError, CivicResult};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Status recorded on every new issuance
pub const STATUS_ISSUED: &str = "issued";

/// Longest validity a service type may declare (about a century)
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

// ============================================================================
// SERVICE TYPE
// ============================================================================

/// A certificate/service definition (income certificate, caste certificate...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: String,
    pub name: String,

    /// Days a new issuance blocks reissuing the same service.
    /// None behaves like zero.
    pub validity_days: Option<i64>,

    pub created_at: DateTime<Utc>,
}

impl ServiceType {
    pub fn from_input(input: ServiceTypeInput) -> CivicResult<Self> {
        let name = required("name", input.name)?;
        if let Some(days) = input.validity_days {
            if days < 0 {
                return Err(CivicError::validation("validity_days must be >= 0"));
            }
            if days > MAX_VALIDITY_DAYS {
                return Err(CivicError::validation(format!(
                    "validity_days must be <= {}",
                    MAX_VALIDITY_DAYS
                )));
            }
        }

        Ok(ServiceType {
            id: new_id(),
            name,
            validity_days: input.validity_days,
            created_at: Utc::now(),
        })
    }

    /// None when the stored day count does not fit a `Duration`
    pub fn validity(&self) -> Option<Duration> {
        Duration::try_days(self.validity_days.unwrap_or(0))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceTypeInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub validity_days: Option<i64>,
}

// ============================================================================
// SERVICE RECORD (append-only)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: String,
    pub citizen_id: String,
    pub service_type_id: String,
    pub issue_date: DateTime<Utc>,
    pub issued_by: Option<String>,
    pub status: String,
    pub comments: Option<String>,
}

impl ServiceRecord {
    pub fn issue(
        citizen_id: String,
        service_type_id: String,
        comments: Option<String>,
        issued_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        ServiceRecord {
            id: new_id(),
            citizen_id,
            service_type_id,
            issue_date: now,
            issued_by: optional(issued_by),
            status: STATUS_ISSUED.to_string(),
            comments: optional(comments),
        }
    }

    /// End of the validity window for this issuance. A window reaching past
    /// the representable range ends at `MAX_UTC`.
    pub fn expires_at(&self, service_type: &ServiceType) -> DateTime<Utc> {
        service_type
            .validity()
            .and_then(|validity| self.issue_date.checked_add_signed(validity))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Body of POST /api/services/issue
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueRequest {
    #[serde(default)]
    pub citizen_id: Option<String>,
    #[serde(default)]
    pub service_type_id: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
    #[serde(default)]
    pub issued_by: Option<String>,
}

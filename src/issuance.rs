// 📜 Service Issuance Validator
//
// A service may not be reissued to the same citizen while the previous
// issuance is inside its validity window:
//     expiry = issue_date + validity_days
//     now < expiry  → deny
// Zero or missing validity means the window is empty, so reissue is always
// allowed.

use crate::entities::{ServiceRecord, ServiceType, DATE_FORMAT};
use crate::error::{CivicError, CivicResult};
use crate::store::CivicStore;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuanceDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl IssuanceDecision {
    pub fn allow() -> Self {
        IssuanceDecision {
            allowed: true,
            reason: None,
            expires_at: None,
        }
    }

    pub fn deny(expires_at: DateTime<Utc>) -> Self {
        IssuanceDecision {
            allowed: false,
            reason: Some(format!(
                "Service already issued and valid until {}",
                expires_at.format(DATE_FORMAT)
            )),
            expires_at: Some(expires_at),
        }
    }

    /// Turn a denial into the error surfaced to callers
    pub fn into_result(self) -> CivicResult<()> {
        match (self.allowed, self.expires_at) {
            (false, Some(expires_at)) => Err(CivicError::Conflict {
                message: self.reason.unwrap_or_default(),
                expires_at,
            }),
            _ => Ok(()),
        }
    }
}

/// Decide from an already-fetched service type and latest issuance
pub fn decide(
    service_type: &ServiceType,
    latest: Option<&ServiceRecord>,
    now: DateTime<Utc>,
) -> IssuanceDecision {
    match latest {
        None => IssuanceDecision::allow(),
        Some(record) => {
            let expiry = record.expires_at(service_type);
            if now < expiry {
                IssuanceDecision::deny(expiry)
            } else {
                IssuanceDecision::allow()
            }
        }
    }
}

/// Whether `citizen_id` may be issued `service_type_id` at `now`.
///
/// An unknown service type is an `InvalidServiceType` error, not a denial.
pub fn can_issue<S>(
    store: &S,
    citizen_id: &str,
    service_type_id: &str,
    now: DateTime<Utc>,
) -> CivicResult<IssuanceDecision>
where
    S: CivicStore + ?Sized,
{
    let service_type = store
        .get_service_type(service_type_id)?
        .ok_or_else(|| CivicError::InvalidServiceType(service_type_id.to_string()))?;

    let latest = store.latest_service_record(citizen_id, service_type_id)?;
    Ok(decide(&service_type, latest.as_ref(), now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Citizen, CitizenInput, ServiceTypeInput};
    use crate::memory::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn setup(validity_days: Option<i64>) -> (MemoryStore, String, String) {
        let store = MemoryStore::new();
        let citizen = Citizen::from_input(CitizenInput {
            full_name: Some("Asha Rao".to_string()),
            dob: Some("1990-04-12".to_string()),
            ..Default::default()
        })
        .unwrap();
        store.insert_citizen(&citizen).unwrap();

        let service_type = ServiceType::from_input(ServiceTypeInput {
            name: Some("Income Certificate".to_string()),
            validity_days,
        })
        .unwrap();
        store.insert_service_type(&service_type).unwrap();

        (store, citizen.id, service_type.id)
    }

    fn issue_at(store: &MemoryStore, citizen_id: &str, service_type_id: &str, when: DateTime<Utc>) {
        let record = ServiceRecord::issue(
            citizen_id.to_string(),
            service_type_id.to_string(),
            None,
            None,
            when,
        );
        assert!(store.issue_if_allowed(&record).unwrap().allowed);
    }

    #[test]
    fn test_no_prior_record_always_allowed() {
        for validity in [None, Some(0), Some(30), Some(3650)] {
            let (store, citizen, service) = setup(validity);
            let decision = can_issue(&store, &citizen, &service, at(2024, 1, 1)).unwrap();
            assert_eq!(decision, IssuanceDecision::allow());
        }
    }

    #[test]
    fn test_within_window_denied_with_expiry() {
        let (store, citizen, service) = setup(Some(30));
        issue_at(&store, &citizen, &service, at(2024, 1, 1));

        let decision = can_issue(&store, &citizen, &service, at(2024, 1, 20)).unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.expires_at, Some(at(2024, 1, 31)));
        assert!(decision.reason.unwrap().contains("2024-01-31"));
    }

    #[test]
    fn test_after_window_allowed() {
        let (store, citizen, service) = setup(Some(30));
        issue_at(&store, &citizen, &service, at(2024, 1, 1));

        let decision = can_issue(&store, &citizen, &service, at(2024, 2, 5)).unwrap();
        assert!(decision.allowed);
    }

    #[test]
    fn test_expiry_instant_is_not_inside_window() {
        let (store, citizen, service) = setup(Some(30));
        issue_at(&store, &citizen, &service, at(2024, 1, 1));

        assert!(can_issue(&store, &citizen, &service, at(2024, 1, 31)).unwrap().allowed);
    }

    #[test]
    fn test_zero_validity_always_allows() {
        for validity in [None, Some(0)] {
            let (store, citizen, service) = setup(validity);
            let issued = at(2024, 6, 1);
            issue_at(&store, &citizen, &service, issued);

            let decision =
                can_issue(&store, &citizen, &service, issued + Duration::seconds(5)).unwrap();
            assert!(decision.allowed);
        }
    }

    #[test]
    fn test_latest_record_decides() {
        let (store, citizen, service) = setup(Some(30));
        issue_at(&store, &citizen, &service, at(2024, 1, 1));
        issue_at(&store, &citizen, &service, at(2024, 3, 1));

        // January's window has lapsed; March's still blocks
        let decision = can_issue(&store, &citizen, &service, at(2024, 3, 10)).unwrap();
        assert_eq!(decision.expires_at, Some(at(2024, 3, 31)));
    }

    #[test]
    fn test_unknown_service_type_is_distinct_error() {
        let (store, citizen, _) = setup(Some(30));
        let err = can_issue(&store, &citizen, "missing", at(2024, 1, 1)).unwrap_err();
        assert!(matches!(err, CivicError::InvalidServiceType(_)));
    }

    #[test]
    fn test_denial_becomes_conflict() {
        let err = IssuanceDecision::deny(at(2024, 1, 31)).into_result().unwrap_err();
        match err {
            CivicError::Conflict { message, expires_at } => {
                assert_eq!(expires_at, at(2024, 1, 31));
                assert_eq!(message, "Service already issued and valid until 2024-01-31");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(IssuanceDecision::allow().into_result().is_ok());
    }
}

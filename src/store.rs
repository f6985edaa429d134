// Storage seam
//
// The registry never talks to a database handle directly; it is handed a
// `CivicStore`. Production uses `SqliteStore` (db.rs), tests can swap in
// `MemoryStore` (memory.rs).

use crate::audit::Event;
use crate::entities::{
    Citizen, Complaint, ComplaintCategory, ComplaintStatus, Family, Marriage, OfficialPosting, ServiceRecord,
    ServiceType,
};
use crate::error::CivicResult;
use crate::issuance::IssuanceDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// FILTERS
// ============================================================================

/// Which family link a citizen listing should match
#[derive(Debug, Clone, Default, PartialEq)]
pub enum FamilyFilter {
    #[default]
    Any,
    /// Citizens not linked to any family
    Unassigned,
    Family(String),
}

#[derive(Debug, Clone, Default)]
pub struct CitizenFilter {
    /// Case-insensitive match against name, national id and phone
    pub search: Option<String>,
    pub family: FamilyFilter,
}

impl CitizenFilter {
    /// In-process equivalent of the SQL filter
    pub fn matches(&self, citizen: &Citizen) -> bool {
        let family_ok = match &self.family {
            FamilyFilter::Any => true,
            FamilyFilter::Unassigned => citizen.family_id.is_none(),
            FamilyFilter::Family(id) => citizen.family_id.as_deref() == Some(id.as_str()),
        };
        if !family_ok {
            return false;
        }

        match &self.search {
            None => true,
            Some(term) => {
                let term = term.to_lowercase();
                let hit = |field: Option<&str>| {
                    field.map_or(false, |f| f.to_lowercase().contains(&term))
                };
                hit(Some(&citizen.full_name))
                    || hit(citizen.aadhar_number.as_deref())
                    || hit(citizen.phone.as_deref())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServiceFilter {
    pub service_type_id: Option<String>,
    pub citizen_id: Option<String>,
}

impl ServiceFilter {
    pub fn matches(&self, record: &ServiceRecord) -> bool {
        self.service_type_id
            .as_ref()
            .map_or(true, |id| &record.service_type_id == id)
            && self
                .citizen_id
                .as_ref()
                .map_or(true, |id| &record.citizen_id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComplaintFilter {
    pub status: Option<ComplaintStatus>,
    pub submitted_by: Option<String>,
}

impl ComplaintFilter {
    pub fn matches(&self, complaint: &Complaint) -> bool {
        self.status.map_or(true, |s| complaint.status == s)
            && self
                .submitted_by
                .as_ref()
                .map_or(true, |who| complaint.submitted_by.as_ref() == Some(who))
    }
}

// ============================================================================
// DASHBOARD COUNTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub citizens: i64,
    pub families: i64,
    pub services_issued_since: i64,
    pub total_family_income: f64,
    pub complaints_by_status: BTreeMap<String, i64>,
    pub complaints_by_category: BTreeMap<String, i64>,
}

/// A submitter's own complaint tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintCounts {
    pub total: usize,
    pub resolved: usize,
    pub pending: usize,
}

impl ComplaintCounts {
    pub fn tally(complaints: &[Complaint]) -> Self {
        ComplaintCounts {
            total: complaints.len(),
            resolved: complaints
                .iter()
                .filter(|c| c.status == ComplaintStatus::Resolved)
                .count(),
            pending: complaints.iter().filter(|c| c.status.is_pending()).count(),
        }
    }
}

/// Zeroed buckets for every status and category, so dashboards always see
/// the full set of keys
pub(crate) fn empty_complaint_buckets() -> (BTreeMap<String, i64>, BTreeMap<String, i64>) {
    let by_status = ComplaintStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let by_category = ComplaintCategory::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), 0))
        .collect();
    (by_status, by_category)
}

// ============================================================================
// STORE TRAIT
// ============================================================================

pub trait CivicStore: Send + Sync {
    // --- citizens ---------------------------------------------------------
    fn insert_citizen(&self, citizen: &Citizen) -> CivicResult<()>;
    fn get_citizen(&self, id: &str) -> CivicResult<Option<Citizen>>;
    fn list_citizens(&self, filter: &CitizenFilter) -> CivicResult<Vec<Citizen>>;

    /// Read, edit and write back one citizen as a single step. Returns the
    /// row as it was before and after the edit. An edit error leaves the row
    /// untouched.
    fn modify_citizen(
        &self,
        id: &str,
        edit: &mut dyn FnMut(&mut Citizen) -> CivicResult<()>,
    ) -> CivicResult<(Citizen, Citizen)>;

    /// Point a citizen at `family_id` (None unlinks). With `only_from` set,
    /// the change applies only if the citizen currently belongs to that
    /// family. Returns the citizen as it was before the change, or None when
    /// nothing changed.
    fn set_citizen_family(
        &self,
        citizen_id: &str,
        family_id: Option<&str>,
        only_from: Option<&str>,
    ) -> CivicResult<Option<Citizen>>;

    // --- families ---------------------------------------------------------
    fn insert_family(&self, family: &Family) -> CivicResult<()>;
    fn get_family(&self, id: &str) -> CivicResult<Option<Family>>;
    fn list_families(&self) -> CivicResult<Vec<Family>>;
    fn family_members(&self, family_id: &str) -> CivicResult<Vec<Citizen>>;

    /// Sum member incomes (None as 0) and store the sum on the family as one
    /// atomic step. An unknown family yields 0 and writes nothing.
    fn recompute_family_income(&self, family_id: &str) -> CivicResult<f64>;

    // --- services ---------------------------------------------------------
    fn insert_service_type(&self, service_type: &ServiceType) -> CivicResult<()>;
    fn get_service_type(&self, id: &str) -> CivicResult<Option<ServiceType>>;
    fn list_service_types(&self) -> CivicResult<Vec<ServiceType>>;

    /// Most recent issuance for the pair, by issue_date descending
    fn latest_service_record(
        &self,
        citizen_id: &str,
        service_type_id: &str,
    ) -> CivicResult<Option<ServiceRecord>>;

    /// Check the validity window at `record.issue_date` and append the record
    /// only if it is allowed, as one step. An unknown service type is
    /// `InvalidServiceType`.
    fn issue_if_allowed(&self, record: &ServiceRecord) -> CivicResult<IssuanceDecision>;
    fn list_service_records(&self, filter: &ServiceFilter) -> CivicResult<Vec<ServiceRecord>>;

    // --- marriages, postings, complaints ----------------------------------
    fn insert_marriage(&self, marriage: &Marriage) -> CivicResult<()>;
    fn list_marriages(&self) -> CivicResult<Vec<Marriage>>;

    fn insert_posting(&self, posting: &OfficialPosting) -> CivicResult<()>;
    fn list_postings(&self) -> CivicResult<Vec<OfficialPosting>>;

    fn insert_complaint(&self, complaint: &Complaint) -> CivicResult<()>;
    fn get_complaint(&self, id: &str) -> CivicResult<Option<Complaint>>;
    fn update_complaint(&self, complaint: &Complaint) -> CivicResult<()>;
    /// Newest first
    fn list_complaints(&self, filter: &ComplaintFilter) -> CivicResult<Vec<Complaint>>;

    // --- audit & stats ----------------------------------------------------
    fn record_event(&self, event: &Event) -> CivicResult<()>;
    fn events_for(&self, entity_type: &str, entity_id: &str) -> CivicResult<Vec<Event>>;

    fn stats(&self, issued_since: DateTime<Utc>) -> CivicResult<RegistryStats>;
}

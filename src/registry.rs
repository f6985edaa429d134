// Civic registry operations
//
// Every API and CLI operation goes through `Registry`. It validates input,
// checks references against the store, keeps family totals current and
// writes one audit event per mutation.

use crate::audit::Event;
use crate::entities::{
    optional, Citizen, CitizenInput, CitizenUpdate, Complaint, ComplaintInput, Family, FamilyDetail, FamilyInput, IssueRequest, Marriage, MarriageInput, OfficialPosting,
    PostingInput, ServiceRecord, ServiceType, ServiceTypeInput, StatusUpdate,
};
use crate::error::{CivicError, CivicResult};
use crate::income::recalculate_income;
use crate::issuance::{can_issue, IssuanceDecision};
use crate::store::{
    CitizenFilter, CivicStore, ComplaintCounts, ComplaintFilter, RegistryStats, ServiceFilter,
};
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

/// Result of adding or removing a family member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipChange {
    pub msg: String,
    pub total_income: f64,
}

#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn CivicStore>,
    actor: String,
}

impl Registry {
    pub fn new(store: Arc<dyn CivicStore>, actor: impl Into<String>) -> Self {
        Registry {
            store,
            actor: actor.into(),
        }
    }

    pub fn store(&self) -> &dyn CivicStore {
        self.store.as_ref()
    }

    /// Append one audit event. Runs after the mutation it describes has been
    /// written, so a failure is logged instead of returned.
    fn audit(
        &self,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
    ) {
        let event = Event::new(event_type, entity_type, entity_id, data, &self.actor);
        if let Err(e) = self.store.record_event(&event) {
            error!(event_type, entity_type, entity_id, error = %e, "audit event not recorded");
        }
    }

    fn require_citizen(&self, id: &str) -> CivicResult<Citizen> {
        self.store
            .get_citizen(id)?
            .ok_or_else(|| CivicError::not_found("Citizen", id))
    }

    fn require_family(&self, id: &str) -> CivicResult<Family> {
        self.store
            .get_family(id)?
            .ok_or_else(|| CivicError::not_found("Family", id))
    }

    // ========================================================================
    // CITIZENS
    // ========================================================================

    pub fn register_citizen(&self, input: CitizenInput) -> CivicResult<Citizen> {
        let citizen = Citizen::from_input(input)?;
        if let Some(family_id) = &citizen.family_id {
            self.require_family(family_id)?;
        }

        self.store.insert_citizen(&citizen)?;
        if let Some(family_id) = &citizen.family_id {
            recalculate_income(self.store(), family_id)?;
        }
        self.audit(
            "citizen_registered",
            "citizen",
            &citizen.id,
            serde_json::json!({ "full_name": citizen.full_name, "family_id": citizen.family_id }),
        );

        info!(citizen_id = %citizen.id, "citizen registered");
        Ok(citizen)
    }

    pub fn get_citizen(&self, id: &str) -> CivicResult<Citizen> {
        self.require_citizen(id)
    }

    pub fn list_citizens(&self, filter: &CitizenFilter) -> CivicResult<Vec<Citizen>> {
        self.store.list_citizens(filter)
    }

    /// Edit a citizen. A change of income or family link refreshes the
    /// totals of every family involved.
    pub fn update_citizen(&self, id: &str, update: CitizenUpdate) -> CivicResult<Citizen> {
        if let Some(family_id) = optional(update.family_id.clone()) {
            self.require_family(&family_id)?;
        }

        let (before, after) = self
            .store
            .modify_citizen(id, &mut |citizen: &mut Citizen| citizen.apply(&update))?;

        let income_changed = after.income != before.income;
        let family_changed = after.family_id != before.family_id;
        if income_changed || family_changed {
            let mut touched = vec![before.family_id.as_deref(), after.family_id.as_deref()];
            touched.dedup();
            for family_id in touched.into_iter().flatten() {
                recalculate_income(self.store(), family_id)?;
            }
        }

        self.audit(
            "citizen_updated",
            "citizen",
            id,
            serde_json::json!({
                "income_changed": income_changed,
                "family_changed": family_changed,
            }),
        );

        info!(citizen_id = %id, "citizen updated");
        Ok(after)
    }

    // ========================================================================
    // FAMILIES & MEMBERSHIP
    // ========================================================================

    /// Create a family. When a head is named, the head is linked to the new
    /// family and the total income is computed immediately.
    pub fn create_family(&self, input: FamilyInput) -> CivicResult<Family> {
        let family = Family::from_input(input)?;
        let head = match &family.head_id {
            Some(head_id) => Some(self.require_citizen(head_id)?),
            None => None,
        };

        self.store.insert_family(&family)?;

        if let Some(head) = &head {
            let previous = self
                .store
                .set_citizen_family(&head.id, Some(&family.id), None)?
                .and_then(|before| before.family_id);
            recalculate_income(self.store(), &family.id)?;
            if let Some(previous) = &previous {
                recalculate_income(self.store(), previous)?;
            }
        }

        self.audit(
            "family_created",
            "family",
            &family.id,
            serde_json::json!({
                "ration_card_number": family.ration_card_number,
                "head_id": family.head_id,
            }),
        );

        info!(family_id = %family.id, "family created");
        self.require_family(&family.id)
    }

    pub fn get_family(&self, id: &str) -> CivicResult<FamilyDetail> {
        let family = self.require_family(id)?;
        let members = self.store.family_members(id)?;
        Ok(FamilyDetail::new(family, members))
    }

    pub fn list_families(&self) -> CivicResult<Vec<Family>> {
        self.store.list_families()
    }

    pub fn add_member(&self, family_id: &str, citizen_id: &str) -> CivicResult<MembershipChange> {
        self.require_family(family_id)?;

        let before = self
            .store
            .set_citizen_family(citizen_id, Some(family_id), None)?
            .ok_or_else(|| CivicError::not_found("Citizen", citizen_id))?;
        let total_income = recalculate_income(self.store(), family_id)?;

        // A citizen moved out of another family leaves that total stale
        if let Some(previous) = before.family_id.as_deref().filter(|p| *p != family_id) {
            recalculate_income(self.store(), previous)?;
        }

        self.audit(
            "member_added",
            "family",
            family_id,
            serde_json::json!({ "citizen_id": citizen_id, "total_income": total_income }),
        );

        info!(family_id, citizen_id, total_income, "member added");
        Ok(MembershipChange {
            msg: "Member added".to_string(),
            total_income,
        })
    }

    pub fn remove_member(
        &self,
        family_id: &str,
        citizen_id: &str,
    ) -> CivicResult<MembershipChange> {
        self.require_family(family_id)?;

        self.store
            .set_citizen_family(citizen_id, None, Some(family_id))?
            .ok_or_else(|| CivicError::not_found("Family member", citizen_id))?;
        let total_income = recalculate_income(self.store(), family_id)?;

        self.audit(
            "member_removed",
            "family",
            family_id,
            serde_json::json!({ "citizen_id": citizen_id, "total_income": total_income }),
        );

        info!(family_id, citizen_id, total_income, "member removed");
        Ok(MembershipChange {
            msg: "Member removed".to_string(),
            total_income,
        })
    }

    /// Recompute every family total. Used by the CLI after bulk edits.
    pub fn recompute_all(&self) -> CivicResult<Vec<(String, f64)>> {
        self.store
            .list_families()?
            .into_iter()
            .map(|family| {
                let total = recalculate_income(self.store(), &family.id)?;
                Ok((family.id, total))
            })
            .collect()
    }

    // ========================================================================
    // SERVICES
    // ========================================================================

    pub fn define_service_type(&self, input: ServiceTypeInput) -> CivicResult<ServiceType> {
        let service_type = ServiceType::from_input(input)?;
        self.store.insert_service_type(&service_type)?;
        self.audit(
            "service_type_defined",
            "service_type",
            &service_type.id,
            serde_json::json!({
                "name": service_type.name,
                "validity_days": service_type.validity_days,
            }),
        );
        Ok(service_type)
    }

    pub fn list_service_types(&self) -> CivicResult<Vec<ServiceType>> {
        self.store.list_service_types()
    }

    pub fn check_issuance(
        &self,
        citizen_id: &str,
        service_type_id: &str,
        now: DateTime<Utc>,
    ) -> CivicResult<IssuanceDecision> {
        can_issue(self.store(), citizen_id, service_type_id, now)
    }

    /// Issue a service certificate unless a previous one is still valid.
    /// The window check and the insert happen in one store step.
    pub fn issue_service(
        &self,
        request: IssueRequest,
        now: DateTime<Utc>,
    ) -> CivicResult<ServiceRecord> {
        let (citizen_id, service_type_id) = match (
            optional(request.citizen_id),
            optional(request.service_type_id),
        ) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(CivicError::validation("Missing required fields")),
        };

        self.require_citizen(&citizen_id)?;

        let record = ServiceRecord::issue(
            citizen_id,
            service_type_id,
            request.comments,
            optional(request.issued_by).or_else(|| Some(self.actor.clone())),
            now,
        );
        self.store.issue_if_allowed(&record)?.into_result()?;
        self.audit(
            "service_issued",
            "service_record",
            &record.id,
            serde_json::json!({
                "citizen_id": record.citizen_id,
                "service_type_id": record.service_type_id,
            }),
        );

        info!(record_id = %record.id, citizen_id = %record.citizen_id, "service issued");
        Ok(record)
    }

    pub fn list_services(&self, filter: &ServiceFilter) -> CivicResult<Vec<ServiceRecord>> {
        self.store.list_service_records(filter)
    }

    // ========================================================================
    // MARRIAGES
    // ========================================================================

    pub fn register_marriage(&self, input: MarriageInput) -> CivicResult<Marriage> {
        let marriage = Marriage::from_input(input)?;
        self.require_citizen(&marriage.spouse1_id)?;
        self.require_citizen(&marriage.spouse2_id)?;

        self.store.insert_marriage(&marriage)?;
        self.audit(
            "marriage_registered",
            "marriage",
            &marriage.id,
            serde_json::json!({
                "spouse1_id": marriage.spouse1_id,
                "spouse2_id": marriage.spouse2_id,
            }),
        );
        Ok(marriage)
    }

    pub fn list_marriages(&self) -> CivicResult<Vec<Marriage>> {
        self.store.list_marriages()
    }

    // ========================================================================
    // OFFICIAL POSTINGS
    // ========================================================================

    pub fn create_posting(&self, input: PostingInput) -> CivicResult<OfficialPosting> {
        let posting = OfficialPosting::from_input(input)?;
        self.store.insert_posting(&posting)?;
        self.audit(
            "posting_created",
            "official_posting",
            &posting.id,
            serde_json::json!({
                "official_name": posting.official_name,
                "designation": posting.designation,
            }),
        );
        Ok(posting)
    }

    pub fn list_postings(&self) -> CivicResult<Vec<OfficialPosting>> {
        self.store.list_postings()
    }

    // ========================================================================
    // COMPLAINTS
    // ========================================================================

    pub fn submit_complaint(&self, input: ComplaintInput) -> CivicResult<Complaint> {
        let complaint = Complaint::from_input(input)?;
        self.store.insert_complaint(&complaint)?;
        self.audit(
            "complaint_submitted",
            "complaint",
            &complaint.id,
            serde_json::json!({ "category": complaint.category.as_str() }),
        );
        Ok(complaint)
    }

    pub fn get_complaint(&self, id: &str) -> CivicResult<Complaint> {
        self.store
            .get_complaint(id)?
            .ok_or_else(|| CivicError::not_found("Complaint", id))
    }

    pub fn list_complaints(&self, filter: &ComplaintFilter) -> CivicResult<Vec<Complaint>> {
        self.store.list_complaints(filter)
    }

    /// Tally of one submitter's complaints
    pub fn complaint_counts(&self, submitted_by: &str) -> CivicResult<ComplaintCounts> {
        let filter = ComplaintFilter {
            status: None,
            submitted_by: Some(submitted_by.to_string()),
        };
        Ok(ComplaintCounts::tally(&self.store.list_complaints(&filter)?))
    }

    pub fn update_complaint_status(
        &self,
        id: &str,
        update: StatusUpdate,
        now: DateTime<Utc>,
    ) -> CivicResult<Complaint> {
        let status = update.parsed_status()?;
        let mut complaint = self.get_complaint(id)?;
        let previous = complaint.status;

        complaint.transition(status, update.remark, now);
        self.store.update_complaint(&complaint)?;
        self.audit(
            "complaint_status_changed",
            "complaint",
            id,
            serde_json::json!({ "from": previous.as_str(), "to": status.as_str() }),
        );

        info!(complaint_id = %id, status = status.as_str(), "complaint status changed");
        Ok(complaint)
    }

    // ========================================================================
    // AUDIT & DASHBOARD
    // ========================================================================

    pub fn history(&self, entity_type: &str, entity_id: &str) -> CivicResult<Vec<Event>> {
        self.store.events_for(entity_type, entity_id)
    }

    /// Dashboard counts; "issued today" is measured from UTC midnight
    pub fn stats(&self, now: DateTime<Utc>) -> CivicResult<RegistryStats> {
        let midnight = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        self.store.stats(midnight)
    }
}

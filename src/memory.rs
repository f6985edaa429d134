// In-memory CivicStore
//
// Same contract as the SQLite store, held in plain collections behind one
// RwLock. Used by tests and by `--in-memory` server runs.

use crate::audit::Event;
use crate::entities::{
    Citizen, Complaint, Family, Marriage, OfficialPosting, ServiceRecord, ServiceType,
};
use crate::error::{CivicError, CivicResult};
use crate::income::sum_incomes;
use crate::issuance::{decide, IssuanceDecision};
use crate::store::{
    empty_complaint_buckets, CitizenFilter, CivicStore, ComplaintFilter, RegistryStats,
    ServiceFilter,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Tables {
    citizens: HashMap<String, Citizen>,
    families: HashMap<String, Family>,
    service_types: HashMap<String, ServiceType>,
    /// Append-only, in insertion order
    service_records: Vec<ServiceRecord>,
    marriages: Vec<Marriage>,
    postings: Vec<OfficialPosting>,
    complaints: HashMap<String, Complaint>,
    events: Vec<Event>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CivicStore for MemoryStore {
    fn insert_citizen(&self, citizen: &Citizen) -> CivicResult<()> {
        self.write()
            .citizens
            .insert(citizen.id.clone(), citizen.clone());
        Ok(())
    }

    fn get_citizen(&self, id: &str) -> CivicResult<Option<Citizen>> {
        Ok(self.read().citizens.get(id).cloned())
    }

    fn modify_citizen(
        &self,
        id: &str,
        edit: &mut dyn FnMut(&mut Citizen) -> CivicResult<()>,
    ) -> CivicResult<(Citizen, Citizen)> {
        let mut tables = self.write();
        let existing = tables
            .citizens
            .get_mut(id)
            .ok_or_else(|| CivicError::not_found("Citizen", id))?;

        // Edit a copy so a failed edit leaves the stored row as it was
        let before = existing.clone();
        let mut after = before.clone();
        edit(&mut after)?;
        *existing = after.clone();
        Ok((before, after))
    }

    fn list_citizens(&self, filter: &CitizenFilter) -> CivicResult<Vec<Citizen>> {
        let mut citizens: Vec<Citizen> = self
            .read()
            .citizens
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        citizens.sort_by(|a, b| a.full_name.cmp(&b.full_name).then(a.id.cmp(&b.id)));
        Ok(citizens)
    }

    fn set_citizen_family(
        &self,
        citizen_id: &str,
        family_id: Option<&str>,
        only_from: Option<&str>,
    ) -> CivicResult<Option<Citizen>> {
        let mut tables = self.write();
        let Some(citizen) = tables.citizens.get_mut(citizen_id) else {
            return Ok(None);
        };
        if let Some(current) = only_from {
            if citizen.family_id.as_deref() != Some(current) {
                return Ok(None);
            }
        }
        let before = citizen.clone();
        citizen.family_id = family_id.map(str::to_string);
        Ok(Some(before))
    }

    fn insert_family(&self, family: &Family) -> CivicResult<()> {
        let mut tables = self.write();
        if tables
            .families
            .values()
            .any(|f| f.ration_card_number == family.ration_card_number)
        {
            return Err(CivicError::validation(
                "Ration card number is already registered.",
            ));
        }
        tables.families.insert(family.id.clone(), family.clone());
        Ok(())
    }

    fn get_family(&self, id: &str) -> CivicResult<Option<Family>> {
        Ok(self.read().families.get(id).cloned())
    }

    fn list_families(&self) -> CivicResult<Vec<Family>> {
        let mut families: Vec<Family> = self.read().families.values().cloned().collect();
        families.sort_by(|a, b| a.ration_card_number.cmp(&b.ration_card_number));
        Ok(families)
    }

    fn family_members(&self, family_id: &str) -> CivicResult<Vec<Citizen>> {
        self.list_citizens(&CitizenFilter {
            search: None,
            family: crate::store::FamilyFilter::Family(family_id.to_string()),
        })
    }

    fn recompute_family_income(&self, family_id: &str) -> CivicResult<f64> {
        // Read and write under the same write guard
        let mut tables = self.write();
        let total = sum_incomes(
            tables
                .citizens
                .values()
                .filter(|c| c.family_id.as_deref() == Some(family_id))
                .map(|c| c.income),
        );
        match tables.families.get_mut(family_id) {
            Some(family) => {
                family.total_income = total;
                Ok(total)
            }
            None => Ok(0.0),
        }
    }

    fn insert_service_type(&self, service_type: &ServiceType) -> CivicResult<()> {
        let mut tables = self.write();
        if tables
            .service_types
            .values()
            .any(|t| t.name == service_type.name)
        {
            return Err(CivicError::validation(
                "A service type with this name already exists.",
            ));
        }
        tables
            .service_types
            .insert(service_type.id.clone(), service_type.clone());
        Ok(())
    }

    fn get_service_type(&self, id: &str) -> CivicResult<Option<ServiceType>> {
        Ok(self.read().service_types.get(id).cloned())
    }

    fn list_service_types(&self) -> CivicResult<Vec<ServiceType>> {
        let mut types: Vec<ServiceType> = self.read().service_types.values().cloned().collect();
        types.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(types)
    }

    fn latest_service_record(
        &self,
        citizen_id: &str,
        service_type_id: &str,
    ) -> CivicResult<Option<ServiceRecord>> {
        Ok(latest_for(&self.read(), citizen_id, service_type_id).cloned())
    }

    fn issue_if_allowed(&self, record: &ServiceRecord) -> CivicResult<IssuanceDecision> {
        let mut tables = self.write();
        let service_type = tables
            .service_types
            .get(&record.service_type_id)
            .ok_or_else(|| CivicError::InvalidServiceType(record.service_type_id.clone()))?;

        let latest = latest_for(&tables, &record.citizen_id, &record.service_type_id);
        let decision = decide(service_type, latest, record.issue_date);
        if decision.allowed {
            tables.service_records.push(record.clone());
        }
        Ok(decision)
    }

    fn list_service_records(&self, filter: &ServiceFilter) -> CivicResult<Vec<ServiceRecord>> {
        let mut records: Vec<ServiceRecord> = self
            .read()
            .service_records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.issue_date.cmp(&a.issue_date));
        Ok(records)
    }

    fn insert_marriage(&self, marriage: &Marriage) -> CivicResult<()> {
        self.write().marriages.push(marriage.clone());
        Ok(())
    }

    fn list_marriages(&self) -> CivicResult<Vec<Marriage>> {
        let mut marriages = self.read().marriages.clone();
        marriages.sort_by(|a, b| b.marriage_date.cmp(&a.marriage_date).then(a.id.cmp(&b.id)));
        Ok(marriages)
    }

    fn insert_posting(&self, posting: &OfficialPosting) -> CivicResult<()> {
        self.write().postings.push(posting.clone());
        Ok(())
    }

    fn list_postings(&self) -> CivicResult<Vec<OfficialPosting>> {
        let mut postings = self.read().postings.clone();
        postings.sort_by(|a, b| a.official_name.cmp(&b.official_name).then(a.id.cmp(&b.id)));
        Ok(postings)
    }

    fn insert_complaint(&self, complaint: &Complaint) -> CivicResult<()> {
        self.write()
            .complaints
            .insert(complaint.id.clone(), complaint.clone());
        Ok(())
    }

    fn get_complaint(&self, id: &str) -> CivicResult<Option<Complaint>> {
        Ok(self.read().complaints.get(id).cloned())
    }

    fn update_complaint(&self, complaint: &Complaint) -> CivicResult<()> {
        let mut tables = self.write();
        match tables.complaints.get_mut(&complaint.id) {
            Some(existing) => {
                *existing = complaint.clone();
                Ok(())
            }
            None => Err(CivicError::not_found("Complaint", complaint.id.clone())),
        }
    }

    fn list_complaints(&self, filter: &ComplaintFilter) -> CivicResult<Vec<Complaint>> {
        let mut complaints: Vec<Complaint> = self
            .read()
            .complaints
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        complaints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(complaints)
    }

    fn record_event(&self, event: &Event) -> CivicResult<()> {
        self.write().events.push(event.clone());
        Ok(())
    }

    fn events_for(&self, entity_type: &str, entity_id: &str) -> CivicResult<Vec<Event>> {
        // Newest first, matching the SQLite store
        Ok(self
            .read()
            .events
            .iter()
            .rev()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect())
    }

    fn stats(&self, issued_since: DateTime<Utc>) -> CivicResult<RegistryStats> {
        let tables = self.read();

        let (mut complaints_by_status, mut complaints_by_category) = empty_complaint_buckets();
        for complaint in tables.complaints.values() {
            *complaints_by_status
                .entry(complaint.status.as_str().to_string())
                .or_insert(0) += 1;
            *complaints_by_category
                .entry(complaint.category.as_str().to_string())
                .or_insert(0) += 1;
        }

        Ok(RegistryStats {
            citizens: tables.citizens.len() as i64,
            families: tables.families.len() as i64,
            services_issued_since: tables
                .service_records
                .iter()
                .filter(|r| r.issue_date >= issued_since)
                .count() as i64,
            total_family_income: tables.families.values().map(|f| f.total_income).sum(),
            complaints_by_status,
            complaints_by_category,
        })
    }
}

fn latest_for<'a>(
    tables: &'a Tables,
    citizen_id: &str,
    service_type_id: &str,
) -> Option<&'a ServiceRecord> {
    tables
        .service_records
        .iter()
        .filter(|r| r.citizen_id == citizen_id && r.service_type_id == service_type_id)
        .max_by_key(|r| r.issue_date)
}

// 📣 Complaint Entity - grievances filed by residents and worked by officials

use super::{new_id, optional};
use crate::error::{CivicError, CivicResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// COMPLAINT CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComplaintCategory {
    Roads,
    Water,
    Electricity,
    Sanitation,
    #[serde(rename = "Public Safety")]
    PublicSafety,
    Others,
}

impl ComplaintCategory {
    pub const ALL: [ComplaintCategory; 6] = [
        ComplaintCategory::Roads,
        ComplaintCategory::Water,
        ComplaintCategory::Electricity,
        ComplaintCategory::Sanitation,
        ComplaintCategory::PublicSafety,
        ComplaintCategory::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::Roads => "Roads",
            ComplaintCategory::Water => "Water",
            ComplaintCategory::Electricity => "Electricity",
            ComplaintCategory::Sanitation => "Sanitation",
            ComplaintCategory::PublicSafety => "Public Safety",
            ComplaintCategory::Others => "Others",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == value)
    }
}

// ============================================================================
// PRIORITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ComplaintPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl ComplaintPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintPriority::Low => "Low",
            ComplaintPriority::Medium => "Medium",
            ComplaintPriority::High => "High",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(ComplaintPriority::Low),
            "Medium" => Some(ComplaintPriority::Medium),
            "High" => Some(ComplaintPriority::High),
            _ => None,
        }
    }
}

// ============================================================================
// STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    Submitted,
    InProgress,
    Resolved,
    Rejected,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 4] = [
        ComplaintStatus::Submitted,
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
        ComplaintStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Submitted => "submitted",
            ComplaintStatus::InProgress => "in_progress",
            ComplaintStatus::Resolved => "resolved",
            ComplaintStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    /// Still waiting on an official
    pub fn is_pending(&self) -> bool {
        matches!(self, ComplaintStatus::Submitted | ComplaintStatus::InProgress)
    }
}

// ============================================================================
// COMPLAINT ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Complaint {
    pub id: String,
    pub title: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub location: String,
    pub priority: ComplaintPriority,
    pub status: ComplaintStatus,
    pub submitted_by: Option<String>,
    pub admin_remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Complaint {
    pub fn from_input(input: ComplaintInput) -> CivicResult<Self> {
        let title = bounded("title", input.title, 5, Some(100))?;
        let description = bounded("description", input.description, 10, Some(500))?;
        let location = bounded("location", input.location, 5, None)?;

        let category = input
            .category
            .as_deref()
            .and_then(ComplaintCategory::parse)
            .ok_or_else(|| CivicError::validation("category is not a known complaint category"))?;

        let priority = match input.priority.as_deref() {
            None | Some("") => ComplaintPriority::default(),
            Some(p) => ComplaintPriority::parse(p)
                .ok_or_else(|| CivicError::validation("priority must be Low, Medium or High"))?,
        };

        let now = Utc::now();
        Ok(Complaint {
            id: new_id(),
            title,
            category,
            description,
            location,
            priority,
            status: ComplaintStatus::Submitted,
            submitted_by: optional(input.submitted_by),
            admin_remark: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        })
    }

    /// Move to a new status; resolving stamps resolved_at
    pub fn transition(
        &mut self,
        status: ComplaintStatus,
        remark: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.status = status;
        self.updated_at = now;
        if status == ComplaintStatus::Resolved {
            self.resolved_at = Some(now);
        }
        if let Some(remark) = optional(remark) {
            self.admin_remark = Some(remark);
        }
    }
}

fn bounded(field: &str, value: Option<String>, min: usize, max: Option<usize>) -> CivicResult<String> {
    let value = value.map(|v| v.trim().to_string()).unwrap_or_default();
    let len = value.chars().count();

    if len < min {
        return Err(CivicError::validation(format!(
            "{} must be at least {} characters",
            field, min
        )));
    }
    if let Some(max) = max {
        if len > max {
            return Err(CivicError::validation(format!(
                "{} must be at most {} characters",
                field, max
            )));
        }
    }
    Ok(value)
}

// ============================================================================
// PAYLOADS
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplaintInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub submitted_by: Option<String>,
}

/// Body of PATCH /api/complaints/:id/status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub remark: Option<String>,
}

impl StatusUpdate {
    pub fn parsed_status(&self) -> CivicResult<ComplaintStatus> {
        self.status
            .as_deref()
            .and_then(ComplaintStatus::parse)
            .ok_or_else(|| {
                CivicError::validation(
                    "status must be one of submitted, in_progress, resolved, rejected",
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_input() -> ComplaintInput {
        ComplaintInput {
            title: Some("Pothole on MG Road".to_string()),
            category: Some("Public Safety".to_string()),
            description: Some("Large pothole near the bus stop".to_string()),
            location: Some("MG Road, Ward 4".to_string()),
            priority: None,
            submitted_by: None,
        }
    }

    #[test]
    fn test_complaint_defaults() {
        let complaint = Complaint::from_input(valid_input()).unwrap();

        assert_eq!(complaint.category, ComplaintCategory::PublicSafety);
        assert_eq!(complaint.priority, ComplaintPriority::Medium);
        assert_eq!(complaint.status, ComplaintStatus::Submitted);
        assert!(complaint.resolved_at.is_none());
    }

    #[test]
    fn test_length_limits() {
        let mut short_title = valid_input();
        short_title.title = Some("Hole".to_string());
        assert!(Complaint::from_input(short_title).is_err());

        let mut long_description = valid_input();
        long_description.description = Some("x".repeat(501));
        assert!(Complaint::from_input(long_description).is_err());
    }

    #[test]
    fn test_unknown_category_rejected() {
        let mut input = valid_input();
        input.category = Some("Parking".to_string());
        assert!(Complaint::from_input(input).is_err());
    }

    #[test]
    fn test_resolving_sets_resolved_at() {
        let mut complaint = Complaint::from_input(valid_input()).unwrap();
        let now = Utc::now();

        complaint.transition(ComplaintStatus::InProgress, None, now);
        assert!(complaint.resolved_at.is_none());
        assert!(complaint.status.is_pending());

        complaint.transition(ComplaintStatus::Resolved, Some("Filled".to_string()), now);
        assert_eq!(complaint.resolved_at, Some(now));
        assert_eq!(complaint.admin_remark.as_deref(), Some("Filled"));
        assert!(!complaint.status.is_pending());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in ComplaintStatus::ALL {
            assert_eq!(ComplaintStatus::parse(status.as_str()), Some(status));
        }
        let json = serde_json::to_string(&ComplaintStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }
}

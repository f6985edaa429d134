// CivicEase - Core Library
// Civic records registry: citizens, families, service certificates,
// marriages, official postings and complaints. Shared by the CLI, the API
// server and the tests.

pub mod audit;
pub mod config;
pub mod db;
pub mod entities;
pub mod error;
pub mod income;
pub mod issuance;
pub mod logging;
pub mod memory;
pub mod registry;
pub mod store;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use audit::Event;
pub use config::Config;
pub use db::{load_citizens_csv, setup_database, ImportSummary, SqliteStore};
pub use entities::{
    Citizen, CitizenInput, CitizenUpdate, Complaint, ComplaintStatus, Family, FamilyDetail,
    FamilyInput, IssueRequest, Marriage, OfficialPosting, ServiceRecord, ServiceType,
};
pub use error::{CivicError, CivicResult};
pub use income::recalculate_income;
pub use issuance::{can_issue, IssuanceDecision};
pub use memory::MemoryStore;
pub use registry::{MembershipChange, Registry};
pub use store::{
    CitizenFilter, CivicStore, ComplaintCounts, ComplaintFilter, FamilyFilter, RegistryStats,
    ServiceFilter,
};

#[cfg(feature = "server")]
pub use api::{build_router, AppState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CivicEase REST API (axum)
//
// Thin handlers over `Registry`: decode the request, call one operation,
// wrap the result in the `ApiResponse` envelope. Domain errors become HTTP
// statuses through `ApiError`.

use crate::entities::{
    CitizenInput, CitizenUpdate, ComplaintInput, ComplaintStatus, FamilyInput, IssueRequest,
    MarriageInput, PostingInput, ServiceTypeInput, StatusUpdate,
};
use crate::error::CivicError;
use crate::registry::Registry;
use crate::store::{CitizenFilter, ComplaintFilter, FamilyFilter, ServiceFilter};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, patch, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

impl AppState {
    pub fn new(registry: Registry) -> Self {
        AppState { registry }
    }
}

/// Success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

fn ok<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::ok(data))).into_response()
}

fn created<T: Serialize>(data: T) -> Response {
    (StatusCode::CREATED, Json(ApiResponse::ok(data))).into_response()
}

// ============================================================================
// Errors
// ============================================================================

pub struct ApiError(CivicError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CivicError::Validation(_) | CivicError::InvalidServiceType(_) => {
                StatusCode::BAD_REQUEST
            }
            CivicError::NotFound { .. } => StatusCode::NOT_FOUND,
            CivicError::Conflict { .. } => StatusCode::CONFLICT,
            CivicError::Storage(_) | CivicError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.0.code();

        if self.0.is_client_error() {
            warn!(code, error = %self.0, "request rejected");
        } else {
            error!(code, error = %self.0, "request failed");
        }

        let mut body = serde_json::json!({
            "success": false,
            "error": self.0.to_string(),
            "code": code,
        });
        if let CivicError::Conflict { expires_at, .. } = &self.0 {
            body["expires_at"] = serde_json::json!(expires_at);
        }

        (status, Json(body)).into_response()
    }
}

impl From<CivicError> for ApiError {
    fn from(err: CivicError) -> Self {
        ApiError(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(CivicError::validation(rejection.body_text()))
    }
}

type ApiResult = Result<Response, ApiError>;
type Body<T> = Result<Json<T>, JsonRejection>;

// ============================================================================
// Query strings
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CitizenQuery {
    pub search: Option<String>,
    /// A family id, or the literal `null` for citizens without a family
    pub family_id: Option<String>,
}

impl From<CitizenQuery> for CitizenFilter {
    fn from(query: CitizenQuery) -> Self {
        let family = match query.family_id.as_deref().map(str::trim) {
            None | Some("") => FamilyFilter::Any,
            Some("null") => FamilyFilter::Unassigned,
            Some(id) => FamilyFilter::Family(id.to_string()),
        };
        CitizenFilter {
            search: query.search.filter(|s| !s.trim().is_empty()),
            family,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ServiceQuery {
    pub service_type_id: Option<String>,
    pub citizen_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComplaintQuery {
    pub status: Option<String>,
    pub submitted_by: Option<String>,
}

impl TryFrom<ComplaintQuery> for ComplaintFilter {
    type Error = CivicError;

    fn try_from(query: ComplaintQuery) -> Result<Self, Self::Error> {
        let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
            None => None,
            Some(raw) => Some(
                ComplaintStatus::parse(raw)
                    .ok_or_else(|| CivicError::validation(format!("Unknown status: {}", raw)))?,
            ),
        };
        Ok(ComplaintFilter {
            status,
            submitted_by: non_blank(query.submitted_by),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SubmitterQuery {
    pub submitted_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub citizen_id: Option<String>,
    pub service_type_id: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    #[serde(default)]
    pub citizen_id: Option<String>,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/stats
async fn get_stats(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.registry.stats(Utc::now())?))
}

async fn list_citizens(
    State(state): State<AppState>,
    Query(query): Query<CitizenQuery>,
) -> ApiResult {
    Ok(ok(state.registry.list_citizens(&query.into())?))
}

async fn create_citizen(State(state): State<AppState>, body: Body<CitizenInput>) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.register_citizen(input)?))
}

async fn get_citizen(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.registry.get_citizen(&id)?))
}

async fn update_citizen(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Body<CitizenUpdate>,
) -> ApiResult {
    let Json(update) = body?;
    Ok(ok(state.registry.update_citizen(&id, update)?))
}

async fn list_families(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.registry.list_families()?))
}

async fn create_family(State(state): State<AppState>, body: Body<FamilyInput>) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.create_family(input)?))
}

async fn get_family(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.registry.get_family(&id)?))
}

/// POST /api/families/:id/members
async fn add_member(
    State(state): State<AppState>,
    Path(family_id): Path<String>,
    body: Body<MemberRequest>,
) -> ApiResult {
    let Json(request) = body?;
    let citizen_id = request
        .citizen_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| CivicError::validation("citizen_id is required"))?;

    Ok(ok(state.registry.add_member(&family_id, &citizen_id)?))
}

/// DELETE /api/families/:id/members/:citizen_id
async fn remove_member(
    State(state): State<AppState>,
    Path((family_id, citizen_id)): Path<(String, String)>,
) -> ApiResult {
    Ok(ok(state.registry.remove_member(&family_id, &citizen_id)?))
}

async fn list_service_types(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.registry.list_service_types()?))
}

async fn create_service_type(
    State(state): State<AppState>,
    body: Body<ServiceTypeInput>,
) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.define_service_type(input)?))
}

async fn list_services(
    State(state): State<AppState>,
    Query(query): Query<ServiceQuery>,
) -> ApiResult {
    let filter = ServiceFilter {
        service_type_id: query.service_type_id.filter(|s| !s.is_empty()),
        citizen_id: query.citizen_id.filter(|s| !s.is_empty()),
    };
    Ok(ok(state.registry.list_services(&filter)?))
}

/// GET /api/services/check?citizen_id=&service_type_id=
async fn check_service(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult {
    let (citizen_id, service_type_id) =
        match (non_blank(query.citizen_id), non_blank(query.service_type_id)) {
            (Some(c), Some(s)) => (c, s),
            _ => return Err(CivicError::validation("Missing required fields").into()),
        };
    Ok(ok(state
        .registry
        .check_issuance(&citizen_id, &service_type_id, Utc::now())?))
}

/// POST /api/services/issue
async fn issue_service(State(state): State<AppState>, body: Body<IssueRequest>) -> ApiResult {
    let Json(request) = body?;
    Ok(ok(state.registry.issue_service(request, Utc::now())?))
}

async fn list_marriages(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.registry.list_marriages()?))
}

async fn create_marriage(State(state): State<AppState>, body: Body<MarriageInput>) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.register_marriage(input)?))
}

async fn list_officials(State(state): State<AppState>) -> ApiResult {
    Ok(ok(state.registry.list_postings()?))
}

async fn create_official(State(state): State<AppState>, body: Body<PostingInput>) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.create_posting(input)?))
}

async fn list_complaints(
    State(state): State<AppState>,
    Query(query): Query<ComplaintQuery>,
) -> ApiResult {
    let filter = ComplaintFilter::try_from(query)?;
    Ok(ok(state.registry.list_complaints(&filter)?))
}

/// GET /api/complaints/counts?submitted_by=
async fn complaint_counts(
    State(state): State<AppState>,
    Query(query): Query<SubmitterQuery>,
) -> ApiResult {
    let submitted_by = non_blank(query.submitted_by)
        .ok_or_else(|| CivicError::validation("submitted_by is required"))?;
    Ok(ok(state.registry.complaint_counts(&submitted_by)?))
}

async fn create_complaint(
    State(state): State<AppState>,
    body: Body<ComplaintInput>,
) -> ApiResult {
    let Json(input) = body?;
    Ok(created(state.registry.submit_complaint(input)?))
}

async fn get_complaint(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    Ok(ok(state.registry.get_complaint(&id)?))
}

/// PATCH /api/complaints/:id/status
async fn update_complaint_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Body<StatusUpdate>,
) -> ApiResult {
    let Json(update) = body?;
    Ok(ok(state
        .registry
        .update_complaint_status(&id, update, Utc::now())?))
}

/// GET /api/history/:entity_type/:id
async fn get_history(
    State(state): State<AppState>,
    Path((entity_type, id)): Path<(String, String)>,
) -> ApiResult {
    Ok(ok(state.registry.history(&entity_type, &id)?))
}

// ============================================================================
// Router
// ============================================================================

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/citizens", get(list_citizens).post(create_citizen))
        .route("/citizens/:id", get(get_citizen).put(update_citizen))
        .route("/families", get(list_families).post(create_family))
        .route("/families/:id", get(get_family))
        .route("/families/:id/members", post(add_member))
        .route("/families/:id/members/:citizen_id", delete(remove_member))
        .route(
            "/service-types",
            get(list_service_types).post(create_service_type),
        )
        .route("/services", get(list_services))
        .route("/services/check", get(check_service))
        .route("/services/issue", post(issue_service))
        .route("/marriages", get(list_marriages).post(create_marriage))
        .route("/officials", get(list_officials).post(create_official))
        .route("/complaints", get(list_complaints).post(create_complaint))
        .route("/complaints/counts", get(complaint_counts))
        .route("/complaints/:id", get(get_complaint))
        .route("/complaints/:id/status", patch(update_complaint_status))
        .route("/history/:entity_type/:id", get(get_history))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

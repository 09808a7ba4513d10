//! API routes and handlers for the export service
//!
//! The CSV download keeps the legacy `OpenSEECSVDownload.ashx` path so
//! existing OpenSEE links continue to work; `/api/export/csv` is the same
//! handler.

#![allow(clippy::disallowed_methods)] // json! macro used in multiple functions

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use common::SuccessResponse;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use utoipa::{IntoParams, OpenApi};
use xda_model::additional_field::{
    self, AdditionalFieldValue, AdditionalFieldValueFilter, AdditionalFieldValuePatch,
    NewAdditionalFieldValue,
};

use crate::app::AppState;
use crate::csv_export::load_export;
use crate::error::{ExportError, Result};
use crate::request::{download_file_name, ExportRequest, RequestParameters};
use crate::stream::csv_body;

/// Header carrying the caller's roles, comma separated
pub const USER_ROLES_HEADER: &str = "x-user-roles";

/// Create all API routes with state
pub fn create_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // CSV export
        .route("/OpenSEECSVDownload.ashx", get(download_csv))
        .route("/api/export/csv", get(download_csv))
        // Additional field values
        .route(
            "/api/additional-field-values",
            get(search_additional_field_values).post(create_additional_field_value),
        )
        .route(
            "/api/additional-field-values/{id}",
            get(get_additional_field_value)
                .patch(update_additional_field_value)
                .delete(delete_additional_field_value),
        )
        // Apply HTTP request logging middleware
        .layer(axum::middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}

// ============================================================================
// OpenAPI Documentation
// ============================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        download_csv,
        search_additional_field_values,
        get_additional_field_value,
        create_additional_field_value,
        update_additional_field_value,
        delete_additional_field_value
    ),
    tags(
        (name = "exportsrv", description = "OpenSEE CSV export and additional field values")
    )
)]
pub struct ApiDoc;

// ============================================================================
// Handlers
// ============================================================================

/// Report the error and hand it back for the response
fn reported(state: &AppState, err: ExportError) -> ExportError {
    state.exception_logger.log_exception(&err);
    err
}

/// Health check endpoint
async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse<serde_json::Value>>> {
    let database = match state.sqlite.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            debug!("Health check ping failed: {}", e);
            "unavailable"
        },
    };

    Ok(Json(SuccessResponse::new(json!({
        "status": if database == "connected" { "healthy" } else { "degraded" },
        "service": state.config.service.name,
        "database": database,
        "started_at": state.started_at.to_rfc3339(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))))
}

#[utoipa::path(
    get,
    path = "/OpenSEECSVDownload.ashx",
    params(
        ("type" = Option<String>, Query, description = "csv, stats, harmonics or correlatedsags"),
        ("eventId" = Option<i64>, Query, description = "Event to export"),
        ("startDate" = Option<String>, Query, description = "Window start (csv only)"),
        ("endDate" = Option<String>, Query, description = "Window end (csv only)"),
        ("Meter" = Option<String>, Query, description = "Meter name used in the file name"),
        ("EventType" = Option<String>, Query, description = "Event type used in the file name")
    ),
    responses(
        (status = 200, description = "CSV attachment", content_type = "text/csv", body = String),
        (status = 400, description = "Unknown type or malformed parameter"),
        (status = 404, description = "Event or statistics not found")
    ),
    tag = "exportsrv"
)]
pub async fn download_csv(State(state): State<Arc<AppState>>, uri: Uri) -> Response {
    let pairs = match Query::<Vec<(String, String)>>::try_from_uri(&uri) {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            let err = ExportError::invalid_parameter("query", rejection.body_text());
            return reported(&state, err).into_response();
        },
    };
    let params = RequestParameters::from_pairs(pairs);

    let request = match ExportRequest::parse(&params) {
        Ok(request) => request,
        Err(err) => return reported(&state, err).into_response(),
    };

    let Some(export_type) = request.export_type() else {
        debug!("Export without a known type: {:?}", params.get("type"));
        return if state.config.export.strict_export_type {
            StatusCode::BAD_REQUEST.into_response()
        } else {
            (StatusCode::OK, [(header::CONTENT_TYPE, "text/csv")], Body::empty()).into_response()
        };
    };

    let payload = match load_export(state.pool(), &request, &state.config.export).await {
        Ok(payload) => payload,
        Err(err) => return reported(&state, err).into_response(),
    };

    let file_name = download_file_name(&params);
    info!("Exporting {} as {}", export_type.as_str(), file_name);

    let body = csv_body(
        payload,
        state.config.export.stream_chunk_size,
        Arc::clone(&state.exception_logger),
    );
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

/// Search filter as sent by clients
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SearchQuery {
    /// Parent record
    #[serde(rename = "parentTableID", alias = "parentTableId")]
    pub parent_table_id: Option<i64>,
    /// Field definition
    #[serde(rename = "additionalFieldID", alias = "additionalFieldId")]
    pub additional_field_id: Option<i64>,
}

impl From<SearchQuery> for AdditionalFieldValueFilter {
    fn from(query: SearchQuery) -> Self {
        Self {
            parent_table_id: query.parent_table_id,
            additional_field_id: query.additional_field_id,
        }
    }
}

/// Reject writes from callers without a write role
fn require_write_role(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let roles = headers
        .get_all(USER_ROLES_HEADER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','));

    if additional_field::is_write_permitted(roles) {
        Ok(())
    } else {
        Err(reported(
            state,
            ExportError::Forbidden("additional field values require a write role".to_string()),
        ))
    }
}

#[utoipa::path(
    get,
    path = "/api/additional-field-values",
    params(SearchQuery),
    responses(
        (status = 200, description = "Matching values", body = SuccessResponse<Vec<AdditionalFieldValue>>)
    ),
    tag = "exportsrv"
)]
pub async fn search_additional_field_values(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SuccessResponse<Vec<AdditionalFieldValue>>>> {
    let filter = AdditionalFieldValueFilter::from(query);
    let values = additional_field::search(state.pool(), &filter)
        .await
        .map_err(|e| reported(&state, e.into()))?;
    Ok(Json(SuccessResponse::new(values)))
}

#[utoipa::path(
    get,
    path = "/api/additional-field-values/{id}",
    params(("id" = i64, Path, description = "Value identifier")),
    responses(
        (status = 200, description = "Value", body = SuccessResponse<AdditionalFieldValue>),
        (status = 404, description = "Not found")
    ),
    tag = "exportsrv"
)]
pub async fn get_additional_field_value(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<SuccessResponse<AdditionalFieldValue>>> {
    let value = additional_field::get(state.pool(), id)
        .await
        .map_err(|e| reported(&state, e.into()))?;
    Ok(Json(SuccessResponse::new(value)))
}

#[utoipa::path(
    post,
    path = "/api/additional-field-values",
    request_body = NewAdditionalFieldValue,
    responses(
        (status = 200, description = "Value created", body = SuccessResponse<AdditionalFieldValue>),
        (status = 403, description = "Caller lacks a write role")
    ),
    tag = "exportsrv"
)]
pub async fn create_additional_field_value(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(value): Json<NewAdditionalFieldValue>,
) -> Result<Json<SuccessResponse<AdditionalFieldValue>>> {
    require_write_role(&state, &headers)?;

    let created = additional_field::insert(state.pool(), &value)
        .await
        .map_err(|e| reported(&state, e.into()))?;
    info!(
        "Created additional field value {} (parent {}, field {})",
        created.id, created.parent_table_id, created.additional_field_id
    );
    Ok(Json(SuccessResponse::new(created)))
}

#[utoipa::path(
    patch,
    path = "/api/additional-field-values/{id}",
    params(("id" = i64, Path, description = "Value identifier")),
    request_body = AdditionalFieldValuePatch,
    responses(
        (status = 200, description = "Value updated", body = SuccessResponse<AdditionalFieldValue>),
        (status = 403, description = "Caller lacks a write role"),
        (status = 404, description = "Not found")
    ),
    tag = "exportsrv"
)]
pub async fn update_additional_field_value(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(patch): Json<AdditionalFieldValuePatch>,
) -> Result<Json<SuccessResponse<AdditionalFieldValue>>> {
    require_write_role(&state, &headers)?;

    let updated = additional_field::update(state.pool(), id, &patch)
        .await
        .map_err(|e| reported(&state, e.into()))?;
    Ok(Json(SuccessResponse::new(updated)))
}

#[utoipa::path(
    delete,
    path = "/api/additional-field-values/{id}",
    params(("id" = i64, Path, description = "Value identifier")),
    responses(
        (status = 200, description = "Value deleted", body = serde_json::Value),
        (status = 403, description = "Caller lacks a write role"),
        (status = 404, description = "Not found")
    ),
    tag = "exportsrv"
)]
pub async fn delete_additional_field_value(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Json<SuccessResponse<serde_json::Value>>> {
    require_write_role(&state, &headers)?;

    additional_field::delete(state.pool(), id)
        .await
        .map_err(|e| reported(&state, e.into()))?;
    info!("Deleted additional field value {}", id);
    Ok(Json(SuccessResponse::new(json!({ "id": id, "deleted": true }))))
}

//! Insurance coverage endpoints.
//!
//! - `POST   /api/plans/:id/coverage/calculate`
//! - `POST   /api/plans/:id/coverage-rules`
//! - `PATCH  /api/coverage-rules` (bulk value update)
//! - `PATCH  /api/coverage-rules/:id`
//! - `PATCH  /api/coverage-rules/:id/value`
//! - `DELETE /api/coverage-rules/:id`
//! - `GET    /api/coverage-rules/:id/history`
//! - `POST   /api/plans/:id/coverage/import?category=..&preview=..` (CSV body)
//! - `GET    /api/plans/:id/coverage/template?category=..` (CSV response)

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_id;
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::Permission;
use crate::coverage::{self, CoverageQuote, CoverageRequest, RuleInput, RulePatch, WriteContext};
use crate::models::enums::CoverageCategory;
use crate::models::*;

fn write_context(ctx: &ApiContext, actor: &ActorContext) -> WriteContext {
    WriteContext::new(actor.id(), ctx.now())
}

pub async fn calculate(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(plan_id): Path<String>,
    Json(body): Json<CoverageRequest>,
) -> Result<Json<CoverageQuote>, ApiError> {
    ctx.require(&actor, Permission::CalculateCoverage)?;
    let plan_id = parse_id("plan", &plan_id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(coverage::calculate_coverage(&conn, &plan_id, &body)?))
}

pub async fn create_rule(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(plan_id): Path<String>,
    Json(body): Json<RuleInput>,
) -> Result<(StatusCode, Json<CoverageRule>), ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let plan_id = parse_id("plan", &plan_id)?;
    let conn = ctx.core.open_db()?;

    let rule = coverage::create_rule(&conn, &plan_id, body, &write_context(&ctx, &actor))?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn update_rule(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rule_id): Path<String>,
    Json(body): Json<RulePatch>,
) -> Result<Json<CoverageRule>, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let rule_id = parse_id("coverage rule", &rule_id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(coverage::update_rule(&conn, &rule_id, body, &write_context(&ctx, &actor))?))
}

#[derive(Deserialize)]
pub struct ValueUpdate {
    pub coverage_value: f64,
}

pub async fn quick_update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rule_id): Path<String>,
    Json(body): Json<ValueUpdate>,
) -> Result<Json<CoverageRule>, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let rule_id = parse_id("coverage rule", &rule_id)?;
    let conn = ctx.core.open_db()?;
    let rule = coverage::quick_update_value(&conn, &rule_id, body.coverage_value, &write_context(&ctx, &actor))?;
    Ok(Json(rule))
}

#[derive(Deserialize)]
pub struct BulkValueUpdate {
    pub rule_id: Uuid,
    pub coverage_value: f64,
}

#[derive(Deserialize)]
pub struct BulkUpdateRequest {
    pub updates: Vec<BulkValueUpdate>,
}

#[derive(Serialize)]
pub struct BulkUpdateResponse {
    pub batch_id: Uuid,
    pub rules: Vec<CoverageRule>,
}

pub async fn bulk_update(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Json(body): Json<BulkUpdateRequest>,
) -> Result<Json<BulkUpdateResponse>, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    if body.updates.is_empty() {
        return Err(ApiError::validation("updates", "must not be empty"));
    }
    let updates: Vec<(Uuid, f64)> = body.updates.iter().map(|u| (u.rule_id, u.coverage_value)).collect();
    let write = write_context(&ctx, &actor);
    let conn = ctx.core.open_db()?;

    let rules = coverage::bulk_update_values(&conn, &updates, &write)?;
    Ok(Json(BulkUpdateResponse {
        batch_id: write.batch_id,
        rules,
    }))
}

pub async fn delete_rule(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let rule_id = parse_id("coverage rule", &rule_id)?;
    let conn = ctx.core.open_db()?;
    coverage::delete_rule(&conn, &rule_id, &write_context(&ctx, &actor))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rule_history(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rule_id): Path<String>,
) -> Result<Json<Vec<CoverageRuleHistory>>, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let rule_id = parse_id("coverage rule", &rule_id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(coverage::rule_history(&conn, &rule_id)?))
}

#[derive(Deserialize)]
pub struct ImportQuery {
    pub category: CoverageCategory,
    #[serde(default)]
    pub preview: bool,
}

pub async fn import(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(plan_id): Path<String>,
    Query(query): Query<ImportQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let plan_id = parse_id("plan", &plan_id)?;
    if body.is_empty() {
        return Err(ApiError::validation("file", "request body must contain a CSV sheet"));
    }
    let conn = ctx.core.open_db()?;

    if query.preview {
        let preview = coverage::preview_import(&conn, &plan_id, query.category, &body)?;
        return Ok(Json(preview).into_response());
    }
    let summary = coverage::import_coverage(&conn, &plan_id, query.category, &body, &write_context(&ctx, &actor))?;
    Ok(Json(summary).into_response())
}

#[derive(Deserialize)]
pub struct TemplateQuery {
    pub category: CoverageCategory,
}

pub async fn template(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(plan_id): Path<String>,
    Query(query): Query<TemplateQuery>,
) -> Result<Response, ApiError> {
    ctx.require(&actor, Permission::ManageCoverage)?;
    let plan_id = parse_id("plan", &plan_id)?;
    let conn = ctx.core.open_db()?;

    let csv = coverage::coverage_template(&conn, &plan_id, query.category)?;
    let disposition = format!("attachment; filename=\"coverage-{}-{}.csv\"", query.category, plan_id);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        csv,
    )
        .into_response())
}

//! Ward medication schedule endpoints.
//!
//! - `GET   /api/prescriptions/:id/administrations`
//! - `GET   /api/prescriptions/:id/smart-defaults`
//! - `POST  /api/prescriptions/:id/schedule`
//! - `POST  /api/prescriptions/:id/discontinue`
//! - `PATCH /api/administrations/:id/schedule`
//! - `GET   /api/administrations/:id/adjustments`
//! - `POST  /api/administrations/:id/record`

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use super::{parse_client_time, parse_id};
use crate::api::error::ApiError;
use crate::api::types::{ActorContext, ApiContext};
use crate::authorization::Permission;
use crate::models::*;
use crate::schedule::{self, OutcomeRecord, RawPattern, SchedulePattern};

#[derive(Serialize)]
pub struct AdministrationsResponse {
    pub prescription_id: String,
    pub administrations: Vec<MedicationAdministration>,
}

pub async fn administrations(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rx_id): Path<String>,
) -> Result<Json<AdministrationsResponse>, ApiError> {
    ctx.require(&actor, Permission::ViewSchedule)?;
    let rx_id = parse_id("prescription", &rx_id)?;
    let conn = ctx.core.open_db()?;

    let administrations = schedule::list_administrations(&conn, &rx_id)?;
    Ok(Json(AdministrationsResponse {
        prescription_id: rx_id.to_string(),
        administrations,
    }))
}

pub async fn smart_defaults(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rx_id): Path<String>,
) -> Result<Json<schedule::PatternSuggestion>, ApiError> {
    ctx.require(&actor, Permission::ViewSchedule)?;
    let rx_id = parse_id("prescription", &rx_id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(schedule::suggest_pattern(&conn, &rx_id, ctx.now())?))
}

#[derive(Deserialize)]
pub struct ScheduleRequest {
    /// Omitted for STAT prescriptions.
    pub schedule_pattern: Option<RawPattern>,
    /// When the prescription took effect; defaults to now.
    pub reference_time: Option<String>,
}

pub async fn configure(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rx_id): Path<String>,
    Json(body): Json<ScheduleRequest>,
) -> Result<Json<schedule::ScheduleOutcome>, ApiError> {
    ctx.require(&actor, Permission::ManageSchedule)?;
    let rx_id = parse_id("prescription", &rx_id)?;
    let pattern = body
        .schedule_pattern
        .as_ref()
        .map(SchedulePattern::parse)
        .transpose()?;
    let now = ctx.now();
    let reference = match body.reference_time.as_deref() {
        Some(raw) => parse_client_time("reference_time", raw)?,
        None => now,
    };

    let conn = ctx.core.open_db()?;
    let outcome = schedule::configure_schedule(&conn, &rx_id, pattern, actor.id(), reference, now)?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct DiscontinueRequest {
    pub reason: String,
}

pub async fn discontinue(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(rx_id): Path<String>,
    Json(body): Json<DiscontinueRequest>,
) -> Result<Json<schedule::DiscontinueOutcome>, ApiError> {
    ctx.require(&actor, Permission::ManageSchedule)?;
    let rx_id = parse_id("prescription", &rx_id)?;
    let conn = ctx.core.open_db()?;

    let outcome = schedule::discontinue_prescription(&conn, &rx_id, actor.id(), &body.reason, ctx.now())?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
pub struct AdjustRequest {
    pub scheduled_time: String,
    pub reason: Option<String>,
}

pub async fn adjust(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(admin_id): Path<String>,
    Json(body): Json<AdjustRequest>,
) -> Result<Json<MedicationAdministration>, ApiError> {
    ctx.require(&actor, Permission::AdjustSchedule)?;
    let admin_id = parse_id("administration", &admin_id)?;
    let new_time = parse_client_time("scheduled_time", &body.scheduled_time)?;
    let conn = ctx.core.open_db()?;

    let updated = schedule::adjust_administration(
        &conn,
        &admin_id,
        new_time,
        actor.id(),
        body.reason.as_deref(),
        ctx.now(),
    )?;
    Ok(Json(updated))
}

pub async fn adjustments(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(admin_id): Path<String>,
) -> Result<Json<Vec<ScheduleAdjustment>>, ApiError> {
    ctx.require(&actor, Permission::ViewSchedule)?;
    let admin_id = parse_id("administration", &admin_id)?;
    let conn = ctx.core.open_db()?;
    Ok(Json(schedule::list_adjustments(&conn, &admin_id)?))
}

pub async fn record(
    State(ctx): State<ApiContext>,
    Extension(actor): Extension<ActorContext>,
    Path(admin_id): Path<String>,
    Json(body): Json<OutcomeRecord>,
) -> Result<Json<MedicationAdministration>, ApiError> {
    ctx.require(&actor, Permission::RecordAdministration)?;
    let admin_id = parse_id("administration", &admin_id)?;
    let conn = ctx.core.open_db()?;

    let recorded = schedule::record_administration(&conn, &admin_id, &body, actor.id(), ctx.now())?;
    Ok(Json(recorded))
}

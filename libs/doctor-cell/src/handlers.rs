use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{RequestContext, Role};
use shared_models::error::AppError;

use crate::models::{
    AvailabilityRangeQuery, ChangeStateRequest, CreateDoctorRequest, DoctorSearchFilters,
    ReplaceAvailabilityRequest, UpdateDoctorRequest, WindowSpec,
};
use crate::services::{availability::AvailabilityService, doctor::DoctorService};

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn search_doctors_public(
    State(state): State<Arc<AppConfig>>,
    Query(mut filters): Query<DoctorSearchFilters>,
) -> Result<Json<Value>, AppError> {
    // Public callers only ever see active doctors.
    filters.include_inactive = Some(false);

    let doctors = DoctorService::new(&state)
        .search_doctors(filters, &state.supabase_anon_key)
        .await?;

    Ok(Json(json!({
        "doctors": doctors,
        "total": doctors.len()
    })))
}

#[axum::debug_handler]
pub async fn get_doctor_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let doctor = DoctorService::new(&state)
        .get_doctor(doctor_id, &state.supabase_anon_key)
        .await?;

    if !doctor.state.is_active() {
        return Err(AppError::NotFound("Doctor not found".to_string()));
    }

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn get_doctor_availability_public(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Query(query): Query<AvailabilityRangeQuery>,
) -> Result<Json<Value>, AppError> {
    let service = AvailabilityService::new(&state);
    let (default_from, default_to) = service.default_range();
    let from = query.from.unwrap_or(default_from);
    let to = query.to.unwrap_or(default_to);

    if from > to {
        return Err(AppError::BadRequest("'from' must not be after 'to'".to_string()));
    }

    let windows = service
        .list_windows(doctor_id, from, to, &state.supabase_anon_key)
        .await?
        .into_iter()
        .filter(|window| window.is_available)
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "doctor_id": doctor_id,
        "from": from,
        "to": to,
        "windows": windows
    })))
}

// ==============================================================================
// PROTECTED HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_doctor(
    State(state): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let doctor = DoctorService::new(&state).create_doctor(request, ctx.token()).await?;

    Ok(Json(json!({
        "success": true,
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn update_doctor(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<UpdateDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&ctx, doctor_id)?;

    let doctor = DoctorService::new(&state)
        .update_doctor(doctor_id, request, ctx.token())
        .await?;

    Ok(Json(json!(doctor)))
}

#[axum::debug_handler]
pub async fn change_doctor_state(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<ChangeStateRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let doctor = DoctorService::new(&state)
        .change_state(doctor_id, request, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "doctor": doctor
    })))
}

#[axum::debug_handler]
pub async fn create_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<WindowSpec>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&ctx, doctor_id)?;
    DoctorService::new(&state).require_active(doctor_id, ctx.token()).await?;

    let window = AvailabilityService::new(&state)
        .create_window(doctor_id, request, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "window": window
    })))
}

#[axum::debug_handler]
pub async fn replace_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<Uuid>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<ReplaceAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&ctx, doctor_id)?;
    DoctorService::new(&state).require_active(doctor_id, ctx.token()).await?;

    let windows = AvailabilityService::new(&state)
        .replace_range(doctor_id, request, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "windows": windows,
        "total": windows.len()
    })))
}

#[axum::debug_handler]
pub async fn delete_availability(
    State(state): State<Arc<AppConfig>>,
    Path((doctor_id, window_id)): Path<(Uuid, Uuid)>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Value>, AppError> {
    require_self_or_admin(&ctx, doctor_id)?;

    AvailabilityService::new(&state)
        .delete_window(doctor_id, window_id, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Availability window deleted"
    })))
}

fn require_self_or_admin(ctx: &RequestContext, doctor_id: Uuid) -> Result<(), AppError> {
    if ctx.is_admin() || (ctx.is(Role::Doctor) && ctx.is_self(&doctor_id)) {
        Ok(())
    } else {
        Err(AppError::Forbidden("Only the doctor or an admin can manage this profile".to_string()))
    }
}

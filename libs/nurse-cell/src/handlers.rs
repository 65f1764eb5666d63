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
    AssignDoctorsRequest, ChangeNurseStateRequest, CreateNurseRequest, NurseListQuery, UpdateNurseRequest,
};
use crate::services::NurseService;

#[axum::debug_handler]
pub async fn create_nurse(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateNurseRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let nurse = NurseService::new(&config).create_nurse(request, ctx.token()).await?;

    Ok(Json(json!({
        "success": true,
        "nurse": nurse
    })))
}

#[axum::debug_handler]
pub async fn list_nurses(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<NurseListQuery>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin, Role::Doctor, Role::Triage])?;

    let nurses = NurseService::new(&config).list_nurses(query, ctx.token()).await?;

    Ok(Json(json!({
        "nurses": nurses,
        "total": nurses.len()
    })))
}

#[axum::debug_handler]
pub async fn get_nurse(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(nurse_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !ctx.is_self(&nurse_id) {
        ctx.require_any(&[Role::Admin, Role::Doctor, Role::Triage])?;
    }

    let nurse = NurseService::new(&config).get_nurse(nurse_id, ctx.token()).await?;

    Ok(Json(json!(nurse)))
}

#[axum::debug_handler]
pub async fn update_nurse(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(nurse_id): Path<Uuid>,
    Json(request): Json<UpdateNurseRequest>,
) -> Result<Json<Value>, AppError> {
    if !ctx.is_self(&nurse_id) && !ctx.is_admin() {
        return Err(AppError::Forbidden("Not authorized to update this nurse profile".to_string()));
    }

    let nurse = NurseService::new(&config).update_nurse(nurse_id, request, ctx.token()).await?;

    Ok(Json(json!(nurse)))
}

#[axum::debug_handler]
pub async fn change_nurse_state(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(nurse_id): Path<Uuid>,
    Json(request): Json<ChangeNurseStateRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let nurse = NurseService::new(&config).change_state(nurse_id, request, ctx.token()).await?;

    Ok(Json(json!({
        "success": true,
        "nurse": nurse
    })))
}

#[axum::debug_handler]
pub async fn assign_doctors(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(nurse_id): Path<Uuid>,
    Json(request): Json<AssignDoctorsRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let nurse = NurseService::new(&config).assign_doctors(nurse_id, request, ctx.token()).await?;

    Ok(Json(json!({
        "success": true,
        "nurse": nurse
    })))
}

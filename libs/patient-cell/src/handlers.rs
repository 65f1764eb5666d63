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

use crate::models::{ChangePatientStateRequest, CreatePatientRequest, PatientSearchQuery, UpdatePatientRequest};
use crate::services::PatientService;

const STAFF: [Role; 4] = [Role::Admin, Role::Doctor, Role::Nurse, Role::Triage];

#[axum::debug_handler]
pub async fn create_patient(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    let self_registration = ctx.is(Role::Patient) && ctx.is_self(&request.id);
    if !self_registration && !ctx.is_admin() {
        return Err(AppError::Forbidden("Not authorized to create this patient profile".to_string()));
    }

    let patient = PatientService::new(&config).create_patient(request, ctx.token()).await?;
    
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !ctx.is_self(&patient_id) {
        ctx.require_any(&STAFF)?;
    }

    let patient = PatientService::new(&config).get_patient(patient_id, ctx.token()).await?;
    
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn get_patient_profile(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Patient])?;
    let patient_id = Uuid::parse_str(ctx.user_id())
        .map_err(|_| AppError::Auth("Invalid user id in token".to_string()))?;

    let patient = PatientService::new(&config).get_patient(patient_id, ctx.token()).await?;

    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<UpdatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    if !ctx.is_self(&patient_id) && !ctx.is_admin() {
        return Err(AppError::Forbidden("Not authorized to update this patient profile".to_string()));
    }

    let patient = PatientService::new(&config)
        .update_patient(patient_id, request, ctx.token())
        .await?;
    
    Ok(Json(json!(patient)))
}

#[axum::debug_handler]
pub async fn change_patient_state(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(patient_id): Path<Uuid>,
    Json(request): Json<ChangePatientStateRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let patient = PatientService::new(&config)
        .change_state(patient_id, request, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

#[axum::debug_handler]
pub async fn search_patients(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<PatientSearchQuery>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&STAFF)?;

    let patients = PatientService::new(&config).search_patients(query, ctx.token()).await?;
    
    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

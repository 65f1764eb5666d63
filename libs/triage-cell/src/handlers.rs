use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use appointment_cell::services::AppointmentNotifier;
use notification_cell::NotificationProducer;
use shared_config::AppConfig;
use shared_models::auth::{RequestContext, Role};
use shared_models::error::AppError;

use crate::models::{AssessmentListQuery, AssignDoctorRequest, CreateAssessmentRequest};
use crate::services::TriageService;

#[axum::debug_handler]
pub async fn create_assessment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Json(request): Json<CreateAssessmentRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Triage])?;
    let triage_user_id = Uuid::parse_str(ctx.user_id())
        .map_err(|_| AppError::Auth("Token subject is not a valid profile id".to_string()))?;

    let assessment = TriageService::new(&config)
        .create_assessment(triage_user_id, request, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "assessment": assessment
    })))
}

#[axum::debug_handler]
pub async fn list_assessments(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<AssessmentListQuery>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Triage, Role::Admin])?;

    let assessments = TriageService::new(&config).list_assessments(query, ctx.token()).await?;

    Ok(Json(json!({
        "assessments": assessments,
        "total": assessments.len()
    })))
}

/// Assessment detail with the doctors it could be assigned to.
#[axum::debug_handler]
pub async fn get_assessment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(assessment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Triage, Role::Admin])?;

    let service = TriageService::new(&config);
    let assessment = service.get_assessment(assessment_id, ctx.token()).await?;
    let doctors = service.candidate_doctors(&assessment, ctx.token()).await?;

    Ok(Json(json!({
        "assessment": assessment,
        "candidate_doctors": doctors
    })))
}

#[axum::debug_handler]
pub async fn assign_doctor(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(assessment_id): Path<Uuid>,
    Json(request): Json<AssignDoctorRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Triage])?;

    let service = TriageService::new(&config);
    let assessment = service.get_assessment(assessment_id, ctx.token()).await?;
    let (assessment, appointment) = service.assign_doctor(&assessment, request, ctx.token()).await?;

    AppointmentNotifier::new(&config, producer).booked(&appointment, ctx.token()).await;

    Ok(Json(json!({
        "success": true,
        "assessment": assessment,
        "appointment": appointment
    })))
}

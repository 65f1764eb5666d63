use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, Extension},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use notification_cell::NotificationProducer;
use shared_config::AppConfig;
use shared_models::auth::{RequestContext, Role};
use shared_models::error::AppError;

use crate::models::{
    Appointment, AppointmentError, AppointmentListQuery, AssignNurseRequest, BookAppointmentRequest,
    CancelAppointmentRequest, CompleteAppointmentRequest, CompletionOutcome, RescheduleAppointmentRequest,
    SlotCheckQuery,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::{AppointmentBookingService, AppointmentNotifier, NursingService, TreatmentService};

// ==============================================================================
// ACCESS RULES
// ==============================================================================

fn can_view(ctx: &RequestContext, appointment: &Appointment) -> bool {
    ctx.is_admin()
        || ctx.is(Role::Triage)
        || ctx.is_self(&appointment.patient_id)
        || ctx.is_self(&appointment.doctor_id)
        || appointment.nurse_id.is_some_and(|nurse_id| ctx.is_self(&nurse_id))
}

fn caller_id(ctx: &RequestContext) -> Result<Uuid, AppError> {
    Uuid::parse_str(ctx.user_id())
        .map_err(|_| AppError::Auth("Token subject is not a valid profile id".to_string()))
}

async fn load_visible(
    service: &AppointmentBookingService,
    ctx: &RequestContext,
    appointment_id: Uuid,
) -> Result<Appointment, AppError> {
    let appointment = service.get_appointment(appointment_id, ctx.token()).await?;
    if !can_view(ctx, &appointment) {
        return Err(AppointmentError::Unauthorized.into());
    }
    Ok(appointment)
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Patient, Role::Admin])?;

    let patient_id = match (ctx.is_admin(), request.patient_id) {
        (true, Some(patient_id)) => patient_id,
        (true, None) => return Err(AppError::BadRequest("patient_id is required for admin bookings".to_string())),
        (false, Some(patient_id)) if !ctx.is_self(&patient_id) => {
            return Err(AppError::Forbidden("Patients can only book for themselves".to_string()));
        }
        (false, _) => caller_id(&ctx)?,
    };
    if request.override_availability && !ctx.is_admin() {
        return Err(AppError::Forbidden("Only admins can override availability".to_string()));
    }
    let allow_override = request.override_availability;

    let outcome = AppointmentBookingService::new(&config)
        .book_appointment(request, patient_id, allow_override, ctx.token())
        .await?;

    AppointmentNotifier::new(&config, producer).booked(&outcome.appointment, ctx.token()).await;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "warnings": outcome.warnings
    })))
}

#[axum::debug_handler]
pub async fn check_slot(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<SlotCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let (request, verdict) = AppointmentBookingService::new(&config)
        .check_slot(query, ctx.token())
        .await?;

    Ok(Json(json!({
        "doctor_id": request.doctor_id,
        "date": request.date,
        "start_time": request.start_time,
        "end_time": request.end_time(),
        "available": verdict.available,
        "reason": verdict.reason
    })))
}

// ==============================================================================
// LISTING HANDLERS
// ==============================================================================

/// Patients, doctors and nurses only ever see their own appointments.
#[axum::debug_handler]
pub async fn list_appointments(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Query(mut query): Query<AppointmentListQuery>,
) -> Result<Json<Value>, AppError> {
    let mut nurse_id = None;
    match ctx.role {
        Role::Patient => query.patient_id = Some(caller_id(&ctx)?),
        Role::Doctor => query.doctor_id = Some(caller_id(&ctx)?),
        Role::Nurse => nurse_id = Some(caller_id(&ctx)?),
        Role::Admin | Role::Triage => {}
    }

    let appointments = AppointmentBookingService::new(&config)
        .list_appointments(query, nurse_id, ctx.token())
        .await?;

    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let appointment = load_visible(&service, &ctx, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn get_treatment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    load_visible(&service, &ctx, appointment_id).await?;

    let treatment = TreatmentService::new(&config).get_treatment(appointment_id, ctx.token()).await?;

    Ok(Json(json!(treatment)))
}

#[axum::debug_handler]
pub async fn patient_history(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(patient_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    if !ctx.is_self(&patient_id) {
        ctx.require_any(&[Role::Admin, Role::Doctor, Role::Nurse, Role::Triage])?;
    }

    let history = TreatmentService::new(&config).patient_history(patient_id, ctx.token()).await?;

    Ok(Json(json!({
        "patient_id": patient_id,
        "history": history,
        "total": history.len()
    })))
}

// ==============================================================================
// LIFECYCLE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let current = service.get_appointment(appointment_id, ctx.token()).await?;

    if !ctx.is_self(&current.patient_id) && !ctx.is_admin() {
        return Err(AppointmentError::Unauthorized.into());
    }
    if request.override_availability && !ctx.is_admin() {
        return Err(AppError::Forbidden("Only admins can override availability".to_string()));
    }
    let allow_override = request.override_availability;

    let outcome = service.reschedule_appointment(&current, request, allow_override, ctx.token()).await?;

    AppointmentNotifier::new(&config, producer)
        .rescheduled(&outcome.appointment, current.appointment_date, current.start_time, ctx.token())
        .await;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "warnings": outcome.warnings
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let current = service.get_appointment(appointment_id, ctx.token()).await?;

    if !ctx.is_self(&current.patient_id) && !ctx.is_self(&current.doctor_id) && !ctx.is_admin() {
        return Err(AppointmentError::Unauthorized.into());
    }

    let appointment = service
        .cancel_appointment(&current, request, &ctx.role.to_string(), ctx.token())
        .await?;

    if let Some(nurse_id) = appointment.nurse_id {
        NursingService::new(&config).release_nurse(nurse_id, appointment.patient_id, ctx.token()).await;
    }
    AppointmentNotifier::new(&config, producer).canceled(&appointment, ctx.token()).await;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

/// Record the treatment, optionally assign a nurse, then mark the appointment completed.
#[axum::debug_handler]
pub async fn complete_appointment(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Extension(producer): Extension<NotificationProducer>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CompleteAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentBookingService::new(&config);
    let current = service.get_appointment(appointment_id, ctx.token()).await?;

    if !ctx.is(Role::Doctor) || !ctx.is_self(&current.doctor_id) {
        return Err(AppointmentError::Unauthorized.into());
    }
    AppointmentLifecycleService::new().ensure_active(current.status)?;

    let treatment = TreatmentService::new(&config)
        .record_treatment(&current, &request, ctx.token())
        .await?;

    let nursing = NursingService::new(&config);
    let mut warnings = Vec::new();
    let mut current = current;
    if let Some(nurse_id) = request.nurse_id.filter(|id| Some(*id) != current.nurse_id) {
        let outcome = nursing.assign_nurse(&current, Some(nurse_id), ctx.token()).await?;
        warnings = outcome.warnings;
        current = outcome.appointment;
    }

    let appointment = service.mark_completed(&current, ctx.token()).await?;

    if let Some(nurse_id) = appointment.nurse_id {
        nursing.release_nurse(nurse_id, appointment.patient_id, ctx.token()).await;
    }
    AppointmentNotifier::new(&config, producer).treated(&appointment, &treatment, ctx.token()).await;

    Ok(Json(json!(CompletionOutcome { appointment, treatment, warnings })))
}

// ==============================================================================
// NURSE ASSIGNMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn assign_nurse(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<AssignNurseRequest>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let current = AppointmentBookingService::new(&config)
        .get_appointment(appointment_id, ctx.token())
        .await?;
    let outcome = NursingService::new(&config)
        .assign_nurse(&current, request.nurse_id, ctx.token())
        .await?;

    Ok(Json(json!({
        "success": true,
        "appointment": outcome.appointment,
        "warnings": outcome.warnings
    })))
}

#[axum::debug_handler]
pub async fn nurse_roster(
    State(config): State<Arc<AppConfig>>,
    Extension(ctx): Extension<RequestContext>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    ctx.require_any(&[Role::Admin])?;

    let current = AppointmentBookingService::new(&config)
        .get_appointment(appointment_id, ctx.token())
        .await?;
    let roster = NursingService::new(&config).nurse_roster(&current, ctx.token()).await?;

    Ok(Json(json!(roster)))
}

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::lifecycle::RecordState;
use shared_utils::validation::{is_valid_email, is_valid_phone, require_text};

use crate::models::{
    AssignDoctorsRequest, ChangeNurseStateRequest, CreateNurseRequest, Nurse, NurseError,
    NurseListQuery, UpdateNurseRequest,
};

pub struct NurseService {
    supabase: SupabaseClient,
}

impl NurseService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_nurse(&self, request: CreateNurseRequest, auth_token: &str) -> Result<Nurse, NurseError> {
        debug!("Creating nurse profile for: {}", request.email);

        require_text("Full name", &request.full_name).map_err(NurseError::ValidationError)?;
        if !is_valid_email(&request.email) {
            return Err(NurseError::ValidationError(format!("Invalid email: {}", request.email)));
        }
        if let Some(ref phone) = request.contact_number {
            if !is_valid_phone(phone) {
                return Err(NurseError::ValidationError(format!("Invalid contact number: {}", phone)));
            }
        }

        let existing_path = format!("/rest/v1/nurses?email=eq.{}", urlencoding::encode(&request.email));
        let existing: Vec<Value> = self.supabase.request(Method::GET, &existing_path, Some(auth_token), None).await?;
        if !existing.is_empty() {
            return Err(NurseError::EmailAlreadyExists(request.email));
        }

        let mut doctor_ids = request.assigned_doctor_ids;
        doctor_ids.sort();
        doctor_ids.dedup();

        let now = Utc::now().to_rfc3339();
        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/nurses",
            Some(auth_token),
            json!({
                "id": request.id,
                "full_name": request.full_name.trim(),
                "email": request.email.trim().to_lowercase(),
                "contact_number": request.contact_number,
                "department": request.department,
                "assigned_doctor_ids": doctor_ids,
                "assigned_patient_id": null,
                "state": RecordState::Active,
                "created_at": now,
                "updated_at": now
            }),
        ).await?;

        let nurse = first_row(result)?;
        info!("Nurse profile created with ID: {}", nurse.id);
        Ok(nurse)
    }

    pub async fn get_nurse(&self, nurse_id: Uuid, auth_token: &str) -> Result<Nurse, NurseError> {
        let path = format!("/rest/v1/nurses?id=eq.{}", nurse_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;
        first_row(result)
    }

    pub async fn require_active(&self, nurse_id: Uuid, auth_token: &str) -> Result<Nurse, NurseError> {
        let nurse = self.get_nurse(nurse_id, auth_token).await?;
        if !nurse.state.is_active() {
            return Err(NurseError::NotActive(nurse.state));
        }
        Ok(nurse)
    }

    pub async fn list_nurses(&self, query: NurseListQuery, auth_token: &str) -> Result<Vec<Nurse>, NurseError> {
        let mut query_parts = vec!["order=full_name.asc".to_string()];
        if query.include_inactive.unwrap_or(false) {
            query_parts.push(format!("state=neq.{}", RecordState::Deleted));
        } else {
            query_parts.push(format!("state=eq.{}", RecordState::Active));
        }
        if let Some(department) = query.department.as_deref().filter(|d| !d.trim().is_empty()) {
            query_parts.push(format!("department=eq.{}", urlencoding::encode(department.trim())));
        }

        let path = format!("/rest/v1/nurses?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(NurseError::from))
            .collect()
    }

    pub async fn update_nurse(
        &self,
        nurse_id: Uuid,
        request: UpdateNurseRequest,
        auth_token: &str,
    ) -> Result<Nurse, NurseError> {
        let current = self.get_nurse(nurse_id, auth_token).await?;
        if current.state.is_terminal() {
            return Err(NurseError::NotActive(current.state));
        }

        let mut update_data = serde_json::Map::new();
        if let Some(name) = request.full_name {
            require_text("Full name", &name).map_err(NurseError::ValidationError)?;
            update_data.insert("full_name".to_string(), json!(name.trim()));
        }
        if let Some(phone) = request.contact_number {
            if !is_valid_phone(&phone) {
                return Err(NurseError::ValidationError(format!("Invalid contact number: {}", phone)));
            }
            update_data.insert("contact_number".to_string(), json!(phone));
        }
        if let Some(department) = request.department {
            update_data.insert("department".to_string(), json!(department));
        }

        if update_data.is_empty() {
            return Ok(current);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        self.patch(nurse_id, Value::Object(update_data), auth_token).await
    }

    pub async fn change_state(
        &self,
        nurse_id: Uuid,
        request: ChangeNurseStateRequest,
        auth_token: &str,
    ) -> Result<Nurse, NurseError> {
        let current = self.get_nurse(nurse_id, auth_token).await?;
        let next = current.state.transition_to(request.state)?;

        // A nurse leaving active duty drops any patient assignment.
        let mut update = json!({
            "state": next,
            "updated_at": Utc::now().to_rfc3339()
        });
        if !next.is_active() {
            update["assigned_patient_id"] = Value::Null;
        }

        let nurse = self.patch(nurse_id, update, auth_token).await?;
        info!("Nurse {} moved from {} to {}", nurse_id, current.state, next);
        Ok(nurse)
    }

    pub async fn assign_doctors(
        &self,
        nurse_id: Uuid,
        request: AssignDoctorsRequest,
        auth_token: &str,
    ) -> Result<Nurse, NurseError> {
        self.require_active(nurse_id, auth_token).await?;

        let mut doctor_ids = request.doctor_ids;
        doctor_ids.sort();
        doctor_ids.dedup();

        self.patch(
            nurse_id,
            json!({
                "assigned_doctor_ids": doctor_ids,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await
    }

    /// Record (or clear) the patient a nurse is attending.
    pub async fn set_assigned_patient(
        &self,
        nurse_id: Uuid,
        patient_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Nurse, NurseError> {
        debug!("Setting assigned patient of nurse {} to {:?}", nurse_id, patient_id);
        self.patch(
            nurse_id,
            json!({
                "assigned_patient_id": patient_id,
                "updated_at": Utc::now().to_rfc3339()
            }),
            auth_token,
        ).await
    }

    async fn patch(&self, nurse_id: Uuid, body: Value, auth_token: &str) -> Result<Nurse, NurseError> {
        let path = format!("/rest/v1/nurses?id=eq.{}", nurse_id);
        let result = self.supabase.request_returning(Method::PATCH, &path, Some(auth_token), body).await?;
        first_row(result)
    }
}

fn first_row(rows: Vec<Value>) -> Result<Nurse, NurseError> {
    let row = rows.into_iter().next().ok_or(NurseError::NotFound)?;
    Ok(serde_json::from_value(row)?)
}

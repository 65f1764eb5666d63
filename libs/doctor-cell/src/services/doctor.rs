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
    ChangeStateRequest, CreateDoctorRequest, Doctor, DoctorError, DoctorSearchFilters,
    UpdateDoctorRequest,
};

pub struct DoctorService {
    supabase: SupabaseClient,
}

impl DoctorService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Create a new doctor profile
    pub async fn create_doctor(
        &self,
        request: CreateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Creating new doctor profile for: {}", request.email);

        require_text("Full name", &request.full_name).map_err(DoctorError::ValidationError)?;
        require_text("Specialization", &request.specialization).map_err(DoctorError::ValidationError)?;
        if !is_valid_email(&request.email) {
            return Err(DoctorError::ValidationError(format!("Invalid email: {}", request.email)));
        }
        if let Some(ref phone) = request.contact_number {
            if !is_valid_phone(phone) {
                return Err(DoctorError::ValidationError(format!("Invalid contact number: {}", phone)));
            }
        }
        if request.experience_years.is_some_and(|years| years < 0) {
            return Err(DoctorError::ValidationError("Experience cannot be negative".to_string()));
        }

        let existing_check_path = format!(
            "/rest/v1/doctors?email=eq.{}",
            urlencoding::encode(&request.email)
        );
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_check_path,
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            return Err(DoctorError::EmailAlreadyExists(request.email));
        }

        let now = Utc::now().to_rfc3339();
        let doctor_data = json!({
            "id": request.id,
            "full_name": request.full_name.trim(),
            "email": request.email.trim().to_lowercase(),
            "specialization": request.specialization.trim(),
            "qualification": request.qualification,
            "experience_years": request.experience_years,
            "contact_number": request.contact_number,
            "license_number": request.license_number,
            "consultation_fee": request.consultation_fee,
            "bio": request.bio,
            "state": RecordState::Active,
            "created_at": now,
            "updated_at": now
        });

        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/doctors",
            Some(auth_token),
            doctor_data,
        ).await?;

        let doctor: Doctor = first_row(result)?;
        info!("Doctor profile created with ID: {}", doctor.id);

        Ok(doctor)
    }

    pub async fn get_doctor(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result: Vec<Value> = self.supabase.request(
            Method::GET,
            &path,
            Some(auth_token),
            None,
        ).await?;

        first_row(result)
    }

    /// Fetch a doctor and insist the record is active.
    pub async fn require_active(&self, doctor_id: Uuid, auth_token: &str) -> Result<Doctor, DoctorError> {
        let doctor = self.get_doctor(doctor_id, auth_token).await?;
        if !doctor.state.is_active() {
            return Err(DoctorError::NotActive(doctor.state));
        }
        Ok(doctor)
    }

    pub async fn search_doctors(
        &self,
        filters: DoctorSearchFilters,
        auth_token: &str,
    ) -> Result<Vec<Doctor>, DoctorError> {
        let mut query_parts = vec!["order=full_name.asc".to_string()];

        if !filters.include_inactive.unwrap_or(false) {
            query_parts.push(format!("state=eq.{}", RecordState::Active));
        } else {
            query_parts.push(format!("state=neq.{}", RecordState::Deleted));
        }
        if let Some(specialization) = filters.specialization.as_deref().filter(|s| !s.trim().is_empty()) {
            query_parts.push(format!("specialization=ilike.*{}*", urlencoding::encode(specialization.trim())));
        }
        if let Some(name) = filters.name.as_deref().filter(|s| !s.trim().is_empty()) {
            query_parts.push(format!("full_name=ilike.*{}*", urlencoding::encode(name.trim())));
        }
        query_parts.push(format!("limit={}", filters.limit.unwrap_or(50).clamp(1, 200)));
        if let Some(offset) = filters.offset {
            query_parts.push(format!("offset={}", offset.max(0)));
        }

        let path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(DoctorError::from))
            .collect()
    }

    pub async fn update_doctor(
        &self,
        doctor_id: Uuid,
        request: UpdateDoctorRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        debug!("Updating doctor profile: {}", doctor_id);

        let current = self.get_doctor(doctor_id, auth_token).await?;
        if current.state.is_terminal() {
            return Err(DoctorError::NotActive(current.state));
        }

        let mut update_data = serde_json::Map::new();

        if let Some(name) = request.full_name {
            require_text("Full name", &name).map_err(DoctorError::ValidationError)?;
            update_data.insert("full_name".to_string(), json!(name.trim()));
        }
        if let Some(specialization) = request.specialization {
            require_text("Specialization", &specialization).map_err(DoctorError::ValidationError)?;
            update_data.insert("specialization".to_string(), json!(specialization.trim()));
        }
        if let Some(qualification) = request.qualification {
            update_data.insert("qualification".to_string(), json!(qualification));
        }
        if let Some(years) = request.experience_years {
            if years < 0 {
                return Err(DoctorError::ValidationError("Experience cannot be negative".to_string()));
            }
            update_data.insert("experience_years".to_string(), json!(years));
        }
        if let Some(phone) = request.contact_number {
            if !is_valid_phone(&phone) {
                return Err(DoctorError::ValidationError(format!("Invalid contact number: {}", phone)));
            }
            update_data.insert("contact_number".to_string(), json!(phone));
        }
        if let Some(license) = request.license_number {
            update_data.insert("license_number".to_string(), json!(license));
        }
        if let Some(fee) = request.consultation_fee {
            update_data.insert("consultation_fee".to_string(), json!(fee));
        }
        if let Some(bio) = request.bio {
            update_data.insert("bio".to_string(), json!(bio));
        }

        if update_data.is_empty() {
            return Ok(current);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            Value::Object(update_data),
        ).await?;

        first_row(result)
    }

    /// Move a doctor through the Active / Deactivated / Deleted lifecycle.
    pub async fn change_state(
        &self,
        doctor_id: Uuid,
        request: ChangeStateRequest,
        auth_token: &str,
    ) -> Result<Doctor, DoctorError> {
        let current = self.get_doctor(doctor_id, auth_token).await?;
        let next = current.state.transition_to(request.state)?;

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            json!({
                "state": next,
                "updated_at": Utc::now().to_rfc3339()
            }),
        ).await?;

        info!("Doctor {} moved from {} to {}", doctor_id, current.state, next);
        first_row(result)
    }
}

fn first_row(rows: Vec<Value>) -> Result<Doctor, DoctorError> {
    let row = rows.into_iter().next().ok_or(DoctorError::NotFound)?;
    Ok(serde_json::from_value(row)?)
}

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
    is_valid_blood_group, ChangePatientStateRequest, CreatePatientRequest, Patient, PatientError,
    PatientSearchQuery, UpdatePatientRequest,
};

pub struct PatientService {
    supabase: SupabaseClient,
}

impl PatientService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Creating new patient profile for: {}", request.email);

        require_text("Full name", &request.full_name).map_err(PatientError::ValidationError)?;
        if !is_valid_email(&request.email) {
            return Err(PatientError::ValidationError(format!("Invalid email: {}", request.email)));
        }
        validate_details(
            request.date_of_birth,
            request.blood_group.as_deref(),
            request.contact_number.as_deref(),
            request.emergency_contact_number.as_deref(),
        )?;

        let existing_check_path = format!(
            "/rest/v1/patients?email=eq.{}",
            urlencoding::encode(&request.email)
        );
        let existing: Vec<Value> = self.supabase.request(
            Method::GET,
            &existing_check_path,
            Some(auth_token),
            None,
        ).await?;

        if !existing.is_empty() {
            return Err(PatientError::EmailAlreadyExists { email: request.email });
        }

        let now = Utc::now().to_rfc3339();
        let patient_data = json!({
            "id": request.id,
            "full_name": request.full_name.trim(),
            "email": request.email.trim().to_lowercase(),
            "date_of_birth": request.date_of_birth,
            "gender": request.gender,
            "blood_group": request.blood_group.map(|bg| bg.trim().to_uppercase()),
            "contact_number": request.contact_number,
            "address": request.address,
            "emergency_contact_name": request.emergency_contact_name,
            "emergency_contact_number": request.emergency_contact_number,
            "medical_history": request.medical_history,
            "allergies": request.allergies,
            "state": RecordState::Active,
            "created_at": now,
            "updated_at": now
        });

        let result = self.supabase.request_returning(
            Method::POST,
            "/rest/v1/patients",
            Some(auth_token),
            patient_data,
        ).await?;

        let patient = first_row(result)?;
        info!("Patient profile created with ID: {}", patient.id);

        Ok(patient)
    }

    pub async fn get_patient(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, PatientError> {
        debug!("Fetching patient: {}", patient_id);

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        first_row(result)
    }

    /// Patients must be active to book or be booked.
    pub async fn require_active(&self, patient_id: Uuid, auth_token: &str) -> Result<Patient, PatientError> {
        let patient = self.get_patient(patient_id, auth_token).await?;
        if !patient.state.is_active() {
            return Err(PatientError::NotActive(patient.state));
        }
        Ok(patient)
    }

    pub async fn update_patient(
        &self,
        patient_id: Uuid,
        request: UpdatePatientRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        debug!("Updating patient: {}", patient_id);

        let current = self.get_patient(patient_id, auth_token).await?;
        if current.state.is_terminal() {
            return Err(PatientError::NotActive(current.state));
        }

        validate_details(
            request.date_of_birth,
            request.blood_group.as_deref(),
            request.contact_number.as_deref(),
            request.emergency_contact_number.as_deref(),
        )?;

        let mut update_data = serde_json::Map::new();
        if let Some(name) = request.full_name {
            require_text("Full name", &name).map_err(PatientError::ValidationError)?;
            update_data.insert("full_name".to_string(), json!(name.trim()));
        }
        if let Some(dob) = request.date_of_birth {
            update_data.insert("date_of_birth".to_string(), json!(dob));
        }
        if let Some(gender) = request.gender {
            update_data.insert("gender".to_string(), json!(gender));
        }
        if let Some(blood_group) = request.blood_group {
            update_data.insert("blood_group".to_string(), json!(blood_group.trim().to_uppercase()));
        }
        if let Some(phone) = request.contact_number {
            update_data.insert("contact_number".to_string(), json!(phone));
        }
        if let Some(address) = request.address {
            update_data.insert("address".to_string(), json!(address));
        }
        if let Some(name) = request.emergency_contact_name {
            update_data.insert("emergency_contact_name".to_string(), json!(name));
        }
        if let Some(phone) = request.emergency_contact_number {
            update_data.insert("emergency_contact_number".to_string(), json!(phone));
        }
        if let Some(history) = request.medical_history {
            update_data.insert("medical_history".to_string(), json!(history));
        }
        if let Some(allergies) = request.allergies {
            update_data.insert("allergies".to_string(), json!(allergies));
        }

        if update_data.is_empty() {
            return Ok(current);
        }
        update_data.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            Value::Object(update_data),
        ).await?;

        first_row(result)
    }

    pub async fn change_state(
        &self,
        patient_id: Uuid,
        request: ChangePatientStateRequest,
        auth_token: &str,
    ) -> Result<Patient, PatientError> {
        let current = self.get_patient(patient_id, auth_token).await?;
        let next = current.state.transition_to(request.state)?;

        let path = format!("/rest/v1/patients?id=eq.{}", patient_id);
        let result = self.supabase.request_returning(
            Method::PATCH,
            &path,
            Some(auth_token),
            json!({
                "state": next,
                "updated_at": Utc::now().to_rfc3339()
            }),
        ).await?;

        info!("Patient {} moved from {} to {}", patient_id, current.state, next);
        first_row(result)
    }

    pub async fn search_patients(
        &self,
        query: PatientSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Patient>, PatientError> {
        let mut query_parts = vec!["order=full_name.asc".to_string()];

        if query.include_inactive.unwrap_or(false) {
            query_parts.push(format!("state=neq.{}", RecordState::Deleted));
        } else {
            query_parts.push(format!("state=eq.{}", RecordState::Active));
        }
        if let Some(name) = query.name.as_deref().filter(|s| !s.trim().is_empty()) {
            query_parts.push(format!("full_name=ilike.*{}*", urlencoding::encode(name.trim())));
        }
        if let Some(phone) = query.contact_number.as_deref().filter(|s| !s.trim().is_empty()) {
            query_parts.push(format!("contact_number=ilike.*{}*", urlencoding::encode(phone.trim())));
        }
        query_parts.push(format!("limit={}", query.limit.unwrap_or(50).clamp(1, 200)));
        if let Some(offset) = query.offset {
            query_parts.push(format!("offset={}", offset.max(0)));
        }

        let path = format!("/rest/v1/patients?{}", query_parts.join("&"));
        let result: Vec<Value> = self.supabase.request(Method::GET, &path, Some(auth_token), None).await?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(PatientError::from))
            .collect()
    }
}

fn validate_details(
    date_of_birth: Option<chrono::NaiveDate>,
    blood_group: Option<&str>,
    contact_number: Option<&str>,
    emergency_contact_number: Option<&str>,
) -> Result<(), PatientError> {
    if date_of_birth.is_some_and(|dob| dob > Utc::now().date_naive()) {
        return Err(PatientError::InvalidDateOfBirth);
    }
    if let Some(bg) = blood_group {
        if !is_valid_blood_group(bg) {
            return Err(PatientError::ValidationError(format!("Unknown blood group: {}", bg)));
        }
    }
    for phone in [contact_number, emergency_contact_number].into_iter().flatten() {
        if !is_valid_phone(phone) {
            return Err(PatientError::ValidationError(format!("Invalid phone number: {}", phone)));
        }
    }
    Ok(())
}

fn first_row(rows: Vec<Value>) -> Result<Patient, PatientError> {
    let row = rows.into_iter().next().ok_or(PatientError::NotFound)?;
    Ok(serde_json::from_value(row)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn future_birth_dates_are_rejected() {
        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        assert!(matches!(
            validate_details(Some(tomorrow), None, None, None),
            Err(PatientError::InvalidDateOfBirth)
        ));
    }

    #[test]
    fn blood_group_and_phone_are_checked() {
        assert!(validate_details(None, Some("ab+"), Some("+1 555 0101"), None).is_ok());
        assert!(validate_details(None, Some("C+"), None, None).is_err());
        assert!(validate_details(None, None, None, Some("nope")).is_err());
    }
}

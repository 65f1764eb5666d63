use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{RequestContext, Role, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            ..AppConfig::default()
        }
    }
    
    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: "test@example.com".to_string(),
            role: "patient".to_string(),
        }
    }
}

impl TestUser {
    pub fn new(email: &str, role: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            role: role.to_string(),
        }
    }

    pub fn doctor(email: &str) -> Self {
        Self::new(email, "doctor")
    }

    pub fn patient(email: &str) -> Self {
        Self::new(email, "patient")
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, "admin")
    }

    pub fn nurse(email: &str) -> Self {
        Self::new(email, "nurse")
    }

    pub fn triage(email: &str) -> Self {
        Self::new(email, "triage")
    }

    pub fn uuid(&self) -> Uuid {
        Uuid::parse_str(&self.id).unwrap_or_default()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Request context as the auth middleware would build it.
    pub fn context(&self, token: &str) -> RequestContext {
        let role = self.role.parse::<Role>().unwrap_or(Role::Patient);
        RequestContext {
            user: self.to_user(),
            role,
            access_token: token.to_string(),
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));
        
        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });
        
        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": "authenticated",
            "app_metadata": { "role": user.role },
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });
        
        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());
        
        let signing_input = format!("{}.{}", header_encoded, payload_encoded);
        
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);
        
        format!("{}.{}", signing_input, signature_encoded)
    }
    
    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }
    
    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
    
    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}

/// Canned PostgREST rows for the hospital tables.
pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn doctor_response(doctor_id: &str) -> serde_json::Value {
        json!({
            "id": doctor_id,
            "full_name": "Gregory House",
            "email": "house@hospital.com",
            "specialization": "Diagnostics",
            "qualification": "MD",
            "experience_years": 20,
            "contact_number": "+1 555 0100",
            "license_number": "MD-0001",
            "consultation_fee": 150.0,
            "bio": null,
            "state": "active",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn patient_response(patient_id: &str) -> serde_json::Value {
        json!({
            "id": patient_id,
            "full_name": "Jane Roe",
            "email": "jane@example.com",
            "date_of_birth": "1990-04-12",
            "gender": "female",
            "blood_group": "O+",
            "contact_number": "+1 555 0101",
            "address": "221B Baker Street",
            "emergency_contact_name": null,
            "emergency_contact_number": null,
            "medical_history": null,
            "allergies": "penicillin",
            "state": "active",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn nurse_response(nurse_id: &str) -> serde_json::Value {
        json!({
            "id": nurse_id,
            "full_name": "Carla Espinosa",
            "email": "carla@hospital.com",
            "contact_number": "+1 555 0102",
            "department": "General Medicine",
            "assigned_doctor_ids": [],
            "assigned_patient_id": null,
            "state": "active",
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn availability_window_response(doctor_id: &str, date: &str, start: &str, end: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "doctor_id": doctor_id,
            "available_date": date,
            "start_time": start,
            "end_time": end,
            "is_available": true,
            "created_at": "2025-01-01T00:00:00Z"
        })
    }

    pub fn appointment_response(
        patient_id: &str,
        doctor_id: &str,
        date: &str,
        start: &str,
        end: Option<&str>,
        status: &str,
    ) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "patient_id": patient_id,
            "doctor_id": doctor_id,
            "nurse_id": null,
            "appointment_date": date,
            "start_time": start,
            "end_time": end,
            "duration_minutes": null,
            "status": status,
            "priority": "standard",
            "reason": "Check-up",
            "notes": null,
            "triage_assessment_id": null,
            "created_at": "2025-01-01T00:00:00Z",
            "updated_at": "2025-01-01T00:00:00Z"
        })
    }
    
    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

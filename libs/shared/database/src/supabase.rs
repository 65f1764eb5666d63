use reqwest::{
    Client, 
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
    StatusCode,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Error, Debug)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Unique or exclusion constraint violation reported by PostgREST.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    Header(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SupabaseError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SupabaseError::Conflict(_))
    }

    fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SupabaseError::Auth(body),
            404 => SupabaseError::NotFound(body),
            409 => SupabaseError::Conflict(body),
            code => SupabaseError::Api { status: code, message: body },
        }
    }
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }
    
    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();
        
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key).map_err(|e| SupabaseError::Header(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        
        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SupabaseError::Header(e.to_string()))?,
            );
        }
        
        Ok(headers)
    }
    
    pub async fn request<T>(&self, method: Method, path: &str, 
                            auth_token: Option<&str>, body: Option<Value>) 
                            -> Result<T, SupabaseError> 
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Option<Value>,
        extra_headers: Option<HeaderMap>,
    ) -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);
        
        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }
        
        let mut req = self.client.request(method, &url)
            .headers(headers);
            
        if let Some(body_data) = body {
            req = req.json(&body_data);
        }
        
        let response = req.send().await?;
        
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!("API error ({}): {}", status, text);
            return Err(SupabaseError::from_status(status, text));
        }

        // `Prefer: return=minimal` and DELETE responses come back empty.
        let payload = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str::<T>(payload)?)
    }

    /// POST/PATCH helper returning the affected rows.
    pub async fn request_returning(
        &self,
        method: Method,
        path: &str,
        auth_token: Option<&str>,
        body: Value,
    ) -> Result<Vec<Value>, SupabaseError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(method, path, auth_token, Some(body), Some(headers)).await
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

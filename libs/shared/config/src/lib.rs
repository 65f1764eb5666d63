use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_SLOT_MINUTES: i64 = 30;
pub const DEFAULT_AVAILABILITY_DAYS_AHEAD: i64 = 7;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Key used by background jobs that act without a user session.
    pub supabase_service_role_key: String,
    pub redis_url: Option<String>,
    pub mail_api_url: String,
    pub mail_api_token: String,
    pub mail_default_sender: String,
    pub appointment_slot_minutes: i64,
    pub availability_days_ahead: i64,
    pub notification_workers: u32,
    pub notification_max_attempts: u32,
    pub notification_retry_delay_seconds: u64,
    pub reminder_hour: u32,
    pub report_hour: u32,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_jwt_secret: String::new(),
            supabase_service_role_key: String::new(),
            redis_url: None,
            mail_api_url: String::new(),
            mail_api_token: String::new(),
            mail_default_sender: "Hospital MS <noreply@hospital.com>".to_string(),
            appointment_slot_minutes: DEFAULT_SLOT_MINUTES,
            availability_days_ahead: DEFAULT_AVAILABILITY_DAYS_AHEAD,
            notification_workers: 2,
            notification_max_attempts: 3,
            notification_retry_delay_seconds: 30,
            reminder_hour: 9,
            report_hour: 10,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            supabase_service_role_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            mail_api_url: env::var("MAIL_API_URL")
                .unwrap_or_else(|_| {
                    warn!("MAIL_API_URL not set, emails will only be logged");
                    String::new()
                }),
            mail_api_token: env::var("MAIL_API_TOKEN").unwrap_or_default(),
            mail_default_sender: env::var("MAIL_DEFAULT_SENDER")
                .unwrap_or(defaults.mail_default_sender),
            appointment_slot_minutes: parse_or("APPOINTMENT_SLOT_MINUTES", defaults.appointment_slot_minutes),
            availability_days_ahead: parse_or("AVAILABILITY_DAYS_AHEAD", defaults.availability_days_ahead),
            notification_workers: parse_or("NOTIFICATION_WORKERS", defaults.notification_workers),
            notification_max_attempts: parse_or("NOTIFICATION_MAX_ATTEMPTS", defaults.notification_max_attempts),
            notification_retry_delay_seconds: parse_or(
                "NOTIFICATION_RETRY_DELAY_SECONDS",
                defaults.notification_retry_delay_seconds,
            ),
            reminder_hour: parse_or("REMINDER_HOUR", defaults.reminder_hour),
            report_hour: parse_or("REPORT_HOUR", defaults.report_hour),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
        };
        
        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }
        
        config
    }
    
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() 
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Token for scheduled work: the service role key when set, else the anon key.
    pub fn system_token(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }

    pub fn is_mail_configured(&self) -> bool {
        !self.mail_api_url.is_empty() && !self.mail_api_token.is_empty()
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_hospital_schedule() {
        let config = AppConfig::default();
        assert_eq!(config.appointment_slot_minutes, 30);
        assert_eq!(config.availability_days_ahead, 7);
        assert_eq!(config.reminder_hour, 9);
        assert!(!config.is_configured());
        assert!(!config.is_mail_configured());
    }

    #[test]
    fn parse_or_falls_back_on_garbage() {
        env::set_var("HOSPITAL_TEST_PARSE_OR", "not-a-number");
        assert_eq!(parse_or("HOSPITAL_TEST_PARSE_OR", 42u32), 42);
        env::set_var("HOSPITAL_TEST_PARSE_OR", " 15 ");
        assert_eq!(parse_or("HOSPITAL_TEST_PARSE_OR", 42u32), 15);
        env::remove_var("HOSPITAL_TEST_PARSE_OR");
    }

    #[test]
    fn system_token_prefers_service_role_key() {
        let mut config = AppConfig {
            supabase_anon_key: "anon".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.system_token(), "anon");

        config.supabase_service_role_key = "service".to_string();
        assert_eq!(config.system_token(), "service");
    }
}

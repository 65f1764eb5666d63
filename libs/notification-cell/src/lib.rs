pub mod models;
pub mod services;
pub mod error;
pub mod handlers;
pub mod router;
pub mod templates;

pub use models::*;
pub use error::*;
pub use services::*;
pub use router::notification_routes;

pub mod auth;
pub mod error;
pub mod lifecycle;

pub use auth::{RequestContext, Role, User};
pub use error::AppError;
pub use lifecycle::{LifecycleError, RecordState};

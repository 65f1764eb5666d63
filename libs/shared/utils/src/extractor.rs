use std::sync::Arc;

use axum::{
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
    body::Body,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};

use shared_models::auth::{RequestContext, User};
use shared_models::error::AppError;
use shared_config::AppConfig;

use crate::jwt::validate_token;

/// Validates the bearer token and attaches a `RequestContext` (and the raw
/// `User`) to the request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    auth: Option<TypedHeader<Authorization<Bearer>>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = auth
        .ok_or_else(|| AppError::Auth("Missing or malformed authorization header".to_string()))?;
    let token = auth.token();
    
    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;
    let context = RequestContext::new(user.clone(), token)?;
    
    request.extensions_mut().insert(user);
    request.extensions_mut().insert(context);
    
    Ok(next.run(request).await)
}

pub fn extract_context<B>(request: &Request<B>) -> Result<RequestContext, AppError> {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .ok_or_else(|| AppError::Auth("Request context not found in request extensions".to_string()))
}

pub fn extract_user<B>(request: &Request<B>) -> Result<User, AppError> {
    request
        .extensions()
        .get::<User>()
        .cloned()
        .ok_or_else(|| AppError::Auth("User not found in request extensions".to_string()))
}

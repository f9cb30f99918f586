/// Guest login endpoints
use super::HttpServerState;
use crate::error::GateError;
use crate::phone::PhoneNumber;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap},
    response::Json,
};
use crypto_core::jwt::TokenPair;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct RequestOtpRequest {
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOtpResponse {
    pub ok: bool,
    pub request_id: String,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    #[validate(length(min = 1, max = 20))]
    pub phone: String,
    #[validate(length(min = 1, max = 255))]
    pub request_id: String,
    #[validate(length(min = 4, max = 10))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(alias = "refresh")]
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Token pair as handed to the browser
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub ok: bool,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl From<TokenPair> for SessionResponse {
    fn from(pair: TokenPair) -> Self {
        Self {
            ok: true,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: pair.token_type,
            expires_in: pair.expires_in,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub ok: bool,
    pub phone: PhoneNumber,
}

/// POST /api/auth/request-otp
///
/// Unreadable bodies get the same denial as an ineligible phone.
pub async fn request_otp(
    State(state): State<Arc<HttpServerState>>,
    payload: Result<Json<RequestOtpRequest>, JsonRejection>,
) -> Result<Json<RequestOtpResponse>, GateError> {
    let Ok(Json(req)) = payload else {
        return Err(GateError::Denied);
    };
    if req.validate().is_err() {
        return Err(GateError::Denied);
    }

    let requested = state.otp.request_otp(&req.phone).await?;

    Ok(Json(RequestOtpResponse {
        ok: true,
        request_id: requested.request_id,
        expires_in: requested.expires_in,
    }))
}

/// POST /api/auth/verify-otp
pub async fn verify_otp(
    State(state): State<Arc<HttpServerState>>,
    payload: Result<Json<VerifyOtpRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, GateError> {
    let invalid = GateError::InvalidCode {
        attempts_remaining: None,
    };
    let Ok(Json(req)) = payload else {
        return Err(invalid);
    };
    if req.validate().is_err() {
        return Err(invalid);
    }

    let verified = state
        .otp
        .verify_otp(&req.phone, req.request_id.trim(), req.code.trim())
        .await?;

    Ok(Json(verified.tokens.into()))
}

/// POST /api/auth/token/refresh
pub async fn refresh_token(
    State(state): State<Arc<HttpServerState>>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> Result<Json<SessionResponse>, GateError> {
    let Ok(Json(req)) = payload else {
        return Err(GateError::InvalidCredential);
    };
    if req.validate().is_err() {
        return Err(GateError::InvalidCredential);
    }

    let pair = state.sessions.refresh(req.refresh_token.trim())?;
    Ok(Json(pair.into()))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<HttpServerState>>,
    headers: HeaderMap,
) -> Result<Json<MeResponse>, GateError> {
    let token = bearer_token(&headers).ok_or(GateError::InvalidCredential)?;
    let phone = state.sessions.authenticate(token)?;
    Ok(Json(MeResponse { ok: true, phone }))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

//! HTTP Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nest_core::{invite, Couple, Reward, Theme, User};
use nest_payments::{Activator, Charge, ChargeRequest, Plan};
use nest_store::CoupleChanges;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub gateway_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn store_error(e: nest_store::StoreError) -> ApiError {
    tracing::error!("Store error: {}", e);
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        e.user_message(),
        "STORE_ERROR",
    )
}

fn couple_not_found() -> ApiError {
    api_error(StatusCode::NOT_FOUND, "Couple not found", "COUPLE_NOT_FOUND")
}

/// Couple row plus the streak numbers every screen needs.
#[derive(Debug, Serialize)]
pub struct CoupleView {
    #[serde(flatten)]
    pub couple: Couple,
    pub elapsed_days: i64,
    pub remaining_days: Option<i64>,
}

impl CoupleView {
    fn now(couple: Couple) -> Self {
        let now = Utc::now();
        let elapsed_days = couple.elapsed_days(now);
        let remaining_days = couple.remaining_days(now);
        Self {
            couple,
            elapsed_days,
            remaining_days,
        }
    }
}

/// Reward row plus its derived achievement flag.
#[derive(Serialize)]
pub struct RewardView {
    #[serde(flatten)]
    pub reward: Reward,
    pub achieved: bool,
}

fn reward_views(rewards: Vec<Reward>, elapsed_days: i64) -> Vec<RewardView> {
    rewards
        .into_iter()
        .map(|reward| RewardView {
            achieved: reward.achieved(elapsed_days),
            reward,
        })
        .collect()
}

/// Bare email login identifier: trimmed, lowercased, minimally shaped.
fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    if email.contains('@') && email.len() > 2 {
        Ok(email)
    } else {
        Err(api_error(
            StatusCode::BAD_REQUEST,
            "A valid email is required",
            "INVALID_EMAIL",
        ))
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store_kind,
        gateway_configured: state.gateway.is_some(),
    })
}

// ============================================================================
// Login & Join
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub user: Option<User>,
    pub couple: Option<CoupleView>,
    pub rewards: Vec<RewardView>,
}

/// Look the caller up by email. A lookup only: an unknown email gets an
/// empty answer, never a fresh row.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let email = normalize_email(&payload.email)?;

    let user = state
        .store
        .find_user_by_email(&email)
        .await
        .map_err(store_error)?;

    let Some(user) = user else {
        return Ok(Json(LoginResponse {
            user: None,
            couple: None,
            rewards: Vec::new(),
        }));
    };

    let couple = match user.couple_id {
        Some(couple_id) => state.store.get_couple(couple_id).await.map_err(store_error)?,
        None => None,
    };

    let rewards = match &couple {
        Some(couple) => {
            let rewards = state
                .store
                .rewards_for_couple(couple.id)
                .await
                .map_err(store_error)?;
            reward_views(rewards, couple.elapsed_days(Utc::now()))
        }
        None => Vec::new(),
    };

    Ok(Json(LoginResponse {
        user: Some(user),
        couple: couple.map(CoupleView::now),
        rewards,
    }))
}

#[derive(Debug, Deserialize)]
pub struct JoinRequest {
    pub email: String,
    pub invite_code: String,
}

#[derive(Debug, Serialize)]
pub struct JoinResponse {
    pub user: User,
    pub couple: CoupleView,
}

/// Join an existing couple by invite code. The code is resolved before
/// any identity is created, so a bad code leaves no trace.
pub async fn join(
    State(state): State<AppState>,
    Json(payload): Json<JoinRequest>,
) -> Result<Json<JoinResponse>, ApiError> {
    let email = normalize_email(&payload.email)?;
    let code = invite::normalize(&payload.invite_code);

    let couple = state
        .store
        .find_couple_by_invite_code(&code)
        .await
        .map_err(store_error)?
        .ok_or_else(|| {
            api_error(
                StatusCode::NOT_FOUND,
                "Invite code not found",
                "UNKNOWN_INVITE",
            )
        })?;

    let mut user = state.store.ensure_user(&email).await.map_err(store_error)?;
    state
        .store
        .link_user_to_couple(user.id, couple.id)
        .await
        .map_err(store_error)?;
    user.couple_id = Some(couple.id);

    tracing::info!(email = %user.email, couple_id = %couple.id, "Partner joined");

    Ok(Json(JoinResponse {
        user,
        couple: CoupleView::now(couple),
    }))
}

// ============================================================================
// Couples
// ============================================================================

/// Fetch a couple
pub async fn get_couple(
    State(state): State<AppState>,
    Path(couple_id): Path<Uuid>,
) -> Result<Json<CoupleView>, ApiError> {
    let couple = state
        .store
        .get_couple(couple_id)
        .await
        .map_err(store_error)?
        .ok_or_else(couple_not_found)?;
    Ok(Json(CoupleView::now(couple)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateCoupleRequest {
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default)]
    pub pix_key: Option<String>,
    #[serde(default)]
    pub couple_photo: Option<String>,
    #[serde(default)]
    pub partner_names: Option<Vec<String>>,
}

/// Partial update of a couple's presentation fields.
pub async fn update_couple(
    State(state): State<AppState>,
    Path(couple_id): Path<Uuid>,
    Json(payload): Json<UpdateCoupleRequest>,
) -> Result<Json<CoupleView>, ApiError> {
    let changes = CoupleChanges {
        theme: payload.theme.as_deref().map(Theme::from_str),
        pix_key: payload.pix_key,
        couple_photo: payload.couple_photo,
        partner_names: payload.partner_names,
        ..CoupleChanges::default()
    };

    if changes.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Nothing to update",
            "EMPTY_UPDATE",
        ));
    }

    let couple = state
        .store
        .update_couple(couple_id, &changes)
        .await
        .map_err(store_error)?
        .ok_or_else(couple_not_found)?;
    Ok(Json(CoupleView::now(couple)))
}

/// Fold the current streak into the hall of fame and restart the clock.
/// The elapsed days are computed here, never trusted from the client.
pub async fn reset_streak(
    State(state): State<AppState>,
    Path(couple_id): Path<Uuid>,
) -> Result<Json<CoupleView>, ApiError> {
    let couple = state
        .store
        .reset_streak(couple_id, Utc::now())
        .await
        .map_err(store_error)?
        .ok_or_else(couple_not_found)?;

    tracing::info!(couple_id = %couple.id, high_scores = ?couple.high_scores, "Streak reset");
    Ok(Json(CoupleView::now(couple)))
}

// ============================================================================
// Rewards
// ============================================================================

/// List a couple's rewards with their achievement flags.
pub async fn list_rewards(
    State(state): State<AppState>,
    Path(couple_id): Path<Uuid>,
) -> Result<Json<Vec<RewardView>>, ApiError> {
    let couple = state
        .store
        .get_couple(couple_id)
        .await
        .map_err(store_error)?
        .ok_or_else(couple_not_found)?;

    let rewards = state
        .store
        .rewards_for_couple(couple_id)
        .await
        .map_err(store_error)?;

    Ok(Json(reward_views(rewards, couple.elapsed_days(Utc::now()))))
}

#[derive(Debug, Deserialize)]
pub struct AddRewardRequest {
    pub days_required: i64,
    pub description: String,
}

/// Add a milestone reward
pub async fn add_reward(
    State(state): State<AppState>,
    Path(couple_id): Path<Uuid>,
    Json(payload): Json<AddRewardRequest>,
) -> Result<(StatusCode, Json<Reward>), ApiError> {
    if payload.days_required < 1 || payload.description.trim().is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "A reward needs a description and a positive day threshold",
            "INVALID_REWARD",
        ));
    }

    state
        .store
        .get_couple(couple_id)
        .await
        .map_err(store_error)?
        .ok_or_else(couple_not_found)?;

    let reward = Reward::new(couple_id, payload.days_required, payload.description.trim());
    let reward = state.store.add_reward(&reward).await.map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(reward)))
}

/// Delete a reward. Unknown ids delete nothing and still succeed.
pub async fn delete_reward(
    State(state): State<AppState>,
    Path(reward_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .delete_reward(reward_id)
        .await
        .map_err(store_error)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Payments
// ============================================================================

fn require_gateway(state: &AppState) -> Result<&std::sync::Arc<dyn nest_payments::PixGateway>, ApiError> {
    state.gateway.as_ref().ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub plan: String,
}

/// Create a Pix charge for a plan. Gateway failures come back with the
/// gateway's own message so the user sees why.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<Charge>, ApiError> {
    let gateway = require_gateway(&state)?;
    let email = normalize_email(&payload.email)?;
    let plan = Plan::from_str(&payload.plan);

    let request = ChargeRequest::for_plan(email, plan);
    let charge = gateway.create_charge(&request).await.map_err(|e| {
        tracing::error!("Charge creation failed: {}", e);
        api_error(StatusCode::BAD_REQUEST, e.user_message(), "CHARGE_ERROR")
    })?;

    tracing::info!(charge_id = %charge.id, plan = plan.as_str(), "Charge created");
    Ok(Json(charge))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub payment_id: String,
}

#[derive(Serialize)]
pub struct PaymentStatusResponse {
    pub status: String,
}

/// Settlement state of a charge. A failed check answers `pending`: the
/// client polls again and a blip never looks like a rejection.
pub async fn payment_status(
    State(state): State<AppState>,
    Json(payload): Json<PaymentStatusRequest>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let gateway = require_gateway(&state)?;

    let status = match gateway.charge_status(&payload.payment_id).await {
        Ok(status) => status.as_str().to_string(),
        Err(e) => {
            tracing::debug!(payment_id = %payload.payment_id, error = %e, "Status check failed");
            "pending".to_string()
        }
    };

    Ok(Json(PaymentStatusResponse { status }))
}

#[derive(Debug, Deserialize)]
pub struct ActivateRequest {
    pub email: String,
    pub plan: String,
    pub payment_id: String,
    #[serde(default)]
    pub referrer_code: Option<String>,
}

#[derive(Serialize)]
pub struct ActivateResponse {
    pub user: User,
    pub couple: CoupleView,
    pub created: bool,
}

/// Commit an activation for an approved charge. The settlement state is
/// re-checked here; the client claiming approval is not enough.
pub async fn activate(
    State(state): State<AppState>,
    Json(payload): Json<ActivateRequest>,
) -> Result<Json<ActivateResponse>, ApiError> {
    let gateway = require_gateway(&state)?;
    let email = normalize_email(&payload.email)?;
    let plan = Plan::from_str(&payload.plan);

    let approved = gateway
        .charge_status(&payload.payment_id)
        .await
        .map(|status| status.is_approved())
        .unwrap_or(false);
    if !approved {
        return Err(api_error(
            StatusCode::PAYMENT_REQUIRED,
            "Payment not confirmed yet",
            "PAYMENT_PENDING",
        ));
    }

    let activator = Activator::new(state.store.clone());
    let activation = activator
        .activate(&email, plan, payload.referrer_code.as_deref(), Utc::now())
        .await
        .map_err(|e| {
            tracing::error!("Activation failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
                "ACTIVATION_ERROR",
            )
        })?;

    Ok(Json(ActivateResponse {
        user: activation.user,
        couple: CoupleView::now(activation.couple),
        created: activation.created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use nest_store::{MemoryStore, NestStore};
    use std::sync::Arc;

    fn state_with(store: Arc<MemoryStore>) -> AppState {
        AppState {
            store,
            store_kind: "memory",
            gateway: None,
        }
    }

    #[tokio::test]
    async fn test_join_with_unknown_code_leaves_identity_untouched() {
        let store = Arc::new(MemoryStore::new());

        let (status, Json(body)) = join(
            State(state_with(store.clone())),
            Json(JoinRequest {
                email: "b@x.com".into(),
                invite_code: "ZZZZZZ".into(),
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "UNKNOWN_INVITE");
        // The bad code was rejected before any identity row was written.
        assert!(store.find_user_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_join_links_identity_to_couple() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let couple = Couple::new("AB12CD", now, false, Some(now + Duration::days(30)));
        let couple_id = couple.id;
        store.insert_couple(couple);

        let Json(response) = join(
            State(state_with(store.clone())),
            Json(JoinRequest {
                email: " B@x.com ".into(),
                invite_code: " ab12cd ".into(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.user.couple_id, Some(couple_id));
        assert_eq!(response.couple.couple.id, couple_id);
        let user = store.find_user_by_email("b@x.com").await.unwrap().unwrap();
        assert_eq!(user.couple_id, Some(couple_id));
    }
}

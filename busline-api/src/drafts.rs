use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use busline_booking::{DraftController, DraftState, DraftStep, Purchase, SearchRequest};
use busline_catalog::FareBreakdown;
use busline_core::payment::PaymentMethod;
use busline_core::Trip;
use crate::auth::acting_user;
use crate::error::AppError;
use crate::state::{AppState, DraftSession};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct DraftView {
    pub draft_id: Uuid,
    pub step: DraftStep,
    pub state: DraftState,
    pub fare: Option<FareBreakdown>,
}

impl DraftView {
    fn of(draft_id: Uuid, controller: &DraftController) -> Self {
        Self {
            draft_id,
            step: controller.step(),
            state: controller.state().clone(),
            fare: controller.fare_quote(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub trips: Vec<Trip>,
    pub draft: DraftView,
}

#[derive(Debug, Deserialize)]
pub struct SelectTripRequest {
    pub trip_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
pub struct ConfirmResponse {
    pub total_fare: i64,
    #[serde(flatten)]
    pub purchase: Purchase,
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/drafts", post(open_draft))
        .route("/v1/drafts/{id}", get(get_draft).delete(discard_draft))
        .route("/v1/drafts/{id}/search", post(search))
        .route("/v1/drafts/{id}/outbound", post(select_outbound))
        .route("/v1/drafts/{id}/return", post(select_return))
        .route("/v1/drafts/{id}/back", post(back))
        .route("/v1/drafts/{id}/confirm", post(confirm))
}

/// Look up a draft the caller owns. Other users' drafts read as missing.
async fn session(state: &AppState, draft_id: Uuid, user: &str) -> Result<Arc<DraftSession>, AppError> {
    state
        .draft(draft_id)
        .await
        .filter(|s| s.owner == user)
        .ok_or_else(|| AppError::NotFoundError(format!("Draft {} not found", draft_id)))
}

async fn open_draft(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
) -> Result<(StatusCode, Json<DraftView>), AppError> {
    let user = acting_user(&state, &bearer).await?;
    let (draft_id, draft) = state.open_draft(user.clone()).await;
    let view = DraftView::of(draft_id, &*draft.controller.lock().await);
    info!("Draft {} opened for {}", draft_id, user);

    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_draft(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<DraftView>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let controller = draft.controller.lock().await;
    Ok(Json(DraftView::of(draft_id, &controller)))
}

async fn discard_draft(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = acting_user(&state, &bearer).await?;
    session(&state, draft_id, &user).await?;
    state.drafts.write().await.remove(&draft_id);
    Ok(StatusCode::NO_CONTENT)
}

async fn search(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let mut controller = draft.controller.lock().await;

    let trips = controller.search(req).await?;
    Ok(Json(SearchResponse {
        trips,
        draft: DraftView::of(draft_id, &controller),
    }))
}

async fn select_outbound(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
    Json(req): Json<SelectTripRequest>,
) -> Result<Json<DraftView>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let mut controller = draft.controller.lock().await;

    controller.select_outbound(req.trip_id).await?;
    Ok(Json(DraftView::of(draft_id, &controller)))
}

async fn select_return(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
    Json(req): Json<SelectTripRequest>,
) -> Result<Json<DraftView>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let mut controller = draft.controller.lock().await;

    controller.select_return(req.trip_id)?;
    Ok(Json(DraftView::of(draft_id, &controller)))
}

async fn back(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
) -> Result<Json<DraftView>, AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let mut controller = draft.controller.lock().await;

    controller.back();
    Ok(Json(DraftView::of(draft_id, &controller)))
}

async fn confirm(
    State(state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Path(draft_id): Path<Uuid>,
    Json(req): Json<ConfirmRequest>,
) -> Result<(StatusCode, Json<ConfirmResponse>), AppError> {
    let user = acting_user(&state, &bearer).await?;
    let draft = session(&state, draft_id, &user).await?;
    let mut controller = draft.controller.lock().await;

    let purchase = controller.confirm(&user, req.payment_method).await?;
    Ok((
        StatusCode::CREATED,
        Json(ConfirmResponse {
            total_fare: purchase.total_fare(),
            purchase,
        }),
    ))
}

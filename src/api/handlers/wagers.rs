//! 1-on-1 wager handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CancelRequest, ProposeWagerRequest, RespondRequest, VoteRequest, WagerDetailResponse,
};
use crate::app_state::AppState;
use crate::domain::{GuildId, WagerId};
use crate::error::LedgerError;
use crate::persistence::Store;

/// `POST /wagers`: Propose a wager to another user.
///
/// # Errors
///
/// Returns a validation error or [`LedgerError::InsufficientFunds`] for the
/// proposer.
pub async fn propose_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<ProposeWagerRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let wager = uow.wagers().propose(req.into()).await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(wager)))
}

/// `GET /wagers/{id}`: Wager with its votes.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for an unknown wager.
pub async fn get_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, wager_id)): Path<(GuildId, WagerId)>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let wager = uow.wagers().get(wager_id).await?;
    let votes = uow.wagers().votes(wager_id).await?;
    uow.commit().await?;
    Ok(Json(WagerDetailResponse { wager, votes }))
}

/// `POST /wagers/{id}/respond`: Target accepts or declines.
///
/// # Errors
///
/// Returns [`LedgerError::NotTarget`], [`LedgerError::WrongState`] or
/// [`LedgerError::InsufficientFunds`].
pub async fn respond_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, wager_id)): Path<(GuildId, WagerId)>,
    Json(req): Json<RespondRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let wager = uow
        .wagers()
        .respond(wager_id, req.discord_id, req.accept)
        .await?;
    uow.commit().await?;
    Ok(Json(wager))
}

/// `POST /wagers/{id}/votes`: Record a participant's vote.
///
/// # Errors
///
/// Returns [`LedgerError::NotParticipant`], [`LedgerError::WrongState`] or
/// [`LedgerError::InvalidVoteTarget`].
pub async fn cast_vote<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, wager_id)): Path<(GuildId, WagerId)>,
    Json(req): Json<VoteRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let outcome = uow
        .wagers()
        .cast_vote(wager_id, req.voter, req.vote_for)
        .await?;
    uow.commit().await?;
    Ok(Json(outcome))
}

/// `POST /wagers/{id}/cancel`: Proposer withdraws an unanswered wager.
///
/// # Errors
///
/// Returns [`LedgerError::NotProposer`] or [`LedgerError::WrongState`].
pub async fn cancel_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, wager_id)): Path<(GuildId, WagerId)>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let wager = uow.wagers().cancel(wager_id, req.discord_id).await?;
    uow.commit().await?;
    Ok(Json(wager))
}

/// Guild-scoped 1-on-1 wager routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/wagers", post(propose_wager::<S>))
        .route("/wagers/{id}", get(get_wager::<S>))
        .route("/wagers/{id}/respond", post(respond_wager::<S>))
        .route("/wagers/{id}/votes", post(cast_vote::<S>))
        .route("/wagers/{id}/cancel", post(cancel_wager::<S>))
}

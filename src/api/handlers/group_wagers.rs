//! Group wager handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{
    CancelRequest, CreateGroupWagerRequest, GroupBetRequest, GroupWagerResponse, ResolveRequest,
};
use crate::app_state::AppState;
use crate::domain::{GroupWagerId, GuildId};
use crate::error::LedgerError;
use crate::persistence::Store;

/// `POST /group-wagers`: Open a group wager.
///
/// # Errors
///
/// Returns a validation error for bad options, odds, limits or window.
pub async fn create_group_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<CreateGroupWagerRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let detail = uow.group_wagers().create(req.into()).await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(GroupWagerResponse::from(detail))))
}

/// `GET /group-wagers/{id}`: Wager, options with multipliers, positions.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for an unknown wager.
pub async fn get_group_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, id)): Path<(GuildId, GroupWagerId)>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let detail = uow.group_wagers().get_detail(id).await?;
    uow.commit().await?;
    Ok(Json(GroupWagerResponse::from(detail)))
}

/// `POST /group-wagers/{id}/bets`: Stake bits on an option.
///
/// # Errors
///
/// Returns [`LedgerError::WagerNotActive`], [`LedgerError::VotingPeriodEnded`],
/// [`LedgerError::AlreadyParticipating`] or [`LedgerError::InsufficientFunds`].
pub async fn place_group_bet<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, id)): Path<(GuildId, GroupWagerId)>,
    Json(req): Json<GroupBetRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let position = uow
        .group_wagers()
        .place_bet(id, req.discord_id, req.option_id, req.amount)
        .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(position)))
}

/// `POST /group-wagers/{id}/resolve`: Declare the winner and pay out.
///
/// # Errors
///
/// Returns [`LedgerError::NotAuthorized`], [`LedgerError::VotingStillOpen`]
/// or [`LedgerError::NotEnoughParticipants`].
pub async fn resolve_group_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, id)): Path<(GuildId, GroupWagerId)>,
    Json(req): Json<ResolveRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let settlement = uow
        .group_wagers()
        .resolve(id, req.resolver, req.winning_option_id)
        .await?;
    uow.commit().await?;
    Ok(Json(settlement))
}

/// `POST /group-wagers/{id}/cancel`: Cancel and refund every stake.
///
/// # Errors
///
/// Returns [`LedgerError::NotAuthorized`] or [`LedgerError::WrongState`].
pub async fn cancel_group_wager<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, id)): Path<(GuildId, GroupWagerId)>,
    Json(req): Json<CancelRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let settlement = uow.group_wagers().cancel(id, req.discord_id).await?;
    uow.commit().await?;
    Ok(Json(settlement))
}

/// Guild-scoped group wager routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/group-wagers", post(create_group_wager::<S>))
        .route("/group-wagers/{id}", get(get_group_wager::<S>))
        .route("/group-wagers/{id}/bets", post(place_group_bet::<S>))
        .route("/group-wagers/{id}/resolve", post(resolve_group_wager::<S>))
        .route("/group-wagers/{id}/cancel", post(cancel_group_wager::<S>))
}

//! User, balance, transfer and single-shot bet handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::api::dto::{
    CreateUserRequest, HighRollerResponse, HistoryParams, PlaceBetRequest, TransferRequest,
    TransferResponse,
};
use crate::app_state::AppState;
use crate::domain::{DiscordId, GuildId};
use crate::error::LedgerError;
use crate::persistence::Store;

/// `POST /users`: Get or create a user with the starting balance.
///
/// # Errors
///
/// Returns [`LedgerError::ReadOnlyScope`] for the global guild.
pub async fn create_user<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let user = uow
        .users()
        .get_or_create_user(req.discord_id, &req.username)
        .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// `GET /users/{discord_id}`: Current balance and profile.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for an unknown user.
pub async fn get_user<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, discord_id)): Path<(GuildId, DiscordId)>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let user = uow.users().get_user(discord_id).await?;
    uow.commit().await?;
    Ok(Json(user))
}

/// `GET /users/{discord_id}/history`: Balance history, newest first.
///
/// # Errors
///
/// Returns [`LedgerError::NotFound`] for an unknown user.
pub async fn get_history<S: Store>(
    State(state): State<AppState<S>>,
    Path((guild_id, discord_id)): Path<(GuildId, DiscordId)>,
    Query(params): Query<HistoryParams>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let history = uow
        .users()
        .balance_history(discord_id, params.limit)
        .await?;
    uow.commit().await?;
    Ok(Json(history))
}

/// `GET /high-roller`: User with the highest balance.
///
/// # Errors
///
/// Returns [`LedgerError::Persistence`] on database failure.
pub async fn get_high_roller<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let high_roller = uow.users().get_current_high_roller().await?;
    uow.commit().await?;
    Ok(Json(HighRollerResponse { high_roller }))
}

/// `POST /transfers`: Move bits between two users.
///
/// # Errors
///
/// Returns [`LedgerError::InsufficientFunds`], [`LedgerError::SelfTransfer`]
/// or [`LedgerError::NotFound`].
pub async fn create_transfer<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<TransferRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut uow = state.ledger.begin(guild_id).await?;
    let (from, to) = uow.users().transfer(req.from, req.to, req.amount).await?;
    uow.commit().await?;
    Ok(Json(TransferResponse { from, to }))
}

/// `POST /bets`: Place and settle a single-shot bet.
///
/// # Errors
///
/// Returns [`LedgerError::InvalidProbability`],
/// [`LedgerError::InsufficientFunds`] or [`LedgerError::NotFound`].
pub async fn place_bet<S: Store>(
    State(state): State<AppState<S>>,
    Path(guild_id): Path<GuildId>,
    Json(req): Json<PlaceBetRequest>,
) -> Result<impl IntoResponse, LedgerError> {
    let mut rng = StdRng::from_entropy();
    let mut uow = state.ledger.begin(guild_id).await?;
    let bet = uow
        .bets()
        .place_bet(req.discord_id, req.amount, req.win_probability, &mut rng)
        .await?;
    uow.commit().await?;
    Ok((StatusCode::CREATED, Json(bet)))
}

/// Guild-scoped user routes.
pub fn routes<S: Store>() -> Router<AppState<S>> {
    Router::new()
        .route("/users", post(create_user::<S>))
        .route("/users/{discord_id}", get(get_user::<S>))
        .route("/users/{discord_id}/history", get(get_history::<S>))
        .route("/high-roller", get(get_high_roller::<S>))
        .route("/transfers", post(create_transfer::<S>))
        .route("/bets", post(place_bet::<S>))
}

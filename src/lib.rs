//! # bits-ledger
//!
//! Per-guild virtual currency ledger and wager settlement engine.
//!
//! Every balance change goes through a [`service::UnitOfWork`]: one database
//! transaction scoped to a guild plus an outbox of [`domain::LedgerEvent`]s
//! that are published on the [`domain::EventBus`] only after the transaction
//! commits. On top of it sit the user ledger, single-shot bets, 1-on-1 voting
//! wagers and group wagers with pari-mutuel or fixed-odds payouts.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)              ExpirationSweeper (interval)
//!     │                              │
//!     ├── REST Handlers (api/)       │
//!     │                              │
//!     └──────────── Ledger ──────────┘
//!                     │ begin(guild)
//!                UnitOfWork ── outbox ──▶ EventBus (after commit)
//!                     │
//!     ├── UserService / BetService
//!     ├── WagerService / GroupWagerService
//!     │
//!     └── Store: PostgreSQL (sqlx) | in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;

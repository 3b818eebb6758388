//! Shared application state injected into all Axum handlers.

use crate::persistence::Store;
use crate::service::Ledger;

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState<S: Store> {
    /// Opens one unit of work per request.
    pub ledger: Ledger<S>,
}

impl<S: Store> AppState<S> {
    /// Creates a new `AppState`.
    #[must_use]
    pub fn new(ledger: Ledger<S>) -> Self {
        Self { ledger }
    }
}

//! Data Transfer Objects for REST request/response serialization.
//!
//! Identifiers and amounts are plain JSON integers. Domain entities are
//! returned as-is wherever their serialized form is already the wire shape.

pub mod group_wager_dto;
pub mod user_dto;
pub mod wager_dto;

pub use group_wager_dto::*;
pub use user_dto::*;
pub use wager_dto::*;

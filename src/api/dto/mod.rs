//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase on the wire. Prices are integer minor units
//! (grosze, euro cents).

pub mod checkout_dto;
pub mod seat_dto;
pub mod ticket_dto;

pub use checkout_dto::*;
pub use seat_dto::*;
pub use ticket_dto::*;

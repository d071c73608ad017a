//! # seat-gateway
//!
//! Seat reservation, checkout and ticket issuance service for event
//! ticketing.
//!
//! Buyers place short-lived holds on seat-units, pay through a hosted
//! checkout at an external payment provider, and receive tickets when the
//! provider's signed webhook confirms the payment. Availability is always
//! derived from the ledger (seat capacity minus active tickets minus live
//! holds), never stored.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)                 Payment provider (webhooks)
//!     │                                   │
//!     ├── REST Handlers (api/) ◄──────────┘
//!     │
//!     ├── CheckoutService ── PaymentProvider (provider/)
//!     ├── TicketIssuer
//!     ├── ReservationService ── Sweeper (service/)
//!     ├── EventBus ── audit writer
//!     │
//!     └── InventoryStore (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod provider;
pub mod service;

//! Domain layer: identifiers, inventory model, availability derivation,
//! checkout state machine, and the ledger event system.
//!
//! Nothing in this module performs I/O. Stores and services build on
//! these types; availability in particular is only ever computed by
//! [`availability::derive`].

pub mod availability;
pub mod checkout;
pub mod clock;
pub mod event;
pub mod event_bus;
pub mod ids;
pub mod ledger_event;
pub mod reservation;
pub mod seat;
pub mod ticket;

pub use availability::{InventorySnapshot, SeatAvailability};
pub use checkout::{CheckoutMetadata, CheckoutState, ProviderEvent, ProviderEventClass};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::Event;
pub use event_bus::EventBus;
pub use ids::{EventId, ReservationId, SeatId, TicketId, UserId};
pub use ledger_event::{LedgerEvent, ReleaseReason};
pub use reservation::{HoldKey, Reservation};
pub use seat::{Seat, SeatPrice, SeatRequest};
pub use ticket::{IssuanceBatch, IssuanceReport, Ticket, TicketStatus};

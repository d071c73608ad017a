//! Event listing as seen by the reservation core.

use serde::{Deserialize, Serialize};

use super::EventId;

/// The slice of an event's metadata the reservation core reads.
///
/// Descriptions, images, galleries and dates belong to the event
/// catalogue and are not modelled here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// Display name, used for checkout line items.
    pub name: String,
    /// Whether tickets are currently on sale.
    pub is_active: bool,
    /// Whether the event sells from a seat map (vs. general admission).
    pub has_seat_map: bool,
}

impl Event {
    /// Creates an active, seat-mapped event.
    #[must_use]
    pub fn new(id: EventId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            is_active: true,
            has_seat_map: true,
        }
    }
}

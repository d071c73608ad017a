//! Seats and seat-unit purchase requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{EventId, SeatId};
use crate::error::GatewayError;

/// Unit price of a seat in both supported currencies, in minor units
/// (grosze and euro cents).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeatPrice {
    /// Price in PLN minor units.
    pub pln_minor: i64,
    /// Price in EUR minor units.
    pub eur_minor: i64,
}

/// A seat (or seat block) on an event's seat map.
///
/// `capacity` is fixed when the seat map is published and only changes
/// when the whole seat map is replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seat {
    /// Seat identifier.
    pub id: SeatId,
    /// Owning event.
    pub event_id: EventId,
    /// Display name (e.g. `"A1"`, `"Table 4"`).
    pub name: String,
    /// Optional seat category (e.g. `"vip"`).
    pub seat_type: Option<String>,
    /// Number of purchasable units.
    pub capacity: u32,
    /// Unit price.
    pub price: SeatPrice,
    /// Map X coordinate; cosmetic.
    pub position_x: Option<f64>,
    /// Map Y coordinate; cosmetic.
    pub position_y: Option<f64>,
    /// Map icon URL; cosmetic.
    pub icon_url: Option<String>,
}

impl Seat {
    /// Creates a seat with the given capacity and no cosmetic attributes.
    #[must_use]
    pub fn new(event_id: EventId, name: impl Into<String>, capacity: u32, price: SeatPrice) -> Self {
        Self {
            id: SeatId::new(),
            event_id,
            name: name.into(),
            seat_type: None,
            capacity,
            price,
            position_x: None,
            position_y: None,
            icon_url: None,
        }
    }
}

/// A request for `quantity` units of one seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatRequest {
    /// Requested seat.
    pub seat_id: SeatId,
    /// Number of units.
    pub quantity: u32,
}

impl SeatRequest {
    /// Creates a new seat request.
    #[must_use]
    pub const fn new(seat_id: SeatId, quantity: u32) -> Self {
        Self { seat_id, quantity }
    }
}

/// Validates a purchase request list and merges duplicate seats.
///
/// The result is sorted by seat id so that identical requests always
/// normalize to the same list.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] when the list is empty or any
/// quantity is zero.
pub fn normalize_requests(requests: &[SeatRequest]) -> Result<Vec<SeatRequest>, GatewayError> {
    if requests.is_empty() {
        return Err(GatewayError::Validation("no seats requested".to_string()));
    }

    let mut merged: BTreeMap<SeatId, u32> = BTreeMap::new();
    for req in requests {
        if req.quantity == 0 {
            return Err(GatewayError::Validation(format!(
                "quantity for seat {} must be positive",
                req.seat_id
            )));
        }
        let entry = merged.entry(req.seat_id).or_insert(0);
        *entry = entry.checked_add(req.quantity).ok_or_else(|| {
            GatewayError::Validation(format!("quantity for seat {} overflows", req.seat_id))
        })?;
    }

    Ok(merged
        .into_iter()
        .map(|(seat_id, quantity)| SeatRequest { seat_id, quantity })
        .collect())
}

/// Expands seat requests into unit-level claims: a seat requested three
/// times appears three times.
#[must_use]
pub fn expand_units(requests: &[SeatRequest]) -> Vec<SeatId> {
    requests
        .iter()
        .flat_map(|r| std::iter::repeat_n(r.seat_id, r.quantity as usize))
        .collect()
}

/// Folds unit-level claims back into per-seat quantities.
#[must_use]
pub fn collapse_units(units: &[SeatId]) -> Vec<SeatRequest> {
    let mut counts: BTreeMap<SeatId, u32> = BTreeMap::new();
    for seat_id in units {
        *counts.entry(*seat_id).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(seat_id, quantity)| SeatRequest { seat_id, quantity })
        .collect()
}

//! Seat map and availability DTOs.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{EventId, Seat, SeatAvailability, SeatId, SeatPrice};

/// Availability of one seat.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatAvailabilityDto {
    /// Seat.
    pub seat_id: SeatId,
    /// Display name.
    pub name: String,
    /// Total units.
    pub capacity: u32,
    /// Units that can still be reserved.
    pub available: u32,
}

impl From<SeatAvailability> for SeatAvailabilityDto {
    fn from(a: SeatAvailability) -> Self {
        Self {
            seat_id: a.seat_id,
            name: a.name,
            capacity: a.capacity,
            available: a.available,
        }
    }
}

/// Response body for `GET /api/events/{id}/available-seats`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSeatsResponse {
    /// Event.
    pub event_id: EventId,
    /// Per-seat availability in seat-map order.
    pub seats: Vec<SeatAvailabilityDto>,
}

/// One seat of a seat map, as sent and returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatDto {
    /// Seat id; generated when omitted.
    #[serde(default)]
    pub id: Option<SeatId>,
    /// Display name.
    pub name: String,
    /// Optional category.
    #[serde(default)]
    pub seat_type: Option<String>,
    /// Number of purchasable units.
    pub capacity: u32,
    /// Unit price in PLN minor units.
    pub price_pln: i64,
    /// Unit price in EUR minor units.
    #[serde(default)]
    pub price_eur: i64,
    /// Map X coordinate.
    #[serde(default)]
    pub position_x: Option<f64>,
    /// Map Y coordinate.
    #[serde(default)]
    pub position_y: Option<f64>,
    /// Map icon URL.
    #[serde(default)]
    pub icon_url: Option<String>,
}

impl SeatDto {
    /// Converts into a domain seat of `event_id`.
    #[must_use]
    pub fn into_seat(self, event_id: EventId) -> Seat {
        Seat {
            id: self.id.unwrap_or_default(),
            event_id,
            name: self.name,
            seat_type: self.seat_type,
            capacity: self.capacity,
            price: SeatPrice {
                pln_minor: self.price_pln,
                eur_minor: self.price_eur,
            },
            position_x: self.position_x,
            position_y: self.position_y,
            icon_url: self.icon_url,
        }
    }
}

impl From<Seat> for SeatDto {
    fn from(seat: Seat) -> Self {
        Self {
            id: Some(seat.id),
            name: seat.name,
            seat_type: seat.seat_type,
            capacity: seat.capacity,
            price_pln: seat.price.pln_minor,
            price_eur: seat.price.eur_minor,
            position_x: seat.position_x,
            position_y: seat.position_y,
            icon_url: seat.icon_url,
        }
    }
}

/// Request body for `PUT /api/events/{id}/seats`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ReplaceSeatMapRequest {
    /// The complete new seat map.
    pub seats: Vec<SeatDto>,
}

/// Response body for `PUT /api/events/{id}/seats`.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SeatMapResponse {
    /// Event.
    pub event_id: EventId,
    /// Stored seats.
    pub seats: Vec<SeatDto>,
    /// Sum of seat capacities.
    pub total_capacity: u64,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn seat_dto_defaults_optional_fields() {
        let Ok(dto) = serde_json::from_str::<SeatDto>(
            r#"{"name":"A1","capacity":4,"pricePln":12000}"#,
        ) else {
            panic!("minimal seat parses");
        };
        let event_id = EventId::new();
        let seat = dto.into_seat(event_id);
        assert_eq!(seat.event_id, event_id);
        assert_eq!(seat.capacity, 4);
        assert_eq!(seat.price.eur_minor, 0);
    }
}

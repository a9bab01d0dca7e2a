use serde::{Deserialize, Serialize};

/// The aggregate a stage belongs to. Stages are the interesting part of the
/// model; the shipment itself carries just enough for ownership checks and
/// tracker lookups.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Shipment {
    pub id: u64,
    /// Owning admin account; checked on every mutating stage operation.
    pub admin_id: u64,
    pub admin_email: String,
    /// What an unauthenticated tracker presents to look the shipment up.
    pub tracking_code: String,
    pub description: String,
}

/// Fields an admin supplies when registering a shipment.
#[derive(Debug, Deserialize, Clone)]
pub struct NewShipment {
    pub admin_id: u64,
    pub admin_email: String,
    pub tracking_code: String,
    #[serde(default)]
    pub description: String,
}

/// Tracker-facing shipment summary; never includes admin identity.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ShipmentSummary {
    pub tracking_code: String,
    pub description: String,
}

impl From<&Shipment> for ShipmentSummary {
    fn from(shipment: &Shipment) -> Self {
        Self {
            tracking_code: shipment.tracking_code.clone(),
            description: shipment.description.clone(),
        }
    }
}

//! Domain layer: entities, the payment state machine, the visibility
//! projection, and the ports the application depends on.

pub mod payment;
pub mod ports;
pub mod receipt;
pub mod shipment;
pub mod stage;
pub mod visibility;

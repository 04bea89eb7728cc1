//! Abstraction traits used by the transport layer (PHY driver and timer).
pub mod maple_phy;
pub mod maple_timer;

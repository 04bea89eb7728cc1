//! High-level components of the Maple Bus protocol: transport phase machine,
//! prioritized transmission scheduling, host-side node hierarchy, device
//! role, and message payloads.
pub mod device;
pub mod messages;
pub mod node;
pub mod scheduling;
pub mod transport;

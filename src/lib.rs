//! `maple-bus` library: primitives and protocols required to drive the
//! Maple Bus — the two-wire serial protocol linking a legacy console to its
//! controllers, memory units, and accessories — in a `no_std` environment.
//! The crate exposes the infrastructure modules (codec), the protocol logic
//! (bus transport, transmission scheduling, node hierarchy, device role,
//! message payloads), and the traits that bind it to concrete hardware.
#![no_std]
//==================================================================================
/// Protocol-fixed wire constants shared by every layer (command opcodes,
/// function-code capability masks).
pub mod core;
/// Domain and low-level errors (address construction, packet building,
/// transport failures, scheduling, and related issues).
pub mod error;
/// Bit- and byte-level codec utilities: the trailing CRC, word byte-order
/// conversion, and wire timing arithmetic.
pub mod infra;
/// Maple Bus protocol implementation: bus transport, prioritized
/// transmission scheduling, host-side node hierarchy, device role, and
/// message payloads.
pub mod protocol;
//==================================================================================

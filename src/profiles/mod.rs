//! ROHC profile implementations.
//!
//! The generic module covers the IP / IP-in-IP / next-header profile
//! family (IP-only, UDP, UDP-Lite, RTP); the uncompressed profile is thin
//! enough to live in the engine.

pub mod generic;

//! Wire-level types shared between the core and any remote (websocket) or
//! local (in-process) consumer: the closed command catalog, the packet
//! envelope, the typed payload layouts of spec section 6, and the
//! fixed-size persistent config record layouts.
//!
//! The catalog and payload types have no heap dependency so a future
//! on-device counterpart without an allocator can share them; the packet
//! envelope's variable-length binary payload and the config-record
//! encode/decode helpers need `alloc`-backed `Vec`, gated behind the
//! `std` feature (on by default for the host-side core).

#![cfg_attr(not(feature = "std"), no_std)]

pub mod catalog;
pub mod config_record;
pub mod correction;
pub mod packet;
pub mod payloads;

pub use catalog::CommandId;
pub use packet::{CommandKind, PacketError, PacketHeader, PayloadType};

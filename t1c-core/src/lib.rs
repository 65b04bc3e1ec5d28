//! Firmware core for a handheld thermal-imaging camera: the T1C sensor
//! pipeline, τ correction, the command bus, and local/remote transport.
//!
//! Module numbering follows the component breakdown this crate is built
//! from: C1 [`config_store`], C2 [`output_state`], C3 [`tau`], C4
//! [`t1c_port`], C5 [`env_sampler`], C6 [`frame_pipeline`], C7
//! [`command_bus`], C8 [`transport`], C9 [`notifier`], C10 [`metadata`],
//! C11 [`coordinator`].

pub mod command_bus;
pub mod config_store;
pub mod coordinator;
pub mod env_sampler;
pub mod error;
pub mod frame_pipeline;
pub mod metadata;
pub mod notifier;
pub mod output_state;
pub mod t1c_port;
pub mod tau;
pub mod transport;
pub mod types;

pub use error::{Result, T1cError};

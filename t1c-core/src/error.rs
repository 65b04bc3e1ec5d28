//! Crate-wide error type. Mirrors the donor's `StrandCamError`: one
//! `thiserror` enum at the root with `#[from]` conversions for leaf error
//! types, reserved for failures that halt a worker. Recoverable failures
//! in the taxonomy of spec section 7 (transient bus errors, protocol
//! violations, resource exhaustion) are handled locally and never reach
//! this type — see each component's module docs for how it converts.

pub type Result<T> = std::result::Result<T, T1cError>;

#[derive(Debug, thiserror::Error)]
pub enum T1cError {
    #[error("persistent config store unavailable: {0}")]
    ConfigStoreUnavailable(String),

    #[error("config store commit failed for {kind:?}")]
    ConfigCommitFailed { kind: t1c_comms::config_record::ConfigKind },

    #[error("T1C sensor boot failed: {0}")]
    SensorBootFailed(String),

    #[error("correction table asset missing or malformed: {0}")]
    CorrectionTableUnavailable(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

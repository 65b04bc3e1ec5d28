//! Global `tracing` subscriber bring-up shared by every binary in this
//! workspace, so the coordinator, any mock harness, and future bins all log
//! the same way.

use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{
    fmt::{self, format, time},
    prelude::*,
    EnvFilter,
};

struct Guard {}

impl Drop for Guard {
    fn drop(&mut self) {}
}

/// Install the global subscriber. Panics if a subscriber is already set.
///
/// The returned value must be kept alive for the duration of the process;
/// dropping it early does not tear down logging, it just marks the point
/// past which log output is no longer guaranteed (matches the donor
/// crate's contract).
pub fn init() -> impl Drop {
    init_result()
        .map_err(|e| e.1)
        .expect("could not install global tracing subscriber")
}

fn init_result() -> Result<impl Drop, (impl Drop, SetGlobalDefaultError)> {
    let evt_fmt = format().with_timer(time::Uptime::default()).compact();
    let fmt_layer = fmt::layer().event_format(evt_fmt);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(EnvFilter::from_default_env())
        .init();

    Ok::<_, (Guard, SetGlobalDefaultError)>(Guard {})
}

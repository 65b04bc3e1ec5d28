//! C5 — Environment Sampler: optional ambient-temperature/humidity and
//! distance peripheral polling (spec section 4.5).
//!
//! Runs on a 100ms tick with two subsidiary schedules layered on top: an
//! ambient/humidity read roughly every 2s, a distance read roughly every
//! 500ms. A missing or failed peripheral marks its field invalid rather
//! than halting the worker (spec section 4.5, "peripherals are
//! best-effort").

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;
use crate::notifier::{MailboxHandle, PipelineBits};

pub const TICK_PERIOD: Duration = Duration::from_millis(100);
pub const AMBIENT_PERIOD: Duration = Duration::from_millis(2000);
pub const DISTANCE_PERIOD: Duration = Duration::from_millis(500);

/// A single ambient/distance reading. Each scalar carries its own
/// validity flag since a peripheral can be absent or time out
/// independently of the others (spec section 4.5).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvSample {
    pub ambient_temp_c: f32,
    pub ambient_valid: bool,
    pub humidity_pct: f32,
    pub humidity_valid: bool,
    pub distance_m: f32,
    pub distance_valid: bool,
}

impl EnvSample {
    pub const fn invalid() -> Self {
        Self {
            ambient_temp_c: 0.0,
            ambient_valid: false,
            humidity_pct: 0.0,
            humidity_valid: false,
            distance_m: 0.0,
            distance_valid: false,
        }
    }
}

impl Default for EnvSample {
    fn default() -> Self {
        Self::invalid()
    }
}

/// Contract an ambient/humidity peripheral presents. A real
/// implementation wraps an I2C/SPI sensor driver; tests use
/// [`StaticAmbientSensor`].
pub trait AmbientSensor: Send {
    fn read(&mut self) -> Result<(f32, f32)>;
}

/// Contract a distance peripheral presents (e.g. a laser or ultrasonic
/// rangefinder).
pub trait DistanceSensor: Send {
    fn read(&mut self) -> Result<f32>;
}

/// A fixed-value stand-in, used for `--mock` runs and tests.
pub struct StaticAmbientSensor {
    pub temp_c: f32,
    pub humidity_pct: f32,
}

impl AmbientSensor for StaticAmbientSensor {
    fn read(&mut self) -> Result<(f32, f32)> {
        Ok((self.temp_c, self.humidity_pct))
    }
}

pub struct StaticDistanceSensor {
    pub distance_m: f32,
}

impl DistanceSensor for StaticDistanceSensor {
    fn read(&mut self) -> Result<f32> {
        Ok(self.distance_m)
    }
}

/// Shared slot the sampler writes into and the frame pipeline reads
/// from. Guarded by a plain mutex: the write rate (at most every 500ms)
/// is far below frame rate, so contention is not a concern.
pub struct EnvSlot(parking_lot::Mutex<EnvSample>);

impl EnvSlot {
    pub fn new() -> Self {
        Self(parking_lot::Mutex::new(EnvSample::default()))
    }

    pub fn read(&self) -> EnvSample {
        *self.0.lock()
    }

    fn write(&self, f: impl FnOnce(&mut EnvSample)) {
        let mut guard = self.0.lock();
        f(&mut guard);
    }
}

impl Default for EnvSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs the sampler's tick loop until `mailbox` receives
/// [`PipelineBits::SHUTDOWN`]. Intended to be spawned on its own
/// `std::thread`.
pub fn run(
    mut ambient: Option<Box<dyn AmbientSensor>>,
    mut distance: Option<Box<dyn DistanceSensor>>,
    slot: std::sync::Arc<EnvSlot>,
    self_mailbox: MailboxHandle,
    pipeline_mailbox: MailboxHandle,
) {
    if ambient.is_none() && distance.is_none() {
        debug!("no environment peripherals present, sampler exiting");
        return;
    }

    let mut last_ambient = Instant::now() - AMBIENT_PERIOD;
    let mut last_distance = Instant::now() - DISTANCE_PERIOD;

    loop {
        let bits = self_mailbox.wait(TICK_PERIOD);
        if bits & PipelineBits::SHUTDOWN.bits() != 0 {
            debug!("environment sampler shutting down");
            return;
        }

        let now = Instant::now();
        let mut ambient_fired = false;
        let mut distance_fired = false;

        if now.duration_since(last_ambient) >= AMBIENT_PERIOD {
            last_ambient = now;
            if let Some(sensor) = ambient.as_mut() {
                match sensor.read() {
                    Ok((temp, humidity)) => {
                        slot.write(|s| {
                            s.ambient_temp_c = temp;
                            s.ambient_valid = true;
                            s.humidity_pct = humidity;
                            s.humidity_valid = true;
                        });
                        ambient_fired = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "ambient sensor read failed, marking invalid");
                        slot.write(|s| {
                            s.ambient_valid = false;
                            s.humidity_valid = false;
                        });
                    }
                }
            }
        }

        if now.duration_since(last_distance) >= DISTANCE_PERIOD {
            last_distance = now;
            if let Some(sensor) = distance.as_mut() {
                match sensor.read() {
                    Ok(d) => {
                        slot.write(|s| {
                            s.distance_m = d;
                            s.distance_valid = true;
                        });
                        distance_fired = true;
                    }
                    Err(e) => {
                        warn!(error = %e, "distance sensor read failed, marking invalid");
                        slot.write(|s| s.distance_valid = false);
                    }
                }
            }
        }

        if ambient_fired {
            pipeline_mailbox.post((PipelineBits::ENV_UPDATED | PipelineBits::NEW_AMBIENT).bits());
        }
        if distance_fired {
            pipeline_mailbox.post((PipelineBits::ENV_UPDATED | PipelineBits::NEW_DISTANCE).bits());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn slot_defaults_to_all_invalid() {
        let slot = EnvSlot::new();
        let s = slot.read();
        assert!(!s.ambient_valid);
        assert!(!s.humidity_valid);
        assert!(!s.distance_valid);
    }

    #[test]
    fn run_reports_readings_and_shuts_down_cleanly() {
        let notifier: Notifier<&'static str> = Notifier::new();
        let self_mb = notifier.mailbox("env");
        let pipeline_mb = notifier.mailbox("pipeline");
        let slot = Arc::new(EnvSlot::new());

        let ambient: Box<dyn AmbientSensor> = Box::new(StaticAmbientSensor {
            temp_c: 21.5,
            humidity_pct: 40.0,
        });
        let distance: Box<dyn DistanceSensor> = Box::new(StaticDistanceSensor { distance_m: 3.0 });

        let slot_clone = slot.clone();
        let self_mb_clone = self_mb.clone();
        let pipeline_mb_clone = pipeline_mb.clone();
        let handle = thread::spawn(move || {
            run(Some(ambient), Some(distance), slot_clone, self_mb_clone, pipeline_mb_clone);
        });

        // Give the worker a few ticks to run its subsidiary schedules.
        thread::sleep(Duration::from_millis(250));
        self_mb.post(PipelineBits::SHUTDOWN.bits());
        handle.join().unwrap();

        let sample = slot.read();
        assert!(sample.ambient_valid);
        assert_eq!(sample.ambient_temp_c, 21.5);

        let got = pipeline_mb.try_wait();
        assert!(got & PipelineBits::ENV_UPDATED.bits() != 0);
    }
}

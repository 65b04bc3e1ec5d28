//! Shared data model that crosses worker boundaries (spec section 3):
//! [`FrameSlot`], the mutex-guarded ping-pong/file-save record C6 writes
//! and every consumer reads, and [`ParamWrite`], the single-element unit
//! the parameter queue carries into C6's CCI idle slice.

use parking_lot::Mutex;

use crate::output_state::RegionRect;
use crate::t1c_port::{FRAME_HEIGHT, FRAME_PIXELS, FRAME_WIDTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamGroup {
    Shutter,
    Image,
    Tpd,
}

/// One pending parameter write, queued by command handlers and C5/C6's
/// own τ management, consumed at most one per frame by C6 (spec section 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamWrite {
    pub group: ParamGroup,
    pub id: u16,
    pub value: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvSnapshot {
    pub ambient_temp_c: f32,
    pub ambient_valid: bool,
    pub humidity_pct: f32,
    pub humidity_valid: bool,
    pub distance_m: f32,
    pub distance_valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpotSnapshot {
    pub x: u16,
    pub y: u16,
    pub temp_c_x10: i16,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MinMaxSnapshot {
    pub min_temp_c_x10: i16,
    pub min_x: u16,
    pub min_y: u16,
    pub max_temp_c_x10: i16,
    pub max_x: u16,
    pub max_y: u16,
    pub valid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RegionSnapshot {
    pub rect: RegionRect,
    pub min_temp_c_x10: i16,
    pub max_temp_c_x10: i16,
    pub avg_temp_c_x10: i16,
    pub valid: bool,
}

/// The body of a [`FrameSlot`], cloned out by readers under the slot's
/// mutex and then used lock-free.
#[derive(Clone)]
pub struct FrameBody {
    pub pixels: std::sync::Arc<Vec<u16>>,
    pub y16_min: u16,
    pub y16_max: u16,
    pub high_gain: bool,
    pub frozen: bool,
    pub env: EnvSnapshot,
    pub spot: SpotSnapshot,
    pub min_max: MinMaxSnapshot,
    pub region: RegionSnapshot,
}

impl FrameBody {
    fn empty() -> Self {
        Self {
            pixels: std::sync::Arc::new(vec![0u16; FRAME_PIXELS]),
            y16_min: 0,
            y16_max: 0,
            high_gain: false,
            frozen: false,
            env: EnvSnapshot::default(),
            spot: SpotSnapshot::default(),
            min_max: MinMaxSnapshot::default(),
            region: RegionSnapshot::default(),
        }
    }
}

/// A mutex-guarded display/file-save frame record (spec section 3): one
/// writer (C6), many readers. Readers hold the mutex only long enough to
/// clone the body out.
pub struct FrameSlot(Mutex<FrameBody>);

impl FrameSlot {
    pub fn new() -> Self {
        Self(Mutex::new(FrameBody::empty()))
    }

    pub fn commit(&self, body: FrameBody) {
        *self.0.lock() = body;
    }

    pub fn read(&self) -> FrameBody {
        self.0.lock().clone()
    }

    pub fn dimensions() -> (usize, usize) {
        (FRAME_WIDTH, FRAME_HEIGHT)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_then_read_round_trips() {
        let slot = FrameSlot::new();
        let mut body = FrameBody::empty();
        body.y16_min = 10;
        body.y16_max = 4000;
        slot.commit(body);
        let got = slot.read();
        assert_eq!(got.y16_min, 10);
        assert_eq!(got.y16_max, 4000);
    }
}

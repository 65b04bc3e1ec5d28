//! C10 — Metadata Builder: an immutable snapshot of image/tpd parameter
//! groups and a set of human-readable annotation lines, taken at the
//! moment a file-save frame is committed (spec section 4.10).
//!
//! No lookup or computation happens after `snapshot()` returns; the
//! result is handed, already frozen, to the file-save collaborator (JPEG
//! comment embedding itself is outside this core, spec section 1).

use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::Mutex;

use crate::output_state::OutputState;

/// Everything the file-save collaborator needs to annotate one saved
/// frame.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub platform: &'static str,
    pub firmware_version: String,
    pub sensor_serial: String,
    pub unix_time_secs: u64,
    pub palette_save: u32,
    pub y16_min: u16,
    pub y16_max: u16,
    pub spot_valid: bool,
    pub spot_temp_c_x10: i16,
    pub region_valid: bool,
    pub region_avg_temp_c_x10: i16,
    pub ambient_temp_c: f32,
    pub humidity_pct: f32,
    pub emissivity_pct: u32,
    pub atmospheric_temp_c: i32,
    pub distance_cm: u32,
    pub annotation_lines: Vec<String>,
}

/// Reads the process-wide state needed to build a [`FileMetadata`]
/// snapshot. Held by C6 and invoked once per file-save commit.
pub struct MetadataSource {
    output: Arc<Mutex<OutputState>>,
    firmware_version: String,
    sensor_serial: String,
}

impl MetadataSource {
    pub fn new(output: Arc<Mutex<OutputState>>, firmware_version: String, sensor_serial: String) -> Self {
        Self { output, firmware_version, sensor_serial }
    }

    /// Build a frozen snapshot from current output state plus the
    /// per-frame scalars/feature results the caller already has in hand.
    pub fn snapshot_with_frame(
        &self,
        y16_min: u16,
        y16_max: u16,
        spot_valid: bool,
        spot_temp_c_x10: i16,
        region_valid: bool,
        region_avg_temp_c_x10: i16,
        ambient_temp_c: f32,
        humidity_pct: f32,
    ) -> FileMetadata {
        let out = self.output.lock();
        let unix_time_secs = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut lines = vec![
            format!("fw {}", self.firmware_version),
            format!("sn {}", self.sensor_serial),
            format!("t {}", unix_time_secs),
            format!("palette {}", out.palette_save),
            format!("scene {}..{}", y16_min, y16_max),
        ];
        if spot_valid {
            lines.push(format!("spot {:.1}C", spot_temp_c_x10 as f32 / 10.0));
        }
        if region_valid {
            lines.push(format!("region-avg {:.1}C", region_avg_temp_c_x10 as f32 / 10.0));
        }
        lines.push(format!("ambient {:.1}C rh{:.0}%", ambient_temp_c, humidity_pct));
        lines.push(format!(
            "tpd ta={} d={}cm e={}%",
            out.atmospheric_temp_c, out.distance_cm, out.emissivity_pct
        ));

        FileMetadata {
            platform: "t1c-core",
            firmware_version: self.firmware_version.clone(),
            sensor_serial: self.sensor_serial.clone(),
            unix_time_secs,
            palette_save: out.palette_save,
            y16_min,
            y16_max,
            spot_valid,
            spot_temp_c_x10,
            region_valid,
            region_avg_temp_c_x10,
            ambient_temp_c,
            humidity_pct,
            emissivity_pct: out.emissivity_pct,
            atmospheric_temp_c: out.atmospheric_temp_c,
            distance_cm: out.distance_cm,
            annotation_lines: lines,
        }
    }

    /// Convenience used when the caller only has a `FrameBody` in hand
    /// (the common case in C6's file-save commit path).
    pub fn snapshot_from_body(&self, body: &crate::types::FrameBody) -> FileMetadata {
        self.snapshot_with_frame(
            body.y16_min,
            body.y16_max,
            body.spot.valid,
            body.spot.temp_c_x10,
            body.region.valid,
            body.region.avg_temp_c_x10,
            body.env.ambient_temp_c,
            body.env.humidity_pct,
        )
    }

    /// A bare snapshot with no per-frame scalars, used by tests and by
    /// callers that have not yet acquired a frame.
    pub fn snapshot(&self) -> FileMetadata {
        self.snapshot_with_frame(0, 0, false, 0, false, 0, 0.0, 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_store::ConfigStore;

    #[test]
    fn snapshot_is_immutable_after_config_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path(), [0, 1, 2, 3, 4, 5]);
        store.init().unwrap();
        let output = Arc::new(Mutex::new(OutputState::init(&store)));
        let source = MetadataSource::new(output.clone(), "1.2".into(), "SN1".into());

        let snap = source.snapshot_from_body(&crate::types::FrameBody {
            pixels: Arc::new(vec![0u16; 1]),
            y16_min: 10,
            y16_max: 200,
            high_gain: true,
            frozen: false,
            env: Default::default(),
            spot: Default::default(),
            min_max: Default::default(),
            region: Default::default(),
        });

        output.lock().emissivity_pct = 50;
        assert_ne!(snap.emissivity_pct, 50);
    }
}

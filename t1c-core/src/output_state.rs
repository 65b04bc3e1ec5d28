//! C2 — Output State: the single process-wide mirror of user-visible
//! settings (spec sections 3, 4.2). Populated from C1 at boot, mutated by
//! command handlers and C5/C6 callbacks, and diffed back into C1 on
//! `save()`.
//!
//! Regions, the portrait flag, and other purely run-time state are never
//! persisted (spec section 4.2): they live on this struct but have no
//! counterpart field in [`T1cRecord`]/[`OutputRecord`] and never
//! participate in the dirty diff.

use t1c_comms::config_record::{ConfigKind, OutputRecord, T1cRecord};

use crate::config_store::{ConfigStore, ConfigValue};
use crate::error::Result;
use crate::notifier::{MailboxHandle, PipelineBits};

/// Which of the two persisted records changed on the last `save()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlags {
    pub t1c_changed: bool,
    pub output_changed: bool,
}

/// A target rectangle for the region-statistics feature. Run-time only;
/// never persisted (spec section 4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionRect {
    pub x: u16,
    pub y: u16,
    pub w: u16,
    pub h: u16,
}

/// The process-wide mirror of user-visible camera settings.
pub struct OutputState {
    // --- persisted (t1c record) ---
    pub high_gain: bool,
    pub auto_ffc: bool,
    pub ffc_delta_t_x10: i32,
    pub ffc_min_interval_s: u32,
    pub ffc_max_interval_s: u32,
    pub use_auto_ambient: bool,
    pub refl_equals_ambient: bool,
    pub atmospheric_temp_c: i32,
    pub distance_cm: u32,
    pub humidity_pct: u32,
    pub reflected_temp_c: i32,
    pub emissivity_pct: u32,

    // --- persisted (out record) ---
    pub min_max_markers_on: bool,
    pub min_max_temps_shown: bool,
    pub pal_not_ntsc: bool,
    pub save_overlay_on: bool,
    pub spot_on: bool,
    pub units_metric: bool,
    pub palette_gui: u32,
    pub palette_save: u32,
    pub palette_video: u32,
    pub brightness: u32,
    pub lcd_backlight_pct: u32,

    // --- run-time only, never persisted ---
    pub portrait: bool,
    pub region_on: bool,
    pub region: RegionRect,

    last_t1c: T1cRecord,
    last_out: OutputRecord,
}

impl OutputState {
    /// Hydrate from C1.
    pub fn init(store: &ConfigStore) -> Self {
        let t1c = match store.get(ConfigKind::T1c) {
            ConfigValue::T1c(r) => r,
            _ => unreachable!("config store returned wrong kind for T1c"),
        };
        let out = match store.get(ConfigKind::Output) {
            ConfigValue::Output(r) => r,
            _ => unreachable!("config store returned wrong kind for Output"),
        };
        Self::from_records(t1c, out)
    }

    fn from_records(t1c: T1cRecord, out: OutputRecord) -> Self {
        Self {
            high_gain: t1c.high_gain,
            auto_ffc: t1c.auto_ffc,
            ffc_delta_t_x10: t1c.ffc_delta_t_x10,
            ffc_min_interval_s: t1c.ffc_min_interval_s,
            ffc_max_interval_s: t1c.ffc_max_interval_s,
            use_auto_ambient: t1c.use_auto_ambient,
            refl_equals_ambient: t1c.refl_equals_ambient,
            atmospheric_temp_c: t1c.atmospheric_temp_c,
            distance_cm: t1c.distance_cm,
            humidity_pct: t1c.humidity_pct,
            reflected_temp_c: t1c.reflected_temp_c,
            emissivity_pct: t1c.emissivity_pct,

            min_max_markers_on: out.min_max_markers_on,
            min_max_temps_shown: out.min_max_temps_shown,
            pal_not_ntsc: out.pal_not_ntsc,
            save_overlay_on: out.save_overlay_on,
            spot_on: out.spot_on,
            units_metric: out.units_metric,
            palette_gui: out.palette_gui,
            palette_save: out.palette_save,
            palette_video: out.palette_video,
            brightness: out.brightness,
            lcd_backlight_pct: out.lcd_backlight_pct,

            portrait: false,
            region_on: false,
            region: RegionRect::default(),

            last_t1c: t1c,
            last_out: out,
        }
    }

    fn as_t1c_record(&self) -> T1cRecord {
        T1cRecord {
            version: self.last_t1c.version,
            high_gain: self.high_gain,
            auto_ffc: self.auto_ffc,
            ffc_delta_t_x10: self.ffc_delta_t_x10,
            ffc_min_interval_s: self.ffc_min_interval_s,
            ffc_max_interval_s: self.ffc_max_interval_s,
            use_auto_ambient: self.use_auto_ambient,
            refl_equals_ambient: self.refl_equals_ambient,
            atmospheric_temp_c: self.atmospheric_temp_c,
            distance_cm: self.distance_cm,
            humidity_pct: self.humidity_pct,
            reflected_temp_c: self.reflected_temp_c,
            emissivity_pct: self.emissivity_pct,
        }
    }

    fn as_output_record(&self) -> OutputRecord {
        OutputRecord {
            version: self.last_out.version,
            auto_ffc: self.auto_ffc,
            min_max_markers_on: self.min_max_markers_on,
            min_max_temps_shown: self.min_max_temps_shown,
            pal_not_ntsc: self.pal_not_ntsc,
            save_overlay_on: self.save_overlay_on,
            spot_on: self.spot_on,
            units_metric: self.units_metric,
            palette_gui: self.palette_gui,
            palette_save: self.palette_save,
            palette_video: self.palette_video,
            brightness: self.brightness,
            lcd_backlight_pct: self.lcd_backlight_pct,
        }
    }

    /// Diff the mirror against the last-loaded records, persist only the
    /// records that changed, and notify the pipeline of a config change
    /// if the T1C record changed. Regions, portrait, and other run-time
    /// fields never participate in this diff.
    pub fn save(&mut self, store: &ConfigStore, pipeline_mailbox: Option<&MailboxHandle>) -> Result<DirtyFlags> {
        let new_t1c = self.as_t1c_record();
        let new_out = self.as_output_record();

        let t1c_changed = new_t1c != self.last_t1c;
        let output_changed = new_out != self.last_out;

        if t1c_changed {
            store.set(ConfigValue::T1c(new_t1c))?;
            self.last_t1c = new_t1c;
        }
        if output_changed {
            store.set(ConfigValue::Output(new_out))?;
            self.last_out = new_out;
        }
        if t1c_changed {
            if let Some(mb) = pipeline_mailbox {
                mb.post(PipelineBits::CONFIG_UPDATED.bits());
            }
        }

        Ok(DirtyFlags {
            t1c_changed,
            output_changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path(), [1, 2, 3, 4, 5, 6]);
        store.init().unwrap();
        (dir, store)
    }

    #[test]
    fn save_is_noop_when_nothing_changed() {
        let (_d, store) = temp_store();
        let mut state = OutputState::init(&store);
        let dirty = state.save(&store, None).unwrap();
        assert_eq!(dirty, DirtyFlags::default());
    }

    #[test]
    fn changing_emissivity_marks_only_t1c_dirty() {
        let (_d, store) = temp_store();
        let mut state = OutputState::init(&store);
        state.emissivity_pct = 42;
        let dirty = state.save(&store, None).unwrap();
        assert!(dirty.t1c_changed);
        assert!(!dirty.output_changed);
    }

    #[test]
    fn region_and_portrait_never_persisted() {
        let (_d, store) = temp_store();
        let mut state = OutputState::init(&store);
        state.portrait = true;
        state.region_on = true;
        state.region = RegionRect { x: 1, y: 2, w: 3, h: 4 };
        let dirty = state.save(&store, None).unwrap();
        assert_eq!(dirty, DirtyFlags::default());
    }
}

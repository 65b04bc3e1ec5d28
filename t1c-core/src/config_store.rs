//! C1 — Persistent Config Store: typed config records with defaults,
//! atomic reload, versioning (spec section 4.1).
//!
//! Each of the three kinds lives in its own file under the store's base
//! directory, named by its wire key (`"net"`, `"t1c"`, `"out"`, spec
//! section 6). `init()` probes each file; missing or size-mismatched
//! files are re-initialised from defaults. A heap-resident mirror is kept
//! per kind so `get`/`set` never touch disk on the read path; `set`
//! persists and commits (`sync_all`) before mutating the mirror, so a
//! failed write never corrupts the in-memory copy.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{info, warn};

use t1c_comms::config_record::{ConfigKind, NetworkRecord, OutputRecord, T1cRecord};

use crate::error::{Result, T1cError};

/// A typed copy of one config record, as returned by [`ConfigStore::get`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValue {
    Network(NetworkRecord),
    T1c(T1cRecord),
    Output(OutputRecord),
}

impl ConfigValue {
    pub fn kind(&self) -> ConfigKind {
        match self {
            ConfigValue::Network(_) => ConfigKind::Network,
            ConfigValue::T1c(_) => ConfigKind::T1c,
            ConfigValue::Output(_) => ConfigKind::Output,
        }
    }
}

struct Mirror {
    net: NetworkRecord,
    t1c: T1cRecord,
    out: OutputRecord,
}

pub struct ConfigStore {
    dir: PathBuf,
    mac: [u8; 6],
    mirror: Mutex<Mirror>,
}

impl ConfigStore {
    /// Construct a store rooted at `dir`. Call [`ConfigStore::init`]
    /// before using it; the constructor itself cannot fail.
    pub fn new(dir: impl Into<PathBuf>, mac: [u8; 6]) -> Self {
        Self {
            dir: dir.into(),
            mac,
            mirror: Mutex::new(Mirror {
                net: NetworkRecord::default_with_mac(mac),
                t1c: T1cRecord::default(),
                out: OutputRecord::default(),
            }),
        }
    }

    fn path_for(&self, kind: ConfigKind) -> PathBuf {
        self.dir.join(kind.key())
    }

    /// Probe the store, re-initialising any record that's absent or the
    /// wrong size, reading the rest in. Fails only if the base directory
    /// itself cannot be made available.
    pub fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| T1cError::ConfigStoreUnavailable(e.to_string()))?;

        self.probe_or_default(ConfigKind::Network)?;
        self.probe_or_default(ConfigKind::T1c)?;
        self.probe_or_default(ConfigKind::Output)?;
        Ok(())
    }

    fn probe_or_default(&self, kind: ConfigKind) -> Result<()> {
        let path = self.path_for(kind);
        match fs::read(&path) {
            Ok(bytes) => {
                if !self.adopt_bytes(kind, &bytes) {
                    warn!(?kind, "config record size mismatch, reinitialising from defaults");
                    self.reinit(kind)?;
                }
            }
            Err(_) => {
                info!(?kind, "no config record on disk, writing defaults");
                self.reinit(kind)?;
            }
        }
        Ok(())
    }

    /// Try to parse `bytes` into the mirror for `kind`. Returns `false`
    /// (mirror untouched) on a length mismatch so the caller can
    /// re-initialise.
    fn adopt_bytes(&self, kind: ConfigKind, bytes: &[u8]) -> bool {
        let mut mirror = self.mirror.lock();
        match kind {
            ConfigKind::Network => match NetworkRecord::from_bytes(bytes) {
                Some(r) => {
                    mirror.net = r;
                    true
                }
                None => false,
            },
            ConfigKind::T1c => match T1cRecord::from_bytes(bytes) {
                Some(r) => {
                    mirror.t1c = r;
                    true
                }
                None => false,
            },
            ConfigKind::Output => match OutputRecord::from_bytes(bytes) {
                Some(r) => {
                    mirror.out = r;
                    true
                }
                None => false,
            },
        }
    }

    fn default_value(&self, kind: ConfigKind) -> ConfigValue {
        match kind {
            ConfigKind::Network => ConfigValue::Network(NetworkRecord::default_with_mac(self.mac)),
            ConfigKind::T1c => ConfigValue::T1c(T1cRecord::default()),
            ConfigKind::Output => ConfigValue::Output(OutputRecord::default()),
        }
    }

    fn write_and_commit(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let tmp = path.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)?;
            use std::io::Write;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read the current in-memory copy for `kind`.
    pub fn get(&self, kind: ConfigKind) -> ConfigValue {
        let mirror = self.mirror.lock();
        match kind {
            ConfigKind::Network => ConfigValue::Network(mirror.net),
            ConfigKind::T1c => ConfigValue::T1c(mirror.t1c),
            ConfigKind::Output => ConfigValue::Output(mirror.out),
        }
    }

    /// Persist and commit `value`, then update the mirror. The mirror is
    /// left untouched if the write fails.
    pub fn set(&self, value: ConfigValue) -> Result<()> {
        let kind = value.kind();
        let path = self.path_for(kind);
        let bytes: Vec<u8> = match value {
            ConfigValue::Network(r) => r.to_bytes().to_vec(),
            ConfigValue::T1c(r) => r.to_bytes().to_vec(),
            ConfigValue::Output(r) => r.to_bytes().to_vec(),
        };
        self.write_and_commit(&path, &bytes)
            .map_err(|_| T1cError::ConfigCommitFailed { kind })?;
        let mut mirror = self.mirror.lock();
        match value {
            ConfigValue::Network(r) => mirror.net = r,
            ConfigValue::T1c(r) => mirror.t1c = r,
            ConfigValue::Output(r) => mirror.out = r,
        }
        Ok(())
    }

    /// Re-initialise a single record from its deterministic default,
    /// persisting and mirroring it.
    pub fn reinit(&self, kind: ConfigKind) -> Result<()> {
        self.set(self.default_value(kind))
    }

    pub fn reinit_all(&self) -> Result<()> {
        for kind in ConfigKind::ALL {
            self.reinit(kind)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path(), [0, 1, 2, 3, 4, 5]);
        store.init().unwrap();
        (dir, store)
    }

    #[test]
    fn round_trip_set_then_get() {
        let (_dir, store) = store();
        let mut r = T1cRecord::default();
        r.emissivity_pct = 77;
        store.set(ConfigValue::T1c(r)).unwrap();
        match store.get(ConfigKind::T1c) {
            ConfigValue::T1c(got) => assert_eq!(got.emissivity_pct, 77),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn reinit_runtime_matches_get_after_set() {
        // Config round-trip property (spec section 8): set(kind,R);
        // reinit_runtime(); get(kind) == R, where "reinit_runtime" here
        // is standing up a fresh store instance pointed at the same dir.
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path(), [0, 1, 2, 3, 4, 5]);
        store.init().unwrap();
        let mut r = OutputRecord::default();
        r.brightness = 33;
        store.set(ConfigValue::Output(r)).unwrap();
        drop(store);

        let store2 = ConfigStore::new(dir.path(), [0, 1, 2, 3, 4, 5]);
        store2.init().unwrap();
        match store2.get(ConfigKind::Output) {
            ConfigValue::Output(got) => assert_eq!(got, r),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn size_mismatch_triggers_reinit_from_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("t1c"), [0u8; 3]).unwrap();
        let store = ConfigStore::new(dir.path(), [9, 9, 9, 9, 9, 9]);
        store.init().unwrap();
        match store.get(ConfigKind::T1c) {
            ConfigValue::T1c(got) => assert_eq!(got, T1cRecord::default()),
            _ => panic!("wrong kind"),
        }
    }

    #[test]
    fn independent_reinits_match_except_network_ssid_suffix() {
        let (_d1, s1) = store();
        let (_d2, s2) = store();
        s1.reinit(ConfigKind::T1c).unwrap();
        s2.reinit(ConfigKind::T1c).unwrap();
        assert_eq!(s1.get(ConfigKind::T1c), s2.get(ConfigKind::T1c));
    }
}

//! Fixed-layout payload structs for the catalog ids that carry more than a
//! single scalar (spec section 6). Every layout is big-endian on the wire,
//! matches exactly the byte counts the spec gives, and has no heap
//! dependency so it can live in the `no_std` core of this crate.

/// `ambient-correct` payload (18 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmbientCorrectionPayload {
    pub use_auto: bool,
    pub refl_equals_ambient: bool,
    pub atmospheric_temp_c: i32,
    pub distance_cm: u32,
    pub humidity_pct: u32,
    pub reflected_temp_c: i32,
}

impl AmbientCorrectionPayload {
    pub const LEN: usize = 18;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.use_auto as u8;
        out[1] = self.refl_equals_ambient as u8;
        out[2..6].copy_from_slice(&self.atmospheric_temp_c.to_be_bytes());
        out[6..10].copy_from_slice(&self.distance_cm.to_be_bytes());
        out[10..14].copy_from_slice(&self.humidity_pct.to_be_bytes());
        out[14..18].copy_from_slice(&self.reflected_temp_c.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(Self {
            use_auto: buf[0] != 0,
            refl_equals_ambient: buf[1] != 0,
            atmospheric_temp_c: i32::from_be_bytes(buf[2..6].try_into().ok()?),
            distance_cm: u32::from_be_bytes(buf[6..10].try_into().ok()?),
            humidity_pct: u32::from_be_bytes(buf[10..14].try_into().ok()?),
            reflected_temp_c: i32::from_be_bytes(buf[14..18].try_into().ok()?),
        })
    }
}

/// `shutter-info` payload (13 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutterPayload {
    pub auto_ffc: bool,
    pub temp_threshold_x10: u32,
    pub min_interval_s: u32,
    pub max_interval_s: u32,
}

impl ShutterPayload {
    pub const LEN: usize = 13;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.auto_ffc as u8;
        out[1..5].copy_from_slice(&self.temp_threshold_x10.to_be_bytes());
        out[5..9].copy_from_slice(&self.min_interval_s.to_be_bytes());
        out[9..13].copy_from_slice(&self.max_interval_s.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(Self {
            auto_ffc: buf[0] != 0,
            temp_threshold_x10: u32::from_be_bytes(buf[1..5].try_into().ok()?),
            min_interval_s: u32::from_be_bytes(buf[5..9].try_into().ok()?),
            max_interval_s: u32::from_be_bytes(buf[9..13].try_into().ok()?),
        })
    }
}

/// `time` payload (36 bytes): nine big-endian i32 fields, `struct tm` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePayload {
    pub sec: i32,
    pub min: i32,
    pub hour: i32,
    pub mday: i32,
    pub mon: i32,
    pub year_since_1900: i32,
    pub wday: i32,
    pub yday: i32,
    pub isdst: i32,
}

impl TimePayload {
    pub const LEN: usize = 36;
    const FIELDS: usize = 9;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let fields = [
            self.sec,
            self.min,
            self.hour,
            self.mday,
            self.mon,
            self.year_since_1900,
            self.wday,
            self.yday,
            self.isdst,
        ];
        let mut out = [0u8; Self::LEN];
        for (i, f) in fields.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&f.to_be_bytes());
        }
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        let mut fields = [0i32; Self::FIELDS];
        for (i, f) in fields.iter_mut().enumerate() {
            *f = i32::from_be_bytes(buf[i * 4..i * 4 + 4].try_into().ok()?);
        }
        Some(Self {
            sec: fields[0],
            min: fields[1],
            hour: fields[2],
            mday: fields[3],
            mon: fields[4],
            year_since_1900: fields[5],
            wday: fields[6],
            yday: fields[7],
            isdst: fields[8],
        })
    }
}

/// `timelapse-cfg` payload (10 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelapsePayload {
    pub enable: bool,
    pub notify: bool,
    pub interval_s: u32,
    pub count: u32,
}

impl TimelapsePayload {
    pub const LEN: usize = 10;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0] = self.enable as u8;
        out[1] = self.notify as u8;
        out[2..6].copy_from_slice(&self.interval_s.to_be_bytes());
        out[6..10].copy_from_slice(&self.count.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(Self {
            enable: buf[0] != 0,
            notify: buf[1] != 0,
            interval_s: u32::from_be_bytes(buf[2..6].try_into().ok()?),
            count: u32::from_be_bytes(buf[6..10].try_into().ok()?),
        })
    }
}

/// `wifi-info` payload: `{mdns, sta-mode, static-ip}` flag bytes, two
/// 33-byte zero-terminated SSIDs (AP, STA), two 64-byte zero-terminated
/// passphrases (AP, STA), three 4-byte big-endian IPv4 fields (AP IP, STA
/// IP, STA netmask).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WifiPayload {
    pub mdns: bool,
    pub sta_mode: bool,
    pub static_ip: bool,
    pub ap_ssid: [u8; 33],
    pub sta_ssid: [u8; 33],
    pub ap_passphrase: [u8; 64],
    pub sta_passphrase: [u8; 64],
    pub ap_ip: [u8; 4],
    pub sta_ip: [u8; 4],
    pub sta_netmask: [u8; 4],
}

impl WifiPayload {
    pub const LEN: usize = 3 + 33 + 33 + 64 + 64 + 4 + 4 + 4;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        let mut o = 0usize;
        out[o] = self.mdns as u8;
        o += 1;
        out[o] = self.sta_mode as u8;
        o += 1;
        out[o] = self.static_ip as u8;
        o += 1;
        out[o..o + 33].copy_from_slice(&self.ap_ssid);
        o += 33;
        out[o..o + 33].copy_from_slice(&self.sta_ssid);
        o += 33;
        out[o..o + 64].copy_from_slice(&self.ap_passphrase);
        o += 64;
        out[o..o + 64].copy_from_slice(&self.sta_passphrase);
        o += 64;
        out[o..o + 4].copy_from_slice(&self.ap_ip);
        o += 4;
        out[o..o + 4].copy_from_slice(&self.sta_ip);
        o += 4;
        out[o..o + 4].copy_from_slice(&self.sta_netmask);
        o += 4;
        debug_assert_eq!(o, Self::LEN);
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        let mut o = 0usize;
        let mdns = buf[o] != 0;
        o += 1;
        let sta_mode = buf[o] != 0;
        o += 1;
        let static_ip = buf[o] != 0;
        o += 1;
        let mut ap_ssid = [0u8; 33];
        ap_ssid.copy_from_slice(&buf[o..o + 33]);
        o += 33;
        let mut sta_ssid = [0u8; 33];
        sta_ssid.copy_from_slice(&buf[o..o + 33]);
        o += 33;
        let mut ap_passphrase = [0u8; 64];
        ap_passphrase.copy_from_slice(&buf[o..o + 64]);
        o += 64;
        let mut sta_passphrase = [0u8; 64];
        sta_passphrase.copy_from_slice(&buf[o..o + 64]);
        o += 64;
        let mut ap_ip = [0u8; 4];
        ap_ip.copy_from_slice(&buf[o..o + 4]);
        o += 4;
        let mut sta_ip = [0u8; 4];
        sta_ip.copy_from_slice(&buf[o..o + 4]);
        o += 4;
        let mut sta_netmask = [0u8; 4];
        sta_netmask.copy_from_slice(&buf[o..o + 4]);
        o += 4;
        debug_assert_eq!(o, Self::LEN);
        Some(Self {
            mdns,
            sta_mode,
            static_ip,
            ap_ssid,
            sta_ssid,
            ap_passphrase,
            sta_passphrase,
            ap_ip,
            sta_ip,
            sta_netmask,
        })
    }
}

/// `ctrl-activity` payload: two big-endian i32 words, `{activity, auxiliary}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlActivityPayload {
    pub activity: i32,
    pub auxiliary: i32,
}

impl ControlActivityPayload {
    pub const LEN: usize = 8;

    pub fn to_bytes(self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..4].copy_from_slice(&self.activity.to_be_bytes());
        out[4..8].copy_from_slice(&self.auxiliary.to_be_bytes());
        out
    }

    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != Self::LEN {
            return None;
        }
        Some(Self {
            activity: i32::from_be_bytes(buf[0..4].try_into().ok()?),
            auxiliary: i32::from_be_bytes(buf[4..8].try_into().ok()?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ambient_correction_round_trips() {
        let p = AmbientCorrectionPayload {
            use_auto: true,
            refl_equals_ambient: false,
            atmospheric_temp_c: 21,
            distance_cm: 150,
            humidity_pct: 45,
            reflected_temp_c: 20,
        };
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), AmbientCorrectionPayload::LEN);
        assert_eq!(AmbientCorrectionPayload::from_bytes(&bytes), Some(p));
    }

    #[test]
    fn shutter_round_trips() {
        let p = ShutterPayload {
            auto_ffc: true,
            temp_threshold_x10: 15,
            min_interval_s: 5,
            max_interval_s: 300,
        };
        let bytes = p.to_bytes();
        assert_eq!(ShutterPayload::from_bytes(&bytes), Some(p));
    }

    #[test]
    fn time_round_trips() {
        let p = TimePayload {
            sec: 1,
            min: 2,
            hour: 3,
            mday: 4,
            mon: 5,
            year_since_1900: 124,
            wday: 6,
            yday: 7,
            isdst: 0,
        };
        assert_eq!(TimePayload::from_bytes(&p.to_bytes()), Some(p));
    }

    #[test]
    fn timelapse_round_trips() {
        let p = TimelapsePayload {
            enable: true,
            notify: false,
            interval_s: 60,
            count: 100,
        };
        assert_eq!(TimelapsePayload::from_bytes(&p.to_bytes()), Some(p));
    }

    #[test]
    fn wifi_round_trips() {
        let p = WifiPayload {
            mdns: true,
            sta_mode: false,
            static_ip: true,
            ap_ssid: [0u8; 33],
            sta_ssid: [0u8; 33],
            ap_passphrase: [0u8; 64],
            sta_passphrase: [0u8; 64],
            ap_ip: [192, 168, 4, 1],
            sta_ip: [0, 0, 0, 0],
            sta_netmask: [255, 255, 255, 0],
        };
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), WifiPayload::LEN);
        assert_eq!(WifiPayload::from_bytes(&bytes), Some(p));
    }

    #[test]
    fn rejects_wrong_length() {
        assert_eq!(ShutterPayload::from_bytes(&[0u8; 5]), None);
    }
}

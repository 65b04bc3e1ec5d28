//! The closed, numerically stable command catalog (spec section 6).
//!
//! Ids are assigned in the exact order the catalog is listed in the spec;
//! that order is the stability contract, not the `#[repr]` discriminants
//! themselves — never renumber without a wire-format bump.

/// One id in the closed command catalog.
///
/// `CommandId as u32` is the wire id. New ids are appended at the end;
/// nothing is ever renumbered or removed once shipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandId {
    AmbientCorrect = 0,
    Backlight = 1,
    BattLevel = 2,
    Brightness = 3,
    CardPresent = 4,
    CritBatt = 5,
    CtrlActivity = 6,
    Emissivity = 7,
    Ffc = 8,
    FileCatalog = 9,
    FileDelete = 10,
    FileGetImage = 11,
    FwUpdEn = 12,
    FwUpdEnd = 13,
    Gain = 14,
    Image = 15,
    Time = 16,
    TimelapseCfg = 17,
    TimelapseStatus = 18,
    MinMaxEn = 19,
    MsgOn = 20,
    MsgOff = 21,
    Orientation = 22,
    Palette = 23,
    Poweroff = 24,
    RegionEn = 25,
    RegionLoc = 26,
    SaveBacklight = 27,
    SaveOvlEn = 28,
    SavePalette = 29,
    Shutdown = 30,
    ShutterInfo = 31,
    SpotEn = 32,
    SpotLoc = 33,
    StreamEn = 34,
    SysInfo = 35,
    TakePicture = 36,
    Units = 37,
    WifiInfo = 38,
}

/// Total number of ids in the catalog; also the size a dispatch table
/// indexed directly by id needs.
pub const CATALOG_LEN: usize = 39;

/// All ids in catalog order, for iterating a dispatch table or tests.
pub const ALL: [CommandId; CATALOG_LEN] = [
    CommandId::AmbientCorrect,
    CommandId::Backlight,
    CommandId::BattLevel,
    CommandId::Brightness,
    CommandId::CardPresent,
    CommandId::CritBatt,
    CommandId::CtrlActivity,
    CommandId::Emissivity,
    CommandId::Ffc,
    CommandId::FileCatalog,
    CommandId::FileDelete,
    CommandId::FileGetImage,
    CommandId::FwUpdEn,
    CommandId::FwUpdEnd,
    CommandId::Gain,
    CommandId::Image,
    CommandId::Time,
    CommandId::TimelapseCfg,
    CommandId::TimelapseStatus,
    CommandId::MinMaxEn,
    CommandId::MsgOn,
    CommandId::MsgOff,
    CommandId::Orientation,
    CommandId::Palette,
    CommandId::Poweroff,
    CommandId::RegionEn,
    CommandId::RegionLoc,
    CommandId::SaveBacklight,
    CommandId::SaveOvlEn,
    CommandId::SavePalette,
    CommandId::Shutdown,
    CommandId::ShutterInfo,
    CommandId::SpotEn,
    CommandId::SpotLoc,
    CommandId::StreamEn,
    CommandId::SysInfo,
    CommandId::TakePicture,
    CommandId::Units,
    CommandId::WifiInfo,
];

impl CommandId {
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    #[inline]
    pub const fn index(self) -> usize {
        self as u32 as usize
    }

    /// Map a wire id back to a catalog entry. `None` for any id outside the
    /// closed catalog — callers treat that as a protocol violation
    /// (spec section 7), never a panic.
    pub fn from_u32(id: u32) -> Option<Self> {
        ALL.get(id as usize).copied().filter(|c| c.as_u32() == id)
    }
}

/// Subcommand ids for [`CommandId::CtrlActivity`] (spec section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ControlActivity {
    RestoreDefaults = 0,
    Cal1Pt = 1,
    Cal2PtLow = 2,
    Cal2PtHigh = 3,
    SdFormat = 4,
}

impl ControlActivity {
    pub fn from_i32(v: i32) -> Option<Self> {
        Some(match v {
            0 => Self::RestoreDefaults,
            1 => Self::Cal1Pt,
            2 => Self::Cal2PtLow,
            3 => Self::Cal2PtHigh,
            4 => Self::SdFormat,
            _ => return None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_contiguous_and_stable() {
        for (i, id) in ALL.iter().enumerate() {
            assert_eq!(id.as_u32(), i as u32);
        }
        assert_eq!(CommandId::from_u32(0), Some(CommandId::AmbientCorrect));
        assert_eq!(CommandId::from_u32(38), Some(CommandId::WifiInfo));
        assert_eq!(CommandId::from_u32(39), None);
    }
}

use bincode::{Decode, Encode};
use pce_cd_proc_macros::{EnumAll, EnumDisplay, EnumFromStr};

/// Which system card (HuCard BIOS) is attached. Determines whether the Super CD-ROM²
/// signature is reported and whether Arcade Card ports are routed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Encode, Decode, EnumDisplay, EnumFromStr, EnumAll,
)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SystemCard {
    CdRom2,
    #[default]
    SuperCdRom2,
    ArcadeCard,
}

impl SystemCard {
    #[must_use]
    pub fn has_super_cd_signature(self) -> bool {
        matches!(self, Self::SuperCdRom2 | Self::ArcadeCard)
    }

    #[must_use]
    pub fn has_arcade_card(self) -> bool {
        self == Self::ArcadeCard
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PceCdConfig {
    pub system_card: SystemCard,
    /// Read every BIN file into memory when the disc is opened
    pub load_disc_into_ram: bool,
    /// Fail sector reads whose EDC does not match
    pub verify_data_checksums: bool,
}

impl Default for PceCdConfig {
    fn default() -> Self {
        Self {
            system_card: SystemCard::default(),
            load_disc_into_ram: false,
            verify_data_checksums: true,
        }
    }
}

//! PC Engine CD-ROM² interface unit: the subcontroller that sits between the CPU and the CD drive

pub mod adpcm;
pub mod api;
mod bram;
pub mod cdda;
pub mod fader;
mod registers;
pub mod scheduler;
pub mod scsi;
mod serialize;

#[cfg(test)]
mod tests;

pub use api::{PceCd, PceCdError, PceCdResult, ProtocolViolation};
pub use bram::BRAM_LEN;
pub use pce_cd_config::{PceCdConfig, SystemCard};

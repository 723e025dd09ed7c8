//! Battery-backed save RAM

use bincode::{Decode, Encode};

pub const BRAM_LEN: usize = 0x800;

// Freshly formatted BRAM: signature, then the end pointer ($8800) and the start of the first free
// entry ($8010)
const BRAM_HEADER: [u8; 8] = [b'H', b'U', b'B', b'M', 0x00, 0x88, 0x10, 0x80];

#[derive(Debug, Clone, Encode, Decode)]
pub struct Bram {
    ram: Box<[u8; BRAM_LEN]>,
    locked: bool,
    dirty: bool,
}

impl Bram {
    /// Load BRAM from a previously saved image, or create a formatted one if the image is missing
    /// or not a formatted 2 KiB BRAM.
    pub fn new(initial: Option<&[u8]>) -> Self {
        let ram = match initial {
            Some(initial) if initial.len() == BRAM_LEN && initial.starts_with(&BRAM_HEADER[..4]) => {
                let mut ram = Box::new([0; BRAM_LEN]);
                ram.copy_from_slice(initial);
                ram
            }
            _ => {
                if initial.is_some() {
                    log::warn!("Ignoring invalid BRAM image; initializing formatted BRAM instead");
                }
                new_formatted_bram()
            }
        };

        Self { ram, locked: true, dirty: false }
    }

    pub fn read(&self, offset: u16) -> u8 {
        if self.locked {
            return 0xFF;
        }

        self.ram[usize::from(offset) & (BRAM_LEN - 1)]
    }

    pub fn write(&mut self, offset: u16, value: u8) {
        if self.locked {
            log::trace!("Ignoring BRAM write while locked: {offset:03X} {value:02X}");
            return;
        }

        let byte = &mut self.ram[usize::from(offset) & (BRAM_LEN - 1)];
        if *byte != value {
            *byte = value;
            self.dirty = true;
        }
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn contents(&self) -> &[u8; BRAM_LEN] {
        &self.ram
    }

    /// Returns whether BRAM has changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }
}

// Boxing is desired so that the controller struct stays small to move around
#[allow(clippy::unnecessary_box_returns)]
fn new_formatted_bram() -> Box<[u8; BRAM_LEN]> {
    let mut ram = Box::new([0; BRAM_LEN]);
    ram[..BRAM_HEADER.len()].copy_from_slice(&BRAM_HEADER);
    ram
}

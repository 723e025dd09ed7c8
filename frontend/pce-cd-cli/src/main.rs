use anyhow::{Context, anyhow};
use cdrom::cdtime::{self, CdTime, LEAD_IN_FRAMES};
use cdrom::cue::TrackType;
use cdrom::reader::CdRom;
use clap::{Parser, Subcommand};
use env_logger::Env;
use pce_cd_config::{PceCdConfig, SystemCard};
use pce_cd_core::PceCd;
use pce_cd_core::api::{AdpcmClock, AudioTrackPlayer};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

// One PC Engine scanline
const MCLK_STEP: u64 = 1364;

// Two seconds of master clock
const WAIT_TIMEOUT_MCLK: u64 = 2 * pce_cd_core::api::MASTER_CLOCK_RATE;

#[derive(Parser)]
struct Args {
    /// CUE file path
    #[arg(short = 'f', long)]
    file_path: PathBuf,

    /// TOML config file; command-line flags override its values
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// System card (CdRom2 / SuperCdRom2 / ArcadeCard)
    #[arg(long)]
    system_card: Option<SystemCard>,

    /// Read every BIN file into memory before running
    #[arg(long, default_value_t)]
    load_disc_into_ram: bool,

    /// Do not verify EDC checksums on data sectors
    #[arg(long, default_value_t)]
    no_verify_checksums: bool,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Print the table of contents as reported by GET DIR INFO
    Toc,
    /// Read data sectors through READ(6) and write them to a file
    ReadSectors {
        /// First sector (LBA)
        #[arg(long)]
        frame: u32,

        /// Number of sectors
        #[arg(long, default_value_t = 1)]
        count: u32,

        /// Output file path
        #[arg(short = 'o', long)]
        output: PathBuf,
    },
    /// Start CD-DA playback of a track, query its position, and pause it
    PlayTrack {
        #[arg(long)]
        track: u8,
    },
}

impl Args {
    fn pce_cd_config(&self) -> anyhow::Result<PceCdConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = fs::read_to_string(path)
                    .with_context(|| format!("Unable to read config file '{}'", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Unable to parse config file '{}'", path.display()))?
            }
            None => PceCdConfig::default(),
        };

        if let Some(system_card) = self.system_card {
            config.system_card = system_card;
        }
        config.load_disc_into_ram |= self.load_disc_into_ram;
        if self.no_verify_checksums {
            config.verify_data_checksums = false;
        }

        Ok(config)
    }
}

// The CLI has no audio output; playback position is tracked for subchannel Q only
#[derive(Debug, Default)]
struct SilentPlayer {
    frame: u32,
}

impl AudioTrackPlayer for SilentPlayer {
    fn start(&mut self, frame: u32, frame_count: u32) {
        log::info!("CD-DA start at frame {frame} for {frame_count} frames");
        self.frame = frame;
    }

    fn pause(&mut self, paused: bool) {
        log::info!("CD-DA paused={paused}");
    }

    fn stop(&mut self) {
        log::debug!("CD-DA stop");
    }

    fn current_frame(&self) -> u32 {
        self.frame
    }

    fn has_ended_since_last_poll(&mut self) -> bool {
        false
    }

    fn set_volume(&mut self, volume: f32) {
        log::debug!("CD-DA volume {volume}");
    }
}

#[derive(Debug, Default)]
struct SilentAdpcm;

impl AdpcmClock for SilentAdpcm {
    fn supply_nibble(&mut self, _nibble: u8) {}

    fn set_clock_divider(&mut self, _divider: u8) {}

    fn reset(&mut self, _asserted: bool) {}

    fn set_volume(&mut self, _volume: f32) {}
}

const BSY: u8 = 0x80;
const REQ: u8 = 0x40;
const MSG: u8 = 0x20;
const CD: u8 = 0x10;
const IO: u8 = 0x08;

/// Drives the controller through its registers the way the system card BIOS does.
struct Host {
    cd: PceCd<CdRom, SilentPlayer, SilentAdpcm>,
}

impl Host {
    fn phase(&mut self) -> u8 {
        self.cd.read(0x00) & (BSY | REQ | MSG | CD | IO)
    }

    fn set_ack(&mut self, ack: bool) {
        let mask = self.cd.read(0x02) & 0x7F;
        self.cd.write(0x02, mask | if ack { 0x80 } else { 0x00 });
    }

    fn handshake(&mut self) {
        self.set_ack(true);
        self.set_ack(false);
    }

    fn wait_for_req(&mut self) -> anyhow::Result<u8> {
        let mut waited = 0;
        loop {
            let phase = self.phase();
            if phase & REQ != 0 {
                return Ok(phase);
            }

            if waited >= WAIT_TIMEOUT_MCLK {
                return Err(anyhow!("Timed out waiting for REQ; bus phase {phase:02X}"));
            }

            self.cd.tick(MCLK_STEP)?;
            waited += MCLK_STEP;
        }
    }

    /// Send a command and run it to completion, returning any data-in bytes and the status byte.
    fn execute(&mut self, command: &[u8]) -> anyhow::Result<(Vec<u8>, u8)> {
        log::debug!("Sending command {command:02X?}");

        self.cd.write(0x00, 0x81);
        for &byte in command {
            let phase = self.wait_for_req()?;
            if phase != BSY | REQ | CD {
                return Err(anyhow!("Drive not accepting command bytes; bus phase {phase:02X}"));
            }

            self.cd.write(0x01, byte);
            self.handshake();
        }

        let mut data = Vec::new();
        loop {
            let phase = self.wait_for_req()?;
            match phase {
                _ if phase == BSY | REQ | IO => data.push(self.cd.read(0x08)),
                _ if phase == BSY | REQ | CD | IO => break,
                _ => return Err(anyhow!("Unexpected bus phase {phase:02X}")),
            }
        }

        let status = self.cd.read(0x01);
        self.handshake();

        let phase = self.wait_for_req()?;
        if phase != BSY | REQ | MSG | CD | IO {
            return Err(anyhow!("Expected message phase, got bus phase {phase:02X}"));
        }
        self.handshake();

        Ok((data, status))
    }

    fn execute_expecting_good(&mut self, command: &[u8]) -> anyhow::Result<Vec<u8>> {
        let (data, status) = self.execute(command)?;
        if status != 0x00 {
            return Err(anyhow!("Command {:02X} failed with status {status:02X}", command[0]));
        }
        Ok(data)
    }
}

fn msf_from_bcd(bytes: &[u8]) -> anyhow::Result<CdTime> {
    CdTime::from_bcd(bytes[0], bytes[1], bytes[2])
        .ok_or_else(|| anyhow!("Drive returned invalid BCD time {:02X?}", &bytes[..3]))
}

fn print_toc(host: &mut Host) -> anyhow::Result<()> {
    let first_last = host.execute_expecting_good(&[0xDE, 0x00, 0, 0, 0, 0, 0, 0, 0, 0])?;
    let length = host.execute_expecting_good(&[0xDE, 0x01, 0, 0, 0, 0, 0, 0, 0, 0])?;

    let first = cdtime::bcd_to_binary(first_last[0]).unwrap_or(1);
    let last = cdtime::bcd_to_binary(first_last[1]).unwrap_or(1);
    println!("Tracks {first}-{last}, disc length {}", msf_from_bcd(&length)?);

    for track in first..=last {
        let info = host.execute_expecting_good(&[
            0xDE,
            0x02,
            cdtime::binary_to_bcd(track),
            0,
            0,
            0,
            0,
            0,
            0,
            0,
        ])?;
        let start = msf_from_bcd(&info)?;
        let track_type = if info[3] & 0x04 != 0 { TrackType::Data } else { TrackType::Audio };
        println!(
            "  Track {track:02}: {track_type:?} at {start} (LBA {})",
            start.to_frames().saturating_sub(LEAD_IN_FRAMES)
        );
    }

    Ok(())
}

fn read_sectors(host: &mut Host, frame: u32, count: u32, output: &Path) -> anyhow::Result<()> {
    let mut file = fs::File::create(output)
        .with_context(|| format!("Unable to create output file '{}'", output.display()))?;

    let mut frame = frame;
    let mut remaining = count;
    while remaining != 0 {
        let chunk = remaining.min(u8::MAX.into());
        let [_, b1, b2, b3] = frame.to_be_bytes();
        let data = host.execute_expecting_good(&[0x08, b1 & 0x1F, b2, b3, chunk as u8, 0x00])?;
        file.write_all(&data)?;

        log::info!("Read {} bytes from sectors {frame}-{}", data.len(), frame + chunk - 1);

        frame += chunk;
        remaining -= chunk;
    }

    println!("Wrote {count} sectors to '{}'", output.display());

    Ok(())
}

fn print_subchannel_q(host: &mut Host) -> anyhow::Result<()> {
    let subq = host.execute_expecting_good(&[0xDD, 0, 0, 0, 0, 0, 0, 0, 0, 0])?;
    let status = match subq[0] {
        0x00 => "playing",
        0x02 => "paused",
        _ => "stopped",
    };
    println!(
        "{status}: track {:02X} index {:02X} relative {} absolute {}",
        subq[2],
        subq[3],
        msf_from_bcd(&subq[4..7])?,
        msf_from_bcd(&subq[7..10])?
    );

    Ok(())
}

fn play_track(host: &mut Host, track: u8) -> anyhow::Result<()> {
    let bcd_track = cdtime::binary_to_bcd(track);

    // Start at the track and play to the end of the disc, then stop at the next track
    host.execute_expecting_good(&[0xD8, 0x01, bcd_track, 0, 0, 0, 0, 0, 0, 0x80])?;
    let next_track = cdtime::binary_to_bcd(track.saturating_add(1));
    if host.execute(&[0xD9, 0x03, next_track, 0, 0, 0, 0, 0, 0, 0x80])?.1 != 0x00 {
        log::info!("Track {track} is the last track; playing to the end of the disc");
    }
    print_subchannel_q(host)?;

    host.execute_expecting_good(&[0xDA, 0, 0, 0, 0, 0, 0, 0, 0, 0])?;
    print_subchannel_q(host)?;

    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.pce_cd_config()?;

    log::info!("Running with config {config:?}");

    let disc = if config.load_disc_into_ram {
        CdRom::open_in_memory(&args.file_path)
    } else {
        CdRom::open(&args.file_path)
    }
    .with_context(|| format!("Unable to open disc image '{}'", args.file_path.display()))?
    .with_checksum_verification(config.verify_data_checksums);

    let cd = PceCd::new(config, Some(disc), SilentPlayer::default(), SilentAdpcm, None);
    let mut host = Host { cd };

    match args.command {
        CliCommand::Toc => print_toc(&mut host),
        CliCommand::ReadSectors { frame, count, output } => {
            read_sectors(&mut host, frame, count, &output)
        }
        CliCommand::PlayTrack { track } => play_track(&mut host, track),
    }
}

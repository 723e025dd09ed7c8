//! CD-DA and ADPCM volume fades selected through register $0F

use crate::scheduler::{
    FADE_PERIOD_100_US, FADE_PERIOD_1500_US, FADE_PERIOD_5000_US, TimerEvent,
};
use bincode::{Decode, Encode};

pub const MAX_VOLUME: f32 = 100.0;
const FADE_STEP: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeChannel {
    CdDa,
    Adpcm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

impl FadeDirection {
    fn initial_volume(self) -> f32 {
        match self {
            Self::In => 0.0,
            Self::Out => MAX_VOLUME,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeStart {
    pub channel: FadeChannel,
    pub direction: FadeDirection,
    pub period: u64,
}

impl FadeStart {
    const fn new(channel: FadeChannel, direction: FadeDirection, period: u64) -> Self {
        Self { channel, direction, period }
    }

    pub fn timer(self) -> TimerEvent {
        fade_timer(self.channel, self.direction)
    }
}

pub fn fade_timer(channel: FadeChannel, direction: FadeDirection) -> TimerEvent {
    match (channel, direction) {
        (FadeChannel::CdDa, FadeDirection::In) => TimerEvent::CddaFadeIn,
        (FadeChannel::CdDa, FadeDirection::Out) => TimerEvent::CddaFadeOut,
        (FadeChannel::Adpcm, FadeDirection::In) => TimerEvent::AdpcmFadeIn,
        (FadeChannel::Adpcm, FadeDirection::Out) => TimerEvent::AdpcmFadeOut,
    }
}

/// Map a fade timer back to its channel and direction.
pub fn timer_fade(event: TimerEvent) -> Option<(FadeChannel, FadeDirection)> {
    match event {
        TimerEvent::CddaFadeIn => Some((FadeChannel::CdDa, FadeDirection::In)),
        TimerEvent::CddaFadeOut => Some((FadeChannel::CdDa, FadeDirection::Out)),
        TimerEvent::AdpcmFadeIn => Some((FadeChannel::Adpcm, FadeDirection::In)),
        TimerEvent::AdpcmFadeOut => Some((FadeChannel::Adpcm, FadeDirection::Out)),
        _ => None,
    }
}

/// Fades started by a fade program nibble, or `None` if the program is not supported.
pub fn fade_program(program: u8) -> Option<&'static [FadeStart]> {
    use FadeChannel::{Adpcm, CdDa};
    use FadeDirection::{In, Out};

    const BOTH_IN: &[FadeStart] = &[
        FadeStart::new(CdDa, In, FADE_PERIOD_100_US),
        FadeStart::new(Adpcm, In, FADE_PERIOD_100_US),
    ];
    const CDDA_IN: &[FadeStart] = &[FadeStart::new(CdDa, In, FADE_PERIOD_100_US)];
    const CDDA_SHORT_OUT_ADPCM_IN: &[FadeStart] = &[
        FadeStart::new(CdDa, Out, FADE_PERIOD_1500_US),
        FadeStart::new(Adpcm, In, FADE_PERIOD_100_US),
    ];
    const CDDA_LONG_OUT: &[FadeStart] = &[FadeStart::new(CdDa, Out, FADE_PERIOD_5000_US)];
    const ADPCM_LONG_OUT: &[FadeStart] = &[FadeStart::new(Adpcm, Out, FADE_PERIOD_5000_US)];
    const CDDA_SHORT_OUT: &[FadeStart] = &[FadeStart::new(CdDa, Out, FADE_PERIOD_1500_US)];
    const ADPCM_SHORT_OUT: &[FadeStart] = &[FadeStart::new(Adpcm, Out, FADE_PERIOD_1500_US)];

    match program & 0x0F {
        0x0 => Some(BOTH_IN),
        0x1 => Some(CDDA_IN),
        0x8 | 0xC => Some(CDDA_SHORT_OUT_ADPCM_IN),
        0x9 => Some(CDDA_LONG_OUT),
        0xA => Some(ADPCM_LONG_OUT),
        0xD => Some(CDDA_SHORT_OUT),
        0xE => Some(ADPCM_SHORT_OUT),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Encode, Decode)]
pub struct FadeState {
    pub volume: f32,
    pub active: bool,
}

impl Default for FadeState {
    fn default() -> Self {
        Self { volume: MAX_VOLUME, active: false }
    }
}

#[derive(Debug, Clone, Default, Encode, Decode)]
pub struct Fader {
    cdda: FadeState,
    adpcm: FadeState,
}

impl Fader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cdda(&self) -> FadeState {
        self.cdda
    }

    pub fn adpcm(&self) -> FadeState {
        self.adpcm
    }

    fn state_mut(&mut self, channel: FadeChannel) -> &mut FadeState {
        match channel {
            FadeChannel::CdDa => &mut self.cdda,
            FadeChannel::Adpcm => &mut self.adpcm,
        }
    }

    /// Begin a fade from its direction's starting bound. Returns the new volume.
    pub fn start(&mut self, fade: FadeStart) -> f32 {
        let state = self.state_mut(fade.channel);
        state.volume = fade.direction.initial_volume();
        state.active = true;
        state.volume
    }

    /// Advance a fade by one step. Returns the new volume and whether the fade reached its bound.
    pub fn step(&mut self, channel: FadeChannel, direction: FadeDirection) -> (f32, bool) {
        let state = self.state_mut(channel);

        let (volume, done) = match direction {
            FadeDirection::In => {
                let volume = state.volume + FADE_STEP;
                if volume >= MAX_VOLUME { (MAX_VOLUME, true) } else { (volume, false) }
            }
            FadeDirection::Out => {
                let volume = state.volume - FADE_STEP;
                if volume <= 0.0 { (0.0, true) } else { (volume, false) }
            }
        };

        state.volume = volume;
        state.active = !done;

        (volume, done)
    }
}

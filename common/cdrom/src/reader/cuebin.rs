//! CUE/BIN images: CUE sheet parsing, disc layout, and sector reads from the BIN files


use crate::cdtime::CdTime;
use crate::cue::{Toc, Track, TrackMode};
use crate::{CdRomError, CdRomResult, CueKeyword, ImageAccess};
use regex::Regex;
use std::fs;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::LazyLock;

/// Where a track's INDEX 01 sector lives among the opened BIN files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TrackExtent {
    file_index: usize,
    byte_offset: u64,
    sector_len: u64,
}

#[derive(Debug)]
struct BinHandle<F> {
    reader: BufReader<F>,
    // Where the next sequential read will land, to skip redundant seeks
    cursor: u64,
}

#[derive(Debug)]
pub struct CdBinFiles<F: Read + Seek> {
    handles: Vec<BinHandle<F>>,
    extents: Vec<TrackExtent>,
}

fn image_error(access: ImageAccess, path: &Path) -> impl FnOnce(io::Error) -> CdRomError {
    let path = path.display().to_string();
    move |source| CdRomError::Image { access, path, source }
}

impl<F: Read + Seek> CdBinFiles<F> {
    /// Load the CUE sheet at `cue_path`, lay out its tracks, and open each BIN file it names
    /// with `open_bin`. BIN paths are resolved relative to the CUE file's directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the CUE sheet is malformed or describes an impossible layout, or if
    /// any file cannot be read.
    pub fn create<OpenFn, P: AsRef<Path>>(cue_path: P, open_bin: OpenFn) -> CdRomResult<(Self, Toc)>
    where
        OpenFn: Fn(&Path) -> io::Result<F>,
    {
        let cue_path = cue_path.as_ref();
        let sheet = fs::read_to_string(cue_path)
            .map_err(image_error(ImageAccess::ReadCue, cue_path))?;
        let bin_dir = cue_path
            .parent()
            .ok_or_else(|| CdRomError::CueNoParentDir(cue_path.display().to_string()))?;

        let cue_files = parse_cue_sheet(&sheet)?;

        let (toc, extents) = layout(&cue_files, |name| {
            let bin_path = bin_dir.join(name);
            fs::metadata(&bin_path)
                .map(|metadata| metadata.len())
                .map_err(image_error(ImageAccess::StatBin, &bin_path))
        })?;

        let handles = cue_files
            .iter()
            .map(|cue_file| {
                let bin_path = bin_dir.join(&cue_file.name);
                let file =
                    open_bin(&bin_path).map_err(image_error(ImageAccess::OpenBin, &bin_path))?;
                Ok(BinHandle { reader: BufReader::new(file), cursor: 0 })
            })
            .collect::<CdRomResult<Vec<_>>>()?;

        Ok((Self { handles, extents }, toc))
    }

    /// Fill `out` from the start of sector `relative_frame` of a track, counting from its INDEX 01.
    /// `out` must be no longer than the track's sector length.
    pub(crate) fn read_sector(
        &mut self,
        track_number: u8,
        relative_frame: u32,
        out: &mut [u8],
    ) -> CdRomResult<()> {
        let extent = self.extents[usize::from(track_number - 1)];
        let handle = &mut self.handles[extent.file_index];

        let addr = extent.byte_offset + u64::from(relative_frame) * extent.sector_len;
        if handle.cursor != addr {
            handle.reader.seek(SeekFrom::Start(addr)).map_err(CdRomError::SectorRead)?;
        }
        handle.reader.read_exact(out).map_err(CdRomError::SectorRead)?;
        handle.cursor = addr + out.len() as u64;

        Ok(())
    }
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
struct CueTrack {
    number: u8,
    mode: TrackMode,
    // Silence the drive inserts ahead of the track; not stored in the BIN file
    pregap: Option<CdTime>,
    index_00: Option<CdTime>,
    index_01: CdTime,
}

#[derive(Debug, Clone)]
#[cfg_attr(test, derive(PartialEq, Eq))]
struct CueFile {
    name: String,
    tracks: Vec<CueTrack>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum CueLine {
    File(String),
    Track(u8, TrackMode),
    Index(u8, CdTime),
    Pregap(CdTime),
}

impl CueLine {
    /// Returns `Ok(None)` for lines that do not affect the layout (REM, CATALOG, FLAGS, ...).
    fn parse(line: &str) -> CdRomResult<Option<Self>> {
        static FILE_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r#"^"(.*)"\s+BINARY$"#).unwrap());

        let line = line.trim();
        let Some((keyword, rest)) = line.split_once(char::is_whitespace) else {
            return Ok(None);
        };
        let Ok(keyword) = keyword.parse::<CueKeyword>() else {
            return Ok(None);
        };
        let rest = rest.trim();

        let syntax_error = || CdRomError::CueSyntax { keyword, line: line.into() };

        let parsed = match keyword {
            CueKeyword::File => {
                let captures = FILE_RE.captures(rest).ok_or_else(syntax_error)?;
                Self::File(captures[1].into())
            }
            CueKeyword::Track => {
                let (number, mode) = rest.split_once(' ').ok_or_else(syntax_error)?;
                let number = number.parse().map_err(|_| syntax_error())?;
                let mode = mode.trim().parse().map_err(|_| syntax_error())?;
                Self::Track(number, mode)
            }
            CueKeyword::Index => {
                let (number, time) = rest.split_once(' ').ok_or_else(syntax_error)?;
                let number = number.parse().map_err(|_| syntax_error())?;
                let time = time.trim().parse().map_err(|_| syntax_error())?;
                Self::Index(number, time)
            }
            CueKeyword::Pregap => Self::Pregap(rest.parse().map_err(|_| syntax_error())?),
        };

        Ok(Some(parsed))
    }
}

#[derive(Debug, Clone, Copy)]
struct OpenTrack {
    number: u8,
    mode: TrackMode,
    pregap: Option<CdTime>,
    index_00: Option<CdTime>,
    index_01: Option<CdTime>,
}

impl OpenTrack {
    fn close(self) -> CdRomResult<CueTrack> {
        let index_01 = self.index_01.ok_or_else(|| {
            CdRomError::CueLayout(format!("Track {} has no INDEX 01", self.number))
        })?;

        Ok(CueTrack {
            number: self.number,
            mode: self.mode,
            pregap: self.pregap,
            index_00: self.index_00,
            index_01,
        })
    }
}

#[derive(Debug, Default)]
struct CueSheetBuilder {
    files: Vec<CueFile>,
    open_track: Option<OpenTrack>,
    next_track_number: u8,
}

impl CueSheetBuilder {
    fn apply(&mut self, line: CueLine) -> CdRomResult<()> {
        match line {
            CueLine::File(name) => {
                self.close_track()?;
                self.ensure_last_file_has_tracks()?;
                self.files.push(CueFile { name, tracks: Vec::new() });
            }
            CueLine::Track(number, mode) => {
                self.close_track()?;
                if self.files.is_empty() {
                    return Err(CdRomError::CueLayout(format!("Track {number} precedes any FILE")));
                }

                let expected = self.next_track_number.max(1);
                if number != expected {
                    return Err(CdRomError::CueLayout(format!(
                        "Expected track {expected:02}, found track {number:02}"
                    )));
                }
                self.next_track_number = expected + 1;

                self.open_track =
                    Some(OpenTrack { number, mode, pregap: None, index_00: None, index_01: None });
            }
            CueLine::Index(index, time) => {
                let Some(track) = &mut self.open_track else {
                    return Err(CdRomError::CueLayout("INDEX outside of a track".into()));
                };
                match index {
                    0 => track.index_00 = Some(time),
                    1 => track.index_01 = Some(time),
                    // Sub-indices past 01 do not affect the layout
                    _ => {}
                }
            }
            CueLine::Pregap(len) => {
                let Some(track) = &mut self.open_track else {
                    return Err(CdRomError::CueLayout("PREGAP outside of a track".into()));
                };
                track.pregap = Some(len);
            }
        }

        Ok(())
    }

    fn close_track(&mut self) -> CdRomResult<()> {
        if let Some(open_track) = self.open_track.take() {
            let track = open_track.close()?;
            if let Some(file) = self.files.last_mut() {
                file.tracks.push(track);
            }
        }

        Ok(())
    }

    fn ensure_last_file_has_tracks(&self) -> CdRomResult<()> {
        match self.files.last() {
            Some(file) if file.tracks.is_empty() => {
                Err(CdRomError::CueLayout(format!("FILE '{}' lists no tracks", file.name)))
            }
            _ => Ok(()),
        }
    }

    fn finish(mut self) -> CdRomResult<Vec<CueFile>> {
        self.close_track()?;
        self.ensure_last_file_has_tracks()?;

        if self.files.is_empty() {
            return Err(CdRomError::CueLayout("CUE sheet lists no files".into()));
        }

        Ok(self.files)
    }
}

fn parse_cue_sheet(sheet: &str) -> CdRomResult<Vec<CueFile>> {
    let mut builder = CueSheetBuilder::default();
    for line in sheet.lines() {
        if let Some(cue_line) = CueLine::parse(line)? {
            builder.apply(cue_line)?;
        }
    }
    builder.finish()
}

/// Assign every track its LBA range. Files follow one another on the disc; PREGAP directives
/// add frames that appear on the disc but in no file, while INDEX 00 pauses are file data.
fn layout<LenFn>(cue_files: &[CueFile], file_len: LenFn) -> CdRomResult<(Toc, Vec<TrackExtent>)>
where
    LenFn: Fn(&str) -> CdRomResult<u64>,
{
    let mut disc_frame = 0;
    let mut tracks = Vec::new();
    let mut extents = Vec::new();

    for (file_index, cue_file) in cue_files.iter().enumerate() {
        let sector_len = cue_file.tracks[0].mode.sector_len();
        if let Some(odd) = cue_file.tracks.iter().find(|track| track.mode.sector_len() != sector_len)
        {
            return Err(CdRomError::CueLayout(format!(
                "Track {} in '{}' has a different sector size than the file's first track",
                odd.number, cue_file.name
            )));
        }

        let file_frames = (file_len(&cue_file.name)? / sector_len) as u32;

        for (track, next) in cue_file
            .tracks
            .iter()
            .zip(cue_file.tracks.iter().skip(1).map(Some).chain([None]))
        {
            let pregap_frames = track.pregap.map_or(0, CdTime::to_frames);
            disc_frame += pregap_frames;

            let start = track.index_01.to_frames();
            let end = next.map_or(file_frames, |next| {
                next.index_00.unwrap_or(next.index_01).to_frames()
            });
            let Some(frame_count) = end.checked_sub(start) else {
                return Err(CdRomError::CueLayout(format!(
                    "Track {} starts after the data that follows it",
                    track.number
                )));
            };
            let pause_frames =
                track.index_00.map_or(0, |index_00| start.saturating_sub(index_00.to_frames()));

            tracks.push(Track {
                number: track.number,
                mode: track.mode,
                track_type: track.mode.to_type(),
                start_frame: disc_frame + start,
                frame_count,
                pregap_frames: pregap_frames + pause_frames,
            });
            extents.push(TrackExtent {
                file_index,
                byte_offset: u64::from(start) * sector_len,
                sector_len,
            });
        }

        disc_frame += file_frames;
    }

    log::trace!("Disc layout from CUE sheet: {tracks:#?}");

    Ok((Toc::new(tracks), extents))
}

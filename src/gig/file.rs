//! In-memory .gig model and the metadata commit
//!
//! The file owns a sample pool and a list of instruments. Regions point at
//! pool samples by id. Saving writes every structure plus a zero-filled,
//! correctly sized data area per sample; audio is streamed into those areas
//! afterwards through [`SavedGig::sample_writer`].

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use log::debug;
use crate::error::{MkgigError, Result};
use super::riff::{self, Body, Chunk};
use super::sample::{SampleSlot, SampleWriter};

/// Version written to the `vers` chunk (major, minor).
pub const FILE_VERSION: (u16, u16) = (2, 0);

pub const DEFAULT_GROUP_NAME: &str = "Default Group";

/// Unity note used when none is set.
pub const DEFAULT_UNITY_NOTE: u16 = 60;

/// Dimension regions a region can hold.
pub const MAX_DIMENSION_REGIONS: usize = 32;

const DIMENSION_SLOTS: usize = 5;
const WAVE_FORMAT_PCM: u16 = 1;
const WAVELINK_CHANNEL_LEFT: u32 = 1;
const NO_SAMPLE: u32 = 0xFFFF_FFFF;
const GROUP_NAME_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub low: u16,
    pub high: u16,
}

impl Range {
    pub fn new(low: u16, high: u16) -> Self {
        Self { low, high }
    }

    pub fn full() -> Self {
        Self { low: 0, high: 127 }
    }

    fn is_valid(&self) -> bool {
        self.low <= self.high && self.high <= 127
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrumentId(usize);

impl SampleId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Sample descriptor as stored in the wave pool
#[derive(Debug, Clone, Default)]
pub struct Sample {
    name: String,
    channels: u16,
    bit_depth: u16,
    frame_size: u16,
    sample_rate: u32,
    average_bytes_per_second: u32,
    block_align: u16,
    total_frames: u64,
    sized_frames: Option<u64>,
    group: u16,
}

impl Sample {
    pub fn set_name<S: Into<String>>(&mut self, name: S) { self.name = name.into(); }
    pub fn set_channels(&mut self, channels: u16) { self.channels = channels; }
    pub fn set_bit_depth(&mut self, bits: u16) { self.bit_depth = bits; }
    pub fn set_frame_size(&mut self, bytes: u16) { self.frame_size = bytes; }
    pub fn set_sample_rate(&mut self, rate: u32) { self.sample_rate = rate; }
    pub fn set_average_bytes_per_second(&mut self, rate: u32) { self.average_bytes_per_second = rate; }
    pub fn set_block_align(&mut self, bytes: u16) { self.block_align = bytes; }
    pub fn set_total_frames(&mut self, frames: u64) { self.total_frames = frames; }

    /// Size the data area for `frames` frames. Required before saving.
    pub fn resize(&mut self, frames: u64) {
        self.sized_frames = Some(frames);
    }

    pub fn name(&self) -> &str { &self.name }
    pub fn channels(&self) -> u16 { self.channels }
    pub fn bit_depth(&self) -> u16 { self.bit_depth }
    pub fn frame_size(&self) -> u16 { self.frame_size }
    pub fn sample_rate(&self) -> u32 { self.sample_rate }
    pub fn average_bytes_per_second(&self) -> u32 { self.average_bytes_per_second }
    pub fn block_align(&self) -> u16 { self.block_align }
    pub fn total_frames(&self) -> u64 { self.total_frames }
    pub fn sized_frames(&self) -> Option<u64> { self.sized_frames }

    fn validate(&self) -> Result<()> {
        let fail = |what: String| Err(MkgigError::container(format!("sample '{}': {}", self.name, what)));

        match self.sized_frames {
            None => return fail("not resized before save".into()),
            Some(frames) if frames != self.total_frames => {
                return fail(format!("sized for {} frames but declares {}", frames, self.total_frames));
            }
            _ => {}
        }
        if self.channels == 0 || self.bit_depth == 0 || self.bit_depth % 8 != 0 {
            return fail(format!("invalid format {} ch / {} bit", self.channels, self.bit_depth));
        }
        if self.frame_size as u32 != (self.bit_depth / 8) as u32 * self.channels as u32 {
            return fail(format!("frame size {} does not match format", self.frame_size));
        }
        if self.block_align != self.frame_size {
            return fail(format!("block align {} differs from frame size", self.block_align));
        }
        self.data_len().map(|_| ())
    }

    fn data_len(&self) -> Result<u32> {
        self.total_frames
            .checked_mul(self.frame_size as u64)
            .and_then(|len| u32::try_from(len).ok())
            .ok_or_else(|| {
                MkgigError::container(format!(
                    "sample '{}' is too large ({} frames of {} bytes)", self.name, self.total_frames, self.frame_size
                ))
            })
    }

    fn wave_chunk(&self) -> Result<Chunk> {
        let fmt = Body::new()
            .u16(WAVE_FORMAT_PCM)
            .u16(self.channels)
            .u32(self.sample_rate)
            .u32(self.average_bytes_per_second)
            .u16(self.block_align)
            .u16(self.bit_depth)
            .finish();

        let period_ns = if self.sample_rate > 0 { 1_000_000_000 / self.sample_rate } else { 0 };
        let smpl = Body::new()
            .u32(0) // manufacturer
            .u32(0) // product
            .u32(period_ns)
            .u32(DEFAULT_UNITY_NOTE as u32)
            .u32(0) // pitch fraction
            .u32(0) // SMPTE format
            .u32(0) // SMPTE offset
            .u32(0) // loops
            .u32(0) // sampler data
            .finish();

        Ok(Chunk::list(b"wave", vec![
            Chunk::data(b"fmt ", fmt),
            Chunk::list(b"INFO", vec![Chunk::zstr(b"INAM", &self.name)]),
            Chunk::data(b"smpl", smpl),
            Chunk::data(b"3gix", Body::new().u16(self.group).finish()),
            Chunk::Reserved { id: *b"data", len: self.data_len()? },
        ]))
    }
}

/// One velocity/controller split of a region
#[derive(Debug, Clone, Default)]
pub struct DimensionRegion {
    pub sample: Option<SampleId>,
    pub unity_note: Option<u16>,
}

#[derive(Debug, Clone)]
pub struct Region {
    pub key_range: Range,
    pub velocity_range: Range,
    sample: Option<SampleId>,
    dimension_regions: Vec<DimensionRegion>,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            key_range: Range::full(),
            velocity_range: Range::full(),
            sample: None,
            dimension_regions: vec![DimensionRegion::default()],
        }
    }
}

impl Region {
    /// Link `sample` to the region and to its first dimension region.
    pub fn set_sample(&mut self, sample: SampleId) {
        self.sample = Some(sample);
        if let Some(first) = self.dimension_regions.first_mut() {
            first.sample = Some(sample);
        }
    }

    pub fn sample(&self) -> Option<SampleId> {
        self.sample
    }

    pub fn dimension_regions(&self) -> &[DimensionRegion] {
        &self.dimension_regions
    }

    pub fn dimension_region_mut(&mut self, index: usize) -> Option<&mut DimensionRegion> {
        self.dimension_regions.get_mut(index)
    }

    fn validate(&self, pool_len: usize) -> Result<()> {
        if !self.key_range.is_valid() || !self.velocity_range.is_valid() {
            return Err(MkgigError::container(format!(
                "region ranges out of bounds: key {:?}, velocity {:?}", self.key_range, self.velocity_range
            )));
        }
        if self.dimension_regions.is_empty() || self.dimension_regions.len() > MAX_DIMENSION_REGIONS {
            return Err(MkgigError::container(format!(
                "region has {} dimension regions", self.dimension_regions.len()
            )));
        }

        let linked = std::iter::once(self.sample).chain(self.dimension_regions.iter().map(|d| d.sample));
        for id in linked.flatten() {
            if id.0 >= pool_len {
                return Err(MkgigError::container(format!("region references missing sample #{}", id.0)));
            }
        }
        if self.sample.is_none() {
            return Err(MkgigError::container("region has no sample"));
        }
        Ok(())
    }

    fn chunk(&self) -> Chunk {
        let pool_index = |id: Option<SampleId>| id.map_or(NO_SAMPLE, |s| s.0 as u32);

        let rgnh = Body::new()
            .u16(self.key_range.low)
            .u16(self.key_range.high)
            .u16(self.velocity_range.low)
            .u16(self.velocity_range.high)
            .u16(0) // options
            .u16(0) // key group
            .u16(0) // layer
            .finish();

        let wlnk = Body::new()
            .u16(0) // options
            .u16(0) // phase group
            .u32(WAVELINK_CHANNEL_LEFT)
            .u32(pool_index(self.sample))
            .finish();

        let mut lnk = Body::new()
            .u32(self.dimension_regions.len() as u32)
            .zeros(DIMENSION_SLOTS * 8);
        for i in 0..MAX_DIMENSION_REGIONS {
            lnk = lnk.u32(pool_index(self.dimension_regions.get(i).and_then(|d| d.sample)));
        }

        let ewl = self
            .dimension_regions
            .iter()
            .map(|d| Chunk::list(b"3ewl", vec![Chunk::data(b"wsmp", wsmp(d.unity_note.unwrap_or(DEFAULT_UNITY_NOTE)))]))
            .collect();

        Chunk::list(b"rgn ", vec![
            Chunk::data(b"rgnh", rgnh),
            Chunk::data(b"wsmp", wsmp(DEFAULT_UNITY_NOTE)),
            Chunk::data(b"wlnk", wlnk),
            Chunk::data(b"3lnk", lnk.finish()),
            Chunk::list(b"3prg", ewl),
        ])
    }
}

fn wsmp(unity_note: u16) -> Vec<u8> {
    Body::new()
        .u32(20) // cbSize
        .u16(unity_note)
        .i16(0) // fine tune
        .i32(0) // attenuation
        .u32(0) // options
        .u32(0) // loops
        .finish()
}

#[derive(Debug, Clone, Default)]
pub struct Instrument {
    pub name: String,
    pub bank: u32,
    pub program: u32,
    regions: Vec<Region>,
}

impl Instrument {
    pub fn add_region(&mut self) -> &mut Region {
        self.regions.push(Region::default());
        let last = self.regions.len() - 1;
        &mut self.regions[last]
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    fn chunk(&self) -> Chunk {
        let insh = Body::new()
            .u32(self.regions.len() as u32)
            .u32(self.bank)
            .u32(self.program)
            .finish();

        Chunk::list(b"ins ", vec![
            Chunk::data(b"insh", insh),
            Chunk::list(b"lrgn", self.regions.iter().map(Region::chunk).collect()),
            Chunk::list(b"INFO", vec![Chunk::zstr(b"INAM", &self.name)]),
        ])
    }
}

#[derive(Debug, Clone)]
pub struct GigFile {
    pub name: String,
    pub software: String,
    instruments: Vec<Instrument>,
    samples: Vec<Sample>,
    groups: Vec<String>,
}

impl Default for GigFile {
    fn default() -> Self {
        Self::new()
    }
}

impl GigFile {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            software: format!("{} {}", crate::NAME, crate::VERSION),
            instruments: Vec::new(),
            samples: Vec::new(),
            groups: vec![DEFAULT_GROUP_NAME.to_string()],
        }
    }

    pub fn add_instrument(&mut self) -> InstrumentId {
        self.instruments.push(Instrument::default());
        InstrumentId(self.instruments.len() - 1)
    }

    pub fn instrument(&self, id: InstrumentId) -> &Instrument {
        &self.instruments[id.0]
    }

    pub fn instrument_mut(&mut self, id: InstrumentId) -> &mut Instrument {
        &mut self.instruments[id.0]
    }

    /// Add an empty sample to the pool, in the default group.
    pub fn add_sample(&mut self) -> SampleId {
        self.samples.push(Sample::default());
        SampleId(self.samples.len() - 1)
    }

    pub fn sample(&self, id: SampleId) -> &Sample {
        &self.samples[id.0]
    }

    pub fn sample_mut(&mut self, id: SampleId) -> &mut Sample {
        &mut self.samples[id.0]
    }

    pub fn validate(&self) -> Result<()> {
        for sample in &self.samples {
            sample.validate()?;
        }
        for instrument in &self.instruments {
            for region in &instrument.regions {
                region.validate(self.samples.len())?;
            }
        }
        Ok(())
    }

    fn chunks(&self) -> Result<Vec<Chunk>> {
        let waves = self.samples.iter().map(Sample::wave_chunk).collect::<Result<Vec<_>>>()?;

        let mut ptbl = Body::new().u32(8).u32(waves.len() as u32);
        let mut offset = 0u64;
        for wave in &waves {
            ptbl = ptbl.u32(offset as u32);
            offset += wave.stored_len();
        }

        let groups = self
            .groups
            .iter()
            .map(|g| Chunk::data(b"3gnm", Body::new().fixed_str(g, GROUP_NAME_LEN).finish()))
            .collect();

        let (major, minor) = FILE_VERSION;
        Ok(vec![
            Chunk::data(b"vers", Body::new().u32((major as u32) << 16 | minor as u32).u32(0).finish()),
            Chunk::data(b"colh", Body::new().u32(self.instruments.len() as u32).finish()),
            Chunk::list(b"lins", self.instruments.iter().map(Instrument::chunk).collect()),
            Chunk::data(b"ptbl", ptbl.finish()),
            Chunk::list(b"wvpl", waves),
            Chunk::list(b"3gri", vec![Chunk::list(b"3gnl", groups)]),
            Chunk::list(b"INFO", vec![
                Chunk::zstr(b"INAM", &self.name),
                Chunk::zstr(b"ISFT", &self.software),
            ]),
        ])
    }

    /// Commit all metadata to `out`, leaving sample data zeroed.
    pub fn save_to<W: Write + Seek>(&self, mut out: W) -> Result<SavedGig<W>> {
        self.validate()?;
        let chunks = self.chunks()?;

        let spans = riff::write_form(&mut out, b"DLS ", &chunks)
            .map_err(|e| MkgigError::container(e.to_string()))?;
        out.flush().map_err(|e| MkgigError::container(e.to_string()))?;

        let slots = self
            .samples
            .iter()
            .zip(spans.iter().filter(|s| &s.id == b"data"))
            .map(|(sample, span)| SampleSlot {
                data_offset: span.offset,
                frame_size: sample.frame_size,
                frames: sample.total_frames,
            })
            .collect::<Vec<_>>();

        debug!("committed {} instruments, {} samples", self.instruments.len(), slots.len());
        Ok(SavedGig { out, slots })
    }

    /// Create `path` and commit all metadata to it.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<SavedGig<File>> {
        let path = path.as_ref();
        self.validate()?;
        let file = File::create(path)
            .map_err(|e| MkgigError::container(format!("cannot create '{}': {}", path.display(), e)))?;
        self.save_to(file)
    }
}

/// A saved file whose sample data areas can now be filled.
#[derive(Debug)]
pub struct SavedGig<W> {
    out: W,
    slots: Vec<SampleSlot>,
}

impl<W: Write + Seek> SavedGig<W> {
    pub fn slot(&self, id: SampleId) -> Result<SampleSlot> {
        self.slots
            .get(id.0)
            .copied()
            .ok_or_else(|| MkgigError::container(format!("no committed sample #{}", id.0)))
    }

    pub fn sample_writer(&mut self, id: SampleId) -> Result<SampleWriter<&mut W>> {
        let slot = self.slot(id)?;
        Ok(SampleWriter::new(&mut self.out, slot))
    }

    /// Flush and hand back the underlying stream.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleSink;
    use std::io::Cursor;

    fn described_sample(file: &mut GigFile, frames: u64) -> SampleId {
        let id = file.add_sample();
        let s = file.sample_mut(id);
        s.set_name("tone.wav");
        s.set_channels(1);
        s.set_bit_depth(16);
        s.set_frame_size(2);
        s.set_sample_rate(8000);
        s.set_average_bytes_per_second(16000);
        s.set_block_align(2);
        s.set_total_frames(frames);
        s.resize(frames);
        id
    }

    fn single_sample_file(frames: u64) -> (GigFile, SampleId) {
        let mut file = GigFile::new();
        file.name = "Single Instrument GIG".into();
        let sample = described_sample(&mut file, frames);
        let ins = file.add_instrument();
        file.instrument_mut(ins).name = "tone.wav".into();
        file.instrument_mut(ins).add_region().set_sample(sample);
        (file, sample)
    }

    fn find(bytes: &[u8], needle: &[u8]) -> usize {
        bytes.windows(needle.len()).position(|w| w == needle).unwrap()
    }

    #[test]
    fn test_region_defaults_and_link() {
        let (file, sample) = single_sample_file(4);
        let region = &file.instrument(InstrumentId(0)).regions()[0];
        assert_eq!(region.key_range, Range::full());
        assert_eq!(region.velocity_range, Range::new(0, 127));
        assert_eq!(region.sample(), Some(sample));
        assert_eq!(region.dimension_regions()[0].sample, Some(sample));
    }

    #[test]
    fn test_save_requires_resize() {
        let (mut file, sample) = single_sample_file(4);
        file.sample_mut(sample).sized_frames = None;
        let err = file.save_to(Cursor::new(Vec::new())).unwrap_err();
        assert!(matches!(err, MkgigError::ContainerWrite { .. }));

        file.sample_mut(sample).resize(3);
        assert!(file.save_to(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_save_rejects_bad_descriptor() {
        let (mut file, sample) = single_sample_file(4);
        file.sample_mut(sample).set_frame_size(3);
        assert!(file.save_to(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_save_rejects_oversized_sample() {
        let (mut file, sample) = single_sample_file(u32::MAX as u64);
        file.sample_mut(sample).resize(u32::MAX as u64);
        let err = file.validate().unwrap_err();
        assert!(err.to_string().contains("too large"));

        let (file, _) = single_sample_file(u64::MAX);
        assert!(file.validate().unwrap_err().to_string().contains("too large"));
    }

    #[test]
    fn test_save_rejects_dangling_region() {
        let mut file = GigFile::new();
        let ins = file.add_instrument();
        file.instrument_mut(ins).add_region().set_sample(SampleId(3));
        assert!(file.save_to(Cursor::new(Vec::new())).is_err());
    }

    #[test]
    fn test_saved_layout() {
        let (file, sample) = single_sample_file(4);
        let mut saved = file.save_to(Cursor::new(Vec::new())).unwrap();
        let slot = saved.slot(sample).unwrap();
        assert_eq!(slot.frames, 4);
        assert_eq!(slot.data_len(), 8);

        let bytes = saved.finish().unwrap().into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"DLS ");

        // data chunk header directly precedes the slot
        let at = slot.data_offset as usize;
        assert_eq!(&bytes[at - 8..at - 4], b"data");
        assert_eq!(u32::from_le_bytes(bytes[at - 4..at].try_into().unwrap()), 8);
        assert_eq!(&bytes[at..at + 8], &[0u8; 8]);

        // PCM fmt: tag 1, 1 ch, 8000 Hz, 16000 B/s, align 2, 16 bit
        let fmt = find(&bytes, b"fmt ") + 8;
        assert_eq!(
            &bytes[fmt..fmt + 16],
            &[1, 0, 1, 0, 0x40, 0x1F, 0, 0, 0x80, 0x3E, 0, 0, 2, 0, 16, 0]
        );

        // full key and velocity range
        let rgnh = find(&bytes, b"rgnh") + 8;
        assert_eq!(&bytes[rgnh..rgnh + 8], &[0, 0, 127, 0, 0, 0, 127, 0]);

        // wave link and first dimension region point at pool entry 0
        let wlnk = find(&bytes, b"wlnk") + 8;
        assert_eq!(&bytes[wlnk + 8..wlnk + 12], &[0, 0, 0, 0]);
        let lnk = find(&bytes, b"3lnk") + 8;
        assert_eq!(&bytes[lnk..lnk + 4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[lnk + 44..lnk + 48], &[0, 0, 0, 0]);
        assert_eq!(&bytes[lnk + 48..lnk + 52], &[0xFF; 4]);

        assert!(find(&bytes, b"tone.wav\0") > 0);
        assert!(find(&bytes, b"Single Instrument GIG\0") > 0);
    }

    #[test]
    fn test_pool_table_points_at_wave_lists() {
        let mut file = GigFile::new();
        described_sample(&mut file, 3);
        let second = described_sample(&mut file, 2);
        let ins = file.add_instrument();
        file.instrument_mut(ins).add_region().set_sample(second);

        let bytes = file.save_to(Cursor::new(Vec::new())).unwrap().finish().unwrap().into_inner();

        let ptbl = find(&bytes, b"ptbl") + 8;
        let word = |at: usize| u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap()) as usize;
        assert_eq!(word(ptbl), 8);
        assert_eq!(word(ptbl + 4), 2);

        let wvpl_data = find(&bytes, b"wvpl") + 4;
        for i in 0..2 {
            let wave = wvpl_data + word(ptbl + 8 + 4 * i);
            assert_eq!(&bytes[wave..wave + 4], b"LIST");
            assert_eq!(&bytes[wave + 8..wave + 12], b"wave");
        }
    }

    #[test]
    fn test_payload_written_after_commit() {
        let (file, sample) = single_sample_file(4);
        let mut saved = file.save_to(Cursor::new(Vec::new())).unwrap();
        let slot = saved.slot(sample).unwrap();
        {
            let mut writer = saved.sample_writer(sample).unwrap();
            writer.set_position(0).unwrap();
            writer.write(&[1, 0, 2, 0, 3, 0, 4, 0], 4).unwrap();
            assert!(writer.write(&[5, 0], 1).is_err());
        }
        let bytes = saved.finish().unwrap().into_inner();
        let at = slot.data_offset as usize;
        assert_eq!(&bytes[at..at + 8], &[1, 0, 2, 0, 3, 0, 4, 0]);
    }
}

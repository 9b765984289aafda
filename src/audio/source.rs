//! Source inspection and frame reading
//!
//! Opens the input file, classifies its sample encoding and picks the bit
//! depth the container will store. Reading happens in whole frames, scaled
//! the way a general purpose audio library renders any encoding as 16 or 32
//! bit integers.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use hound::{SampleFormat, WavReader};
use log::debug;
use crate::audio::decoded::DecodedSource;
use crate::error::{MkgigError, Result};

/// Sample encoding of the source file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    PcmS8,
    PcmU8,
    PcmS16,
    PcmS24,
    PcmS32,
    Float32,
    Float64,
}

impl SourceEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            SourceEncoding::PcmS8 => "signed 8-bit PCM",
            SourceEncoding::PcmU8 => "unsigned 8-bit PCM",
            SourceEncoding::PcmS16 => "signed 16-bit PCM",
            SourceEncoding::PcmS24 => "signed 24-bit PCM",
            SourceEncoding::PcmS32 => "signed 32-bit PCM",
            SourceEncoding::Float32 => "32-bit float",
            SourceEncoding::Float64 => "64-bit float",
        }
    }

    /// Nominal bits per sample of the encoding
    pub fn bits(&self) -> u16 {
        match self {
            SourceEncoding::PcmS8 | SourceEncoding::PcmU8 => 8,
            SourceEncoding::PcmS16 => 16,
            SourceEncoding::PcmS24 => 24,
            SourceEncoding::PcmS32 | SourceEncoding::Float32 => 32,
            SourceEncoding::Float64 => 64,
        }
    }

    /// Classify a WAVE format. 8-bit WAVE PCM is always unsigned.
    pub fn from_wav_spec(spec: &hound::WavSpec) -> Result<Self> {
        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 8) => Ok(SourceEncoding::PcmU8),
            (SampleFormat::Int, 16) => Ok(SourceEncoding::PcmS16),
            (SampleFormat::Int, 24) => Ok(SourceEncoding::PcmS24),
            (SampleFormat::Int, 32) => Ok(SourceEncoding::PcmS32),
            (SampleFormat::Float, 32) => Ok(SourceEncoding::Float32),
            (format, bits) => Err(MkgigError::unsupported(format!(
                "{}-bit {:?} samples", bits, format
            ))),
        }
    }
}

/// Storage precision used in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEncoding {
    Pcm16,
    Pcm24,
}

impl TargetEncoding {
    pub fn bit_depth(&self) -> u16 {
        match self {
            TargetEncoding::Pcm16 => 16,
            TargetEncoding::Pcm24 => 24,
        }
    }

    pub fn bytes_per_sample(&self) -> u16 {
        self.bit_depth() / 8
    }
}

/// Pick the container bit depth for a source encoding.
///
/// Narrow sources are widened to 16 bit. Anything with more than 16 bits of
/// nominal precision, float included, is stored as 24-bit fixed point since
/// the container has no float sample storage.
pub fn derive_target_encoding(encoding: SourceEncoding) -> TargetEncoding {
    match encoding {
        SourceEncoding::PcmS8 | SourceEncoding::PcmU8 | SourceEncoding::PcmS16 => TargetEncoding::Pcm16,
        SourceEncoding::PcmS24
        | SourceEncoding::PcmS32
        | SourceEncoding::Float32
        | SourceEncoding::Float64 => TargetEncoding::Pcm24,
    }
}

/// Format metadata read once from the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFormatInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub total_frames: u64,
    pub encoding: SourceEncoding,
}

impl SourceFormatInfo {
    pub fn target(&self) -> TargetEncoding {
        derive_target_encoding(self.encoding)
    }
}

/// An open source delivering interleaved frames.
///
/// Each read fills at most `max_frames` frames into `out` and returns the
/// number of frames actually read. Zero means end of stream.
pub trait FrameSource {
    fn format(&self) -> &SourceFormatInfo;

    fn read_frames_i16(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize>;

    fn read_frames_i32(&mut self, out: &mut [i32], max_frames: usize) -> Result<usize>;
}

/// WAVE file source backed by hound
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    info: SourceFormatInfo,
}

impl std::fmt::Debug for WavSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavSource").field("info", &self.info).finish()
    }
}

/// Source opened by [`inspect`]: plain WAVE through hound, everything
/// else through the symphonia demuxers.
#[derive(Debug)]
pub enum AudioSource {
    Wave(WavSource),
    Decoded(DecodedSource),
}

impl FrameSource for AudioSource {
    fn format(&self) -> &SourceFormatInfo {
        match self {
            AudioSource::Wave(s) => s.format(),
            AudioSource::Decoded(s) => s.format(),
        }
    }

    fn read_frames_i16(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize> {
        match self {
            AudioSource::Wave(s) => s.read_frames_i16(out, max_frames),
            AudioSource::Decoded(s) => s.read_frames_i16(out, max_frames),
        }
    }

    fn read_frames_i32(&mut self, out: &mut [i32], max_frames: usize) -> Result<usize> {
        match self {
            AudioSource::Wave(s) => s.read_frames_i32(out, max_frames),
            AudioSource::Decoded(s) => s.read_frames_i32(out, max_frames),
        }
    }
}

/// Open `path` and read its format.
///
/// WAVE files hound can read stay on hound. Anything it rejects (other
/// containers, 64-bit float, compressed WAVE) is probed with symphonia.
/// The returned source keeps the file open until it is dropped.
pub fn inspect<P: AsRef<Path>>(path: P) -> Result<AudioSource> {
    let path = path.as_ref();
    let shown = path.display().to_string();

    let source = match WavReader::open(path) {
        Ok(reader) => AudioSource::Wave(WavSource::new(reader)?),
        Err(e) => {
            debug!("'{}' is not a plain WAVE file ({}), probing", shown, e);
            AudioSource::Decoded(DecodedSource::open(path)?)
        }
    };

    let info = *source.format();
    if info.channels == 0 {
        return Err(MkgigError::source_open(shown, "no channels"));
    }
    if info.sample_rate == 0 {
        return Err(MkgigError::source_open(shown, "sample rate is 0"));
    }

    debug!(
        "source: {} ch, {} Hz, {} frames, {} -> {}-bit",
        info.channels, info.sample_rate, info.total_frames, info.encoding.name(), info.target().bit_depth()
    );

    Ok(source)
}

impl WavSource {
    fn new(reader: WavReader<BufReader<File>>) -> Result<Self> {
        let spec = reader.spec();
        let info = SourceFormatInfo {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            total_frames: reader.duration() as u64,
            encoding: SourceEncoding::from_wav_spec(&spec)?,
        };
        Ok(Self { reader, info })
    }

    fn read_error(e: hound::Error) -> MkgigError {
        match e {
            hound::Error::IoError(io) => MkgigError::Io(io),
            other => MkgigError::io(format!("Failed to read sample: {}", other)),
        }
    }

    /// Pull up to `max_frames` frames through `convert`, which sees every raw sample.
    fn read_with<S, T, F>(&mut self, out: &mut [T], max_frames: usize, convert: F) -> Result<usize>
    where
        S: hound::Sample,
        F: Fn(S) -> T,
    {
        let channels = self.info.channels as usize;
        let wanted = max_frames.min(out.len() / channels) * channels;

        let mut filled = 0;
        for sample in self.reader.samples::<S>().take(wanted) {
            out[filled] = convert(sample.map_err(Self::read_error)?);
            filled += 1;
        }

        if filled % channels != 0 {
            return Err(MkgigError::io("source ended in the middle of a frame"));
        }
        Ok(filled / channels)
    }
}

impl FrameSource for WavSource {
    fn format(&self) -> &SourceFormatInfo {
        &self.info
    }

    fn read_frames_i16(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize> {
        let bits = self.info.encoding.bits();
        match self.reader.spec().sample_format {
            SampleFormat::Int => {
                self.read_with::<i32, _, _>(out, max_frames, |s| scale::to_i16(scale::left_justify(s, bits)))
            }
            SampleFormat::Float => {
                self.read_with::<f32, _, _>(out, max_frames, |s| scale::to_i16(scale::f32_to_i32(s)))
            }
        }
    }

    fn read_frames_i32(&mut self, out: &mut [i32], max_frames: usize) -> Result<usize> {
        let bits = self.info.encoding.bits();
        match self.reader.spec().sample_format {
            SampleFormat::Int => self.read_with::<i32, _, _>(out, max_frames, |s| scale::left_justify(s, bits)),
            SampleFormat::Float => self.read_with::<f32, _, _>(out, max_frames, scale::f32_to_i32),
        }
    }
}

/// Sample scaling between integer widths and from float
///
/// Everything is first brought to left-justified 32-bit; 16-bit reads keep
/// the upper half of that.
pub mod scale {
    const FLOAT_FULL_SCALE: f64 = 2_147_483_648.0;

    /// Move a `bits` wide integer sample into the top bits of an i32.
    pub fn left_justify(s: i32, bits: u16) -> i32 {
        s << (32 - bits as u32)
    }

    pub fn to_i16(s: i32) -> i16 {
        (s >> 16) as i16
    }

    /// Scale [-1.0, 1.0] to the i32 range, round half to even, saturate.
    pub fn f32_to_i32(s: f32) -> i32 {
        f64_to_i32(s as f64)
    }

    pub fn f64_to_i32(s: f64) -> i32 {
        // `as` saturates out-of-range values and maps NaN to 0.
        (s * FLOAT_FULL_SCALE).round_ties_even() as i32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, spec: WavSpec, samples: &[i32]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            match spec.bits_per_sample {
                8 => writer.write_sample(s as i8).unwrap(),
                16 => writer.write_sample(s as i16).unwrap(),
                _ => writer.write_sample(s).unwrap(),
            }
        }
        writer.finalize().unwrap();
        path
    }

    fn int_spec(channels: u16, bits: u16) -> WavSpec {
        WavSpec { channels, sample_rate: 8000, bits_per_sample: bits, sample_format: SampleFormat::Int }
    }

    #[test]
    fn test_derive_target_encoding() {
        for enc in [SourceEncoding::PcmS8, SourceEncoding::PcmU8, SourceEncoding::PcmS16] {
            assert_eq!(derive_target_encoding(enc).bit_depth(), 16, "{:?}", enc);
        }
        for enc in [
            SourceEncoding::PcmS24,
            SourceEncoding::PcmS32,
            SourceEncoding::Float32,
            SourceEncoding::Float64,
        ] {
            assert_eq!(derive_target_encoding(enc).bit_depth(), 24, "{:?}", enc);
        }
    }

    #[test]
    fn test_encoding_from_spec() {
        assert_eq!(SourceEncoding::from_wav_spec(&int_spec(1, 8)).unwrap(), SourceEncoding::PcmU8);
        assert_eq!(SourceEncoding::from_wav_spec(&int_spec(1, 24)).unwrap(), SourceEncoding::PcmS24);

        let odd = int_spec(1, 20);
        assert!(matches!(
            SourceEncoding::from_wav_spec(&odd),
            Err(MkgigError::UnsupportedEncoding { .. })
        ));
    }

    #[test]
    fn test_integer_scaling() {
        assert_eq!(scale::left_justify(-128, 8), i32::MIN);
        assert_eq!(scale::left_justify(0x12_3456, 24), 0x1234_5600);
        assert_eq!(scale::to_i16(scale::left_justify(127, 8)), 127 << 8);
        assert_eq!(scale::to_i16(scale::left_justify(-2, 16)), -2);
        assert_eq!(scale::to_i16(0x1234_5678), 0x1234);
    }

    #[test]
    fn test_float64_scaling() {
        assert_eq!(scale::f64_to_i32(0.25), 0x2000_0000);
        assert_eq!(scale::f64_to_i32(-1.0), i32::MIN);
        assert_eq!(scale::f64_to_i32(1.0), i32::MAX);
        assert_eq!(scale::f64_to_i32(-3.5), i32::MIN);
        // 0.5 / 2^31 lands exactly between 0 and 1
        assert_eq!(scale::f64_to_i32(0.5 / 2_147_483_648.0), 0);
    }

    #[test]
    fn test_float_scaling() {
        assert_eq!(scale::f32_to_i32(0.0), 0);
        assert_eq!(scale::f32_to_i32(0.5), 0x4000_0000);
        assert_eq!(scale::f32_to_i32(-0.5), -0x4000_0000);
        assert_eq!(scale::f32_to_i32(-1.0), i32::MIN);
        assert_eq!(scale::f32_to_i32(1.0), i32::MAX);
        assert_eq!(scale::f32_to_i32(2.0), i32::MAX);
        assert_eq!(scale::f32_to_i32(f32::NAN), 0);
    }

    #[test]
    fn test_inspect_pcm16() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "a.wav", int_spec(2, 16), &[1, -1, 2, -2, 3, -3]);

        let source = inspect(&path).unwrap();
        let info = source.format();
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.total_frames, 3);
        assert_eq!(info.encoding, SourceEncoding::PcmS16);
        assert_eq!(info.target(), TargetEncoding::Pcm16);
    }

    #[test]
    fn test_inspect_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = inspect(dir.path().join("nope.wav")).unwrap_err();
        assert!(matches!(err, MkgigError::SourceOpen { .. }));
    }

    #[test]
    fn test_inspect_not_audio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("text.wav");
        std::fs::write(&path, b"this is not a riff file at all").unwrap();
        let err = inspect(&path).unwrap_err();
        assert!(matches!(err, MkgigError::SourceOpen { .. }));
    }

    #[test]
    fn test_read_u8_as_i16() {
        let dir = TempDir::new().unwrap();
        // hound maps the unsigned bytes to signed i8 on both ends
        let path = write_wav(&dir, "u8.wav", int_spec(1, 8), &[-128, 0, 127]);

        let mut source = inspect(&path).unwrap();
        assert_eq!(source.format().encoding, SourceEncoding::PcmU8);

        let mut buf = [0i16; 4];
        assert_eq!(source.read_frames_i16(&mut buf, 4).unwrap(), 3);
        assert_eq!(&buf[..3], &[i16::MIN, 0, 127 << 8]);
        assert_eq!(source.read_frames_i16(&mut buf, 4).unwrap(), 0);
    }

    #[test]
    fn test_read_s24_as_i32() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "s24.wav", int_spec(1, 24), &[0x12_3456, -1, -0x80_0000]);

        let mut source = inspect(&path).unwrap();
        let mut buf = [0i32; 2];
        assert_eq!(source.read_frames_i32(&mut buf, 2).unwrap(), 2);
        assert_eq!(buf, [0x1234_5600, -256]);
        assert_eq!(source.read_frames_i32(&mut buf, 2).unwrap(), 1);
        assert_eq!(buf[0], i32::MIN);
    }

    #[test]
    fn test_read_s24_as_i16() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "s24.wav", int_spec(1, 24), &[0x12_3456, -1]);

        let mut source = inspect(&path).unwrap();
        let mut buf = [0i16; 2];
        assert_eq!(source.read_frames_i16(&mut buf, 2).unwrap(), 2);
        assert_eq!(buf, [0x1234, -1]);
    }

    #[test]
    fn test_inspect_routes_wave_to_hound() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "a.wav", int_spec(1, 16), &[0]);
        assert!(matches!(inspect(&path).unwrap(), AudioSource::Wave(_)));
    }

    #[test]
    fn test_read_respects_max_frames() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "st.wav", int_spec(2, 16), &[1, 2, 3, 4, 5, 6]);

        let mut source = inspect(&path).unwrap();
        let mut buf = [0i16; 6];
        assert_eq!(source.read_frames_i16(&mut buf, 1).unwrap(), 1);
        assert_eq!(&buf[..2], &[1, 2]);
        assert_eq!(source.read_frames_i16(&mut buf, 10).unwrap(), 2);
        assert_eq!(&buf[..4], &[3, 4, 5, 6]);
    }
}

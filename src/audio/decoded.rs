//! Sources decoded through symphonia
//!
//! Covers the containers hound does not read (AIFF, FLAC, CAF) and WAVE
//! variants it rejects, 64-bit float in particular. Only uncompressed PCM,
//! IEEE float and FLAC tracks are accepted; the decoded planes are
//! interleaved into the same left-justified 32-bit form the WAVE reader
//! produces.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::Path;
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{self, CodecType, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};
use crate::audio::source::{scale, FrameSource, SourceEncoding, SourceFormatInfo};
use crate::error::{MkgigError, Result};

const PCM_CODECS: &[(CodecType, SourceEncoding)] = &[
    (codecs::CODEC_TYPE_PCM_S8, SourceEncoding::PcmS8),
    (codecs::CODEC_TYPE_PCM_U8, SourceEncoding::PcmU8),
    (codecs::CODEC_TYPE_PCM_S16LE, SourceEncoding::PcmS16),
    (codecs::CODEC_TYPE_PCM_S16BE, SourceEncoding::PcmS16),
    (codecs::CODEC_TYPE_PCM_S24LE, SourceEncoding::PcmS24),
    (codecs::CODEC_TYPE_PCM_S24BE, SourceEncoding::PcmS24),
    (codecs::CODEC_TYPE_PCM_S32LE, SourceEncoding::PcmS32),
    (codecs::CODEC_TYPE_PCM_S32BE, SourceEncoding::PcmS32),
    (codecs::CODEC_TYPE_PCM_F32LE, SourceEncoding::Float32),
    (codecs::CODEC_TYPE_PCM_F32BE, SourceEncoding::Float32),
    (codecs::CODEC_TYPE_PCM_F64LE, SourceEncoding::Float64),
    (codecs::CODEC_TYPE_PCM_F64BE, SourceEncoding::Float64),
];

/// Map a track codec onto a source encoding.
///
/// FLAC is lossless integer PCM, so it is classified by its bit depth.
pub fn classify_codec(codec: CodecType, bits_per_sample: Option<u32>) -> Option<SourceEncoding> {
    if codec == codecs::CODEC_TYPE_FLAC {
        return match bits_per_sample? {
            8 => Some(SourceEncoding::PcmS8),
            16 => Some(SourceEncoding::PcmS16),
            24 => Some(SourceEncoding::PcmS24),
            32 => Some(SourceEncoding::PcmS32),
            _ => None,
        };
    }
    PCM_CODECS.iter().find(|(c, _)| *c == codec).map(|(_, encoding)| *encoding)
}

fn codec_name(codec: CodecType) -> &'static str {
    get_codecs().get_codec(codec).map(|d| d.short_name).unwrap_or("unknown")
}

/// Demuxer plus decoder for the first audio track of a file
pub struct DecodedSource {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: SourceFormatInfo,
    pending: VecDeque<i32>,
    finished: bool,
}

impl std::fmt::Debug for DecodedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodedSource")
            .field("track_id", &self.track_id)
            .field("info", &self.info)
            .finish()
    }
}

impl DecodedSource {
    pub fn open(path: &Path) -> Result<Self> {
        let shown = path.display().to_string();
        let file = File::open(path).map_err(|e| MkgigError::source_open(shown.clone(), e.to_string()))?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());
        let probed = get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| MkgigError::source_open(shown.clone(), e.to_string()))?;
        let reader = probed.format;

        let Some(track) = reader.tracks().iter().find(|t| t.codec_params.codec != codecs::CODEC_TYPE_NULL) else {
            return Err(MkgigError::source_open(shown, "no audio track"));
        };
        let params = &track.codec_params;
        let track_id = track.id;

        let Some(encoding) = classify_codec(params.codec, params.bits_per_sample) else {
            return Err(MkgigError::unsupported(format!(
                "'{}' uses the '{}' codec ({:?} bits)",
                shown, codec_name(params.codec), params.bits_per_sample
            )));
        };

        let Some(total_frames) = params.n_frames else {
            return Err(MkgigError::source_open(shown, "unknown length"));
        };
        let channels = params.channels.map(|c| c.count()).unwrap_or(0);
        let channels = u16::try_from(channels)
            .map_err(|_| MkgigError::unsupported(format!("'{}' has {} channels", shown, channels)))?;

        let info = SourceFormatInfo {
            channels,
            sample_rate: params.sample_rate.unwrap_or(0),
            total_frames,
            encoding,
        };

        let decoder = get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| MkgigError::unsupported(format!("'{}': {}", shown, e)))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            info,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    fn read_error(e: SymphoniaError) -> MkgigError {
        match e {
            SymphoniaError::IoError(io) => MkgigError::Io(io),
            other => MkgigError::io(format!("Failed to decode sample: {}", other)),
        }
    }

    /// Decode packets until `samples` interleaved samples are queued or the
    /// stream ends.
    fn fill(&mut self, samples: usize) -> Result<()> {
        while self.pending.len() < samples && !self.finished {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    self.finished = true;
                    break;
                }
                Err(e) => return Err(Self::read_error(e)),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = self.decoder.decode(&packet).map_err(Self::read_error)?;
            queue_interleaved(decoded, &mut self.pending)?;
        }
        Ok(())
    }

    fn read_with<T, F>(&mut self, out: &mut [T], max_frames: usize, convert: F) -> Result<usize>
    where
        F: Fn(i32) -> T,
    {
        let channels = self.info.channels as usize;
        let wanted = max_frames.min(out.len() / channels) * channels;
        self.fill(wanted)?;

        let take = wanted.min(self.pending.len());
        if take % channels != 0 {
            return Err(MkgigError::io("source ended in the middle of a frame"));
        }
        for (slot, s) in out.iter_mut().zip(self.pending.drain(..take)) {
            *slot = convert(s);
        }
        Ok(take / channels)
    }
}

impl FrameSource for DecodedSource {
    fn format(&self) -> &SourceFormatInfo {
        &self.info
    }

    fn read_frames_i16(&mut self, out: &mut [i16], max_frames: usize) -> Result<usize> {
        self.read_with(out, max_frames, scale::to_i16)
    }

    fn read_frames_i32(&mut self, out: &mut [i32], max_frames: usize) -> Result<usize> {
        self.read_with(out, max_frames, |s| s)
    }
}

/// Append a decoded buffer to `queue` as interleaved, left-justified i32.
fn queue_interleaved(decoded: AudioBufferRef<'_>, queue: &mut VecDeque<i32>) -> Result<()> {
    match decoded {
        AudioBufferRef::U8(buf) => interleave(&*buf, queue, |s| ((s as i32) - 0x80) << 24),
        AudioBufferRef::S8(buf) => interleave(&*buf, queue, |s| (s as i32) << 24),
        AudioBufferRef::S16(buf) => interleave(&*buf, queue, |s| (s as i32) << 16),
        AudioBufferRef::S24(buf) => interleave(&*buf, queue, |s| s.inner() << 8),
        AudioBufferRef::S32(buf) => interleave(&*buf, queue, |s| s),
        AudioBufferRef::F32(buf) => interleave(&*buf, queue, scale::f32_to_i32),
        AudioBufferRef::F64(buf) => interleave(&*buf, queue, scale::f64_to_i32),
        _ => return Err(MkgigError::unsupported("unsigned wide integer samples")),
    }
    Ok(())
}

fn interleave<S, F>(buf: &AudioBuffer<S>, queue: &mut VecDeque<i32>, convert: F)
where
    S: Sample,
    F: Fn(S) -> i32,
{
    let channels = buf.spec().channels.count();
    queue.reserve(buf.frames() * channels);
    for frame in 0..buf.frames() {
        for ch in 0..channels {
            queue.push_back(convert(buf.chan(ch)[frame]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal WAVE file with IEEE float samples of 64 bits.
    fn float64_wav(channels: u16, rate: u32, samples: &[f64]) -> Vec<u8> {
        let data_len = (samples.len() * 8) as u32;
        let block_align = channels * 8;
        let mut wav = Vec::new();
        wav.extend_from_slice(b"RIFF");
        wav.extend_from_slice(&(4 + 8 + 16 + 8 + data_len).to_le_bytes());
        wav.extend_from_slice(b"WAVE");
        wav.extend_from_slice(b"fmt ");
        wav.extend_from_slice(&16u32.to_le_bytes());
        wav.extend_from_slice(&3u16.to_le_bytes());
        wav.extend_from_slice(&channels.to_le_bytes());
        wav.extend_from_slice(&rate.to_le_bytes());
        wav.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        wav.extend_from_slice(&block_align.to_le_bytes());
        wav.extend_from_slice(&64u16.to_le_bytes());
        wav.extend_from_slice(b"data");
        wav.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            wav.extend_from_slice(&s.to_le_bytes());
        }
        wav
    }

    #[test]
    fn test_classify_codec() {
        assert_eq!(classify_codec(codecs::CODEC_TYPE_PCM_S16BE, Some(16)), Some(SourceEncoding::PcmS16));
        assert_eq!(classify_codec(codecs::CODEC_TYPE_PCM_F64LE, Some(64)), Some(SourceEncoding::Float64));
        assert_eq!(classify_codec(codecs::CODEC_TYPE_PCM_S8, Some(8)), Some(SourceEncoding::PcmS8));
        assert_eq!(classify_codec(codecs::CODEC_TYPE_FLAC, Some(24)), Some(SourceEncoding::PcmS24));

        assert_eq!(classify_codec(codecs::CODEC_TYPE_FLAC, Some(12)), None);
        assert_eq!(classify_codec(codecs::CODEC_TYPE_FLAC, None), None);
        assert_eq!(classify_codec(codecs::CODEC_TYPE_MP3, None), None);
    }

    #[test]
    fn test_float64_wave() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f64.wav");
        std::fs::write(&path, float64_wav(2, 44100, &[0.5, -0.5, 0.25, 1.0, -1.0, 0.0])).unwrap();

        let mut source = DecodedSource::open(&path).unwrap();
        let info = *source.format();
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.total_frames, 3);
        assert_eq!(info.encoding, SourceEncoding::Float64);

        let mut buf = [0i32; 4];
        assert_eq!(source.read_frames_i32(&mut buf, 2).unwrap(), 2);
        assert_eq!(buf, [0x4000_0000, -0x4000_0000, 0x2000_0000, i32::MAX]);
        assert_eq!(source.read_frames_i32(&mut buf, 2).unwrap(), 1);
        assert_eq!(&buf[..2], &[i32::MIN, 0]);
        assert_eq!(source.read_frames_i32(&mut buf, 2).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = DecodedSource::open(&dir.path().join("nope.aiff")).unwrap_err();
        assert!(matches!(err, MkgigError::SourceOpen { .. }));
    }
}

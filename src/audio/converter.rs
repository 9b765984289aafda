//! Sample transcoding - streams source frames into a container sample

use log::debug;
use crate::audio::source::{FrameSource, SourceFormatInfo, TargetEncoding};
use crate::error::{MkgigError, Result};

/// Upper bound on frames held in memory per batch, whatever the batch size.
pub const MAX_BUFFER_FRAMES: usize = 1 << 16;

/// Destination of converted sample bytes.
///
/// Positions and counts are in frames of the destination format.
pub trait SampleSink {
    fn set_position(&mut self, frame: u64) -> Result<()>;

    /// Write `frame_count` frames held in `bytes`, returns frames written.
    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<usize>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TranscodeReport {
    pub frames: u64,
    pub bytes: u64,
    pub batches: u64,
}

/// Keep bytes 1..=3 of a 32-bit sample, low byte first.
#[inline]
pub fn truncate_to_24(v: i32) -> [u8; 3] {
    [(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8]
}

pub struct Transcoder {
    batch_frames: usize,
}

impl Transcoder {
    pub fn new(batch_frames: usize) -> Result<Self> {
        if batch_frames == 0 {
            return Err(MkgigError::config("Batch size must be greater than 0"));
        }
        Ok(Self { batch_frames })
    }

    pub fn batch_frames(&self) -> usize {
        self.batch_frames
    }

    /// Stream every frame of `source` into `sink` at `target` precision.
    ///
    /// The source is consumed and closed when this returns, on success and
    /// on error alike. The sink may hold a partial payload after an error.
    pub fn transcode<S, D>(&self, mut source: S, sink: &mut D, target: TargetEncoding) -> Result<TranscodeReport>
    where
        S: FrameSource,
        D: SampleSink + ?Sized,
    {
        sink.set_position(0)?;

        let report = match target {
            TargetEncoding::Pcm16 => self.stream_16(&mut source, sink)?,
            TargetEncoding::Pcm24 => self.stream_24(&mut source, sink)?,
        };

        debug!(
            "transcoded {} frames ({} bytes) in {} batches",
            report.frames, report.bytes, report.batches
        );
        Ok(report)
    }

    fn stream_16<S, D>(&self, source: &mut S, sink: &mut D) -> Result<TranscodeReport>
    where
        S: FrameSource,
        D: SampleSink + ?Sized,
    {
        let channels = source.format().channels as usize;
        let mut remaining = source.format().total_frames;
        let (frames, len) = self.buffer_len(source.format())?;
        let mut samples = vec![0i16; len];
        let mut bytes = Vec::with_capacity(len * 2);
        let mut report = TranscodeReport::default();

        while remaining > 0 {
            let want = remaining.min(frames as u64) as usize;
            let n = source.read_frames_i16(&mut samples, want)?;
            if n == 0 {
                return Err(Self::ended_early(&report, remaining));
            }

            bytes.clear();
            for s in &samples[..n * channels] {
                bytes.extend_from_slice(&s.to_le_bytes());
            }
            sink.write(&bytes, n)?;

            report.push(n, bytes.len());
            remaining -= n as u64;
        }
        Ok(report)
    }

    fn stream_24<S, D>(&self, source: &mut S, sink: &mut D) -> Result<TranscodeReport>
    where
        S: FrameSource,
        D: SampleSink + ?Sized,
    {
        let channels = source.format().channels as usize;
        let mut remaining = source.format().total_frames;
        let (frames, len) = self.buffer_len(source.format())?;
        let mut samples = vec![0i32; len];
        let mut bytes = Vec::with_capacity(len * 3);
        let mut report = TranscodeReport::default();

        while remaining > 0 {
            let want = remaining.min(frames as u64) as usize;
            let n = source.read_frames_i32(&mut samples, want)?;
            if n == 0 {
                return Err(Self::ended_early(&report, remaining));
            }

            bytes.clear();
            for &s in &samples[..n * channels] {
                bytes.extend_from_slice(&truncate_to_24(s));
            }
            sink.write(&bytes, n)?;

            report.push(n, bytes.len());
            remaining -= n as u64;
        }
        Ok(report)
    }

    /// Frames per read and the matching sample buffer length. The buffer
    /// never holds more than the source has or [`MAX_BUFFER_FRAMES`].
    fn buffer_len(&self, format: &SourceFormatInfo) -> Result<(usize, usize)> {
        let available = usize::try_from(format.total_frames).unwrap_or(usize::MAX);
        let frames = self.batch_frames.min(available).min(MAX_BUFFER_FRAMES).max(1);
        let len = frames.checked_mul(format.channels as usize).ok_or_else(|| {
            MkgigError::config(format!("{} frames of {} channels overflow a batch buffer", frames, format.channels))
        })?;
        Ok((frames, len))
    }

    fn ended_early(report: &TranscodeReport, remaining: u64) -> MkgigError {
        MkgigError::io(format!(
            "source ended early: {} frames read, {} missing",
            report.frames, remaining
        ))
    }
}

impl TranscodeReport {
    fn push(&mut self, frames: usize, bytes: usize) {
        self.frames += frames as u64;
        self.bytes += bytes as u64;
        self.batches += 1;
    }
}

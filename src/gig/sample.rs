//! Payload writer for a sample whose metadata is already on disk

use std::io::{Seek, SeekFrom, Write};
use crate::audio::SampleSink;
use crate::error::{MkgigError, Result};

/// Where a committed sample's data area lives in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSlot {
    pub data_offset: u64,
    pub frame_size: u16,
    pub frames: u64,
}

impl SampleSlot {
    pub fn data_len(&self) -> u64 {
        self.frames * self.frame_size as u64
    }
}

/// Writes frames into a pre-sized sample data area.
#[derive(Debug)]
pub struct SampleWriter<W> {
    out: W,
    slot: SampleSlot,
    position: u64,
}

impl<W: Write + Seek> SampleWriter<W> {
    pub fn new(out: W, slot: SampleSlot) -> Self {
        Self { out, slot, position: 0 }
    }

    /// Current write position in frames.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn slot(&self) -> &SampleSlot {
        &self.slot
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Seek> SampleSink for SampleWriter<W> {
    fn set_position(&mut self, frame: u64) -> Result<()> {
        if frame > self.slot.frames {
            return Err(MkgigError::io(format!(
                "position {} is past the sample end ({} frames)", frame, self.slot.frames
            )));
        }
        self.out.seek(SeekFrom::Start(self.slot.data_offset + frame * self.slot.frame_size as u64))?;
        self.position = frame;
        Ok(())
    }

    fn write(&mut self, bytes: &[u8], frame_count: usize) -> Result<usize> {
        let frame_size = self.slot.frame_size as usize;
        if bytes.len() != frame_count * frame_size {
            return Err(MkgigError::io(format!(
                "{} bytes do not hold {} frames of {} bytes", bytes.len(), frame_count, frame_size
            )));
        }
        if self.position + frame_count as u64 > self.slot.frames {
            return Err(MkgigError::io(format!(
                "writing {} frames at {} overflows the sample ({} frames)",
                frame_count, self.position, self.slot.frames
            )));
        }

        self.out.write_all(bytes)?;
        self.position += frame_count as u64;
        Ok(frame_count)
    }
}

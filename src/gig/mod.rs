//! GigaStudio (.gig) container writing
//!
//! A write-only subset: one RIFF `DLS ` form with instruments, regions, a
//! wave pool and sample groups. Metadata is committed first, sample payload
//! is streamed into the pre-sized data areas afterwards.

pub mod riff;
pub mod file;
pub mod sample;

pub use file::{GigFile, Instrument, InstrumentId, Range, Region, Sample, SampleId, SavedGig};
pub use sample::{SampleSlot, SampleWriter};

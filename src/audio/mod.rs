//! Audio Input and Conversion Module
//!
//! Source inspection (format detection, target bit depth) and streaming
//! transcoding into a container sample.

pub mod source;
pub mod decoded;
pub mod converter;

pub use source::{
    inspect, derive_target_encoding, AudioSource, FrameSource, SourceEncoding, SourceFormatInfo, TargetEncoding,
    WavSource,
};
pub use decoded::DecodedSource;
pub use converter::{truncate_to_24, SampleSink, TranscodeReport, Transcoder};

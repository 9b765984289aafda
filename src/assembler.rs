//! Single-sample .gig assembly
//!
//! Inspect the source, describe one sample, one instrument and one full
//! range region, commit that metadata, then stream the audio payload.

use std::path::PathBuf;
use log::{debug, info};
use crate::audio::{inspect, FrameSource, SourceFormatInfo, TargetEncoding, TranscodeReport, Transcoder};
use crate::config::Config;
use crate::error::{MkgigError, Result};
use crate::gig::{GigFile, Range, Sample, SampleId, SampleSlot};

#[derive(Debug, Clone)]
pub struct ConversionReport {
    pub source: SourceFormatInfo,
    pub target: TargetEncoding,
    pub slot: SampleSlot,
    pub transcode: TranscodeReport,
    pub output_path: PathBuf,
}

/// Fill the sample descriptor and size its data area.
///
/// Fails when the widened frame size or byte rate no longer fits the
/// 16/32-bit `fmt` fields.
pub fn describe_sample(sample: &mut Sample, info: &SourceFormatInfo, target: TargetEncoding) -> Result<()> {
    let frame_size = u16::try_from(target.bytes_per_sample() as u32 * info.channels as u32).map_err(|_| {
        MkgigError::unsupported(format!(
            "{} channels do not fit a {}-bit frame", info.channels, target.bit_depth()
        ))
    })?;
    let byte_rate = u32::try_from(frame_size as u64 * info.sample_rate as u64).map_err(|_| {
        MkgigError::unsupported(format!(
            "{} Hz at {} bytes per frame exceeds the byte rate field", info.sample_rate, frame_size
        ))
    })?;

    sample.set_channels(info.channels);
    sample.set_bit_depth(target.bit_depth());
    sample.set_frame_size(frame_size);
    sample.set_sample_rate(info.sample_rate);
    sample.set_average_bytes_per_second(byte_rate);
    sample.set_block_align(frame_size);
    sample.set_total_frames(info.total_frames);
    sample.resize(info.total_frames);
    Ok(())
}

/// Build the in-memory file: one sample, one instrument, one region.
pub fn build_container(config: &Config, info: &SourceFormatInfo, target: TargetEncoding) -> Result<(GigFile, SampleId)> {
    let name = config.source_name();
    let mut gig = GigFile::new();
    gig.name = config.file_name.clone();

    let sample = gig.add_sample();
    gig.sample_mut(sample).set_name(name.clone());
    describe_sample(gig.sample_mut(sample), info, target)?;

    let instrument = gig.add_instrument();
    let instrument = gig.instrument_mut(instrument);
    instrument.name = name;

    let region = instrument.add_region();
    region.set_sample(sample);
    region.key_range = Range::new(config.key_range.0 as u16, config.key_range.1 as u16);
    region.velocity_range = Range::new(config.velocity_range.0 as u16, config.velocity_range.1 as u16);

    Ok((gig, sample))
}

/// Run one conversion from `config.input_path` to `config.output_path`.
pub fn convert(config: &Config) -> Result<ConversionReport> {
    info!("reading file metadata");
    let source = inspect(&config.input_path)?;
    let info = *source.format();
    let target = info.target();
    let transcoder = Transcoder::new(config.batch_frames)?;

    info!("creating new gig file");
    let (gig, sample) = build_container(config, &info, target)?;

    info!("saving file metadata");
    let mut saved = gig.save(&config.output_path)?;
    let slot = saved.slot(sample)?;
    debug!("sample data at offset {} ({} bytes)", slot.data_offset, slot.data_len());

    info!("saving sample data");
    let transcode = {
        let mut writer = saved.sample_writer(sample)?;
        transcoder.transcode(source, &mut writer, target)?
    };
    saved.finish()?;
    info!("wrote file '{}'", config.output_path.display());

    Ok(ConversionReport {
        source: info,
        target,
        slot,
        transcode,
        output_path: config.output_path.clone(),
    })
}

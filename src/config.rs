//! Run configuration built from command line arguments

use crate::error::{MkgigError, Result};
use clap::Parser;
use std::path::PathBuf;

/// Frames read from the source per transcoding batch.
pub const DEFAULT_BATCH_FRAMES: usize = 10_000;

/// Name stored in the container's own INFO list.
pub const DEFAULT_FILE_NAME: &str = "Single Instrument GIG";

/// Highest MIDI key / velocity value a region can cover.
pub const MIDI_MAX: u8 = 127;

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub batch_frames: usize,
    pub verbose: bool,
    pub file_name: String,
    pub key_range: (u8, u8),
    pub velocity_range: (u8, u8),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("input.wav"),
            output_path: PathBuf::from("output.gig"),
            batch_frames: DEFAULT_BATCH_FRAMES,
            verbose: false,
            file_name: DEFAULT_FILE_NAME.to_string(),
            key_range: (0, MIDI_MAX),
            velocity_range: (0, MIDI_MAX),
        }
    }
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "mkgig",
    about = "Create a basic .gig file with just one sample",
    version,
    author
)]
pub struct Args {
    #[arg(value_name = "INPUT", help = "Input audio file (WAV)")]
    pub input: PathBuf,

    #[arg(value_name = "OUTPUT", help = "Output .gig file")]
    pub output: PathBuf,

    #[arg(short = 'v', long = "verbose", help = "Enable verbose output mode")]
    pub verbose: bool,

    #[arg(long = "batch-frames", default_value_t = DEFAULT_BATCH_FRAMES, help = "Frames converted per batch")]
    pub batch_frames: usize,
}

impl Config {
    /// Create config from parsed command line arguments
    pub fn from_args(args: Args) -> Result<Self> {
        let config = Self {
            input_path: args.input,
            output_path: args.output,
            batch_frames: args.batch_frames,
            verbose: args.verbose,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_frames == 0 {
            return Err(MkgigError::config("Batch size must be greater than 0"));
        }

        for (what, (low, high)) in [("Key", self.key_range), ("Velocity", self.velocity_range)] {
            if low > high || high > MIDI_MAX {
                return Err(MkgigError::config(format!(
                    "{} range {}..={} must be ordered and within 0..={}",
                    what, low, high, MIDI_MAX
                )));
            }
        }

        if self.input_path == self.output_path {
            return Err(MkgigError::config("Input and output must be different files"));
        }

        Ok(())
    }

    /// Display name for the instrument and the sample
    pub fn source_name(&self) -> String {
        utils::file_name_from_path(&self.input_path.to_string_lossy()).to_string()
    }
}

pub mod utils {
    /// Last path component, splitting on both `/` and `\` regardless of host OS.
    pub fn file_name_from_path(path: &str) -> &str {
        match path.rfind(['/', '\\']) {
            Some(pos) => &path[pos + 1..],
            None => path,
        }
    }
}

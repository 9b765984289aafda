//! mkgig - create a basic .gig instrument holding a single sample
//!
//! The source file is inspected, a 16 or 24-bit storage depth is chosen,
//! instrument metadata is committed and the audio is streamed in batches
//! into the container's sample data area.

pub mod assembler;
pub mod audio;
pub mod config;
pub mod error;
pub mod gig;

pub use assembler::{convert, ConversionReport};
pub use config::{Args, Config};
pub use error::{MkgigError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Progress messages go to stderr as bare lines.
pub fn init_logging(verbose: bool) {
    use std::io::Write;

    env_logger::Builder::new()
        .filter_level(if verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .target(env_logger::Target::Stderr)
        .try_init()
        .ok();
}

//! mkgig - wave file in, single-sample .gig file out

use std::process;
use anyhow::Context;
use clap::Parser;
use log::{debug, info};
use mkgig::{init_logging, Args, Config, MkgigError};

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            eprint!("{}", MkgigError::usage(e.render().to_string()));
            process::exit(1);
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            process::exit(0);
        }
    };

    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("error: {:#}", e);
        process::exit(1);
    }

    info!("done");
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;

    let report = mkgig::convert(&config)
        .with_context(|| format!("converting '{}'", config.input_path.display()))?;

    debug!(
        "{} frames, {} ch, {} Hz, {:?} -> {}-bit, {} bytes",
        report.transcode.frames,
        report.source.channels,
        report.source.sample_rate,
        report.source.encoding,
        report.target.bit_depth(),
        report.transcode.bytes
    );
    Ok(())
}

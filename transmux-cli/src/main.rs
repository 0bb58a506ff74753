//! # Transmux
//!
//! A command-line mixer that blends several audio inputs into one encoded
//! output through ffmpeg.

use log::error;
use transmux_lib::MixError;

mod cli;
mod logging;
mod runner;

fn main() {
    dotenv::dotenv().ok();
    let log_buffer = logging::init();
    let args = cli::args::build_cli().get_matches();

    let code = match runner::run(&args) {
        Ok(code) => code,
        Err(err) => {
            if let Some(mix_err) = err.downcast_ref::<MixError>() {
                logging::log_codec_diagnostics(mix_err);
            }
            error!("{}", format!("{:#}", err).to_lowercase());
            for line in logging::snapshot(&log_buffer).iter().rev().take(10).rev() {
                eprintln!("{}", line);
            }
            -1
        }
    };

    std::process::exit(code)
}

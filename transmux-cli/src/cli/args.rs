//! CLI argument definitions for `transmux`.

use clap::{Arg, ArgAction, Command};

/// Build the CLI argument parser.
pub fn build_cli() -> Command {
    Command::new("Transmux")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Adam Howard <adam.thomas.howard@gmail.com>")
        .about("Mix audio inputs into one encoded output")
        .arg_required_else_help(true)
        .arg(
            Arg::new("INPUT")
                .help("Input files or URLs to mix")
                .num_args(1..)
                .required_unless_present("session"),
        )
        .arg(
            Arg::new("gain")
                .long("gain")
                .short('g')
                .value_name("GAIN")
                .action(ArgAction::Append)
                .help("Per-input gain, in input order (defaults to 1.0)"),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("TARGET")
                .required_unless_present("session")
                .help("Output file or URL"),
        )
        .arg(
            Arg::new("codec")
                .long("codec")
                .value_name("CODEC")
                .default_value("libmp3lame")
                .help("Output audio codec"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .value_name("FORMAT")
                .default_value("mp3")
                .help("Output container format"),
        )
        .arg(
            Arg::new("bitrate")
                .long("bitrate")
                .value_name("RATE")
                .default_value("128k")
                .help("Output bitrate"),
        )
        .arg(
            Arg::new("master-gain")
                .long("master-gain")
                .short('m')
                .value_name("GAIN")
                .default_value("1.0")
                .help("Gain applied to the whole mix"),
        )
        .arg(
            Arg::new("read-mode")
                .long("read-mode")
                .value_name("MODE")
                .value_parser(["sequential", "concurrent"])
                .default_value("sequential")
                .help("Read sources one after another, or concurrently with a deadline"),
        )
        .arg(
            Arg::new("deadline-ms")
                .long("deadline-ms")
                .value_name("MS")
                .default_value("20")
                .help("Per-pass deadline in concurrent mode"),
        )
        .arg(
            Arg::new("straggler")
                .long("straggler")
                .value_name("POLICY")
                .value_parser(["skip", "retire"])
                .default_value("skip")
                .help("What to do with a source that misses the deadline"),
        )
        .arg(
            Arg::new("overlay")
                .long("overlay")
                .value_name("TARGET")
                .help("Input added to the running mix after --overlay-after-ms"),
        )
        .arg(
            Arg::new("overlay-after-ms")
                .long("overlay-after-ms")
                .value_name("MS")
                .default_value("1000")
                .help("Delay before the overlay joins the mix"),
        )
        .arg(
            Arg::new("overlay-gain")
                .long("overlay-gain")
                .value_name("GAIN")
                .default_value("1.0")
                .help("Gain of the overlay input"),
        )
        .arg(
            Arg::new("duck-gain")
                .long("duck-gain")
                .value_name("FACTOR")
                .default_value("0.3")
                .help("Factor the first input is faded to when the overlay joins"),
        )
        .arg(
            Arg::new("fade-ms")
                .long("fade-ms")
                .value_name("MS")
                .default_value("500")
                .help("Duration of the duck fade"),
        )
        .arg(
            Arg::new("session")
                .long("session")
                .short('s')
                .value_name("PATH")
                .conflicts_with_all(["INPUT", "output", "overlay"])
                .help("Path to a JSON session file describing the whole mix"),
        )
        .arg(
            Arg::new("ffmpeg")
                .long("ffmpeg")
                .value_name("PROGRAM")
                .help("Codec program to run (falls back to TRANSMUX_FFMPEG, then ffmpeg)"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .action(ArgAction::SetTrue)
                .help("Print the codec invocations as JSON and exit"),
        )
}

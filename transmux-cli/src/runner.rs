use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::ArgMatches;
use log::{info, warn};
use transmux_lib::tools::fade::fade_volume;
use transmux_lib::{CodecInvocation, MixError, Mixer, SampleStream};

use crate::cli::session::{Overlay, Plan, Session};

const FADE_STEPS: u32 = 20;

pub fn run(args: &ArgMatches) -> Result<i32> {
    let mut session = match args.get_one::<String>("session") {
        Some(path) => Session::load(Path::new(path))?,
        None => Session::from_args(args)?,
    };

    let program = args
        .get_one::<String>("ffmpeg")
        .cloned()
        .or_else(|| std::env::var("TRANSMUX_FFMPEG").ok());
    if let Some(program) = program {
        session.set_program(&program);
    }

    session.validate()?;
    let plan = session.plan();

    if args.get_flag("dry-run") {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(0);
    }

    mix(&session, &plan)?;
    Ok(0)
}

fn mix(session: &Session, plan: &Plan) -> Result<()> {
    info!(
        "mixing {} input(s) into {}",
        session.inputs.len(),
        session.sink.target
    );

    let mut streams = Vec::with_capacity(session.inputs.len());
    for (input, invocation) in session.inputs.iter().zip(&plan.inputs) {
        let stream = SampleStream::spawn_invocation(&input.target, invocation, input.gain)
            .with_context(|| format!("failed to open input {}", input.target))?;
        streams.push(stream);
    }
    let mixer = Mixer::with_settings(
        streams,
        Some(&session.sink),
        session.master_gain,
        session.settings,
    )
    .with_context(|| format!("failed to open output {}", session.sink.target))?;

    let lead = mixer.streams().first().cloned();
    let worker = mixer.spawn_run()?;

    if let (Some(overlay), Some(invocation)) = (&session.overlay, &plan.overlay) {
        if let Err(err) = add_overlay(&mixer, lead.as_deref(), overlay, invocation) {
            mixer.close();
            let _ = worker.join();
            return Err(err);
        }
    }

    worker
        .join()
        .map_err(|_| anyhow!("mixer thread panicked"))?;

    if let Some(err) = mixer.err() {
        return Err(err).context("mix aborted");
    }
    info!(
        "mixed {} samples; {} input(s) finished",
        mixer.mixed_samples(),
        mixer.retired_streams()
    );
    Ok(())
}

/// Wait, duck the lead input, then bring the overlay into the running mix.
fn add_overlay(
    mixer: &Mixer,
    lead: Option<&SampleStream>,
    overlay: &Overlay,
    invocation: &CodecInvocation,
) -> Result<()> {
    thread::sleep(Duration::from_millis(overlay.after_ms));
    if !mixer.is_running() {
        warn!("mix ended before the overlay could join");
        return Ok(());
    }

    if let Some(lead) = lead.filter(|lead| lead.is_running()) {
        let from = lead.volume();
        let step = Duration::from_millis(overlay.fade_ms / FADE_STEPS as u64);
        fade_volume(lead, from, from * overlay.duck_gain, FADE_STEPS, step);
    }

    let stream = SampleStream::spawn_invocation(&overlay.target, invocation, overlay.gain)
        .with_context(|| format!("failed to open overlay {}", overlay.target))?;
    match mixer.add_running_stream(Arc::new(stream)) {
        Ok(_) => info!("overlay {} joined the mix", overlay.target),
        Err(MixError::NotRunning) => warn!("mix ended before the overlay could join"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

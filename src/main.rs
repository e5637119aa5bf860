// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use args::Args;
use clap::Parser;
use edgefirst_capture::{
    cache::{CacheMaintenance, HostCache},
    controller::{CaptureContext, CaptureStats, ContextConfig},
    geometry::{CaptureGeometry, PixelFormat},
    hal::{CaptureInterface, CopyEngine, Interrupts},
    image::{encode_jpeg, Image},
    sim::{Pacing, SimRig},
};
use serde_json::json;
use std::{
    error::Error,
    fs,
    path::Path,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, Layer};
mod args;

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.tokio_console {
        console_subscriber::init();
        return Ok(());
    }

    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    let journald = if args.journald {
        match tracing_journald::layer() {
            Ok(layer) => Some(layer.with_filter(level)),
            Err(e) => {
                eprintln!("journald unavailable: {e}");
                None
            }
        }
    } else {
        None
    };

    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default())
    } else {
        None
    };

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(level))
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

fn update_fps(prev: &mut Instant, history: &mut [f64], index: &mut usize) -> f64 {
    let now = Instant::now();
    let elapsed = now.duration_since(*prev);
    *prev = now;

    history[*index] = 1.0 / elapsed.as_secs_f64().max(f64::EPSILON);
    *index = (*index + 1) % history.len();

    (history.iter().sum::<f64>() / history.len() as f64).round()
}

fn save_frame(img: &Image, dir: &Path, quality: i32) -> Result<(), Box<dyn Error>> {
    let path = dir.join(format!("frame{:06}.jpeg", img.sequence()));
    if img.format() == PixelFormat::Jpeg {
        fs::write(&path, img.data())?;
    } else {
        let now = Instant::now();
        let jpeg = encode_jpeg(img, quality)?;
        trace!(encode = ?now.elapsed(), bytes = jpeg.len(), "frame encoded");
        fs::write(&path, &jpeg)?;
    }
    debug!(path = %path.display(), "frame saved");
    Ok(())
}

fn capture_loop<I, E, C>(
    mut ctx: CaptureContext<I, E, C>,
    geometry: CaptureGeometry,
    args: Args,
) -> CaptureStats
where
    I: CaptureInterface,
    E: CopyEngine,
    C: CacheMaintenance,
{
    let mut prev = Instant::now();
    let mut history = vec![0.0; 30];
    let mut index = 0;
    let mut captured = 0;

    while args.frames == 0 || captured < args.frames {
        match ctx.snapshot(&geometry) {
            Ok(img) => {
                captured += 1;
                let fps = update_fps(&mut prev, &mut history, &mut index);
                if args.verbose {
                    debug!(%img, capture = ?img.duration(), fps, "frame captured");
                }
                if let Some(dir) = &args.output {
                    if let Err(e) = save_frame(&img, dir, args.jpeg_quality) {
                        warn!(%e, "failed to save frame");
                    }
                }
            }
            Err(e) if e.is_transient() => warn!(%e, "capture failed, retrying"),
            Err(e) => error!(%e, "capture failed"),
        }
        ctx.release_frame();
    }

    let stats = ctx.stats();
    ctx.shutdown();
    stats
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;
    info!(args = %args.summary(), "EdgeFirst Parallel Capture");

    let geometry = CaptureGeometry::try_from(&args)?;
    let config = ContextConfig::from(&args);
    if let Some(dir) = &args.output {
        fs::create_dir_all(dir)?;
    }

    let irq = Interrupts::new();
    let rig = SimRig::new(&irq, geometry.width, geometry.height);
    let interface = rig.interface.with_pacing(Pacing::External);
    let sensor = interface.handle();
    let ctx = CaptureContext::new(interface, rig.engine, HostCache, irq, config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_time()
        .thread_name("capture")
        .build()?;

    let period = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let started = Instant::now();
    let stats = runtime.block_on(async move {
        // Sensor frames arrive at a fixed rate whether or not a capture is
        // armed; frames starting while idle are lost, as on hardware.
        let pacer = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                if !sensor.vsync() {
                    trace!("vsync while capture idle");
                }
            }
        });
        let stats = tokio::task::spawn_blocking(move || capture_loop(ctx, geometry, args)).await;
        pacer.abort();
        stats
    })?;

    let elapsed = started.elapsed();
    let report = json!({
        "elapsed_ms": elapsed.as_millis() as u64,
        "fps": stats.retires as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        "frames": stats.frames,
        "retires": stats.retires,
        "drops": stats.drops,
        "timeouts": stats.timeouts,
        "overflows": stats.overflows,
        "faults": stats.faults,
        "line_irqs": stats.line_irqs,
        "hw_line_triggers": stats.hw_line_triggers,
        "bytes": stats.bytes,
    });
    info!(stats = %report, "capture finished");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

//! Entrypoint: parses configuration, wires the mapping/writer/ingest
//! components together, and drives either live DDP ingest or clip
//! playback until a signal or a configured duration stops it.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;

use core_config::{AppConfig, RawConfig};
use core_ddp::{Assembler, completed_queue};
use core_pacing::WriterLoop;
use core_player::{Clip, ClipPlayer, PlaybackOptions};
use core_supervisor::{Mode, Supervisor};
use core_telemetry::{Counters, Reporter};
use core_writer::Writer;

const IDLE_SLEEP: Duration = Duration::from_micros(100);

#[derive(Parser, Debug)]
#[command(name = "ddpwall", version, about = "DDP-to-FPP overlay pixel delivery core")]
struct Args {
    #[arg(long, env = "WALL_HOST", default_value = "0.0.0.0")]
    host: String,
    #[arg(long, env = "WALL_PORT", default_value_t = 4049)]
    port: u16,
    #[arg(long, env = "WALL_WIDTH", default_value_t = 90)]
    width: usize,
    #[arg(long, env = "WALL_HEIGHT", default_value_t = 50)]
    height: usize,
    #[arg(long, env = "WALL_MODEL", default_value = "Light_Wall")]
    model: String,
    #[arg(long, env = "WALL_MAX_FPS", default_value_t = 20.0)]
    max_fps: f64,
    #[arg(long, env = "WALL_FRAME_TIMEOUT_MS", default_value_t = 100)]
    frame_timeout_ms: u64,
    #[arg(long, env = "WALL_BATCH_LIMIT", default_value_t = 200)]
    batch_limit: usize,
    /// 0 means run until stopped by a signal.
    #[arg(long, env = "WALL_DURATION_SEC", default_value_t = 0)]
    duration_sec: u64,
    #[arg(long, env = "WALL_GAMMA")]
    gamma: Option<f32>,
    #[arg(long, env = "WALL_CHANNEL_ORDER", default_value = "RGB")]
    channel_order: String,
    #[arg(long, env = "WALL_GAIN_R", default_value_t = 1.0)]
    gain_r: f32,
    #[arg(long, env = "WALL_GAIN_G", default_value_t = 1.0)]
    gain_g: f32,
    #[arg(long, env = "WALL_GAIN_B", default_value_t = 1.0)]
    gain_b: f32,
    #[arg(long, env = "WALL_MAPPING_CSV")]
    mapping_csv: Option<PathBuf>,

    /// Path to a clip archive. When set, plays the clip instead of
    /// listening for live DDP traffic; the control API that would select
    /// this at runtime is out of scope, so the choice is fixed at startup.
    #[arg(long, env = "WALL_PLAY")]
    play: Option<PathBuf>,
    #[arg(long, env = "WALL_PLAY_FPS")]
    play_fps: Option<f32>,
    #[arg(long, env = "WALL_PLAY_BRIGHTNESS")]
    play_brightness: Option<f32>,
    #[arg(long, env = "WALL_PLAY_START", default_value_t = 0)]
    play_start: usize,
    #[arg(long, env = "WALL_PLAY_END")]
    play_end: Option<usize>,
    #[arg(long, env = "WALL_PLAY_SPEED", default_value_t = 1.0)]
    play_speed: f32,
    /// 0 means loop forever.
    #[arg(long, env = "WALL_PLAY_REPEAT", default_value_t = 1)]
    play_repeat: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = configure_logging()?;
    install_panic_hook();

    let raw = RawConfig {
        host: args.host.clone(),
        port: args.port,
        width: args.width,
        height: args.height,
        model: args.model.clone(),
        max_fps: args.max_fps,
        frame_timeout_ms: args.frame_timeout_ms,
        batch_limit: args.batch_limit,
        duration_sec: args.duration_sec,
        gamma: args.gamma,
        channel_order: args.channel_order.clone(),
        channel_gains: (args.gain_r, args.gain_g, args.gain_b),
        mapping_csv: args.mapping_csv.clone(),
    };
    let config = AppConfig::validate(raw).context("invalid configuration")?;

    tracing::info!(
        width = config.width,
        height = config.height,
        model = %config.model,
        max_fps = config.max_fps,
        mode = if args.play.is_some() { "playback" } else { "live" },
        "startup"
    );

    let routing = core_mapping::load(config.mapping_csv.as_deref(), config.width, config.height);

    let writer = Writer::new(
        config.width,
        config.height,
        &config.overlay_path(),
        routing,
        config.correction.clone(),
        &config.model,
    );
    if writer.is_degraded() {
        tracing::warn!("writer_running_in_degraded_mode");
    }

    let mode = if args.play.is_some() { Mode::Playback } else { Mode::Live };
    let supervisor = Supervisor::new(mode, config.duration);
    supervisor
        .install_signal_handlers()
        .context("failed to install signal handlers")?;

    let counters = Counters::new();
    let mut reporter = Reporter::new(Arc::clone(&counters));

    match mode {
        Mode::Live => run_live(&config, writer, counters, &mut reporter, &supervisor)?,
        Mode::Playback => {
            let clip_path = args.play.as_ref().expect("mode is Playback only when --play is set");
            run_playback(&args, clip_path, writer, &supervisor)?;
        }
    }

    reporter.summary();
    tracing::info!("shutdown_complete");
    Ok(())
}

fn run_live(
    config: &AppConfig,
    writer: Writer,
    counters: Arc<Counters>,
    reporter: &mut Reporter,
    supervisor: &Supervisor,
) -> Result<()> {
    let socket = core_net::bind(&config.host, config.port)
        .with_context(|| format!("failed to bind udp socket on {}:{}", config.host, config.port))?;

    let (producer, consumer) = completed_queue(core_ddp::DEFAULT_CAPACITY);
    let assembler = Assembler::new(
        config.frame_size_bytes(),
        core_ddp::DEFAULT_MAX_ACTIVE,
        config.frame_timeout,
        producer,
    );

    let net_stop = supervisor.stop_flag();
    let net_counters = Arc::clone(&counters);
    let batch_limit = config.batch_limit;
    let net_thread = std::thread::spawn(move || {
        let mut receiver = core_net::Receiver::new(socket, assembler, net_counters, batch_limit);
        receiver.run(&net_stop);
    });

    let mut writer_loop = WriterLoop::new(consumer, writer, config.max_fps, Arc::clone(&counters));
    while !supervisor.should_stop() {
        if !writer_loop.tick() {
            std::thread::sleep(IDLE_SLEEP);
        }
        reporter.tick(Instant::now());
    }
    writer_loop.writer().close();

    net_thread.join().expect("udp receive thread panicked");
    Ok(())
}

fn run_playback(args: &Args, clip_path: &PathBuf, mut writer: Writer, supervisor: &Supervisor) -> Result<()> {
    let clip = Clip::load(clip_path)
        .with_context(|| format!("failed to load clip archive {}", clip_path.display()))?;

    let options = PlaybackOptions {
        target_fps: args.play_fps,
        brightness: args.play_brightness,
        start: args.play_start,
        end: args.play_end,
        speed: args.play_speed,
        repeat: if args.play_repeat == 0 { None } else { Some(args.play_repeat) },
    };

    let stop = supervisor.stop_flag();
    let mut player = ClipPlayer::new(&clip, options);
    let written = player.run(&mut writer, &stop);
    writer.close();

    tracing::info!(frames_written = written, "playback_complete");
    Ok(())
}

fn configure_logging() -> Result<WorkerGuard> {
    let file_appender = tracing_appender::rolling::never(".", "ddpwall.log");
    let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(nb_writer)
        .try_init()
        .ok();
    Ok(guard)
}

fn install_panic_hook() {
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!(target: "runtime.panic", ?info, "panic");
        default_panic(info);
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_args_parse_with_defaults() {
        let args = Args::parse_from(["ddpwall"]);
        assert_eq!(args.port, 4049);
        assert_eq!(args.width, 90);
        assert_eq!(args.height, 50);
        assert!(args.play.is_none());
    }

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn play_flag_selects_playback_mode() {
        let args = Args::parse_from(["ddpwall", "--play", "clip.zip"]);
        assert_eq!(args.play, Some(PathBuf::from("clip.zip")));
    }
}

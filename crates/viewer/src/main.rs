mod assets;
mod replay_file;
mod transport;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;

use assets::GltfLoader;
use replay::consumers::ConsumerSet;
use replay::{ClientConfig, ConnectionParams, ReplayClient, ReplayPlayer};
use replay_file::ReplayFile;
use transport::TcpTransport;

#[derive(Parser)]
#[command(name = "viewer")]
#[command(about = "Headless gfx-replay viewer")]
struct Args {
    #[arg(
        short,
        long,
        help = "Launch URL whose query carries the connection parameters (e.g., https://host/?server_hostname=10.0.0.2&server_port_range=8888-8890)"
    )]
    url: Option<String>,

    #[arg(short, long, default_value = "viewer_config.json")]
    config: PathBuf,

    #[arg(short, long, default_value = ".", help = "Directory server asset paths are relative to")]
    assets: PathBuf,

    #[arg(long, default_value_t = 60)]
    fps: u32,

    #[arg(long, help = "Play a recorded keyframe file instead of connecting")]
    replay: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match ClientConfig::load_or_create(&args.config) {
        Ok(config) => config,
        Err(e) => {
            log::warn!("{}, using defaults", e);
            ClientConfig::default()
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?;

    runtime.block_on(async {
        let running = Arc::new(AtomicBool::new(true));
        {
            let running = running.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::info!("Shutdown requested");
                }
                running.store(false, Ordering::SeqCst);
            });
        }

        match &args.replay {
            Some(path) => run_replay(&args, &config, path, &running).await,
            None => run_client(&args, &config, &running).await,
        }
    })
}

fn frame_interval(fps: u32) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / f64::from(fps.max(1))));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn run_client(args: &Args, config: &ClientConfig, running: &AtomicBool) -> Result<()> {
    let params = args
        .url
        .as_deref()
        .map(ConnectionParams::from_url)
        .unwrap_or_default();
    if !params.is_empty() {
        log::info!("Launched with {} connection parameters", params.len());
    }

    let transport = TcpTransport::new(tokio::runtime::Handle::current());
    let loader = GltfLoader::new(&args.assets);
    let mut client = ReplayClient::new(config, params, transport, loader);

    let mut interval = frame_interval(args.fps);
    let mut last_status: Option<String> = None;

    while running.load(Ordering::SeqCst) {
        interval.tick().await;
        client.update(Instant::now());

        let status = client.status().map(str::to_string);
        if status != last_status {
            if let Some(text) = &status {
                log::info!("{}", text);
            }
            last_status = status;
        }
    }

    client.shutdown();
    log::info!("Viewer shutting down");
    Ok(())
}

async fn run_replay(
    args: &Args,
    config: &ClientConfig,
    path: &std::path::Path,
    running: &AtomicBool,
) -> Result<()> {
    let keyframe_period = replay::scene::keyframe_interval(config.keyframe_rate);
    let mut file = ReplayFile::open(path, keyframe_period)?;
    log::info!("Playing {} without networking", path.display());

    let consumers = ConsumerSet::new(config.highlights.clone(), config.text_pool_size);
    let mut player = ReplayPlayer::new(GltfLoader::new(&args.assets), consumers, config.transform_mode);
    player.set_keyframe_rate(config.keyframe_rate);

    let mut interval = frame_interval(args.fps);
    let mut last = Instant::now();
    let mut reported_end = false;

    while running.load(Ordering::SeqCst) {
        interval.tick().await;
        let now = Instant::now();
        let dt = now.saturating_duration_since(last).as_secs_f32();
        last = now;

        file.update(&mut player, now);
        player.tick(now, dt);

        if file.is_finished() && !reported_end {
            log::info!("Reached the end of {}, press Ctrl-C to exit", path.display());
            reported_end = true;
        }
    }

    log::info!(
        "Played {} keyframes, {} instances live",
        file.played(),
        player.registry().len()
    );
    player.delete_all_instances();
    Ok(())
}

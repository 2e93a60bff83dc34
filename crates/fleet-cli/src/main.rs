use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use fleet_core::{store::FleetStore, EngineConfig, Fleet, Lanes, Sweeper};
use fleet_geo::{build_index, FenceSet, LatLng};
use fleet_proto::telemetry::TelemetryMessage;
use fleet_proto::topic::DEFAULT_PREFIX;
use fleet_sink::{doctor as sink_doctor, SpoolWriter, StdoutWriter};

#[derive(Debug, Parser)]
#[command(name = "fleetd", version, about = "Golf cart fleet telemetry and geofence event engine")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate config, fleet store and spool directory.
    Doctor,
    /// Process telemetry until end of input or Ctrl-C.
    Run,
    /// Print the fences of a course that contain a point.
    Check {
        #[arg(long)]
        course: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
    },
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    #[serde(default)]
    engine: EngineConfig,
    input: InputCfg,
    sink: SinkCfg,
    store: StoreCfg,
}

#[derive(Debug, serde::Deserialize)]
struct InputCfg {
    source: String,
    path: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
struct SinkCfg {
    kind: String,
    #[serde(default = "default_spool_dir")]
    spool_dir: String,
    #[serde(default = "default_spool_max_mb")]
    spool_max_mb: u64,
    topic_prefix: Option<String>,
}

fn default_spool_dir() -> String { "spool".into() }
fn default_spool_max_mb() -> u64 { 64 }

#[derive(Debug, serde::Deserialize)]
struct StoreCfg {
    path: String,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg).await?,
        Command::Run => run(&cfg).await?,
        Command::Check { course, lat, lng } => check(&cfg, &course, LatLng::new(lat, lng))?,
    }
    Ok(())
}

async fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    cfg.engine.check()?;

    match cfg.input.source.as_str() {
        "ndjson-file" => {
            let path = cfg.input.path.as_ref().context("input.path missing")?;
            anyhow::ensure!(std::path::Path::new(path).is_file(), "input.path not a file: {}", path);
        }
        "stdin" => {}
        other => anyhow::bail!("unknown input.source: {}", other),
    }

    match cfg.sink.kind.as_str() {
        "spool" => sink_doctor::check_spool(&cfg.sink.spool_dir, cfg.sink.spool_max_mb)?,
        "stdout" => {}
        other => anyhow::bail!("unknown sink.kind: {}", other),
    }

    let store = FleetStore::load(&cfg.store.path)?;
    let (_, rejected) = build_index(cfg.engine.index, store.geofences.clone());
    for r in &rejected {
        warn!("doctor: geofence {} would be excluded: {}", r.fence_id, r.error);
    }
    let fences = store.check()?;

    info!("doctor: OK ({} carts, {} active geofences)", store.carts.len(), fences);
    Ok(())
}

fn check(cfg: &Config, course: &str, point: LatLng) -> Result<()> {
    anyhow::ensure!(point.is_finite() && point.in_range(), "point out of range: {:?}", point);
    let store = FleetStore::load(&cfg.store.path)?;
    let (index, _) = build_index(cfg.engine.index, store.geofences.clone());
    let inside = index.containing(course, point);
    if inside.is_empty() {
        println!("INSIDE: none");
    }
    for f in &inside {
        let limit = f.speed_limit.map(|l| format!("{} km/h", l)).unwrap_or_else(|| "-".into());
        println!("INSIDE: {} ({}) type={} limit={}", f.id, f.name, f.fence_type.as_str(), limit);
    }

    // nearest vertex of every other fence on the course
    let (set, _) = FenceSet::build(store.geofences);
    for f in set.fences().iter().filter(|f| f.golf_course_id == course) {
        if inside.iter().any(|i| i.id == f.id) { continue; }
        let nearest = f.ring.vertices().iter()
            .map(|v| v.distance_m(&point))
            .fold(f64::INFINITY, f64::min);
        println!("near: {} type={} nearest_vertex={:.1}m", f.id, f.fence_type.as_str(), nearest);
    }
    Ok(())
}

async fn open_input(cfg: &InputCfg) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match cfg.source.as_str() {
        "ndjson-file" => {
            let path = cfg.path.as_ref().context("input.path missing")?;
            let f = tokio::fs::File::open(path).await.with_context(|| format!("open {}", path))?;
            Ok(Box::new(BufReader::new(f)))
        }
        "stdin" => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
        other => anyhow::bail!("unknown input.source: {}", other),
    }
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");
    cfg.engine.check()?;

    let store = FleetStore::load(&cfg.store.path)?;
    let input = open_input(&cfg.input).await?;

    let prefix = cfg.sink.topic_prefix.as_deref().unwrap_or(DEFAULT_PREFIX);
    let (sink, rx) = fleet_sink::channel(prefix, cfg.engine.lane_queue * cfg.engine.lanes);
    let writer = match cfg.sink.kind.as_str() {
        "spool" => {
            let w = SpoolWriter::new(cfg.sink.spool_dir.clone(), cfg.sink.spool_max_mb);
            tokio::spawn(w.run(rx))
        }
        "stdout" => tokio::spawn(StdoutWriter.run(rx)),
        other => anyhow::bail!("unknown sink.kind: {}", other),
    };

    let fleet = Arc::new(Fleet::new(cfg.engine.clone(), Arc::new(sink)));
    fleet.load_carts(store.carts);
    for e in fleet.replace_geofences(store.geofences) {
        warn!("run: {}", e);
    }

    let lanes = Lanes::spawn(fleet.clone());
    let sweeper = Sweeper::spawn(fleet.clone());

    let mut lines = input.lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut line_no = 0u64;
    let mut busy = 0u64;
    loop {
        let line = tokio::select! {
            biased;
            _ = &mut ctrl_c => {
                info!("run: interrupted");
                interrupted = true;
                break;
            }
            l = lines.next_line() => l.context("read telemetry input")?,
        };
        let Some(line) = line else { break };
        line_no += 1;
        if line.trim().is_empty() { continue; }
        let msg = match TelemetryMessage::from_json_line(&line) {
            Ok(m) => m,
            Err(e) => {
                warn!("run: line {}: malformed telemetry: {}", line_no, e);
                continue;
            }
        };
        let msg = match lanes.try_submit(msg) {
            Ok(None) => continue,
            Ok(Some(msg)) => {
                busy += 1;
                debug!("run: line {}: lane busy for cart {}, waiting", line_no, msg.cart_id);
                msg
            }
            Err(e) => {
                warn!("run: line {}: {}", line_no, e);
                break;
            }
        };
        if let Err(e) = lanes.submit(msg).await {
            warn!("run: line {}: {}", line_no, e);
            break;
        }
    }

    // sweep first so nothing new is reported, then lanes, then the sink
    let offline = sweeper.stop().await;
    let stats = if interrupted { lanes.shutdown().await } else { lanes.drain().await };
    for id in fleet.cart_ids() {
        if let Some(cart) = fleet.cart(&id) {
            debug!("run: cart {} status={:?} last_ping={:?}", id, cart.status, cart.last_ping);
        }
    }
    fleet.close();
    drop(fleet);
    let written = writer.await.context("event writer task")?;

    info!(
        "run: done lines={} processed={} rejected={} dropped={} lane_busy={} offline_reports={} events_written={}",
        line_no, stats.processed, stats.rejected, stats.dropped, busy, offline, written
    );
    Ok(())
}

//! Subcommand implementations.

use std::fs::{self, File, OpenOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use fs2::FileExt;
use hand_calibration::{Acquisition, CalibrationRecord, CalibrationStore, OperatorEvent, Progress};
use hand_control::PoseNormalizer;
use hand_link::{ActuationServer, FrameQueue, PoseSender};
use hand_types::{ActuatorBus, SimulatedSink, Timestamp};
use tokio::net::TcpListener;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::operator::{self, Command, HELP};
use crate::pattern;

/// Pause between the positions of a warm-up or joint test.
const MOTION_PAUSE: Duration = Duration::from_millis(300);

/// Only the simulated sink is built in; hardware drivers plug in through
/// `ActuatorSink`.
///
/// The bus serializes control and calibration inside this process only.
/// Separate `hand-node` processes exclude each other through
/// [`lock_hand`].
fn simulated_bus(config: &NodeConfig) -> Result<(SimulatedSink, Arc<ActuatorBus>)> {
    if !config.simulate {
        bail!("no hardware actuator driver in this build; run with --simulate");
    }
    let sink = SimulatedSink::new();
    let bus = ActuatorBus::new(sink.clone());
    Ok((sink, bus))
}

/// Takes the advisory lock `<calibration file>.lock`, held until the
/// returned file is dropped.
fn lock_hand(store: &CalibrationStore) -> Result<File> {
    let mut name = store.path().as_os_str().to_owned();
    name.push(".lock");
    let path = PathBuf::from(name);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.try_lock_exclusive()
        .with_context(|| format!("hand is in use by another process ({})", path.display()))?;
    debug!(path = %path.display(), "hand lock taken");
    Ok(file)
}

/// Runs the actuation server until interrupted.
pub async fn serve(config: NodeConfig) -> Result<()> {
    let (sink, bus) = simulated_bus(&config)?;
    let store = config.calibration_store();
    let _lock = lock_hand(&store)?;
    info!(path = %store.path().display(), "calibration store");

    let addr = config.link.addr();
    let server = ActuationServer::new(config.link, config.control, store, bus)
        .context("invalid server configuration")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let token = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
        }
        token.cancel();
    });

    server.serve(listener).await?;
    info!(
        sessions = server.sessions_started(),
        writes = sink.write_count(),
        "server stopped"
    );
    Ok(())
}

/// Test pattern parameters.
#[derive(Debug, Clone, Copy)]
pub struct PatternArgs {
    /// Frames per second.
    pub rate_hz: u32,
    /// Length of one open-close cycle.
    pub period: Duration,
    /// Total run time.
    pub duration: Duration,
}

/// Streams a synthetic open-close cycle to a server.
///
/// Frames go through the same normalizer and queue a tracker would use.
pub async fn send_test_pattern(config: NodeConfig, args: PatternArgs) -> Result<()> {
    ensure!(args.rate_hz > 0, "rate must be at least 1 Hz");
    let addr = config.link.addr();
    let sender = PoseSender::connect(addr, &config.link)
        .await
        .with_context(|| format!("failed to connect to {addr}"))?;
    info!(server = sender.server(), %addr, "streaming test pattern");

    let queue = Arc::new(FrameQueue::new(config.link.queue_capacity()));
    let producer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            produce(&queue, args).await;
            queue.close();
        })
    };

    let sent = sender.run(&queue).await?;
    producer.await?;
    info!(sent, overflow = queue.overflow_count(), "test pattern finished");
    Ok(())
}

async fn produce(queue: &FrameQueue, args: PatternArgs) {
    let normalizer = PoseNormalizer::new();
    let mut interval = tokio::time::interval(Duration::from_secs(1) / args.rate_hz);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let start = Instant::now();
    while start.elapsed() < args.duration {
        interval.tick().await;
        let elapsed = start.elapsed();
        let hand = pattern::synthetic_hand(pattern::cycle(elapsed, args.period));
        match normalizer.normalize(&hand, Timestamp::from_elapsed(elapsed)) {
            Ok(frame) => {
                queue.push(frame);
            }
            Err(e) => debug!(error = %e, "no frame this tick"),
        }
    }
}

/// Prints the stored calibration.
pub fn show_calibration(config: &NodeConfig, json: bool) -> Result<()> {
    let store = config.calibration_store();
    let record = store
        .load()
        .with_context(|| format!("failed to read {}", store.path().display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&store, &record);
    }
    Ok(())
}

fn print_record(store: &CalibrationStore, record: &CalibrationRecord) {
    println!("file:      {}", store.path().display());
    println!("stage:     {}", record.stage());
    println!("revision:  {}", record.revision());
    println!("verified:  {}", record.verified());
    if let Some(at) = record.modified_at() {
        println!("modified:  {}", at.to_rfc3339());
    }

    println!();
    println!("{:<8} {:>6} {:>6}", "channel", "min", "max");
    for (actuator, range) in record.ranges() {
        println!(
            "{:<8} {:>6} {:>6}",
            actuator.to_string(),
            range.min_pulse_us(),
            range.max_pulse_us()
        );
    }

    println!();
    println!("{:<11} {:>6} {:>7} {:>6}  polarity", "joint", "taut", "curled", "slack");
    for (joint, cal) in record.joints() {
        let slack = cal
            .slack_pulse_us()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        println!(
            "{:<11} {:>6} {:>7} {:>6}  {:?}",
            joint.name(),
            cal.taut_pulse_us(),
            cal.curled_pulse_us(),
            slack,
            cal.polarity()
        );
    }

    let missing = record.missing_joints();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|j| j.name()).collect();
        println!();
        println!("missing:   {} (live control refused)", names.join(", "));
    }
}

/// Interactive calibration driven by line commands on stdin.
pub fn calibrate(config: &NodeConfig) -> Result<()> {
    let (_sink, bus) = simulated_bus(config)?;
    let store = config.calibration_store();
    let _lock = lock_hand(&store)?;
    let mut acquisition =
        Acquisition::new(store.clone(), &bus).context("cannot start calibration")?;
    println!(
        "calibrating {} (stage: {}); type 'help' for commands",
        store.path().display(),
        acquisition.stage()
    );

    for line in std::io::stdin().lock().lines() {
        let line = line.context("failed to read stdin")?;
        let command = match operator::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                eprintln!("{msg}");
                continue;
            }
        };
        match apply(&mut acquisition, &store, command) {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => eprintln!("error: {e}"),
        }
    }

    if let Some(kind) = acquisition.abort() {
        warn!(procedure = %kind, "unfinished procedure discarded");
    }
    Ok(())
}

/// Executes one operator command. Returns true on quit.
fn apply(
    acquisition: &mut Acquisition,
    store: &CalibrationStore,
    command: Command,
) -> hand_calibration::Result<bool> {
    match command {
        Command::BeginRange(channels) => {
            let count = channels.len();
            acquisition.begin_range(channels)?;
            println!("range finding on {count} channels");
        }
        Command::BeginTendon(joints) => {
            let count = joints.len();
            acquisition.begin_tendon(joints)?;
            println!("tendon calibration on {count} joints");
        }
        Command::BeginVerify => {
            acquisition.begin_verification()?;
            let steps = acquisition.sweep_plan().map_or(0, |plan| plan.len());
            println!("verification sweep: {steps} steps");
        }
        Command::Event(event) => {
            let mut progress = acquisition.handle(event)?;
            report_pulse(&progress);
            if matches!(event, OperatorEvent::Warmup(_) | OperatorEvent::TestJoint(_)) {
                while acquisition.queued_steps() > 0 {
                    thread::sleep(MOTION_PAUSE);
                    progress = acquisition.handle(OperatorEvent::SweepStep)?;
                    report_pulse(&progress);
                }
            }
            println!("{} remaining", progress.remaining);
        }
        Command::Commit => {
            let record = acquisition.commit()?;
            println!("saved revision {} ({})", record.revision(), record.stage());
        }
        Command::Abort => match acquisition.abort() {
            Some(kind) => println!("{kind} aborted, store unchanged"),
            None => println!("no procedure active"),
        },
        Command::Status => {
            print_record(store, acquisition.record());
            match (acquisition.active(), acquisition.remaining()) {
                (Some(kind), Some(remaining)) => {
                    println!("\nactive: {kind}, {remaining} remaining");
                }
                _ => println!("\nno procedure active"),
            }
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(true),
    }
    Ok(false)
}

fn report_pulse(progress: &Progress) {
    if let Some((actuator, pulse)) = progress.commanded {
        println!("{actuator} -> {pulse} us");
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use colored::Colorize;
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use rxba_core::{BaEvent, MacAddr, SeqNum, Tid, WindowSize};
use rxba_hal::{BlockAckTx, PlatformClock, RadioRx, TimerService};
use rxba_mem::{RxBufferLease, RxBufferPool};
use rxba_reorder::{EngineConfig, FlushPolicy, ReorderEngine, RxReorderStats};
use rxba_std::{ChannelDispatcher, DelbaLog, Delivered, ManualTimer, StdClock, ThreadTimer};

mod sim;
use sim::{LinkProfile, SimRadio, Verifier};

const PEER: MacAddr = MacAddr([0x02, 0x00, 0x5e, 0x10, 0x00, 0x01]);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Policy {
    SkipHoles,
    Contiguous,
}

impl From<Policy> for FlushPolicy {
    fn from(p: Policy) -> Self {
        match p {
            Policy::SkipHoles => FlushPolicy::SkipHoles,
            Policy::Contiguous => FlushPolicy::ContiguousOnly,
        }
    }
}

/// Replays a simulated Block-Ack link through the reorder engine and checks
/// that delivery stays in order without duplicates.
#[derive(Parser)]
struct Cli {
    #[arg(long, default_value_t = 5000)] frames: u32,
    #[arg(long, default_value_t = 32)] window: u16,
    #[arg(long, default_value_t = 0)] ssn: u16,
    #[arg(long, default_value_t = 6)] tid: u8,
    #[arg(long, default_value_t = 0.02)] loss: f64,
    #[arg(long, default_value_t = 0.01)] dup: f64,
    /// Burst length within which frames are shuffled.
    #[arg(long, default_value_t = 8)] reorder: usize,
    /// Emit a BAR after every K bursts (0 disables).
    #[arg(long, default_value_t = 0)] bar_every: u32,
    /// Share of lost frames the radio reports as dropped.
    #[arg(long, default_value_t = 0.0)] fw_drop: f64,
    #[arg(long)] seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = Policy::SkipHoles)] policy: Policy,
    /// Airtime per burst, in milliseconds.
    #[arg(long, default_value_t = 2)] tick_ms: u64,
    /// Wall-clock timers instead of virtual time.
    #[arg(long)] realtime: bool,
}

impl Cli {
    fn validate(&self) -> anyhow::Result<()> {
        for (name, p) in [("loss", self.loss), ("dup", self.dup), ("fw-drop", self.fw_drop)] {
            anyhow::ensure!((0.0..=1.0).contains(&p), "--{name} must be a probability, got {p}");
        }
        anyhow::ensure!(self.reorder > 0, "--reorder must be at least 1");
        Ok(())
    }
}

enum Clock {
    Virtual(Arc<ManualTimer>),
    Wall(StdClock),
}

impl Clock {
    fn pass(&self, d: Duration) {
        match self {
            Clock::Virtual(timer) => {
                timer.advance(d);
            }
            Clock::Wall(_) => std::thread::sleep(d),
        }
    }

    fn elapsed(&self) -> Duration {
        match self {
            Clock::Virtual(timer) => timer.now(),
            Clock::Wall(clock) => Duration::from_micros(clock.now_us()),
        }
    }
}

fn drain(deliveries: &Receiver<Delivered<RxBufferLease>>, verifier: &mut Verifier) {
    while let Ok(d) = deliveries.try_recv() {
        verifier.check(&d.payload);
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    cli.validate()?;

    let window = WindowSize::new(cli.window).map_err(|e| anyhow::anyhow!("--window: {e}"))?;
    let ssn = SeqNum::new(cli.ssn).map_err(|e| anyhow::anyhow!("--ssn: {e}"))?;
    let tid = Tid::new(cli.tid).map_err(|e| anyhow::anyhow!("--tid: {e}"))?;
    let seed = cli.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!(">>> RXBA REPLAY: {} frames, win {}, ssn {}, seed {}", cli.frames, window, ssn, seed);
    if cli.reorder > window.slots() {
        warn!("reorder depth {} exceeds window {}; late frames will be dropped", cli.reorder, window);
    }

    let profile = LinkProfile {
        frames: cli.frames,
        ssn,
        loss: cli.loss,
        dup: cli.dup,
        reorder: cli.reorder,
        bar_every: cli.bar_every,
        fw_drop: cli.fw_drop,
    };
    let mut rng = StdRng::seed_from_u64(seed);
    let (steps, script) = sim::build_script(&profile, &mut rng);

    let (clock, timers): (Clock, Box<dyn TimerService>) = if cli.realtime {
        (Clock::Wall(StdClock::new()), Box::new(ThreadTimer::spawn("rxba-flush")?))
    } else {
        let timer = ManualTimer::new();
        (Clock::Virtual(timer.clone()), Box::new(timer))
    };

    let config = EngineConfig { flush_policy: cli.policy.into(), ..EngineConfig::default() };
    let flush_delay = config.flush_delay(window);
    let (dispatcher, deliveries) = ChannelDispatcher::new();
    let delba_tx: Box<dyn BlockAckTx> = Box::new(DelbaLog::new());
    let engine = ReorderEngine::new(config, Box::new(dispatcher), timers, Some(delba_tx));

    let pool = RxBufferPool::new(window.slots() + 16);
    let mut radio = SimRadio::new(PEER, tid, steps, pool);

    engine
        .handle_event(BaEvent::SetupAccepted {
            peer: PEER,
            tid,
            window_size: window,
            starting_seq: ssn,
            amsdu_allowed: true,
        })
        .map_err(|e| anyhow::anyhow!("session setup: {e}"))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        warn!("Signal received. Stopping...");
        r.store(false, Ordering::SeqCst);
    })?;

    let tick = Duration::from_millis(cli.tick_ms);
    let mut verifier = Verifier::default();
    let mut radio_errors = 0u64;
    while running.load(Ordering::SeqCst) && !radio.is_exhausted() {
        radio.poll_batch(usize::MAX, &mut |ind| {
            match ind {
                Ok(ind) => engine.handle_indication(ind),
                Err(e) => {
                    warn!("radio: {}", e);
                    radio_errors += 1;
                }
            }
            drain(&deliveries, &mut verifier);
        });
        clock.pass(tick);
        drain(&deliveries, &mut verifier);
    }

    // Let the last flush timer expire, then close the session.
    clock.pass(flush_delay + tick);
    drain(&deliveries, &mut verifier);
    engine.handle_event(BaEvent::Teardown { peer: PEER, tid }).ok();
    drain(&deliveries, &mut verifier);

    let stats = engine.stats();
    let missing = u64::from(script.unique_sent).saturating_sub(verifier.delivered);
    report(&cli, &script, &stats, &verifier, missing, clock.elapsed());

    anyhow::ensure!(verifier.violations == 0, "{} ordering violations", verifier.violations);
    anyhow::ensure!(radio_errors == 0, "{} radio errors (buffer pool exhausted?)", radio_errors);
    if !cli.realtime && cli.reorder <= window.slots() && running.load(Ordering::SeqCst) {
        anyhow::ensure!(missing == 0, "{} frames never delivered", missing);
    }
    Ok(())
}

fn report(
    cli: &Cli,
    script: &sim::ScriptSummary,
    stats: &RxReorderStats,
    verifier: &Verifier,
    missing: u64,
    elapsed: Duration,
) {
    let row = |name: &str, value: u64| println!("  {:<24} {}", name, value);

    println!("{}", "rxba-replay summary".bold());
    println!("  {:<24} {:?} ({})", "elapsed", elapsed, if cli.realtime { "wall" } else { "virtual" });
    println!("{}", "link".cyan());
    row("frames", cli.frames as u64);
    row("sent", script.unique_sent as u64);
    row("lost on air", script.lost as u64);
    row("reported by radio", script.fw_reported as u64);
    row("duplicated", script.duplicated as u64);
    row("block-ack requests", script.bars as u64);
    println!("{}", "engine".cyan());
    row("delivered", stats.delivered);
    row("released in order", stats.released);
    row("buffered", stats.buffered);
    row("forwarded (warm-up)", stats.forwarded_warmup);
    row("dropped duplicate", stats.dropped_duplicate);
    row("dropped out of window", stats.dropped_out_of_window);
    row("window advances", stats.window_advances);
    row("timer flushes", stats.timer_flushes);
    row("radio drop markers", stats.fw_dropped);
    println!("{}", "verdict".cyan());
    row("checked", verifier.delivered);
    row("missing", missing);
    if verifier.violations == 0 {
        println!("  {}", "IN ORDER, NO DUPLICATES".green().bold());
    } else {
        println!("  {} {}", "VIOLATIONS:".red().bold(), verifier.violations);
    }
}

//! Tiered voicemail trigger: beep and greeting-end detectors raced against
//! each other and a hard timeout.
//!
//! Each detector runs on its own thread over its own [`StreamNormalizer`].
//! The first detector to claim the shared [`CancellationFlag`] publishes its
//! event into a single-slot [`RaceSlot`]; the flag also tells the loser and
//! both normalizers to stop. If nobody claims it within `max_time_ms` the
//! orchestrator claims it and returns a timeout event. Both workers are
//! joined before [`TieredTrigger::run`] returns.

use crate::audio::{AudioInput, Pacer, StreamNormalizer};
use crate::config::Config;
use crate::detect::{
    BeepDetector, DetectionEvent, Detector, DetectorOutcome, GreetingEndDetector, run_detector,
};
use crate::error::{Result, TriggerError};
use crossbeam_channel::{Receiver, Sender, bounded, select};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// One-shot cooperative stop signal shared by one trigger invocation.
///
/// Transitions false → true at most once and is never reset.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag if nobody has yet; returns true for the single caller that did.
    pub fn try_claim(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Set the flag unconditionally.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// First-writer-wins result cell.
///
/// Only the caller that claims the flag sends, so the capacity-one channel
/// never blocks; later publishers are no-ops.
#[derive(Debug, Clone)]
pub struct RaceSlot {
    tx: Sender<DetectionEvent>,
    rx: Receiver<DetectionEvent>,
}

impl Default for RaceSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl RaceSlot {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self { tx, rx }
    }

    /// Claim `cancel` and store `event`; returns whether this call won.
    pub fn publish(&self, cancel: &CancellationFlag, event: DetectionEvent) -> bool {
        if !cancel.try_claim() {
            return false;
        }
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!("race slot rejected a claimed event: {e}");
                false
            }
        }
    }

    pub fn receiver(&self) -> &Receiver<DetectionEvent> {
        &self.rx
    }

    pub fn take(&self) -> Option<DetectionEvent> {
        self.rx.try_recv().ok()
    }
}

/// What ended the orchestrator's wait.
enum Wait {
    Published(DetectionEvent),
    AllWorkersDone,
    Deadline,
}

/// Races beep detection, greeting-end detection and a timeout.
pub struct TieredTrigger {
    config: Config,
    pacer: Option<Arc<dyn Pacer>>,
}

impl TieredTrigger {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            pacer: None,
        }
    }

    /// Sets a custom pacer for both normalizers (for deterministic testing).
    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = Some(pacer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn max_time(&self) -> Duration {
        Duration::from_millis(self.config.trigger.max_time_ms)
    }

    /// Run one race over `input` and return exactly one event.
    ///
    /// Configuration and format errors are returned before any worker starts.
    pub fn run(&self, input: &dyn AudioInput) -> Result<DetectionEvent> {
        self.run_with_cancellation(input, CancellationFlag::new())
    }

    /// Like [`run`](Self::run), with a caller-held flag that aborts the race.
    ///
    /// An aborted race resolves to the timeout event.
    pub fn run_with_cancellation(
        &self,
        input: &dyn AudioInput,
        cancel: CancellationFlag,
    ) -> Result<DetectionEvent> {
        self.config.validate()?;
        let max_time_ms = self.config.trigger.max_time_ms;

        // Two independent chunk streams over the same recording
        let beep_chunks = self.normalizer(input, &cancel)?;
        let vad_chunks = self.normalizer(input, &cancel)?;
        let beep = BeepDetector::new(&self.config.beep, &self.config.audio);
        let vad = GreetingEndDetector::new(&self.config.vad, &self.config.audio);

        let slot = RaceSlot::new();
        // Never sent on; disconnects once every worker has exited.
        let (done_tx, done_rx) = bounded::<()>(0);

        let started = Instant::now();
        let mut workers = Vec::with_capacity(2);
        match spawn_worker(beep, beep_chunks, &cancel, &slot, done_tx.clone()) {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                cancel.cancel();
                return Err(e.into());
            }
        }
        match spawn_worker(vad, vad_chunks, &cancel, &slot, done_tx) {
            Ok(handle) => workers.push(handle),
            Err(e) => {
                cancel.cancel();
                join_workers(workers);
                return Err(e.into());
            }
        }

        let wait = wait_for_winner(&slot, &done_rx, started + self.max_time());
        let timed_out = matches!(wait, Wait::Deadline) && cancel.try_claim();
        cancel.cancel();

        let panicked = join_workers(workers);
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, "workers joined");

        if timed_out {
            info!(max_time_ms, "no detection before deadline, falling back to timeout");
            return Ok(DetectionEvent::timeout(max_time_ms));
        }

        let winner = match wait {
            Wait::Published(event) => Some(event),
            Wait::AllWorkersDone | Wait::Deadline => slot.take(),
        };
        match (winner, panicked.first()) {
            (Some(event), _) => {
                info!(
                    mode = event.mode.map(|m| m.as_str()),
                    timestamp_ms = event.timestamp_ms,
                    "race won"
                );
                Ok(event)
            }
            (None, Some(worker)) => Err(TriggerError::WorkerPanicked {
                worker: worker.clone(),
            }),
            (None, None) => {
                info!(max_time_ms, "no detector confirmed, falling back to timeout");
                Ok(DetectionEvent::timeout(max_time_ms))
            }
        }
    }

    fn normalizer(
        &self,
        input: &dyn AudioInput,
        cancel: &CancellationFlag,
    ) -> Result<StreamNormalizer> {
        let mut normalizer = StreamNormalizer::new(input.open()?, &self.config.audio)?
            .with_cancellation(cancel.clone());
        if let Some(pacer) = &self.pacer {
            normalizer = normalizer.with_pacer(Box::new(Arc::clone(pacer)));
        }
        Ok(normalizer)
    }
}

fn wait_for_winner(slot: &RaceSlot, done_rx: &Receiver<()>, deadline: Instant) -> Wait {
    let timeout = deadline.saturating_duration_since(Instant::now());
    select! {
        recv(slot.receiver()) -> msg => match msg {
            Ok(event) => Wait::Published(event),
            // The slot keeps its own sender alive
            Err(_) => Wait::AllWorkersDone,
        },
        recv(done_rx) -> _ => Wait::AllWorkersDone,
        default(timeout) => Wait::Deadline,
    }
}

fn spawn_worker<D: Detector + 'static>(
    mut detector: D,
    chunks: StreamNormalizer,
    cancel: &CancellationFlag,
    slot: &RaceSlot,
    done: Sender<()>,
) -> std::io::Result<JoinHandle<()>> {
    let cancel = cancel.clone();
    let slot = slot.clone();
    thread::Builder::new()
        .name(format!("vmtrigger-{}", detector.name()))
        .spawn(move || {
            let _done = done;
            let name = detector.name();
            match run_detector(&mut detector, chunks, Some(&cancel)) {
                Ok(DetectorOutcome::Detected(event)) => {
                    if slot.publish(&cancel, event) {
                        debug!(worker = name, "published detection");
                    } else {
                        debug!(worker = name, "detection lost the race");
                    }
                }
                Ok(DetectorOutcome::Exhausted(sentinel)) => {
                    debug!(
                        worker = name,
                        elapsed_ms = sentinel.timestamp_ms,
                        "stream exhausted without detection"
                    );
                }
                Ok(DetectorOutcome::Cancelled) => {
                    debug!(worker = name, "cancelled");
                }
                Err(e) => {
                    warn!(worker = name, "stream failed: {e}");
                }
            }
        })
}

/// Join every worker; returns the names of those that panicked.
fn join_workers(workers: Vec<JoinHandle<()>>) -> Vec<String> {
    let mut panicked = Vec::new();
    for handle in workers {
        let name = handle.thread().name().unwrap_or("worker").to_string();
        if let Err(panic_info) = handle.join() {
            let msg = panic_info
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic");
            error!("{name} panicked: {msg}");
            panicked.push(name);
        }
    }
    panicked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::PcmBuffer;
    use crate::detect::DetectionMode;

    fn fast_config() -> Config {
        let mut config = Config::default();
        config.audio.realtime = false;
        config
    }

    #[test]
    fn flag_claims_once() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.try_claim());
        assert!(flag.is_cancelled());
        assert!(!flag.try_claim());
        assert!(!flag.clone().try_claim());
    }

    #[test]
    fn cancel_blocks_later_claims() {
        let flag = CancellationFlag::new();
        flag.cancel();
        assert!(!flag.try_claim());
    }

    #[test]
    fn slot_first_writer_wins() {
        let flag = CancellationFlag::new();
        let slot = RaceSlot::new();
        let first = DetectionEvent::detected(DetectionMode::Beep, 100);
        let second = DetectionEvent::detected(DetectionMode::Vad, 50);

        assert!(slot.publish(&flag, first));
        // Second publish is a no-op and does not block
        assert!(!slot.publish(&flag, second));
        assert_eq!(slot.take(), Some(first));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn concurrent_publishers_store_exactly_one() {
        for _ in 0..50 {
            let flag = CancellationFlag::new();
            let slot = RaceSlot::new();
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let (flag, slot) = (flag.clone(), slot.clone());
                    thread::spawn(move || {
                        slot.publish(&flag, DetectionEvent::detected(DetectionMode::Vad, i))
                    })
                })
                .collect();
            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&won| won)
                .count();
            assert_eq!(wins, 1);
            assert!(slot.take().is_some());
            assert!(slot.take().is_none());
        }
    }

    #[test]
    fn silent_input_falls_back_to_timeout_without_waiting() {
        let trigger = TieredTrigger::new(fast_config());
        let input = PcmBuffer::mono(vec![0; 8000], 8000);

        let started = Instant::now();
        let event = trigger.run(&input).unwrap();
        assert_eq!(event, DetectionEvent::timeout(25_000));
        // Both streams were exhausted long before the deadline
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn deadline_produces_timeout_event() {
        let mut config = Config::default();
        config.trigger.max_time_ms = 150;
        let trigger = TieredTrigger::new(config);
        // 10 s of silence at real-time pace outlasts the deadline
        let input = PcmBuffer::mono(vec![0; 80_000], 8000);

        let started = Instant::now();
        let event = trigger.run(&input).unwrap();
        let elapsed = started.elapsed();

        assert_eq!(event, DetectionEvent::timeout(150));
        assert!(elapsed >= Duration::from_millis(150));
        assert!(elapsed < Duration::from_secs(2), "join took {:?}", elapsed);
    }

    #[test]
    fn invalid_config_fails_before_running() {
        let mut config = fast_config();
        config.audio.chunk_ms = 0;
        let trigger = TieredTrigger::new(config);
        let input = PcmBuffer::mono(vec![0; 160], 8000);
        assert!(trigger.run(&input).unwrap_err().is_configuration());
    }

    #[test]
    fn unsupported_channels_fail_before_running() {
        let trigger = TieredTrigger::new(fast_config());
        let input = PcmBuffer::new(vec![0; 480], 8000, 3);
        assert!(matches!(
            trigger.run(&input).unwrap_err(),
            TriggerError::UnsupportedChannels { channels: 3 }
        ));
    }

    #[test]
    fn external_cancellation_stops_workers() {
        let trigger = TieredTrigger::new(Config::default());
        let input = PcmBuffer::mono(vec![0; 80_000], 8000);
        let flag = CancellationFlag::new();

        let canceller = {
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                flag.cancel();
            })
        };

        let started = Instant::now();
        let event = trigger.run_with_cancellation(&input, flag).unwrap();
        canceller.join().unwrap();

        assert_eq!(event.mode, Some(DetectionMode::Timeout));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}

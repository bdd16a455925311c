//! The sleepwalking session: explore, dream, persist, rest, repeat.
//!
//! One [`SessionOrchestrator`] owns the explorer, the experience pair, and
//! the artifact writer, and drives them on the calling thread until the
//! [`ShutdownToken`] is set or the configured cycle count is reached. Rest
//! periods are slept in one-second slices so a shutdown request is noticed
//! promptly. Cycle failures are logged and turned into a pause; only startup
//! failures are returned to the caller.

pub mod awake;
pub mod idle;
pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::Local;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, SleepwalkerConfig};
use crate::error::{SleepwalkerError, SleepwalkerResult};
use crate::experience::{ExperienceError, ExperienceKit};
use crate::explore::safety::resolve_roots;
use crate::explore::{Discovery, Explorer, ExplorerConfig};

use self::awake::SleepPreventer;
use self::idle::IdleDetector;
use self::output::{DreamHeader, DreamWriter};

/// Longest single sleep while waiting, so shutdown is seen within about a second.
const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Items gathered from the root when the chosen spot yields nothing.
const FALLBACK_ITEMS: usize = 10;

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Cooperative cancellation shared between signal handlers and the loop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Route SIGINT and SIGTERM to this token.
    ///
    /// The first signal sets the token; a second one while it is set exits
    /// the process with status 1.
    pub fn register_signals(&self) -> SleepwalkerResult<()> {
        use signal_hook::consts::{SIGINT, SIGTERM};
        use signal_hook::flag;

        for sig in [SIGINT, SIGTERM] {
            flag::register_conditional_shutdown(sig, 1, Arc::clone(&self.flag))
                .map_err(|source| SleepwalkerError::Signals { source })?;
            flag::register(sig, Arc::clone(&self.flag))
                .map_err(|source| SleepwalkerError::Signals { source })?;
        }
        Ok(())
    }

    /// Sleep for `duration` in short slices. Returns `false` if shutdown cut it short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let mut remaining = duration;
        while !remaining.is_zero() {
            if self.is_requested() {
                return false;
            }
            let slice = remaining.min(SLEEP_SLICE);
            std::thread::sleep(slice);
            remaining -= slice;
        }
        !self.is_requested()
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Cycle pacing and artifact retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Fewest discoveries gathered per cycle.
    #[serde(default = "default_min_items")]
    pub min_items: usize,
    /// Most discoveries gathered per cycle.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_min_rest_secs")]
    pub min_rest_secs: u64,
    #[serde(default = "default_max_rest_secs")]
    pub max_rest_secs: u64,
    /// Chance of starting a cycle in a random subdirectory of the chosen root.
    #[serde(default = "default_subdirectory_probability")]
    pub subdirectory_probability: f64,
    /// Artifacts kept when pruning.
    #[serde(default = "default_retention")]
    pub retention: usize,
    /// Prune after every this many cycles.
    #[serde(default = "default_prune_every")]
    pub prune_every: u64,
    /// Pause after a failed synthesis, in seconds.
    #[serde(default = "default_failure_pause_secs")]
    pub failure_pause_secs: u64,
    /// Pause after any other cycle error, in seconds.
    #[serde(default = "default_error_pause_secs")]
    pub error_pause_secs: u64,
    /// Stop after this many cycles (0 = run until interrupted).
    #[serde(default)]
    pub max_cycles: u64,
}

fn default_min_items() -> usize {
    5
}
fn default_max_items() -> usize {
    15
}
fn default_min_rest_secs() -> u64 {
    30
}
fn default_max_rest_secs() -> u64 {
    120
}
fn default_subdirectory_probability() -> f64 {
    0.3
}
fn default_retention() -> usize {
    100
}
fn default_prune_every() -> u64 {
    50
}
fn default_failure_pause_secs() -> u64 {
    10
}
fn default_error_pause_secs() -> u64 {
    30
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            max_items: default_max_items(),
            min_rest_secs: default_min_rest_secs(),
            max_rest_secs: default_max_rest_secs(),
            subdirectory_probability: default_subdirectory_probability(),
            retention: default_retention(),
            prune_every: default_prune_every(),
            failure_pause_secs: default_failure_pause_secs(),
            error_pause_secs: default_error_pause_secs(),
            max_cycles: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// What one successful cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub explored: PathBuf,
    pub discoveries: usize,
    pub artifact: PathBuf,
}

/// Totals for a finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub cycles: u64,
    pub dreams_written: u64,
    pub failed_cycles: u64,
}

/// Drives explore → synthesize → persist cycles.
pub struct SessionOrchestrator {
    roots: Vec<PathBuf>,
    explorer_config: ExplorerConfig,
    session: SessionConfig,
    kit: ExperienceKit,
    writer: DreamWriter,
    shutdown: ShutdownToken,
    preventer: SleepPreventer,
    idle: IdleDetector,
    explorer: Option<Explorer>,
    rng: StdRng,
    cycle: u64,
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("roots", &self.roots)
            .field("output_dir", &self.writer.dir())
            .field("cycle", &self.cycle)
            .finish_non_exhaustive()
    }
}

impl SessionOrchestrator {
    /// Prepare a session. Fails if no allowed directory exists or the output
    /// directory cannot be created.
    pub fn new(
        config: &SleepwalkerConfig,
        kit: ExperienceKit,
        shutdown: ShutdownToken,
    ) -> SleepwalkerResult<Self> {
        let roots = resolve_roots(&config.allowed_dirs);
        if roots.is_empty() {
            return Err(ConfigError::Invalid {
                field: "allowed_dirs".into(),
                message: "none of the allowed directories exist".into(),
            }
            .into());
        }
        let writer = DreamWriter::create(&config.output_dir)?;
        Ok(Self {
            roots,
            explorer_config: config.explorer.clone(),
            session: config.session.clone(),
            kit,
            writer,
            shutdown,
            preventer: SleepPreventer::system(),
            idle: IdleDetector::new(Duration::from_secs(config.idle_timeout_secs)),
            explorer: None,
            rng: StdRng::seed_from_u64(clock_seed()),
            cycle: 0,
        })
    }

    pub fn with_sleep_preventer(mut self, preventer: SleepPreventer) -> Self {
        self.preventer = preventer;
        self
    }

    pub fn with_idle_detector(mut self, idle: IdleDetector) -> Self {
        self.idle = idle;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn writer(&self) -> &DreamWriter {
        &self.writer
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Run cycles until shutdown or `max_cycles`, keeping the machine awake meanwhile.
    pub fn run(&mut self) -> RunSummary {
        let _awake = self.preventer.acquire();
        let mut summary = RunSummary::default();

        tracing::info!(
            roots = ?self.roots,
            output_dir = %self.writer.dir().display(),
            "sleepwalker starting"
        );

        while !self.shutdown.is_requested() && !self.cycle_limit_reached(summary.cycles) {
            if !self.idle.is_idle() {
                let wait = self.idle.remaining().clamp(SLEEP_SLICE, Duration::from_secs(60));
                tracing::debug!(wait_secs = wait.as_secs(), "user active, waiting for idle");
                self.shutdown.sleep(wait);
                continue;
            }

            self.cycle += 1;
            summary.cycles += 1;
            let cycle = self.cycle;

            let pause = match self.run_cycle(cycle) {
                Ok(report) => {
                    summary.dreams_written += 1;
                    tracing::info!(
                        cycle,
                        artifact = %report.artifact.display(),
                        discoveries = report.discoveries,
                        "dream saved"
                    );
                    None
                }
                Err(SleepwalkerError::Experience(ExperienceError::Synthesis(e))) => {
                    summary.failed_cycles += 1;
                    tracing::error!(cycle, error = %e, "dream generation failed");
                    Some(Duration::from_secs(self.session.failure_pause_secs))
                }
                Err(e) => {
                    summary.failed_cycles += 1;
                    tracing::error!(cycle, error = %e, "cycle failed");
                    Some(Duration::from_secs(self.session.error_pause_secs))
                }
            };

            if cycle % self.session.prune_every.max(1) == 0 {
                self.prune();
            }

            if let Some(pause) = pause {
                tracing::info!(pause_secs = pause.as_secs(), "pausing before the next cycle");
                self.shutdown.sleep(pause);
            }
            if self.shutdown.is_requested() || self.cycle_limit_reached(summary.cycles) {
                break;
            }

            let rest = self.rest_duration();
            tracing::info!(rest_secs = rest.as_secs(), "resting before next exploration");
            self.shutdown.sleep(rest);
        }

        tracing::info!(
            cycles = summary.cycles,
            dreams = summary.dreams_written,
            failed = summary.failed_cycles,
            "sleepwalker shutting down"
        );
        summary
    }

    fn cycle_limit_reached(&self, cycles_run: u64) -> bool {
        self.session.max_cycles > 0 && cycles_run >= self.session.max_cycles
    }

    /// One explore → synthesize → persist pass.
    pub fn run_cycle(&mut self, cycle: u64) -> SleepwalkerResult<CycleReport> {
        tracing::info!(cycle, "starting sleepwalk cycle");

        let root = self
            .roots
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| ConfigError::Invalid {
                field: "allowed_dirs".into(),
                message: "no allowed directories".into(),
            })?;

        let subdirectory_p = self.session.subdirectory_probability.clamp(0.0, 1.0);
        let explore_path = if cycle > 1 && self.rng.gen_bool(subdirectory_p) {
            let sub = random_subdirectory(&root, &self.explorer_config, &mut self.rng);
            if sub != root {
                tracing::info!(path = %sub.display(), "exploring subdirectory");
            }
            sub
        } else {
            root.clone()
        };

        let (lo, hi) = (self.session.min_items, self.session.max_items);
        let target = self.rng.gen_range(lo.min(hi)..=hi.max(lo));
        tracing::info!(path = %explore_path.display(), target, "exploring");

        let mut discoveries = self.gather(&explore_path, target);
        if discoveries.is_empty() && explore_path != root {
            tracing::warn!("no accessible items found, trying the root instead");
            discoveries = self.gather(&root, FALLBACK_ITEMS);
        }
        log_sample(&discoveries);

        for discovery in &discoveries {
            self.kit.collector.add_observation(discovery);
        }
        let observations = self.kit.collector.take_observations();

        tracing::info!(observations = observations.len(), "generating dream narrative");
        let result = self.kit.synthesizer.synthesize(&observations)?;

        let header = DreamHeader {
            cycle,
            generated_at: Local::now(),
            explored: &explore_path,
            discoveries: discoveries.len(),
        };
        let artifact = self.writer.write(&header, &result)?;

        Ok(CycleReport {
            cycle,
            explored: explore_path,
            discoveries: discoveries.len(),
            artifact,
        })
    }

    /// Walk from `start` for up to `target` steps.
    fn gather(&mut self, start: &Path, target: usize) -> Vec<Discovery> {
        let shutdown = self.shutdown.clone();
        let explorer = self.explorer();
        if !explorer.relocate(start) {
            tracing::debug!(path = %start.display(), "start point outside allowed roots, keeping position");
        }
        let mut found = Vec::with_capacity(target);
        for _ in 0..target {
            if shutdown.is_requested() || explorer.is_exhausted() {
                break;
            }
            if let Some(discovery) = explorer.wander() {
                tracing::debug!(
                    kind = %discovery.kind,
                    path = %discovery.path.display(),
                    "discovered"
                );
                found.push(discovery);
            }
        }
        found
    }

    /// The session explorer, replaced once it reaches its discovery cap.
    fn explorer(&mut self) -> &mut Explorer {
        if self.explorer.as_ref().is_some_and(Explorer::is_exhausted) {
            tracing::debug!("explorer reached its discovery limit, starting a fresh walk");
            self.explorer = None;
        }
        let roots = &self.roots;
        let config = &self.explorer_config;
        self.explorer
            .get_or_insert_with(|| Explorer::new(roots, config.clone()))
    }

    fn rest_duration(&mut self) -> Duration {
        let (lo, hi) = (self.session.min_rest_secs, self.session.max_rest_secs);
        Duration::from_secs(self.rng.gen_range(lo.min(hi)..=hi.max(lo)))
    }

    fn prune(&self) {
        match self.writer.prune(self.session.retention) {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "cleaned up old dreams"),
            Err(e) => tracing::warn!(error = %e, "failed to prune old dreams"),
        }
    }
}

/// A random subdirectory of `base` that is neither hidden nor skipped by
/// `config`, or `base` itself.
pub fn random_subdirectory(base: &Path, config: &ExplorerConfig, rng: &mut impl Rng) -> PathBuf {
    let subdirs: Vec<PathBuf> = match std::fs::read_dir(base) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .filter(|e| !config.is_skipped(&e.path()))
            .map(|e| e.path())
            .collect(),
        Err(e) => {
            tracing::debug!(path = %base.display(), error = %e, "cannot list directory");
            Vec::new()
        }
    };
    subdirs
        .choose(rng)
        .cloned()
        .unwrap_or_else(|| base.to_path_buf())
}

fn log_sample(discoveries: &[Discovery]) {
    tracing::info!(count = discoveries.len(), "found items in filesystem");
    for d in discoveries.iter().take(3) {
        match d.size_bytes {
            Some(size) => tracing::info!(kind = %d.kind, name = %d.name, size, "  item"),
            None => tracing::info!(kind = %d.kind, name = %d.name, "  item"),
        }
    }
    if discoveries.len() > 3 {
        tracing::info!(more = discoveries.len() - 3, "  and more");
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ u64::from(std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experience::{ExperienceMode, build_experience};
    use std::fs;
    use std::time::Instant;

    fn quiet_config(root: &Path, out: &Path) -> SleepwalkerConfig {
        let mut config = SleepwalkerConfig {
            allowed_dirs: vec![root.to_path_buf()],
            output_dir: out.to_path_buf(),
            ..Default::default()
        };
        config.session.min_rest_secs = 0;
        config.session.max_rest_secs = 0;
        config.session.failure_pause_secs = 0;
        config.session.error_pause_secs = 0;
        config
    }

    fn orchestrator(config: &SleepwalkerConfig) -> SessionOrchestrator {
        let kit = build_experience(ExperienceMode::Dream, None).unwrap();
        SessionOrchestrator::new(config, kit, ShutdownToken::new())
            .unwrap()
            .with_sleep_preventer(SleepPreventer::noop())
            .with_seed(7)
    }

    #[test]
    fn sleep_returns_early_on_shutdown() {
        let token = ShutdownToken::new();
        token.request();
        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn sleep_completes_without_shutdown() {
        assert!(ShutdownToken::new().sleep(Duration::from_millis(10)));
        assert!(ShutdownToken::new().sleep(Duration::ZERO));
    }

    #[test]
    fn shutdown_from_another_thread_is_seen_within_a_slice() {
        let token = ShutdownToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.request();
        });
        let started = Instant::now();
        assert!(!token.sleep(Duration::from_secs(10)));
        assert!(started.elapsed() < Duration::from_millis(2500));
        handle.join().unwrap();
    }

    #[test]
    fn missing_roots_fail_at_startup() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = quiet_config(&dir.path().join("nope"), &dir.path().join("out"));
        let kit = build_experience(ExperienceMode::Dream, None).unwrap();
        let err = SessionOrchestrator::new(&config, kit, ShutdownToken::new()).unwrap_err();
        assert!(matches!(err, SleepwalkerError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn cycle_writes_numbered_artifact() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("photos")).unwrap();
        fs::write(root.join("notes.txt"), "hello world").unwrap();
        let config = quiet_config(&root, &dir.path().join("out"));

        let mut orch = orchestrator(&config);
        let report = orch.run_cycle(1).unwrap();
        assert_eq!(report.cycle, 1);
        assert!(report.artifact.ends_with("dream_0001.md"));
        let body = fs::read_to_string(&report.artifact).unwrap();
        assert!(body.starts_with("# Dream #1\nGenerated: "));
        assert!(body.contains(&format!("Discoveries: {}", report.discoveries)));
    }

    #[test]
    fn run_stops_at_max_cycles() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("notes.txt"), "hello world").unwrap();
        let mut config = quiet_config(&root, &dir.path().join("out"));
        config.session.max_cycles = 3;

        let summary = orchestrator(&config).run();
        assert_eq!(summary.cycles, 3);
        assert_eq!(summary.dreams_written, 3);
    }

    #[test]
    fn pre_requested_shutdown_runs_no_cycles() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = quiet_config(dir.path(), &dir.path().join("out"));
        let mut orch = orchestrator(&config);
        orch.shutdown_token().request();
        assert_eq!(orch.run(), RunSummary::default());
    }

    #[test]
    fn write_failures_are_not_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();
        let mut config = quiet_config(&root, &dir.path().join("out"));
        config.session.max_cycles = 2;
        // Make the output path unwritable after startup: every write fails.
        let mut orch = orchestrator(&config);
        fs::remove_dir_all(dir.path().join("out")).unwrap();
        fs::write(dir.path().join("out"), "blocker").unwrap();
        let summary = orch.run();
        assert_eq!(summary.cycles, 2);
        assert_eq!(summary.failed_cycles, 2);
        assert_eq!(summary.dreams_written, 0);
    }

    #[test]
    fn random_subdirectory_skips_hidden_and_noise() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("node_modules/lodash")).unwrap();
        fs::create_dir_all(dir.path().join("music")).unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();
        let config = ExplorerConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(
                random_subdirectory(dir.path(), &config, &mut rng),
                dir.path().join("music")
            );
        }
        let empty = tempfile::TempDir::new().unwrap();
        assert_eq!(random_subdirectory(empty.path(), &config, &mut rng), empty.path());
    }
}

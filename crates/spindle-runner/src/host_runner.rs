//! Builder and main loop for hosting scripts
//!
//! A [`HostRunner`] owns one [`Environment`]. Running it creates the
//! configured global signals, starts every enabled script, issues the startup
//! fires and then calls [`Environment::update`] at the configured tick rate
//! with the real time elapsed since the previous tick.

use std::path::PathBuf;
use std::time::Duration;

use spindle_host::{Environment, EnvironmentStats, ScriptFile, load_scripts, run_script};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::SpindleConfig;

/// Error during builder configuration
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Tick rate must be at least 1 Hz")]
    InvalidTickRate,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl+C
    Interrupted,
    /// The shutdown channel fired or its sender was dropped
    Shutdown,
    /// No task was left waiting on a delay
    Idle,
    /// The configured maximum runtime elapsed
    MaxRuntime,
}

/// What a finished run did
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub reason: StopReason,
    pub elapsed: Duration,
    pub scripts_started: usize,
    pub stats: EnvironmentStats,
    pub pending_delays: usize,
    pub parked: usize,
}

impl RunSummary {
    pub fn print_final(&self) {
        info!("========================================");
        info!("Host run complete ({:?})", self.reason);
        info!("Total time: {:.2}s", self.elapsed.as_secs_f64());
        info!("========================================");
        info!("Scripts started:      {}", self.scripts_started);
        info!("Ticks:                {}", self.stats.ticks);
        info!("Resumptions:          {}", self.stats.resumptions);
        info!("Resumption failures:  {}", self.stats.failures);
        info!("Signal fires:         {}", self.stats.fires);
        info!("Still delayed:        {}", self.pending_delays);
        info!("Still parked:         {}", self.parked);
        info!("========================================");
    }
}

/// Builder for HostRunner
pub struct HostRunnerBuilder {
    config: SpindleConfig,
    script_dir: Option<PathBuf>,
    scripts: Vec<ScriptFile>,
    max_runtime: Option<Duration>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl HostRunnerBuilder {
    pub fn new() -> Self {
        Self {
            config: SpindleConfig::default(),
            script_dir: None,
            scripts: Vec::new(),
            max_runtime: None,
            shutdown_rx: None,
        }
    }

    /// Set application config (defaults to [`SpindleConfig::default`])
    pub fn with_config(mut self, config: SpindleConfig) -> Self {
        self.config = config;
        self
    }

    /// Load scripts from `dir` instead of the configured directory
    pub fn script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.script_dir = Some(dir.into());
        self
    }

    /// Run an in-memory script after the ones loaded from disk
    pub fn with_script(mut self, script: ScriptFile) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.config.scheduler.exit_when_idle = exit;
        self
    }

    /// Stop after `limit`, overriding `max_runtime_secs`
    pub fn max_runtime(mut self, limit: Duration) -> Self {
        self.max_runtime = Some(limit);
        self
    }

    /// Provide a shutdown receiver; Ctrl+C is not watched when one is set
    pub fn with_shutdown(mut self, rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    pub fn build(self) -> Result<HostRunner, BuildError> {
        if self.config.scheduler.tick_rate_hz == 0 {
            return Err(BuildError::InvalidTickRate);
        }

        let max_runtime = self.max_runtime.or_else(|| self.config.scheduler.max_runtime());
        let mut env = Environment::new();
        for name in &self.config.signals {
            env.create_named_signal(name.as_str());
        }

        Ok(HostRunner {
            env,
            config: self.config,
            script_dir: self.script_dir,
            scripts: self.scripts,
            max_runtime,
            shutdown_rx: self.shutdown_rx,
        })
    }
}

impl Default for HostRunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Configured host ready to run
pub struct HostRunner {
    env: Environment,
    config: SpindleConfig,
    script_dir: Option<PathBuf>,
    scripts: Vec<ScriptFile>,
    max_runtime: Option<Duration>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl HostRunner {
    pub fn builder() -> HostRunnerBuilder {
        HostRunnerBuilder::new()
    }

    /// The environment scripts will run in
    ///
    /// Global signals already exist at this point, so native listeners can
    /// be connected before [`HostRunner::run`].
    pub fn environment_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    /// Start scripts, issue startup fires, then tick until told to stop
    pub async fn run(mut self) -> RunSummary {
        let started_at = Instant::now();
        let scripts_started = self.start_scripts();
        self.startup_fires();

        let reason = self.tick_loop(started_at).await;

        RunSummary {
            reason,
            elapsed: started_at.elapsed(),
            scripts_started,
            stats: self.env.stats(),
            pending_delays: self.env.pending_delays(),
            parked: self.env.total_parked(),
        }
    }

    fn start_scripts(&mut self) -> usize {
        let mut scripts = Vec::new();

        if self.config.scripting.enabled {
            let dir = self
                .script_dir
                .clone()
                .unwrap_or_else(|| self.config.scripting.script_dir());
            scripts.extend(load_scripts(&dir, &self.config.scripting.config));
        } else {
            info!("Scripting disabled in config, skipping script directory");
        }
        scripts.append(&mut self.scripts);

        // Start failures are already logged by the environment
        let started = scripts
            .iter()
            .filter(|script| run_script(&mut self.env, script).is_ok())
            .count();

        info!("Started {} of {} script(s)", started, scripts.len());
        started
    }

    fn startup_fires(&mut self) {
        for fire in &self.config.startup_fires {
            let Some(signal) = self.env.find_signal(&fire.signal) else {
                warn!("Startup fire skipped: no signal named '{}'", fire.signal);
                continue;
            };

            debug!("Startup fire of '{}' with {} arg(s)", fire.signal, fire.args.len());
            if let Err(e) = self.env.fire(signal, &fire.args) {
                warn!("Startup fire of '{}' failed: {}", fire.signal, e);
            }
        }
    }

    async fn tick_loop(&mut self, started_at: Instant) -> StopReason {
        let tick_rate = self.config.scheduler.tick_rate_hz.max(1);
        let exit_when_idle = self.config.scheduler.exit_when_idle;
        let max_runtime = self.max_runtime;
        let mut shutdown_rx = self.shutdown_rx.take();
        let watch_ctrl_c = shutdown_rx.is_none();

        let mut interval = tokio::time::interval(Duration::from_secs(1) / tick_rate);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();

        info!("Running at {} Hz", tick_rate);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    let delta = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    self.env.update(delta);

                    if exit_when_idle && self.env.is_idle() {
                        info!("No delayed tasks left, stopping");
                        return StopReason::Idle;
                    }
                    if max_runtime.is_some_and(|limit| started_at.elapsed() >= limit) {
                        info!("Maximum runtime reached, stopping");
                        return StopReason::MaxRuntime;
                    }
                }
                _ = async {
                    if let Some(ref mut rx) = shutdown_rx {
                        // A dropped sender counts as a shutdown request
                        let _ = rx.changed().await;
                    } else {
                        std::future::pending::<()>().await
                    }
                } => {
                    info!("Host received shutdown signal");
                    return StopReason::Shutdown;
                }
                _ = tokio::signal::ctrl_c(), if watch_ctrl_c => {
                    info!("Received Ctrl+C, shutting down gracefully...");
                    return StopReason::Interrupted;
                }
            }
        }
    }
}

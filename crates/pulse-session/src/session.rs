use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use pulse_symbolize::Symbolizer;

use crate::artifact::Artifact;
use crate::channel::DeviceChannel;
use crate::compiler::{KernelCall, TargetCompiler};
use crate::config::SessionConfig;
use crate::embedding::EmbeddingMap;
use crate::error::SessionError;
use crate::registry::Registry;

/// Safety margin applied when (re)synchronizing the time cursor with
/// the hardware counter, in machine units.
pub const RESET_TIME_MARGIN_MU: i64 = 125_000;

/// Driver for one device session: compiles kernels through the
/// ahead-of-time compiler, deploys them over the device channel, and
/// owns the timeline cursor and machine-unit arithmetic.
///
/// One kernel execution is in flight at a time; `&mut self` on `run`
/// enforces the no-overlap rule for a single session, and callers
/// wanting parallelism must use separate sessions on separate devices.
pub struct Session {
    ref_period: f64,
    ref_multiplier: i32,
    coarse_ref_period: f64,
    compiler: Box<dyn TargetCompiler>,
    channel: Box<dyn DeviceChannel>,
    registry: Arc<Registry>,
    symbolizer: Symbolizer,
    first_run: bool,
    now: i64,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        compiler: Box<dyn TargetCompiler>,
        channel: Box<dyn DeviceChannel>,
        registry: Arc<Registry>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            ref_period: config.ref_period,
            ref_multiplier: config.ref_multiplier,
            coarse_ref_period: config.ref_period * config.ref_multiplier as f64,
            compiler,
            channel,
            registry,
            symbolizer: Symbolizer::new(config.symbolizer_tool),
            first_run: true,
            now: 0,
        })
    }

    pub fn ref_period(&self) -> f64 {
        self.ref_period
    }

    pub fn ref_multiplier(&self) -> i32 {
        self.ref_multiplier
    }

    pub fn coarse_ref_period(&self) -> f64 {
        self.coarse_ref_period
    }

    /// Whether the one-time device capability check is still pending.
    pub fn first_run(&self) -> bool {
        self.first_run
    }

    /// Compile a kernel call to an in-memory artifact. Flushes the
    /// registration gate into the compiler first if it is still open.
    pub fn compile(
        &mut self,
        call: &KernelCall,
        embedding: &mut EmbeddingMap,
    ) -> Result<Artifact, SessionError> {
        self.registry.flush_into(self.compiler.as_mut())?;
        let artifact = self
            .compiler
            .compile_to_memory(&call.target, &call.args, embedding)?;
        debug!(
            kernel = %call.target.descriptor(),
            size = artifact.len(),
            "compiled kernel"
        );
        Ok(artifact)
    }

    /// Compile a kernel call and persist the artifact to `output`
    /// instead of returning it.
    pub fn compile_to_file(
        &mut self,
        call: &KernelCall,
        embedding: &mut EmbeddingMap,
        output: &Path,
    ) -> Result<(), SessionError> {
        self.registry.flush_into(self.compiler.as_mut())?;
        self.compiler
            .compile_to_file(&call.target, &call.args, embedding, output)?;
        debug!(
            kernel = %call.target.descriptor(),
            output = %output.display(),
            "compiled kernel to file"
        );
        Ok(())
    }

    /// Compile, deploy and execute a kernel call, then serve host
    /// callbacks until it finishes. The device capability check runs
    /// before the first load of the session and never again; a compile
    /// failure prevents it entirely.
    pub fn run(&mut self, call: &KernelCall) -> Result<(), SessionError> {
        let mut embedding = EmbeddingMap::new();
        let artifact = self.compile(call, &mut embedding)?;

        if self.first_run {
            self.channel.check_system_info()?;
            self.first_run = false;
            debug!("device capability check passed");
        }

        info!(
            kernel = %call.target.descriptor(),
            size = artifact.len(),
            digest = %artifact.sha256_hex(),
            "running kernel"
        );

        let Session {
            channel,
            symbolizer,
            ..
        } = self;
        let symbolizer: &Symbolizer = symbolizer;
        let symbolize =
            |addresses: &[u64]| symbolizer.symbolize(artifact.bytes(), addresses);

        channel.load(&artifact)?;
        channel.run()?;
        channel.serve(&embedding, &symbolize)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), SessionError> {
        Ok(self.channel.close()?)
    }

    /// Convert seconds to machine units, flooring toward negative
    /// infinity (so `-0.5` machine units of time becomes `-1`).
    pub fn seconds_to_mu(&self, seconds: f64) -> i64 {
        (seconds / self.ref_period).floor() as i64
    }

    /// Convert machine units to seconds. Not an exact inverse of the
    /// floor conversion.
    pub fn mu_to_seconds(&self, mu: i64) -> f64 {
        mu as f64 * self.ref_period
    }

    /// Current position of the time cursor, in machine units.
    pub fn now_mu(&self) -> i64 {
        self.now
    }

    pub fn at_mu(&mut self, cursor: i64) {
        self.now = cursor;
    }

    pub fn delay_mu(&mut self, dt: i64) {
        self.now += dt;
    }

    pub fn delay(&mut self, dt_seconds: f64) {
        self.delay_mu(self.seconds_to_mu(dt_seconds));
    }

    /// Reinitialize the remote timeline hardware and place the time
    /// cursor at the hardware counter plus a safety margin.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.channel.timeline_init()?;
        let counter = self.channel.counter()?;
        self.now = counter + RESET_TIME_MARGIN_MU;
        Ok(())
    }

    /// Move the time cursor after the hardware counter plus a safety
    /// margin, unless it is already there. Never moves it backward.
    pub fn break_realtime(&mut self) -> Result<(), SessionError> {
        let min_now = self.channel.counter()? + RESET_TIME_MARGIN_MU;
        if self.now < min_now {
            self.now = min_now;
        }
        Ok(())
    }

    /// Block until the hardware counter reaches `cursor`; returns
    /// immediately if it is already past. This is a deliberate busy
    /// poll with no yield — low-latency deterministic timing beats
    /// cooperative scheduling here.
    pub fn wait_until_mu(&mut self, cursor: i64) -> Result<(), SessionError> {
        while self.channel.counter()? < cursor {}
        Ok(())
    }

    pub fn counter(&mut self) -> Result<i64, SessionError> {
        Ok(self.channel.counter()?)
    }

    pub fn destination_status(&mut self, destination: i32) -> Result<bool, SessionError> {
        Ok(self.channel.destination_status(destination)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::NullChannel;
    use crate::compiler::{CallArgs, CompileError, KernelTarget};
    use crate::registry::{ClassMeta, ProcedureMeta};

    struct NoopCompiler;

    impl TargetCompiler for NoopCompiler {
        fn analyze(
            &mut self,
            _procedures: &[ProcedureMeta],
            _classes: &[ClassMeta],
        ) -> Result<(), CompileError> {
            Ok(())
        }

        fn compile_to_memory(
            &mut self,
            _target: &KernelTarget,
            _args: &CallArgs,
            _embedding: &mut EmbeddingMap,
        ) -> Result<Artifact, CompileError> {
            Ok(Artifact::new(vec![0x7f]))
        }

        fn compile_to_file(
            &mut self,
            _target: &KernelTarget,
            _args: &CallArgs,
            _embedding: &mut EmbeddingMap,
            _output: &Path,
        ) -> Result<(), CompileError> {
            Ok(())
        }
    }

    fn session(ref_period: f64) -> Session {
        Session::new(
            SessionConfig::new(ref_period),
            Box::new(NoopCompiler),
            Box::new(NullChannel::new()),
            Arc::new(Registry::new()),
        )
        .expect("session")
    }

    #[test]
    fn coarse_ref_period_invariant_holds_at_construction() {
        let s = session(1e-9);
        assert_eq!(s.coarse_ref_period(), s.ref_period() * s.ref_multiplier() as f64);
    }

    #[test]
    fn seconds_to_mu_floors_toward_negative_infinity() {
        let s = session(1e-9);
        assert_eq!(s.seconds_to_mu(-0.5e-9), -1);
        assert_eq!(s.seconds_to_mu(0.5e-9), 0);
        assert_eq!(s.seconds_to_mu(2e-9), 2);
    }

    #[test]
    fn exact_multiples_round_trip() {
        let s = session(1e-9);
        for mu in [0i64, 1, 7, 1_000, 125_000, -3, -1_000_000] {
            assert_eq!(s.seconds_to_mu(s.mu_to_seconds(mu)), mu, "mu={mu}");
        }
    }

    #[test]
    fn cursor_arithmetic() {
        let mut s = session(1e-9);
        s.at_mu(100);
        assert_eq!(s.now_mu(), 100);
        s.delay_mu(25);
        assert_eq!(s.now_mu(), 125);
        s.delay(3e-9);
        assert_eq!(s.now_mu(), 128);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = Session::new(
            SessionConfig::new(0.0),
            Box::new(NoopCompiler),
            Box::new(NullChannel::new()),
            Arc::new(Registry::new()),
        )
        .err()
        .expect("config rejected");
        assert!(matches!(err, SessionError::Config(_)));
    }
}

use std::path::Path;
use std::sync::Arc;

use pulse_session::artifact::Artifact;
use pulse_session::channel::{ChannelError, DeviceChannel, SymbolizeFn};
use pulse_session::compiler::{CallArgs, CompileError, KernelTarget, TargetCompiler};
use pulse_session::config::SessionConfig;
use pulse_session::embedding::EmbeddingMap;
use pulse_session::registry::{ClassMeta, ProcedureMeta, Registry};
use pulse_session::session::{Session, RESET_TIME_MARGIN_MU};

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
        Ok(Artifact::new(Vec::new()))
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

/// Channel whose hardware counter replays a script, then keeps
/// advancing by one so spin waits always terminate.
struct CountingChannel {
    script: Vec<i64>,
    reads: usize,
    init_calls: usize,
    last: i64,
}

impl CountingChannel {
    fn new(script: Vec<i64>) -> Self {
        Self {
            script,
            reads: 0,
            init_calls: 0,
            last: 0,
        }
    }
}

impl DeviceChannel for CountingChannel {
    fn check_system_info(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn load(&mut self, _artifact: &Artifact) -> Result<(), ChannelError> {
        Ok(())
    }

    fn run(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn serve(
        &mut self,
        _embedding: &EmbeddingMap,
        _symbolize: &SymbolizeFn<'_>,
    ) -> Result<(), ChannelError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn timeline_init(&mut self) -> Result<(), ChannelError> {
        self.init_calls += 1;
        Ok(())
    }

    fn counter(&mut self) -> Result<i64, ChannelError> {
        let value = match self.script.get(self.reads) {
            Some(&v) => v,
            None => self.last + 1,
        };
        self.reads += 1;
        self.last = value;
        Ok(value)
    }

    fn destination_status(&mut self, destination: i32) -> Result<bool, ChannelError> {
        Ok(destination == 0)
    }
}

fn session_with(script: Vec<i64>) -> Session {
    Session::new(
        SessionConfig::new(1e-9),
        Box::new(NoopCompiler),
        Box::new(CountingChannel::new(script)),
        Arc::new(Registry::new()),
    )
    .expect("session")
}

#[test]
fn reset_places_cursor_after_counter_plus_margin() {
    let mut session = session_with(vec![10_000]);
    session.reset().expect("reset ok");
    assert_eq!(session.now_mu(), 10_000 + RESET_TIME_MARGIN_MU);
}

#[test]
fn break_realtime_advances_a_lagging_cursor() {
    let mut session = session_with(vec![50_000]);
    session.at_mu(0);
    session.break_realtime().expect("break ok");
    assert_eq!(session.now_mu(), 50_000 + RESET_TIME_MARGIN_MU);
}

#[test]
fn break_realtime_never_moves_the_cursor_backward() {
    let mut session = session_with(vec![50_000]);
    let far_ahead = 50_000 + RESET_TIME_MARGIN_MU + 999;
    session.at_mu(far_ahead);
    session.break_realtime().expect("break ok");
    assert_eq!(session.now_mu(), far_ahead);
}

#[test]
fn wait_until_mu_polls_until_the_counter_catches_up() {
    // Three stale reads before the counter passes the cursor.
    let mut session = session_with(vec![1, 2, 3, 10]);
    session.wait_until_mu(10).expect("wait ok");
    assert_eq!(session.counter().expect("counter"), 11);
}

#[test]
fn wait_until_mu_returns_immediately_when_already_past() {
    let mut session = session_with(vec![500]);
    session.wait_until_mu(100).expect("wait ok");
    // Only the single comparison read happened.
    assert_eq!(session.counter().expect("counter"), 501);
}

#[test]
fn destination_status_is_a_pass_through() {
    let mut session = session_with(Vec::new());
    assert!(session.destination_status(0).expect("status"));
    assert!(!session.destination_status(3).expect("status"));
}

use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::compiler::TargetCompiler;
use crate::error::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureMeta {
    pub name: String,
    pub module: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMeta {
    pub name: String,
    pub module: String,
}

struct RegistryInner {
    procedures: Vec<ProcedureMeta>,
    classes: Vec<ClassMeta>,
    open: bool,
}

/// Registration gate for kernel procedure/class metadata. Open at
/// construction; the first successful flush into a compiler's analysis
/// database closes it permanently. Registration and flushing share one
/// mutex, so a concurrent first-compile race still flushes exactly
/// once, and a flush whose `analyze` fails leaves the gate open.
pub struct Registry {
    inner: Mutex<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                procedures: Vec::new(),
                classes: Vec::new(),
                open: true,
            }),
        }
    }

    pub fn register_procedure(&self, meta: ProcedureMeta) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(SessionError::RegistrationClosed);
        }
        inner.procedures.push(meta);
        Ok(())
    }

    pub fn register_class(&self, meta: ClassMeta) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if !inner.open {
            return Err(SessionError::RegistrationClosed);
        }
        inner.classes.push(meta);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    /// Flush registered metadata into the compiler if the gate is
    /// still open, then close it. A no-op once closed.
    pub fn flush_into(&self, compiler: &mut dyn TargetCompiler) -> Result<(), SessionError> {
        let mut inner = self.lock();
        if !inner.open {
            return Ok(());
        }
        debug!(
            procedures = inner.procedures.len(),
            classes = inner.classes.len(),
            "flushing registrations into compiler analysis"
        );
        compiler.analyze(&inner.procedures, &inner.classes)?;
        inner.open = false;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::artifact::Artifact;
    use crate::compiler::{CallArgs, CompileError, CompileErrorKind, KernelTarget};
    use crate::embedding::EmbeddingMap;

    struct CountingCompiler {
        analyze_calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl TargetCompiler for CountingCompiler {
        fn analyze(
            &mut self,
            _procedures: &[ProcedureMeta],
            _classes: &[ClassMeta],
        ) -> Result<(), CompileError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CompileError::new(CompileErrorKind::Internal, "analysis failed"));
            }
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
            _output: &std::path::Path,
        ) -> Result<(), CompileError> {
            Ok(())
        }
    }

    fn meta(name: &str) -> ProcedureMeta {
        ProcedureMeta {
            name: name.to_string(),
            module: "test".to_string(),
        }
    }

    #[test]
    fn registration_after_flush_is_rejected() {
        let registry = Registry::new();
        registry.register_procedure(meta("a")).expect("open");

        let calls = Arc::new(AtomicUsize::new(0));
        let mut compiler = CountingCompiler {
            analyze_calls: calls.clone(),
            fail: false,
        };
        registry.flush_into(&mut compiler).expect("flush ok");
        assert!(!registry.is_open());

        let err = registry.register_procedure(meta("b")).unwrap_err();
        assert!(matches!(err, SessionError::RegistrationClosed));
        let err = registry
            .register_class(ClassMeta {
                name: "Sampler".to_string(),
                module: "test".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::RegistrationClosed));
    }

    #[test]
    fn failed_analysis_leaves_the_gate_open() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let mut failing = CountingCompiler {
            analyze_calls: calls.clone(),
            fail: true,
        };
        assert!(registry.flush_into(&mut failing).is_err());
        assert!(registry.is_open());

        let mut ok = CountingCompiler {
            analyze_calls: calls.clone(),
            fail: false,
        };
        registry.flush_into(&mut ok).expect("flush ok");
        assert!(!registry.is_open());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_flush_runs_analysis_once() {
        let registry = Arc::new(Registry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            let calls = calls.clone();
            handles.push(std::thread::spawn(move || {
                let mut compiler = CountingCompiler {
                    analyze_calls: calls,
                    fail: false,
                };
                registry.flush_into(&mut compiler).expect("flush ok");
            }));
        }
        for handle in handles {
            handle.join().expect("thread ok");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!registry.is_open());
    }
}

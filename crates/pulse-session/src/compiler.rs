use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;

use crate::artifact::Artifact;
use crate::embedding::EmbeddingMap;
use crate::registry::{ClassMeta, ProcedureMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileErrorKind {
    Parse,
    Typing,
    Unsupported,
    Internal,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub message: String,
}

impl CompileError {
    pub fn new(kind: CompileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What to compile, resolved once at the call site rather than probed
/// at runtime: either a method bound to a registered receiver, or a
/// free procedure (which reaches the compiler with an empty name tag).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KernelTarget {
    BoundMethod { receiver: String, name: String },
    FreeProcedure { procedure: String },
}

impl KernelTarget {
    /// The (receiver-or-procedure, name) pair the compiler consumes.
    pub fn resolve(&self) -> (&str, &str) {
        match self {
            KernelTarget::BoundMethod { receiver, name } => (receiver, name),
            KernelTarget::FreeProcedure { procedure } => (procedure, ""),
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            KernelTarget::BoundMethod { receiver, name } => format!("{receiver}.{name}"),
            KernelTarget::FreeProcedure { procedure } => procedure.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CallArgs {
    pub args: Vec<serde_json::Value>,
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct KernelCall {
    pub target: KernelTarget,
    pub args: CallArgs,
}

impl KernelCall {
    pub fn method(receiver: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            target: KernelTarget::BoundMethod {
                receiver: receiver.into(),
                name: name.into(),
            },
            args: CallArgs::default(),
        }
    }

    pub fn procedure(procedure: impl Into<String>) -> Self {
        Self {
            target: KernelTarget::FreeProcedure {
                procedure: procedure.into(),
            },
            args: CallArgs::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<serde_json::Value>) -> Self {
        self.args.args = args;
        self
    }
}

/// Ahead-of-time compiler collaborator. `analyze` ingests the
/// registered procedure/class metadata and is called at most once per
/// registry; the compile entry points assign embedding identifiers for
/// every host object the artifact may call back into.
pub trait TargetCompiler {
    fn analyze(
        &mut self,
        procedures: &[ProcedureMeta],
        classes: &[ClassMeta],
    ) -> Result<(), CompileError>;

    fn compile_to_memory(
        &mut self,
        target: &KernelTarget,
        args: &CallArgs,
        embedding: &mut EmbeddingMap,
    ) -> Result<Artifact, CompileError>;

    fn compile_to_file(
        &mut self,
        target: &KernelTarget,
        args: &CallArgs,
        embedding: &mut EmbeddingMap,
        output: &Path,
    ) -> Result<(), CompileError>;
}

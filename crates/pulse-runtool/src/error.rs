use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("empty command template")]
    EmptyCommand,

    #[error("invalid input name {0:?}")]
    InvalidInputName(String),

    #[error("no input registered for placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("stage {}: {source}", .path.display())]
    Stage { path: PathBuf, source: io::Error },

    #[error("invoke {tool}: {source}")]
    Spawn { tool: String, source: io::Error },

    #[error("{tool} exited with an error:\n{stderr}")]
    Failed { tool: String, stderr: String },

    #[error("tool left output {name:?} unreadable: {source}")]
    MissingOutput { name: String, source: io::Error },
}

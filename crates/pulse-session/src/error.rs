use thiserror::Error;

use crate::channel::ChannelError;
use crate::compiler::CompileError;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session config: {0}")]
    Config(String),

    #[error("kernel registration is closed")]
    RegistrationClosed,

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("device session: {0}")]
    Channel(#[from] ChannelError),
}

use pulse_runtool::ToolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SymbolizeError {
    #[error("symbol resolution tool: {0}")]
    Tool(#[from] ToolError),

    #[error("unparseable symbolizer output: {0}")]
    Parse(#[from] ParseError),
}

/// Grammar violation in symbolizer output. The documented sentinels
/// (`??` / `<synthesized>` files, `?` lines) are substitutions, not
/// errors; anything else malformed fails fast and names the content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("expected a block for address {address:#x}, found end of output")]
    MissingBlock { address: u64 },

    #[error("expected address line, got {0:?}")]
    ExpectedAddress(String),

    #[error("malformed address line {0:?}")]
    MalformedAddress(String),

    #[error("address {got:#x} out of order, expected {expected:#x}")]
    AddressMismatch { expected: u64, got: u64 },

    #[error("address {address:#x} resolved to no frames")]
    EmptyBlock { address: u64 },

    #[error("missing source location after function {0:?}")]
    MissingLocation(String),

    #[error("blank line inside a symbolizer block")]
    BlankLine,

    #[error("malformed location {0:?}")]
    MalformedLocation(String),

    #[error("malformed line number in location {0:?}")]
    MalformedLine(String),

    #[error("trailing output after final block: {0:?}")]
    TrailingOutput(String),
}

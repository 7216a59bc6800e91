use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

mod error;
mod parse;

pub use error::{ParseError, SymbolizeError};

pub const DEFAULT_TOOL: &str = "llvm-symbolizer";

/// One reconstructed call site. `line == -1` means the line is unknown;
/// `column` is never available and is always `-1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacktraceEntry {
    pub file: String,
    pub line: i32,
    pub column: i32,
    pub function: String,
    pub address: u64,
    pub inlined: Vec<InlinedFrame>,
}

/// A frame folded into its caller at compile time. It shares the
/// enclosing entry's address and carries none of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlinedFrame {
    pub file: String,
    pub line: i32,
    pub column: i32,
    pub function: String,
}

/// Batch address-to-source resolver backed by an external GNU-style
/// symbolizer tool.
#[derive(Debug, Clone)]
pub struct Symbolizer {
    tool: String,
}

impl Default for Symbolizer {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL)
    }
}

impl Symbolizer {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    pub fn tool(&self) -> &str {
        &self.tool
    }

    /// Resolve a batch of raw return addresses against one compiled
    /// artifact. Runs the tool once for the whole batch; an empty
    /// address list returns without invoking anything.
    ///
    /// Each input is a return address, pointing just past a call
    /// instruction; lookup happens at `address - 1` so the call
    /// instruction (or its delay slot) gets the attribution, and the
    /// original address is restored on the entries returned.
    pub fn symbolize(
        &self,
        artifact: &[u8],
        addresses: &[u64],
    ) -> Result<Vec<BacktraceEntry>, SymbolizeError> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        let adjusted: Vec<u64> = addresses.iter().map(|a| a.wrapping_sub(1)).collect();

        let mut template: Vec<String> = vec![
            self.tool.clone(),
            "--addresses".to_string(),
            "--functions=short".to_string(),
            "--inlines".to_string(),
            "--demangle".to_string(),
            "--output-style=GNU".to_string(),
            "--exe={artifact}".to_string(),
        ];
        template.extend(adjusted.iter().map(|a| format!("{a:#x}")));

        let mut inputs = BTreeMap::new();
        inputs.insert("artifact".to_string(), Some(artifact.to_vec()));

        debug!(
            tool = %self.tool,
            addresses = addresses.len(),
            artifact_bytes = artifact.len(),
            "symbolizing fault addresses"
        );
        let out = pulse_runtool::invoke(&template, &inputs)?;
        let entries = parse::parse_blocks(out.stdout(), &adjusted)?;
        Ok(entries)
    }
}

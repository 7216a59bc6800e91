//! One-shot external tool invocation with scoped temporary staging.
//!
//! No timeout is imposed at this layer: a hung tool blocks the calling
//! thread indefinitely. Callers that need bounded latency must add an
//! outer supervisory timeout around the process.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

mod error;

pub use error::ToolError;

/// Result of a successful tool invocation. Output file handles and the
/// captured stdout stay readable until this value is dropped; dropping
/// it deletes every staged file.
#[derive(Debug)]
pub struct ToolOutput {
    files: BTreeMap<String, File>,
    stdout: String,
    _staging: StagingDir,
}

impl ToolOutput {
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Readable handle for an output-designated input, populated by the
    /// tool. `None` for names that were staged with caller bytes.
    pub fn output(&mut self, name: &str) -> Option<&mut File> {
        self.files.get_mut(name)
    }

    pub fn read_output(&mut self, name: &str) -> Result<Vec<u8>, ToolError> {
        let file = self
            .files
            .get_mut(name)
            .ok_or_else(|| ToolError::UnknownPlaceholder(name.to_string()))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|source| ToolError::MissingOutput {
                name: name.to_string(),
                source,
            })?;
        Ok(bytes)
    }
}

/// Run one external tool synchronously.
///
/// Inputs with bytes are materialized into uniquely named staged files;
/// inputs without bytes reserve a staged path the tool is expected to
/// populate. Every `{name}` placeholder in `template` is substituted
/// with the corresponding staged path before execution. Non-zero exit
/// becomes [`ToolError::Failed`] carrying the command's first token and
/// the captured stderr; staged files are removed on every exit path.
pub fn invoke(
    template: &[String],
    inputs: &BTreeMap<String, Option<Vec<u8>>>,
) -> Result<ToolOutput, ToolError> {
    let staging = StagingDir::new("pulse_tool")?;

    let mut paths: BTreeMap<&str, PathBuf> = BTreeMap::new();
    for (name, bytes) in inputs {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ToolError::InvalidInputName(name.clone()));
        }
        let path = staging.path().join(name);
        if let Some(bytes) = bytes {
            std::fs::write(&path, bytes).map_err(|source| ToolError::Stage {
                path: path.clone(),
                source,
            })?;
        }
        paths.insert(name.as_str(), path);
    }

    let argv = resolve_template(template, &paths)?;
    let (program, args) = argv.split_first().ok_or(ToolError::EmptyCommand)?;

    debug!(tool = %program, args = argv.len() - 1, "invoking external tool");
    let out = Command::new(program)
        .args(args)
        .output()
        .map_err(|source| ToolError::Spawn {
            tool: program.clone(),
            source,
        })?;

    if !out.status.success() {
        return Err(ToolError::Failed {
            tool: program.clone(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        });
    }

    let mut files = BTreeMap::new();
    for (name, bytes) in inputs {
        if bytes.is_none() {
            let path = &paths[name.as_str()];
            let file = File::open(path).map_err(|source| ToolError::MissingOutput {
                name: name.clone(),
                source,
            })?;
            files.insert(name.clone(), file);
        }
    }

    Ok(ToolOutput {
        files,
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        _staging: staging,
    })
}

fn resolve_template(
    template: &[String],
    paths: &BTreeMap<&str, PathBuf>,
) -> Result<Vec<String>, ToolError> {
    let mut argv = Vec::with_capacity(template.len());
    for token in template {
        let mut resolved = token.clone();
        for (name, path) in paths {
            let placeholder = format!("{{{name}}}");
            if resolved.contains(placeholder.as_str()) {
                resolved = resolved.replace(placeholder.as_str(), &path.display().to_string());
            }
        }
        if let Some(name) = leftover_placeholder(&resolved) {
            return Err(ToolError::UnknownPlaceholder(name));
        }
        argv.push(resolved);
    }
    Ok(argv)
}

fn leftover_placeholder(token: &str) -> Option<String> {
    let bytes = token.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            let rest = &token[i + 1..];
            if let Some(end) = rest.find('}') {
                let name = &rest[..end];
                if !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
                {
                    return Some(name.to_string());
                }
            }
        }
        i += 1;
    }
    None
}

#[derive(Debug)]
struct StagingDir {
    path: PathBuf,
}

impl StagingDir {
    fn new(prefix: &str) -> Result<Self, ToolError> {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let base = std::env::temp_dir();
        let pid = std::process::id();

        for _ in 0..10_000 {
            let n = COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!("{prefix}_{pid}_{n}"));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(source) => return Err(ToolError::Stage { path, source }),
            }
        }
        Err(ToolError::Stage {
            path: base,
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no unique staging directory name available",
            ),
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

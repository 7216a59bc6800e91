//! Line-oriented parser for GNU-style batch symbolizer output.
//!
//! Grammar: one block per queried address, in query order. A block is
//! an address line (`0x…`) followed by one or more (function line,
//! `file:line` location line) pairs. The first pair is the enclosing
//! call site; subsequent pairs are frames inlined at that site, kept in
//! literal emission order.

use crate::error::ParseError;
use crate::{BacktraceEntry, InlinedFrame};

const UNRESOLVED_FILES: &[&str] = &["??", "<synthesized>"];
const UNKNOWN_LINE: &str = "?";

struct Frame {
    function: String,
    file: String,
    line: i32,
}

/// Parse tool output against the adjusted (call-site) addresses that
/// were queried. Surviving top-level frames get the original return
/// address back (adjusted + 1).
pub(crate) fn parse_blocks(
    stdout: &str,
    addresses: &[u64],
) -> Result<Vec<BacktraceEntry>, ParseError> {
    let mut lines = stdout.trim_end().lines().peekable();
    let mut entries = Vec::new();

    for &expected in addresses {
        let line = lines
            .next()
            .ok_or(ParseError::MissingBlock { address: expected })?;
        let got = parse_address_line(line)?;
        if got != expected {
            return Err(ParseError::AddressMismatch { expected, got });
        }

        let mut frames: Vec<Frame> = Vec::new();
        let mut raw_pairs = 0usize;
        loop {
            let Some(&function) = lines.peek() else { break };
            if is_address_line(function) {
                break;
            }
            lines.next();
            if function.is_empty() {
                return Err(ParseError::BlankLine);
            }
            let location = match lines.next() {
                Some(l) if !is_address_line(l) && !l.is_empty() => l,
                _ => return Err(ParseError::MissingLocation(function.to_string())),
            };
            raw_pairs += 1;
            if let Some(frame) = parse_frame(function, location)? {
                frames.push(frame);
            }
        }
        if raw_pairs == 0 {
            return Err(ParseError::EmptyBlock { address: expected });
        }

        // Frames with an unresolved file were dropped individually; the
        // first survivor anchors the block and carries the restored
        // return address.
        let mut survivors = frames.into_iter();
        if let Some(top) = survivors.next() {
            entries.push(BacktraceEntry {
                file: top.file,
                line: top.line,
                column: -1,
                function: top.function,
                address: expected.wrapping_add(1),
                inlined: survivors
                    .map(|f| InlinedFrame {
                        file: f.file,
                        line: f.line,
                        column: -1,
                        function: f.function,
                    })
                    .collect(),
            });
        }
    }

    if let Some(extra) = lines.next() {
        return Err(ParseError::TrailingOutput(extra.to_string()));
    }
    Ok(entries)
}

fn is_address_line(line: &str) -> bool {
    line.starts_with("0x")
}

fn parse_address_line(line: &str) -> Result<u64, ParseError> {
    if !is_address_line(line) {
        return Err(ParseError::ExpectedAddress(line.to_string()));
    }
    u64::from_str_radix(line[2..].trim_end(), 16)
        .map_err(|_| ParseError::MalformedAddress(line.to_string()))
}

fn parse_frame(function: &str, location: &str) -> Result<Option<Frame>, ParseError> {
    let (file, line) = location
        .rsplit_once(':')
        .ok_or_else(|| ParseError::MalformedLocation(location.to_string()))?;
    if UNRESOLVED_FILES.contains(&file) {
        return Ok(None);
    }
    let line = if line == UNKNOWN_LINE {
        -1
    } else {
        line.parse::<i32>()
            .map_err(|_| ParseError::MalformedLine(location.to_string()))?
    };
    Ok(Some(Frame {
        function: function.to_string(),
        file: file.to_string(),
        line,
    }))
}

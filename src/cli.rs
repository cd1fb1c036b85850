//! Thin I/O wiring around the engine.
//!
//! The core (`engine`, `site`, `deadlock`) never touches stdin/stdout;
//! it only produces [`Event`] values. This
//! module reads instructions line by line, tokenizes them, feeds them
//! to an [`Engine`], and renders whatever events come back.

use std::io::{BufRead, Write};

use tracing::{error, warn};

use crate::command::{parse_line, Line};
use crate::engine::Engine;
use crate::error::Result;

/// Drives `engine` from `input` until a `===` terminator line or end of
/// input, writing one rendered line per emitted event to `out`.
pub fn run<R: BufRead, W: Write>(engine: &mut Engine, input: R, mut out: W) -> Result<()> {
    for line in input.lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "error reading input stream");
                break;
            }
        };

        match parse_line(&line) {
            Line::Empty => continue,
            Line::EndOfInput => break,
            Line::Malformed(raw) => {
                warn!(line = %raw, "unparseable instruction");
                let _ = writeln!(out, "[ERROR] unparseable instruction: {raw}");
            }
            Line::Command(cmd) => {
                for event in engine.tick(cmd)? {
                    let _ = writeln!(out, "{event}");
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Engine;

    #[test]
    fn renders_events_and_stops_at_terminator() {
        let script = "begin(T1)\nW(T1, x2, 22)\nend(T1)\n=== debug info below ===\nbogus(T1)\n";
        let mut engine = Engine::with_defaults();
        let mut out = Vec::new();
        run(&mut engine, script.as_bytes(), &mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("T1 begins"));
        assert!(rendered.contains("T1 commits!"));
        assert!(!rendered.contains("bogus"));
    }

    #[test]
    fn reports_malformed_lines_without_touching_the_engine() {
        let mut engine = Engine::with_defaults();
        let mut out = Vec::new();
        run(&mut engine, "frobnicate(T1)\n".as_bytes(), &mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("unparseable instruction"));
    }
}

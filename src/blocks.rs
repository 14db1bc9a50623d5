//! Command-block extraction from scrollback.
//!
//! Reconstructs the discrete commands a shell ran from a VT's history.
//! The primary path pairs OSC 133 shell-integration markers (A prompt,
//! B input, C executed, D finished); when a session has no markers at
//! all, a conservative prompt-regex fallback scans the raw lines.
//!
//! Blocks come back newest-first with trailing whitespace trimmed and a
//! styled rendition of each output line for the scrollback browser.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::term::ansi::row_to_ansi;
use crate::term::{MarkerKind, SemanticMarker, Vt};

/// How a block was reconstructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    /// OSC 133 shell-integration markers.
    Osc133,
    /// Prompt-regex fallback.
    Regex,
}

/// One reconstructed command with its output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandBlock {
    /// The command text as typed.
    pub command: String,
    /// Plain-text output.
    pub output: String,
    /// Output lines with ANSI styling preserved.
    pub styled_output: Vec<String>,
    /// Exit code from the `D` marker, when known.
    pub exit_code: Option<i32>,
    /// First absolute line of the block.
    pub start_line: usize,
    /// Last absolute line of the block (inclusive).
    pub end_line: usize,
    /// Which path produced this block.
    pub method: ParseMethod,
}

/// Extract command blocks from a VT, newest-first.
pub fn parse_command_blocks(vt: &Vt) -> Vec<CommandBlock> {
    let markers = vt.markers();
    let mut blocks = if markers.is_empty() {
        parse_with_regex(vt)
    } else {
        parse_with_markers(vt, markers)
    };
    blocks.reverse();
    blocks
}

// ── OSC 133 path ──────────────────────────────────────────────────────────

fn parse_with_markers(vt: &Vt, markers: &[SemanticMarker]) -> Vec<CommandBlock> {
    let mut blocks = Vec::new();
    let total_lines = vt.total_lines();
    let scrollback_len = vt.scrollback_len();

    let prompt_indices: Vec<usize> = markers
        .iter()
        .enumerate()
        .filter(|(_, m)| m.kind == MarkerKind::PromptStart)
        .map(|(i, _)| i)
        .collect();

    for (pi, &a_index) in prompt_indices.iter().enumerate() {
        // The window of markers belonging to this prompt runs until the
        // next A — by record order, not line order, because a CSI 2J
        // between commands can put the next prompt on a *lower* absolute
        // line than this command's D.
        let window_end = prompt_indices
            .get(pi + 1)
            .copied()
            .unwrap_or(markers.len());
        let window = &markers[a_index + 1..window_end];

        let b = window.iter().find(|m| m.kind == MarkerKind::CommandStart);
        let c = window.iter().find(|m| m.kind == MarkerKind::CommandExecuted);
        let d = window.iter().find(|m| m.kind == MarkerKind::CommandFinished);

        // No C and no D: an unexecuted prompt (the one being typed at).
        if c.is_none() && d.is_none() {
            continue;
        }

        // Prefer the text captured when C fired; fall back to reading the
        // buffer between B and C, minus trailing control garbage.
        let command = c
            .and_then(|m| m.captured_text.clone())
            .or_else(|| b.zip(c).and_then(|(b, c)| read_span(vt, b, c)))
            .unwrap_or_default();
        if command.is_empty() {
            continue;
        }

        // Output begins at C's line — or the next one when C fired
        // mid-line, before the command's terminating newline reached the
        // grid (the common shell-integration ordering).
        let output_start = match (c, d) {
            (Some(c), _) => {
                let line = c.abs_line.max(0) as usize;
                if c.col > 0 { line + 1 } else { line }
            }
            (None, Some(d)) => d.abs_line.max(0) as usize,
            (None, None) => 0,
        };

        // Output ends before D (same command) and before the next prompt.
        let next_prompt_line = markers
            .get(window_end..)
            .and_then(|rest| rest.iter().find(|m| m.kind == MarkerKind::PromptStart))
            .map(|m| m.abs_line.max(0) as usize);
        let mut output_end = total_lines.saturating_sub(1);
        if let Some(d) = d {
            output_end = output_end.min((d.abs_line.max(0) as usize).saturating_sub(1));
        }
        if let Some(next) = next_prompt_line {
            output_end = output_end.min(next.saturating_sub(1));
        }
        // A later command already started while this one's D exists: the
        // visible screen may have been repainted by a full-screen program
        // (cursor repositioning), so cap at the scrollback boundary.
        let later_c_fired = markers
            .get(window_end..)
            .is_some_and(|rest| rest.iter().any(|m| m.kind == MarkerKind::CommandExecuted));
        if d.is_some() && later_c_fired && scrollback_len > 0 {
            output_end = output_end.min(scrollback_len.saturating_sub(1));
        }

        let (output, styled_output) = collect_output(vt, output_start, output_end);

        blocks.push(CommandBlock {
            command,
            output,
            styled_output,
            exit_code: d.and_then(|m| m.exit_code),
            start_line: markers[a_index].abs_line.max(0) as usize,
            end_line: output_end.max(output_start),
            method: ParseMethod::Osc133,
        });
    }
    blocks
}

/// Read the text between two marker positions (B → C), trimming control
/// garbage off the tail.
fn read_span(vt: &Vt, from: &SemanticMarker, to: &SemanticMarker) -> Option<String> {
    let start = from.abs_line.max(0) as usize;
    let end = to.abs_line.max(0) as usize;
    if end < start {
        return None;
    }
    let mut text = String::new();
    for abs in start..=end {
        let line = vt.text_at_abs(abs)?;
        if abs == start {
            text.push_str(&line.chars().skip(from.col).collect::<String>());
        } else {
            text.push('\n');
            text.push_str(&line);
        }
    }
    let cleaned: String = text
        .trim_end_matches(|c: char| c.is_control() || c.is_whitespace())
        .to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

fn collect_output(vt: &Vt, start: usize, end: usize) -> (String, Vec<String>) {
    let mut plain = Vec::new();
    let mut styled = Vec::new();
    for abs in start..=end {
        let Some(row) = vt.row_at_abs(abs) else {
            break;
        };
        plain.push(row.text());
        styled.push(row_to_ansi(row));
    }
    // Drop trailing blank lines.
    while plain.last().is_some_and(|l| l.trim().is_empty()) {
        plain.pop();
        styled.pop();
    }
    (plain.join("\n"), styled)
}

// ── Regex fallback ────────────────────────────────────────────────────────

/// A line that looks like a shell prompt: `user@host:dir $ `, `[venv] $ `,
/// or a bare `$ `/`# `. Captures the command tail.
fn prompt_patterns() -> Vec<Regex> {
    vec![
        Regex::new(r"^[A-Za-z0-9._-]+@[A-Za-z0-9._-]+[:\s][^$#%]*[$#%]\s+(.*)$")
            .expect("static regex"),
        Regex::new(r"^\[[^\]]+\]\s*[$#%]\s+(.*)$").expect("static regex"),
        Regex::new(r"^[$#]\s+(.*)$").expect("static regex"),
    ]
}

/// Lines that look like command *output* and must never start a block:
/// permission strings, box drawing, numeric columns.
fn output_exclusions() -> Vec<Regex> {
    vec![
        Regex::new(r"^[-dlbcps][rwxsStT-]{9}").expect("static regex"),
        Regex::new(r"[│┃┌┐└┘├┤─═║╔╗╚╝]").expect("static regex"),
        Regex::new(r"^\s*\d+[\s.:]\s*\d").expect("static regex"),
    ]
}

fn parse_with_regex(vt: &Vt) -> Vec<CommandBlock> {
    let prompts = prompt_patterns();
    let exclusions = output_exclusions();
    let total = vt.total_lines();

    // Pass 1: find prompt lines and their command tails.
    let mut starts: Vec<(usize, String)> = Vec::new();
    for abs in 0..total {
        let Some(line) = vt.text_at_abs(abs) else {
            continue;
        };
        if line.trim().is_empty() || exclusions.iter().any(|re| re.is_match(&line)) {
            continue;
        }
        if let Some(command) = prompts.iter().find_map(|re| {
            re.captures(&line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().trim_end().to_string())
        }) {
            starts.push((abs, command));
        }
    }

    // Pass 2: each block ends one line before the next prompt (or EOF).
    let mut blocks = Vec::new();
    for (i, (start, command)) in starts.iter().enumerate() {
        if command.is_empty() {
            continue;
        }
        let end = starts
            .get(i + 1)
            .map(|(next, _)| next.saturating_sub(1))
            .unwrap_or(total.saturating_sub(1));
        let output_start = (start + 1).min(end);
        let (output, styled_output) = if *start < end {
            collect_output(vt, output_start, end)
        } else {
            (String::new(), Vec::new())
        };
        blocks.push(CommandBlock {
            command: command.clone(),
            output,
            styled_output,
            exit_code: None,
            start_line: *start,
            end_line: end,
            method: ParseMethod::Regex,
        });
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vt_with(bytes: &[u8]) -> Vt {
        let mut vt = Vt::new(10, 40, 500);
        vt.write(bytes);
        vt
    }

    #[test]
    fn osc133_single_command() {
        // A full shell-integration exchange: prompt, command, output, exit 0,
        // next prompt.
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\echo foo\x1b]133;C\x1b\\\r\nfoo\r\n\x1b]133;D;0\x1b\\\x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.command, "echo foo");
        assert_eq!(block.output, "foo");
        assert_eq!(block.exit_code, Some(0));
        assert_eq!(block.method, ParseMethod::Osc133);
    }

    #[test]
    fn unexecuted_prompt_is_skipped() {
        let vt = vt_with(b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\ls -la");
        assert!(parse_command_blocks(&vt).is_empty());
    }

    #[test]
    fn blocks_are_newest_first() {
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\echo one\x1b]133;C\x1b\\\r\none\r\n\x1b]133;D;0\x1b\\\
              \x1b]133;A\x1b\\$ \x1b]133;B\x1b\\echo two\x1b]133;C\x1b\\\r\ntwo\r\n\x1b]133;D;0\x1b\\\
              \x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].command, "echo two");
        assert_eq!(blocks[1].command, "echo one");
    }

    #[test]
    fn exit_code_nonzero_preserved() {
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\false\x1b]133;C\x1b\\\r\n\x1b]133;D;1\x1b\\\x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].command, "false");
        assert_eq!(blocks[0].exit_code, Some(1));
        assert_eq!(blocks[0].output, "");
    }

    #[test]
    fn styled_output_keeps_ansi() {
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\grep x\x1b]133;C\x1b\\\r\n\x1b[31mred\x1b[0m\r\n\x1b]133;D;0\x1b\\\x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks[0].output, "red");
        assert!(blocks[0].styled_output[0].contains("\x1b[0;31m"));
    }

    #[test]
    fn clear_between_commands_keeps_pairing_sane() {
        // CSI 2J between commands overwrites the first command's screen
        // content (its markers drop), and homes the cursor so the next
        // prompt lands on a lower absolute line than the old D. Pairing by
        // record order still reconstructs the surviving command cleanly.
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\make\x1b]133;C\x1b\\\r\nbuild ok\r\n\x1b]133;D;0\x1b\\\x1b[2J\x1b[H\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\ls\x1b]133;C\x1b\\\r\n\x1b]133;D;0\x1b\\",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].command, "ls");
        assert_eq!(blocks[0].exit_code, Some(0));
    }

    #[test]
    fn regex_fallback_basic_prompts() {
        let vt = vt_with(
            b"user@host:~ $ echo hi\r\nhi\r\nuser@host:~ $ ls\r\nfile1\r\nfile2\r\n",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].method, ParseMethod::Regex);
        assert_eq!(blocks[1].command, "echo hi");
        assert_eq!(blocks[1].output, "hi");
        assert_eq!(blocks[0].command, "ls");
        assert_eq!(blocks[0].output, "file1\nfile2");
    }

    #[test]
    fn regex_excludes_output_looking_lines() {
        // `-rw-r--r-- ...` and box-drawing lines must not start blocks,
        // even though `$` characters may appear in them.
        let vt = vt_with(
            b"$ ls -l\r\n-rw-r--r-- 1 u g 12 f $ x\r\n\xe2\x94\x82 table $ cell\r\n",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].command, "ls -l");
    }

    #[test]
    fn regex_skipped_when_markers_exist() {
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\true\x1b]133;C\x1b\\\r\n\x1b]133;D;0\x1b\\$ echo fake-prompt\r\n\x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert!(blocks.iter().all(|b| b.method == ParseMethod::Osc133));
    }

    #[test]
    fn output_trims_trailing_blank_lines() {
        let vt = vt_with(
            b"\x1b]133;A\x1b\\$ \x1b]133;B\x1b\\echo x\x1b]133;C\x1b\\\r\nx\r\n\r\n\r\n\x1b]133;D;0\x1b\\\x1b]133;A\x1b\\$ ",
        );
        let blocks = parse_command_blocks(&vt);
        assert_eq!(blocks[0].output, "x");
    }
}

// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Lexical helpers over raw `.cm` buffers.
//!
//! These operate on bytes, mirroring the byte-oriented LSP coordinates the
//! rest of the server uses. They exist so rename and completion can avoid
//! touching strings, character literals, and comments without a full parse.

use camino::Utf8Path;

/// Splits on `\n`, trimming a trailing `\r` per line and keeping the final
/// empty line after a trailing newline.
pub fn split_lines(s: &str) -> Vec<&str> {
    s.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l)).collect()
}

pub fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Finds `ident` in `line` as a standalone identifier (both neighbours
/// outside the identifier class), returning its byte offset.
pub fn index_of_identifier(line: &str, ident: &str) -> Option<usize> {
    if ident.is_empty() {
        return None;
    }
    let bytes = line.as_bytes();
    let n = ident.len();

    let mut i = 0;
    while i + n <= bytes.len() {
        if &bytes[i..i + n] == ident.as_bytes() {
            let before_ok = i == 0 || !is_ident_byte(bytes[i - 1]);
            let after_ok = i + n == bytes.len() || !is_ident_byte(bytes[i + n]);
            if before_ok && after_ok {
                return Some(i);
            }
        }
        i += 1;
    }
    None
}

/// Returns the last identifier in `s` and its byte offset.
pub fn last_identifier(s: &str) -> Option<(&str, usize)> {
    let bytes = s.as_bytes();
    let end = bytes.iter().rposition(|&b| is_ident_byte(b))?;
    let mut start = end;
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    Some((&s[start..=end], start))
}

/// Expands around `char0` to the byte span of the identifier under the
/// cursor.
pub fn ident_span_at(line: &str, char0: usize) -> Option<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut start = char0.min(line.len());
    if start > 0 && start == line.len() {
        start = line.len() - 1;
    }
    while start > 0 && is_ident_byte(bytes[start - 1]) {
        start -= 1;
    }
    let mut end = char0.min(line.len());
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    (end > start).then_some((start, end))
}

/// Expands around `char0` to the identifier under the cursor, also
/// detecting a `qualifier.` immediately to its left.
pub fn identifier_at(line: &str, char0: usize) -> (Option<&str>, Option<&str>) {
    let bytes = line.as_bytes();
    let Some((start, end)) = ident_span_at(line, char0) else {
        return (None, None);
    };
    let ident = &line[start..end];

    let mut qualifier = None;
    if start > 0 && bytes[start - 1] == b'.' {
        let q_end = start - 1;
        let mut q_start = q_end;
        while q_start > 0 && is_ident_byte(bytes[q_start - 1]) {
            q_start -= 1;
        }
        if q_start < q_end {
            qualifier = Some(&line[q_start..q_end]);
        }
    }

    (Some(ident), qualifier)
}

/// Snaps a column onto the nearest identifier start on the line: the
/// current run, else left onto an adjacent run, else the next run to the
/// right, else the previous run to the left.
pub fn snap_char_to_identifier(line: &str, char0: usize) -> Option<usize> {
    let bytes = line.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let char0 = char0.min(bytes.len());

    if char0 < bytes.len() && is_ident_byte(bytes[char0]) {
        return Some(char0);
    }
    if char0 > 0 && is_ident_byte(bytes[char0 - 1]) {
        let mut i = char0 - 1;
        while i > 0 && is_ident_byte(bytes[i - 1]) {
            i -= 1;
        }
        return Some(i);
    }

    for i in char0..bytes.len() {
        if is_ident_byte(bytes[i]) {
            return Some(i);
        }
    }
    for i in (0..char0).rev() {
        if is_ident_byte(bytes[i]) {
            let mut j = i;
            while j > 0 && is_ident_byte(bytes[j - 1]) {
                j -= 1;
            }
            return Some(j);
        }
    }

    None
}

/// Reads one line of a generated C file and snaps within it.
pub fn snap_char_in_c_file(c_path: &Utf8Path, line1: u32, char0: usize) -> Option<usize> {
    let content = std::fs::read_to_string(c_path).ok()?;
    let line = content.lines().nth(line1.checked_sub(1)? as usize)?;
    snap_char_to_identifier(line, char0)
}

/// A single-pass state machine deciding whether `(line0, char0)` falls
/// inside a `//` comment, a `/* */` comment, a string, or a character
/// literal.
pub fn is_in_string_or_comment(src: &str, line0: usize, char0: usize) -> bool {
    let lines = split_lines(src);
    if line0 >= lines.len() {
        return false;
    }

    let mut off = 0usize;
    for line in lines.iter().take(line0) {
        off += line.len() + 1;
    }
    off += char0.min(lines[line0].len());

    let bytes = src.as_bytes();
    let mut in_line_comment = false;
    let mut in_block_comment = false;
    let mut in_string = false;
    let mut in_char = false;
    let mut escaped = false;

    let mut i = 0;
    while i < bytes.len() && i < off {
        let c = bytes[i];

        if in_line_comment {
            if c == b'\n' {
                in_line_comment = false;
            }
            i += 1;
            continue;
        }
        if in_block_comment {
            if c == b'*' && bytes.get(i + 1) == Some(&b'/') {
                in_block_comment = false;
                i += 2;
                continue;
            }
            i += 1;
            continue;
        }
        if in_string {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == b'"' {
                in_string = false;
            }
            i += 1;
            continue;
        }
        if in_char {
            if escaped {
                escaped = false;
            } else if c == b'\\' {
                escaped = true;
            } else if c == b'\'' {
                in_char = false;
            }
            i += 1;
            continue;
        }

        match c {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                in_line_comment = true;
                i += 2;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                in_block_comment = true;
                i += 2;
            }
            b'"' => {
                in_string = true;
                i += 1;
            }
            b'\'' => {
                in_char = true;
                i += 1;
            }
            _ => i += 1,
        }
    }

    in_line_comment || in_block_comment || in_string || in_char
}

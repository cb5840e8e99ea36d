// Copyright 2026 The c-minus Authors
// SPDX-License-Identifier: Apache-2.0

//! Bidirectional `#line` mapping for generated C files.
//!
//! A `#line <n> "<path>"` directive on generated line `k` applies from
//! generated line `k+1` until the next directive. The mapper is rebuilt by
//! one linear pass whenever a generated file changes.

use std::io::BufRead;

use camino::{Utf8Path, Utf8PathBuf};

#[derive(Debug, Clone)]
struct Segment {
    /// 1-based generated line where this mapping starts.
    out_start_line: u32,
    /// 1-based original line where this mapping starts.
    orig_start_line: u32,
    /// Original file path; empty means "no mapping".
    orig_file: Utf8PathBuf,
}

/// Sparse generated-line ↔ original-line association.
#[derive(Debug, Clone, Default)]
pub struct LineMapper {
    segments: Vec<Segment>,
}

impl LineMapper {
    /// Builds a mapper by scanning a generated C file for `#line`
    /// directives.
    ///
    /// # Errors
    ///
    /// Propagates read failures.
    pub fn from_reader(reader: impl BufRead) -> std::io::Result<Self> {
        // The leading segment has no origin; lines before the first
        // directive stay unmapped.
        let mut segments = vec![Segment {
            out_start_line: 1,
            orig_start_line: 1,
            orig_file: Utf8PathBuf::new(),
        }];

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let out_line = (i + 1) as u32;
            let Some((n, path)) = parse_line_directive(line.trim()) else {
                continue;
            };
            segments.push(Segment {
                out_start_line: out_line + 1,
                orig_start_line: n,
                orig_file: path,
            });
        }

        Ok(Self { segments })
    }

    /// Maps a 1-based generated line to `(original file, original line)`.
    ///
    /// Returns `None` for lines before the first directive.
    #[must_use]
    pub fn map_line(&self, out_line1: u32) -> Option<(&Utf8Path, u32)> {
        let seg = self
            .segments
            .iter()
            .rev()
            .find(|s| s.out_start_line <= out_line1)?;
        if seg.orig_file.as_str().is_empty() {
            return None;
        }
        let delta = out_line1 - seg.out_start_line;
        Some((&seg.orig_file, seg.orig_start_line + delta))
    }

    /// Maps a 1-based original line back to the first generated line whose
    /// segment covers it.
    #[must_use]
    pub fn map_to_generated_line(&self, orig_file: &Utf8Path, orig_line1: u32) -> Option<u32> {
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.orig_file != orig_file {
                continue;
            }
            let end_out = self
                .segments
                .get(i + 1)
                .map_or(u32::MAX, |next| next.out_start_line - 1);
            if orig_line1 < seg.orig_start_line {
                continue;
            }
            let max_orig = seg.orig_start_line + (end_out - seg.out_start_line);
            if orig_line1 > max_orig {
                continue;
            }
            return Some(seg.out_start_line + (orig_line1 - seg.orig_start_line));
        }
        None
    }
}

/// Parses `#line <n> "<path>"`; other lines yield `None`.
fn parse_line_directive(line: &str) -> Option<(u32, Utf8PathBuf)> {
    let rest = line.strip_prefix("#line ")?.trim();
    let (num, tail) = rest.split_once(char::is_whitespace)?;
    let n: u32 = num.parse().ok()?;

    let quoted = tail.trim();
    let quoted = quoted.strip_prefix('"')?;
    let end = quoted.rfind('"')?;
    if end == 0 {
        return None;
    }
    Some((n, Utf8PathBuf::from(&quoted[..end])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mapper(content: &str) -> LineMapper {
        LineMapper::from_reader(Cursor::new(content.to_string())).unwrap()
    }

    #[test]
    fn forward_mapping_follows_directives() {
        let c = "#include <stdio.h>\n#line 10 \"/tmp/main.cm\"\nint main() {\n  return does_not_exist;\n}\n";
        let lm = mapper(c);

        assert_eq!(lm.map_line(3), Some((Utf8Path::new("/tmp/main.cm"), 10)));
        assert_eq!(lm.map_line(4), Some((Utf8Path::new("/tmp/main.cm"), 11)));
        assert_eq!(lm.map_line(1), None, "lines before the first directive are unmapped");
    }

    #[test]
    fn reverse_mapping_inverts_forward() {
        let c = "#include <stdio.h>\n#line 10 \"/tmp/main.cm\"\nint main() {\n  return 0;\n}\n#line 20 \"/tmp/other.cm\"\nint x;\n";
        let lm = mapper(c);

        assert_eq!(lm.map_to_generated_line(Utf8Path::new("/tmp/main.cm"), 10), Some(3));
        assert_eq!(lm.map_to_generated_line(Utf8Path::new("/tmp/main.cm"), 12), Some(5));
        assert_eq!(lm.map_to_generated_line(Utf8Path::new("/tmp/other.cm"), 20), Some(7));
        assert_eq!(lm.map_to_generated_line(Utf8Path::new("/tmp/main.cm"), 99), None);
    }

    #[test]
    fn later_directive_wins_for_overlapping_output() {
        let c = "#line 5 \"/a.cm\"\nint a;\n#line 50 \"/a.cm\"\nint b;\n";
        let lm = mapper(c);
        assert_eq!(lm.map_line(2), Some((Utf8Path::new("/a.cm"), 5)));
        assert_eq!(lm.map_line(4), Some((Utf8Path::new("/a.cm"), 50)));
    }

    #[test]
    fn directive_parsing_tolerates_junk() {
        assert_eq!(parse_line_directive("#line 7 \"/x.c\""), Some((7, Utf8PathBuf::from("/x.c"))));
        assert_eq!(parse_line_directive("#line abc \"/x.c\""), None);
        assert_eq!(parse_line_directive("#include <x.h>"), None);
        assert_eq!(parse_line_directive("#line 7"), None);
    }

    #[test]
    fn paths_with_spaces_survive() {
        let lm = mapper("#line 3 \"/tmp/my project/main.cm\"\nint x;\n");
        assert_eq!(lm.map_line(2), Some((Utf8Path::new("/tmp/my project/main.cm"), 3)));
    }
}

use crate::window::{line_cells, total_lines};

/// Hard cap on collected matches; collection stops once reached and the
/// caller surfaces the saturation.
pub const MATCH_CAP: usize = 1000;

/// One occurrence of the query. `line` indexes the virtual
/// `(scrollback ∥ screen)` space; columns are cell columns with
/// `end_col` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchMatch {
    pub line: usize,
    pub start_col: u16,
    pub end_col: u16,
}

/// Case sensitivity: insensitive unless the query contains an uppercase
/// letter (smart case).
pub fn is_case_sensitive(query: &str) -> bool {
    query.chars().any(|c| c.is_uppercase())
}

/// Collect every occurrence of `query` across scrollback then screen
/// lines, oldest first, capped at [`MATCH_CAP`]. Returns the matches and
/// whether the cap was hit.
pub fn collect_matches(parser: &mut vt100::Parser, query: &str) -> (Vec<SearchMatch>, bool) {
    let mut out = Vec::new();
    if query.is_empty() {
        return (out, false);
    }
    let sensitive = is_case_sensitive(query);
    let needle = if sensitive { query.to_string() } else { query.to_lowercase() };
    let total = total_lines(parser);
    for abs in 0..total {
        let Some(cells) = line_cells(parser, abs) else { break };
        // Flatten to text, remembering each cell's byte range and the
        // column width it covers so byte offsets map back to columns.
        let mut text = String::new();
        let mut spans: Vec<(usize, u16, u16)> = Vec::with_capacity(cells.len()); // (byte_start, col, width)
        for (i, (col, contents)) in cells.iter().enumerate() {
            let width = cells
                .get(i + 1)
                .map(|(c, _)| c.saturating_sub(*col))
                .unwrap_or_else(|| unicode_width::UnicodeWidthStr::width(contents.as_str()) as u16)
                .max(1);
            spans.push((text.len(), *col, width));
            if sensitive {
                text.push_str(contents);
            } else {
                for c in contents.chars() {
                    text.extend(c.to_lowercase());
                }
            }
        }
        let mut from = 0;
        while let Some(rel) = text[from..].find(needle.as_str()) {
            let start_byte = from + rel;
            let end_byte = start_byte + needle.len();
            let start_col = col_for_byte(&spans, start_byte);
            let end_col = col_after_byte(&spans, end_byte);
            out.push(SearchMatch { line: abs, start_col, end_col });
            if out.len() >= MATCH_CAP {
                return (out, true);
            }
            // Advance one cell, not one byte, to stay on char boundaries.
            from = next_span_boundary(&spans, start_byte, text.len());
        }
    }
    (out, false)
}

fn col_for_byte(spans: &[(usize, u16, u16)], byte: usize) -> u16 {
    let mut col = 0;
    for &(b, c, _) in spans {
        if b > byte {
            break;
        }
        col = c;
    }
    col
}

/// Column one past the cell containing the last byte of the match.
fn col_after_byte(spans: &[(usize, u16, u16)], end_byte: usize) -> u16 {
    let mut result = 0;
    for &(b, c, w) in spans {
        if b >= end_byte {
            break;
        }
        result = c + w;
    }
    result
}

fn next_span_boundary(spans: &[(usize, u16, u16)], after_byte: usize, text_len: usize) -> usize {
    for &(b, _, _) in spans {
        if b > after_byte {
            return b;
        }
    }
    text_len
}

// ─── Jump policy ────────────────────────────────────────────────────────────

/// Index of the match a fresh forward search lands on: first match
/// strictly after the cursor in reading order, wrapping to the first
/// match overall.
pub fn first_forward(matches: &[SearchMatch], cursor: (usize, u16)) -> Option<usize> {
    if matches.is_empty() {
        return None;
    }
    matches
        .iter()
        .position(|m| (m.line, m.start_col) > cursor)
        .or(Some(0))
}

/// Index for a fresh backward search: last match strictly before the
/// cursor, wrapping to the last match overall.
pub fn first_backward(matches: &[SearchMatch], cursor: (usize, u16)) -> Option<usize> {
    if matches.is_empty() {
        return None;
    }
    matches
        .iter()
        .rposition(|m| (m.line, m.start_col) < cursor)
        .or(Some(matches.len() - 1))
}

/// Step `current` one match in the search's intrinsic direction
/// (`n` when `forward`, `N` flips the caller's direction).
pub fn step(matches: &[SearchMatch], current: usize, forward: bool) -> usize {
    if matches.is_empty() {
        return 0;
    }
    if forward {
        (current + 1) % matches.len()
    } else {
        (current + matches.len() - 1) % matches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser_with(lines: &[&str]) -> vt100::Parser {
        let mut p = vt100::Parser::new(5, 40, 100);
        for (i, l) in lines.iter().enumerate() {
            if i > 0 {
                p.process(b"\r\n");
            }
            p.process(l.as_bytes());
        }
        p
    }

    #[test]
    fn matches_collected_in_reading_order() {
        let mut p = parser_with(&["hello world", "world hello", "foo bar"]);
        let (m, saturated) = collect_matches(&mut p, "world");
        assert!(!saturated);
        assert_eq!(
            m,
            vec![
                SearchMatch { line: 0, start_col: 6, end_col: 11 },
                SearchMatch { line: 1, start_col: 0, end_col: 5 },
            ]
        );
    }

    #[test]
    fn search_is_case_insensitive_by_default() {
        let mut p = parser_with(&["Hello HELLO hello"]);
        let (m, _) = collect_matches(&mut p, "hello");
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn uppercase_query_is_smart_case_sensitive() {
        let mut p = parser_with(&["Hello HELLO hello"]);
        let (m, _) = collect_matches(&mut p, "HELLO");
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].start_col, 6);
    }

    #[test]
    fn wide_cells_offset_following_columns() {
        // The CJK char occupies columns 0-1, so "abc" starts at column 2.
        let mut p = parser_with(&["\u{4f60}abc"]);
        let (m, _) = collect_matches(&mut p, "abc");
        assert_eq!(m, vec![SearchMatch { line: 0, start_col: 2, end_col: 5 }]);
    }

    #[test]
    fn collection_stops_at_the_cap() {
        let mut p = vt100::Parser::new(5, 40, 2000);
        for _ in 0..600 {
            p.process(b"xx xx\r\n");
        }
        let (m, saturated) = collect_matches(&mut p, "xx");
        assert!(saturated);
        assert_eq!(m.len(), MATCH_CAP);
        // Earliest-in-reading-order matches survive.
        assert_eq!(m[0].line, 0);
        assert!(m.windows(2).all(|w| (w[0].line, w[0].start_col) < (w[1].line, w[1].start_col)));
    }

    #[test]
    fn forward_jump_and_wrap() {
        let matches = vec![
            SearchMatch { line: 0, start_col: 6, end_col: 11 },
            SearchMatch { line: 1, start_col: 0, end_col: 5 },
        ];
        // Scenario: cursor at the origin jumps to (0,6), n steps to
        // (1,0), another n wraps to (0,6).
        let first = first_forward(&matches, (0, 0)).unwrap();
        assert_eq!(first, 0);
        let second = step(&matches, first, true);
        assert_eq!(matches[second].line, 1);
        let third = step(&matches, second, true);
        assert_eq!((matches[third].line, matches[third].start_col), (0, 6));
    }

    #[test]
    fn backward_jump_and_wrap() {
        let matches = vec![
            SearchMatch { line: 0, start_col: 6, end_col: 11 },
            SearchMatch { line: 1, start_col: 0, end_col: 5 },
        ];
        assert_eq!(first_backward(&matches, (1, 0)), Some(0));
        // Nothing before the origin: wrap to the last match.
        assert_eq!(first_backward(&matches, (0, 0)), Some(1));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let mut p = parser_with(&["anything"]);
        let (m, saturated) = collect_matches(&mut p, "");
        assert!(m.is_empty());
        assert!(!saturated);
    }
}

//! Marker extraction from raw check output.
//!
//! Checks report logical results as `<name>: <STATUS>` lines mixed into
//! whatever else they print. This module is the only place that knows the
//! marker grammar; everything downstream works on [`ResultRecord`]s.
//!
//! Grammar:
//! - `<name>` is the longest run of word, space, tab or hyphen characters on
//!   the same line immediately before the colon, trimmed. Names without a
//!   single word character are ignored.
//! - `<STATUS>` is one of the six uppercase tokens, matched case-sensitively
//!   and only as a whole token: `PASSING` and `PASS-ish` are not `PASS`.
//! - Notes are the block that follows the marker line: it must start with an
//!   indented, non-blank line and runs until a blank line, a line starting
//!   with an uppercase letter in column 0, or a line holding another marker.
//!   When one line holds several markers, only the last one gets the notes.

use std::sync::LazyLock;

use regex::{CaptureMatches, Regex};

use crate::core::types::{ResultRecord, Status};

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w \t-]+):[ \t]+(PASS|FAIL|WARNING|PARTIAL|INCONCLUSIVE|ERROR)\b")
        .expect("marker regex should be valid")
});

/// Scan `text` for markers, tagging every record with `category`.
///
/// The returned iterator is lazy and finite. Calling `extract` again on the
/// same text yields the same records.
pub fn extract<'t>(text: &'t str, category: &str) -> Records<'t> {
    Records {
        text,
        category: category.to_string(),
        matches: MARKER_RE.captures_iter(text),
    }
}

/// Convenience wrapper collecting [`extract`] into a vector.
pub fn extract_all(text: &str, category: &str) -> Vec<ResultRecord> {
    extract(text, category).collect()
}

/// Lazy sequence of records found in one text blob.
pub struct Records<'t> {
    text: &'t str,
    category: String,
    matches: CaptureMatches<'static, 't>,
}

impl Iterator for Records<'_> {
    type Item = ResultRecord;

    fn next(&mut self) -> Option<ResultRecord> {
        for caps in self.matches.by_ref() {
            let (Some(whole), Some(name), Some(token)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            let test_name = name.as_str().trim();
            if !test_name.chars().any(|ch| ch.is_alphanumeric() || ch == '_') {
                continue;
            }
            let Ok(status) = token.as_str().parse::<Status>() else {
                continue;
            };
            // `-` may continue a name, so `PASS-ish` is not a whole token.
            let rest = &self.text[token.end()..];
            if rest.starts_with('-') {
                continue;
            }
            let rest_of_line = rest.split('\n').next().unwrap_or_default();
            let notes = if has_marker(rest_of_line) {
                String::new()
            } else {
                notes_after(self.text, whole.end())
            };
            return Some(ResultRecord {
                category: self.category.clone(),
                test_name: test_name.to_string(),
                status,
                notes,
            });
        }
        None
    }
}

/// Collect the notes block following the line that contains `offset`.
fn notes_after(text: &str, offset: usize) -> String {
    let rest = &text[offset..];
    let Some(newline) = rest.find('\n') else {
        return String::new();
    };
    let mut lines = rest[newline + 1..].lines();

    let mut notes = Vec::new();
    match lines.next() {
        Some(first) if starts_indented(first) && !first.trim().is_empty() => {
            if has_marker(first) {
                return String::new();
            }
            notes.push(first.trim());
        }
        _ => return String::new(),
    }

    for line in lines {
        if line.trim().is_empty() || starts_uppercase(line) || has_marker(line) {
            break;
        }
        notes.push(line.trim());
    }
    notes.join("\n")
}

fn has_marker(line: &str) -> bool {
    extract(line, "").next().is_some()
}

fn starts_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

fn starts_uppercase(line: &str) -> bool {
    line.chars().next().is_some_and(char::is_uppercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(records: &[ResultRecord]) -> Vec<&str> {
        records.iter().map(|r| r.test_name.as_str()).collect()
    }

    #[test]
    fn extracts_single_marker() {
        let records = extract_all("Output File Existence: PASS\nAll good.\n", "Data Integrity");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_name, "Output File Existence");
        assert_eq!(records[0].status, Status::Pass);
        assert_eq!(records[0].category, "Data Integrity");
        assert_eq!(records[0].notes, "");
    }

    #[test]
    fn no_markers_yields_nothing() {
        assert!(extract_all("", "c").is_empty());
        assert!(extract_all("running do-file 01_import.do\nend of do-file\n", "c").is_empty());
        assert!(extract_all("Result - PASS\n", "c").is_empty());
    }

    #[test]
    fn status_must_be_exact_uppercase_token() {
        let text = "Alpha: PASSING\nBeta: pass\nGamma: FAILED\nDelta: WARNING.\nEps: ERROR_X\nCheck: PASS-ish\n";
        let records = extract_all(text, "c");
        assert_eq!(names(&records), vec!["Delta"]);
        assert_eq!(records[0].status, Status::Warning);
    }

    #[test]
    fn recognizes_all_six_statuses() {
        let text = "a: PASS\nb: FAIL\nc: WARNING\nd: PARTIAL\ne: INCONCLUSIVE\nf: ERROR\n";
        let statuses: Vec<Status> = extract(text, "c").map(|r| r.status).collect();
        assert_eq!(statuses, Status::ALL.to_vec());
    }

    #[test]
    fn name_keeps_hyphens_and_drops_prefix_noise() {
        let text = "[12:01] Variable Consistency - Students: FAIL\n";
        let records = extract_all(text, "c");
        assert_eq!(names(&records), vec!["Variable Consistency - Students"]);
    }

    #[test]
    fn name_does_not_span_lines() {
        let text = "intro text\nDataset Coherence: WARNING\n";
        let records = extract_all(text, "c");
        assert_eq!(names(&records), vec!["Dataset Coherence"]);
    }

    #[test]
    fn skips_names_without_word_characters() {
        let text = " - : PASS\n   : FAIL\nReal: PASS\n";
        assert_eq!(names(&extract_all(text, "c")), vec!["Real"]);
    }

    #[test]
    fn multiple_markers_on_one_line_keep_order() {
        let text = "Students: PASS Parents: FAIL\n    only parents note\n";
        let records = extract_all(text, "c");
        assert_eq!(names(&records), vec!["Students", "Parents"]);
        assert_eq!(records[1].status, Status::Fail);
        assert_eq!(records[0].notes, "");
        assert_eq!(records[1].notes, "only parents note");
    }

    #[test]
    fn captures_indented_notes_until_blank_line() {
        let text = "Missing Values Check: WARNING\n    overall missing rate 34%\n    threshold 30%\n\nnext block\n";
        let records = extract_all(text, "c");
        assert_eq!(records[0].notes, "overall missing rate 34%\nthreshold 30%");
    }

    #[test]
    fn notes_stop_at_capitalized_line() {
        let text = "Observation Preservation: PASS\n  98% preserved\ncontinued detail\nDuplicate Resolution Quality: PASS\n";
        let records = extract_all(text, "c");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].notes, "98% preserved\ncontinued detail");
        assert_eq!(records[1].notes, "");
    }

    #[test]
    fn notes_stop_at_indented_marker() {
        let text = "Outer: PASS\n    detail\n    Inner: FAIL\n    inner detail\n";
        let records = extract_all(text, "c");
        assert_eq!(names(&records), vec!["Outer", "Inner"]);
        assert_eq!(records[0].notes, "detail");
        assert_eq!(records[1].notes, "inner detail");
    }

    #[test]
    fn notes_require_indented_first_line() {
        let text = "Check: PASS\nlowercase but not indented\n";
        assert_eq!(extract_all(text, "c")[0].notes, "");
    }

    #[test]
    fn tolerates_crlf_and_unicode() {
        let text = "Überprüfung Äußere Datei: PASS\r\n    Pfad gefunden ✓\r\n\r\n";
        let records = extract_all(text, "Kategorie");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].test_name, "Überprüfung Äußere Datei");
        assert_eq!(records[0].notes, "Pfad gefunden ✓");
    }

    #[test]
    fn marker_at_end_of_text_without_newline() {
        let records = extract_all("Full Pipeline: ERROR", "c");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, Status::Error);
    }

    #[test]
    fn extraction_is_idempotent() {
        let text = "A: PASS\n  note a\nB: PARTIAL\n\nC: INCONCLUSIVE\n";
        let first = extract_all(text, "c");
        let second = extract_all(text, "c");
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        let inputs = [
            ":::: PASS",
            "\n\n\n: FAIL\n",
            "a:\tPASS\t\n\t",
            "x: PASS\n\t",
            "名前: PASS\n  メモ\n",
            "\u{0}\u{FEFF}Name: ERROR\n",
        ];
        for input in inputs {
            let records = extract_all(input, "c");
            assert!(records.len() <= 1, "{input:?}");
        }
    }
}

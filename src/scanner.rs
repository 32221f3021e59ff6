// 🔍 Lexical Scanner - Bytes → classified line stream
// Resolves text encoding (BOM sniff, UTF-8 primary, Windows-1252 only if
// UTF-8 fails outright - never silent substitution), then classifies each
// line by its leading marker. The scanner carries one piece of state: a
// pending-row counter so overflow-list rows are classified without any
// feedback from the assembler.

use crate::document::parse_amount;
use crate::error::IngestError;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// LINE MARKERS
// ============================================================================

static FORM_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\\@(\d+)\s*\\\s*(.*)$").unwrap());
static SECTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\:(\d+)").unwrap());
static ENTRY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\\&(\d+)").unwrap());
static FIELD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.(\d+[A-Za-z]?)(?:\s+(.*))?$").unwrap());
static LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\.LIST\s+(\d+[A-Za-z]?)\s+(\d+)\s*$").unwrap());

/// Client boundary lines are classified `Other`; the partitioner owns
/// them and recognizes the prefix.
pub(crate) fn is_client_begin(line: &str) -> bool {
    line.starts_with("**BEGIN")
}

pub(crate) fn is_client_end(line: &str) -> bool {
    line.starts_with("**END")
}

// ============================================================================
// RAW LINE
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    FormStart { code: String, label: String },
    Section { index: u32 },
    Entry { ordinal: u32 },
    Field { key: String, value: String },
    ListHeader { key: String, count: usize },
    ListRow { label: String, amount: f64 },
    Terminator,
    Other,
}

/// A single classified line. Ephemeral: consumed immediately by the
/// assembler; `raw` and `number` survive into diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct RawLine {
    pub number: usize,
    pub kind: LineKind,
    pub raw: String,
}

// ============================================================================
// DECODING
// ============================================================================

fn decode_strict(
    encoding: &'static Encoding,
    label: &str,
    bytes: &[u8],
) -> Result<String, IngestError> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        Err(IngestError::Decoding {
            encoding: label.to_string(),
            detail: "malformed byte sequence".to_string(),
        })
    } else {
        Ok(text.into_owned())
    }
}

/// Decode a raw export buffer. A BOM selects the encoding strictly;
/// without one, UTF-8 is primary and Windows-1252 is the single-byte
/// fallback, used only when UTF-8 decoding fails outright.
pub fn decode(bytes: &[u8]) -> Result<String, IngestError> {
    if bytes.starts_with(&[0xFF, 0xFE]) {
        return decode_strict(UTF_16LE, "utf-16le", &bytes[2..]);
    }
    if bytes.starts_with(&[0xFE, 0xFF]) {
        return decode_strict(UTF_16BE, "utf-16be", &bytes[2..]);
    }
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        return decode_strict(UTF_8, "utf-8", &bytes[3..]);
    }
    match decode_strict(UTF_8, "utf-8", bytes) {
        Ok(text) => Ok(text),
        Err(_) => {
            log::debug!("input is not UTF-8, falling back to windows-1252");
            decode_strict(WINDOWS_1252, "windows-1252", bytes)
        }
    }
}

// ============================================================================
// LINE SCANNER
// ============================================================================

/// Lazy iterator of classified lines. Restartable: constructing a new
/// scanner over the same text yields an identical sequence.
pub struct LineScanner<'a> {
    lines: std::str::Lines<'a>,
    number: usize,
    pending_rows: usize,
}

impl<'a> LineScanner<'a> {
    pub fn new(text: &'a str) -> Self {
        LineScanner {
            lines: text.lines(),
            number: 0,
            pending_rows: 0,
        }
    }

    fn classify(line: &str) -> LineKind {
        if let Some(caps) = LIST_PATTERN.captures(line) {
            if let Ok(count) = caps[2].parse::<usize>() {
                return LineKind::ListHeader {
                    key: caps[1].to_string(),
                    count,
                };
            }
        }
        if let Some(caps) = FORM_PATTERN.captures(line) {
            return LineKind::FormStart {
                code: caps[1].to_string(),
                label: caps[2].trim().to_string(),
            };
        }
        if let Some(caps) = SECTION_PATTERN.captures(line) {
            if let Ok(index) = caps[1].parse::<u32>() {
                return LineKind::Section { index };
            }
        }
        if let Some(caps) = ENTRY_PATTERN.captures(line) {
            if let Ok(ordinal) = caps[1].parse::<u32>() {
                return LineKind::Entry { ordinal };
            }
        }
        if line.starts_with("\\#") {
            return LineKind::Terminator;
        }
        if let Some(caps) = FIELD_PATTERN.captures(line) {
            let value = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            return LineKind::Field {
                key: caps[1].to_string(),
                value: value.to_string(),
            };
        }
        LineKind::Other
    }

    /// A structural marker inside a pending overflow list closes the list
    /// short; the line reverts to its normal classification.
    fn breaks_list(line: &str) -> bool {
        is_client_begin(line)
            || is_client_end(line)
            || line.starts_with("\\#")
            || FORM_PATTERN.is_match(line)
            || SECTION_PATTERN.is_match(line)
            || ENTRY_PATTERN.is_match(line)
            || LIST_PATTERN.is_match(line)
    }

    fn parse_list_row(line: &str) -> LineKind {
        let trimmed = line.trim();
        if let Some((label, amount_text)) = trimmed.rsplit_once(|c: char| c.is_whitespace()) {
            if let Some(amount) = parse_amount(amount_text) {
                return LineKind::ListRow {
                    label: label.trim().to_string(),
                    amount,
                };
            }
        }
        // No trailing numeric token: keep the whole line as identifier.
        LineKind::ListRow {
            label: trimmed.to_string(),
            amount: 0.0,
        }
    }
}

impl<'a> Iterator for LineScanner<'a> {
    type Item = RawLine;

    fn next(&mut self) -> Option<RawLine> {
        let line = self.lines.next()?;
        self.number += 1;

        let kind = if self.pending_rows > 0 {
            if Self::breaks_list(line) {
                self.pending_rows = 0;
                Self::classify(line)
            } else {
                self.pending_rows -= 1;
                Self::parse_list_row(line)
            }
        } else {
            let kind = Self::classify(line);
            if let LineKind::ListHeader { count, .. } = kind {
                self.pending_rows = count;
            }
            kind
        };

        Some(RawLine {
            number: self.number,
            kind,
            raw: line.to_string(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<LineKind> {
        LineScanner::new(text).map(|l| l.kind).collect()
    }

    #[test]
    fn test_marker_classification() {
        let text = "\\@181 \\ INTEREST INCOME\n\\:2\n\\&1\n.71 76518\n.71M 12500\n\\#\njunk line\n";
        assert_eq!(
            kinds(text),
            vec![
                LineKind::FormStart {
                    code: "181".to_string(),
                    label: "INTEREST INCOME".to_string()
                },
                LineKind::Section { index: 2 },
                LineKind::Entry { ordinal: 1 },
                LineKind::Field {
                    key: "71".to_string(),
                    value: "76518".to_string()
                },
                LineKind::Field {
                    key: "71M".to_string(),
                    value: "12500".to_string()
                },
                LineKind::Terminator,
                LineKind::Other,
            ]
        );
    }

    #[test]
    fn test_field_with_empty_value() {
        assert_eq!(
            kinds(".46\n"),
            vec![LineKind::Field {
                key: "46".to_string(),
                value: String::new()
            }]
        );
    }

    #[test]
    fn test_list_rows_consumed_by_declared_count() {
        let text = ".71 76518\n.LIST 71 2\nFIRST NATIONAL 50,000\nACME BROKERAGE 26518\n.72 10\n";
        let got = kinds(text);
        assert_eq!(
            got,
            vec![
                LineKind::Field {
                    key: "71".to_string(),
                    value: "76518".to_string()
                },
                LineKind::ListHeader {
                    key: "71".to_string(),
                    count: 2
                },
                LineKind::ListRow {
                    label: "FIRST NATIONAL".to_string(),
                    amount: 50000.0
                },
                LineKind::ListRow {
                    label: "ACME BROKERAGE".to_string(),
                    amount: 26518.0
                },
                // Beyond the declared count: back to normal classification.
                LineKind::Field {
                    key: "72".to_string(),
                    value: "10".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_structural_marker_breaks_pending_list() {
        let text = ".LIST 71 3\nONLY ROW 100\n\\&2\n.40 SOMETHING\n";
        let got = kinds(text);
        assert_eq!(got[1], LineKind::ListRow { label: "ONLY ROW".to_string(), amount: 100.0 });
        // The entry marker reverts instead of being swallowed as a row.
        assert_eq!(got[2], LineKind::Entry { ordinal: 2 });
        assert_eq!(
            got[3],
            LineKind::Field {
                key: "40".to_string(),
                value: "SOMETHING".to_string()
            }
        );
    }

    #[test]
    fn test_scanner_is_restartable() {
        let text = "\\@180 \\ WAGES\n.54 5000\n";
        let first: Vec<RawLine> = LineScanner::new(text).collect();
        let second: Vec<RawLine> = LineScanner::new(text).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_utf16le_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "\\@180 \\ WAGES".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        assert_eq!(decode(&bytes).unwrap(), "\\@180 \\ WAGES");
    }

    #[test]
    fn test_decode_falls_back_to_single_byte() {
        // 0xE9 is not valid UTF-8 on its own but is 'é' in windows-1252.
        let bytes = b".40 JOS\xE9";
        assert_eq!(decode(bytes).unwrap(), ".40 JOSé");
    }

    #[test]
    fn test_decode_bom_encoding_is_strict() {
        // UTF-16LE BOM followed by an odd byte count cannot decode.
        let bytes = vec![0xFF, 0xFE, 0x41];
        let err = decode(&bytes).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_client_boundaries_stay_other() {
        let text = "**BEGIN,2024:I:SMITH:1,123-45-6789,NYC,A,\n**END\n";
        assert_eq!(kinds(text), vec![LineKind::Other, LineKind::Other]);
        assert!(is_client_begin("**BEGIN,2024:I:SMITH:1,,,,"));
        assert!(is_client_end("**END"));
    }
}

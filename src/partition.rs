// 📦 Client Partitioner - Form stream → one batch per client
// Splits on **BEGIN / **END boundary lines and holds at most one
// client's data in memory at a time. A batch that hits end-of-input
// before its end marker is emitted anyway, flagged incomplete - partial
// data is still valuable downstream.

use crate::assembler::DocumentAssembler;
use crate::diagnostics::{ParseWarning, Severity, WarningKind};
use crate::document::{ClientBatch, ClientHeader};
use crate::error::IngestError;
use crate::scanner::{decode, is_client_begin, is_client_end, LineScanner, RawLine};
use once_cell::sync::Lazy;
use regex::Regex;

static HEADER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\*\*BEGIN,(\d{4}):([A-Za-z0-9]+):([^:]+):(\d+),([^,]*),([^,]*),([^,]*),(.*)$")
        .unwrap()
});

// ============================================================================
// HEADER PARSING
// ============================================================================

fn parse_header(line: &RawLine) -> (ClientHeader, Option<ParseWarning>) {
    if let Some(caps) = HEADER_PATTERN.captures(line.raw.trim_end()) {
        let header = ClientHeader {
            year: caps[1].parse().unwrap_or(0),
            type_code: caps[2].to_string(),
            client_id: caps[3].to_string(),
            sequence: caps[4].to_string(),
            ssn: caps[5].to_string(),
            office: caps[6].to_string(),
            group: caps[7].to_string(),
            location: caps[8].trim().to_string(),
        };
        (header, None)
    } else {
        let header = ClientHeader {
            client_id: "UNKNOWN".to_string(),
            ..ClientHeader::default()
        };
        let warning = ParseWarning::new(
            WarningKind::MalformedHeader,
            Severity::Warning,
            format!("client begin line did not parse: {}", line.raw),
        )
        .with_line(line.number);
        (header, Some(warning))
    }
}

// ============================================================================
// PARTITIONER
// ============================================================================

/// Iterator of completed, immutable `ClientBatch` values. Each batch is
/// self-contained: the linker never reaches across batches, so callers
/// may hand separate batches to separate workers.
pub struct ClientPartitioner<'a> {
    scanner: LineScanner<'a>,
    pending: Option<(ClientHeader, Vec<ParseWarning>)>,
    leading_strays: usize,
    done: bool,
}

impl<'a> ClientPartitioner<'a> {
    pub fn new(text: &'a str) -> Self {
        ClientPartitioner {
            scanner: LineScanner::new(text),
            pending: None,
            leading_strays: 0,
            done: false,
        }
    }

    /// Scan forward to the first client begin line, counting what we skip.
    fn find_first_header(&mut self) -> Option<(ClientHeader, Vec<ParseWarning>)> {
        loop {
            let line = self.scanner.next()?;
            if is_client_begin(&line.raw) {
                let (header, warning) = parse_header(&line);
                return Some((header, warning.into_iter().collect()));
            }
            if !line.raw.trim().is_empty() {
                self.leading_strays += 1;
            }
        }
    }

    fn build_batch(
        &mut self,
        header: ClientHeader,
        mut warnings: Vec<ParseWarning>,
    ) -> ClientBatch {
        let mut assembler = DocumentAssembler::new();
        let mut incomplete = false;

        loop {
            match self.scanner.next() {
                Some(line) if is_client_begin(&line.raw) => {
                    // Next client opens: this one closes normally.
                    let (next_header, next_warning) = parse_header(&line);
                    self.pending = Some((next_header, next_warning.into_iter().collect()));
                    break;
                }
                Some(line) if is_client_end(&line.raw) => break,
                Some(line) => assembler.feed(&line),
                None => {
                    let err = IngestError::MalformedBatch {
                        client_id: header.client_id.clone(),
                    };
                    log::warn!("{}", err);
                    warnings.push(ParseWarning::new(
                        WarningKind::MalformedBatch,
                        Severity::Critical,
                        err.to_string(),
                    ));
                    incomplete = true;
                    self.done = true;
                    break;
                }
            }
        }

        let output = assembler.finish();
        let mut batch = ClientBatch::new(header);
        batch.forms = output.forms;
        batch.incomplete = incomplete;
        batch.diagnostics.count_unrecognized(output.unrecognized_lines);
        if self.leading_strays > 0 {
            warnings.push(ParseWarning::new(
                WarningKind::StrayLine,
                Severity::Info,
                format!(
                    "{} lines before the first client begin were ignored",
                    self.leading_strays
                ),
            ));
            self.leading_strays = 0;
        }
        for warning in warnings.into_iter().chain(output.warnings) {
            let warning = if warning.client.is_none() {
                warning.with_client(batch.header.client_id.clone())
            } else {
                warning
            };
            batch.diagnostics.push(warning);
        }
        log::debug!("{}", batch.summary());
        batch
    }
}

impl<'a> Iterator for ClientPartitioner<'a> {
    type Item = ClientBatch;

    fn next(&mut self) -> Option<ClientBatch> {
        if self.done {
            return None;
        }
        let (header, warnings) = match self.pending.take() {
            Some(pending) => pending,
            None => match self.find_first_header() {
                Some(found) => found,
                None => {
                    if self.leading_strays > 0 {
                        log::warn!(
                            "input contained {} lines but no client begin marker",
                            self.leading_strays
                        );
                    }
                    self.done = true;
                    return None;
                }
            },
        };
        Some(self.build_batch(header, warnings))
    }
}

/// Decode and partition a whole export buffer in one call. Decoding
/// failures are fatal for the file; everything else degrades into batch
/// diagnostics.
pub fn ingest(bytes: &[u8]) -> Result<Vec<ClientBatch>, IngestError> {
    let text = decode(bytes)?;
    Ok(ClientPartitioner::new(&text).collect())
}

// ============================================================================
// TESTS
// ============================================================================

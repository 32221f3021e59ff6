// 🚨 Error Taxonomy - Fatal vs recoverable failures
// Structural failures abort the current file; everything else degrades
// to diagnostics (see diagnostics.rs) because legacy export data is
// known to be inconsistent and must be surfaced, not crashed on.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// No supported encoding decodes the input buffer. Fatal for the
    /// whole file - there is nothing meaningful to salvage.
    #[error("cannot decode export file as {encoding}: {detail}")]
    Decoding { encoding: String, detail: String },

    /// A client batch reached end-of-input without its end marker.
    /// Recoverable: the partial batch is still emitted, flagged
    /// incomplete, with this error recorded as a diagnostic.
    #[error("client batch '{client_id}' has no end marker before end of input")]
    MalformedBatch { client_id: String },
}

impl IngestError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Decoding { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_is_fatal() {
        let err = IngestError::Decoding {
            encoding: "utf-16le".to_string(),
            detail: "odd byte length".to_string(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("utf-16le"));
    }

    #[test]
    fn test_malformed_batch_is_recoverable() {
        let err = IngestError::MalformedBatch {
            client_id: "SMITH".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("SMITH"));
    }
}

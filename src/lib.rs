// 🧾 Return Construction - Core Library
// Reconstructs a queryable document model from tax-software export files:
// scanner → assembler → partitioner → linker → resolution engine.
// Data flows strictly forward; no component reaches back upstream.

pub mod assembler;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod linker;
pub mod mapping;
pub mod partition;
pub mod resolution;
pub mod scanner;

// Re-export commonly used types
pub use assembler::{AssemblyOutput, DocumentAssembler};
pub use diagnostics::{Diagnostics, ParseWarning, Severity, WarningKind};
pub use document::{
    ClientBatch, ClientHeader, Entry, Field, Form, ListBlock, ListReconciliation, ListRow, Section,
};
pub use error::IngestError;
pub use linker::{FieldOrigin, LinkEngine, LinkOutcome, LinkedEntity};
pub use mapping::{FormMapping, FormRole, LinkGroup, MappingTable};
pub use partition::{ingest, ClientPartitioner};
pub use resolution::{
    resolve, FieldLookup, ItemStatus, Owner, Provenance, ResolutionEngine, ResolutionSpec,
    ResolvedItem,
};
pub use scanner::{decode, LineKind, LineScanner, RawLine};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

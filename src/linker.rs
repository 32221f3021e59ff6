// 🔗 Cross-Reference Linker - Header/child joins by structural index
// Within one client batch, header forms anchor families of child records
// that share a section index (e.g. a brokerage account header joined to
// its income and sales sub-records). The join table is built once per
// batch; linked entities hold copies of the source fields, never
// back-references into parser state.

use crate::diagnostics::{ParseWarning, Severity, WarningKind};
use crate::document::{ClientBatch, Field};
use crate::mapping::{LinkGroup, MappingTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// LINKED ENTITY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldOrigin {
    Header,
    Child,
}

/// A child record joined to its header's fields. Lookup is child-first:
/// on a key collision the child wins, because it is the more specific
/// record; the header's value stays retrievable through `header_fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedEntity {
    pub group: String,
    pub index: u32,
    /// False when no header section carried this child's index.
    pub linked: bool,
    pub header_code: Option<String>,
    pub header_fields: BTreeMap<String, Field>,
    pub child_code: String,
    pub child_ordinal: u32,
    pub child_fields: BTreeMap<String, Field>,
}

impl LinkedEntity {
    pub fn field(&self, key: &str) -> Option<&Field> {
        self.child_fields
            .get(key)
            .or_else(|| self.header_fields.get(key))
    }

    pub fn get(&self, key: &str) -> &str {
        self.field(key).map(|f| f.value.as_str()).unwrap_or("")
    }

    pub fn get_amount(&self, key: &str) -> f64 {
        self.field(key).map(|f| f.as_amount()).unwrap_or(0.0)
    }

    /// Where a lookup for this key would be served from.
    pub fn origin(&self, key: &str) -> Option<FieldOrigin> {
        if self.child_fields.contains_key(key) {
            Some(FieldOrigin::Child)
        } else if self.header_fields.contains_key(key) {
            Some(FieldOrigin::Header)
        } else {
            None
        }
    }

    /// Union of child and header keys, deduplicated, in key order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .child_fields
            .keys()
            .chain(self.header_fields.keys())
            .map(|k| k.as_str())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

// ============================================================================
// LINK OUTCOME
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkOutcome {
    pub entities: Vec<LinkedEntity>,
    pub warnings: Vec<ParseWarning>,
}

impl LinkOutcome {
    pub fn entities_for(&self, group: &str) -> Vec<&LinkedEntity> {
        self.entities.iter().filter(|e| e.group == group).collect()
    }

    pub fn linked_count(&self) -> usize {
        self.entities.iter().filter(|e| e.linked).count()
    }

    pub fn unlinked_count(&self) -> usize {
        self.entities.iter().filter(|e| !e.linked).count()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} linked entities ({} unlinked), {} warnings",
            self.entities.len(),
            self.unlinked_count(),
            self.warnings.len()
        )
    }
}

// ============================================================================
// LINK ENGINE
// ============================================================================

pub struct LinkEngine<'a> {
    groups: &'a [LinkGroup],
}

impl<'a> LinkEngine<'a> {
    pub fn new(table: &'a MappingTable) -> Self {
        LinkEngine {
            groups: table.link_groups(),
        }
    }

    pub fn from_groups(groups: &'a [LinkGroup]) -> Self {
        LinkEngine { groups }
    }

    /// Link one client batch. Deterministic: identical input produces an
    /// identical entity sequence and provenance on every pass.
    pub fn link(&self, batch: &ClientBatch) -> LinkOutcome {
        let mut outcome = LinkOutcome::default();

        for group in self.groups {
            let header_map = self.build_header_map(group, batch, &mut outcome.warnings);

            for child_code in &group.children {
                for form in batch.forms_with_code(child_code) {
                    for section in &form.sections {
                        for entry in &section.entries {
                            let entity = match header_map.get(&section.index) {
                                Some(header_fields) => LinkedEntity {
                                    group: group.name.clone(),
                                    index: section.index,
                                    linked: true,
                                    header_code: Some(group.header.clone()),
                                    header_fields: header_fields.clone(),
                                    child_code: child_code.clone(),
                                    child_ordinal: entry.ordinal,
                                    child_fields: entry.fields.clone(),
                                },
                                None => LinkedEntity {
                                    group: group.name.clone(),
                                    index: section.index,
                                    linked: false,
                                    header_code: None,
                                    header_fields: BTreeMap::new(),
                                    child_code: child_code.clone(),
                                    child_ordinal: entry.ordinal,
                                    child_fields: entry.fields.clone(),
                                },
                            };
                            outcome.entities.push(entity);
                        }
                    }
                }
            }
        }

        log::debug!("client {}: {}", batch.header.client_id, outcome.summary());
        outcome
    }

    /// Structural index → copied header fields for one group. When two
    /// header sections declare the same index the first in source order
    /// wins; later duplicates are skipped for linking but remain
    /// retrievable from the raw form tree.
    fn build_header_map(
        &self,
        group: &LinkGroup,
        batch: &ClientBatch,
        warnings: &mut Vec<ParseWarning>,
    ) -> BTreeMap<u32, BTreeMap<String, Field>> {
        let mut header_map: BTreeMap<u32, BTreeMap<String, Field>> = BTreeMap::new();

        for form in batch.forms_with_code(&group.header) {
            for section in &form.sections {
                if header_map.contains_key(&section.index) {
                    warnings.push(
                        ParseWarning::new(
                            WarningKind::DuplicateIndex,
                            Severity::Warning,
                            format!(
                                "header {} declares structural index {} more than once; first occurrence wins",
                                group.header, section.index
                            ),
                        )
                        .with_client(batch.header.client_id.clone())
                        .with_form(group.header.clone()),
                    );
                    continue;
                }
                let mut fields = BTreeMap::new();
                for entry in &section.entries {
                    for (key, field) in &entry.fields {
                        fields.insert(key.clone(), field.clone());
                    }
                }
                header_map.insert(section.index, fields);
            }
        }

        header_map
    }
}

impl ClientBatch {
    /// Convenience: link this batch with the configured groups.
    pub fn link(&self, table: &MappingTable) -> LinkOutcome {
        LinkEngine::new(table).link(self)
    }
}

// ============================================================================
// TESTS
// ============================================================================

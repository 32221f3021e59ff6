// 📄 Document Model - Form → Section → Entry → Field tree
// Lossless, exactly-keyed storage of one client's export. Field keys are
// stored verbatim (suffix included): a base field and its memo counterpart
// are two distinct keys, never merged. Coercions read, never rewrite.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tolerance for advisory amount comparisons (one cent).
pub const AMOUNT_TOLERANCE: f64 = 0.01;

/// Parse an export amount string, tolerating currency formatting.
/// Blank values are zero; anything non-numeric is None so callers can
/// distinguish "no amount" from "amount of zero".
pub(crate) fn parse_amount(text: &str) -> Option<f64> {
    let clean = text.replace(',', "").replace('$', "");
    let clean = clean.trim();
    if clean.is_empty() {
        return Some(0.0);
    }
    clean.parse::<f64>().ok()
}

// ============================================================================
// FIELD
// ============================================================================

/// A single field as it appeared in the source: exact key (suffix and
/// all), raw value text, and the line it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub key: String,
    pub value: String,
    pub line: usize,
}

impl Field {
    pub fn new(key: impl Into<String>, value: impl Into<String>, line: usize) -> Self {
        Field {
            key: key.into(),
            value: value.into(),
            line,
        }
    }

    /// True when the key carries a memo suffix character (e.g. "71M").
    pub fn is_memo(&self) -> bool {
        self.key.ends_with(|c: char| c.is_ascii_alphabetic())
    }

    /// The key with any memo suffix stripped ("71M" → "71").
    pub fn base_key(&self) -> &str {
        self.key.trim_end_matches(|c: char| c.is_ascii_alphabetic())
    }

    /// Numeric value with currency formatting stripped; 0 when blank or
    /// non-numeric, matching how the source treats empty amounts.
    pub fn as_amount(&self) -> f64 {
        parse_amount(&self.value).unwrap_or(0.0)
    }

    /// Checkbox coercion: the export marks set flags with "X".
    pub fn as_flag(&self) -> bool {
        self.value.trim().eq_ignore_ascii_case("X")
    }

    /// Date coercion over the formats the export is known to use.
    pub fn as_date(&self) -> Option<NaiveDate> {
        let value = self.value.trim();
        if value.is_empty() {
            return None;
        }
        for fmt in ["%m/%d/%Y", "%m/%d/%y", "%Y-%m-%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(value, fmt) {
                return Some(date);
            }
        }
        None
    }
}

// ============================================================================
// OVERFLOW LIST
// ============================================================================

/// One sub-record of an overflow list: free-text identifier plus amount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRow {
    pub label: String,
    pub amount: f64,
}

/// Overflow structure attached to a single field key: the field's value
/// is an aggregate and these rows are the underlying items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListBlock {
    pub owner_key: String,
    pub declared_count: usize,
    pub rows: Vec<ListRow>,
    pub line: usize,
}

/// Advisory outcome of checking list rows against the parent field.
/// Source data legitimately diverges; this is surfaced, never corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ListReconciliation {
    Balanced { total: f64 },
    Divergent { total: f64, expected: f64, difference: f64 },
}

impl ListBlock {
    pub fn new(owner_key: impl Into<String>, declared_count: usize, line: usize) -> Self {
        ListBlock {
            owner_key: owner_key.into(),
            declared_count,
            rows: Vec::new(),
            line,
        }
    }

    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.amount).sum()
    }

    pub fn count_matches(&self) -> bool {
        self.rows.len() == self.declared_count
    }

    pub fn reconcile(&self, parent_value: f64) -> ListReconciliation {
        let total = self.total();
        let difference = total - parent_value;
        if difference.abs() <= AMOUNT_TOLERANCE {
            ListReconciliation::Balanced { total }
        } else {
            ListReconciliation::Divergent {
                total,
                expected: parent_value,
                difference,
            }
        }
    }
}

// ============================================================================
// ENTRY
// ============================================================================

/// The unit of repetition within a section (e.g. one of several income
/// items). Keys are unique within an entry; a later occurrence of the
/// same exact key overwrites, a suffixed variant never touches its base.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub section: u32,
    pub ordinal: u32,
    pub fields: BTreeMap<String, Field>,
    pub lists: Vec<ListBlock>,
}

impl Entry {
    pub fn new(section: u32, ordinal: u32) -> Self {
        Entry {
            section,
            ordinal,
            fields: BTreeMap::new(),
            lists: Vec::new(),
        }
    }

    pub fn field(&self, key: &str) -> Option<&Field> {
        self.fields.get(key)
    }

    /// Field value by exact key, empty string when absent.
    pub fn get(&self, key: &str) -> &str {
        self.fields.get(key).map(|f| f.value.as_str()).unwrap_or("")
    }

    pub fn get_amount(&self, key: &str) -> f64 {
        self.fields.get(key).map(|f| f.as_amount()).unwrap_or(0.0)
    }

    pub fn get_flag(&self, key: &str) -> bool {
        self.fields.get(key).map(|f| f.as_flag()).unwrap_or(false)
    }

    pub fn get_date(&self, key: &str) -> Option<NaiveDate> {
        self.fields.get(key).and_then(|f| f.as_date())
    }

    pub fn lists_for(&self, key: &str) -> Vec<&ListBlock> {
        self.lists.iter().filter(|l| l.owner_key == key).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.lists.is_empty()
    }
}

// ============================================================================
// SECTION & FORM
// ============================================================================

/// Named subdivision of a form. The index is a pure join key for
/// header/child linking and carries no business meaning of its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub index: u32,
    pub entries: Vec<Entry>,
}

impl Section {
    pub fn new(index: u32) -> Self {
        Section {
            index,
            entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    pub code: String,
    pub label: String,
    pub sections: Vec<Section>,
}

impl Form {
    pub fn new(code: impl Into<String>, label: impl Into<String>) -> Self {
        Form {
            code: code.into(),
            label: label.into(),
            sections: Vec::new(),
        }
    }

    pub fn section(&self, index: u32) -> Option<&Section> {
        self.sections.iter().find(|s| s.index == index)
    }

    /// All entries across sections, in source order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.sections.iter().flat_map(|s| s.entries.iter())
    }

    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }
}

// ============================================================================
// CLIENT HEADER
// ============================================================================

/// Parsed client-begin line: year, type code, client identifier plus the
/// trailing metadata positions the export carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientHeader {
    pub year: u16,
    pub type_code: String,
    pub client_id: String,
    pub sequence: String,
    pub ssn: String,
    pub office: String,
    pub group: String,
    pub location: String,
}

// ============================================================================
// CLIENT BATCH
// ============================================================================

/// All forms belonging to one client, in source order. The unit of work
/// for linking and resolution; self-contained, so independent batches can
/// be processed by independent workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientBatch {
    pub header: ClientHeader,
    pub forms: Vec<Form>,
    /// True when end-of-input arrived before this client's end marker.
    pub incomplete: bool,
    pub diagnostics: crate::diagnostics::Diagnostics,
}

impl ClientBatch {
    pub fn new(header: ClientHeader) -> Self {
        ClientBatch {
            header,
            forms: Vec::new(),
            incomplete: false,
            diagnostics: crate::diagnostics::Diagnostics::new(),
        }
    }

    /// First form with the given code, if any.
    pub fn form(&self, code: &str) -> Option<&Form> {
        self.forms.iter().find(|f| f.code == code)
    }

    /// Every form with the given code, in source order. A re-opened form
    /// code yields a distinct frozen Form per occurrence.
    pub fn forms_with_code(&self, code: &str) -> Vec<&Form> {
        self.forms.iter().filter(|f| f.code == code).collect()
    }

    /// All entries across every form with the given code, source order.
    pub fn entries(&self, code: &str) -> Vec<&Entry> {
        self.forms
            .iter()
            .filter(|f| f.code == code)
            .flat_map(|f| f.entries())
            .collect()
    }

    /// Distinct form codes in first-seen order.
    pub fn form_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for form in &self.forms {
            if !codes.contains(&form.code.as_str()) {
                codes.push(&form.code);
            }
        }
        codes
    }

    pub fn summary(&self) -> String {
        format!(
            "Client {} ({}): {} forms, {} entries{}",
            self.header.client_id,
            self.header.year,
            self.forms.len(),
            self.forms.iter().map(|f| f.entry_count()).sum::<usize>(),
            if self.incomplete { ", INCOMPLETE" } else { "" }
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================

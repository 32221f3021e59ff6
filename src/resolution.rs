// ⚖️ Field Resolution Engine - Name, owner, and current-vs-prior amounts
// Pure over the parsed fields: the same entry can be resolved many times
// under different specifications (checklist, reconciliation report) with
// identical results. Absence of a name or activity is a data condition,
// never an error.

use crate::document::{Entry, Field};
use crate::linker::LinkedEntity;
use crate::mapping::MappingTable;
use serde::{Deserialize, Serialize};

// ============================================================================
// FIELD LOOKUP
// ============================================================================

/// Anything resolvable: a plain entry or a linked entity (child-first).
pub trait FieldLookup {
    fn lookup(&self, key: &str) -> Option<&Field>;

    fn lookup_amount(&self, key: &str) -> f64 {
        self.lookup(key).map(|f| f.as_amount()).unwrap_or(0.0)
    }
}

impl FieldLookup for Entry {
    fn lookup(&self, key: &str) -> Option<&Field> {
        self.field(key)
    }
}

impl FieldLookup for LinkedEntity {
    fn lookup(&self, key: &str) -> Option<&Field> {
        self.field(key)
    }
}

// ============================================================================
// OWNER & STATUS
// ============================================================================

/// Owner coding used throughout the export: T, S or J.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    #[default]
    Taxpayer,
    Spouse,
    Joint,
}

impl Owner {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "S" => Owner::Spouse,
            "J" => Owner::Joint,
            _ => Owner::Taxpayer,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Owner::Taxpayer => "Taxpayer",
            Owner::Spouse => "Spouse",
            Owner::Joint => "Joint",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Current-year value present and non-zero
    Present,
    /// No current value, but the memo counterpart says one is expected
    MissingPrior,
    /// No activity in either year; callers typically suppress these
    Inactive,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Present => "Present",
            ItemStatus::MissingPrior => "MissingPrior",
            ItemStatus::Inactive => "Inactive",
        }
    }
}

// ============================================================================
// RESOLUTION SPEC
// ============================================================================

fn default_memo_suffix() -> char {
    'M'
}

fn default_sentinels() -> Vec<String> {
    vec![
        "estimate".to_string(),
        "various".to_string(),
        "unknown".to_string(),
    ]
}

fn default_fallback_label() -> String {
    "Unknown".to_string()
}

/// Declarative recipe for resolving one kind of entity. Lives in the
/// mapping table; the engine never hard-codes candidate keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSpec {
    /// Name candidates, tried in priority order.
    pub name_keys: Vec<String>,

    /// Amount base keys, tried in priority order; each base key is
    /// paired with its memo counterpart (base + suffix).
    pub amount_keys: Vec<String>,

    #[serde(default = "default_memo_suffix")]
    pub memo_suffix: char,

    /// Case-insensitive tokens meaning "unspecified"; a candidate whose
    /// value matches one is skipped.
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,

    #[serde(default = "default_fallback_label")]
    pub fallback_label: String,

    /// Field holding the T/S/J owner code, when the form carries one.
    #[serde(default)]
    pub owner_key: Option<String>,
}

impl ResolutionSpec {
    pub fn new(name_keys: Vec<String>, amount_keys: Vec<String>) -> Self {
        ResolutionSpec {
            name_keys,
            amount_keys,
            memo_suffix: default_memo_suffix(),
            sentinels: default_sentinels(),
            fallback_label: default_fallback_label(),
            owner_key: None,
        }
    }

    pub fn with_owner_key(mut self, key: impl Into<String>) -> Self {
        self.owner_key = Some(key.into());
        self
    }

    fn is_sentinel(&self, value: &str) -> bool {
        self.sentinels
            .iter()
            .any(|s| s.eq_ignore_ascii_case(value.trim()))
    }
}

// ============================================================================
// RESOLVED ITEM
// ============================================================================

/// Which source field keys contributed to a resolved item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub name_key: Option<String>,
    pub amount_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedItem {
    pub name: String,
    /// False when every name candidate was empty or a sentinel.
    pub name_resolved: bool,
    pub owner: Owner,
    pub status: ItemStatus,
    pub current: f64,
    pub prior: f64,
    /// Current value when Present, the expected-but-absent memo value
    /// when MissingPrior, zero when Inactive.
    pub display_amount: f64,
    pub provenance: Provenance,
}

impl ResolvedItem {
    pub fn is_active(&self) -> bool {
        self.status != ItemStatus::Inactive
    }
}

// ============================================================================
// RESOLUTION
// ============================================================================

/// Resolve one entity under one spec. Pure: reads the field maps, never
/// mutates them.
pub fn resolve(entity: &impl FieldLookup, spec: &ResolutionSpec) -> ResolvedItem {
    let mut name = spec.fallback_label.clone();
    let mut name_resolved = false;
    let mut name_key = None;
    for key in &spec.name_keys {
        if let Some(field) = entity.lookup(key) {
            let value = field.value.trim();
            if !value.is_empty() && !spec.is_sentinel(value) {
                name = value.to_string();
                name_resolved = true;
                name_key = Some(key.clone());
                break;
            }
        }
    }

    let owner = spec
        .owner_key
        .as_ref()
        .and_then(|key| entity.lookup(key))
        .map(|f| Owner::from_code(&f.value))
        .unwrap_or_default();

    // Memo/prior-year state machine, first Present wins, else the first
    // base key whose memo counterpart shows expected activity.
    let mut present: Option<(String, f64, f64)> = None;
    let mut missing_prior: Option<(String, f64, f64)> = None;
    for base in &spec.amount_keys {
        let current = entity.lookup_amount(base);
        let memo_key = format!("{}{}", base, spec.memo_suffix);
        let prior = entity.lookup_amount(&memo_key);
        if current != 0.0 {
            present = Some((base.clone(), current, prior));
            break;
        }
        if prior != 0.0 && missing_prior.is_none() {
            missing_prior = Some((memo_key, current, prior));
        }
    }

    let (status, current, prior, display_amount, amount_key) = match (present, missing_prior) {
        (Some((key, current, prior)), _) => {
            (ItemStatus::Present, current, prior, current, Some(key))
        }
        (None, Some((memo_key, current, prior))) => {
            (ItemStatus::MissingPrior, current, prior, prior, Some(memo_key))
        }
        (None, None) => (ItemStatus::Inactive, 0.0, 0.0, 0.0, None),
    };

    ResolvedItem {
        name,
        name_resolved,
        owner,
        status,
        current,
        prior,
        display_amount,
        provenance: Provenance {
            name_key,
            amount_key,
        },
    }
}

// ============================================================================
// RESOLUTION ENGINE
// ============================================================================

/// Resolves entities using the specs configured in the mapping table.
pub struct ResolutionEngine<'a> {
    table: &'a MappingTable,
}

impl<'a> ResolutionEngine<'a> {
    pub fn new(table: &'a MappingTable) -> Self {
        ResolutionEngine { table }
    }

    pub fn resolve(&self, entity: &impl FieldLookup, spec: &ResolutionSpec) -> ResolvedItem {
        resolve(entity, spec)
    }

    /// Resolve under the spec configured for a form code; None when the
    /// table has no resolution spec for that form.
    pub fn resolve_form(&self, form_code: &str, entity: &impl FieldLookup) -> Option<ResolvedItem> {
        let spec = self.table.resolution_spec(form_code)?;
        Some(resolve(entity, spec))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Field;

    fn entry_with(fields: &[(&str, &str)]) -> Entry {
        let mut entry = Entry::new(1, 1);
        for (i, (key, value)) in fields.iter().enumerate() {
            entry
                .fields
                .insert(key.to_string(), Field::new(*key, *value, i + 1));
        }
        entry
    }

    fn spec() -> ResolutionSpec {
        ResolutionSpec::new(
            vec!["46".to_string(), "34".to_string(), "956".to_string()],
            vec!["71".to_string()],
        )
        .with_owner_key("30")
    }

    #[test]
    fn test_current_value_wins() {
        let entry = entry_with(&[("956", "Acme LLC"), ("71", "76,518"), ("71M", "12500")]);
        let item = resolve(&entry, &spec());
        assert_eq!(item.status, ItemStatus::Present);
        assert_eq!(item.display_amount, 76518.0);
        assert_eq!(item.current, 76518.0);
        assert_eq!(item.prior, 12500.0);
        assert_eq!(item.provenance.amount_key.as_deref(), Some("71"));
        assert!(item.is_active());
    }

    #[test]
    fn test_memo_only_is_missing_prior() {
        let entry = entry_with(&[("956", "Acme LLC"), ("71M", "12500")]);
        let item = resolve(&entry, &spec());
        assert_eq!(item.status, ItemStatus::MissingPrior);
        assert_eq!(item.display_amount, 12500.0);
        assert_eq!(item.current, 0.0);
        assert_eq!(item.prior, 12500.0);
        assert_eq!(item.provenance.amount_key.as_deref(), Some("71M"));
    }

    #[test]
    fn test_no_activity_is_inactive() {
        let entry = entry_with(&[("956", "Acme LLC"), ("71", "0")]);
        let item = resolve(&entry, &spec());
        assert_eq!(item.status, ItemStatus::Inactive);
        assert_eq!(item.display_amount, 0.0);
        assert_eq!(item.provenance.amount_key, None);
        assert!(!item.is_active());
    }

    #[test]
    fn test_name_candidates_skip_empty_and_sentinel() {
        // "46" empty, "34" a sentinel, "956" the real name.
        let entry = entry_with(&[("46", ""), ("34", "Various"), ("956", "Acme LLC"), ("71", "5")]);
        let item = resolve(&entry, &spec());
        assert_eq!(item.name, "Acme LLC");
        assert!(item.name_resolved);
        assert_eq!(item.provenance.name_key.as_deref(), Some("956"));
    }

    #[test]
    fn test_exhausted_names_fall_back_without_error() {
        let entry = entry_with(&[("34", "ESTIMATE"), ("71", "5")]);
        let item = resolve(&entry, &spec());
        assert_eq!(item.name, "Unknown");
        assert!(!item.name_resolved);
        assert_eq!(item.provenance.name_key, None);
        // Still a perfectly usable item.
        assert_eq!(item.status, ItemStatus::Present);
    }

    #[test]
    fn test_owner_codes() {
        let entry = entry_with(&[("30", "S"), ("71", "5")]);
        assert_eq!(resolve(&entry, &spec()).owner, Owner::Spouse);
        let entry = entry_with(&[("30", "j"), ("71", "5")]);
        assert_eq!(resolve(&entry, &spec()).owner, Owner::Joint);
        let entry = entry_with(&[("71", "5")]);
        assert_eq!(resolve(&entry, &spec()).owner, Owner::Taxpayer);
        assert_eq!(Owner::Joint.as_str(), "Joint");
    }

    #[test]
    fn test_amount_key_priority_order() {
        let spec = ResolutionSpec::new(
            vec!["956".to_string()],
            vec!["54".to_string(), "60".to_string()],
        );
        // First base key inactive, second present.
        let entry = entry_with(&[("54", "0"), ("60", "880")]);
        let item = resolve(&entry, &spec);
        assert_eq!(item.status, ItemStatus::Present);
        assert_eq!(item.provenance.amount_key.as_deref(), Some("60"));

        // A Present on a later key beats a MissingPrior on an earlier one.
        let entry = entry_with(&[("54M", "100"), ("60", "880")]);
        let item = resolve(&entry, &spec);
        assert_eq!(item.status, ItemStatus::Present);
        assert_eq!(item.display_amount, 880.0);
    }

    #[test]
    fn test_resolution_is_pure_and_repeatable() {
        let entry = entry_with(&[("956", "Acme LLC"), ("71", "10"), ("71M", "4")]);
        let before = entry.clone();

        let first = resolve(&entry, &spec());
        let second = resolve(&entry, &spec());
        assert_eq!(first, second);

        // A different spec over the same entry, then the original again.
        let other_spec = ResolutionSpec::new(vec!["34".to_string()], vec!["99".to_string()]);
        let _ = resolve(&entry, &other_spec);
        assert_eq!(resolve(&entry, &spec()), first);
        assert_eq!(entry, before);
    }
}

// 🗺️ Mapping Table - Per-form semantics as configuration
// The same field number means different things on different forms; that
// knowledge lives here as data, loaded once at startup and immutable for
// the run. The core stays polymorphic over it and never hard-codes a
// form code.

use crate::resolution::ResolutionSpec;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// ============================================================================
// FORM ROLES & LINK GROUPS
// ============================================================================

/// Role of a form code within a link group: the anchor of a linked
/// family, or a dependent detail record joining it by structural index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormRole {
    Header,
    Child,
}

impl FormRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormRole::Header => "header",
            FormRole::Child => "child",
        }
    }
}

/// One header form code plus the child form codes that join it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkGroup {
    pub name: String,
    pub header: String,
    pub children: Vec<String>,
}

// ============================================================================
// PER-FORM MAPPING
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormMapping {
    #[serde(default)]
    pub label: String,

    /// Field number → semantic name (e.g. "40" → "payer_name").
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// How to resolve display name / owner / amounts for this form's
    /// entries and linked entities.
    #[serde(default)]
    pub resolve: Option<ResolutionSpec>,
}

// ============================================================================
// MAPPING TABLE
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MappingTable {
    #[serde(default)]
    pub forms: BTreeMap<String, FormMapping>,

    #[serde(default)]
    pub link_groups: Vec<LinkGroup>,
}

impl MappingTable {
    pub fn new() -> Self {
        MappingTable::default()
    }

    /// Load the table from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read mapping file: {:?}", path.as_ref()))?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse mapping JSON")
    }

    /// Field number for a semantic name on a form ("payer_name" → "40").
    pub fn field_number(&self, form_code: &str, semantic_name: &str) -> Option<&str> {
        let mapping = self.forms.get(form_code)?;
        mapping
            .fields
            .iter()
            .find(|(_, name)| name.as_str() == semantic_name)
            .map(|(number, _)| number.as_str())
    }

    /// Semantic name for a field number on a form ("40" → "payer_name").
    pub fn field_name(&self, form_code: &str, field_number: &str) -> Option<&str> {
        self.forms
            .get(form_code)?
            .fields
            .get(field_number)
            .map(|s| s.as_str())
    }

    pub fn form_label(&self, form_code: &str) -> String {
        self.forms
            .get(form_code)
            .filter(|m| !m.label.is_empty())
            .map(|m| m.label.clone())
            .unwrap_or_else(|| format!("Form {}", form_code))
    }

    pub fn resolution_spec(&self, form_code: &str) -> Option<&ResolutionSpec> {
        self.forms.get(form_code)?.resolve.as_ref()
    }

    /// Header/child classification derived from the link groups.
    pub fn role_of(&self, form_code: &str) -> Option<FormRole> {
        for group in &self.link_groups {
            if group.header == form_code {
                return Some(FormRole::Header);
            }
            if group.children.iter().any(|c| c == form_code) {
                return Some(FormRole::Child);
            }
        }
        None
    }

    pub fn link_groups(&self) -> &[LinkGroup] {
        &self.link_groups
    }

    pub fn has_form(&self, form_code: &str) -> bool {
        self.forms.contains_key(form_code)
    }

    pub fn form_count(&self) -> usize {
        self.forms.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

// 🧱 Block Assembler - Line stream → frozen Form trees
// Maintains the "current" form/section/entry context and folds field
// lines into it. All mutable parse state lives in this value and resets
// at each structural boundary; a finished form is immutable from the
// consumer's point of view.

use crate::diagnostics::{ParseWarning, Severity, WarningKind};
use crate::document::{Entry, Field, Form, ListBlock, ListReconciliation, ListRow, Section};
use crate::scanner::{LineKind, RawLine};

pub struct DocumentAssembler {
    forms: Vec<Form>,
    current_form: Option<Form>,
    current_entry: Option<Entry>,
    current_section: u32,
    open_list: Option<ListBlock>,
    warnings: Vec<ParseWarning>,
    unrecognized: usize,
}

/// Everything the assembler produced for one client: frozen forms plus
/// the anomalies met along the way.
pub struct AssemblyOutput {
    pub forms: Vec<Form>,
    pub warnings: Vec<ParseWarning>,
    pub unrecognized_lines: usize,
}

impl DocumentAssembler {
    pub fn new() -> Self {
        DocumentAssembler {
            forms: Vec::new(),
            current_form: None,
            current_entry: None,
            current_section: 1,
            open_list: None,
            warnings: Vec::new(),
            unrecognized: 0,
        }
    }

    pub fn feed(&mut self, line: &RawLine) {
        // Any non-row line while a list is pending means the scanner
        // broke the list early; close it short before handling the line.
        if self.open_list.is_some() && !matches!(line.kind, LineKind::ListRow { .. }) {
            self.close_list(true);
        }

        match &line.kind {
            LineKind::FormStart { code, label } => {
                self.close_form();
                log::debug!("form {} ({}) opened at line {}", code, label, line.number);
                self.current_form = Some(Form::new(code.clone(), label.clone()));
                self.current_section = 1;
            }
            LineKind::Section { index } => {
                self.close_entry();
                match self.current_form.as_mut() {
                    Some(form) => {
                        form.sections.push(Section::new(*index));
                        self.current_section = *index;
                    }
                    None => self.warn(
                        WarningKind::OrphanSection,
                        Severity::Warning,
                        line,
                        format!("section marker {} outside any form", index),
                    ),
                }
            }
            LineKind::Entry { ordinal } => {
                self.close_entry();
                if self.current_form.is_some() {
                    self.current_entry = Some(Entry::new(self.current_section, *ordinal));
                } else {
                    self.warn(
                        WarningKind::StrayLine,
                        Severity::Warning,
                        line,
                        format!("entry marker {} outside any form", ordinal),
                    );
                }
            }
            LineKind::Field { key, value } => {
                if self.current_form.is_none() {
                    self.warn(
                        WarningKind::StrayLine,
                        Severity::Warning,
                        line,
                        format!("field .{} outside any form", key),
                    );
                    return;
                }
                let number = line.number;
                let entry = self.ensure_entry();
                // Verbatim key: same exact key overwrites, a suffixed
                // variant never touches its base.
                entry
                    .fields
                    .insert(key.clone(), Field::new(key.clone(), value.clone(), number));
            }
            LineKind::ListHeader { key, count } => {
                if self.current_form.is_none() {
                    self.warn(
                        WarningKind::StrayLine,
                        Severity::Warning,
                        line,
                        format!("list header for .{} outside any form", key),
                    );
                    return;
                }
                self.ensure_entry();
                self.open_list = Some(ListBlock::new(key.clone(), *count, line.number));
            }
            LineKind::ListRow { label, amount } => match self.open_list.as_mut() {
                Some(block) => {
                    block.rows.push(ListRow {
                        label: label.clone(),
                        amount: *amount,
                    });
                    if block.rows.len() == block.declared_count {
                        self.close_list(false);
                    }
                }
                None => self.warn(
                    WarningKind::StrayLine,
                    Severity::Warning,
                    line,
                    "list row with no open list".to_string(),
                ),
            },
            LineKind::Terminator => {
                self.close_form();
            }
            LineKind::Other => {
                if !line.raw.trim().is_empty() {
                    self.unrecognized += 1;
                }
            }
        }
    }

    /// Close everything and hand over the frozen forms.
    pub fn finish(mut self) -> AssemblyOutput {
        self.close_form();
        AssemblyOutput {
            forms: self.forms,
            warnings: self.warnings,
            unrecognized_lines: self.unrecognized,
        }
    }

    /// Field lines are common in forms that never emit an entry marker;
    /// they still populate through an implicit single entry.
    fn ensure_entry(&mut self) -> &mut Entry {
        if self.current_entry.is_none() {
            self.current_entry = Some(Entry::new(self.current_section, 1));
        }
        self.current_entry.as_mut().unwrap()
    }

    fn close_list(&mut self, short: bool) {
        let Some(block) = self.open_list.take() else {
            return;
        };
        if short || !block.count_matches() {
            let form = self.form_code();
            self.warnings.push(
                ParseWarning::new(
                    WarningKind::ListCountMismatch,
                    Severity::Warning,
                    format!(
                        "list for .{} declared {} sub-records, got {}",
                        block.owner_key,
                        block.declared_count,
                        block.rows.len()
                    ),
                )
                .with_field(block.owner_key.clone())
                .with_line(block.line)
                .with_form(form),
            );
        }
        let entry = self.ensure_entry();
        entry.lists.push(block);
    }

    fn close_entry(&mut self) {
        self.close_list(true);
        let Some(entry) = self.current_entry.take() else {
            return;
        };
        self.check_list_sums(&entry);
        let section_index = entry.section;
        let Some(form) = self.current_form.as_mut() else {
            return;
        };
        // Entries belong to the section most recently opened. A repeated
        // section index stays a separate Section value in the tree; the
        // linker applies its own first-wins policy over duplicates.
        match form.sections.last_mut() {
            Some(section) if section.index == section_index => section.entries.push(entry),
            _ => {
                let mut section = Section::new(section_index);
                section.entries.push(entry);
                form.sections.push(section);
            }
        }
    }

    fn close_form(&mut self) {
        self.close_entry();
        if let Some(form) = self.current_form.take() {
            log::debug!(
                "form {} frozen with {} entries",
                form.code,
                form.entry_count()
            );
            self.forms.push(form);
        }
        self.current_section = 1;
    }

    /// Advisory only: a list whose rows do not sum to the parent field is
    /// surfaced, never corrected (source data legitimately diverges).
    fn check_list_sums(&mut self, entry: &Entry) {
        let form = self.form_code();
        for block in &entry.lists {
            let Some(parent) = entry.field(&block.owner_key) else {
                continue;
            };
            if let ListReconciliation::Divergent {
                total,
                expected,
                difference,
            } = block.reconcile(parent.as_amount())
            {
                self.warnings.push(
                    ParseWarning::new(
                        WarningKind::ListSumDivergence,
                        Severity::Info,
                        format!(
                            "list rows sum to {} but .{} holds {} (difference {})",
                            total, block.owner_key, expected, difference
                        ),
                    )
                    .with_field(block.owner_key.clone())
                    .with_line(block.line)
                    .with_form(form.clone()),
                );
            }
        }
    }

    fn form_code(&self) -> String {
        self.current_form
            .as_ref()
            .map(|f| f.code.clone())
            .unwrap_or_default()
    }

    fn warn(&mut self, kind: WarningKind, severity: Severity, line: &RawLine, message: String) {
        let form = self.form_code();
        let mut warning = ParseWarning::new(kind, severity, message).with_line(line.number);
        if !form.is_empty() {
            warning = warning.with_form(form);
        }
        self.warnings.push(warning);
    }
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::LineScanner;

    fn assemble(text: &str) -> AssemblyOutput {
        let mut assembler = DocumentAssembler::new();
        for line in LineScanner::new(text) {
            assembler.feed(&line);
        }
        assembler.finish()
    }

    #[test]
    fn test_implicit_entry_for_entryless_form() {
        let out = assemble("\\@101 \\ CLIENT INFO\n.40 JANE\n.42 DOE\n");
        assert_eq!(out.forms.len(), 1);
        let form = &out.forms[0];
        assert_eq!(form.entry_count(), 1);
        let entry = form.entries().next().unwrap();
        assert_eq!(entry.section, 1);
        assert_eq!(entry.ordinal, 1);
        assert_eq!(entry.get("40"), "JANE");
        assert_eq!(entry.get("42"), "DOE");
    }

    #[test]
    fn test_suffix_never_overwrites_base() {
        // Memo arrives first, base second - and the other way around.
        let out = assemble("\\@181 \\ INTEREST\n.71M 12500\n.71 76518\n.71 76519\n");
        let entry = out.forms[0].entries().next().unwrap();
        assert_eq!(entry.get("71M"), "12500");
        // Later occurrence of the same exact key overwrites.
        assert_eq!(entry.get("71"), "76519");
        assert_eq!(entry.fields.len(), 2);
    }

    #[test]
    fn test_sections_and_entries_nest() {
        let text = "\\@881 \\ CONSOLIDATED 1099\n\\:2\n\\&1\n.34 ACME BROKERAGE\n\\&2\n.34 OTHER DESK\n\\:3\n.34 THIRD\n";
        let out = assemble(text);
        let form = &out.forms[0];
        assert_eq!(form.sections.len(), 2);
        assert_eq!(form.section(2).unwrap().entries.len(), 2);
        assert_eq!(form.section(3).unwrap().entries.len(), 1);
        assert_eq!(form.section(2).unwrap().entries[1].ordinal, 2);
    }

    #[test]
    fn test_list_attaches_to_owning_entry() {
        let text = "\\@181 \\ INTEREST\n.71 76518\n.LIST 71 2\nFIRST NATIONAL 50000\nACME 26518\n";
        let out = assemble(text);
        let entry = out.forms[0].entries().next().unwrap();
        let lists = entry.lists_for("71");
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].rows.len(), 2);
        assert!(lists[0].count_matches());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_short_list_records_count_mismatch() {
        let text = "\\@181 \\ INTEREST\n.71 100\n.LIST 71 3\nONLY ROW 100\n\\&2\n.71 5\n";
        let out = assemble(text);
        let mismatches: Vec<_> = out
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::ListCountMismatch)
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].field.as_deref(), Some("71"));
        // The short list still attached with the row it got.
        let entry = &out.forms[0].sections[0].entries[0];
        assert_eq!(entry.lists_for("71")[0].rows.len(), 1);
    }

    #[test]
    fn test_list_sum_divergence_is_advisory() {
        let text = "\\@181 \\ INTEREST\n.71 76518\n.LIST 71 2\nA 50000\nB 20000\n";
        let out = assemble(text);
        let diverging: Vec<_> = out
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::ListSumDivergence)
            .collect();
        assert_eq!(diverging.len(), 1);
        assert_eq!(diverging[0].severity, Severity::Info);
        // Data untouched: rows and parent keep their source values.
        let entry = out.forms[0].entries().next().unwrap();
        assert_eq!(entry.get_amount("71"), 76518.0);
        assert_eq!(entry.lists_for("71")[0].total(), 70000.0);
    }

    #[test]
    fn test_terminator_freezes_form() {
        let out = assemble("\\@180 \\ WAGES\n.54 5000\n\\#\n.55 9\n");
        assert_eq!(out.forms.len(), 1);
        assert_eq!(out.forms[0].entries().next().unwrap().get("54"), "5000");
        // Field after the terminator has no form context.
        assert!(out
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::StrayLine));
    }

    #[test]
    fn test_unrecognized_lines_counted_not_fatal() {
        let out = assemble("\\@180 \\ WAGES\ngarbage here\n\n.54 5000\n");
        assert_eq!(out.unrecognized_lines, 1); // blank line not counted
        assert_eq!(out.forms[0].entries().next().unwrap().get("54"), "5000");
    }
}

//! Filename-based sorting of a task's documents into compliance sections.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use uuid::Uuid;

use crate::task::Category;

use super::types::Document;

/// Section a document was sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Primary,
    Supporting,
    Compliance,
    Other,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Supporting => "supporting",
            Self::Compliance => "compliance",
            Self::Other => "other",
        }
    }
}

/// Primary, supporting and compliance patterns, in matching priority order.
struct PatternSet {
    primary: Regex,
    supporting: Regex,
    compliance: Regex,
}

impl PatternSet {
    fn build(primary: &str, supporting: &str, compliance: &str) -> Result<Self, regex::Error> {
        let compile = |p: &str| RegexBuilder::new(p).case_insensitive(true).build();
        Ok(Self {
            primary: compile(primary)?,
            supporting: compile(supporting)?,
            compliance: compile(compliance)?,
        })
    }

    fn section_of(&self, file_name: &str) -> Section {
        if self.primary.is_match(file_name) {
            Section::Primary
        } else if self.supporting.is_match(file_name) {
            Section::Supporting
        } else if self.compliance.is_match(file_name) {
            Section::Compliance
        } else {
            Section::Other
        }
    }
}

/// Compact view of a document inside a section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionEntry {
    pub id: Uuid,
    pub file_name: String,
    pub media_type: String,
    pub uploaded_at: DateTime<Utc>,
    pub completion_percentage: Option<u8>,
}

impl From<&Document> for SectionEntry {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id,
            file_name: doc.file_name.clone(),
            media_type: doc.media_type.clone(),
            uploaded_at: doc.uploaded_at,
            completion_percentage: doc.analysis.as_ref().map(|a| a.completion_percentage),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentSections {
    pub primary: Vec<SectionEntry>,
    pub supporting: Vec<SectionEntry>,
    pub compliance: Vec<SectionEntry>,
    pub other: Vec<SectionEntry>,
}

impl DocumentSections {
    pub fn len(&self) -> usize {
        self.primary.len() + self.supporting.len() + self.compliance.len() + self.other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct DocumentClassifier {
    sets: HashMap<Category, PatternSet>,
}

impl DocumentClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let mut sets = HashMap::new();
        // No bare "gst" in primary: GST acknowledgments are compliance documents.
        sets.insert(
            Category::Gst,
            PatternSet::build(
                "gstr|return|form|filing",
                "invoice|receipt|bill|purchase|sales",
                "certificate|acknowledgment|challan",
            )?,
        );
        sets.insert(
            Category::It,
            PatternSet::build(
                "income|tax|return|itr|form",
                "salary|tds|form16|investment",
                "certificate|acknowledgment|receipt",
            )?,
        );
        sets.insert(
            Category::Tds,
            PatternSet::build(
                "tds|deduction|form26|quarterly",
                "salary|payment|vendor|contractor",
                "certificate|form16|challan",
            )?,
        );
        sets.insert(
            Category::Pf,
            PatternSet::build(
                "pf|provident|fund|ecr|monthly",
                "employee|salary|contribution",
                "certificate|acknowledgment|receipt",
            )?,
        );
        sets.insert(
            Category::Esi,
            PatternSet::build(
                "esi|insurance|monthly|return",
                "employee|salary|medical",
                "certificate|acknowledgment|receipt",
            )?,
        );
        sets.insert(
            Category::Roc,
            PatternSet::build(
                "roc|registrar|annual|return|form",
                "balance|sheet|audit|financial",
                "certificate|acknowledgment|filing",
            )?,
        );
        Ok(Self { sets })
    }

    fn patterns(&self, category: Category) -> Option<&PatternSet> {
        self.sets
            .get(&category)
            .or_else(|| self.sets.get(&Category::Gst))
    }

    /// Section for one file name. Categories without their own patterns use
    /// the GST set.
    pub fn section_of(&self, file_name: &str, category: Category) -> Section {
        self.patterns(category)
            .map_or(Section::Other, |set| set.section_of(file_name))
    }

    /// Partition `documents` by file name. Each document lands in exactly one
    /// section; input order is kept within a section.
    pub fn classify(&self, documents: &[Document], category: Category) -> DocumentSections {
        let mut sections = DocumentSections::default();
        for doc in documents {
            let entry = SectionEntry::from(doc);
            match self.section_of(&doc.file_name, category) {
                Section::Primary => sections.primary.push(entry),
                Section::Supporting => sections.supporting.push(entry),
                Section::Compliance => sections.compliance.push(entry),
                Section::Other => sections.other.push(entry),
            }
        }
        sections
    }
}

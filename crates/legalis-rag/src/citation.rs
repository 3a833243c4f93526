//! Canonical citation string formatting (§4.C).
//!
//! Structured fields the citation format needs beyond what
//! [`legalis_core::DocumentMetadata`] models directly (section number,
//! case parties, decision year, law report series) are read from the
//! metadata's `extra` bag — this formatter is the one place in the
//! pipeline allowed to look inside it, and only for these well-known,
//! optional keys.

use legalis_core::{DocumentMetadata, DocumentType};

fn extra_str<'a>(metadata: &'a DocumentMetadata, key: &str) -> Option<&'a str> {
    metadata.extra.get(key).and_then(|v| v.as_str())
}

/// Formats the canonical citation string for a document at 1-based
/// position `n`, falling back to `"Source {n}"` when no title is
/// available.
pub fn format_citation(metadata: &DocumentMetadata, n: usize) -> String {
    match metadata.document_type {
        DocumentType::Legislation => format_legislation(metadata, n),
        DocumentType::Judgment => format_judgment(metadata, n),
        _ => metadata
            .title
            .clone()
            .unwrap_or_else(|| fallback(n)),
    }
}

fn fallback(n: usize) -> String {
    format!("Source {n}")
}

fn format_legislation(metadata: &DocumentMetadata, n: usize) -> String {
    let Some(title) = metadata.title.as_deref() else {
        return fallback(n);
    };

    let mut result = match extra_str(metadata, "section") {
        Some(section) if !title.contains(section) => {
            format!("{title}, Section {section}")
        }
        _ => title.to_string(),
    };

    if let Some(chapter) = metadata.act_chapter.as_deref() {
        if !title.contains(chapter) {
            result = format!("{chapter} {result}");
        }
    }

    result
}

fn format_judgment(metadata: &DocumentMetadata, n: usize) -> String {
    let parties = extra_str(metadata, "parties");
    let year = extra_str(metadata, "year");
    let reporter = extra_str(metadata, "reporter");

    if let (Some(parties), Some(year), Some(reporter)) = (parties, year, reporter) {
        return format!("{parties} [{year}] {reporter}");
    }

    metadata
        .title
        .clone()
        .unwrap_or_else(|| fallback(n))
}

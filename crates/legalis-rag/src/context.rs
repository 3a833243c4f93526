//! Token-bounded context assembly and citation-aware prompt building
//! (§4.D).

use std::collections::BTreeMap;

use legalis_core::Document;

use crate::citation::format_citation;

/// Strategy for estimating the token cost of a block of text. Default is
/// `ceil(chars / 4)` (§4.D, §9 Open Question 1); a caller with a real
/// tokenizer for their model can supply one instead.
pub trait TokenEstimator: Send + Sync {
    fn estimate(&self, text: &str) -> usize;
}

/// The `ceil(chars/4)` default estimator.
pub struct CharDiv4Estimator;

impl TokenEstimator for CharDiv4Estimator {
    fn estimate(&self, text: &str) -> usize {
        text.chars().count().div_ceil(4)
    }
}

const SYSTEM_DIRECTIVE: &str = "Cite using bracketed integers matching the sources below; place the citation immediately after the supported statement; combine with [1][2] when multiple sources support a claim; never assert a fact not derivable from the sources; if insufficient, say so explicitly.";

/// The citation map built in lockstep with the context: 1-based, dense,
/// position `n` holds the canonical citation for the doc retained at
/// that position.
pub type CitationMap = BTreeMap<usize, String>;

/// Result of context assembly: the numbered context block (or plain
/// headings, when citations are disabled) and the citation map.
pub struct AssembledContext {
    pub context: String,
    pub citation_map: CitationMap,
}

/// Builds the numbered, token-bounded context for `docs` (assumed
/// already deduplicated and sorted by descending similarity) plus the
/// citation map built in lockstep.
///
/// On overflow, lowest-ranked sources are dropped first; the last
/// retained source is truncated at a sentence boundary. A partial
/// `[SOURCE n]` block is never emitted.
pub fn build_context(
    docs: &[Document],
    max_tokens: usize,
    use_citations: bool,
    estimator: &dyn TokenEstimator,
) -> AssembledContext {
    if docs.is_empty() {
        return AssembledContext {
            context: String::new(),
            citation_map: CitationMap::new(),
        };
    }

    let mut retained = docs.len();
    loop {
        let candidate = &docs[..retained];
        let full = render_blocks(candidate, use_citations, None);
        if estimator.estimate(&full) <= max_tokens || retained == 1 {
            break;
        }
        retained -= 1;
    }

    let candidate = &docs[..retained];
    let full = render_blocks(candidate, use_citations, None);
    let context = if estimator.estimate(&full) <= max_tokens {
        full
    } else {
        // The single retained source alone overflows; truncate its
        // content at a sentence boundary to fit.
        let overhead = render_blocks(candidate, use_citations, Some(""));
        let overhead_tokens = estimator.estimate(&overhead);
        let budget_chars = max_tokens.saturating_sub(overhead_tokens).saturating_mul(4);
        let truncated = truncate_at_sentence_boundary(&candidate[candidate.len() - 1].content, budget_chars);
        render_blocks(candidate, use_citations, Some(&truncated))
    };

    let mut citation_map = CitationMap::new();
    for (i, doc) in candidate.iter().enumerate() {
        let n = i + 1;
        citation_map.insert(n, format_citation(&doc.metadata, n));
    }

    AssembledContext { context, citation_map }
}

/// Renders `[SOURCE n]`/plain-heading blocks for `docs`. If
/// `override_last_content` is set, the last doc's content is replaced
/// with it (used once the truncation budget for the final block is
/// known).
fn render_blocks(docs: &[Document], use_citations: bool, override_last_content: Option<&str>) -> String {
    let mut out = String::new();
    for (i, doc) in docs.iter().enumerate() {
        let n = i + 1;
        let content: &str = if i == docs.len() - 1 {
            override_last_content.unwrap_or(&doc.content)
        } else {
            &doc.content
        };
        if use_citations {
            let citation = format_citation(&doc.metadata, n);
            out.push_str(&format!("[SOURCE {n}] {citation}\n"));
        } else {
            out.push_str(&format!("Source {n}\n"));
        }
        if let Some(url) = doc.metadata.url.as_deref() {
            out.push_str(&format!("URL: {url}\n"));
        }
        out.push_str(content);
        out.push('\n');
        out.push_str("---\n");
    }
    out
}

fn truncate_at_sentence_boundary(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    let truncated: String = content.chars().take(max_chars).collect();
    match truncated.rfind(['.', '!', '?']) {
        Some(idx) if idx > 0 => truncated[..=idx].to_string(),
        _ => truncated,
    }
}

/// Builds the final prompt: system directive (when citations are
/// enabled), the numbered context, and the question (with optional
/// extra caller-supplied context).
pub fn build_prompt(
    context: &str,
    question: &str,
    extra_context: &str,
    use_citations: bool,
) -> String {
    let mut prompt = String::new();
    if use_citations {
        prompt.push_str(SYSTEM_DIRECTIVE);
        prompt.push_str("\n\n");
    }
    if !context.is_empty() {
        prompt.push_str(context);
        prompt.push('\n');
    }
    prompt.push_str("Question: ");
    prompt.push_str(question);
    if !extra_context.is_empty() {
        prompt.push_str("\n\nAdditional context: ");
        prompt.push_str(extra_context);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use legalis_core::DocumentMetadata;

    fn doc(uuid: &str, title: &str, content: &str, sim: f64) -> Document {
        Document::new(uuid, content, DocumentMetadata::with_title(title), sim).unwrap()
    }

    #[test]
    fn citation_map_is_1_based_and_dense() {
        let docs = vec![doc("a", "Act A", "content a", 0.9), doc("b", "Act B", "content b", 0.8)];
        let result = build_context(&docs, 10_000, true, &CharDiv4Estimator);
        assert_eq!(result.citation_map.len(), 2);
        assert_eq!(result.citation_map.get(&1).unwrap(), "Act A");
        assert_eq!(result.citation_map.get(&2).unwrap(), "Act B");
        assert!(result.context.contains("[SOURCE 1]"));
        assert!(result.context.contains("[SOURCE 2]"));
    }

    #[test]
    fn drops_lowest_ranked_source_on_overflow() {
        let docs = vec![
            doc("a", "Act A", &"x".repeat(100), 0.9),
            doc("b", "Act B", &"y".repeat(100), 0.5),
        ];
        // Budget only large enough for roughly one source's worth.
        let result = build_context(&docs, 40, true, &CharDiv4Estimator);
        assert_eq!(result.citation_map.len(), 1);
        assert!(result.citation_map.contains_key(&1));
        assert!(!result.context.contains("[SOURCE 2]"));
    }

    #[test]
    fn never_emits_partial_source_block() {
        let docs = vec![doc("a", "Act A", &"word. ".repeat(200), 0.9)];
        let result = build_context(&docs, 20, true, &CharDiv4Estimator);
        assert!(result.context.starts_with("[SOURCE 1]"));
        assert!(result.context.trim_end().ends_with("---"));
    }

    #[test]
    fn empty_docs_produce_empty_context() {
        let result = build_context(&[], 1000, true, &CharDiv4Estimator);
        assert!(result.context.is_empty());
        assert!(result.citation_map.is_empty());
    }

    #[test]
    fn plain_prompt_omits_citation_directive() {
        let prompt = build_prompt("Source 1\nbody\n---\n", "What is X?", "", false);
        assert!(!prompt.contains("Cite using bracketed integers"));
        assert!(prompt.contains("Question: What is X?"));
    }

    #[test]
    fn citation_prompt_includes_directive() {
        let prompt = build_prompt("[SOURCE 1] Act\nbody\n---\n", "What is X?", "", true);
        assert!(prompt.contains("Cite using bracketed integers"));
    }
}

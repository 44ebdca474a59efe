//! Answer post-processing: context blocks, sentence splitting, citations.
//!
//! Citation tagging runs as a pipeline after the token stream completes:
//! split the full answer at sentence boundaries, then tie each sentence to
//! the evidence chunk with the highest token overlap. Sentences with no
//! chunk above the minimum overlap stay uncited rather than being forced
//! onto a weak match.

use crate::events::{SentenceCitation, SourceRef};
use std::collections::HashSet;
use tome_retrieval::RetrievedChunk;

/// Minimum fraction of sentence tokens that must appear in a chunk before
/// the sentence is attributed to it.
pub const MIN_CITATION_OVERLAP: f32 = 0.2;

/// Sentences shorter than this are skipped for citation purposes.
const MIN_SENTENCE_CHARS: usize = 20;

/// Format chunks into the numbered context block the generator is seeded
/// with.
pub fn build_context_block(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| format!("[Source {}] {}", i + 1, chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Split text into sentences at `.`, `!`, or `?` followed by whitespace.
///
/// Terminators stay attached to their sentence. Trailing text without a
/// terminator counts as a sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            let boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if boundary {
                let sentence = current.trim();
                if !sentence.is_empty() {
                    sentences.push(sentence.to_string());
                }
                current.clear();
            }
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

fn word_tokens(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_string())
        .collect()
}

/// Tie each answer sentence to its best-overlapping evidence chunk.
pub fn generate_citations(answer: &str, chunks: &[RetrievedChunk]) -> Vec<SentenceCitation> {
    if chunks.is_empty() {
        return Vec::new();
    }

    let chunk_tokens: Vec<HashSet<String>> =
        chunks.iter().map(|c| word_tokens(&c.text)).collect();

    let mut citations = Vec::new();
    for sentence in split_sentences(answer) {
        if sentence.len() < MIN_SENTENCE_CHARS {
            continue;
        }
        let tokens = word_tokens(&sentence);
        if tokens.is_empty() {
            continue;
        }

        let mut best: Option<(usize, f32)> = None;
        for (idx, candidate) in chunk_tokens.iter().enumerate() {
            let overlap = tokens.intersection(candidate).count() as f32 / tokens.len() as f32;
            if best.map_or(true, |(_, s)| overlap > s) {
                best = Some((idx, overlap));
            }
        }

        if let Some((idx, score)) = best {
            if score >= MIN_CITATION_OVERLAP {
                let chunk = &chunks[idx];
                citations.push(SentenceCitation {
                    sentence,
                    chunk_id: chunk.id.clone(),
                    source: chunk.source.clone(),
                    page: chunk.page,
                    score,
                });
            }
        }
    }
    citations
}

/// Deduplicate chunks into source references, first occurrence wins.
pub fn dedup_sources(chunks: &[RetrievedChunk]) -> Vec<SourceRef> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|c| seen.insert(c.id.clone()))
        .map(SourceRef::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: "doc.md".to_string(),
            page: Some(3),
            confidence: 0.8,
            final_score: None,
            rerank_score: None,
            document_id: "doc".to_string(),
        }
    }

    #[test]
    fn test_split_sentences_basic() {
        let sentences = split_sentences("First point. Second point! Is there a third? Yes");
        assert_eq!(
            sentences,
            vec!["First point.", "Second point!", "Is there a third?", "Yes"]
        );
    }

    #[test]
    fn test_split_sentences_keeps_decimals_together() {
        let sentences = split_sentences("Accuracy reached 92.5 percent. Latency dropped.");
        assert_eq!(
            sentences,
            vec!["Accuracy reached 92.5 percent.", "Latency dropped."]
        );
    }

    #[test]
    fn test_split_sentences_empty() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("   ").is_empty());
    }

    #[test]
    fn test_context_block_numbering() {
        let chunks = vec![chunk("c1", "alpha text"), chunk("c2", "beta text")];
        let block = build_context_block(&chunks);
        assert!(block.starts_with("[Source 1] alpha text"));
        assert!(block.contains("[Source 2] beta text"));
    }

    #[test]
    fn test_citations_pick_best_overlap() {
        let chunks = vec![
            chunk("c-train", "the model was trained for twelve epochs on eight gpus"),
            chunk("c-arch", "the architecture stacks six attention layers with residuals"),
        ];
        let answer = "The model was trained for twelve epochs. \
                      The architecture uses six attention layers.";

        let citations = generate_citations(answer, &chunks);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].chunk_id, "c-train");
        assert_eq!(citations[1].chunk_id, "c-arch");
        assert!(citations.iter().all(|c| c.score >= MIN_CITATION_OVERLAP));
        assert_eq!(citations[0].page, Some(3));
    }

    #[test]
    fn test_citations_skip_unsupported_sentences() {
        let chunks = vec![chunk("c1", "quarterly revenue grew by four percent")];
        let answer = "Quarterly revenue grew by four percent. \
                      Penguins live in the southern hemisphere somewhere.";

        let citations = generate_citations(answer, &chunks);
        assert_eq!(citations.len(), 1);
        assert!(citations[0].sentence.contains("revenue"));
    }

    #[test]
    fn test_citations_empty_without_chunks() {
        assert!(generate_citations("Any answer at all here.", &[]).is_empty());
    }

    #[test]
    fn test_dedup_sources_first_wins() {
        let chunks = vec![chunk("c1", "one"), chunk("c1", "one again"), chunk("c2", "two")];
        let sources = dedup_sources(&chunks);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].id, "c1");
        assert_eq!(sources[0].text, "one");
        assert_eq!(sources[1].id, "c2");
    }
}

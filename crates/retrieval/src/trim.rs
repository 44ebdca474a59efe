//! Context budgeting: fit retrieved chunks and conversation history into
//! character budgets before they reach the model.

use crate::types::RetrievedChunk;

/// Trim chunks to a character budget, best scores first.
///
/// Chunks are walked in descending ranking-score order. Admission stops at
/// the first chunk that would blow the budget, or whose score drops more
/// than `score_drop_delta` below the previously admitted chunk's score, so
/// a gradual decline is kept while a cliff cuts off. Returns the kept
/// chunks and the distinct sources they came from, in admission order.
pub fn trim_chunks(
    chunks: &[RetrievedChunk],
    max_chars: usize,
    score_drop_delta: f32,
) -> (Vec<RetrievedChunk>, Vec<String>) {
    let mut ordered: Vec<&RetrievedChunk> = chunks.iter().collect();
    ordered.sort_by(|a, b| {
        b.ranking_score()
            .partial_cmp(&a.ranking_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept = Vec::new();
    let mut sources: Vec<String> = Vec::new();
    let mut used_chars = 0usize;
    let mut last_score: Option<f32> = None;

    for chunk in ordered {
        if used_chars + chunk.text.len() > max_chars {
            break;
        }
        let score = chunk.ranking_score();
        if let Some(last) = last_score {
            if last - score > score_drop_delta {
                break;
            }
        }
        last_score = Some(score);

        used_chars += chunk.text.len();
        if !sources.contains(&chunk.source) {
            sources.push(chunk.source.clone());
        }
        kept.push(chunk.clone());
    }

    (kept, sources)
}

/// Trim message texts to a character budget, keeping the newest.
///
/// Input is chronological; retention is decided newest-first but the kept
/// messages come back in their original chronological order.
pub fn trim_messages(messages: &[String], max_chars: usize) -> Vec<String> {
    let mut kept_rev = Vec::new();
    let mut used_chars = 0usize;

    for message in messages.iter().rev() {
        if used_chars + message.len() > max_chars {
            break;
        }
        used_chars += message.len();
        kept_rev.push(message.clone());
    }

    kept_rev.reverse();
    kept_rev
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, source: &str, text: &str, score: f32) -> RetrievedChunk {
        RetrievedChunk {
            id: id.to_string(),
            text: text.to_string(),
            source: source.to_string(),
            page: None,
            confidence: score,
            final_score: Some(score),
            rerank_score: None,
            document_id: "doc".to_string(),
        }
    }

    #[test]
    fn test_trim_chunks_orders_by_score() {
        let chunks = vec![
            chunk("c1", "a.md", "low relevance text", 0.5),
            chunk("c2", "b.md", "high relevance text", 0.9),
        ];

        let (kept, sources) = trim_chunks(&chunks, 1000, 0.5);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].id, "c2");
        assert_eq!(sources, vec!["b.md", "a.md"]);
    }

    #[test]
    fn test_trim_chunks_stops_at_budget() {
        let chunks = vec![
            chunk("c1", "a.md", &"x".repeat(40), 0.9),
            chunk("c2", "a.md", &"y".repeat(40), 0.8),
        ];

        let (kept, sources) = trim_chunks(&chunks, 50, 1.0);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "c1");
        assert_eq!(sources, vec!["a.md"]);
    }

    #[test]
    fn test_trim_chunks_stops_on_score_drop() {
        let chunks = vec![
            chunk("c1", "a.md", "strong", 0.9),
            chunk("c2", "a.md", "close", 0.8),
            chunk("c3", "a.md", "weak", 0.3),
        ];

        let (kept, _) = trim_chunks(&chunks, 1000, 0.4);
        assert_eq!(kept.len(), 2);
        assert!(kept.iter().all(|c| c.id != "c3"));
    }

    #[test]
    fn test_trim_chunks_keeps_gradual_decline() {
        // Each step is within delta of the chunk before it, so no single
        // drop triggers the cutoff even though first-to-last exceeds it
        let chunks = vec![
            chunk("c1", "a.md", "strong", 0.9),
            chunk("c2", "a.md", "middling", 0.6),
            chunk("c3", "a.md", "weaker", 0.4),
        ];

        let (kept, _) = trim_chunks(&chunks, 1000, 0.4);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_trim_chunks_dedups_sources() {
        let chunks = vec![
            chunk("c1", "a.md", "one", 0.9),
            chunk("c2", "a.md", "two", 0.85),
        ];
        let (_, sources) = trim_chunks(&chunks, 1000, 0.4);
        assert_eq!(sources, vec!["a.md"]);
    }

    #[test]
    fn test_trim_messages_keeps_newest_in_order() {
        let messages = vec![
            "oldest message".to_string(),
            "middle".to_string(),
            "newest".to_string(),
        ];

        let trimmed = trim_messages(&messages, 12);
        assert_eq!(trimmed, vec!["middle", "newest"]);
    }

    #[test]
    fn test_trim_messages_empty_budget() {
        let messages = vec!["hello".to_string()];
        assert!(trim_messages(&messages, 3).is_empty());
    }
}

//! Okapi BM25 lexical index over one store's chunk corpus.
//!
//! Scores are aligned to corpus order: `scores(tokens)[i]` is the score of
//! the chunk at corpus position `i`. The store manager caches one index per
//! document and rebuilds it when the chunk count changes.

use std::collections::HashMap;

const K1: f32 = 1.2;
const B: f32 = 0.75;

/// BM25 index over a fixed corpus of chunk texts.
#[derive(Debug)]
pub struct Bm25Index {
    /// Tokenized documents, corpus order
    docs: Vec<Vec<String>>,
    /// Document frequency per term
    doc_freq: HashMap<String, usize>,
    /// Average document length in tokens
    avg_len: f32,
}

impl Bm25Index {
    /// Build an index from chunk texts in corpus order.
    pub fn build(texts: &[String]) -> Self {
        let docs: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;

        for tokens in &docs {
            total_len += tokens.len();
            let mut seen = std::collections::HashSet::new();
            for token in tokens {
                if seen.insert(token.as_str()) {
                    *doc_freq.entry(token.clone()).or_insert(0) += 1;
                }
            }
        }

        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f32 / docs.len() as f32
        };

        Self {
            docs,
            doc_freq,
            avg_len,
        }
    }

    /// Number of documents in the corpus.
    pub fn corpus_size(&self) -> usize {
        self.docs.len()
    }

    /// BM25 scores for the query tokens, aligned to corpus order.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f32> {
        let total_docs = self.docs.len().max(1) as f32;

        self.docs
            .iter()
            .map(|doc_tokens| {
                if doc_tokens.is_empty() {
                    return 0.0;
                }

                let dl = doc_tokens.len() as f32;
                let mut score = 0.0;

                for token in query_tokens {
                    let freq = term_frequency(doc_tokens, token);
                    if freq <= 0.0 {
                        continue;
                    }
                    let df = *self.doc_freq.get(token).unwrap_or(&0) as f32;
                    let idf = bm25_idf(total_docs, df);
                    let denom = freq + K1 * (1.0 - B + B * dl / self.avg_len.max(1e-3));
                    if denom > 0.0 {
                        score += idf * (freq * (K1 + 1.0)) / denom;
                    }
                }

                score
            })
            .collect()
    }
}

/// Tokenize a query the same way corpus texts are tokenized.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| part.len() > 1)
        .map(|part| part.to_lowercase())
        .collect()
}

fn term_frequency(doc_tokens: &[String], needle: &str) -> f32 {
    doc_tokens
        .iter()
        .filter(|token| token.as_str() == needle)
        .count() as f32
}

fn bm25_idf(total_docs: f32, df: f32) -> f32 {
    ((total_docs - df + 0.5) / (df + 0.5) + 1.0).ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<String> {
        vec![
            "the transformer architecture uses attention".to_string(),
            "attention weights are computed per head".to_string(),
            "cooking pasta requires boiling water".to_string(),
        ]
    }

    #[test]
    fn test_scores_aligned_to_corpus_order() {
        let index = Bm25Index::build(&corpus());
        let scores = index.scores(&tokenize("attention"));

        assert_eq!(scores.len(), 3);
        assert!(scores[0] > 0.0);
        assert!(scores[1] > 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn test_rare_terms_score_higher() {
        let index = Bm25Index::build(&corpus());
        let pasta = index.scores(&tokenize("pasta"));
        let attention = index.scores(&tokenize("attention"));

        // "pasta" appears in one doc, "attention" in two; idf favors rarity
        assert!(pasta[2] > attention[0]);
    }

    #[test]
    fn test_empty_corpus() {
        let index = Bm25Index::build(&[]);
        assert_eq!(index.corpus_size(), 0);
        assert!(index.scores(&tokenize("anything")).is_empty());
    }

    #[test]
    fn test_unknown_term_scores_zero() {
        let index = Bm25Index::build(&corpus());
        let scores = index.scores(&tokenize("nonexistent"));
        assert!(scores.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_tokenize_drops_punctuation_and_case() {
        assert_eq!(
            tokenize("What's the Transformer?"),
            vec!["what", "the", "transformer"]
        );
    }
}

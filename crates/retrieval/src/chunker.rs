//! Splits document text into chunks for ingestion.
//!
//! Paragraph-first: blank-line-separated paragraphs are packed into chunks
//! up to a character budget, and oversized paragraphs are split at word
//! boundaries.

const DEFAULT_CHUNK_CHARS: usize = 1200;

/// Split text into ingestion chunks with the default budget.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with_budget(text, DEFAULT_CHUNK_CHARS)
}

/// Split text into chunks of at most `max_chars` characters each.
pub fn chunk_text_with_budget(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        for piece in split_oversized(paragraph, max_chars) {
            if current.is_empty() {
                current = piece;
            } else if current.len() + piece.len() + 2 <= max_chars {
                current.push_str("\n\n");
                current.push_str(&piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break a paragraph that exceeds the budget at word boundaries.
fn split_oversized(paragraph: &str, max_chars: usize) -> Vec<String> {
    if paragraph.len() <= max_chars {
        return vec![paragraph.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > max_chars {
            pieces.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let chunks = chunk_text("A single short paragraph.");
        assert_eq!(chunks, vec!["A single short paragraph."]);
    }

    #[test]
    fn test_paragraphs_pack_until_budget() {
        let text = "first paragraph\n\nsecond paragraph\n\nthird paragraph";
        let chunks = chunk_text_with_budget(text, 36);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "first paragraph\n\nsecond paragraph");
        assert_eq!(chunks[1], "third paragraph");
    }

    #[test]
    fn test_oversized_paragraph_splits_on_words() {
        let text = "alpha beta gamma delta epsilon zeta";
        let chunks = chunk_text_with_budget(text, 12);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 12));
        let rejoined = chunks.join(" ");
        assert_eq!(rejoined, text);
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("\n\n  \n\n").is_empty());
    }
}

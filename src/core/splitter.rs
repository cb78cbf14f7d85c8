//! Incremental sentence splitting
//!
//! The LLM producer accumulates streamed fragments in a buffer and calls
//! [`split_sentences`] after every fragment. Extracted sentences go to the
//! synthesizer immediately; the remainder is carried into the next call.

/// Characters that terminate a sentence.
pub const SENTENCE_TERMINATORS: [char; 6] = ['.', '!', '?', ':', ';', '\n'];

/// Trimmed candidates shorter than this are dropped as fragments.
pub const MIN_SENTENCE_CHARS: usize = 4;

/// Extract complete sentences from `buffer`.
///
/// Returns the extracted sentences and the unconsumed remainder. The
/// boundary includes the terminator plus one following space when present.
/// Re-entrant over a growing buffer: concatenating all historical outputs
/// plus the final remainder reconstructs the stream modulo trimmed
/// whitespace.
pub fn split_sentences(buffer: &str) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut rest = buffer;

    while let Some(idx) = rest.find(SENTENCE_TERMINATORS) {
        // Terminators are all ASCII, so idx + 1 stays on a char boundary
        let mut end = idx + 1;
        if rest[end..].starts_with(' ') {
            end += 1;
        }

        let candidate = rest[..end].trim();
        if candidate.chars().count() >= MIN_SENTENCE_CHARS {
            sentences.push(candidate.to_string());
        }
        rest = &rest[end..];
    }

    (sentences, rest.to_string())
}

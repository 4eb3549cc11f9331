//! Sentence parsing and word-level editing (specification §4.5): a file
//! body is split into [`SentenceNode`]s at `.`/`?`/`!` delimiters, each
//! carrying the whitespace run that followed its delimiter, so that
//! concatenating every node's `text` and `trailing_ws` in order reproduces
//! the exact original bytes.

use crate::error::{Result, ScriptoriumError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceNode {
    pub text: String,
    pub trailing_ws: String,
    pub locked_by: Option<String>,
    pub is_locked: bool,
}

impl SentenceNode {
    pub fn new(text: String, trailing_ws: String) -> Self {
        Self { text, trailing_ws, locked_by: None, is_locked: false }
    }

    pub fn words(&self) -> Vec<&str> {
        self.text.split_whitespace().collect()
    }

    /// Replaces the word at `word_idx` (0-based, split on whitespace). The
    /// rejoin uses single spaces between words — multiple interior spaces in
    /// the original sentence are not preserved, only the sentence's trailing
    /// whitespace and delimiter are exact.
    pub fn set_word(&mut self, word_idx: usize, word: &str) -> Result<()> {
        let mut words: Vec<String> = self.text.split_whitespace().map(str::to_string).collect();
        if word_idx >= words.len() {
            return Err(ScriptoriumError::InvalidWord);
        }
        words[word_idx] = word.to_string();
        self.text = words.join(" ");
        Ok(())
    }
}

/// Splits `body` into sentence nodes at `.`/`?`/`!`. An empty body yields no
/// nodes; a body with no terminating punctuation at all yields exactly one
/// node holding the whole thing with an empty `trailing_ws`.
pub fn parse_sentences(body: &str) -> Vec<SentenceNode> {
    if body.is_empty() {
        return Vec::new();
    }

    let mut nodes = Vec::new();
    let mut start = 0usize;
    let mut iter = body.char_indices().peekable();

    while let Some((idx, ch)) = iter.next() {
        if matches!(ch, '.' | '?' | '!') {
            let delim_end = idx + ch.len_utf8();
            let mut ws_end = delim_end;
            while let Some(&(widx, wch)) = iter.peek() {
                if wch.is_whitespace() {
                    ws_end = widx + wch.len_utf8();
                    iter.next();
                } else {
                    break;
                }
            }
            nodes.push(SentenceNode::new(body[start..delim_end].to_string(), body[delim_end..ws_end].to_string()));
            start = ws_end;
        }
    }

    if start < body.len() {
        nodes.push(SentenceNode::new(body[start..].to_string(), String::new()));
    }

    nodes
}

/// Reconstructs the original body from a node list. `parse_sentences` and
/// `reconstruct` are exact inverses (specification §4.5's round-trip
/// invariant).
pub fn reconstruct(nodes: &[SentenceNode]) -> String {
    let mut out = String::new();
    for node in nodes {
        out.push_str(&node.text);
        out.push_str(&node.trailing_ws);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_has_no_sentences() {
        assert!(parse_sentences("").is_empty());
    }

    #[test]
    fn unterminated_trailing_text_becomes_its_own_sentence() {
        let nodes = parse_sentences("Hello world");
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].text, "Hello world");
        assert_eq!(nodes[0].trailing_ws, "");
    }

    #[test]
    fn multiple_sentences_round_trip_exactly() {
        let body = "First one. Second one!  Third?\nNo end here";
        let nodes = parse_sentences(body);
        assert_eq!(reconstruct(&nodes), body);
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].text, "First one.");
        assert_eq!(nodes[0].trailing_ws, " ");
        assert_eq!(nodes[2].trailing_ws, "\n");
    }

    #[test]
    fn set_word_replaces_and_preserves_delimiter() {
        let mut nodes = parse_sentences("The quick fox jumps.");
        nodes[0].set_word(1, "slow").unwrap();
        assert_eq!(nodes[0].text, "The slow fox jumps.");
    }

    #[test]
    fn set_word_out_of_range_is_rejected() {
        let mut nodes = parse_sentences("Short.");
        assert_eq!(nodes[0].set_word(5, "x"), Err(ScriptoriumError::InvalidWord));
    }
}

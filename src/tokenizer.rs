/// Turns raw text into a sequence of normalized tokens.
///
/// The index core never inspects tokens beyond string equality, so any
/// normalization or n-gram policy can be plugged in behind this trait.
pub trait Tokenizer {
    fn tokenize(&self, text: &str) -> Vec<String>;
}

/// Uncased unigram tokenizer: lowercases and splits on any run of
/// non-alphanumeric characters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
    fn tokenize(&self, text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(|t| t.to_lowercase())
            .collect()
    }
}

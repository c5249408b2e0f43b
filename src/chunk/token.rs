//! Token cost functions used to bound chunk sizes.
use anyhow::Result;

/// Maps a text to its token cost. Must be deterministic so that chunk
/// boundaries are reproducible.
pub trait TokenCounter {
    fn count(&self, text: &str) -> Result<usize>;
}

/// Approximates the cost as one token per four bytes of text.
#[derive(Copy, Clone, Debug, Default)]
pub struct EstimateCounter;

impl TokenCounter for EstimateCounter {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(text.len().div_ceil(4))
    }
}

/// Adapts a plain function or closure into a counter.
pub struct FnCounter<F>(pub F);

impl<F> TokenCounter for FnCounter<F>
where
    F: Fn(&str) -> Result<usize>,
{
    fn count(&self, text: &str) -> Result<usize> {
        (self.0)(text)
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for &T {
    fn count(&self, text: &str) -> Result<usize> {
        (**self).count(text)
    }
}

impl<T: TokenCounter + ?Sized> TokenCounter for Box<T> {
    fn count(&self, text: &str) -> Result<usize> {
        (**self).count(text)
    }
}

/// Counts `cl100k_base` BPE tokens.
#[cfg(feature = "tiktoken")]
pub struct Cl100kCounter(tiktoken_rs::CoreBPE);

#[cfg(feature = "tiktoken")]
impl Cl100kCounter {
    pub fn new() -> Result<Self> {
        Ok(Cl100kCounter(tiktoken_rs::cl100k_base()?))
    }
}

#[cfg(feature = "tiktoken")]
impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> Result<usize> {
        Ok(self.0.encode_with_special_tokens(text).len())
    }
}

/// The counter used when none is chosen explicitly: `cl100k_base` tokens,
/// or the byte estimate when built without the `tiktoken` feature.
pub fn default_counter() -> Result<Box<dyn TokenCounter>> {
    #[cfg(feature = "tiktoken")]
    {
        Ok(Box::new(Cl100kCounter::new()?))
    }
    #[cfg(not(feature = "tiktoken"))]
    {
        Ok(Box::new(EstimateCounter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_rounds_up() {
        assert_eq!(EstimateCounter.count("").unwrap(), 0);
        assert_eq!(EstimateCounter.count("abc").unwrap(), 1);
        assert_eq!(EstimateCounter.count("abcde").unwrap(), 2);
    }

    #[test]
    fn closures_are_counters() {
        let counter = FnCounter(|text: &str| -> Result<usize> { Ok(text.chars().count()) });
        assert_eq!(counter.count("héllo").unwrap(), 5);
        let boxed: Box<dyn TokenCounter> = Box::new(counter);
        assert_eq!(boxed.count("ab").unwrap(), 2);
    }

    #[cfg(feature = "tiktoken")]
    #[test]
    fn default_counter_counts_bpe_tokens() {
        let counter = default_counter().unwrap();
        assert_eq!(counter.count("hello world").unwrap(), 2);
    }
}

use std::path::Path;
use tokenizers::tokenizer::Tokenizer;
use tracing::{info, warn};

const TOKENS_PER_MESSAGE: usize = 3;
const TOKENS_PER_NAME: usize = 1;
const REPLY_PRIMING_TOKENS: usize = 3;

/// Counts tokens for observability. Uses a HuggingFace tokenizer when one is configured and
/// otherwise approximates one token per four characters.
#[derive(Default)]
pub struct TokenCounter {
    tokenizer: Option<Tokenizer>,
}

impl TokenCounter {
    /// A counter using the approximation only
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `tokenizer.json`. A missing or unreadable file falls back to the approximation.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Tokenizer::from_file(path) {
            Ok(tokenizer) => {
                info!(path = %path.display(), "Loaded tokenizer");
                Self {
                    tokenizer: Some(tokenizer),
                }
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    "Failed to load tokenizer, approximating token counts: {}",
                    e
                );
                Self::new()
            }
        }
    }

    pub fn from_settings(tokenizer_path: Option<&str>) -> Self {
        match tokenizer_path {
            Some(path) => Self::from_file(shellexpand::tilde(path).as_ref()),
            None => Self::new(),
        }
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        if let Some(tokenizer) = &self.tokenizer {
            match tokenizer.encode(text, false) {
                Ok(encoding) => return encoding.len(),
                Err(e) => warn!("Tokenizer failed, approximating token count: {}", e),
            }
        }
        text.chars().count().div_ceil(4)
    }

    /// Tokens one chat message costs, including the framing the chat format adds around it
    pub fn count_message_tokens(&self, text: &str) -> usize {
        let mut total = TOKENS_PER_MESSAGE;
        if text.is_empty() {
            warn!("Empty message, no tokens counted");
        } else {
            total += self.count_tokens(text);
        }
        total + TOKENS_PER_NAME + REPLY_PRIMING_TOKENS
    }
}

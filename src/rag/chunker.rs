//! Token-window chunking.
//!
//! Page text is split into non-overlapping windows of at most `max_tokens`
//! tokens, counted with the embedding model's own BPE. Each window is
//! decoded back to text. Chunks never cross a page: callers chunk one page
//! at a time and tag the results with that page's number.

use crate::types::{AppError, Result};
use std::sync::Arc;
use tiktoken_rs::CoreBPE;

/// Model-specific token codec.
///
/// Two texts with the same token sequence must chunk identically, so
/// implementations must be deterministic.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a token window. Windows may split a multi-byte character, in
    /// which case the partial bytes are replaced with U+FFFD.
    fn decode(&self, tokens: &[u32]) -> String;

    /// Encoding name, for logs.
    fn name(&self) -> &str;
}

/// BPE tokenizer from `tiktoken-rs`.
pub struct TiktokenTokenizer {
    bpe: CoreBPE,
    name: String,
}

impl TiktokenTokenizer {
    /// Tokenizer used by an OpenAI model, e.g. `text-embedding-3-small`.
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            AppError::Configuration(format!(
                "no tokenizer known for model '{}': {} (set rag.tokenizer_encoding)",
                model, e
            ))
        })?;
        Ok(Self {
            bpe,
            name: model.to_string(),
        })
    }

    /// Tokenizer for a named encoding such as `cl100k_base`.
    pub fn for_encoding(encoding: &str) -> Result<Self> {
        let bpe = match encoding {
            "cl100k_base" => tiktoken_rs::cl100k_base(),
            "o200k_base" => tiktoken_rs::o200k_base(),
            "p50k_base" => tiktoken_rs::p50k_base(),
            "p50k_edit" => tiktoken_rs::p50k_edit(),
            "r50k_base" => tiktoken_rs::r50k_base(),
            other => {
                return Err(AppError::Configuration(format!(
                    "unknown tokenizer encoding '{}'",
                    other
                )))
            }
        }
        .map_err(|e| AppError::Configuration(format!("failed to load '{}': {}", encoding, e)))?;

        Ok(Self {
            bpe,
            name: encoding.to_string(),
        })
    }

    /// Pick the explicit encoding when one is configured, else the model's.
    pub fn from_settings(model: &str, encoding: Option<&str>) -> Result<Self> {
        match encoding {
            Some(encoding) => Self::for_encoding(encoding),
            None => Self::for_model(model),
        }
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> String {
        let bytes: Vec<u8> = self
            .bpe
            ._decode_native_and_split(tokens.to_vec())
            .flatten()
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Splits text into bounded token windows.
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

impl TokenChunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Result<Self> {
        if max_tokens == 0 {
            return Err(AppError::Configuration(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            tokenizer,
            max_tokens,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Contiguous token windows covering `text` exactly once, in order.
    pub fn chunk_tokens(&self, text: &str) -> Vec<Vec<u32>> {
        self.tokenizer
            .encode(text)
            .chunks(self.max_tokens)
            .map(<[u32]>::to_vec)
            .collect()
    }

    /// Decoded windows; empty text yields no chunks.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(self.tokenizer.as_ref(), text, self.max_tokens)
    }
}

/// Split `text` into windows of at most `max_tokens` tokens and decode each.
///
/// `max_tokens` of zero yields no chunks.
pub fn chunk_text(tokenizer: &dyn Tokenizer, text: &str, max_tokens: usize) -> Vec<String> {
    if text.is_empty() || max_tokens == 0 {
        return Vec::new();
    }

    tokenizer
        .encode(text)
        .chunks(max_tokens)
        .map(|window| tokenizer.decode(window))
        .collect()
}

//! netdiag LLM
//!
//! LLM access for the diagnosis engine:
//! - `OpenAICompatibleProvider` for OpenAI, DeepSeek, Qwen (compatible mode) and Ollama
//! - `LlmFaultClassifier`, a `StructuredClassifier` that asks a model to
//!   classify intent and extract the fault context
//!
//! Also includes the HTTP client factory.

pub mod classifier;
pub mod http_client;
pub mod openai;
pub mod provider;
pub mod types;

// Re-export main types
pub use classifier::LlmFaultClassifier;
pub use http_client::build_http_client;
pub use openai::OpenAICompatibleProvider;
pub use provider::LlmProvider;
pub use types::*;

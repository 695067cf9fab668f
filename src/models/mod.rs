//! Wire-schema shapes for the Anthropic Messages API and the two OpenAI-compatible
//! upstream flavors (Chat Completions and Responses). These types exist only for the
//! duration of a single in-flight request; nothing here is persisted.

pub mod anthropic;
pub mod openai;

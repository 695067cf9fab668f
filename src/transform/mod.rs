//! Request/response translation between the Anthropic Messages wire format and
//! the two OpenAI-compatible flavors this proxy speaks (C2/C3 in the design).

pub mod chat;
pub mod common;
pub mod responses;

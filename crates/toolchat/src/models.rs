//! These models represent the objects passed around by the agent
//!
//! The same conversation is seen in two shapes:
//! - the internal structs below, which the orchestrator appends to and front ends print
//! - the openai chat completion wire format, produced by `providers::utils`
//!
//! We always convert at the provider boundary so the rest of the crate never handles raw json
//! messages.
pub mod message;
pub mod role;
pub mod tool;

//! Reference adapters for the negotiation workflow's collaborators.
//!
//! - `llm` - HTTP chat-completion client for OpenAI, Anthropic and Ollama
//! - `reasoning` - the reasoning port on top of any `LlmClient`
//! - `directory` - business lookup and geocoding from a JSON catalog file
//! - `contact` - simulated telephony with scripted vendor behaviour
//!
//! The LLM never decides an outcome on its own. Every caller in the core owns
//! a deterministic fallback for when these adapters fail.

pub mod contact;
pub mod directory;
pub mod llm;
pub mod reasoning;

pub use contact::SimulatedContactService;
pub use directory::{Catalog, CatalogDirectory};
pub use llm::{HttpLlmClient, LlmClient};
pub use reasoning::LlmReasoningService;

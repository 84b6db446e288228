//! Chat turns
//!
//! Conversation state, the system prompt context, the per-turn display model
//! and the orchestrator that ties providers and tools together.

pub mod context;
pub mod display;
pub mod metrics;
pub mod orchestrator;
pub mod state;

pub use context::RequestContext;
pub use display::{DisplayEvent, DisplayPart, ToolCard, TurnDisplay};
pub use orchestrator::{
    Orchestrator, SubmitRequest, TurnFailure, TurnOutcome, TurnResult, TurnStatus,
};
pub use state::{ChatMessage, ChatState, Role};

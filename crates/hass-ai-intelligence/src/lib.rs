//! Entity importance scanning for HASS AI
//!
//! Entities are scored in batches by a conversation agent:
//!
//! - [`PromptBuilder`] renders a batch into a prompt (full or compact, EN/IT)
//! - [`ConversationClient`] sends it, paced, one call at a time
//! - [`parse_response`] turns the reply into per-entity results
//! - [`fallback::classify`] scores anything the agent could not
//! - [`BatchController`] ties these together and recovers from token limits
//!
//! [`Scanner`] selects entities from the host, runs the controller and
//! persists the results.

pub mod ai_log;
pub mod batch;
pub mod conversation;
pub mod correlations;
pub mod error;
pub mod events;
pub mod fallback;
pub mod parser;
pub mod prompt;
pub mod scan;

pub use ai_log::{AiLogEntry, AiLogger, LogKind, RECENT_LIMIT};
pub use batch::{
    fallback_all, BatchController, BatchPhase, ScanOutcome, ScanStatus, MAX_RETRIES,
    MIN_BATCH_SIZE, SHRINK_FACTOR,
};
pub use conversation::ConversationClient;
pub use correlations::{Correlation, CorrelationError, CorrelationFinder, CorrelationsData};
pub use error::{ItemRejection, ParseFailure, PromptError, ScanError, ScanResult};
pub use events::{EventSink, ScanEvent};
pub use parser::{mentions_token_limit, parse_response, ItemVerdict};
pub use prompt::{estimate_tokens, PromptBuilder};
pub use scan::{ScanRequest, Scanner, EXCLUDED_DOMAINS};

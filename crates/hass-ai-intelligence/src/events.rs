//! Progress events emitted while a scan runs
//!
//! Events are observational only: dropping them never changes the outcome.

use hass_ai_core::{Language, ScoreResult};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::batch::ScanStatus;

/// One progress notification, serialized as `{"type": ..., "data"|"result": ...}`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    EntityResult { result: ScoreResult },
    ScanProgress { data: ProgressMessage },
    BatchInfo { data: BatchInfo },
    TokenLimitExceeded { data: TokenLimitInfo },
    BatchSizeReduced { data: BatchSizeReduced },
    ScanComplete { data: ScanSummary },
    Diagnostic { data: Diagnostic },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressMessage {
    pub message: String,
    pub batch_number: u32,
}

impl ProgressMessage {
    /// Emitted right before a prompt is sent; the panel keys off the 📤 marker
    pub fn requesting(language: Language, batch_number: u32, entities: usize) -> Self {
        let message = match language {
            Language::En => format!("📤 Requesting AI analysis for batch {batch_number} ({entities} entities)"),
            Language::It => format!("📤 Richiesta analisi AI per il batch {batch_number} ({entities} entità)"),
        };
        Self {
            message,
            batch_number,
        }
    }

    pub fn received(language: Language, batch_number: u32) -> Self {
        let message = match language {
            Language::En => format!("📥 Received AI response for batch {batch_number}"),
            Language::It => format!("📥 Risposta AI ricevuta per il batch {batch_number}"),
        };
        Self {
            message,
            batch_number,
        }
    }

    pub fn fallback(language: Language, batch_number: u32) -> Self {
        let message = match language {
            Language::En => format!("⚠️ Using fallback classification for batch {batch_number}"),
            Language::It => format!("⚠️ Classificazione di riserva per il batch {batch_number}"),
        };
        Self {
            message,
            batch_number,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchInfo {
    pub batch_number: u32,
    pub batch_size: usize,
    pub entities_in_batch: usize,
    /// Entities still queued after this batch
    pub remaining_entities: usize,
    pub retry_attempt: u32,
    pub compact_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenLimitInfo {
    pub batch: u32,
    pub retry_count: u32,
    pub batch_size: usize,
    pub compact_mode: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSizeReduced {
    pub batch: u32,
    pub old_size: usize,
    pub new_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanSummary {
    pub status: ScanStatus,
    pub total_entities: usize,
    pub ai_results: usize,
    pub fallback_results: usize,
    pub batches: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub message: String,
}

/// Optional destination for scan events
#[derive(Debug, Clone, Default)]
pub struct EventSink(Option<mpsc::UnboundedSender<ScanEvent>>);

impl EventSink {
    /// A sink that discards everything
    pub fn none() -> Self {
        Self(None)
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(Some(tx)), rx)
    }

    pub fn emit(&self, event: ScanEvent) {
        if let Some(tx) = &self.0 {
            // Receiver gone means nobody is watching any more
            let _ = tx.send(event);
        }
    }
}

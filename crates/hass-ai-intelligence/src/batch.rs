//! Adaptive batch controller
//!
//! Slices the entity list into batches and drives one agent call per
//! attempt. A token-limit reply first switches to the compact prompt, then
//! shrinks the batch by [`SHRINK_FACTOR`], and finally retries one entity at
//! a time before giving up and classifying the rest locally.
//!
//! The controller never returns an error: every failure mode ends in
//! fallback results, so each distinct input entity gets exactly one score
//! unless the scan is cancelled.

use std::sync::Arc;

use hass_ai_core::{CancelToken, EntitySnapshot, Language, Method, ScoreResult};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::ai_log::AiLogger;
use crate::conversation::ConversationClient;
use crate::error::ParseFailure;
use crate::events::{
    BatchInfo, BatchSizeReduced, EventSink, ProgressMessage, ScanEvent, ScanSummary,
    TokenLimitInfo,
};
use crate::fallback;
use crate::parser::{mentions_token_limit, parse_response, ItemVerdict};
use crate::prompt::{estimate_tokens, PromptBuilder};

pub const MIN_BATCH_SIZE: usize = 1;
pub const MAX_RETRIES: u32 = 3;
pub const SHRINK_FACTOR: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPhase {
    Running,
    Compacting,
    Shrinking,
    MinSizeRetry,
    Exhausted,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Completed,
    /// Token-limit recovery gave up; the remainder was classified locally
    Exhausted,
    Cancelled,
    /// No integration configured; every entity was classified locally
    NotConfigured,
}

/// Result of one controller run
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    /// One result per distinct input entity, in input order
    pub results: Vec<ScoreResult>,
    pub status: ScanStatus,
    pub batches: u32,
    /// Agent calls made, retries included
    pub attempts: u32,
}

impl ScanOutcome {
    pub fn ai_count(&self) -> usize {
        self.results.iter().filter(|r| r.method == Method::Ai).count()
    }

    pub fn fallback_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.method == Method::Fallback)
            .count()
    }

    fn summary(&self) -> ScanSummary {
        ScanSummary {
            status: self.status,
            total_entities: self.results.len(),
            ai_results: self.ai_count(),
            fallback_results: self.fallback_count(),
            batches: self.batches,
        }
    }
}

/// Outcome of a single agent attempt
enum Attempt {
    Parsed(Vec<(EntitySnapshot, ItemVerdict)>),
    TokenLimit,
    Failed(String),
}

/// Mutable retry bookkeeping for the batch at the queue head
#[derive(Debug)]
struct BatchState {
    batch_size: usize,
    compact_mode: bool,
    retry_count: u32,
}

impl BatchState {
    fn reset(&mut self) {
        self.compact_mode = false;
        self.retry_count = 0;
    }

    /// Next phase after a token-limit reply
    fn on_token_limit(&mut self) -> BatchPhase {
        if !self.compact_mode && self.retry_count == 0 {
            self.compact_mode = true;
            self.retry_count = 1;
            return BatchPhase::Compacting;
        }

        self.batch_size = shrink(self.batch_size);
        self.retry_count += 1;
        if self.retry_count <= MAX_RETRIES {
            return BatchPhase::Shrinking;
        }

        if self.batch_size > MIN_BATCH_SIZE {
            self.batch_size = MIN_BATCH_SIZE;
            self.compact_mode = true;
            self.retry_count = 1;
            BatchPhase::MinSizeRetry
        } else {
            BatchPhase::Exhausted
        }
    }
}

fn shrink(size: usize) -> usize {
    ((size as f64 * SHRINK_FACTOR).floor() as usize).max(MIN_BATCH_SIZE)
}

/// Drives prompt, agent and parser over a list of entities
pub struct BatchController {
    prompts: Arc<PromptBuilder>,
    client: Arc<ConversationClient>,
    logger: Option<Arc<AiLogger>>,
    language: Language,
    batch_size: usize,
}

impl BatchController {
    pub fn new(
        prompts: Arc<PromptBuilder>,
        client: Arc<ConversationClient>,
        language: Language,
        batch_size: usize,
    ) -> Self {
        Self {
            prompts,
            client,
            logger: None,
            language,
            batch_size: batch_size.max(MIN_BATCH_SIZE),
        }
    }

    pub fn with_logger(mut self, logger: Arc<AiLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    #[instrument(skip_all, fields(entities = entities.len(), batch_size = self.batch_size))]
    pub async fn run(
        &self,
        entities: Vec<EntitySnapshot>,
        sink: &EventSink,
        cancel: &CancelToken,
    ) -> ScanOutcome {
        let queue = dedupe(entities);
        let mut results: IndexMap<String, ScoreResult> = IndexMap::with_capacity(queue.len());
        let mut state = BatchState {
            batch_size: self.batch_size,
            compact_mode: false,
            retry_count: 0,
        };
        let mut pos = 0;
        let mut batch_number = 0;
        let mut attempts = 0;
        let mut new_slice = true;
        let mut phase = BatchPhase::Running;
        let mut status = ScanStatus::Completed;

        info!(total = queue.len(), "starting importance scan");

        loop {
            if cancel.is_cancelled() {
                status = ScanStatus::Cancelled;
                break;
            }
            if pos >= queue.len() {
                phase = BatchPhase::Done;
                break;
            }
            if new_slice {
                batch_number += 1;
                new_slice = false;
            }

            let end = (pos + state.batch_size).min(queue.len());
            let slice = &queue[pos..end];
            sink.emit(ScanEvent::BatchInfo {
                data: BatchInfo {
                    batch_number,
                    batch_size: state.batch_size,
                    entities_in_batch: slice.len(),
                    remaining_entities: queue.len() - end,
                    retry_attempt: state.retry_count,
                    compact_mode: state.compact_mode,
                },
            });
            sink.emit(ScanEvent::ScanProgress {
                data: ProgressMessage::requesting(self.language, batch_number, slice.len()),
            });

            attempts += 1;
            debug!(?phase, batch_number, size = slice.len(), compact = state.compact_mode, "agent attempt");
            let attempt = self.attempt(slice, state.compact_mode, batch_number).await;

            if cancel.is_cancelled() {
                status = ScanStatus::Cancelled;
                break;
            }

            match attempt {
                Attempt::Parsed(verdicts) => {
                    sink.emit(ScanEvent::ScanProgress {
                        data: ProgressMessage::received(self.language, batch_number),
                    });
                    for (entity, verdict) in verdicts {
                        let result = verdict.unwrap_or_else(|rejection| {
                            warn!(entity_id = %entity.entity_id, %rejection, "item rejected, using fallback");
                            fallback::classify(&entity, batch_number)
                        });
                        record(&mut results, result, sink);
                    }
                    pos = end;
                    new_slice = true;
                    state.reset();
                    phase = BatchPhase::Running;
                }
                Attempt::Failed(reason) => {
                    warn!(batch_number, %reason, "batch failed, using fallback");
                    sink.emit(ScanEvent::ScanProgress {
                        data: ProgressMessage::fallback(self.language, batch_number),
                    });
                    for entity in slice {
                        record(&mut results, fallback::classify(entity, batch_number), sink);
                    }
                    pos = end;
                    new_slice = true;
                    state.reset();
                    phase = BatchPhase::Running;
                }
                Attempt::TokenLimit => {
                    sink.emit(ScanEvent::TokenLimitExceeded {
                        data: TokenLimitInfo {
                            batch: batch_number,
                            retry_count: state.retry_count,
                            batch_size: state.batch_size,
                            compact_mode: state.compact_mode,
                        },
                    });

                    let old_size = state.batch_size;
                    phase = state.on_token_limit();
                    warn!(batch_number, ?phase, old_size, new_size = state.batch_size, "token limit");

                    if state.batch_size < old_size {
                        sink.emit(ScanEvent::BatchSizeReduced {
                            data: BatchSizeReduced {
                                batch: batch_number,
                                old_size,
                                new_size: state.batch_size,
                            },
                        });
                    }

                    if phase == BatchPhase::Exhausted {
                        sink.emit(ScanEvent::ScanProgress {
                            data: ProgressMessage::fallback(self.language, batch_number),
                        });
                        for entity in &queue[pos..] {
                            record(&mut results, fallback::classify(entity, batch_number), sink);
                        }
                        status = ScanStatus::Exhausted;
                        break;
                    }
                }
            }
        }

        if status != ScanStatus::Cancelled {
            let missing: Vec<&EntitySnapshot> = queue
                .iter()
                .filter(|e| !results.contains_key(e.entity_id.as_str()))
                .collect();
            if !missing.is_empty() {
                warn!(count = missing.len(), "reconciling entities without a result");
            }
            for entity in missing {
                record(&mut results, fallback::classify(entity, batch_number.max(1)), sink);
            }
        }

        let outcome = ScanOutcome {
            results: ordered(&queue, results),
            status,
            batches: batch_number,
            attempts,
        };
        info!(
            ?phase,
            status = ?outcome.status,
            ai = outcome.ai_count(),
            fallback = outcome.fallback_count(),
            batches = outcome.batches,
            attempts = outcome.attempts,
            "importance scan finished"
        );
        sink.emit(ScanEvent::ScanComplete {
            data: outcome.summary(),
        });
        outcome
    }

    async fn attempt(&self, slice: &[EntitySnapshot], compact: bool, batch_number: u32) -> Attempt {
        let prompt = match self.prompts.build(slice, self.language, compact) {
            Ok(prompt) => prompt,
            Err(e) => return Attempt::Failed(e.to_string()),
        };
        debug!(batch_number, tokens = estimate_tokens(&prompt), "prompt built");

        if let Some(logger) = &self.logger {
            let ids: Vec<&str> = slice.iter().map(|e| e.entity_id.as_str()).collect();
            logger.log_prompt(batch_number, &prompt, &ids).await;
        }

        let raw = match self.client.query(&prompt, self.language).await {
            Ok(raw) => raw,
            Err(e) => {
                let message = e.to_string();
                if let Some(logger) = &self.logger {
                    logger.log_error(batch_number, &message, "conversation").await;
                }
                return if mentions_token_limit(&message) {
                    Attempt::TokenLimit
                } else {
                    Attempt::Failed(message)
                };
            }
        };

        let parsed = parse_response(&raw, slice, batch_number);
        if let Some(logger) = &self.logger {
            logger.log_response(batch_number, &raw, parsed.is_ok()).await;
        }
        match parsed {
            Ok(verdicts) => Attempt::Parsed(verdicts),
            Err(ParseFailure::TokenLimit) => Attempt::TokenLimit,
            Err(e) => Attempt::Failed(e.to_string()),
        }
    }
}

/// Classify every entity locally, used when the integration is not configured
pub fn fallback_all(entities: Vec<EntitySnapshot>, sink: &EventSink) -> ScanOutcome {
    let queue = dedupe(entities);
    let mut results = IndexMap::with_capacity(queue.len());
    for entity in &queue {
        record(&mut results, fallback::classify(entity, 1), sink);
    }
    let outcome = ScanOutcome {
        results: ordered(&queue, results),
        status: ScanStatus::NotConfigured,
        batches: u32::from(!queue.is_empty()),
        attempts: 0,
    };
    sink.emit(ScanEvent::ScanComplete {
        data: outcome.summary(),
    });
    outcome
}

fn dedupe(entities: Vec<EntitySnapshot>) -> Vec<EntitySnapshot> {
    let mut unique: IndexMap<String, EntitySnapshot> = IndexMap::with_capacity(entities.len());
    for entity in entities {
        unique
            .entry(entity.entity_id.to_string())
            .or_insert(entity);
    }
    unique.into_values().collect()
}

fn record(results: &mut IndexMap<String, ScoreResult>, result: ScoreResult, sink: &EventSink) {
    sink.emit(ScanEvent::EntityResult {
        result: result.clone(),
    });
    results.insert(result.entity_id.to_string(), result);
}

fn ordered(queue: &[EntitySnapshot], mut results: IndexMap<String, ScoreResult>) -> Vec<ScoreResult> {
    queue
        .iter()
        .filter_map(|e| results.swap_remove(e.entity_id.as_str()))
        .collect()
}

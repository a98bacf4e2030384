//! Conversation session: event loop, transcript state, and retrieval wiring.
//!
//! A [`Session`] owns one [`Aggregator`] and one event loop task. Both
//! recognizer streams push utterance events through an unbounded channel, so
//! neither producer ever blocks on the other or on retrieval. Finalized
//! utterances that pass the gate kick off a retrieval task; its result lands
//! in a pending-context slot consumed by the next generation request, and is
//! discarded if the session ended while the lookup was in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::models::{TranscriptLine, UtteranceEvent, UtteranceSource};
use crate::retrieval::{Injector, KeywordGate, RetrievalGate};
use crate::store::KnowledgeStore;
use crate::transcript::Aggregator;

pub struct Session {
    id: String,
    aggregator: Arc<Aggregator>,
    events_tx: mpsc::UnboundedSender<UtteranceEvent>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    loop_handle: Option<JoinHandle<()>>,
    alive: Arc<AtomicBool>,
    pending_context: Arc<Mutex<Option<String>>>,
}

impl Session {
    /// Start a session with the keyword gate built from config.
    pub fn start(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Session {
        let gate: Arc<dyn RetrievalGate> =
            Arc::new(KeywordGate::new(&config.retrieval.vocabulary));
        Session::start_with_gate(store, embedder, config, gate)
    }

    /// Start a session with a caller-supplied gate implementation.
    pub fn start_with_gate(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
        gate: Arc<dyn RetrievalGate>,
    ) -> Session {
        let id = Uuid::new_v4().to_string();
        let aggregator = Arc::new(Aggregator::new(&config.transcript));
        let injector = Arc::new(Injector::new(embedder, store, &config.retrieval));
        let alive = Arc::new(AtomicBool::new(true));
        let pending_context = Arc::new(Mutex::new(None));

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let loop_handle = tokio::spawn(run_event_loop(
            events_rx,
            shutdown_rx,
            Arc::clone(&aggregator),
            gate,
            injector,
            Arc::clone(&alive),
            Arc::clone(&pending_context),
        ));

        info!(session_id = %id, "session started");
        Session {
            id,
            aggregator,
            events_tx,
            shutdown_tx: Some(shutdown_tx),
            loop_handle: Some(loop_handle),
            alive,
            pending_context,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Feed one event from the local recognizer. Never blocks.
    pub fn ingest_local(&self, participant_id: &str, segment_id: &str, text: &str, is_final: bool) {
        self.ingest(UtteranceSource::Local, participant_id, segment_id, text, is_final);
    }

    /// Feed one event from the remote transcription stream. Never blocks.
    pub fn ingest_remote(
        &self,
        participant_id: &str,
        segment_id: &str,
        text: &str,
        is_final: bool,
    ) {
        self.ingest(UtteranceSource::Remote, participant_id, segment_id, text, is_final);
    }

    fn ingest(
        &self,
        source: UtteranceSource,
        participant_id: &str,
        segment_id: &str,
        text: &str,
        is_final: bool,
    ) {
        if segment_id.is_empty() {
            warn!(source = source.as_str(), "dropping utterance event without segment id");
            return;
        }
        if !self.alive.load(Ordering::SeqCst) {
            debug!(session_id = %self.id, "dropping event for ended session");
            return;
        }

        let event = if is_final {
            UtteranceEvent::finalized(source, participant_id, segment_id, text)
        } else {
            UtteranceEvent::partial(source, participant_id, segment_id, text)
        };
        // Fails only once the loop has exited; the event is moot then.
        let _ = self.events_tx.send(event);
    }

    /// Ordered transcript snapshot at the moment of the call.
    pub fn transcript(&self) -> Vec<TranscriptLine> {
        self.aggregator.snapshot()
    }

    /// Consume the retrieved side context for the next generation request,
    /// if a triggered lookup has produced one. Single-turn: taking it leaves
    /// the slot empty.
    pub fn take_pending_context(&self) -> Option<String> {
        self.pending_context.lock().take()
    }

    pub fn duplicate_final_count(&self) -> u64 {
        self.aggregator.duplicate_final_count()
    }

    /// End the session: stop the event loop and drop any context a still
    /// running retrieval might deliver. Idempotent.
    pub async fn shutdown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.loop_handle.take() {
            let _ = handle.await;
        }
        *self.pending_context.lock() = None;
        info!(session_id = %self.id, "session ended");
    }
}

async fn run_event_loop(
    mut events_rx: mpsc::UnboundedReceiver<UtteranceEvent>,
    mut shutdown_rx: oneshot::Receiver<()>,
    aggregator: Arc<Aggregator>,
    gate: Arc<dyn RetrievalGate>,
    injector: Arc<Injector>,
    alive: Arc<AtomicBool>,
    pending_context: Arc<Mutex<Option<String>>>,
) {
    loop {
        tokio::select! {
            maybe_event = events_rx.recv() => {
                let Some(event) = maybe_event else { break };
                aggregator.apply(&event);
                if event.is_final() {
                    let text = event.record().text.clone();
                    if gate.should_retrieve(&text) {
                        debug!(segment_id = %event.record().segment_id, "gate triggered retrieval");
                        spawn_retrieval(
                            &text,
                            Arc::clone(&injector),
                            Arc::clone(&alive),
                            Arc::clone(&pending_context),
                        );
                    }
                }
            }
            _ = &mut shutdown_rx => {
                debug!("session shutdown signal received");
                break;
            }
        }
    }
    alive.store(false, Ordering::SeqCst);
}

/// Run the retrieval off the event loop so slow embedding never delays
/// transcript updates. Delivery is gated on the alive flag: a lookup that
/// outlives its session is completed but discarded.
fn spawn_retrieval(
    utterance: &str,
    injector: Arc<Injector>,
    alive: Arc<AtomicBool>,
    pending_context: Arc<Mutex<Option<String>>>,
) {
    let utterance = utterance.to_string();
    tokio::spawn(async move {
        let Some(block) = injector.retrieve(&utterance).await else {
            return;
        };
        if alive.load(Ordering::SeqCst) {
            // Latest retrieval wins if the previous block was never taken.
            *pending_context.lock() = Some(block);
        } else {
            debug!("session ended, discarding retrieved context");
        }
    });
}

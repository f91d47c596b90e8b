//! Consensus core - the Istanbul BFT state machine
//!
//! # Architecture
//! - Single-threaded event pump: every mutation happens inside `handle_event`
//! - Handlers run to completion; follow-up work is queued, never recursed
//! - Ledger, signing and transport are reached through `Backend`
//!
//! ```text
//! AcceptRequest --preprepare--> Preprepared --2f+1 prepare|commit--> Prepared
//!       ^                                                              |
//!       |                                                      2f+1 commit
//!       +------------- final committed / round change <------- Committed
//! ```

mod preprepare;
mod request;
mod round_change;
mod vote;

use crate::domain::{
    signing_payload, prepare_committed_seal, Backlog, ConsensusConfig, ConsensusError,
    ConsensusMessage, ConsensusResult, ConsensusStats, MessageCode, MessageCodec, Proposal,
    Readiness, RoundChangeSet, RoundState, State, ValidatorSet, View, Vrank,
};
use crate::events::CoreEvent;
use crate::metrics;
use crate::ports::{Backend, BackendError, RoundTimers, SignatureVerifier, SystemTimeSource, TimeSource};
use shared_crypto::{Address, Hash};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, trace, warn};

/// Classify a message against the core's position.
///
/// RoundChange messages are accepted for any round of the current sequence,
/// even while waiting for a round change. Everything else must match the
/// current view and the phase must have been reached.
pub fn check_message(
    code: MessageCode,
    view: View,
    current: View,
    state: State,
    waiting_for_round_change: bool,
) -> ConsensusResult<()> {
    if code == MessageCode::RoundChange {
        if view.sequence > current.sequence {
            return Err(ConsensusError::FutureMessage);
        }
        if view < current {
            return Err(ConsensusError::OldMessage);
        }
        return Ok(());
    }

    if view > current {
        return Err(ConsensusError::FutureMessage);
    }
    if view < current {
        return Err(ConsensusError::OldMessage);
    }
    if waiting_for_round_change {
        return Err(ConsensusError::FutureMessage);
    }
    // Only a preprepare can move the core out of AcceptRequest
    if state == State::AcceptRequest && code > MessageCode::Preprepare {
        return Err(ConsensusError::FutureMessage);
    }
    Ok(())
}

/// Istanbul BFT core of one validator
pub struct Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    backend: Arc<B>,
    verifier: Arc<V>,
    timers: T,
    config: ConsensusConfig,
    codec: MessageCodec,
    address: Address,
    state: State,
    current: Option<RoundState<B::Proposal>>,
    validators: ValidatorSet,
    round_change_set: RoundChangeSet,
    waiting_for_round_change: bool,
    backlog: Backlog,
    pending_requests: BTreeMap<u64, B::Proposal>,
    queue: VecDeque<CoreEvent<B::Proposal>>,
    consensus_started: Option<Instant>,
    vrank: Option<Vrank>,
    stats: ConsensusStats,
    time_source: Box<dyn TimeSource>,
    running: bool,
}

impl<B, V, T> Core<B, V, T>
where
    B: Backend,
    V: SignatureVerifier,
    T: RoundTimers,
{
    pub fn new(backend: Arc<B>, verifier: Arc<V>, timers: T, config: ConsensusConfig) -> Self {
        let address = backend.address();
        Self {
            codec: MessageCodec::new(config.max_message_size),
            backlog: Backlog::new(config.max_backlog_per_sender),
            round_change_set: RoundChangeSet::new(
                ValidatorSet::empty(),
                0,
                config.max_round_changes_per_sender,
            ),
            backend,
            verifier,
            timers,
            config,
            address,
            state: State::AcceptRequest,
            current: None,
            validators: ValidatorSet::empty(),
            waiting_for_round_change: false,
            pending_requests: BTreeMap::new(),
            queue: VecDeque::new(),
            consensus_started: None,
            vrank: None,
            stats: ConsensusStats::default(),
            time_source: Box::new(SystemTimeSource),
            running: false,
        }
    }

    /// Set custom time source (for testing)
    pub fn with_time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    // === LIFECYCLE ===

    /// Enter the first round on top of the ledger head.
    pub fn start(&mut self) {
        if self.running {
            return;
        }
        self.running = true;
        info!(address = %hex::encode(self.address), "Starting consensus core");
        self.start_new_round(0);
        self.drain_queue();
    }

    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.timers.stop_all();
        self.running = false;
        self.queue.clear();
        info!(address = %hex::encode(self.address), view = %self.current_view(), "Consensus core stopped");
    }

    /// Process one event and everything it triggers.
    ///
    /// Returns false once the core has shut down.
    pub fn handle_event(&mut self, event: CoreEvent<B::Proposal>) -> bool {
        if !self.running {
            let shutdown = matches!(event, CoreEvent::Shutdown);
            trace!(kind = event.kind(), "{}", ConsensusError::NotStarted);
            return !shutdown;
        }
        self.queue.push_back(event);
        self.drain_queue()
    }

    /// Run until `Shutdown` or until every sender is gone.
    pub async fn run(mut self, mut events: UnboundedReceiver<CoreEvent<B::Proposal>>) -> ConsensusStats {
        self.start();
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
        self.stop();
        self.stats
    }

    fn drain_queue(&mut self) -> bool {
        while let Some(event) = self.queue.pop_front() {
            if matches!(event, CoreEvent::Shutdown) {
                self.stop();
                return false;
            }
            self.dispatch(event);
        }
        true
    }

    fn dispatch(&mut self, event: CoreEvent<B::Proposal>) {
        let kind = event.kind();
        let from_peer = matches!(event, CoreEvent::Message { .. });
        let result = match event {
            CoreEvent::Message { payload } => self.handle_payload(&payload),
            CoreEvent::Request(proposal) => self.handle_request(proposal),
            CoreEvent::Timeout { next_view } => self.handle_timeout(next_view),
            CoreEvent::FinalCommitted => self.handle_final_committed(),
            CoreEvent::Deliver(message) => self.handle_checked(message),
            CoreEvent::Shutdown => Ok(()),
        };

        if let Err(err) = result {
            if from_peer && !matches!(err, ConsensusError::FutureMessage) {
                self.stats.messages_dropped += 1;
            }
            if err.is_benign() {
                trace!(kind, view = %self.current_view(), %err, "Event not applied");
            } else {
                warn!(kind, view = %self.current_view(), %err, "Failed to handle event");
            }
        }
    }

    // === MESSAGE INTAKE ===

    /// Authenticate a peer payload, handle it and relay it on success.
    fn handle_payload(&mut self, payload: &[u8]) -> ConsensusResult<()> {
        let message = self.codec.decode(payload)?;
        let verifier = &self.verifier;
        message.verify_sender(|data, signature| verifier.recover_signer(data, signature))?;

        let prev_hash = message.prev_hash;
        self.handle_checked(message)?;
        self.backend.gossip_sub_peer(&prev_hash, &self.validators, payload);
        Ok(())
    }

    /// Handle an authenticated message. Future messages are parked.
    fn handle_checked(&mut self, message: ConsensusMessage) -> ConsensusResult<()> {
        if !self.validators.contains(&message.sender) {
            return Err(ConsensusError::UnauthorizedAddress(message.sender));
        }

        let result = match message.code {
            MessageCode::Preprepare => self.handle_preprepare(&message),
            MessageCode::Prepare => self.handle_prepare(&message),
            MessageCode::Commit => self.handle_commit(&message),
            MessageCode::RoundChange => self.handle_round_change(&message),
        };
        if matches!(result, Err(ConsensusError::FutureMessage)) {
            self.store_backlog(message);
        }
        result
    }

    fn check_message(&self, code: MessageCode, view: View) -> ConsensusResult<()> {
        check_message(
            code,
            view,
            self.current_view(),
            self.state,
            self.waiting_for_round_change,
        )
    }

    fn store_backlog(&mut self, message: ConsensusMessage) {
        if message.sender == self.address {
            return;
        }
        let view = match self.codec.decode_view(&message) {
            Ok(view) => view,
            Err(err) => {
                debug!(%err, "Unreadable view, not backlogged");
                return;
            }
        };
        trace!(from = %hex::encode(message.sender), %view, code = %message.code, "Store future message");
        if self.backlog.push(view, message) {
            self.stats.messages_backlogged += 1;
        } else {
            warn!(%view, "Backlog full for sender, message dropped");
        }
    }

    /// Queue every parked message that is no longer in the future
    fn process_backlog(&mut self) {
        let current = self.current_view();
        let state = self.state;
        let waiting = self.waiting_for_round_change;
        let ready = self.backlog.drain(|view, message| {
            match check_message(message.code, view, current, state, waiting) {
                Ok(()) => Readiness::Ready,
                Err(ConsensusError::FutureMessage) => Readiness::Future,
                Err(_) => Readiness::Old,
            }
        });
        for message in ready {
            trace!(code = %message.code, from = %hex::encode(message.sender), "Replay backlog message");
            self.queue.push_back(CoreEvent::Deliver(message));
        }
    }

    // === ROUND LIFECYCLE ===

    /// Enter `round`, or a new sequence if the ledger moved past the current one.
    fn start_new_round(&mut self, round: u64) {
        let (last, last_proposer) = self.backend.last_proposal();
        let now = self.time_source.now();

        let round_change = match &self.current {
            None => false,
            Some(current) if last.number() >= current.sequence() => {
                let advanced = last.number() - current.sequence() + 1;
                metrics::record_sequence_advance(advanced);
                self.stats.sequences_advanced += advanced;
                if let Some(started) = self.consensus_started.take() {
                    let elapsed = now.saturating_duration_since(started);
                    metrics::record_consensus_duration(elapsed);
                    self.stats.last_consensus_duration = Some(elapsed);
                }
                false
            }
            Some(current) if last.number() + 1 == current.sequence() => {
                if round == 0 {
                    return;
                }
                if round < current.round() {
                    warn!(
                        current_round = current.round(),
                        round, "New round should not be smaller than current round"
                    );
                    return;
                }
                true
            }
            Some(current) => {
                warn!(
                    last = last.number(),
                    current = current.sequence(),
                    "New sequence should be larger than current sequence"
                );
                return;
            }
        };

        let new_view = match (&self.current, round_change) {
            (Some(current), true) => {
                let increase = round - current.round();
                metrics::record_round_change(increase);
                self.stats.rounds_changed += increase;
                self.round_change_set.clear(round);
                View::new(current.sequence(), round)
            }
            _ => {
                self.validators = self
                    .backend
                    .validators(&last)
                    .with_rules(self.config.proposer_policy, self.config.sub_group_size);
                let council = self.validators.size();
                let committee = self.validators.committee_size();
                metrics::record_validator_sizes(council, committee);
                self.stats.council_size = council;
                self.stats.committee_size = committee;
                let view = View::new(last.number() + 1, 0);
                self.round_change_set = RoundChangeSet::new(
                    self.validators.clone(),
                    view.sequence,
                    self.config.max_round_changes_per_sender,
                );
                view
            }
        };

        self.update_round_state(new_view, round_change);
        self.validators.calc_proposer(last_proposer, new_view.round);
        self.waiting_for_round_change = false;
        self.vrank = Some(Vrank::new(
            new_view,
            self.validators.sub_list(&last.hash(), &new_view),
            self.config.vrank_threshold,
            now,
        ));
        self.set_state(State::AcceptRequest);

        if round_change && self.is_proposer() {
            let proposal = match self.current.as_ref() {
                Some(current) if self.is_hash_locked() => current.proposal().cloned(),
                Some(current) => current.pending_request().cloned(),
                None => None,
            };
            if let Some(proposal) = proposal {
                self.send_preprepare(&proposal);
            }
        }
        self.new_round_change_timer();

        info!(
            view = %new_view,
            proposer = %self.validators.proposer().map(hex::encode).unwrap_or_default(),
            is_proposer = self.is_proposer(),
            round_change,
            "New round"
        );
    }

    /// Rebuild the round state for `view`.
    ///
    /// Round changes keep the pending request, and the locked proposal when
    /// locked.
    fn update_round_state(&mut self, view: View, round_change: bool) {
        let locked = self.is_hash_locked();
        let previous = self.current.take();
        let next = match previous {
            Some(previous) if round_change => {
                let (locked_hash, preprepare, pending) = previous.into_carry();
                if locked {
                    RoundState::new(view, &self.validators, locked_hash, preprepare, pending)
                } else {
                    RoundState::new(view, &self.validators, None, None, pending)
                }
            }
            _ => RoundState::new(view, &self.validators, None, None, None),
        };
        self.current = Some(next);

        let hash_locked = self.is_hash_locked();
        metrics::record_current_round(view.round);
        metrics::record_hash_lock(hash_locked);
        self.stats.current_round = view.round;
        self.stats.hash_locked = hash_locked;
    }

    fn set_state(&mut self, state: State) {
        if self.state != state {
            debug!(old = %self.state, new = %state, view = %self.current_view(), "State changed");
            self.state = state;
        }
        if state == State::AcceptRequest {
            self.process_pending_requests();
        }
        self.process_backlog();
    }

    fn new_round_change_timer(&mut self) {
        // A parked future block belongs to the view being left
        self.timers.stop_future_preprepare();
        let view = self.current_view();
        let timeout = self.config.round_timeout(view.round);
        self.timers.start_round_change(view.next_round(), timeout);
    }

    fn handle_final_committed(&mut self) -> ConsensusResult<()> {
        let (last, _) = self.backend.last_proposal();
        debug!(number = last.number(), "Received a final committed proposal");

        if let Some(report) = self
            .vrank
            .as_mut()
            .and_then(|vrank| vrank.handle_committed(last.number()))
        {
            info!(
                seq = report.view.sequence,
                round = report.view.round,
                bitmap = %report.bitmap,
                late = ?report.late_commits,
                "VRank"
            );
            metrics::record_vrank(&report);
            self.stats.last_vrank = Some(report);
        }

        self.start_new_round(0);
        Ok(())
    }

    // === LOCKING ===

    /// Locked on a proposal the ledger has not flagged as bad
    fn is_hash_locked(&self) -> bool {
        self.current
            .as_ref()
            .and_then(RoundState::locked_hash)
            .is_some_and(|hash| !self.backend.has_bad_proposal(&hash))
    }

    fn lock_hash(&mut self) {
        let backend = &self.backend;
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if let Some(locked) = current.locked_hash() {
            if backend.has_bad_proposal(&locked) {
                current.unlock_hash();
            }
        }
        if let Err(err) = current.lock_hash() {
            // Two digests locked at one height breaks safety
            panic!("{err} at view {}", current.view());
        }
        metrics::record_hash_lock(true);
        self.stats.hash_locked = true;
    }

    fn unlock_hash(&mut self) {
        if let Some(current) = self.current.as_mut() {
            current.unlock_hash();
        }
        metrics::record_hash_lock(false);
        self.stats.hash_locked = false;
    }

    // === OUTBOUND ===

    /// Sign, encode and send a message to the validators, then queue it for
    /// local handling.
    fn broadcast(&mut self, code: MessageCode, prev_hash: Hash, body: Vec<u8>, seal_digest: Option<Hash>) {
        let message = match self.finalize_message(code, prev_hash, body, seal_digest) {
            Ok(message) => message,
            Err(err) => {
                warn!(%code, %err, "Failed to finalize message");
                return;
            }
        };
        let payload = match self.codec.encode(&message) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(%code, %err, "Failed to encode message");
                return;
            }
        };
        if let Err(err) = self.backend.broadcast(&prev_hash, &self.validators, payload) {
            warn!(%code, %err, "Failed to broadcast message");
            return;
        }
        trace!(%code, view = %self.current_view(), "Broadcast");
        self.queue.push_back(CoreEvent::Deliver(message));
    }

    fn finalize_message(
        &self,
        code: MessageCode,
        prev_hash: Hash,
        body: Vec<u8>,
        seal_digest: Option<Hash>,
    ) -> Result<ConsensusMessage, BackendError> {
        let committed_seal = match seal_digest {
            Some(digest) => Some(self.backend.sign(&prepare_committed_seal(&digest))?),
            None => None,
        };
        let signature = self.backend.sign(&signing_payload(code, &prev_hash, &body))?;
        Ok(ConsensusMessage {
            code,
            prev_hash,
            body,
            sender: self.address,
            signature,
            committed_seal,
        })
    }

    // === ACCESSORS ===

    pub fn current_view(&self) -> View {
        self.current.as_ref().map(RoundState::view).unwrap_or_default()
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_waiting_for_round_change(&self) -> bool {
        self.waiting_for_round_change
    }

    pub fn locked_hash(&self) -> Option<Hash> {
        self.current.as_ref().and_then(RoundState::locked_hash)
    }

    pub fn is_proposer(&self) -> bool {
        self.validators.is_proposer(&self.address)
    }

    pub fn proposer(&self) -> Option<Address> {
        self.validators.proposer()
    }

    pub fn validators(&self) -> &ValidatorSet {
        &self.validators
    }

    pub fn round_state(&self) -> Option<&RoundState<B::Proposal>> {
        self.current.as_ref()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn pending_request_count(&self) -> usize {
        self.pending_requests.len()
    }

    pub fn round_change_votes(&self, round: u64) -> usize {
        self.round_change_set.size(round)
    }

    pub fn stats(&self) -> &ConsensusStats {
        &self.stats
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

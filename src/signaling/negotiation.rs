//! Connection negotiation state machine.
//!
//! One engine instance drives one session between a local and a remote
//! identity: the initiator creates and sends an offer, the responder answers,
//! and both exchange network candidates until the underlying connection
//! reports itself connected. All signals travel encrypted through the
//! [`SignalingCodec`]; the relay gives no ordering guarantee across rows, so
//! candidates arriving before the remote description are buffered in arrival
//! order and flushed, in order, the moment the description is set — a
//! candidate is never applied to the connection before that.
//!
//! Failure is terminal: there is no automatic retry, reconnection is a
//! brand-new session.

use crate::crypto::KeyPair;
use crate::signaling::codec::{
    CandidateInit, SignalEnvelope, SignalPayload, SignalingCodec,
};
use crate::utils::{CoreError, NegotiationError, Result, SignalError};
use std::collections::VecDeque;
use uuid::Uuid;
use x25519_dalek::PublicKey;

/// Which side of the negotiation this engine plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the offer
    Initiator,
    /// Waits for an offer and answers it
    Responder,
}

/// Negotiation session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationPhase {
    /// Session created, not yet started
    Idle,
    /// Initiator constructing its offer
    CreatingOffer,
    /// Responder waiting for the remote offer
    AwaitingOffer,
    /// Descriptions exchanged, candidates flowing
    Negotiating,
    /// Transport reports an established connection
    Connected,
    /// Session ended deliberately; resources released
    Closed,
    /// Terminal transport failure; requires a fresh session
    Failed,
}

impl NegotiationPhase {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

/// Connection-level state reported by the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// The direct connection is established
    Connected,
    /// The connection failed
    Failed,
    /// The connection was closed underneath us
    Closed,
}

/// Abstract handle over the underlying peer connection (offer/answer
/// construction, description and candidate application).
///
/// Implementations wrap whatever stack actually moves media; the engine only
/// cares that applying a candidate before the remote description is set is
/// an error in that layer, so it never does.
pub trait PeerConnection: Send {
    /// Construct the local session description as the initiator
    fn create_offer(&mut self) -> Result<String>;

    /// Construct the local session description as the responder; only valid
    /// after the remote description is set
    fn create_answer(&mut self) -> Result<String>;

    /// Apply the remote session description
    fn set_remote_description(&mut self, sdp: &str) -> Result<()>;

    /// Apply one remote network candidate
    fn add_candidate(&mut self, candidate: &CandidateInit) -> Result<()>;

    /// Release connection resources
    fn close(&mut self);
}

/// State machine driving one negotiation session
pub struct NegotiationEngine<C: PeerConnection> {
    session_id: Uuid,
    role: Role,
    phase: NegotiationPhase,
    local_id: Uuid,
    remote_id: Uuid,
    local_keys: KeyPair,
    remote_public: Option<PublicKey>,
    codec: SignalingCodec,
    connection: C,
    pending_candidates: VecDeque<CandidateInit>,
    remote_description_set: bool,
    answer_applied: bool,
    failure: Option<NegotiationError>,
}

impl<C: PeerConnection> NegotiationEngine<C> {
    /// Create an engine for a new session.
    ///
    /// `remote_public` may be absent; the codec then degrades per its
    /// fallback policy.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: Uuid,
        role: Role,
        local_id: Uuid,
        remote_id: Uuid,
        local_keys: KeyPair,
        remote_public: Option<PublicKey>,
        codec: SignalingCodec,
        connection: C,
    ) -> Self {
        Self {
            session_id,
            role,
            phase: NegotiationPhase::Idle,
            local_id,
            remote_id,
            local_keys,
            remote_public,
            codec,
            connection,
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            answer_applied: false,
            failure: None,
        }
    }

    /// The session this engine drives
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> NegotiationPhase {
        self.phase
    }

    /// This engine's negotiation role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Number of candidates buffered awaiting the remote description
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Start the session.
    ///
    /// The initiator constructs and returns an encrypted `Offer` signal for
    /// the relay; the responder returns `None` and waits.
    ///
    /// # Errors
    ///
    /// Returns `NegotiationError::InvalidState` if the session was already
    /// started
    pub async fn start(&mut self) -> Result<Option<SignalEnvelope>> {
        if self.phase != NegotiationPhase::Idle {
            return Err(NegotiationError::InvalidState {
                expected: "Idle".to_string(),
                found: format!("{:?}", self.phase),
            }
            .into());
        }

        match self.role {
            Role::Initiator => {
                self.phase = NegotiationPhase::CreatingOffer;
                let sdp = self.connection.create_offer()?;
                let envelope = self.encode(&SignalPayload::Offer { sdp }).await?;
                self.phase = NegotiationPhase::Negotiating;
                log::info!("session {}: offer sent", self.session_id);
                Ok(Some(envelope))
            }
            Role::Responder => {
                self.phase = NegotiationPhase::AwaitingOffer;
                Ok(None)
            }
        }
    }

    /// Feed one inbound signal into the engine, returning any signals to
    /// publish in response.
    ///
    /// Signals for other sessions or recipients, duplicates of one-shot
    /// steps (offer/answer), signals after close/failure, and undecodable
    /// payloads are all discarded without error.
    pub async fn handle_signal(&mut self, signal: &SignalEnvelope) -> Result<Vec<SignalEnvelope>> {
        if signal.session_id != self.session_id || signal.recipient_id != self.local_id {
            log::debug!(
                "session {}: discarding signal for session {}",
                self.session_id,
                signal.session_id
            );
            return Ok(Vec::new());
        }

        if self.phase.is_terminal() {
            log::debug!(
                "session {}: discarding {:?} signal in phase {:?}",
                self.session_id,
                signal.kind,
                self.phase
            );
            return Ok(Vec::new());
        }

        let payload = match self.codec.decrypt_signal(&signal.payload, &self.local_keys).await {
            Ok(payload) => payload,
            Err(CoreError::Signal(SignalError::Decode { reason })) => {
                log::warn!(
                    "session {}: dropping undecodable signal: {reason}",
                    self.session_id
                );
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        match payload {
            SignalPayload::Offer { sdp } => self.handle_offer(&sdp).await,
            SignalPayload::Answer { sdp } => {
                self.handle_answer(&sdp)?;
                Ok(Vec::new())
            }
            SignalPayload::Candidate { candidate } => {
                self.handle_candidate(candidate)?;
                Ok(Vec::new())
            }
            SignalPayload::Terminate => {
                log::info!("session {}: terminated by remote", self.session_id);
                self.release();
                self.phase = NegotiationPhase::Closed;
                Ok(Vec::new())
            }
        }
    }

    async fn handle_offer(&mut self, sdp: &str) -> Result<Vec<SignalEnvelope>> {
        if self.role != Role::Responder || self.phase != NegotiationPhase::AwaitingOffer {
            log::debug!("session {}: discarding duplicate offer", self.session_id);
            return Ok(Vec::new());
        }

        self.connection.set_remote_description(sdp)?;
        self.remote_description_set = true;
        self.flush_pending_candidates()?;

        let answer_sdp = self.connection.create_answer()?;
        let envelope = self.encode(&SignalPayload::Answer { sdp: answer_sdp }).await?;
        self.phase = NegotiationPhase::Negotiating;
        log::info!("session {}: answer sent", self.session_id);
        Ok(vec![envelope])
    }

    fn handle_answer(&mut self, sdp: &str) -> Result<()> {
        // One answer per session; duplicates are relay replays
        if self.role != Role::Initiator || self.answer_applied {
            log::debug!("session {}: discarding duplicate answer", self.session_id);
            return Ok(());
        }

        self.connection.set_remote_description(sdp)?;
        self.answer_applied = true;
        self.remote_description_set = true;
        self.flush_pending_candidates()?;
        log::info!("session {}: answer applied", self.session_id);
        Ok(())
    }

    fn handle_candidate(&mut self, candidate: CandidateInit) -> Result<()> {
        if self.remote_description_set {
            self.connection.add_candidate(&candidate)?;
        } else {
            // Relay rows are unordered; hold the candidate until the remote
            // description arrives
            self.pending_candidates.push_back(candidate);
            log::debug!(
                "session {}: buffered candidate ({} pending)",
                self.session_id,
                self.pending_candidates.len()
            );
        }
        Ok(())
    }

    fn flush_pending_candidates(&mut self) -> Result<()> {
        while let Some(candidate) = self.pending_candidates.pop_front() {
            self.connection.add_candidate(&candidate)?;
        }
        Ok(())
    }

    /// Encrypt and wrap a locally discovered network candidate for the
    /// relay. Returns `None` once the session is terminal.
    pub async fn local_candidate(
        &mut self,
        candidate: CandidateInit,
    ) -> Result<Option<SignalEnvelope>> {
        if self.phase.is_terminal() {
            return Ok(None);
        }
        let envelope = self.encode(&SignalPayload::Candidate { candidate }).await?;
        Ok(Some(envelope))
    }

    /// Apply a transport-level state change.
    ///
    /// `Failed` and `Closed` from the transport are both terminal failures
    /// for the session; the error is surfaced once through
    /// [`NegotiationEngine::take_failure`].
    pub fn on_transport_state(&mut self, state: TransportState) {
        match state {
            TransportState::Connected => {
                if self.phase == NegotiationPhase::Negotiating {
                    self.phase = NegotiationPhase::Connected;
                    log::info!("session {}: connected", self.session_id);
                }
            }
            TransportState::Failed | TransportState::Closed => {
                if !self.phase.is_terminal() {
                    log::warn!(
                        "session {}: transport reported {state:?}; session failed",
                        self.session_id
                    );
                    self.release();
                    self.phase = NegotiationPhase::Failed;
                    self.failure = Some(NegotiationError::Failed {
                        reason: format!("transport state {state:?}"),
                    });
                }
            }
        }
    }

    /// Take the terminal failure, if any. Surfaced exactly once; there is
    /// no automatic retry — callers wanting to reconnect start a new
    /// session.
    pub fn take_failure(&mut self) -> Option<NegotiationError> {
        self.failure.take()
    }

    /// Close the session deliberately, returning a `Terminate` signal for
    /// the remote peer (unless the session is already terminal).
    pub async fn close(&mut self) -> Result<Option<SignalEnvelope>> {
        if self.phase.is_terminal() {
            return Ok(None);
        }
        let envelope = self.encode(&SignalPayload::Terminate).await?;
        self.release();
        self.phase = NegotiationPhase::Closed;
        log::info!("session {}: closed", self.session_id);
        Ok(Some(envelope))
    }

    /// Release connection resources and discard buffered state
    fn release(&mut self) {
        self.connection.close();
        self.pending_candidates.clear();
    }

    async fn encode(&self, payload: &SignalPayload) -> Result<SignalEnvelope> {
        let encoded = self
            .codec
            .encrypt_signal(payload, self.remote_id, self.remote_public.as_ref())
            .await?;
        if encoded.downgraded {
            log::warn!(
                "session {}: {:?} signal sent without encryption",
                self.session_id,
                payload.kind()
            );
        }
        Ok(SignalEnvelope {
            session_id: self.session_id,
            kind: payload.kind(),
            payload: encoded.opaque,
            sender_id: self.local_id,
            recipient_id: self.remote_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Instrumented connection recording every operation in order
    #[derive(Default)]
    struct MockConnection {
        ops: Vec<String>,
        closed: bool,
    }

    impl PeerConnection for MockConnection {
        fn create_offer(&mut self) -> Result<String> {
            self.ops.push("create_offer".to_string());
            Ok("sdp-offer".to_string())
        }

        fn create_answer(&mut self) -> Result<String> {
            self.ops.push("create_answer".to_string());
            Ok("sdp-answer".to_string())
        }

        fn set_remote_description(&mut self, sdp: &str) -> Result<()> {
            self.ops.push(format!("set_remote:{sdp}"));
            Ok(())
        }

        fn add_candidate(&mut self, candidate: &CandidateInit) -> Result<()> {
            self.ops.push(format!("candidate:{}", candidate.candidate));
            Ok(())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    struct Harness {
        alice: NegotiationEngine<MockConnection>,
        bob: NegotiationEngine<MockConnection>,
    }

    fn harness() -> Harness {
        let session_id = Uuid::new_v4();
        let alice_id = Uuid::new_v4();
        let bob_id = Uuid::new_v4();
        let alice_keys = KeyPair::generate().unwrap();
        let bob_keys = KeyPair::generate().unwrap();

        let alice = NegotiationEngine::new(
            session_id,
            Role::Initiator,
            alice_id,
            bob_id,
            alice_keys.clone(),
            Some(*bob_keys.public()),
            SignalingCodec::new(true),
            MockConnection::default(),
        );
        let bob = NegotiationEngine::new(
            session_id,
            Role::Responder,
            bob_id,
            alice_id,
            bob_keys,
            Some(*alice_keys.public()),
            SignalingCodec::new(true),
            MockConnection::default(),
        );

        Harness { alice, bob }
    }

    fn tagged_candidate(tag: &str) -> CandidateInit {
        CandidateInit {
            candidate: tag.to_string(),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
        }
    }

    #[tokio::test]
    async fn test_offer_answer_handshake() {
        let mut h = harness();

        let offer = h.alice.start().await.unwrap().expect("initiator emits offer");
        assert_eq!(h.alice.phase(), NegotiationPhase::Negotiating);

        assert!(h.bob.start().await.unwrap().is_none());
        assert_eq!(h.bob.phase(), NegotiationPhase::AwaitingOffer);

        let responses = h.bob.handle_signal(&offer).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(h.bob.phase(), NegotiationPhase::Negotiating);

        let out = h.alice.handle_signal(&responses[0]).await.unwrap();
        assert!(out.is_empty());
        assert!(h.alice.connection.ops.contains(&"set_remote:sdp-answer".to_string()));

        h.alice.on_transport_state(TransportState::Connected);
        assert_eq!(h.alice.phase(), NegotiationPhase::Connected);
    }

    #[tokio::test]
    async fn test_candidates_buffered_until_description_then_flushed_in_order() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();

        // Three tagged candidates arrive before the offer row
        for tag in ["c1", "c2", "c3"] {
            let envelope = h
                .alice
                .local_candidate(tagged_candidate(tag))
                .await
                .unwrap()
                .unwrap();
            h.bob.handle_signal(&envelope).await.unwrap();
        }
        assert_eq!(h.bob.pending_candidate_count(), 3);
        assert!(h.bob.connection.ops.is_empty(), "nothing applied before the description");

        h.bob.handle_signal(&offer).await.unwrap();

        assert_eq!(h.bob.pending_candidate_count(), 0);
        assert_eq!(
            h.bob.connection.ops,
            vec![
                "set_remote:sdp-offer".to_string(),
                "candidate:c1".to_string(),
                "candidate:c2".to_string(),
                "candidate:c3".to_string(),
                "create_answer".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_candidate_applied_directly_after_description() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();
        h.bob.handle_signal(&offer).await.unwrap();

        let envelope = h
            .alice
            .local_candidate(tagged_candidate("late"))
            .await
            .unwrap()
            .unwrap();
        h.bob.handle_signal(&envelope).await.unwrap();

        assert_eq!(h.bob.pending_candidate_count(), 0);
        assert!(h.bob.connection.ops.contains(&"candidate:late".to_string()));
    }

    #[tokio::test]
    async fn test_duplicate_answer_discarded() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();
        let answers = h.bob.handle_signal(&offer).await.unwrap();

        h.alice.handle_signal(&answers[0]).await.unwrap();
        // Relay replays the answer row
        h.alice.handle_signal(&answers[0]).await.unwrap();

        let applied = h
            .alice
            .connection
            .ops
            .iter()
            .filter(|op| op.starts_with("set_remote"))
            .count();
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_duplicate_offer_discarded() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();

        let first = h.bob.handle_signal(&offer).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = h.bob.handle_signal(&offer).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn test_terminate_short_circuits_to_closed() {
        let mut h = harness();
        h.alice.start().await.unwrap();
        h.bob.start().await.unwrap();

        let terminate = h.alice.close().await.unwrap().expect("terminate signal");
        assert_eq!(h.alice.phase(), NegotiationPhase::Closed);
        assert!(h.alice.connection.closed);

        h.bob.handle_signal(&terminate).await.unwrap();
        assert_eq!(h.bob.phase(), NegotiationPhase::Closed);
        assert!(h.bob.connection.closed);

        // Signals after close are discarded unprocessed
        let ops_before = h.bob.connection.ops.len();
        let cand = h
            .alice
            .local_candidate(tagged_candidate("dead"))
            .await
            .unwrap();
        assert!(cand.is_none());
        assert_eq!(h.bob.connection.ops.len(), ops_before);
    }

    #[tokio::test]
    async fn test_transport_failure_surfaced_once() {
        let mut h = harness();
        h.alice.start().await.unwrap();

        h.alice.on_transport_state(TransportState::Failed);
        assert_eq!(h.alice.phase(), NegotiationPhase::Failed);

        assert!(h.alice.take_failure().is_some());
        assert!(h.alice.take_failure().is_none());

        // A second transport report does not resurface the failure
        h.alice.on_transport_state(TransportState::Failed);
        assert!(h.alice.take_failure().is_none());
    }

    #[tokio::test]
    async fn test_foreign_session_signal_discarded() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();

        let mut foreign = offer.clone();
        foreign.session_id = Uuid::new_v4();
        let out = h.bob.handle_signal(&foreign).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(h.bob.phase(), NegotiationPhase::AwaitingOffer);
    }

    #[tokio::test]
    async fn test_undecodable_signal_dropped_session_continues() {
        let mut h = harness();
        let offer = h.alice.start().await.unwrap().unwrap();
        h.bob.start().await.unwrap();

        let mut mangled = offer.clone();
        mangled.payload = "garbage".to_string();
        let out = h.bob.handle_signal(&mangled).await.unwrap();
        assert!(out.is_empty());
        assert_eq!(h.bob.phase(), NegotiationPhase::AwaitingOffer);

        // The genuine offer still works afterwards
        let responses = h.bob.handle_signal(&offer).await.unwrap();
        assert_eq!(responses.len(), 1);
    }

    #[tokio::test]
    async fn test_start_twice_is_invalid_state() {
        let mut h = harness();
        h.alice.start().await.unwrap();
        assert!(h.alice.start().await.is_err());
    }
}

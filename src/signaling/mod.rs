//! Encrypted signaling and connection negotiation.

pub mod codec;
pub mod negotiation;

pub use codec::{
    CandidateInit, EncodedSignal, SignalEnvelope, SignalKind, SignalPayload, SignalingCodec,
};
pub use negotiation::{
    NegotiationEngine, NegotiationPhase, PeerConnection, Role, TransportState,
};

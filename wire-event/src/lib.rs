//! Wire protocol for braid run streams: type + payload + envelope + SSE
//! framing.
//!
//! This crate defines the JSON shape of a single stream event, the envelope
//! fields injected into each frame, and the Server-Sent-Events framing used
//! when a run is delivered over HTTP. It does not depend on braid; braid
//! bridges its internal events into [`WireEvent`] and callers frame with
//! [`sse_frame`].

pub mod envelope;
pub mod event;
pub mod sse;

pub use envelope::{Envelope, EnvelopeState};
pub use event::{DoneFrame, ErrorFrame, WireEvent};
pub use sse::{sse_frame, DONE_EVENT, ERROR_EVENT};

//! Extraction pipeline: normalization, error classification, fallback
//! decisions and the orchestrator that ties them to the provider adapters.

pub mod classify;
pub mod fallback;
pub mod normalize;
pub mod observe;
pub mod orchestrator;
mod record;

pub use classify::{classify, ErrorKind};
pub use fallback::{CredentialSet, Decision, ExhaustReason, FallbackPolicy};
pub use normalize::{normalize, normalize_text, NormalizeError};
pub use observe::{ChannelSink, RawResponseEvent, ResponseSink, TracingSink};
pub use orchestrator::{
    AttemptOutcome, AttemptRecord, ClassifiedError, ExtractOptions, ExtractionOrchestrator,
    ExtractionOutcome,
};
pub use record::{ExtractionRecord, ScanStatus};

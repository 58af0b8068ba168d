//! mailsort - envelope address extraction and sorting-center recommendation.
//!
//! An envelope image goes to one of several vision backends; whatever shape
//! the backend answers in is normalized into one [`extract::ExtractionRecord`].
//! Failing providers are replaced by the next one in a bounded, loop-free
//! fallback chain.

pub mod config;
pub mod extract;
pub mod providers;
pub mod repository;
pub mod sorting;

pub use config::Settings;
pub use extract::{
    ClassifiedError, ErrorKind, ExtractOptions, ExtractionOrchestrator, ExtractionOutcome,
    ExtractionRecord,
};
pub use providers::ProviderId;

pub mod suite;

/// Error type used across hook boundaries where callers only need to report.
pub type DynError = Box<dyn std::error::Error + Send + Sync + 'static>;

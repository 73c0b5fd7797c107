//! Error handling foundation for threadline.
//!
//! Only the `Result` alias lives here. Each crate owns its domain error
//! enums (messaging, attachments, notifications) and wraps them in a
//! rootcause [`Report`] where a boundary wants layered context.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
///
/// `C` is the domain error carried by the report. Boundaries that talk to
/// external collaborators (blob storage, notification transports) return
/// this so callers can attach context with `.context()` before logging.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

//! Mock implementations for testing.

mod reporter;
pub use reporter::{Mailbox as ReporterMailbox, Reporter};

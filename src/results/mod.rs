//! Upload, analysis and review of a finished recording

pub mod session;

pub use session::{ResultsSession, ResultsStatus};

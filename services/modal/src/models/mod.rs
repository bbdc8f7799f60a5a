//! Modal protocol models

pub mod form;
pub mod interaction;
pub mod session;

// Re-export for convenience
pub use form::{ChoiceOption, FieldInput, FormField};
pub use interaction::{AttachmentInfo, SubmissionContext, SubmissionValue};
pub use session::{NewSession, Session, SessionStatus, build_expiry};

//! Chatrelay library - supervise a console server and relay chat commands back into it

pub mod config;
pub mod detect;
pub mod error;
pub mod process;
pub mod relay;

// Re-export commonly used types
pub use config::Config;
pub use detect::DetectedCommand;
pub use error::{RelayError, RelayKind};
pub use process::{ChildHandle, ExitReason, PtyChild, Supervisor};

//! The supervised server process and the coordination loop around it

pub mod child;
pub mod supervisor;

pub use child::{ChildHandle, ChildKiller, PtyChild};
pub use supervisor::{ExitReason, Supervisor};

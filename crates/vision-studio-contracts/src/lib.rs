pub mod chat;
pub mod diagnostics;
pub mod events;
pub mod operations;

pub use diagnostics::Diagnostic;
pub use operations::Operation;

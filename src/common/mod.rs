//! Common module - cancellation primitives and shared utilities

pub mod cancel;
pub mod utils;

pub use cancel::{CancelToken, Outcome};
pub use utils::{FormatUtils, PathUtils, Timer};

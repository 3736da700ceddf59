//! Scribecast Content Model
//!
//! The in-memory content library the recordings are filed into:
//! - **Nodes:** folders and files forming one tree per category
//! - **Library:** categories, the current category, and the ordered file
//!   selection, with explicit mutation operations
//! - **History:** the list of recordings made so far
//!
//! The library is an owned value. Consumers receive it (or a reference to
//! it) explicitly; there is no global store.

pub mod history;
pub mod library;
pub mod node;

pub use history::*;
pub use library::*;
pub use node::*;

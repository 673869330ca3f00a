//! Text primitives shared by the synchronization core: immutable text models,
//! LSP position conversion, and line deltas.

/// Host line deltas and LSP content-change computation.
pub mod change;
/// LSP position/offset conversion over ropes.
pub mod position;
/// Immutable document snapshots.
pub mod text_model;

pub use change::{LineDelta, content_change};
pub use position::OffsetEncoding;
pub use ropey::Rope;
pub use text_model::{PlannedEdit, TextModel, TextModelError};

//! # Idyll Editor
//!
//! Structural editing of Idyll node trees.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ parser: markup → AST, <diff> → operations   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: apply operation batches             │
//! │  - Validate tree and operations up front    │
//! │  - Apply in order to a copy                 │
//! │  - Re-validate, or hand the original back   │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use idyll_editor::apply_diff;
//! use idyll_parser::{parse_diff, parse_document};
//!
//! let doc = parse_document(source)?;
//! let diff = parse_diff(diff_source)?;
//!
//! let result = apply_diff(doc.nodes, &diff.operations);
//! if !result.success {
//!     eprintln!("{}", result.error.unwrap());
//! }
//! ```

pub mod diff;
pub mod errors;
pub mod operation;

pub use diff::{apply_diff, apply_diff_document, try_apply_diff, DiffOutcome, DiffResult};
pub use errors::{DiffError, OperationError};
pub use operation::DiffOp;

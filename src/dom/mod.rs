//! HTML Model
//!
//! Owned DOM shared by the worker (validation, body extraction, cursor
//! highlight) and the browser engine (hot-body diff and patch).
//!
//! ```text
//! text --tl--> Vec<Node> --diff--> Vec<Patch> --apply--> Vec<Node>
//!   \--validate--> Vec<Diagnostic>
//! ```

pub mod diff;
pub mod node;
pub mod parse;
pub mod patch;
pub mod validate;

pub use diff::{NodePath, Patch, diff};
pub use node::{Element, Node};
pub use parse::{Diagnostic, ParseError, Parsed, parse_document, parse_fragment};
pub use patch::{PatchError, apply, apply_cloned};

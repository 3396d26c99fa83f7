//! Input validation and text hygiene.
//!
//! Nothing caller-supplied reaches an engine script without passing through
//! this module first:
//!
//! - [`PathValidator`] - Rejects unsafe scan targets and normalizes the rest
//! - [`quote_literal`] - Quotes a value as one PowerShell literal
//! - [`sanitize_text`] - Cleans engine text before it is stored or shown

mod path;
mod text;

pub use path::{AllowList, PathValidator, ValidatedPath, MAX_PATH_LEN};
pub use text::{quote_literal, sanitize_text, MAX_DETAIL_CHARS};

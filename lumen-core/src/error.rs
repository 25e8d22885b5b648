use thiserror::Error;

use crate::directive::PartKind;

/// Errors surfaced by template compilation and commits. These propagate
/// synchronously out of the enclosing render call; the DOM may be left
/// partially updated for bindings committed earlier in the same pass.
#[derive(Debug, Error)]
pub enum Error {
    /// An expression sits in a syntactic position that cannot carry a
    /// binding marker (raw text content, comments, tag names, partial
    /// attribute names).
    #[error("binding in unsupported position: {0}")]
    UnsupportedBinding(String),

    /// The number of values does not match the template's binding gaps.
    #[error("template has {gaps} binding gap(s) but {values} value(s)")]
    ArityMismatch { gaps: usize, values: usize },

    /// The template markup itself could not be parsed.
    #[error("malformed template markup: {0}")]
    Malformed(String),

    /// A directive was committed to a binding kind it does not support.
    #[error("`{directive}` directive cannot be used on a {kind} binding")]
    InvalidPartKind {
        directive: &'static str,
        kind: PartKind,
    },

    /// A value type incompatible with the binding kind it was committed to.
    #[error("{value} value cannot be committed to a {kind} binding")]
    ValueKind {
        value: &'static str,
        kind: PartKind,
    },

    /// A directive's own `update` failed.
    #[error("directive error: {0}")]
    Directive(String),
}

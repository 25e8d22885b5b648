//! Declarative, incrementally updating HTML templates.
//!
//! Templates are written with the [`html!`] and [`svg!`] macros as static
//! string fragments with expression values in the gaps. The static parts are
//! parsed once per call site and cached; each render clones the prepared
//! tree on first commit and afterwards only touches the bindings whose
//! values actually changed. Stateful behavior lives in directives
//! ([`repeat`] for keyed lists, [`until`] for async values, or your own via
//! the [`Directive`] trait).
//!
//! ```ignore
//! let doc = Document::new();
//! let container = doc.create_element("div");
//! let root = RenderRoot::new(&container)?;
//! root.render(html!(["<p>count: ", "</p>"], 1))?;
//! root.render(html!(["<p>count: ", "</p>"], 2))?; // rewrites one text node
//! ```

pub mod directive;
pub mod error;
pub mod helpers;
mod marker;
pub mod part;
pub mod render;
pub mod repeat;
pub mod template;
pub mod until;
pub mod value;

pub use directive::{BoundPart, Directive, DirectiveResult, PartInfo, PartKind, directive};
pub use error::Error;
pub use part::{ChildPart, WeakChildPart};
pub use render::{RenderOptions, RenderRoot};
pub use repeat::repeat;
pub use template::{Statics, TemplateCache, TemplateKind, TemplateResult};
pub use until::{AsyncToken, ConnectionGuard, Deferred, PartSetter, until};
pub use value::{Key, Listener, NO_CHANGE, NOTHING, Value, listener};

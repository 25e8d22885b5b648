//! Imperative part manipulation for directive authors. The keyed differ is
//! built entirely on these: it creates, moves and removes nested parts
//! inside its container without going through the classify-and-diff path.

use lumen_dom::NodeRef;

use crate::error::Error;
use crate::part::ChildPart;
use crate::value::Value;

/// A read-only view of what a child part currently holds.
#[derive(Clone, Debug)]
pub enum CommittedValue {
    /// Never committed, or reset.
    None,
    Primitive(Value),
    Node(NodeRef),
    TemplateInstance,
    /// Nested parts from an iterable; carries the item count.
    Parts(usize),
    Nothing,
}

/// Creates a new empty part inside `container`, positioned immediately
/// before `before` (or at the container's end). The caller owns the returned
/// part; the container does not track it.
pub fn insert_part(container: &ChildPart, before: Option<&ChildPart>) -> Result<ChildPart, Error> {
    let reference = before.map(ChildPart::start);
    container.insert_nested(reference.as_ref())
}

/// Moves `part`'s DOM range (anchors included) to sit immediately before
/// `before`, or at the container's end. State inside the part is untouched.
pub fn move_part(container: &ChildPart, part: &ChildPart, before: Option<&ChildPart>) {
    let reference = before.map(ChildPart::start);
    part.move_before(container, reference.as_ref());
}

/// Disconnects everything inside `part` and removes its DOM range, anchors
/// included. The part must not be committed to afterwards.
pub fn remove_part(part: &ChildPart) {
    part.set_connected(false);
    part.remove_from_tree();
}

/// Empties the region between `part`'s anchors, disconnecting any parts that
/// lived there. The anchors stay; the part can be committed to again.
pub fn clear_part(part: &ChildPart) {
    part.clear_committed();
}

/// What `part` last committed, without touching the DOM.
pub fn committed_value(part: &ChildPart) -> CommittedValue {
    part.snapshot()
}

/// Overwrites `part`'s record of its committed value without rendering.
/// Directives that mutate the DOM behind the engine's back use this to keep
/// the next dirty check honest.
pub fn set_committed_value(part: &ChildPart, value: Value) {
    part.overwrite_committed(value);
}

/// Forgets `part`'s committed value entirely, so the next commit re-applies
/// unconditionally.
pub fn reset_committed_value(part: &ChildPart) {
    part.reset_committed();
}

//! The directive protocol: stateful objects that live inside a binding
//! across renders. A directive invocation in a template evaluates to a
//! [`DirectiveResult`]; when committed, the binding constructs (or reuses)
//! the directive instance, forwards the arguments and commits whatever the
//! directive returns.

use std::any::TypeId;
use std::fmt;
use std::rc::Rc;

use lumen_dom::NodeRef;

use crate::error::Error;
use crate::part::ChildPart;
use crate::value::Value;

/// Which binding position a value is being committed to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PartKind {
    Child,
    Attribute,
    BooleanAttribute,
    Property,
    Event,
    Element,
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PartKind::Child => "child",
            PartKind::Attribute => "attribute",
            PartKind::BooleanAttribute => "boolean attribute",
            PartKind::Property => "property",
            PartKind::Event => "event",
            PartKind::Element => "element",
        })
    }
}

/// Static facts about the binding a directive is constructed into. Handed to
/// the constructor so directives can reject unsupported positions up front.
#[derive(Clone, Debug)]
pub struct PartInfo {
    pub kind: PartKind,
    /// Attribute, property or event name, for the attribute-flavored kinds.
    pub name: Option<String>,
    /// Tag of the element carrying the binding; `None` for child bindings.
    pub tag: Option<String>,
}

/// The live binding a directive is updating against.
pub enum BoundPart<'a> {
    Child(&'a ChildPart),
    Attribute {
        element: &'a NodeRef,
        name: &'a str,
        kind: PartKind,
    },
    Element {
        element: &'a NodeRef,
    },
}

/// A stateful template helper. Instances persist in their binding between
/// renders as long as consecutive committed values come from the same
/// directive type; a different type (or a plain value) tears the instance
/// down.
pub trait Directive {
    /// Called on every commit with this render's arguments. The returned
    /// value is committed in the directive's place; return
    /// [`Value::NoChange`] to leave the binding as it is.
    fn update(&mut self, part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error>;

    /// Connection state change of the containing subtree. Guaranteed to
    /// alternate: never called twice in a row with the same flag.
    fn set_connected(&mut self, _connected: bool) {}
}

type DirectiveCtor = Rc<dyn Fn(&PartInfo) -> Result<Box<dyn Directive>, Error>>;

/// An unresolved directive invocation: the directive's type identity, its
/// constructor and this render's arguments. Produced by directive factory
/// functions, consumed by the commit engine.
#[derive(Clone)]
pub struct DirectiveResult {
    type_id: TypeId,
    name: &'static str,
    ctor: DirectiveCtor,
    args: Vec<Value>,
}

impl DirectiveResult {
    pub fn new<D: Directive + 'static>(
        name: &'static str,
        ctor: impl Fn(&PartInfo) -> Result<D, Error> + 'static,
        args: Vec<Value>,
    ) -> Self {
        Self {
            type_id: TypeId::of::<D>(),
            name,
            ctor: Rc::new(move |info| Ok(Box::new(ctor(info)?))),
            args,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }
}

/// Wraps a directive type into a factory that turns per-render arguments
/// into a committable [`Value`].
pub fn directive<D: Directive + 'static>(
    name: &'static str,
    ctor: impl Fn(&PartInfo) -> Result<D, Error> + Clone + 'static,
) -> impl Fn(Vec<Value>) -> Value {
    move |args| Value::Directive(DirectiveResult::new(name, ctor.clone(), args))
}

/// A constructed directive instance held by a binding. Tracks its own
/// connection state so callers can forward changes without worrying about
/// repeats.
pub(crate) struct DirectiveSlot {
    type_id: TypeId,
    instance: Box<dyn Directive>,
    connected: bool,
}

impl DirectiveSlot {
    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected != connected {
            self.connected = connected;
            self.instance.set_connected(connected);
        }
    }
}

/// Runs the resolution step for one binding: constructs or reuses the
/// directive instance in `slot` when `value` is a directive result (tearing
/// down a previous instance of a different type), or tears the slot down
/// when a plain value arrives. `connected` is the binding's current
/// connection state, handed to freshly constructed instances. Returns the
/// value to actually commit.
pub(crate) fn resolve(
    slot: &mut Option<DirectiveSlot>,
    value: Value,
    info: &PartInfo,
    part: BoundPart<'_>,
    connected: bool,
) -> Result<Value, Error> {
    let result = match value {
        Value::Directive(result) => result,
        other => {
            if let Some(mut old) = slot.take() {
                old.set_connected(false);
            }
            return Ok(other);
        }
    };

    let reuse = matches!(slot, Some(existing) if existing.type_id == result.type_id);
    if !reuse {
        if let Some(mut old) = slot.take() {
            old.set_connected(false);
        }
        let mut fresh = DirectiveSlot {
            type_id: result.type_id,
            instance: (result.ctor)(info)?,
            connected: true,
        };
        fresh.set_connected(connected);
        *slot = Some(fresh);
    }

    let out = match slot.as_mut() {
        Some(s) => s.instance.update(part, &result.args)?,
        None => return Err(Error::Directive("directive slot missing".to_string())),
    };
    if matches!(out, Value::Directive(_)) {
        return Err(Error::Directive(format!(
            "`{}` returned another directive result",
            result.name
        )));
    }
    Ok(out)
}

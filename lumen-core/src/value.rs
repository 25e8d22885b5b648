use std::fmt;
use std::rc::Rc;

use lumen_dom::{Event, EventHandler, NodeRef};

use crate::directive::DirectiveResult;
use crate::template::TemplateResult;
use crate::until::Deferred;

/// Sentinel that leaves a binding's previously committed state untouched.
pub const NO_CHANGE: Value = Value::NoChange;

/// Sentinel that renders emptiness. In a child binding it clears the content
/// between the anchors; in a multi-expression attribute it removes the whole
/// attribute.
pub const NOTHING: Value = Value::Nothing;

/// A renderable value. Every expression slot of a template carries one of
/// these; the commit engine dispatches on the variant.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A DOM node inserted as-is into a child binding.
    Node(NodeRef),
    /// A nested template, rendered as a persistent instance.
    Template(TemplateResult),
    /// A sequence of values rendered positionally in a child binding.
    List(Vec<Value>),
    /// An unresolved directive invocation.
    Directive(DirectiveResult),
    /// An event handler for an `@name` binding.
    Listener(Listener),
    /// A not-yet-available value; renders nothing unless a directive such as
    /// `until` adopts it.
    Deferred(Deferred),
    NoChange,
    Nothing,
}

impl Value {
    /// Whether the value takes the text path in a child binding.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null | Value::Nothing => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Text form used for child text nodes and attribute concatenation.
    /// `Null` stringifies to the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            _ => String::new(),
        }
    }

    /// Equality used by dirty checks. Only primitives and `Nothing` compare
    /// equal; everything else always re-commits.
    pub(crate) fn primitive_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Nothing, Value::Nothing) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            _ => false,
        }
    }

    pub fn list(values: impl IntoIterator<Item = impl Into<Value>>) -> Value {
        Value::List(values.into_iter().map(Into::into).collect())
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Node(_) => "node",
            Value::Template(_) => "template",
            Value::List(_) => "list",
            Value::Directive(_) => "directive",
            Value::Listener(_) => "listener",
            Value::Deferred(_) => "deferred",
            Value::NoChange => "no-change",
            Value::Nothing => "nothing",
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({s:?})"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Int(i) => write!(f, "Int({i})"),
            Value::Float(x) => write!(f, "Float({x})"),
            other => f.write_str(other.kind_name()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NodeRef> for Value {
    fn from(node: NodeRef) -> Self {
        Value::Node(node)
    }
}

impl From<TemplateResult> for Value {
    fn from(result: TemplateResult) -> Self {
        Value::Template(result)
    }
}

impl From<Listener> for Value {
    fn from(listener: Listener) -> Self {
        Value::Listener(listener)
    }
}

impl From<Deferred> for Value {
    fn from(deferred: Deferred) -> Self {
        Value::Deferred(deferred)
    }
}

impl From<Vec<Value>> for Value {
    fn from(values: Vec<Value>) -> Self {
        Value::List(values)
    }
}

/// An event handler plus the registration options it was bound with. Options
/// are captured at registration time; committing a listener with different
/// options tears the old registration down and installs a fresh one.
#[derive(Clone)]
pub struct Listener {
    pub(crate) handler: EventHandler,
    pub capture: bool,
    pub once: bool,
    pub passive: bool,
}

impl Listener {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Listener {
            handler: Rc::new(handler),
            capture: false,
            once: false,
            passive: false,
        }
    }

    pub fn capture(mut self) -> Self {
        self.capture = true;
        self
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }

    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    pub(crate) fn options_eq(&self, other: &Listener) -> bool {
        self.capture == other.capture && self.once == other.once && self.passive == other.passive
    }
}

/// Shorthand for `Value::Listener(Listener::new(f))`.
pub fn listener(handler: impl Fn(&Event) + 'static) -> Value {
    Value::Listener(Listener::new(handler))
}

/// A stable identity for an item in a keyed list. Keys are compared by value
/// and hashed into the differ's index map.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(String),
    Bool(bool),
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Key::Int(i as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<bool> for Key {
    fn from(b: bool) -> Self {
        Key::Bool(b)
    }
}

impl Key {
    pub(crate) fn into_value(self) -> Value {
        match self {
            Key::Int(i) => Value::Int(i),
            Key::Str(s) => Value::Str(s),
            Key::Bool(b) => Value::Bool(b),
        }
    }

    pub(crate) fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Int(i) => Some(Key::Int(*i)),
            Value::Str(s) => Some(Key::Str(s.clone())),
            Value::Bool(b) => Some(Key::Bool(*b)),
            _ => None,
        }
    }
}

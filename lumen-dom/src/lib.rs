//! A small in-memory DOM: documents, elements, text, comments and fragments,
//! with ordered attributes, element properties, event listener slots and
//! structural mutation. This is the tree `lumen-core` renders into.
//!
//! Nodes are cheap shared handles (`NodeRef`); identity comparisons use
//! [`NodeRef::ptr_eq`]. Every structural, text or attribute mutation bumps a
//! per-document counter so tests can assert "no DOM writes happened" the way
//! a browser test would count MutationObserver records.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

pub mod parse;
mod serialize;

pub use parse::parse_fragment;

/// Elements whose content model is raw text: children are a single text node
/// and markup inside them is not parsed.
pub const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea"];

/// Elements that never have children and serialize without a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta",
    "param", "source", "track", "wbr",
];

pub fn is_raw_text_element(tag: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

pub fn is_void_element(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|t| t.eq_ignore_ascii_case(tag))
}

/// Owner of a node tree. Carries the mutation counters; nodes hold a weak
/// reference back to it.
#[derive(Clone)]
pub struct Document {
    inner: Rc<DocumentInner>,
}

#[derive(Default)]
struct DocumentInner {
    mutations: Cell<u64>,
    listeners_added: Cell<u64>,
    listeners_removed: Cell<u64>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(DocumentInner::default()),
        }
    }

    pub fn create_element(&self, tag: &str) -> NodeRef {
        self.create(NodeKind::Element, tag.to_string(), String::new())
    }

    pub fn create_text(&self, data: &str) -> NodeRef {
        self.create(NodeKind::Text, String::new(), data.to_string())
    }

    pub fn create_comment(&self, data: &str) -> NodeRef {
        self.create(NodeKind::Comment, String::new(), data.to_string())
    }

    pub fn create_fragment(&self) -> NodeRef {
        self.create(NodeKind::Fragment, String::new(), String::new())
    }

    /// Total count of structural, text and attribute mutations so far.
    pub fn mutation_count(&self) -> u64 {
        self.inner.mutations.get()
    }

    /// How many listener slots have been registered on nodes of this document.
    pub fn listener_registrations(&self) -> u64 {
        self.inner.listeners_added.get()
    }

    /// How many listener slots have been unregistered.
    pub fn listener_removals(&self) -> u64 {
        self.inner.listeners_removed.get()
    }

    fn create(&self, kind: NodeKind, tag: String, data: String) -> NodeRef {
        NodeRef {
            inner: Rc::new(NodeInner {
                doc: Rc::downgrade(&self.inner),
                kind,
                tag,
                data: RefCell::new(data),
                attrs: RefCell::new(Vec::new()),
                props: RefCell::new(HashMap::new()),
                listeners: RefCell::new(HashMap::new()),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
            }),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    Comment,
    Fragment,
}

/// A property value assigned to an element through a property binding.
/// Properties live beside attributes and are never string-coerced or
/// serialized.
#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

/// A dispatched event. Only the name participates in listener lookup.
#[derive(Clone, Debug)]
pub struct Event {
    name: String,
}

impl Event {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub type EventHandler = Rc<dyn Fn(&Event)>;

/// A stable listener registration. The slot is registered on the element
/// once; the handler inside it can be swapped without touching the
/// registration, which is what keeps listener add/remove counts flat when a
/// render pass merely supplies a new closure.
#[derive(Clone)]
pub struct ListenerSlot {
    handler: Rc<RefCell<Option<EventHandler>>>,
}

impl ListenerSlot {
    pub fn new() -> Self {
        Self {
            handler: Rc::new(RefCell::new(None)),
        }
    }

    pub fn set(&self, handler: Option<EventHandler>) {
        *self.handler.borrow_mut() = handler;
    }

    pub fn get(&self) -> Option<EventHandler> {
        self.handler.borrow().clone()
    }

    fn same_slot(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.handler, &other.handler)
    }
}

impl Default for ListenerSlot {
    fn default() -> Self {
        Self::new()
    }
}

struct NodeInner {
    doc: Weak<DocumentInner>,
    kind: NodeKind,
    tag: String,
    data: RefCell<String>,
    attrs: RefCell<Vec<(String, String)>>,
    props: RefCell<HashMap<String, PropValue>>,
    listeners: RefCell<HashMap<String, Vec<ListenerSlot>>>,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<NodeRef>>,
}

/// Shared handle to a DOM node.
#[derive(Clone)]
pub struct NodeRef {
    inner: Rc<NodeInner>,
}

impl NodeRef {
    pub fn kind(&self) -> NodeKind {
        self.inner.kind
    }

    pub fn is_element(&self) -> bool {
        self.inner.kind == NodeKind::Element
    }

    pub fn is_text(&self) -> bool {
        self.inner.kind == NodeKind::Text
    }

    pub fn is_comment(&self) -> bool {
        self.inner.kind == NodeKind::Comment
    }

    pub fn is_fragment(&self) -> bool {
        self.inner.kind == NodeKind::Fragment
    }

    /// Tag name; empty for non-elements.
    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Rc::ptr_eq(&a.inner, &b.inner)
    }

    /// The document this node was created in, if it is still alive.
    pub fn document(&self) -> Option<Document> {
        self.inner.doc.upgrade().map(|inner| Document { inner })
    }

    fn bump(&self) {
        if let Some(doc) = self.inner.doc.upgrade() {
            doc.mutations.set(doc.mutations.get() + 1);
        }
    }

    // --- text / comment data ---

    /// Character data of a text or comment node.
    pub fn data(&self) -> String {
        self.inner.data.borrow().clone()
    }

    pub fn set_data(&self, data: &str) {
        let mut cur = self.inner.data.borrow_mut();
        if *cur != data {
            *cur = data.to_string();
            drop(cur);
            self.bump();
        }
    }

    // --- attributes ---

    pub fn attribute(&self, name: &str) -> Option<String> {
        self.inner
            .attrs
            .borrow()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.inner.attrs.borrow().iter().any(|(n, _)| n == name)
    }

    /// Attributes in document order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        self.inner.attrs.borrow().clone()
    }

    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut attrs = self.inner.attrs.borrow_mut();
        if let Some(entry) = attrs.iter_mut().find(|(n, _)| n == name) {
            entry.1 = value.to_string();
        } else {
            attrs.push((name.to_string(), value.to_string()));
        }
        drop(attrs);
        self.bump();
    }

    pub fn remove_attribute(&self, name: &str) {
        let mut attrs = self.inner.attrs.borrow_mut();
        let before = attrs.len();
        attrs.retain(|(n, _)| n != name);
        let removed = attrs.len() != before;
        drop(attrs);
        if removed {
            self.bump();
        }
    }

    // --- properties ---

    pub fn property(&self, name: &str) -> Option<PropValue> {
        self.inner.props.borrow().get(name).cloned()
    }

    pub fn set_property(&self, name: &str, value: PropValue) {
        self.inner.props.borrow_mut().insert(name.to_string(), value);
    }

    pub fn remove_property(&self, name: &str) {
        self.inner.props.borrow_mut().remove(name);
    }

    // --- listeners ---

    pub fn add_listener(&self, event: &str, slot: ListenerSlot) {
        self.inner
            .listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(slot);
        if let Some(doc) = self.inner.doc.upgrade() {
            doc.listeners_added.set(doc.listeners_added.get() + 1);
        }
    }

    pub fn remove_listener(&self, event: &str, slot: &ListenerSlot) {
        let mut listeners = self.inner.listeners.borrow_mut();
        let mut removed = false;
        if let Some(slots) = listeners.get_mut(event) {
            let before = slots.len();
            slots.retain(|s| !s.same_slot(slot));
            removed = slots.len() != before;
        }
        drop(listeners);
        if removed {
            if let Some(doc) = self.inner.doc.upgrade() {
                doc.listeners_removed.set(doc.listeners_removed.get() + 1);
            }
        }
    }

    /// Invokes every populated listener slot for the event on this node.
    /// Returns the number of handlers invoked. No bubbling.
    pub fn dispatch(&self, event: &Event) -> usize {
        let handlers: Vec<EventHandler> = {
            let listeners = self.inner.listeners.borrow();
            match listeners.get(event.name()) {
                Some(slots) => slots.iter().filter_map(ListenerSlot::get).collect(),
                None => Vec::new(),
            }
        };
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    // --- tree structure ---

    pub fn parent(&self) -> Option<NodeRef> {
        self.inner.parent.borrow().upgrade().map(|inner| NodeRef { inner })
    }

    pub fn children(&self) -> Vec<NodeRef> {
        self.inner.children.borrow().clone()
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    pub fn first_child(&self) -> Option<NodeRef> {
        self.inner.children.borrow().first().cloned()
    }

    pub fn last_child(&self) -> Option<NodeRef> {
        self.inner.children.borrow().last().cloned()
    }

    pub fn next_sibling(&self) -> Option<NodeRef> {
        let parent = self.parent()?;
        let children = parent.inner.children.borrow();
        let idx = children
            .iter()
            .position(|c| Rc::ptr_eq(&c.inner, &self.inner))?;
        children.get(idx + 1).cloned()
    }

    pub fn previous_sibling(&self) -> Option<NodeRef> {
        let parent = self.parent()?;
        let children = parent.inner.children.borrow();
        let idx = children
            .iter()
            .position(|c| Rc::ptr_eq(&c.inner, &self.inner))?;
        if idx == 0 {
            None
        } else {
            children.get(idx - 1).cloned()
        }
    }

    pub fn append_child(&self, child: &NodeRef) {
        self.insert_before(child, None);
    }

    /// Inserts `child` into this node's children before `reference`, or at
    /// the end when `reference` is `None`. Detaches `child` from any previous
    /// parent first.
    pub fn insert_before(&self, child: &NodeRef, reference: Option<&NodeRef>) {
        child.detach();
        let mut children = self.inner.children.borrow_mut();
        let idx = match reference {
            Some(r) => children
                .iter()
                .position(|c| Rc::ptr_eq(&c.inner, &r.inner))
                .unwrap_or(children.len()),
            None => children.len(),
        };
        children.insert(idx, child.clone());
        drop(children);
        *child.inner.parent.borrow_mut() = Rc::downgrade(&self.inner);
        self.bump();
    }

    /// Removes this node from its parent, if any.
    pub fn remove(&self) {
        if self.detach() {
            self.bump();
        }
    }

    fn detach(&self) -> bool {
        let parent = self.inner.parent.borrow().upgrade();
        let Some(parent) = parent else { return false };
        let mut children = parent.children.borrow_mut();
        let before = children.len();
        children.retain(|c| !Rc::ptr_eq(&c.inner, &self.inner));
        let removed = children.len() != before;
        drop(children);
        *self.inner.parent.borrow_mut() = Weak::new();
        removed
    }

    /// Structural clone of this node and its subtree: kind, tag, data,
    /// attributes and children. Properties and listeners are not cloned.
    pub fn deep_clone(&self) -> NodeRef {
        self.clone_with_doc(self.inner.doc.clone())
    }

    /// Like [`NodeRef::deep_clone`], but the clones belong to `doc`. Node
    /// construction does not count as a mutation of `doc`.
    pub fn import(&self, doc: &Document) -> NodeRef {
        self.clone_with_doc(Rc::downgrade(&doc.inner))
    }

    fn clone_with_doc(&self, doc: Weak<DocumentInner>) -> NodeRef {
        let clone = NodeRef {
            inner: Rc::new(NodeInner {
                doc: doc.clone(),
                kind: self.inner.kind,
                tag: self.inner.tag.clone(),
                data: RefCell::new(self.inner.data.borrow().clone()),
                attrs: RefCell::new(self.inner.attrs.borrow().clone()),
                props: RefCell::new(HashMap::new()),
                listeners: RefCell::new(HashMap::new()),
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
            }),
        };
        for child in self.inner.children.borrow().iter() {
            let child_clone = child.clone_with_doc(doc.clone());
            *child_clone.inner.parent.borrow_mut() = Rc::downgrade(&clone.inner);
            clone.inner.children.borrow_mut().push(child_clone);
        }
        clone
    }

    /// Pre-order traversal of this node's subtree, excluding the node itself.
    /// The visit order is the shared numbering used by the template compiler
    /// and instantiator.
    pub fn walk(&self, visit: &mut dyn FnMut(&NodeRef)) {
        for child in self.inner.children.borrow().iter() {
            visit(child);
            child.walk(visit);
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            NodeKind::Element => write!(f, "<{}>", self.inner.tag),
            NodeKind::Text => write!(f, "#text {:?}", self.inner.data.borrow()),
            NodeKind::Comment => write!(f, "<!--{}-->", self.inner.data.borrow()),
            NodeKind::Fragment => write!(f, "#fragment"),
        }
    }
}

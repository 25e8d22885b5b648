//! Live binding sites and the commit engine. A [`ChildPart`] owns the region
//! between two anchor comments and diffs whatever value kind is committed to
//! it; attribute, property, event and element parts hold their target element
//! directly. Template instances tie a prepared template's binding descriptors
//! to the cloned nodes they control.

use std::cell::RefCell;
use std::mem;
use std::rc::{Rc, Weak};

use lumen_dom::{Document, ListenerSlot, NodeRef, PropValue};

use crate::directive::{self, BoundPart, DirectiveSlot, PartInfo, PartKind};
use crate::error::Error;
use crate::helpers::CommittedValue;
use crate::template::{Template, TemplateCache, TemplateResult};
use crate::value::{Listener, Value};

/// What a child binding currently holds. This is the single source of truth
/// for dirty checks: a commit compares the incoming value against it before
/// touching the DOM.
pub(crate) enum Committed {
    /// Never committed, or deliberately reset so the next commit re-applies.
    None,
    /// A primitive rendered as one text node.
    Text(Value),
    /// A caller-owned node inserted as-is.
    Node(NodeRef),
    /// A template instance whose nodes fill the region.
    Instance(TemplateInstance),
    /// Nested parts from an iterable, one per item, in order.
    Parts(Vec<ChildPart>),
    /// Explicit emptiness.
    Nothing,
}

pub(crate) struct ChildPartState {
    doc: Document,
    cache: TemplateCache,
    start: NodeRef,
    end: NodeRef,
    committed: Committed,
    directive: Option<DirectiveSlot>,
    connected: bool,
}

/// A child binding: owns the DOM strictly between its `start` and `end`
/// anchor comments. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ChildPart(Rc<RefCell<ChildPartState>>);

/// Weak handle used by async writers; see [`crate::until::PartSetter`].
#[derive(Clone)]
pub struct WeakChildPart(Weak<RefCell<ChildPartState>>);

impl WeakChildPart {
    pub fn upgrade(&self) -> Option<ChildPart> {
        self.0.upgrade().map(ChildPart)
    }
}

impl ChildPart {
    pub(crate) fn new(
        doc: Document,
        cache: TemplateCache,
        start: NodeRef,
        end: NodeRef,
        connected: bool,
    ) -> Self {
        ChildPart(Rc::new(RefCell::new(ChildPartState {
            doc,
            cache,
            start,
            end,
            committed: Committed::None,
            directive: None,
            connected,
        })))
    }

    pub fn downgrade(&self) -> WeakChildPart {
        WeakChildPart(Rc::downgrade(&self.0))
    }

    pub fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    pub(crate) fn start(&self) -> NodeRef {
        self.0.borrow().start.clone()
    }

    pub(crate) fn end(&self) -> NodeRef {
        self.0.borrow().end.clone()
    }

    /// Commits a value: resolves directives, classifies the result and
    /// applies the minimal DOM change relative to what is already there.
    pub fn commit(&self, value: Value) -> Result<(), Error> {
        let value = self.resolve(value)?;
        self.commit_resolved(value)
    }

    /// Commits a value that already went through directive resolution.
    /// Async writers land here so a late plain value does not tear down the
    /// binding's live directive slot.
    pub(crate) fn commit_resolved(&self, value: Value) -> Result<(), Error> {
        match value {
            Value::NoChange => Ok(()),
            // A bare deferred renders nothing; the `until` directive is the
            // way to consume it.
            Value::Nothing | Value::Deferred(_) => self.commit_nothing(),
            v if v.is_primitive() => self.commit_text(v),
            Value::Node(node) => self.commit_node(node),
            Value::Template(result) => self.commit_template(result),
            Value::List(values) => self.commit_iterable(values),
            other => Err(Error::ValueKind {
                value: other.kind_name(),
                kind: PartKind::Child,
            }),
        }
    }

    fn resolve(&self, value: Value) -> Result<Value, Error> {
        if !matches!(value, Value::Directive(_)) && self.0.borrow().directive.is_none() {
            return Ok(value);
        }
        // The slot leaves the state while the directive runs so it can call
        // back into this part.
        let (mut slot, connected) = {
            let mut state = self.0.borrow_mut();
            (state.directive.take(), state.connected)
        };
        let info = PartInfo {
            kind: PartKind::Child,
            name: None,
            tag: None,
        };
        let out = directive::resolve(&mut slot, value, &info, BoundPart::Child(self), connected);
        self.0.borrow_mut().directive = slot;
        out
    }

    fn commit_nothing(&self) -> Result<(), Error> {
        if matches!(self.0.borrow().committed, Committed::Nothing) {
            return Ok(());
        }
        self.clear_committed();
        self.0.borrow_mut().committed = Committed::Nothing;
        Ok(())
    }

    fn commit_text(&self, value: Value) -> Result<(), Error> {
        let mut reuse = false;
        if let Committed::Text(prev) = &self.0.borrow().committed {
            if prev.primitive_eq(&value) {
                return Ok(());
            }
            reuse = true;
        }
        let text = value.to_text();
        let existing = if reuse {
            self.0.borrow().start.next_sibling().filter(NodeRef::is_text)
        } else {
            None
        };
        match existing {
            Some(node) => node.set_data(&text),
            None => {
                self.clear_committed();
                let (doc, end) = {
                    let state = self.0.borrow();
                    (state.doc.clone(), state.end.clone())
                };
                let parent = anchored_parent(&end)?;
                parent.insert_before(&doc.create_text(&text), Some(&end));
            }
        }
        self.0.borrow_mut().committed = Committed::Text(value);
        Ok(())
    }

    fn commit_node(&self, node: NodeRef) -> Result<(), Error> {
        if let Committed::Node(prev) = &self.0.borrow().committed {
            if NodeRef::ptr_eq(prev, &node) {
                return Ok(());
            }
        }
        self.clear_committed();
        let end = self.end();
        let parent = anchored_parent(&end)?;
        if node.is_fragment() {
            // Fragments splice their children in; the fragment node itself
            // never enters the tree.
            let mut spliced = false;
            while let Some(child) = node.first_child() {
                parent.insert_before(&child, Some(&end));
                spliced = true;
            }
            self.0.borrow_mut().committed = if spliced {
                Committed::Node(node)
            } else {
                Committed::Nothing
            };
        } else {
            parent.insert_before(&node, Some(&end));
            self.0.borrow_mut().committed = Committed::Node(node);
        }
        Ok(())
    }

    fn commit_template(&self, result: TemplateResult) -> Result<(), Error> {
        let id = result.id();
        let (kind, statics, values) = result.into_parts();
        let cache = self.0.borrow().cache.clone();
        let template = cache.get_or_prepare(kind, statics, id)?;
        if values.len() != template.gaps {
            return Err(Error::ArityMismatch {
                gaps: template.gaps,
                values: values.len(),
            });
        }

        let reuse = matches!(
            &self.0.borrow().committed,
            Committed::Instance(instance) if Rc::ptr_eq(&instance.template, &template)
        );
        if reuse {
            let taken = mem::replace(&mut self.0.borrow_mut().committed, Committed::None);
            let Committed::Instance(mut instance) = taken else {
                return Err(Error::Malformed("template instance lost".to_string()));
            };
            let res = instance.update(&values);
            self.0.borrow_mut().committed = Committed::Instance(instance);
            return res;
        }

        self.clear_committed();
        let (doc, end, connected) = {
            let state = self.0.borrow();
            (state.doc.clone(), state.end.clone(), state.connected)
        };
        let (mut instance, fragment) =
            TemplateInstance::instantiate(&template, &doc, &cache, connected)?;
        let parent = anchored_parent(&end)?;
        while let Some(child) = fragment.first_child() {
            parent.insert_before(&child, Some(&end));
        }
        let res = instance.update(&values);
        self.0.borrow_mut().committed = Committed::Instance(instance);
        res
    }

    fn commit_iterable(&self, values: Vec<Value>) -> Result<(), Error> {
        let mut parts = {
            let is_parts = matches!(self.0.borrow().committed, Committed::Parts(_));
            if is_parts {
                let taken = mem::replace(&mut self.0.borrow_mut().committed, Committed::None);
                match taken {
                    Committed::Parts(parts) => parts,
                    _ => Vec::new(),
                }
            } else {
                self.clear_committed();
                Vec::new()
            }
        };

        let wanted = values.len();
        let mut result = Ok(());
        for (i, item) in values.into_iter().enumerate() {
            if i == parts.len() {
                match self.insert_nested(None) {
                    Ok(part) => parts.push(part),
                    Err(err) => {
                        result = Err(err);
                        break;
                    }
                }
            }
            if let Err(err) = parts[i].commit(item) {
                result = Err(err);
                break;
            }
        }
        if result.is_ok() {
            for part in parts.drain(wanted..) {
                part.set_connected(false);
                part.remove_from_tree();
            }
        }
        self.0.borrow_mut().committed = Committed::Parts(parts);
        result
    }

    /// Creates an empty nested part whose anchors sit immediately before
    /// `before`'s start anchor, or before this part's end anchor.
    pub(crate) fn insert_nested(&self, before: Option<&NodeRef>) -> Result<ChildPart, Error> {
        let state = self.0.borrow();
        let parent = anchored_parent(&state.end)?;
        let reference = before.unwrap_or(&state.end);
        let start = state.doc.create_comment("");
        let end = state.doc.create_comment("");
        parent.insert_before(&start, Some(reference));
        parent.insert_before(&end, Some(reference));
        Ok(ChildPart::new(
            state.doc.clone(),
            state.cache.clone(),
            start,
            end,
            state.connected,
        ))
    }

    /// Removes the nodes strictly between the anchors, disconnecting any
    /// parts living in them first. The part's own directive is untouched.
    pub(crate) fn clear_committed(&self) {
        let committed = mem::replace(&mut self.0.borrow_mut().committed, Committed::None);
        match committed {
            Committed::Instance(mut instance) => instance.set_connected(false),
            Committed::Parts(parts) => {
                for part in &parts {
                    part.set_connected(false);
                }
            }
            _ => {}
        }
        let (start, end) = {
            let state = self.0.borrow();
            (state.start.clone(), state.end.clone())
        };
        let mut cursor = start.next_sibling();
        while let Some(node) = cursor {
            if NodeRef::ptr_eq(&node, &end) {
                break;
            }
            cursor = node.next_sibling();
            node.remove();
        }
    }

    /// Removes the part's whole range from the tree, anchors included.
    pub(crate) fn remove_from_tree(&self) {
        for node in self.range_nodes() {
            node.remove();
        }
    }

    /// Reparents the part's range (anchors included) before `reference`, or
    /// before `container`'s end anchor.
    pub(crate) fn move_before(&self, container: &ChildPart, reference: Option<&NodeRef>) {
        let end = container.end();
        let Ok(parent) = anchored_parent(&end) else {
            return;
        };
        let reference = reference.cloned().unwrap_or(end);
        for node in self.range_nodes() {
            parent.insert_before(&node, Some(&reference));
        }
    }

    fn range_nodes(&self) -> Vec<NodeRef> {
        let (start, end) = {
            let state = self.0.borrow();
            (state.start.clone(), state.end.clone())
        };
        let mut nodes = vec![start.clone()];
        let mut cursor = start.next_sibling();
        while let Some(node) = cursor {
            let done = NodeRef::ptr_eq(&node, &end);
            cursor = node.next_sibling();
            nodes.push(node);
            if done {
                break;
            }
        }
        nodes
    }

    /// Propagates a connection change to this part's directive and everything
    /// committed below it. A no-op when the state already matches, which is
    /// what guarantees each directive sees each transition exactly once.
    pub fn set_connected(&self, connected: bool) {
        {
            let mut state = self.0.borrow_mut();
            if state.connected == connected {
                return;
            }
            state.connected = connected;
        }
        let mut slot = self.0.borrow_mut().directive.take();
        if let Some(slot) = &mut slot {
            slot.set_connected(connected);
        }
        self.0.borrow_mut().directive = slot;

        let mut committed = mem::replace(&mut self.0.borrow_mut().committed, Committed::None);
        match &mut committed {
            Committed::Instance(instance) => instance.set_connected(connected),
            Committed::Parts(parts) => {
                for part in parts {
                    part.set_connected(connected);
                }
            }
            _ => {}
        }
        self.0.borrow_mut().committed = committed;
    }

    pub(crate) fn snapshot(&self) -> CommittedValue {
        match &self.0.borrow().committed {
            Committed::None => CommittedValue::None,
            Committed::Text(value) => CommittedValue::Primitive(value.clone()),
            Committed::Node(node) => CommittedValue::Node(node.clone()),
            Committed::Instance(_) => CommittedValue::TemplateInstance,
            Committed::Parts(parts) => CommittedValue::Parts(parts.len()),
            Committed::Nothing => CommittedValue::Nothing,
        }
    }

    pub(crate) fn overwrite_committed(&self, value: Value) {
        let mut state = self.0.borrow_mut();
        state.committed = match value {
            Value::Nothing => Committed::Nothing,
            v if v.is_primitive() => Committed::Text(v),
            _ => Committed::None,
        };
    }

    pub(crate) fn reset_committed(&self) {
        self.0.borrow_mut().committed = Committed::None;
    }
}

fn anchored_parent(end: &NodeRef) -> Result<NodeRef, Error> {
    end.parent()
        .ok_or_else(|| Error::Malformed("binding anchors are detached".to_string()))
}

fn prop_value(value: &Value) -> Result<PropValue, Error> {
    match value {
        Value::Null => Ok(PropValue::Null),
        Value::Bool(b) => Ok(PropValue::Bool(*b)),
        Value::Int(i) => Ok(PropValue::Int(*i)),
        Value::Float(f) => Ok(PropValue::Float(*f)),
        Value::Str(s) => Ok(PropValue::Str(s.clone())),
        other => Err(Error::ValueKind {
            value: other.kind_name(),
            kind: PartKind::Property,
        }),
    }
}

/// A bound attribute, boolean attribute, property or event binding.
pub(crate) struct AttributePart {
    element: NodeRef,
    name: String,
    kind: PartKind,
    /// Literal pieces around the expressions; `None` for single-expression
    /// bindings, which commit their value without string building.
    statics: Option<Vec<String>>,
    committed: Vec<Value>,
    /// Previously committed concatenation for multi-expression bindings.
    committed_text: Value,
    directives: Vec<Option<DirectiveSlot>>,
    listener_slot: Option<ListenerSlot>,
    listener: Option<Listener>,
    connected: bool,
}

impl AttributePart {
    pub(crate) fn new(
        element: NodeRef,
        name: String,
        kind: PartKind,
        statics: Vec<String>,
        connected: bool,
    ) -> Self {
        let single = statics.len() == 2 && statics[0].is_empty() && statics[1].is_empty();
        let expressions = statics.len() - 1;
        AttributePart {
            element,
            name,
            kind,
            statics: if single { None } else { Some(statics) },
            // NoChange never compares equal, so the first real commit is
            // always dirty.
            committed: vec![Value::NoChange; expressions],
            committed_text: Value::NoChange,
            directives: (0..expressions).map(|_| None).collect(),
            listener_slot: None,
            listener: None,
            connected,
        }
    }

    fn expressions(&self) -> usize {
        self.committed.len()
    }

    /// Consumes this binding's expressions from `values` and commits if
    /// anything changed. Returns how many values were consumed.
    pub(crate) fn update(&mut self, values: &[Value]) -> Result<usize, Error> {
        let n = self.expressions();
        match self.statics.clone() {
            None => {
                let value = values
                    .first()
                    .cloned()
                    .ok_or_else(|| Error::Malformed("missing binding value".to_string()))?;
                let value = self.resolve(0, value)?;
                if matches!(value, Value::NoChange) {
                    return Ok(1);
                }
                if !value.primitive_eq(&self.committed[0]) {
                    self.commit_value(&value)?;
                    self.committed[0] = value;
                }
                Ok(1)
            }
            Some(pieces) => {
                let mut text = String::new();
                let mut remove = false;
                for (i, piece) in pieces[..n].iter().enumerate() {
                    text.push_str(piece);
                    let incoming = values
                        .get(i)
                        .cloned()
                        .ok_or_else(|| Error::Malformed("missing binding value".to_string()))?;
                    let value = match self.resolve(i, incoming)? {
                        Value::NoChange => self.committed[i].clone(),
                        v => {
                            self.committed[i] = v.clone();
                            v
                        }
                    };
                    remove |= matches!(value, Value::Nothing);
                    text.push_str(&value.to_text());
                }
                text.push_str(&pieces[n]);
                // Dirty-check the whole concatenation, not the individual
                // expressions: two expressions can change without the final
                // attribute string changing.
                let value = if remove {
                    Value::Nothing
                } else {
                    Value::Str(text)
                };
                if !value.primitive_eq(&self.committed_text) {
                    self.commit_value(&value)?;
                    self.committed_text = value;
                }
                Ok(n)
            }
        }
    }

    fn resolve(&mut self, index: usize, value: Value) -> Result<Value, Error> {
        if !matches!(value, Value::Directive(_)) && self.directives[index].is_none() {
            return Ok(value);
        }
        let mut slot = self.directives[index].take();
        let info = PartInfo {
            kind: self.kind,
            name: Some(self.name.clone()),
            tag: Some(self.element.tag().to_string()),
        };
        let bound = BoundPart::Attribute {
            element: &self.element,
            name: &self.name,
            kind: self.kind,
        };
        let out = directive::resolve(&mut slot, value, &info, bound, self.connected);
        self.directives[index] = slot;
        out
    }

    fn commit_value(&mut self, value: &Value) -> Result<(), Error> {
        match self.kind {
            PartKind::Attribute => {
                if matches!(value, Value::Nothing) {
                    self.element.remove_attribute(&self.name);
                } else {
                    self.element.set_attribute(&self.name, &value.to_text());
                }
                Ok(())
            }
            PartKind::BooleanAttribute => {
                if value.is_truthy() {
                    self.element.set_attribute(&self.name, "");
                } else {
                    self.element.remove_attribute(&self.name);
                }
                Ok(())
            }
            PartKind::Property => {
                if matches!(value, Value::Nothing) {
                    self.element.remove_property(&self.name);
                } else {
                    self.element.set_property(&self.name, prop_value(value)?);
                }
                Ok(())
            }
            PartKind::Event => self.commit_listener(value),
            PartKind::Child | PartKind::Element => Err(Error::ValueKind {
                value: value.kind_name(),
                kind: self.kind,
            }),
        }
    }

    /// Event registrations are stable: the listener slot stays registered
    /// across handler swaps and is only torn down when the handler goes away
    /// or the registration options change.
    fn commit_listener(&mut self, value: &Value) -> Result<(), Error> {
        let new = match value {
            Value::Listener(listener) => Some(listener.clone()),
            Value::Nothing | Value::Null => None,
            other => {
                return Err(Error::ValueKind {
                    value: other.kind_name(),
                    kind: PartKind::Event,
                });
            }
        };
        let options_changed = match (&self.listener, &new) {
            (Some(old), Some(new)) => !old.options_eq(new),
            _ => false,
        };
        let should_remove = options_changed || (self.listener.is_some() && new.is_none());
        let should_add = new.is_some() && (self.listener.is_none() || options_changed);

        if should_remove {
            if let Some(slot) = &self.listener_slot {
                self.element.remove_listener(&self.name, slot);
            }
        }
        if should_add {
            let slot = self
                .listener_slot
                .get_or_insert_with(ListenerSlot::new)
                .clone();
            self.element.add_listener(&self.name, slot);
        }
        if let Some(slot) = &self.listener_slot {
            slot.set(new.as_ref().map(|l| l.handler.clone()));
        }
        self.listener = new;
        Ok(())
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        for slot in self.directives.iter_mut().flatten() {
            slot.set_connected(connected);
        }
    }
}

/// A bare element-level binding. Only directives (and emptiness sentinels)
/// make sense here; the committed value itself is discarded.
pub(crate) struct ElementPart {
    element: NodeRef,
    directive: Option<DirectiveSlot>,
    connected: bool,
}

impl ElementPart {
    pub(crate) fn new(element: NodeRef, connected: bool) -> Self {
        ElementPart {
            element,
            directive: None,
            connected,
        }
    }

    pub(crate) fn update(&mut self, value: Value) -> Result<(), Error> {
        let info = PartInfo {
            kind: PartKind::Element,
            name: None,
            tag: Some(self.element.tag().to_string()),
        };
        let mut slot = self.directive.take();
        let out = directive::resolve(
            &mut slot,
            value,
            &info,
            BoundPart::Element {
                element: &self.element,
            },
            self.connected,
        );
        self.directive = slot;
        match out? {
            Value::NoChange | Value::Nothing | Value::Null => Ok(()),
            other => Err(Error::ValueKind {
                value: other.kind_name(),
                kind: PartKind::Element,
            }),
        }
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        if self.connected == connected {
            return;
        }
        self.connected = connected;
        if let Some(slot) = &mut self.directive {
            slot.set_connected(connected);
        }
    }
}

pub(crate) enum PartSlot {
    Child(ChildPart),
    Attribute(AttributePart),
    Element(ElementPart),
}

/// A stamped-out template: the clone of the prepared fragment plus one live
/// part per binding descriptor, in document order. Reused across renders as
/// long as the same call site's template keeps arriving.
pub(crate) struct TemplateInstance {
    pub(crate) template: Rc<Template>,
    parts: Vec<PartSlot>,
}

impl TemplateInstance {
    /// Clones the prepared fragment into `doc` and builds the parts against
    /// the clone, using the same pre-order numbering the compiler recorded.
    /// Child parts get a second anchor comment inserted right after their
    /// marker; this happens after the numbering is taken, so indices stay
    /// aligned.
    pub(crate) fn instantiate(
        template: &Rc<Template>,
        doc: &Document,
        cache: &TemplateCache,
        connected: bool,
    ) -> Result<(TemplateInstance, NodeRef), Error> {
        use crate::template::TemplatePart;

        let fragment = template.fragment.import(doc);
        let mut nodes = Vec::new();
        fragment.walk(&mut |n| nodes.push(n.clone()));
        let node_at = |index: usize| {
            nodes
                .get(index)
                .cloned()
                .ok_or_else(|| Error::Malformed("binding node index out of range".to_string()))
        };

        let mut parts = Vec::with_capacity(template.parts.len());
        for part in &template.parts {
            match part {
                TemplatePart::Child { index } => {
                    let start = node_at(*index)?;
                    let end = doc.create_comment("");
                    let parent = start
                        .parent()
                        .unwrap_or_else(|| fragment.clone());
                    parent.insert_before(&end, start.next_sibling().as_ref());
                    parts.push(PartSlot::Child(ChildPart::new(
                        doc.clone(),
                        cache.clone(),
                        start,
                        end,
                        connected,
                    )));
                }
                TemplatePart::Attribute {
                    index,
                    name,
                    kind,
                    statics,
                } => {
                    parts.push(PartSlot::Attribute(AttributePart::new(
                        node_at(*index)?,
                        name.clone(),
                        *kind,
                        statics.clone(),
                        connected,
                    )));
                }
                TemplatePart::Element { index } => {
                    parts.push(PartSlot::Element(ElementPart::new(node_at(*index)?, connected)));
                }
            }
        }
        Ok((
            TemplateInstance {
                template: template.clone(),
                parts,
            },
            fragment,
        ))
    }

    /// Forwards one render's values to the parts, in document order. Each
    /// part consumes its expressions and skips the DOM when clean.
    pub(crate) fn update(&mut self, values: &[Value]) -> Result<(), Error> {
        let mut i = 0usize;
        for slot in &mut self.parts {
            match slot {
                PartSlot::Child(part) => {
                    let value = values
                        .get(i)
                        .cloned()
                        .ok_or_else(|| Error::Malformed("missing binding value".to_string()))?;
                    part.commit(value)?;
                    i += 1;
                }
                PartSlot::Attribute(part) => {
                    i += part.update(values.get(i..).unwrap_or(&[]))?;
                }
                PartSlot::Element(part) => {
                    let value = values
                        .get(i)
                        .cloned()
                        .ok_or_else(|| Error::Malformed("missing binding value".to_string()))?;
                    part.update(value)?;
                    i += 1;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn set_connected(&mut self, connected: bool) {
        for slot in &mut self.parts {
            match slot {
                PartSlot::Child(part) => part.set_connected(connected),
                PartSlot::Attribute(part) => part.set_connected(connected),
                PartSlot::Element(part) => part.set_connected(connected),
            }
        }
    }
}

use std::cell::RefCell;
use std::rc::Rc;

use lumen_core::{
    BoundPart, ConnectionGuard, Deferred, Directive, DirectiveResult, Error, PartInfo, PartSetter,
    RenderRoot, Value, html, repeat, until,
};
use lumen_dom::{Document, NodeRef};

fn setup() -> (Document, NodeRef, RenderRoot) {
    let doc = Document::new();
    let container = doc.create_element("div");
    let root = RenderRoot::new(&container).unwrap();
    (doc, container, root)
}

fn markup(container: &NodeRef) -> String {
    container.inner_html().replace("<!---->", "")
}

/// Renders its argument and records every connection transition it sees.
struct Probe {
    log: Rc<RefCell<Vec<bool>>>,
}

impl Directive for Probe {
    fn update(&mut self, _part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error> {
        Ok(args.first().cloned().unwrap_or(Value::Nothing))
    }

    fn set_connected(&mut self, connected: bool) {
        self.log.borrow_mut().push(connected);
    }
}

fn probe(log: &Rc<RefCell<Vec<bool>>>, value: Value) -> Value {
    let log = log.clone();
    Value::Directive(DirectiveResult::new(
        "probe",
        move |_info: &PartInfo| Ok(Probe { log: log.clone() }),
        vec![value],
    ))
}

#[test]
fn transitions_propagate_exactly_once() {
    let (_doc, _container, root) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    // Probe sits two template levels below the root part.
    root.render(html!(
        ["<section>", "</section>"],
        html!(["<p>", "</p>"], probe(&log, Value::from("x")))
    ))
    .unwrap();
    assert!(log.borrow().is_empty());

    root.set_connected(false);
    assert_eq!(*log.borrow(), [false]);
    // Redundant transition is swallowed before it reaches the directive.
    root.set_connected(false);
    assert_eq!(*log.borrow(), [false]);
    root.set_connected(true);
    assert_eq!(*log.borrow(), [false, true]);
}

#[test]
fn discarded_subtrees_are_disconnected() {
    let (_doc, container, root) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    root.render(html!(["<p>", "</p>"], probe(&log, Value::from("x"))))
        .unwrap();
    // A different value type tears the whole template instance down.
    root.render("plain").unwrap();
    assert_eq!(*log.borrow(), [false]);
    assert_eq!(markup(&container), "plain");
}

#[test]
fn removed_list_items_are_disconnected() {
    let (_doc, container, root) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let list = |labels: &[&str]| {
        let log = log.clone();
        repeat(
            labels.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            |label| label.clone(),
            move |label, _| html!(["<li>", "</li>"], probe(&log, Value::from(label.as_str()))),
        )
    };
    root.render(list(&["a", "b"])).unwrap();
    root.render(list(&["a"])).unwrap();
    assert_eq!(*log.borrow(), [false]);
    assert_eq!(markup(&container), "<li>a</li>");
}

#[test]
fn until_swaps_in_the_resolved_value() {
    let (_doc, container, root) = setup();
    let d = Deferred::new();
    root.render(html!(["<p>", "</p>"], until(&d, "waiting")))
        .unwrap();
    assert_eq!(markup(&container), "<p>waiting</p>");
    d.resolve("done");
    assert_eq!(markup(&container), "<p>done</p>");
}

#[test]
fn rerender_with_a_pending_deferred_keeps_the_placeholder() {
    let (doc, container, root) = setup();
    let d = Deferred::new();
    let tpl = || html!(["<p>", "</p>"], until(&d, "waiting"));
    root.render(tpl()).unwrap();
    let before = doc.mutation_count();
    root.render(tpl()).unwrap();
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(markup(&container), "<p>waiting</p>");
}

#[test]
fn resolution_after_disconnect_is_dropped() {
    let (_doc, container, root) = setup();
    let d = Deferred::new();
    root.render(html!(["<p>", "</p>"], until(&d, "waiting")))
        .unwrap();
    root.set_connected(false);
    d.resolve("late");
    assert_eq!(markup(&container), "<p>waiting</p>");
    // Reconnecting does not revive the stale token.
    root.set_connected(true);
    assert_eq!(markup(&container), "<p>waiting</p>");
}

#[test]
fn next_render_picks_up_a_dropped_resolution() {
    let (_doc, container, root) = setup();
    let d = Deferred::new();
    let tpl = || html!(["<p>", "</p>"], until(&d, "waiting"));
    root.render(tpl()).unwrap();
    root.set_connected(false);
    d.resolve("late");
    root.set_connected(true);
    root.render(tpl()).unwrap();
    assert_eq!(markup(&container), "<p>late</p>");
}

#[test]
fn resolution_while_reconnected_lands() {
    let (_doc, container, root) = setup();
    let d = Deferred::new();
    root.render(html!(["<p>", "</p>"], until(&d, "waiting")))
        .unwrap();
    root.set_connected(false);
    root.set_connected(true);
    // The bounce re-armed the subscription with a fresh token.
    d.resolve("done");
    assert_eq!(markup(&container), "<p>done</p>");
}

#[test]
fn superseded_deferred_resolution_is_dropped() {
    let (_doc, container, root) = setup();
    let d1 = Deferred::new();
    let d2 = Deferred::new();
    let tpl = |d: &Deferred| html!(["<p>", "</p>"], until(d, "waiting"));
    root.render(tpl(&d1)).unwrap();
    root.render(tpl(&d2)).unwrap();
    // The binding belongs to d2 now; d1's resolution must not land.
    d1.resolve("stale");
    assert_eq!(markup(&container), "<p>waiting</p>");
    d2.resolve("fresh");
    assert_eq!(markup(&container), "<p>fresh</p>");
}

#[test]
fn rendering_a_resolved_deferred_drops_the_pending_one() {
    let (_doc, container, root) = setup();
    let d1 = Deferred::new();
    let d2 = Deferred::new();
    d2.resolve("settled");
    let tpl = |d: &Deferred| html!(["<p>", "</p>"], until(d, "waiting"));
    root.render(tpl(&d1)).unwrap();
    root.render(tpl(&d2)).unwrap();
    assert_eq!(markup(&container), "<p>settled</p>");
    d1.resolve("stale");
    assert_eq!(markup(&container), "<p>settled</p>");
}

/// Hands its binding's async setter out so the test can commit late.
struct LateWriter {
    guard: ConnectionGuard,
    log: Rc<RefCell<Vec<bool>>>,
    setter: Rc<RefCell<Option<PartSetter>>>,
}

impl Directive for LateWriter {
    fn update(&mut self, part: BoundPart<'_>, _args: &[Value]) -> Result<Value, Error> {
        let BoundPart::Child(child) = part else {
            return Err(Error::Directive("child bindings only".to_string()));
        };
        *self.setter.borrow_mut() = Some(PartSetter::new(child, self.guard.token()));
        Ok(Value::from("pending"))
    }

    fn set_connected(&mut self, connected: bool) {
        self.guard.set_connected(connected);
        self.log.borrow_mut().push(connected);
    }
}

#[test]
fn late_commits_leave_the_directive_in_place() {
    let (_doc, container, root) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    let setter = Rc::new(RefCell::new(None));
    let (l, s) = (log.clone(), setter.clone());
    root.render(html!(
        ["<p>", "</p>"],
        Value::Directive(DirectiveResult::new(
            "late-writer",
            move |_info: &PartInfo| {
                Ok(LateWriter {
                    guard: ConnectionGuard::new(),
                    log: l.clone(),
                    setter: s.clone(),
                })
            },
            Vec::new(),
        ))
    ))
    .unwrap();
    assert_eq!(markup(&container), "<p>pending</p>");

    let committed = setter
        .borrow()
        .as_ref()
        .unwrap()
        .set(Value::from("late"))
        .unwrap();
    assert!(committed);
    assert_eq!(markup(&container), "<p>late</p>");
    // The plain late value did not tear the directive down.
    assert!(log.borrow().is_empty());
}

#[test]
fn until_is_rejected_outside_child_bindings() {
    let (_doc, _container, root) = setup();
    let d = Deferred::new();
    let err = root
        .render(html!(["<div class=", "></div>"], until(&d, "x")))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidPartKind { .. }));
}

use std::cell::RefCell;
use std::rc::Rc;

use lumen_core::{
    BoundPart, Directive, DirectiveResult, Error, PartInfo, RenderRoot, Value, directive, html,
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

struct Counter {
    calls: i64,
}

impl Directive for Counter {
    fn update(&mut self, _part: BoundPart<'_>, _args: &[Value]) -> Result<Value, Error> {
        self.calls += 1;
        Ok(Value::Int(self.calls))
    }
}

fn counting() -> Value {
    Value::Directive(DirectiveResult::new(
        "counting",
        |_info: &PartInfo| Ok(Counter { calls: 0 }),
        Vec::new(),
    ))
}

struct Shout;

impl Directive for Shout {
    fn update(&mut self, _part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error> {
        Ok(Value::Str(
            args.first().map(Value::to_text).unwrap_or_default().to_uppercase(),
        ))
    }
}

#[test]
fn instance_persists_across_renders() {
    let (_doc, container, root) = setup();
    let tpl = || html!(["<p>", "</p>"], counting());
    root.render(tpl()).unwrap();
    assert_eq!(markup(&container), "<p>1</p>");
    root.render(tpl()).unwrap();
    root.render(tpl()).unwrap();
    assert_eq!(markup(&container), "<p>3</p>");
}

#[test]
fn different_directive_type_starts_fresh() {
    let (_doc, container, root) = setup();
    let count = || html!(["<p>", "</p>"], counting());
    let shout = || {
        html!(
            ["<p>", "</p>"],
            Value::Directive(DirectiveResult::new(
                "shout",
                |_info: &PartInfo| Ok(Shout),
                vec![Value::from("hi")],
            ))
        )
    };
    root.render(count()).unwrap();
    root.render(count()).unwrap();
    assert_eq!(markup(&container), "<p>2</p>");
    root.render(shout()).unwrap();
    assert_eq!(markup(&container), "<p>HI</p>");
    // The counter was torn down, so it restarts.
    root.render(count()).unwrap();
    assert_eq!(markup(&container), "<p>1</p>");
}

#[test]
fn plain_value_tears_the_instance_down() {
    let (_doc, container, root) = setup();
    let tpl = |v: Value| html!(["<p>", "</p>"], v);
    root.render(tpl(counting())).unwrap();
    root.render(tpl(Value::from("plain"))).unwrap();
    assert_eq!(markup(&container), "<p>plain</p>");
    root.render(tpl(counting())).unwrap();
    assert_eq!(markup(&container), "<p>1</p>");
}

struct Freeze;

impl Directive for Freeze {
    fn update(&mut self, part: BoundPart<'_>, args: &[Value]) -> Result<Value, Error> {
        let committed = match part {
            BoundPart::Child(child) => lumen_core::helpers::committed_value(child),
            _ => {
                return Err(Error::Directive("freeze is child-only".to_string()));
            }
        };
        if matches!(committed, lumen_core::helpers::CommittedValue::None) {
            Ok(args.first().cloned().unwrap_or(Value::Nothing))
        } else {
            Ok(Value::NoChange)
        }
    }
}

#[test]
fn no_change_leaves_the_dom_alone() {
    let (doc, container, root) = setup();
    let freeze = directive("freeze", |_info: &PartInfo| Ok(Freeze));
    let tpl = |v: &str| html!(["<p>", "</p>"], freeze(vec![Value::from(v)]));
    root.render(tpl("first")).unwrap();
    assert_eq!(markup(&container), "<p>first</p>");
    let before = doc.mutation_count();
    root.render(tpl("second")).unwrap();
    assert_eq!(markup(&container), "<p>first</p>");
    assert_eq!(doc.mutation_count(), before);
}

struct Recurse;

impl Directive for Recurse {
    fn update(&mut self, _part: BoundPart<'_>, _args: &[Value]) -> Result<Value, Error> {
        Ok(Value::Directive(DirectiveResult::new(
            "inner",
            |_info: &PartInfo| Ok(Shout),
            Vec::new(),
        )))
    }
}

#[test]
fn directive_returning_a_directive_is_an_error() {
    let (_doc, _container, root) = setup();
    let bad = html!(
        ["<p>", "</p>"],
        Value::Directive(DirectiveResult::new(
            "recurse",
            |_info: &PartInfo| Ok(Recurse),
            Vec::new(),
        ))
    );
    let err = root.render(bad).unwrap_err();
    assert!(matches!(err, Error::Directive(_)));
}

struct Tracer {
    log: Rc<RefCell<Vec<String>>>,
}

impl Directive for Tracer {
    fn update(&mut self, part: BoundPart<'_>, _args: &[Value]) -> Result<Value, Error> {
        let where_ = match part {
            BoundPart::Child(_) => "child".to_string(),
            BoundPart::Attribute { name, kind, .. } => format!("{kind}:{name}"),
            BoundPart::Element { element } => format!("element:{}", element.tag()),
        };
        self.log.borrow_mut().push(where_);
        Ok(Value::Nothing)
    }
}

fn tracer(log: &Rc<RefCell<Vec<String>>>) -> Value {
    let log = log.clone();
    Value::Directive(DirectiveResult::new(
        "tracer",
        move |_info: &PartInfo| Ok(Tracer { log: log.clone() }),
        Vec::new(),
    ))
}

#[test]
fn directives_see_their_binding_position() {
    let (_doc, _container, root) = setup();
    let log = Rc::new(RefCell::new(Vec::new()));
    root.render(html!(
        ["<div title=", " ", ">", "</div>"],
        tracer(&log),
        tracer(&log),
        tracer(&log)
    ))
    .unwrap();
    assert_eq!(
        *log.borrow(),
        ["attribute:title", "element:div", "child"]
    );
}

#[test]
fn clearing_a_part_resets_its_committed_state() {
    let (doc, container, root) = setup();
    root.render("hello").unwrap();
    lumen_core::helpers::clear_part(root.part());
    assert_eq!(markup(&container), "");
    let before = doc.mutation_count();
    root.render("hello").unwrap();
    assert_eq!(doc.mutation_count() - before, 1);
    assert_eq!(markup(&container), "hello");
}

#[test]
fn overwritten_committed_state_drives_the_dirty_check() {
    let (doc, container, root) = setup();
    root.render("a").unwrap();
    // Swap the text behind the engine's back, then record what we did.
    let text = container.children()[1].clone();
    text.set_data("b");
    lumen_core::helpers::set_committed_value(root.part(), Value::from("b"));
    let before = doc.mutation_count();
    root.render("b").unwrap();
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(markup(&container), "b");
    root.render("c").unwrap();
    assert_eq!(markup(&container), "c");
}

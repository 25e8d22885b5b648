use lumen_core::{RenderOptions, RenderRoot, TemplateCache, TemplateResult, Value, html};
use lumen_dom::{Document, NodeRef};

/// Rendered markup with the empty anchor comments stripped out.
fn markup(container: &NodeRef) -> String {
    container.inner_html().replace("<!---->", "")
}

fn setup() -> (Document, NodeRef, RenderRoot) {
    let doc = Document::new();
    let container = doc.create_element("div");
    let root = RenderRoot::new(&container).unwrap();
    (doc, container, root)
}

fn counter(n: i64) -> TemplateResult {
    html!(["<p>count: ", "</p>"], n)
}

#[test]
fn first_render_builds_the_tree() {
    let (_doc, container, root) = setup();
    root.render(counter(1)).unwrap();
    assert_eq!(markup(&container), "<p>count: 1</p>");
}

#[test]
fn update_touches_only_the_changed_text_node() {
    let (doc, container, root) = setup();
    root.render(counter(1)).unwrap();
    let before = doc.mutation_count();
    root.render(counter(2)).unwrap();
    assert_eq!(markup(&container), "<p>count: 2</p>");
    // One character-data write; the <p> and the static text survive.
    assert_eq!(doc.mutation_count() - before, 1);
}

#[test]
fn identical_rerender_is_a_no_op() {
    let (doc, container, root) = setup();
    root.render(counter(7)).unwrap();
    let before = doc.mutation_count();
    root.render(counter(7)).unwrap();
    assert_eq!(doc.mutation_count(), before);
    assert_eq!(markup(&container), "<p>count: 7</p>");
}

#[test]
fn same_call_site_reuses_the_template_instance() {
    let (_doc, container, root) = setup();
    root.render(counter(1)).unwrap();
    let p_before = container.children()[1].clone();
    root.render(counter(2)).unwrap();
    let p_after = container.children()[1].clone();
    assert!(NodeRef::ptr_eq(&p_before, &p_after));
}

#[test]
fn switching_templates_rebuilds_the_region() {
    let (_doc, container, root) = setup();
    root.render(counter(1)).unwrap();
    root.render(html!(["<em>", "</em>"], "other")).unwrap();
    assert_eq!(markup(&container), "<em>other</em>");
    root.render(counter(3)).unwrap();
    assert_eq!(markup(&container), "<p>count: 3</p>");
}

#[test]
fn primitive_values_render_as_text() {
    let (_doc, container, root) = setup();
    root.render("hello").unwrap();
    assert_eq!(markup(&container), "hello");
    root.render(42).unwrap();
    assert_eq!(markup(&container), "42");
    root.render(true).unwrap();
    assert_eq!(markup(&container), "true");
    root.render(Value::Null).unwrap();
    assert_eq!(markup(&container), "");
}

#[test]
fn text_is_escaped_on_serialization() {
    let (_doc, container, root) = setup();
    root.render("<script>alert(1)</script>").unwrap();
    assert_eq!(
        markup(&container),
        "&lt;script&gt;alert(1)&lt;/script&gt;"
    );
    assert_eq!(container.child_count(), 3); // two anchors and one text node
}

#[test]
fn nothing_clears_the_region() {
    let (_doc, container, root) = setup();
    root.render(counter(1)).unwrap();
    root.render(Value::Nothing).unwrap();
    assert_eq!(markup(&container), "");
}

#[test]
fn node_values_are_inserted_as_is() {
    let (doc, container, root) = setup();
    let widget = doc.create_element("canvas");
    root.render(widget.clone()).unwrap();
    assert!(NodeRef::ptr_eq(&widget.parent().unwrap(), &container));
    let before = doc.mutation_count();
    root.render(widget.clone()).unwrap();
    assert_eq!(doc.mutation_count(), before);
}

#[test]
fn nested_templates_update_in_place() {
    let (doc, container, root) = setup();
    let page = |inner: i64| html!(["<section>", "</section>"], counter(inner));
    root.render(page(1)).unwrap();
    assert_eq!(markup(&container), "<section><p>count: 1</p></section>");
    let before = doc.mutation_count();
    root.render(page(2)).unwrap();
    assert_eq!(markup(&container), "<section><p>count: 2</p></section>");
    assert_eq!(doc.mutation_count() - before, 1);
}

#[test]
fn positional_lists_grow_and_shrink() {
    let (_doc, container, root) = setup();
    let items = |n: i64| Value::list((0..n).map(|i| html!(["<i>", "</i>"], i)));
    root.render(items(3)).unwrap();
    assert_eq!(markup(&container), "<i>0</i><i>1</i><i>2</i>");
    root.render(items(5)).unwrap();
    assert_eq!(markup(&container), "<i>0</i><i>1</i><i>2</i><i>3</i><i>4</i>");
    root.render(items(2)).unwrap();
    assert_eq!(markup(&container), "<i>0</i><i>1</i>");
}

#[test]
fn value_count_mismatch_is_an_error() {
    let (_doc, _container, root) = setup();
    let result = TemplateResult::new(
        lumen_core::TemplateKind::Html,
        &["<p>", " and ", "</p>"],
        vec![Value::Int(1)],
    );
    let err = root.render(result).unwrap_err();
    assert!(matches!(
        err,
        lumen_core::Error::ArityMismatch { gaps: 2, values: 1 }
    ));
}

#[test]
fn render_before_leaves_trailing_content_alone() {
    let doc = Document::new();
    let container = doc.create_element("div");
    let footer = doc.create_element("footer");
    container.append_child(&footer);
    let root = RenderRoot::with_options(
        &container,
        TemplateCache::new(),
        RenderOptions {
            render_before: Some(footer.clone()),
        },
    )
    .unwrap();
    root.render(html!(["<main>", "</main>"], "body")).unwrap();
    assert_eq!(markup(&container), "<main>body</main><footer></footer>");
}

#[test]
fn shared_cache_prepares_each_template_once() {
    let doc = Document::new();
    let cache = TemplateCache::new();
    let a = RenderRoot::with_cache(&doc.create_element("div"), cache.clone()).unwrap();
    let b = RenderRoot::with_cache(&doc.create_element("div"), cache.clone()).unwrap();
    a.render(counter(1)).unwrap();
    b.render(counter(2)).unwrap();
    assert_eq!(cache.len(), 1);
}

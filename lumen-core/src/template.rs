//! Template preparation: scanning static strings for expression gaps,
//! marking each gap in the markup, parsing the result once and recording a
//! part descriptor per binding site. Prepared templates are cached by the
//! identity of their static strings, so each call site pays the parse cost
//! exactly once per process.

use std::cell::RefCell;
use std::rc::Rc;

use hashbrown::HashMap;
use lumen_dom::{Document, NodeRef, is_raw_text_element, parse_fragment};

use crate::directive::PartKind;
use crate::error::Error;
use crate::marker::{BOUND_ATTR_SUFFIX, marker};
use crate::value::Value;

/// The static string fragments of a template literal. The slice itself must
/// have `'static` lifetime because its address is the cache key; the `html!`
/// and `svg!` macros arrange this with a per-call-site `static`.
pub type Statics = &'static [&'static str];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum TemplateKind {
    Html,
    /// Content parsed inside an `<svg>` wrapper and reparented out of it, so
    /// fragments like `<circle>` get their proper context.
    Svg,
}

/// What a template expression evaluates to: the statics identifying the
/// template plus this render's values, one per gap. Two results from the same
/// call site share a prepared [`Template`]; only the values differ.
#[derive(Clone)]
pub struct TemplateResult {
    kind: TemplateKind,
    statics: Statics,
    values: Vec<Value>,
}

impl TemplateResult {
    pub fn new(kind: TemplateKind, statics: Statics, values: Vec<Value>) -> Self {
        Self {
            kind,
            statics,
            values,
        }
    }

    pub fn kind(&self) -> TemplateKind {
        self.kind
    }

    pub fn statics(&self) -> Statics {
        self.statics
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub(crate) fn into_parts(self) -> (TemplateKind, Statics, Vec<Value>) {
        (self.kind, self.statics, self.values)
    }

    pub(crate) fn id(&self) -> TemplateId {
        TemplateId {
            ptr: self.statics.as_ptr() as usize,
            len: self.statics.len(),
            kind: self.kind,
        }
    }
}

/// Builds an HTML [`TemplateResult`]. The first argument is a bracketed list
/// of string literals (the static fragments); the remaining arguments are the
/// expression values, one per gap between fragments.
///
/// ```ignore
/// let t = html!(["<p class=\"", "\">", "</p>"], cls, body);
/// ```
#[macro_export]
macro_rules! html {
    ([$($s:expr),+ $(,)?] $(, $v:expr)* $(,)?) => {{
        static STRINGS: &[&str] = &[$($s),+];
        $crate::TemplateResult::new(
            $crate::TemplateKind::Html,
            STRINGS,
            vec![$($crate::Value::from($v)),*],
        )
    }};
}

/// Builds an SVG [`TemplateResult`]. See [`html!`].
#[macro_export]
macro_rules! svg {
    ([$($s:expr),+ $(,)?] $(, $v:expr)* $(,)?) => {{
        static STRINGS: &[&str] = &[$($s),+];
        $crate::TemplateResult::new(
            $crate::TemplateKind::Svg,
            STRINGS,
            vec![$($crate::Value::from($v)),*],
        )
    }};
}

/// Cache key: the address and length of the statics slice plus the kind. An
/// `html!` and an `svg!` template never share an entry even if the linker
/// merges their string data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub(crate) struct TemplateId {
    ptr: usize,
    len: usize,
    kind: TemplateKind,
}

/// One binding site recorded during preparation. `index` is the node's
/// position in the pre-order numbering of the prepared fragment.
#[derive(Debug)]
pub(crate) enum TemplatePart {
    /// A marker comment standing in for a child expression.
    Child { index: usize },
    /// A bound attribute on the element at `index`. `statics` holds the
    /// literal pieces around the expressions; a lone pair of empty strings
    /// means a single-expression binding committed without concatenation.
    Attribute {
        index: usize,
        name: String,
        kind: PartKind,
        statics: Vec<String>,
    },
    /// A bare element-level binding on the element at `index`.
    Element { index: usize },
}

/// A prepared template: the parsed fragment (owned by the cache's private
/// document) plus the ordered binding descriptors.
pub(crate) struct Template {
    pub(crate) fragment: NodeRef,
    pub(crate) parts: Vec<TemplatePart>,
    pub(crate) gaps: usize,
}

impl Template {
    pub(crate) fn prepare(
        kind: TemplateKind,
        statics: Statics,
        doc: &Document,
    ) -> Result<Template, Error> {
        let scanned = scan(statics)?;
        let markup = match kind {
            TemplateKind::Html => scanned.html,
            TemplateKind::Svg => format!("<svg>{}</svg>", scanned.html),
        };
        let parsed = parse_fragment(doc, &markup).map_err(Error::Malformed)?;
        let fragment = match kind {
            TemplateKind::Html => parsed,
            TemplateKind::Svg => {
                // Hoist the children out of the <svg> wrapper.
                let fragment = doc.create_fragment();
                if let Some(wrapper) = parsed.first_child() {
                    while let Some(child) = wrapper.first_child() {
                        fragment.append_child(&child);
                    }
                }
                fragment
            }
        };

        let m = marker();
        let mut nodes = Vec::new();
        fragment.walk(&mut |n| nodes.push(n.clone()));

        let mut parts = Vec::new();
        let mut gaps = 0usize;
        let mut attr_names = scanned.attr_names.into_iter();
        for (index, node) in nodes.iter().enumerate() {
            if node.is_comment() && node.data() == m {
                node.set_data("");
                parts.push(TemplatePart::Child { index });
                gaps += 1;
            } else if node.is_element() {
                for (attr, value) in node.attributes() {
                    if attr == m {
                        node.remove_attribute(&attr);
                        parts.push(TemplatePart::Element { index });
                        gaps += 1;
                    } else if attr.ends_with(BOUND_ATTR_SUFFIX) {
                        node.remove_attribute(&attr);
                        let full_name = attr_names.next().ok_or_else(|| {
                            Error::Malformed("bound attribute name lost".to_string())
                        })?;
                        let (part_kind, name) = split_sigil(&full_name);
                        let pieces: Vec<String> =
                            value.split(m).map(str::to_string).collect();
                        if part_kind != PartKind::Attribute
                            && (pieces.len() != 2 || !pieces[0].is_empty() || !pieces[1].is_empty())
                        {
                            return Err(Error::UnsupportedBinding(format!(
                                "`{full_name}` bindings take a single expression"
                            )));
                        }
                        gaps += pieces.len() - 1;
                        parts.push(TemplatePart::Attribute {
                            index,
                            name,
                            kind: part_kind,
                            statics: pieces,
                        });
                    }
                }
            }
        }

        if gaps != statics.len() - 1 {
            return Err(Error::Malformed(
                "binding marker lost during parsing".to_string(),
            ));
        }
        Ok(Template {
            fragment,
            parts,
            gaps,
        })
    }
}

fn split_sigil(name: &str) -> (PartKind, String) {
    match name.as_bytes().first() {
        Some(b'.') => (PartKind::Property, name[1..].to_string()),
        Some(b'?') => (PartKind::BooleanAttribute, name[1..].to_string()),
        Some(b'@') => (PartKind::Event, name[1..].to_string()),
        _ => (PartKind::Attribute, name.to_string()),
    }
}

/// Shared store of prepared templates. Entries are never evicted; statics
/// have `'static` lifetime so a key can never be reused for different
/// content. Clones share the same store.
#[derive(Clone)]
pub struct TemplateCache {
    inner: Rc<TemplateCacheInner>,
}

struct TemplateCacheInner {
    doc: Document,
    templates: RefCell<HashMap<TemplateId, Rc<Template>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(TemplateCacheInner {
                doc: Document::new(),
                templates: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.templates.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.templates.borrow().is_empty()
    }

    pub(crate) fn get_or_prepare(
        &self,
        kind: TemplateKind,
        statics: Statics,
        id: TemplateId,
    ) -> Result<Rc<Template>, Error> {
        if let Some(template) = self.inner.templates.borrow().get(&id) {
            return Ok(template.clone());
        }
        log::debug!("preparing template with {} gap(s)", statics.len() - 1);
        let template = Rc::new(Template::prepare(kind, statics, &self.inner.doc)?);
        self.inner
            .templates
            .borrow_mut()
            .insert(id, template.clone());
        Ok(template)
    }
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new()
    }
}

struct Scanned {
    html: String,
    attr_names: Vec<String>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Text,
    Tag,
    /// Inside an attribute value; the byte is the closing quote, 0 when the
    /// value is unquoted.
    AttrValue(u8),
    Comment,
    BangTag,
    RawText,
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric()
        || matches!(b, b'-' | b'_' | b'.' | b':' | b'@' | b'?' | b'$')
}

/// Walks the static fragments with a small state machine and joins them with
/// markers: a marker comment in text positions, the raw marker inside
/// attribute values (rewriting the attribute's name with a recognizable
/// suffix at its first gap), and a marker attribute for element bindings.
/// Expressions in comments, raw text, tag names or partial attribute names
/// are rejected here since no marker could represent them.
fn scan(statics: Statics) -> Result<Scanned, Error> {
    let m = marker();
    let mut html = String::new();
    let mut attr_names = Vec::new();

    let mut state = ScanState::Text;
    let mut raw_tag = String::new();
    let mut pending_raw = false;
    // Set while inside the value of an attribute that has already had its
    // name rewritten; further gaps in the same value just append the marker.
    let mut bound_attr = false;

    for (fi, s) in statics.iter().enumerate() {
        let last = fi == statics.len() - 1;
        let bytes = s.as_bytes();
        let mut i = 0usize;

        // Per-fragment attribute tracking. Attribute names never span a gap,
        // so a span into the current fragment is all the rewrite needs.
        let mut attr_span: Option<(usize, usize)> = None;
        let mut in_name = false;
        let mut awaiting_value = false;
        let mut name_at_end = false;

        while i < bytes.len() {
            match state {
                ScanState::Text => {
                    if bytes[i] == b'<' {
                        if s[i..].starts_with("<!--") {
                            state = ScanState::Comment;
                            i += 4;
                        } else {
                            match bytes.get(i + 1) {
                                Some(b'/') => {
                                    i += 2;
                                    let start = i;
                                    while i < bytes.len() && is_tag_byte(bytes[i]) {
                                        i += 1;
                                    }
                                    state = ScanState::Tag;
                                    name_at_end = i == bytes.len() && i > start;
                                }
                                Some(c) if c.is_ascii_alphabetic() => {
                                    i += 1;
                                    let start = i;
                                    while i < bytes.len() && is_tag_byte(bytes[i]) {
                                        i += 1;
                                    }
                                    let tag = &s[start..i];
                                    if is_raw_text_element(tag) {
                                        raw_tag = tag.to_ascii_lowercase();
                                        pending_raw = true;
                                    }
                                    state = ScanState::Tag;
                                    name_at_end = i == bytes.len();
                                }
                                Some(b'!') => {
                                    state = ScanState::BangTag;
                                    i += 2;
                                }
                                None => {
                                    // Fragment ends right at '<': the gap
                                    // would sit in tag-name position.
                                    name_at_end = true;
                                    i += 1;
                                }
                                _ => i += 1,
                            }
                        }
                    } else {
                        i += 1;
                    }
                }
                ScanState::Tag => match bytes[i] {
                    b'>' => {
                        state = if pending_raw {
                            ScanState::RawText
                        } else {
                            ScanState::Text
                        };
                        pending_raw = false;
                        attr_span = None;
                        in_name = false;
                        awaiting_value = false;
                        i += 1;
                    }
                    b'=' => {
                        awaiting_value = true;
                        in_name = false;
                        i += 1;
                    }
                    b'"' | b'\'' if awaiting_value => {
                        state = ScanState::AttrValue(bytes[i]);
                        awaiting_value = false;
                        i += 1;
                    }
                    b'/' => {
                        in_name = false;
                        attr_span = None;
                        i += 1;
                    }
                    b if b.is_ascii_whitespace() => {
                        in_name = false;
                        i += 1;
                    }
                    _ if awaiting_value => {
                        // Unquoted value starts here; reprocess the byte in
                        // the value state.
                        state = ScanState::AttrValue(0);
                        awaiting_value = false;
                    }
                    b if is_name_byte(b) => {
                        if in_name {
                            if let Some(span) = &mut attr_span {
                                span.1 = i + 1;
                            }
                        } else {
                            attr_span = Some((i, i + 1));
                            in_name = true;
                        }
                        i += 1;
                    }
                    _ => {
                        in_name = false;
                        i += 1;
                    }
                },
                ScanState::AttrValue(quote) => {
                    let b = bytes[i];
                    if quote != 0 {
                        if b == quote {
                            state = ScanState::Tag;
                            bound_attr = false;
                            attr_span = None;
                        }
                        i += 1;
                    } else if b.is_ascii_whitespace() {
                        state = ScanState::Tag;
                        bound_attr = false;
                        attr_span = None;
                        i += 1;
                    } else if b == b'>' {
                        state = if pending_raw {
                            ScanState::RawText
                        } else {
                            ScanState::Text
                        };
                        pending_raw = false;
                        bound_attr = false;
                        attr_span = None;
                        i += 1;
                    } else {
                        i += 1;
                    }
                }
                ScanState::Comment => match s[i..].find("-->") {
                    Some(at) => {
                        i += at + 3;
                        state = ScanState::Text;
                    }
                    None => i = bytes.len(),
                },
                ScanState::BangTag => match bytes[i] {
                    b'>' => {
                        state = ScanState::Text;
                        i += 1;
                    }
                    _ => i += 1,
                },
                ScanState::RawText => {
                    let needle = format!("</{raw_tag}");
                    match s[i..].to_ascii_lowercase().find(&needle) {
                        Some(at) => {
                            i += at + needle.len();
                            state = ScanState::Tag;
                            raw_tag.clear();
                            name_at_end = i == bytes.len();
                        }
                        None => i = bytes.len(),
                    }
                }
            }
        }

        if last {
            html.push_str(s);
            break;
        }

        // A gap follows this fragment; join according to where we stand.
        match state {
            ScanState::Text => {
                if name_at_end {
                    return Err(Error::UnsupportedBinding(
                        "tag name position".to_string(),
                    ));
                }
                html.push_str(s);
                html.push_str("<!--");
                html.push_str(m);
                html.push_str("-->");
            }
            ScanState::Comment | ScanState::BangTag => {
                return Err(Error::UnsupportedBinding(
                    "inside a comment".to_string(),
                ));
            }
            ScanState::RawText => {
                return Err(Error::UnsupportedBinding(format!(
                    "inside raw text content of <{raw_tag}>"
                )));
            }
            ScanState::AttrValue(_) => {
                if bound_attr {
                    html.push_str(s);
                    html.push_str(m);
                } else {
                    let (start, end) = attr_span.ok_or_else(|| {
                        Error::Malformed("attribute value with no name".to_string())
                    })?;
                    attr_names.push(s[start..end].to_string());
                    html.push_str(&s[..end]);
                    html.push_str(BOUND_ATTR_SUFFIX);
                    html.push_str(&s[end..]);
                    html.push_str(m);
                    bound_attr = true;
                }
            }
            ScanState::Tag => {
                if name_at_end {
                    return Err(Error::UnsupportedBinding(
                        "tag name position".to_string(),
                    ));
                }
                if awaiting_value {
                    // Unquoted value starting with an expression.
                    let (start, end) = attr_span.ok_or_else(|| {
                        Error::Malformed("attribute value with no name".to_string())
                    })?;
                    attr_names.push(s[start..end].to_string());
                    html.push_str(&s[..end]);
                    html.push_str(BOUND_ATTR_SUFFIX);
                    html.push_str(&s[end..]);
                    html.push_str(m);
                    bound_attr = true;
                    state = ScanState::AttrValue(0);
                } else if in_name {
                    return Err(Error::UnsupportedBinding(
                        "partial attribute name".to_string(),
                    ));
                } else {
                    // Element-level binding: the marker becomes a bare
                    // attribute.
                    html.push_str(s);
                    html.push(' ');
                    html.push_str(m);
                }
            }
        }
    }

    Ok(Scanned { html, attr_names })
}

fn is_tag_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepare(statics: Statics) -> Result<Template, Error> {
        Template::prepare(TemplateKind::Html, statics, &Document::new())
    }

    #[test]
    fn child_gap_becomes_marker_comment() {
        let t = prepare(&["<p>", "</p>"]).unwrap();
        assert_eq!(t.gaps, 1);
        assert!(matches!(t.parts[0], TemplatePart::Child { index: 1 }));
    }

    #[test]
    fn attribute_gap_records_name_and_statics() {
        let t = prepare(&["<p class=\"a ", " b\">x</p>"]).unwrap();
        match &t.parts[0] {
            TemplatePart::Attribute {
                name,
                kind,
                statics,
                ..
            } => {
                assert_eq!(name, "class");
                assert_eq!(*kind, PartKind::Attribute);
                assert_eq!(statics, &["a ".to_string(), " b".to_string()]);
            }
            other => panic!("unexpected part {other:?}"),
        }
        // The rewritten attribute is gone from the prepared element.
        let p = t.fragment.first_child().unwrap();
        assert!(p.attributes().is_empty());
    }

    #[test]
    fn sigils_select_binding_kinds() {
        let t = prepare(&["<input .value=", " ?disabled=", " @input=", ">"]).unwrap();
        let kinds: Vec<_> = t
            .parts
            .iter()
            .map(|p| match p {
                TemplatePart::Attribute { kind, .. } => *kind,
                other => panic!("unexpected part {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            [PartKind::Property, PartKind::BooleanAttribute, PartKind::Event]
        );
    }

    #[test]
    fn element_binding_is_a_bare_marker_attribute() {
        let t = prepare(&["<div ", ">x</div>"]).unwrap();
        assert!(matches!(t.parts[0], TemplatePart::Element { index: 0 }));
    }

    #[test]
    fn binding_order_is_document_order() {
        let t = prepare(&["<p id=", "><span>", "</span></p><i>", "</i>"]).unwrap();
        let summary: Vec<_> = t
            .parts
            .iter()
            .map(|p| match p {
                TemplatePart::Attribute { index, .. } => ("attr", *index),
                TemplatePart::Child { index } => ("child", *index),
                TemplatePart::Element { index } => ("element", *index),
            })
            .collect();
        assert_eq!(
            summary,
            [("attr", 0), ("child", 2), ("child", 4)]
        );
    }

    #[test]
    fn raw_text_gap_is_rejected() {
        assert!(matches!(
            prepare(&["<script>", "</script>"]),
            Err(Error::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn comment_gap_is_rejected() {
        assert!(matches!(
            prepare(&["<!-- ", " -->"]),
            Err(Error::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn tag_name_gap_is_rejected() {
        assert!(matches!(
            prepare(&["<", "></div>"]),
            Err(Error::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn partial_attribute_name_gap_is_rejected() {
        assert!(matches!(
            prepare(&["<div data-", "=\"x\"></div>"]),
            Err(Error::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn multi_expression_property_is_rejected() {
        assert!(matches!(
            prepare(&["<input .value=\"a", "b\">"]),
            Err(Error::UnsupportedBinding(_))
        ));
    }

    #[test]
    fn svg_content_is_unwrapped() {
        let t = Template::prepare(
            TemplateKind::Svg,
            &["<circle r=", " />"],
            &Document::new(),
        )
        .unwrap();
        let circle = t.fragment.first_child().unwrap();
        assert_eq!(circle.tag(), "circle");
        assert!(matches!(t.parts[0], TemplatePart::Attribute { index: 0, .. }));
    }

    #[test]
    fn cache_prepares_each_call_site_once() {
        static A: &[&str] = &["<p>", "</p>"];
        let cache = TemplateCache::new();
        let r1 = TemplateResult::new(TemplateKind::Html, A, vec![Value::Int(1)]);
        let r2 = TemplateResult::new(TemplateKind::Html, A, vec![Value::Int(2)]);
        let t1 = cache.get_or_prepare(r1.kind(), r1.statics(), r1.id()).unwrap();
        let t2 = cache.get_or_prepare(r2.kind(), r2.statics(), r2.id()).unwrap();
        assert!(Rc::ptr_eq(&t1, &t2));
        assert_eq!(cache.len(), 1);
    }
}

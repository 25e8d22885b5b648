//! HTML serialization. Text and attribute values are escaped on the way out,
//! which is the containment boundary that keeps committed strings from ever
//! being re-parsed as markup.

use crate::{NodeKind, NodeRef, is_raw_text_element, is_void_element};

pub fn escape_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_attr(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
    out
}

impl NodeRef {
    /// Serialized markup of this node's children.
    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        let raw = self.is_element() && is_raw_text_element(self.tag());
        for child in self.children() {
            write_node(&child, raw, &mut out);
        }
        out
    }

    /// Serialized markup of this node, children included. Fragments
    /// serialize as their contents.
    pub fn outer_html(&self) -> String {
        let mut out = String::new();
        write_node(self, false, &mut out);
        out
    }
}

fn write_node(node: &NodeRef, raw_text: bool, out: &mut String) {
    match node.kind() {
        NodeKind::Text => {
            let data = node.data();
            if raw_text {
                out.push_str(&data);
            } else {
                out.push_str(&escape_text(&data));
            }
        }
        NodeKind::Comment => {
            out.push_str("<!--");
            out.push_str(&node.data());
            out.push_str("-->");
        }
        NodeKind::Fragment => {
            for child in node.children() {
                write_node(&child, false, out);
            }
        }
        NodeKind::Element => {
            let tag = node.tag().to_string();
            out.push('<');
            out.push_str(&tag);
            for (name, value) in node.attributes() {
                out.push(' ');
                out.push_str(&name);
                out.push_str("=\"");
                out.push_str(&escape_attr(&value));
                out.push('"');
            }
            out.push('>');
            if is_void_element(&tag) {
                return;
            }
            let raw = is_raw_text_element(&tag);
            for child in node.children() {
                write_node(&child, raw, out);
            }
            out.push_str("</");
            out.push_str(&tag);
            out.push('>');
        }
    }
}

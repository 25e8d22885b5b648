//! Hand-rolled HTML fragment parser, byte scanner style, with support for:
//! - nested elements and self-closing tags (`<input/>`), void elements
//! - attributes: double/single-quoted, unquoted and bare
//! - comments (`<!-- ... -->`), preserved verbatim
//! - raw text elements (`script`, `style`, `textarea`)
//!
//! Text is preserved exactly (no whitespace normalization): the template
//! compiler's node numbering depends on the parsed tree being stable.

use crate::{Document, NodeRef, is_raw_text_element, is_void_element};

/// Parses `input` into a fragment node owned by `doc`.
pub fn parse_fragment(doc: &Document, input: &str) -> Result<NodeRef, String> {
    let bytes = input.as_bytes();
    let mut i = 0usize;
    let fragment = doc.create_fragment();
    // Stack of open containers; the fragment sits at the bottom.
    let mut stack: Vec<NodeRef> = vec![fragment.clone()];

    while i < bytes.len() {
        if bytes[i] == b'<' {
            if input[i..].starts_with("<!--") {
                let start = i + 4;
                let Some(rel) = input[start..].find("-->") else {
                    return Err("unterminated comment".to_string());
                };
                let comment = doc.create_comment(&input[start..start + rel]);
                top(&stack).append_child(&comment);
                i = start + rel + 3;
                continue;
            }

            if i + 1 < bytes.len() && bytes[i + 1] == b'/' {
                // closing tag
                i += 2;
                let tag = read_tag_name(bytes, &mut i);
                skip_ws(bytes, &mut i);
                if i < bytes.len() && bytes[i] == b'>' {
                    i += 1;
                }
                close_tag(&mut stack, &tag);
                continue;
            }

            // opening or self-closing tag
            i += 1;
            let tag = read_tag_name(bytes, &mut i);
            if tag.is_empty() {
                // stray '<': treat it as text
                let text = doc.create_text("<");
                top(&stack).append_child(&text);
                continue;
            }
            let element = doc.create_element(&tag);
            let mut self_closing = false;

            loop {
                skip_ws(bytes, &mut i);
                if i >= bytes.len() {
                    break;
                }
                match bytes[i] {
                    b'/' => {
                        self_closing = true;
                        i += 1;
                        skip_ws(bytes, &mut i);
                        if i < bytes.len() && bytes[i] == b'>' {
                            i += 1;
                        }
                        break;
                    }
                    b'>' => {
                        i += 1;
                        break;
                    }
                    _ => {
                        if let Some((name, value)) = read_attribute(input, bytes, &mut i)? {
                            element.set_attribute(&name, &value);
                        } else {
                            i += 1;
                        }
                    }
                }
            }

            top(&stack).append_child(&element);
            if self_closing || is_void_element(&tag) {
                continue;
            }
            if is_raw_text_element(&tag) {
                // consume raw content up to the matching close tag
                let close = format!("</{}", tag.to_ascii_lowercase());
                let lower = input[i..].to_ascii_lowercase();
                let end = lower.find(&close).unwrap_or(input.len() - i);
                if end > 0 {
                    let text = doc.create_text(&input[i..i + end]);
                    element.append_child(&text);
                }
                i += end;
                if i < bytes.len() {
                    i += close.len();
                    skip_ws(bytes, &mut i);
                    if i < bytes.len() && bytes[i] == b'>' {
                        i += 1;
                    }
                }
                continue;
            }
            stack.push(element);
        } else {
            // text until the next '<'
            let start = i;
            while i < bytes.len() && bytes[i] != b'<' {
                i += 1;
            }
            let text = doc.create_text(&unescape(&input[start..i]));
            top(&stack).append_child(&text);
        }
    }

    Ok(fragment)
}

fn top(stack: &[NodeRef]) -> NodeRef {
    stack.last().cloned().expect("stack holds the fragment")
}

fn close_tag(stack: &mut Vec<NodeRef>, tag: &str) {
    // Find the nearest open element with this tag; ignore a stray close tag.
    // Children are attached as they are opened, so popping is stack-only.
    for idx in (1..stack.len()).rev() {
        if stack[idx].tag().eq_ignore_ascii_case(tag) {
            stack.truncate(idx);
            return;
        }
    }
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn read_tag_name(bytes: &[u8], i: &mut usize) -> String {
    let start = *i;
    while *i < bytes.len() {
        let c = bytes[*i];
        if c.is_ascii_alphanumeric() || c == b'-' || c == b'_' {
            *i += 1;
        } else {
            break;
        }
    }
    String::from_utf8_lossy(&bytes[start..*i]).into_owned()
}

fn is_attr_name_byte(c: u8) -> bool {
    // Bound attribute names carry sigils and marker suffixes, so the accepted
    // set is wider than plain HTML identifiers.
    c.is_ascii_alphanumeric() || matches!(c, b'-' | b'_' | b'.' | b':' | b'@' | b'?' | b'$')
}

type Attr = (String, String);

fn read_attribute(input: &str, bytes: &[u8], i: &mut usize) -> Result<Option<Attr>, String> {
    let start = *i;
    while *i < bytes.len() && is_attr_name_byte(bytes[*i]) {
        *i += 1;
    }
    if *i == start {
        return Ok(None);
    }
    let name = input[start..*i].to_string();

    skip_ws(bytes, i);
    if *i >= bytes.len() || bytes[*i] != b'=' {
        // bare attribute
        return Ok(Some((name, String::new())));
    }
    *i += 1;
    skip_ws(bytes, i);

    if *i < bytes.len() && (bytes[*i] == b'"' || bytes[*i] == b'\'') {
        let quote = bytes[*i];
        *i += 1;
        let vstart = *i;
        while *i < bytes.len() && bytes[*i] != quote {
            *i += 1;
        }
        if *i >= bytes.len() {
            return Err(format!("unterminated value for attribute '{name}'"));
        }
        let value = unescape(&input[vstart..*i]);
        *i += 1;
        Ok(Some((name, value)))
    } else {
        // unquoted value: up to whitespace, '/' or '>'
        let vstart = *i;
        while *i < bytes.len()
            && !bytes[*i].is_ascii_whitespace()
            && bytes[*i] != b'>'
            && bytes[*i] != b'/'
        {
            *i += 1;
        }
        Ok(Some((name, unescape(&input[vstart..*i]))))
    }
}

fn unescape(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let mut replaced = false;
        for (entity, ch) in [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
        ] {
            if rest.starts_with(entity) {
                out.push(ch);
                rest = &rest[entity.len()..];
                replaced = true;
                break;
            }
        }
        if !replaced {
            out.push('&');
            rest = &rest[1..];
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_simple_markup() {
        let doc = Document::new();
        let frag = parse_fragment(&doc, "<div class=\"a\">hi<br><span>x</span></div>").unwrap();
        assert_eq!(
            frag.outer_html(),
            "<div class=\"a\">hi<br><span>x</span></div>"
        );
    }

    #[test]
    fn preserves_comments_and_whitespace() {
        let doc = Document::new();
        let frag = parse_fragment(&doc, "<p> a <!--mark--> b </p>").unwrap();
        let p = frag.first_child().unwrap();
        let kids = p.children();
        assert_eq!(kids.len(), 3);
        assert!(kids[1].is_comment());
        assert_eq!(kids[1].data(), "mark");
        assert_eq!(kids[0].data(), " a ");
    }

    #[test]
    fn raw_text_content_is_not_parsed() {
        let doc = Document::new();
        let frag = parse_fragment(&doc, "<style>a > b { color: red }</style>").unwrap();
        let style = frag.first_child().unwrap();
        assert_eq!(style.child_count(), 1);
        assert_eq!(style.first_child().unwrap().data(), "a > b { color: red }");
    }

    #[test]
    fn unquoted_and_bare_attributes() {
        let doc = Document::new();
        let frag = parse_fragment(&doc, "<input disabled value=abc>").unwrap();
        let input = frag.first_child().unwrap();
        assert_eq!(input.attribute("disabled").as_deref(), Some(""));
        assert_eq!(input.attribute("value").as_deref(), Some("abc"));
        assert_eq!(input.child_count(), 0);
    }
}

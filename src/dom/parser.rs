//! DTBook / XHTML content parsing into the arena tree.

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};

use super::arena::{Dom, Element, NodeId};
use crate::config::ReaderConfig;
use crate::error::{Error, Result};
use crate::util::{local_name, resolve_entity};

/// Parse a content document into a [`Dom`].
///
/// Elements carrying `alt` without an `id` receive a generated id so that
/// they can be navigated to like any other speakable element.
pub fn parse_dtbook(content: &str, config: &ReaderConfig) -> Result<Dom> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);

    let mut dom = Dom::new();
    let mut stack: Vec<NodeId> = vec![dom.document()];

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let node = dom.create_element(element_from_start(&e));
                let parent = *stack.last().unwrap_or(&dom.document());
                dom.append(parent, node);
                stack.push(node);
            }
            Event::Empty(e) => {
                let node = dom.create_element(element_from_start(&e));
                let parent = *stack.last().unwrap_or(&dom.document());
                dom.append(parent, node);
            }
            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(Error::InvalidBook("unbalanced end tag".to_string()));
                }
                stack.pop();
            }
            Event::Text(e) => {
                if stack.len() > 1 {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let parent = *stack.last().unwrap_or(&dom.document());
                    dom.append_text(parent, &text);
                }
            }
            Event::CData(e) => {
                if stack.len() > 1 {
                    let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                    let parent = *stack.last().unwrap_or(&dom.document());
                    dom.append_text(parent, &text);
                }
            }
            Event::GeneralRef(e) => {
                if stack.len() > 1 {
                    let entity = String::from_utf8_lossy(e.as_ref());
                    if let Some(resolved) = resolve_entity(&entity) {
                        let parent = *stack.last().unwrap_or(&dom.document());
                        dom.append_text(parent, &resolved);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        return Err(Error::InvalidBook("unclosed element at end of document".to_string()));
    }

    dom.normalize_alt_ids(&config.generated_id_prefix);
    Ok(dom)
}

fn element_from_start(e: &BytesStart<'_>) -> Element {
    let name = String::from_utf8_lossy(local_name(e.name().as_ref())).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(local_name(attr.key.as_ref())).into_owned();
        let raw = String::from_utf8_lossy(attr.value.as_ref()).into_owned();
        let value = match unescape(&raw) {
            Ok(value) => value.into_owned(),
            Err(_) => raw,
        };
        attrs.push((key, value));
    }
    Element::new(name, attrs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(xml: &str) -> Dom {
        parse_dtbook(xml, &ReaderConfig::default()).unwrap()
    }

    #[test]
    fn test_parse_structure_and_attributes() {
        let dom = parse(
            r#"<?xml version="1.0" encoding="utf-8"?>
<dtbook xmlns="http://www.daisy.org/z3986/2005/dtbook/">
  <book>
    <frontmatter><doctitle id="t" smilref="a.smil#t">New Zealand</doctitle></frontmatter>
    <bodymatter>
      <level1 id="l1">
        <h1 id="h1" smilref="a.smil#h1">Geography</h1>
        <p><sent id="s1" smilref="a.smil#s1">Two <em>main</em> islands.</sent></p>
      </level1>
    </bodymatter>
  </book>
</dtbook>"#,
        );

        let s1 = dom.get_by_id("s1").unwrap();
        assert_eq!(dom.element_name(s1), Some("sent"));
        assert_eq!(dom.timing_ref(s1), Some("a.smil#s1"));
        assert_eq!(dom.text_content(s1), "Two main islands.");
        assert!(dom.is_speakable(s1));

        let title = dom.get_by_id("t").unwrap();
        assert!(!dom.is_speakable(title));

        let level = dom.get_by_id("l1").unwrap();
        assert_eq!(dom.first_speakable_descendant(level), dom.get_by_id("h1"));
    }

    #[test]
    fn test_entities_and_prefixed_names() {
        let dom = parse(r#"<dtb:p xmlns:dtb="x"><dtb:sent id="s" smilref="a#s">Fish &amp; chips&#8217;</dtb:sent></dtb:p>"#);
        let s = dom.get_by_id("s").unwrap();
        assert_eq!(dom.element_name(s), Some("sent"));
        assert_eq!(dom.text_content(s), "Fish & chips\u{2019}");
    }

    #[test]
    fn test_alt_without_id_gets_generated_id() {
        let dom = parse(
            r#"<book><imggroup><img src="a.png" alt="Mount Cook"/><img id="talkbook-alt-1" src="b.png" alt="Taken"/></imggroup></book>"#,
        );
        let generated = dom.get_by_id("talkbook-alt-2").unwrap();
        assert_eq!(dom.alt_text(generated), Some("Mount Cook"));
        assert!(dom.is_speakable(generated));
        assert_eq!(dom.alt_text(dom.get_by_id("talkbook-alt-1").unwrap()), Some("Taken"));
    }

    #[test]
    fn test_unbalanced_document_is_rejected() {
        assert!(parse_dtbook("<book><p>", &ReaderConfig::default()).is_err());
    }
}

// 🌳 XML Structural Extractor
//
// Two steps:
//   1. parse_xml: bytes → XmlElement tree (malformed input rejected here)
//   2. XmlValue::extract: element tree → nested key/value structure with
//      namespace prefixes stripped and repeated sibling tags folded into lists

use crate::error::{CatalogError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

// ============================================================================
// ELEMENT TREE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlElement {
    /// Qualified name as written (`cfdi:Emisor`)
    pub name: String,
    /// Name without namespace prefix (`Emisor`)
    pub local_name: String,
    /// Attribute local names and unescaped values, in document order
    pub attributes: Vec<(String, String)>,
    pub text: Option<String>,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| CatalogError::MalformedXml(e.to_string()))?;
            // xmlns declarations are not data
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| CatalogError::MalformedXml(e.to_string()))?
                .into_owned();
            attributes.push((key, value));
        }

        Ok(XmlElement {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            local_name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            attributes,
            text: None,
            children: Vec::new(),
        })
    }

    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match &mut self.text {
            Some(existing) => existing.push_str(text),
            None => self.text = Some(text.to_string()),
        }
    }
}

fn attach(stack: &mut Vec<XmlElement>, root: &mut Option<XmlElement>, element: XmlElement) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
        return Ok(());
    }
    if root.is_some() {
        return Err(CatalogError::MalformedXml(format!(
            "more than one root element (second root <{}>)",
            element.name
        )));
    }
    *root = Some(element);
    Ok(())
}

/// Parse a UTF-8 XML document into its root element
pub fn parse_xml(bytes: &[u8]) -> Result<XmlElement> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CatalogError::MalformedXml(format!("document is not UTF-8: {}", e)))?;
    let text = text.trim_start_matches('\u{feff}');

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                if stack.is_empty() && root.is_some() {
                    return Err(CatalogError::MalformedXml("more than one root element".to_string()));
                }
                stack.push(XmlElement::from_start(e)?);
            }
            Ok(Event::Empty(ref e)) => {
                let element = XmlElement::from_start(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CatalogError::MalformedXml("unexpected closing tag".to_string()))?;
                attach(&mut stack, &mut root, element)?;
            }
            Ok(Event::Text(ref t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| CatalogError::MalformedXml(e.to_string()))?;
                match stack.last_mut() {
                    Some(current) => current.append_text(&value),
                    None if value.trim().is_empty() => {}
                    None => {
                        return Err(CatalogError::MalformedXml(
                            "text outside the root element".to_string(),
                        ))
                    }
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(current) = stack.last_mut() {
                    current.append_text(&String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            // Declaration, comments, processing instructions, doctype
            Ok(_) => {}
            Err(e) => {
                return Err(CatalogError::MalformedXml(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    if let Some(open) = stack.last() {
        return Err(CatalogError::MalformedXml(format!("unclosed element <{}>", open.name)));
    }

    root.ok_or_else(|| CatalogError::MalformedXml("document has no root element".to_string()))
}

// ============================================================================
// STRUCTURED VALUE
// ============================================================================

/// Extracted node value. Every consumer must handle all three shapes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XmlValue {
    /// Text content of a childless, attribute-less element
    Leaf(Option<String>),
    /// Attributes and/or children keyed by local name
    Node(BTreeMap<String, XmlValue>),
    /// Every occurrence of a repeated sibling tag, in document order
    Repeated(Vec<XmlValue>),
}

impl XmlValue {
    /// Transform one element (pure, total over parsed trees)
    pub fn extract(element: &XmlElement) -> XmlValue {
        if element.children.is_empty() {
            if element.attributes.is_empty() {
                return XmlValue::Leaf(element.text.clone());
            }
            return XmlValue::Node(attribute_map(element));
        }

        let mut map = attribute_map(element);
        for child in &element.children {
            fold_into(&mut map, child.local_name.clone(), XmlValue::extract(child));
        }
        XmlValue::Node(map)
    }

    /// Transform a whole document, keyed by the root's local name
    pub fn from_document(root: &XmlElement) -> XmlValue {
        let mut map = BTreeMap::new();
        map.insert(root.local_name.clone(), XmlValue::extract(root));
        XmlValue::Node(map)
    }

    /// Child lookup; a repeated value answers for its first occurrence
    pub fn get(&self, key: &str) -> Option<&XmlValue> {
        match self {
            XmlValue::Node(map) => map.get(key),
            XmlValue::Repeated(items) => items.first().and_then(|v| v.get(key)),
            XmlValue::Leaf(_) => None,
        }
    }

    /// Follow a sequence of keys from this value
    pub fn path(&self, keys: &[&str]) -> Option<&XmlValue> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            XmlValue::Leaf(text) => text.as_deref(),
            XmlValue::Repeated(items) => items.first().and_then(XmlValue::as_text),
            XmlValue::Node(_) => None,
        }
    }

    /// Occurrences of this value: the list items, or the value itself
    pub fn occurrences(&self) -> Vec<&XmlValue> {
        match self {
            XmlValue::Repeated(items) => items.iter().collect(),
            other => vec![other],
        }
    }
}

fn attribute_map(element: &XmlElement) -> BTreeMap<String, XmlValue> {
    let mut map = BTreeMap::new();
    for (key, value) in &element.attributes {
        fold_into(&mut map, key.clone(), XmlValue::Leaf(Some(value.clone())));
    }
    map
}

fn fold_into(map: &mut BTreeMap<String, XmlValue>, key: String, value: XmlValue) {
    match map.entry(key) {
        Entry::Vacant(slot) => {
            slot.insert(value);
        }
        Entry::Occupied(mut slot) => match slot.get_mut() {
            XmlValue::Repeated(items) => items.push(value),
            existing => {
                let first = std::mem::replace(existing, XmlValue::Leaf(None));
                *existing = XmlValue::Repeated(vec![first, value]);
            }
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================

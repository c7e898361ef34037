//! XFDF interchange.
//!
//! One parser handles both full documents (`<fields>`, `<annots>`) and
//! incremental commands (`<add>`, `<modify>`, `<delete>`); `<annots>`
//! children are treated as additions. XFDF pages are 0-based, the model's
//! are 1-based.

use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use roxmltree::{Document, Node};
use tracing::warn;

use super::{Annotation, AnnotationFlag, AnnotationRef, FieldValue, FormField, Rect};
use crate::error::{BridgeError, Result};

const XFDF_NAMESPACE: &str = "http://ns.adobe.com/xfdf/";

/// Decoded XFDF payload, in document order within each section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XfdfPayload {
    pub fields: Vec<(String, FieldValue)>,
    pub add: Vec<Annotation>,
    pub modify: Vec<Annotation>,
    pub delete: Vec<AnnotationRef>,
}

impl XfdfPayload {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.add.is_empty()
            && self.modify.is_empty()
            && self.delete.is_empty()
    }
}

fn malformed(reason: impl Into<String>) -> BridgeError {
    BridgeError::invalid_argument("xfdf", reason)
}

pub fn parse(xfdf: &str) -> Result<XfdfPayload> {
    let document = Document::parse(xfdf).map_err(|err| malformed(err.to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "xfdf" {
        return Err(malformed(format!(
            "expected <xfdf> root, found <{}>",
            root.tag_name().name()
        )));
    }

    let source = document.input_text();
    let mut payload = XfdfPayload::default();
    for section in root.children().filter(Node::is_element) {
        match section.tag_name().name() {
            "fields" => collect_fields(section, None, &mut payload.fields)?,
            "annots" | "add" => {
                for node in section.children().filter(Node::is_element) {
                    payload.add.push(parse_annotation(node, source)?);
                }
            }
            "modify" => {
                for node in section.children().filter(Node::is_element) {
                    payload.modify.push(parse_annotation(node, source)?);
                }
            }
            "delete" => {
                for node in section.children().filter(Node::is_element) {
                    payload.delete.push(parse_delete(node)?);
                }
            }
            _ => {}
        }
    }
    Ok(payload)
}

fn collect_fields(
    node: Node<'_, '_>,
    prefix: Option<&str>,
    out: &mut Vec<(String, FieldValue)>,
) -> Result<()> {
    for field in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "field")
    {
        let local = field
            .attribute("name")
            .ok_or_else(|| malformed("<field> without a name"))?;
        let name = match prefix {
            Some(prefix) => format!("{prefix}.{local}"),
            None => local.to_string(),
        };
        if let Some(value) = field
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "value")
        {
            out.push((name.clone(), FieldValue::from_xfdf(value.text().unwrap_or(""))));
        }
        collect_fields(field, Some(&name), out)?;
    }
    Ok(())
}

fn parse_annotation(node: Node<'_, '_>, source: &str) -> Result<Annotation> {
    let subtype = node.tag_name().name();
    let id = node
        .attribute("name")
        .ok_or_else(|| malformed(format!("<{subtype}> without a name")))?;
    let page = parse_page(node, id)?;
    let rect = match node.attribute("rect") {
        Some(raw) => {
            parse_rect(raw).ok_or_else(|| malformed(format!("bad rect `{raw}` on {id}")))?
        }
        None => Rect::default(),
    };

    let mut annotation = Annotation::new(id, subtype, page, rect);
    for attribute in node.attributes() {
        let value = attribute.value();
        match attribute.name() {
            "name" | "page" | "rect" => {}
            "flags" => {
                for flag in value.split(',').map(str::trim).filter(|f| !f.is_empty()) {
                    match flag.parse::<AnnotationFlag>() {
                        Ok(flag) => {
                            annotation.flags.insert(flag);
                        }
                        Err(_) => warn!(annotation = id, flag, "ignoring unknown annotation flag"),
                    }
                }
            }
            "color" => annotation.color = Some(value.to_string()),
            "title" => annotation.title = Some(value.to_string()),
            "subject" => annotation.subject = Some(value.to_string()),
            "field" => annotation.field = Some(value.to_string()),
            other => {
                annotation
                    .attributes
                    .insert(other.to_string(), value.to_string());
            }
        }
    }

    let mut markup = String::new();
    for child in node.children().filter(Node::is_element) {
        if child.tag_name().name() == "contents" {
            annotation.contents = Some(child.text().unwrap_or("").to_string());
        } else {
            markup.push_str(&source[child.range()]);
        }
    }
    if !markup.is_empty() {
        annotation.markup = Some(markup);
    }
    Ok(annotation)
}

fn parse_delete(node: Node<'_, '_>) -> Result<AnnotationRef> {
    let id = node
        .text()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("<delete> entry without an id"))?;
    let page_number = match node.attribute("page") {
        Some(_) => Some(parse_page(node, id)?),
        None => None,
    };
    Ok(AnnotationRef {
        id: id.to_string(),
        page_number,
    })
}

fn parse_page(node: Node<'_, '_>, id: &str) -> Result<usize> {
    let raw = node
        .attribute("page")
        .ok_or_else(|| malformed(format!("{id} has no page")))?;
    let index: usize = raw
        .trim()
        .parse()
        .map_err(|_| malformed(format!("bad page `{raw}` on {id}")))?;
    index
        .checked_add(1)
        .ok_or_else(|| malformed(format!("page `{raw}` out of range on {id}")))
}

fn parse_rect(raw: &str) -> Option<Rect> {
    let mut values = raw.split(',').map(|v| v.trim().parse::<f64>());
    let rect = Rect::new(
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
        values.next()?.ok()?,
    );
    if values.next().is_some() || !rect.is_finite() {
        return None;
    }
    Some(rect)
}

/// Serializes fields and annotations as a full XFDF document.
pub fn write_document<'a>(
    fields: impl IntoIterator<Item = &'a FormField>,
    annotations: impl IntoIterator<Item = &'a Annotation>,
) -> Result<String> {
    let bytes = write_document_inner(fields, annotations).map_err(anyhow::Error::from)?;
    let xml = String::from_utf8(bytes).map_err(anyhow::Error::from)?;
    Ok(xml)
}

fn write_document_inner<'a>(
    fields: impl IntoIterator<Item = &'a FormField>,
    annotations: impl IntoIterator<Item = &'a Annotation>,
) -> quick_xml::Result<Vec<u8>> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut root = BytesStart::new("xfdf");
    root.push_attribute(("xmlns", XFDF_NAMESPACE));
    root.push_attribute(("xml:space", "preserve"));
    writer.write_event(Event::Start(root))?;

    writer.write_event(Event::Start(BytesStart::new("fields")))?;
    for field in fields {
        let mut elem = BytesStart::new("field");
        elem.push_attribute(("name", field.name.as_str()));
        writer.write_event(Event::Start(elem))?;
        write_simple_element(&mut writer, "value", &field.value.as_xfdf())?;
        writer.write_event(Event::End(BytesEnd::new("field")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("fields")))?;

    writer.write_event(Event::Start(BytesStart::new("annots")))?;
    for annotation in annotations {
        write_annotation(&mut writer, annotation)?;
    }
    writer.write_event(Event::End(BytesEnd::new("annots")))?;

    writer.write_event(Event::End(BytesEnd::new("xfdf")))?;
    Ok(writer.into_inner().into_inner())
}

fn write_simple_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    value: &str,
) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(value)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_annotation<W: std::io::Write>(
    writer: &mut Writer<W>,
    annotation: &Annotation,
) -> quick_xml::Result<()> {
    let page_index = annotation.page.saturating_sub(1).to_string();
    let rect = annotation.rect.to_string();
    let flags = annotation
        .flags
        .iter()
        .map(|flag| flag.as_ref().to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(",");

    let mut elem = BytesStart::new(annotation.subtype.as_str());
    elem.push_attribute(("name", annotation.id.as_str()));
    elem.push_attribute(("page", page_index.as_str()));
    elem.push_attribute(("rect", rect.as_str()));
    if !flags.is_empty() {
        elem.push_attribute(("flags", flags.as_str()));
    }
    for (key, value) in [
        ("color", &annotation.color),
        ("title", &annotation.title),
        ("subject", &annotation.subject),
        ("field", &annotation.field),
    ] {
        if let Some(value) = value {
            elem.push_attribute((key, value.as_str()));
        }
    }
    for (key, value) in &annotation.attributes {
        elem.push_attribute((key.as_str(), value.as_str()));
    }

    if annotation.contents.is_none() && annotation.markup.is_none() {
        return writer.write_event(Event::Empty(elem));
    }

    writer.write_event(Event::Start(elem))?;
    if let Some(contents) = &annotation.contents {
        write_simple_element(writer, "contents", contents)?;
    }
    if let Some(markup) = &annotation.markup {
        writer.write_event(Event::Text(BytesText::from_escaped(markup.as_str())))?;
    }
    writer.write_event(Event::End(BytesEnd::new(annotation.subtype.as_str())))?;
    Ok(())
}

use xmlwriter::{Indent, Options, XmlWriter};

const SVG_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#;
const SVG_NS: &str = "http://www.w3.org/2000/svg";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";
const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// A child of an [`Element`]
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An SVG element with ordered attributes and children.
///
/// Element names carry no namespace. Attributes from the xlink and xml
/// namespaces keep their conventional prefix. Text is stored trimmed.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub name: String,
    attributes: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.children.push(Node::Text(text.into()));
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Set an attribute, keeping its position if it already exists
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    pub fn push(&mut self, child: Element) {
        self.children.push(Node::Element(child));
    }

    /// Child elements, skipping text
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Node::Element(element) => Some(element),
            Node::Text(_) => None,
        })
    }

    pub fn find(&self, name: &str) -> Option<&Element> {
        self.elements().find(|element| element.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Element> {
        self.children.iter_mut().find_map(|child| match child {
            Node::Element(element) if element.name == name => Some(element),
            _ => None,
        })
    }

    /// This element and all of its descendants in document order
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = vec![self];
        for child in self.elements() {
            out.extend(child.descendants());
        }
        out
    }

    /// Call `f` on this element, then on every descendant in document order
    pub fn visit_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Element),
    {
        f(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.visit_mut(f);
            }
        }
    }

    /// Parse an SVG document and return its root element
    pub fn parse(content: &str) -> Result<Element, roxmltree::Error> {
        let options = roxmltree::ParsingOptions {
            allow_dtd: true,
            ..roxmltree::ParsingOptions::default()
        };
        let doc = roxmltree::Document::parse_with_options(content, options)?;
        Ok(convert(doc.root_element()))
    }

    /// Serialize as a standalone SVG document
    pub fn to_svg_string(&self) -> String {
        let mut writer = create_writer();

        writer.start_element(&self.name);
        if self.attr("xmlns").is_none() {
            writer.write_attribute("xmlns", SVG_NS);
        }
        if self.attr("xmlns:xlink").is_none() {
            writer.write_attribute("xmlns:xlink", XLINK_NS);
        }
        write_contents(&mut writer, self);
        writer.end_element();

        let mut result = SVG_HEADER.to_string();
        result.push('\n');
        result.push_str(&writer.end_document());
        result
    }
}

fn convert(node: roxmltree::Node<'_, '_>) -> Element {
    let mut element = Element::new(node.tag_name().name());

    for attr in node.attributes() {
        let name = match attr.namespace() {
            None => attr.name().to_string(),
            Some(XLINK_NS) => format!("xlink:{}", attr.name()),
            Some(XML_NS) => format!("xml:{}", attr.name()),
            // inkscape:, sodipodi: and friends
            Some(_) => continue,
        };
        element.attributes.push((name, attr.value().to_string()));
    }

    for child in node.children() {
        if child.is_element() {
            element.children.push(Node::Element(convert(child)));
        } else if child.is_text() {
            if let Some(text) = child.text().map(str::trim) {
                if !text.is_empty() {
                    element.children.push(Node::Text(text.to_string()));
                }
            }
        }
    }

    element
}

fn write_contents(writer: &mut XmlWriter, element: &Element) {
    for (name, value) in &element.attributes {
        writer.write_attribute(name, value);
    }
    for child in &element.children {
        match child {
            Node::Element(child) => {
                writer.start_element(&child.name);
                write_contents(writer, child);
                writer.end_element();
            }
            Node::Text(text) => writer.write_text(text),
        }
    }
}

fn create_writer() -> XmlWriter {
    XmlWriter::new(Options {
        use_single_quote: false,
        indent: Indent::Spaces(2),
        attributes_indent: Indent::None,
    })
}

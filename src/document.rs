//! Generic node tree of the canonical text form.
//!
//! A [`Node`] knows nothing about element kinds; the element model in
//! [`crate::element`] gives nodes their meaning. Rendering is canonical:
//! `parse(render(n)) == n` for every parsed node.

use indexmap::IndexMap;
use pest::Parser;
use pest::iterators::Pair;
use pest_derive::Parser;

use std::fmt;
use std::path::PathBuf;

use crate::error::{Result, SeedlingError};

#[derive(Parser)]
#[grammar = "document.pest"]
struct DocumentParser;

const INDENT: &str = "  ";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Node {
    pub name: String,
    pub attributes: IndexMap<String, String>,
    /// Text content. Nodes with children keep only non-blank text, trimmed.
    pub text: String,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn parse(text: &str) -> Result<Node> {
        let mut pairs = DocumentParser::parse(Rule::document, text).map_err(|e| {
            let (line, col) = match e.line_col {
                pest::error::LineColLocation::Pos(pos) => pos,
                pest::error::LineColLocation::Span(start, _) => start,
            };
            SeedlingError::Syntax {
                message: e.variant.message().to_string(),
                line,
                col,
            }
        })?;
        let root = pairs
            .next()
            .and_then(|document| document.into_inner().find(|p| p.as_rule() == Rule::element))
            .ok_or_else(|| SeedlingError::Syntax {
                message: "document has no root element".into(),
                line: 1,
                col: 1,
            })?;
        build_node(root)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out, 0);
        out.truncate(out.trim_end().len());
        out
    }
    fn render_into(&self, out: &mut String, depth: usize) {
        let indent = INDENT.repeat(depth);
        out.push_str(&indent);
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", name, escape(value, true)));
        }
        if self.children.is_empty() {
            if self.text.is_empty() {
                out.push_str(" />\n");
            } else {
                out.push_str(&format!(">{}</{}>\n", escape(&self.text, false), self.name));
            }
            return;
        }
        out.push_str(">\n");
        if !self.text.is_empty() {
            out.push_str(&format!("{indent}{INDENT}{}\n", escape(&self.text, false)));
        }
        for child in &self.children {
            child.render_into(out, depth + 1);
        }
        out.push_str(&format!("{indent}</{}>\n", self.name));
    }
}
impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

fn build_node(pair: Pair<'_, Rule>) -> Result<Node> {
    let mut inner = pair.into_inner();
    let mut node = Node::new(inner.next().map(|p| p.as_str()).unwrap_or_default());
    for part in inner {
        match part.as_rule() {
            Rule::attribute => {
                let (line, col) = part.as_span().start_pos().line_col();
                let mut fields = part.into_inner();
                let name = fields.next().map(|p| p.as_str().to_string()).unwrap_or_default();
                let value = fields.next().map(|p| unescape(p.as_str())).unwrap_or_default();
                if node.attributes.insert(name.clone(), value).is_some() {
                    return Err(SeedlingError::Syntax {
                        message: format!("duplicate attribute '{name}'"),
                        line,
                        col,
                    });
                }
            }
            Rule::element => node.children.push(build_node(part)?),
            Rule::text => node.text.push_str(&unescape(part.as_str())),
            Rule::cdata => {
                if let Some(raw) = part.into_inner().next() {
                    node.text.push_str(raw.as_str());
                }
            }
            _ => {}
        }
    }
    if !node.children.is_empty() {
        node.text = node.text.trim().to_string();
    }
    Ok(node)
}

fn escape(text: &str, attribute: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Decodes the predefined entities and numeric character references.
/// Anything unrecognised is kept literally.
fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest.find(';').and_then(|end| {
            let entity = &rest[1..end];
            let c = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                _ => entity
                    .strip_prefix("#x")
                    .or_else(|| entity.strip_prefix("#X"))
                    .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                    .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                    .and_then(char::from_u32),
            };
            c.map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &rest[end + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Supplies the document to build.
pub trait DocumentSource {
    fn load(&self) -> Result<Node>;
}

pub struct TextSource(pub String);
impl DocumentSource for TextSource {
    fn load(&self) -> Result<Node> {
        Node::parse(&self.0)
    }
}

pub struct FileSource(pub PathBuf);
impl DocumentSource for FileSource {
    fn load(&self) -> Result<Node> {
        Node::parse(&std::fs::read_to_string(&self.0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_attributes_text_and_children() {
        let node = Node::parse(
            r#"<?xml version="1.0"?>
            <!-- header -->
            <data-config namespace='Shop'>
                <entity class="Customer" ref="c1">
                    <property name="Name">Tom &amp; Jerry</property>
                    <property name="Note"><![CDATA[<b>bold</b>]]></property>
                </entity>
                <folder />
            </data-config>"#,
        )
        .unwrap();
        assert_eq!(node.name, "data-config");
        assert_eq!(node.attribute("namespace"), Some("Shop"));
        assert_eq!(node.text, "");
        assert_eq!(node.children.len(), 2);
        let entity = &node.children[0];
        assert_eq!(entity.children[0].text, "Tom & Jerry");
        assert_eq!(entity.children[1].text, "<b>bold</b>");
        assert_eq!(node.children[1], Node::new("folder"));
    }

    #[test]
    fn render_is_stable() {
        let node = Node::new("entity")
            .with_attribute("class", "Quote\"d")
            .with_child(Node::new("property").with_attribute("name", "A").with_text(" a < b "))
            .with_child(Node::new("property").with_attribute("name", "B"));
        let text = node.render();
        assert_eq!(
            text,
            "<entity class=\"Quote&quot;d\">\n  <property name=\"A\"> a &lt; b </property>\n  <property name=\"B\" />\n</entity>"
        );
        let parsed = Node::parse(&text).unwrap();
        assert_eq!(parsed, node);
        assert_eq!(parsed.render(), text);
    }

    #[test]
    fn mismatched_tags_report_position() {
        let err = Node::parse("<a>\n  <b></c>\n</a>").unwrap_err();
        match err {
            SeedlingError::Syntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn numeric_references_decode() {
        assert_eq!(unescape("&#65;&#x42;&unknown;&"), "AB&unknown;&");
    }
}

//! Prompt templates.
//!
//! Syntax is intentionally small:
//!
//! - `{{name}}` / `{{story.title}}` substitutes a field of the data record.
//!   Strings are inserted verbatim, scalars via `to_string`, sequences and
//!   mappings as YAML.
//! - `{{#if name}} … {{/if}}` keeps the block when the field is present and
//!   non-empty (not null, `false`, `""`, `[]` or `{}`). Blocks nest.
//! - `{{reference}}` is reserved for the optional reference document.

use crate::error::{Error, ErrorKind, Result, ResultExt};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const REFERENCE_KEY: &str = "reference";

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var(String),
    If { name: String, body: Vec<Node> },
}

/// A parsed template.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::template(format!(
                "template not found: {}",
                path.display()
            )));
        }
        let source = std::fs::read_to_string(path)
            .or_kind(ErrorKind::Template, || format!("read template {}", path.display()))?;
        Self::parse(&path.display().to_string(), &source)
    }

    pub fn parse(name: &str, source: &str) -> Result<Self> {
        let mut rest = source;
        let nodes = parse_nodes(name, &mut rest, None)?;
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    /// Render with `data` (any `Serialize` record that serializes to a map).
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.render_with_reference(data, None)
    }

    pub fn render_with_reference<T: Serialize>(
        &self,
        data: &T,
        reference: Option<&str>,
    ) -> Result<String> {
        let mut root = serde_json::to_value(data)
            .or_kind(ErrorKind::Template, || format!("serialize data for {}", self.name))?;
        match &mut root {
            Value::Object(map) => {
                if let Some(doc) = reference {
                    map.insert(REFERENCE_KEY.to_string(), Value::String(doc.to_string()));
                }
            }
            Value::Null => {
                let mut map = serde_json::Map::new();
                if let Some(doc) = reference {
                    map.insert(REFERENCE_KEY.to_string(), Value::String(doc.to_string()));
                }
                root = Value::Object(map);
            }
            _ => {
                return Err(Error::template(format!(
                    "execute {}: template data must be a mapping",
                    self.name
                )))
            }
        }
        let mut out = String::new();
        render_nodes(&self.name, &self.nodes, &root, &mut out)?;
        Ok(out)
    }
}

fn parse_nodes(name: &str, rest: &mut &str, open_if: Option<&str>) -> Result<Vec<Node>> {
    let mut nodes = Vec::new();
    loop {
        let Some(start) = rest.find("{{") else {
            if let Some(cond) = open_if {
                return Err(Error::template(format!(
                    "parse {name}: unclosed {{{{#if {cond}}}}}"
                )));
            }
            if !rest.is_empty() {
                nodes.push(Node::Text(rest.to_string()));
            }
            *rest = "";
            return Ok(nodes);
        };
        if start > 0 {
            nodes.push(Node::Text(rest[..start].to_string()));
        }
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err(Error::template(format!("parse {name}: unterminated '{{{{'")));
        };
        let tag = after[..end].trim();
        *rest = &after[end + 2..];

        if let Some(cond) = tag.strip_prefix("#if") {
            let cond = cond.trim();
            if cond.is_empty() {
                return Err(Error::template(format!("parse {name}: #if without a field")));
            }
            let body = parse_nodes(name, rest, Some(cond))?;
            nodes.push(Node::If {
                name: cond.to_string(),
                body,
            });
        } else if tag == "/if" {
            if open_if.is_none() {
                return Err(Error::template(format!("parse {name}: unexpected {{{{/if}}}}")));
            }
            return Ok(nodes);
        } else if tag.is_empty() || tag.contains(char::is_whitespace) {
            return Err(Error::template(format!("parse {name}: invalid tag '{tag}'")));
        } else {
            nodes.push(Node::Var(tag.to_string()));
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |cur, key| match cur {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Number(_)) => true,
    }
}

fn render_value(value: &Value) -> Result<String> {
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => serde_yaml::to_string(value)
            .or_kind(ErrorKind::Template, || "render value as yaml".to_string())?
            .trim_end()
            .to_string(),
    })
}

fn render_nodes(name: &str, nodes: &[Node], root: &Value, out: &mut String) -> Result<()> {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Var(path) => {
                let value = lookup(root, path).ok_or_else(|| {
                    Error::template(format!("execute {name}: unknown placeholder '{path}'"))
                })?;
                out.push_str(&render_value(value)?);
            }
            Node::If { name: cond, body } => {
                if truthy(lookup(root, cond)) {
                    render_nodes(name, body, root, out)?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Renders one prompt from a template file plus an optional reference
/// document file injected under `{{reference}}`.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: PathBuf,
    reference: Option<PathBuf>,
}

impl PromptBuilder {
    pub fn new(template: impl Into<PathBuf>) -> Self {
        Self {
            template: template.into(),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<PathBuf>) -> Self {
        self.reference = reference;
        self
    }

    pub fn build<T: Serialize>(&self, data: &T) -> Result<String> {
        let template = Template::load(&self.template)?;
        let reference = match &self.reference {
            Some(path) => Some(std::fs::read_to_string(path).or_kind(ErrorKind::Template, || {
                format!("reference document not found: {}", path.display())
            })?),
            None => None,
        };
        template.render_with_reference(data, reference.as_deref())
    }
}

/// Render an optional system template; unconfigured means an empty prompt.
pub fn build_optional<T: Serialize>(path: Option<&Path>, data: &T) -> Result<String> {
    match path {
        Some(p) => PromptBuilder::new(p).build(data),
        None => Ok(String::new()),
    }
}

//! The generic document tree consumed and produced by the evaluator.
//!
//! A `Node` is what a document reader hands over: scalars, ordered
//! sequences, ordered mappings with text keys, and tagged nodes such as
//! `!func`. Output trees never contain tags.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::YamletError;
use crate::value::Value;

pub const FUNC_TAG: &str = "!func";
pub const EXPR_TAG: &str = "!expr";

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// A plain scalar. Evaluated when wrapped in parentheses.
    Text(String),
    /// A quoted or block scalar. Always literal text.
    Quoted(String),
    Sequence(Vec<Node>),
    Mapping(IndexMap<String, Node>),
    Tagged { tag: String, value: Box<Node> },
}

impl Node {
    pub fn text(value: impl Into<String>) -> Self {
        Node::Text(value.into())
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(text) | Node::Quoted(text) => Some(text),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Int(_) => "int",
            Node::Float(_) => "float",
            Node::Text(_) | Node::Quoted(_) => "text",
            Node::Sequence(_) => "sequence",
            Node::Mapping(_) => "mapping",
            Node::Tagged { .. } => "tagged node",
        }
    }
}

impl TryFrom<Value> for Node {
    type Error = YamletError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Ok(match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Int(n) => Node::Int(n),
            Value::Float(n) => Node::Float(n),
            Value::Text(s) => Node::Text(s),
            Value::Sequence(values) => Node::Sequence(
                values
                    .into_iter()
                    .map(Node::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Mapping(fields) => Node::Mapping(
                Rc::try_unwrap(fields)
                    .unwrap_or_else(|shared| (*shared).clone())
                    .into_iter()
                    .map(|(key, value)| Ok((key, Node::try_from(value)?)))
                    .collect::<Result<_, YamletError>>()?,
            ),
            Value::Function(func) => {
                return Err(YamletError::Type(format!(
                    "function `{}` cannot be written into a document; call it instead",
                    func.name
                )))
            }
        })
    }
}

//! Turning paths into document trees.
//!
//! The evaluator never touches the filesystem or a YAML parser directly; it
//! goes through a [`DocumentReader`]. [`FsReader`] is the real thing,
//! [`MemoryReader`] serves documents from a map and counts reads.

use std::{
    cell::RefCell,
    collections::HashMap,
    fs,
    path::{Component, Path, PathBuf},
};

use indexmap::IndexMap;
use yaml_rust2::{
    parser::{Event, MarkedEventReceiver, Parser, Tag},
    scanner::{Marker, TScalarStyle},
};

use crate::{
    error::{YamletError, YamletResult},
    tree::{Node, EXPR_TAG},
};

pub trait DocumentReader {
    /// Identity of the document at `path`. Two paths naming the same
    /// document must canonicalize to the same value.
    fn canonicalize(&self, path: &Path) -> YamletResult<PathBuf>;

    /// Parses the document at an already canonical `path`.
    fn read(&self, path: &Path) -> YamletResult<Node>;

    /// Canonical path of import `target` as written in `importer`.
    fn resolve(&self, importer: &Path, target: &str) -> YamletResult<PathBuf> {
        let base = importer.parent().unwrap_or_else(|| Path::new(""));
        self.canonicalize(&base.join(target))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FsReader;

impl FsReader {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentReader for FsReader {
    fn canonicalize(&self, path: &Path) -> YamletResult<PathBuf> {
        fs::canonicalize(path).map_err(|err| {
            YamletError::ImportNotFound(format!("{}: {}", path.display(), err))
        })
    }

    fn read(&self, path: &Path) -> YamletResult<Node> {
        let source = fs::read_to_string(path).map_err(|source| YamletError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse_yaml(path, &source)
    }
}

/// Documents held in memory, keyed by lexically normalized path.
#[derive(Debug, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, String>,
    reads: RefCell<HashMap<PathBuf, usize>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        self.insert(path, source);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, source: impl Into<String>) {
        self.files.insert(normalize(&path.into()), source.into());
    }

    /// How many times the document at `path` has been read.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.reads
            .borrow()
            .get(&normalize(path.as_ref()))
            .copied()
            .unwrap_or(0)
    }
}

impl DocumentReader for MemoryReader {
    fn canonicalize(&self, path: &Path) -> YamletResult<PathBuf> {
        let normalized = normalize(path);
        if self.files.contains_key(&normalized) {
            Ok(normalized)
        } else {
            Err(YamletError::ImportNotFound(format!(
                "{}: no such document",
                path.display()
            )))
        }
    }

    fn read(&self, path: &Path) -> YamletResult<Node> {
        let source = self.files.get(path).ok_or_else(|| {
            YamletError::ImportNotFound(format!("{}: no such document", path.display()))
        })?;
        *self.reads.borrow_mut().entry(path.to_path_buf()).or_insert(0) += 1;
        parse_yaml(path, source)
    }
}

/// Drops `.` components and folds `..` into the preceding component.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push("..");
                }
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

const CORE_SCHEMA: &str = "tag:yaml.org,2002:";

/// Parses YAML text into a document tree, keeping mapping order, tags, and
/// the difference between plain and quoted scalars. Only plain scalars can
/// become expressions; `"(see below)"` stays text.
pub fn parse_yaml(path: &Path, source: &str) -> YamletResult<Node> {
    let mut builder = TreeBuilder::new(path);
    Parser::new_from_str(source)
        .load(&mut builder, false)
        .map_err(|err| YamletError::Yaml {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    builder.finish()
}

enum Frame {
    Sequence {
        items: Vec<Node>,
        tag: Option<String>,
        anchor: usize,
    },
    Mapping {
        entries: IndexMap<String, Node>,
        key: Option<String>,
        tag: Option<String>,
        anchor: usize,
    },
}

/// Assembles parser events into a [`Node`]. The first error wins; later
/// events are ignored.
struct TreeBuilder<'p> {
    path: &'p Path,
    stack: Vec<Frame>,
    anchors: HashMap<usize, Node>,
    root: Option<Node>,
    error: Option<YamletError>,
}

impl<'p> TreeBuilder<'p> {
    fn new(path: &'p Path) -> Self {
        Self {
            path,
            stack: Vec::new(),
            anchors: HashMap::new(),
            root: None,
            error: None,
        }
    }

    fn finish(self) -> YamletResult<Node> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.root.unwrap_or(Node::Null)),
        }
    }

    fn invalid(&self, mark: Marker, message: impl Into<String>) -> YamletError {
        YamletError::document(
            self.path,
            format!("line {}: {}", mark.line(), message.into()),
        )
    }

    fn expects_key(&self) -> bool {
        matches!(self.stack.last(), Some(Frame::Mapping { key: None, .. }))
    }

    fn handle(&mut self, event: Event, mark: Marker) -> YamletResult<()> {
        match event {
            Event::Scalar(value, style, anchor, tag) => {
                if self.expects_key() {
                    if anchor != 0 {
                        self.anchors.insert(anchor, Node::Text(value.clone()));
                    }
                    return self.set_key(value);
                }
                let node = scalar(value, style, tag.as_ref());
                self.complete(node, anchor, mark)
            }
            Event::SequenceStart(anchor, tag) => {
                if self.expects_key() {
                    return Err(self.invalid(mark, "mapping keys must be scalars, found a sequence"));
                }
                self.stack.push(Frame::Sequence {
                    items: Vec::new(),
                    tag: tag.as_ref().map(tag_name),
                    anchor,
                });
                Ok(())
            }
            Event::MappingStart(anchor, tag) => {
                if self.expects_key() {
                    return Err(self.invalid(mark, "mapping keys must be scalars, found a mapping"));
                }
                self.stack.push(Frame::Mapping {
                    entries: IndexMap::new(),
                    key: None,
                    tag: tag.as_ref().map(tag_name),
                    anchor,
                });
                Ok(())
            }
            Event::SequenceEnd | Event::MappingEnd => {
                let (node, tag, anchor) = match self.stack.pop() {
                    Some(Frame::Sequence { items, tag, anchor }) => {
                        (Node::Sequence(items), tag, anchor)
                    }
                    Some(Frame::Mapping {
                        entries,
                        tag,
                        anchor,
                        ..
                    }) => (Node::Mapping(entries), tag, anchor),
                    None => return Ok(()),
                };
                self.complete(tagged(node, tag), anchor, mark)
            }
            Event::Alias(id) => {
                let node = self
                    .anchors
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| self.invalid(mark, "alias refers to an unknown anchor"))?;
                if self.expects_key() {
                    return match node.as_text() {
                        Some(text) => self.set_key(text.to_string()),
                        None => Err(self.invalid(mark, "mapping keys must be scalars")),
                    };
                }
                self.complete(node, 0, mark)
            }
            _ => Ok(()),
        }
    }

    fn set_key(&mut self, text: String) -> YamletResult<()> {
        if let Some(Frame::Mapping { key, .. }) = self.stack.last_mut() {
            *key = Some(text);
        }
        Ok(())
    }

    /// Hands a finished node to its parent, or makes it the root.
    fn complete(&mut self, node: Node, anchor: usize, mark: Marker) -> YamletResult<()> {
        if anchor != 0 {
            self.anchors.insert(anchor, node.clone());
        }
        let duplicate = match self.stack.last_mut() {
            None => {
                self.root.get_or_insert(node);
                None
            }
            Some(Frame::Sequence { items, .. }) => {
                items.push(node);
                None
            }
            Some(Frame::Mapping { entries, key, .. }) => match key.take() {
                Some(key) if entries.contains_key(&key) => Some(key),
                Some(key) => {
                    entries.insert(key, node);
                    None
                }
                None => None,
            },
        };
        match duplicate {
            Some(key) => Err(self.invalid(mark, format!("duplicate mapping key `{}`", key))),
            None => Ok(()),
        }
    }
}

impl MarkedEventReceiver for TreeBuilder<'_> {
    fn on_event(&mut self, event: Event, mark: Marker) {
        if self.error.is_some() {
            return;
        }
        if let Err(err) = self.handle(event, mark) {
            self.error = Some(err);
        }
    }
}

/// `!func` stays as written; `!!str` and friends resolve to the core schema.
fn tag_name(tag: &Tag) -> String {
    if tag.handle == "!!" {
        format!("{}{}", CORE_SCHEMA, tag.suffix)
    } else {
        format!("{}{}", tag.handle, tag.suffix)
    }
}

fn tagged(node: Node, tag: Option<String>) -> Node {
    match tag {
        Some(tag) if !tag.starts_with(CORE_SCHEMA) => Node::Tagged {
            tag,
            value: Box::new(node),
        },
        _ => node,
    }
}

fn scalar(value: String, style: TScalarStyle, tag: Option<&Tag>) -> Node {
    let plain = matches!(style, TScalarStyle::Plain);
    let Some(tag) = tag.map(tag_name) else {
        return if plain {
            resolve_plain(value)
        } else {
            Node::Quoted(value)
        };
    };

    if let Some(core) = tag.strip_prefix(CORE_SCHEMA) {
        return if core == "str" {
            Node::Quoted(value)
        } else {
            resolve_plain(value)
        };
    }
    let value = if !plain {
        Node::Quoted(value)
    } else if tag == EXPR_TAG {
        Node::Text(value)
    } else {
        resolve_plain(value)
    };
    Node::Tagged {
        tag,
        value: Box::new(value),
    }
}

/// YAML 1.2 core schema resolution of a plain scalar.
fn resolve_plain(text: String) -> Node {
    match text.as_str() {
        "" | "~" | "null" | "Null" | "NULL" => return Node::Null,
        "true" | "True" | "TRUE" => return Node::Bool(true),
        "false" | "False" | "FALSE" => return Node::Bool(false),
        ".inf" | ".Inf" | ".INF" | "+.inf" | "+.Inf" | "+.INF" => {
            return Node::Float(f64::INFINITY)
        }
        "-.inf" | "-.Inf" | "-.INF" => return Node::Float(f64::NEG_INFINITY),
        ".nan" | ".NaN" | ".NAN" => return Node::Float(f64::NAN),
        _ => {}
    }
    if let Some(int) = parse_int(&text) {
        return Node::Int(int);
    }
    let numeric = text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'));
    match text.parse::<f64>() {
        Ok(float) if numeric => Node::Float(float),
        _ => Node::Text(text),
    }
}

/// Decimal, `0x` hex or `0o` octal. `None` when out of `i64` range.
fn parse_int(text: &str) -> Option<i64> {
    let (negative, unsigned) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let (radix, digits) = if let Some(hex) = unsigned.strip_prefix("0x") {
        (16, hex)
    } else if let Some(octal) = unsigned.strip_prefix("0o") {
        (8, octal)
    } else {
        (10, unsigned)
    };
    if digits.is_empty() || !digits.chars().all(|ch| ch.is_digit(radix)) {
        return None;
    }
    let magnitude = i128::from_str_radix(digits, radix).ok()?;
    i64::try_from(if negative { -magnitude } else { magnitude }).ok()
}

/// Renders an output tree as YAML text.
pub fn to_yaml_string(node: &Node) -> YamletResult<String> {
    serde_yaml::to_string(&to_yaml(node)).map_err(|err| YamletError::Yaml {
        path: PathBuf::from("<output>"),
        message: err.to_string(),
    })
}

fn to_yaml(node: &Node) -> serde_yaml::Value {
    use serde_yaml::Value as Yaml;

    match node {
        Node::Null => Yaml::Null,
        Node::Bool(b) => Yaml::Bool(*b),
        Node::Int(n) => Yaml::Number((*n).into()),
        Node::Float(n) => Yaml::Number((*n).into()),
        Node::Text(s) | Node::Quoted(s) => Yaml::String(s.clone()),
        Node::Sequence(items) => Yaml::Sequence(items.iter().map(to_yaml).collect()),
        Node::Mapping(entries) => Yaml::Mapping(
            entries
                .iter()
                .map(|(key, value)| (Yaml::String(key.clone()), to_yaml(value)))
                .collect(),
        ),
        // Evaluated trees carry no tags.
        Node::Tagged { value, .. } => to_yaml(value),
    }
}

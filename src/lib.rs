//! Yamlet: expressions and cross-document functions embedded in YAML.
//!
//! A scalar wrapped in one pair of parentheses, like `(base + 2)`, is an
//! expression. Everything else in a document is plain data. Documents
//! import each other by path and share what they list under `exports`.

pub mod ast;
pub mod document;
pub mod error;
pub mod interpreter;
pub mod lexer;
pub mod module;
pub mod parser;
pub mod reader;
pub mod tree;
pub mod value;

use std::path::Path;

pub use document::Document;
pub use error::{ErrorKind, Location, YamletError, YamletResult};
pub use interpreter::{Environment, Interpreter};
pub use module::{ModuleId, ModuleTable};
pub use reader::{parse_yaml, to_yaml_string, DocumentReader, FsReader, MemoryReader};
pub use tree::Node;
pub use value::{FunctionValue, Namespace, Value};

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct Options {
    /// Nested function calls allowed before evaluation gives up.
    pub max_call_depth: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

/// Evaluates the document at `path` on the local filesystem and returns its
/// `result` tree.
pub fn execute(path: impl AsRef<Path>, options: &Options) -> YamletResult<Node> {
    execute_with(&FsReader::new(), path.as_ref(), options)
}

pub fn execute_with(
    reader: &dyn DocumentReader,
    path: &Path,
    options: &Options,
) -> YamletResult<Node> {
    let mut interpreter = Interpreter::new(reader, options.clone());
    let root = interpreter.load_file(path)?;
    interpreter.evaluate_document(root)
}

/// Evaluates YAML `source` as if it were the document at `path`. Imports
/// resolve against the directory of `path` on the local filesystem.
pub fn execute_source(path: impl AsRef<Path>, source: &str, options: &Options) -> YamletResult<Node> {
    let path = path.as_ref();
    let tree = parse_yaml(path, source)?;
    evaluate_tree(&FsReader::new(), path, tree, options)
}

/// Evaluates an already parsed tree standing in for the document at `path`.
pub fn evaluate_tree(
    reader: &dyn DocumentReader,
    path: &Path,
    tree: Node,
    options: &Options,
) -> YamletResult<Node> {
    let mut interpreter = Interpreter::new(reader, options.clone());
    let root = interpreter.load_tree(path, tree)?;
    interpreter.evaluate_document(root)
}

/// [`execute`], rendered back to YAML text.
pub fn execute_to_string(path: impl AsRef<Path>, options: &Options) -> YamletResult<String> {
    to_yaml_string(&execute(path, options)?)
}

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Where an error surfaced: the document being evaluated and, when known,
/// the expression text that was being evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub document: PathBuf,
    pub expression: Option<String>,
}

impl Location {
    pub fn new(document: impl Into<PathBuf>) -> Self {
        Self {
            document: document.into(),
            expression: None,
        }
    }

    pub fn with_expression(document: impl Into<PathBuf>, expression: impl Into<String>) -> Self {
        Self {
            document: document.into(),
            expression: Some(expression.into()),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.expression {
            Some(expression) => write!(
                f,
                "in {} while evaluating `{}`",
                self.document.display(),
                expression
            ),
            None => write!(f, "in {}", self.document.display()),
        }
    }
}

/// Flat classification of a [`YamletError`], ignoring location frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Syntax,
    Name,
    Type,
    Arithmetic,
    CyclicImport,
    ImportNotFound,
    CyclicDefinition,
    RecursionLimit,
    Document,
    Io,
    Yaml,
}

#[derive(Debug, Error)]
pub enum YamletError {
    #[error("syntax error: {message} (at offset {offset})")]
    Syntax { message: String, offset: usize },

    #[error("name error: {0}")]
    Name(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("cyclic import of {} (import chain: {})", path.display(), format_chain(chain))]
    CyclicImport { path: PathBuf, chain: Vec<PathBuf> },

    #[error("import error: {0}")]
    ImportNotFound(String),

    #[error("cyclic definition: `{name}` depends on itself")]
    CyclicDefinition { name: String },

    #[error("call depth exceeded the limit of {limit} nested calls")]
    RecursionLimit { limit: usize },

    #[error("invalid document {}: {message}", path.display())]
    Document { path: PathBuf, message: String },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {message}", path.display())]
    Yaml { path: PathBuf, message: String },

    #[error("{source}\n  {location}")]
    Located {
        location: Location,
        #[source]
        source: Box<YamletError>,
    },
}

pub type YamletResult<T> = Result<T, YamletError>;

impl YamletError {
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        YamletError::Syntax {
            message: message.into(),
            offset,
        }
    }

    pub fn document(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        YamletError::Document {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Attaches a location frame. A frame identical to the outermost one is
    /// not repeated, so deep recursion through one function body reports a
    /// single frame.
    pub fn located(self, location: Location) -> Self {
        if let YamletError::Located {
            location: existing, ..
        } = &self
        {
            if *existing == location {
                return self;
            }
        }
        YamletError::Located {
            location,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            YamletError::Syntax { .. } => ErrorKind::Syntax,
            YamletError::Name(_) => ErrorKind::Name,
            YamletError::Type(_) => ErrorKind::Type,
            YamletError::Arithmetic(_) => ErrorKind::Arithmetic,
            YamletError::CyclicImport { .. } => ErrorKind::CyclicImport,
            YamletError::ImportNotFound(_) => ErrorKind::ImportNotFound,
            YamletError::CyclicDefinition { .. } => ErrorKind::CyclicDefinition,
            YamletError::RecursionLimit { .. } => ErrorKind::RecursionLimit,
            YamletError::Document { .. } => ErrorKind::Document,
            YamletError::Io { .. } => ErrorKind::Io,
            YamletError::Yaml { .. } => ErrorKind::Yaml,
            YamletError::Located { source, .. } => source.kind(),
        }
    }

    /// The innermost error, with all location frames stripped.
    pub fn root(&self) -> &YamletError {
        match self {
            YamletError::Located { source, .. } => source.root(),
            other => other,
        }
    }

    /// Location frames from outermost (the top-level document) to innermost.
    pub fn locations(&self) -> Vec<&Location> {
        let mut frames = Vec::new();
        let mut current = self;
        while let YamletError::Located { location, source } = current {
            frames.push(location);
            current = source;
        }
        frames
    }
}

fn format_chain(chain: &[PathBuf]) -> String {
    chain
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_looks_through_location_frames() {
        let err = YamletError::Name("name `x` is not defined".to_string())
            .located(Location::with_expression("inner.yaml", "x + 1"))
            .located(Location::with_expression("outer.yaml", "inner.f(1)"));
        assert_eq!(err.kind(), ErrorKind::Name);
        assert_eq!(err.locations().len(), 2);
        assert!(matches!(err.root(), YamletError::Name(_)));
    }

    #[test]
    fn identical_frames_are_collapsed() {
        let frame = Location::with_expression("lib.yaml", "f(x)");
        let err = YamletError::RecursionLimit { limit: 4 }
            .located(frame.clone())
            .located(frame.clone())
            .located(frame);
        assert_eq!(err.locations().len(), 1);
    }

    #[test]
    fn display_includes_document_and_expression() {
        let err = YamletError::Arithmetic("division by zero".to_string())
            .located(Location::with_expression("main.yaml", "1 / 0"));
        assert_eq!(
            err.to_string(),
            "arithmetic error: division by zero\n  in main.yaml while evaluating `1 / 0`"
        );
    }

    #[test]
    fn cyclic_import_names_the_chain() {
        let err = YamletError::CyclicImport {
            path: PathBuf::from("a.yaml"),
            chain: vec![
                PathBuf::from("a.yaml"),
                PathBuf::from("b.yaml"),
                PathBuf::from("a.yaml"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "cyclic import of a.yaml (import chain: a.yaml -> b.yaml -> a.yaml)"
        );
    }
}

use std::{
    collections::HashSet,
    env, fs,
    io::Write,
    path::{Path, PathBuf},
};

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use yamlet::ast::Expression;
use yamlet::document::Document;
use yamlet::lexer::is_identifier;
use yamlet::parser::{expression_body, parse};
use yamlet::reader::{parse_yaml, DocumentReader, FsReader};
use yamlet::tree::{Node, EXPR_TAG, FUNC_TAG};

#[derive(Debug, Clone)]
pub struct LintError {
    /// Dotted key path of the offending node, e.g. `exports.add.result`.
    pub key: String,
    pub message: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// Static checks over one parsed document. Nothing is evaluated; imports
/// are only checked for existence.
pub struct Linter {
    errors: Vec<LintError>,
    declared_names: HashSet<String>,
    aliases: HashSet<String>,
    used_names: HashSet<String>,
}

impl Linter {
    pub fn new() -> Self {
        Self {
            errors: Vec::new(),
            declared_names: HashSet::new(),
            aliases: HashSet::new(),
            used_names: HashSet::new(),
        }
    }

    fn report(&mut self, key: &str, message: String, severity: Severity) {
        self.errors.push(LintError {
            key: key.to_string(),
            message,
            severity,
        });
    }

    pub fn lint(&mut self, document: &Document, reader: &dyn DocumentReader) -> Vec<LintError> {
        self.errors.clear();
        self.used_names.clear();
        self.declared_names = document.binding_names().map(str::to_string).collect();
        self.aliases = document.imports.keys().cloned().collect();

        for (alias, target) in &document.imports {
            if let Err(err) = reader.resolve(&document.path, target) {
                self.report(
                    &format!("imports.{}", alias),
                    format!("cannot resolve `{}`: {}", target, err),
                    Severity::Error,
                );
            }
        }

        for (name, node) in &document.locals {
            self.check_node(node, &format!("locals.{}", name), &[]);
        }
        for (name, node) in &document.exports {
            self.check_node(node, &format!("exports.{}", name), &[]);
        }
        if let Some(result) = &document.result {
            self.check_node(result, "result", &[]);
        }

        for alias in document.imports.keys() {
            if !self.used_names.contains(alias) {
                self.report(
                    &format!("imports.{}", alias),
                    format!("alias `{}` is never used", alias),
                    Severity::Warning,
                );
            }
        }

        self.errors.clone()
    }

    fn check_node(&mut self, node: &Node, key: &str, params: &[String]) {
        match node {
            Node::Text(text) => {
                if let Some(body) = expression_body(text) {
                    self.check_expression(body, key, params);
                }
            }
            Node::Sequence(items) => {
                for (index, item) in items.iter().enumerate() {
                    self.check_node(item, &format!("{}[{}]", key, index), params);
                }
            }
            Node::Mapping(entries) => {
                for (field, child) in entries {
                    self.check_node(child, &format!("{}.{}", key, field), params);
                }
            }
            Node::Tagged { tag, value } if tag == FUNC_TAG => self.check_function(value, key),
            Node::Tagged { tag, value } if tag == EXPR_TAG => match value.as_text() {
                Some(text) => self.check_expression(text, key, params),
                None => self.report(
                    key,
                    format!("`{}` must tag a text scalar, found {}", EXPR_TAG, value.kind_name()),
                    Severity::Error,
                ),
            },
            Node::Tagged { tag, value } => {
                self.report(
                    key,
                    format!("tag `{}` is ignored", tag),
                    Severity::Warning,
                );
                self.check_node(value, key, params);
            }
            Node::Null | Node::Bool(_) | Node::Int(_) | Node::Float(_) | Node::Quoted(_) => {}
        }
    }

    fn check_function(&mut self, node: &Node, key: &str) {
        let Some(entries) = node.as_mapping() else {
            self.report(
                key,
                format!("`{}` must tag a mapping with `params` and `result`", FUNC_TAG),
                Severity::Error,
            );
            return;
        };
        for extra in entries
            .keys()
            .filter(|field| field.as_str() != "params" && field.as_str() != "result")
        {
            self.report(key, format!("unexpected key `{}`", extra), Severity::Error);
        }

        let mut params: Vec<String> = Vec::new();
        match entries.get("params") {
            Some(Node::Sequence(items)) => {
                for item in items {
                    match item.as_text() {
                        Some(param) if is_identifier(param) => {
                            if params.iter().any(|seen| seen == param) {
                                self.report(
                                    &format!("{}.params", key),
                                    format!("parameter `{}` is declared twice", param),
                                    Severity::Error,
                                );
                            } else {
                                params.push(param.to_string());
                            }
                        }
                        _ => self.report(
                            &format!("{}.params", key),
                            format!("parameter {:?} is not a valid identifier", item),
                            Severity::Error,
                        ),
                    }
                }
            }
            Some(other) => self.report(
                &format!("{}.params", key),
                format!("`params` must be a sequence, found {}", other.kind_name()),
                Severity::Error,
            ),
            None => self.report(key, "missing `params`".to_string(), Severity::Error),
        }

        match entries.get("result") {
            Some(Node::Text(body) | Node::Quoted(body)) => {
                self.check_expression(body, &format!("{}.result", key), &params)
            }
            Some(Node::Int(_) | Node::Float(_) | Node::Bool(_)) => {}
            Some(other) => self.report(
                &format!("{}.result", key),
                format!("`result` must be an expression or a scalar, found {}", other.kind_name()),
                Severity::Error,
            ),
            None => self.report(key, "missing `result`".to_string(), Severity::Error),
        }
    }

    fn check_expression(&mut self, source: &str, key: &str, params: &[String]) {
        let expr = match parse(source) {
            Ok(expr) => expr,
            Err(err) => {
                self.report(key, err.to_string(), Severity::Error);
                return;
            }
        };

        let mut names = Vec::new();
        expr.walk(&mut |node| {
            if let Expression::Identifier(name) = node {
                names.push(name.clone());
            }
        });
        for name in names {
            self.used_names.insert(name.clone());
            let known = params.contains(&name)
                || self.declared_names.contains(&name)
                || self.aliases.contains(&name);
            if !known {
                self.report(
                    key,
                    format!("name `{}` is not defined", name),
                    Severity::Error,
                );
            }
        }
    }
}

impl Default for Linter {
    fn default() -> Self {
        Self::new()
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: yamlet-lint <file.yaml|directory>");
        eprintln!("       yamlet-lint <file.yaml>      Lint a single document");
        eprintln!("       yamlet-lint <directory>      Lint all .yaml/.yml files recursively");
        std::process::exit(1);
    }

    let path = PathBuf::from(&args[1]);

    if !path.exists() {
        eprintln!("Error: Path '{}' does not exist", path.display());
        std::process::exit(1);
    }

    let has_errors = if path.is_dir() {
        lint_directory(&path)
    } else if path.is_file() {
        lint_file(&path) > 0
    } else {
        eprintln!(
            "Error: Path '{}' is neither a file nor a directory",
            path.display()
        );
        std::process::exit(1);
    };

    if has_errors {
        std::process::exit(1);
    }
}

fn lint_file(file_path: &Path) -> usize {
    let file_path_str = file_path.to_string_lossy();
    let errors = lint_source(file_path);

    let error_count = errors
        .iter()
        .filter(|e| e.severity == Severity::Error)
        .count();

    print_file_status(&file_path_str, error_count, &errors);
    error_count
}

fn lint_source(file_path: &Path) -> Vec<LintError> {
    let fail = |message: String| {
        vec![LintError {
            key: "<document>".to_string(),
            message,
            severity: Severity::Error,
        }]
    };

    let source = match fs::read_to_string(file_path) {
        Ok(s) => s,
        Err(e) => return fail(format!("Error reading file: {}", e)),
    };
    let tree = match parse_yaml(file_path, &source) {
        Ok(tree) => tree,
        Err(e) => return fail(e.to_string()),
    };
    let document = match Document::from_node(file_path, tree) {
        Ok(document) => document,
        Err(e) => return fail(e.to_string()),
    };

    Linter::new().lint(&document, &FsReader::new())
}

fn print_file_status(file_path: &str, error_count: usize, errors: &[LintError]) {
    let mut stdout = StandardStream::stdout(ColorChoice::Auto);

    if error_count == 0 {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)));
        let _ = write!(stdout, "✓ ok ");
        let _ = stdout.reset();
        let _ = writeln!(stdout, "{}", file_path);
    } else {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
        let _ = write!(stdout, "! ");
        let _ = stdout.reset();
        let _ = writeln!(stdout, "{}", file_path);

        for error in errors.iter().filter(|e| e.severity == Severity::Error) {
            let _ = writeln!(stdout, "  {}: {}", error.key, error.message);
        }
    }

    for warning in errors.iter().filter(|e| e.severity == Severity::Warning) {
        let _ = stdout.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
        let _ = write!(stdout, "  warning ");
        let _ = stdout.reset();
        let _ = writeln!(stdout, "{}: {}", warning.key, warning.message);
    }

    let _ = stdout.reset();
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn lint_directory(dir_path: &Path) -> bool {
    let mut has_errors = false;
    let mut files_linted = 0;

    for entry in walkdir::WalkDir::new(dir_path)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if path.is_file() && is_yaml(path) {
            files_linted += 1;
            if lint_file(path) > 0 {
                has_errors = true;
            }
        }
    }

    if files_linted == 0 {
        eprintln!("No .yaml files found in {}", dir_path.display());
        return false;
    }

    has_errors
}

//! Documents and the tree walk that substitutes expression scalars.
//!
//! A document is a mapping with up to four keys:
//!
//! ```yaml
//! imports:            # alias -> path, relative to this document
//!   utils: utils.yaml
//! locals:             # names visible only inside this document
//!   base: 40
//! exports:            # names visible here and to importers
//!   answer: (base + 2)
//!   add: !func
//!     params: [x, y]
//!     result: x + y
//! result:             # the only part that is emitted
//!   total: (utils.add(answer, 1))
//! ```

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    rc::Rc,
};

use indexmap::IndexMap;

use crate::{
    ast::Expression,
    error::{Location, YamletError, YamletResult},
    interpreter::{Environment, Interpreter},
    lexer::is_identifier,
    module::{BindingState, ModuleId},
    parser::{expression_body, parse},
    tree::{Node, EXPR_TAG, FUNC_TAG},
    value::{FunctionValue, Namespace, Value},
};

pub const TOP_LEVEL_KEYS: [&str; 4] = ["imports", "locals", "exports", "result"];

#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub imports: IndexMap<String, String>,
    pub locals: IndexMap<String, Node>,
    pub exports: IndexMap<String, Node>,
    pub result: Option<Node>,
}

impl Document {
    /// Validates the top-level shape of a parsed document.
    pub fn from_node(path: &Path, root: Node) -> YamletResult<Self> {
        let mut root = match root {
            Node::Mapping(entries) => entries,
            other => {
                return Err(YamletError::document(
                    path,
                    format!("the root must be a mapping, found {}", other.kind_name()),
                ))
            }
        };

        let unknown: Vec<&str> = root
            .keys()
            .map(String::as_str)
            .filter(|key| !TOP_LEVEL_KEYS.contains(key))
            .collect();
        if !unknown.is_empty() {
            return Err(YamletError::document(
                path,
                format!(
                    "unknown top-level keys {} (expected {})",
                    quote_list(&unknown),
                    quote_list(&TOP_LEVEL_KEYS)
                ),
            ));
        }

        let imports = section(path, &mut root, "imports")?
            .into_iter()
            .map(|(alias, target)| {
                if !is_identifier(&alias) {
                    return Err(YamletError::document(
                        path,
                        format!("import alias `{}` is not a valid identifier", alias),
                    ));
                }
                match target {
                    Node::Text(target) | Node::Quoted(target) => Ok((alias, target)),
                    other => Err(YamletError::document(
                        path,
                        format!(
                            "import `{}` must be a path, found {}",
                            alias,
                            other.kind_name()
                        ),
                    )),
                }
            })
            .collect::<YamletResult<IndexMap<_, _>>>()?;
        let locals = section(path, &mut root, "locals")?;
        let exports = section(path, &mut root, "exports")?;

        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for name in imports.keys().chain(locals.keys()).chain(exports.keys()) {
            if !seen.insert(name.as_str()) {
                duplicates.push(name.as_str());
            }
        }
        if !duplicates.is_empty() {
            return Err(YamletError::document(
                path,
                format!(
                    "{} defined more than once across imports, locals and exports",
                    quote_list(&duplicates)
                ),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            imports,
            locals,
            exports,
            result: root.shift_remove("result"),
        })
    }

    /// Names of `locals` then `exports`, in declaration order.
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.locals.keys().chain(self.exports.keys()).map(String::as_str)
    }

    pub fn binding(&self, name: &str) -> Option<&Node> {
        self.locals.get(name).or_else(|| self.exports.get(name))
    }
}

/// Removes `key` from the root; a missing or null section is empty.
fn section(
    path: &Path,
    root: &mut IndexMap<String, Node>,
    key: &str,
) -> YamletResult<IndexMap<String, Node>> {
    match root.shift_remove(key) {
        None | Some(Node::Null) => Ok(IndexMap::new()),
        Some(Node::Mapping(entries)) => Ok(entries),
        Some(other) => Err(YamletError::document(
            path,
            format!("`{}` must be a mapping, found {}", key, other.kind_name()),
        )),
    }
}

fn quote_list(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("`{}`", name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl Interpreter<'_> {
    /// Evaluates the namespace of `module`, then its `result` section.
    /// A document without `result` evaluates to null.
    pub fn evaluate_document(&mut self, module: ModuleId) -> YamletResult<Node> {
        self.evaluate_namespace(module)?;
        let document = self.modules.document(module);
        let Some(result) = &document.result else {
            return Ok(Node::Null);
        };
        let value = self.transform(result, module, None)?;
        Node::try_from(value).map_err(|err| err.located(Location::new(&document.path)))
    }

    /// Forces every binding of `module` (locals, then exports) and returns
    /// the export namespace. Done at most once per module.
    pub(crate) fn evaluate_namespace(&mut self, module: ModuleId) -> YamletResult<Rc<Namespace>> {
        if let Some(namespace) = self.modules.begin_evaluation(module)? {
            return Ok(namespace);
        }
        tracing::debug!(path = %self.modules.path(module).display(), "evaluating namespace");

        match self.force_bindings(module) {
            Ok(namespace) => {
                let namespace = Rc::new(namespace);
                self.modules.finish_evaluation(module, Rc::clone(&namespace));
                tracing::debug!(
                    path = %self.modules.path(module).display(),
                    exports = namespace.len(),
                    "namespace ready"
                );
                Ok(namespace)
            }
            Err(err) => {
                self.modules.abandon_evaluation(module);
                Err(err)
            }
        }
    }

    fn force_bindings(&mut self, module: ModuleId) -> YamletResult<Namespace> {
        let document = self.modules.document(module);
        for name in document.locals.keys() {
            self.binding_value(module, name)?;
        }
        let mut namespace = Namespace::with_capacity(document.exports.len());
        for name in document.exports.keys() {
            if let Some(value) = self.binding_value(module, name)? {
                namespace.insert(name.clone(), value);
            }
        }
        Ok(namespace)
    }

    /// Value of a local or export of `module`, computed on first use.
    /// `None` when the document defines no such name.
    pub(crate) fn binding_value(
        &mut self,
        module: ModuleId,
        name: &str,
    ) -> YamletResult<Option<Value>> {
        match self.modules.binding_state(module, name) {
            None => return Ok(None),
            Some(BindingState::Done(value)) => return Ok(Some(value.clone())),
            Some(BindingState::InProgress) => {
                return Err(YamletError::CyclicDefinition {
                    name: name.to_string(),
                })
            }
            Some(BindingState::Pending) => {}
        }

        let document = self.modules.document(module);
        let Some(node) = document.binding(name) else {
            return Ok(None);
        };
        self.enter_frame()?;
        self.modules
            .set_binding_state(module, name, BindingState::InProgress);
        let transformed = self.transform(node, module, Some(name));
        self.exit_frame();
        match transformed {
            Ok(value) => {
                self.modules
                    .set_binding_state(module, name, BindingState::Done(value.clone()));
                Ok(Some(value))
            }
            Err(err) => {
                self.modules
                    .set_binding_state(module, name, BindingState::Pending);
                Err(err)
            }
        }
    }

    /// Copies `node` into a value, evaluating expression scalars and
    /// building functions from `!func` nodes. `key` is the mapping key the
    /// node sits under; it names functions.
    pub(crate) fn transform(
        &mut self,
        node: &Node,
        module: ModuleId,
        key: Option<&str>,
    ) -> YamletResult<Value> {
        match node {
            Node::Null => Ok(Value::Null),
            Node::Bool(b) => Ok(Value::Bool(*b)),
            Node::Int(n) => Ok(Value::Int(*n)),
            Node::Float(n) => Ok(Value::Float(*n)),
            Node::Text(text) => match expression_body(text) {
                Some(body) => self.evaluate_scalar(body, text, module),
                None => Ok(Value::Text(text.clone())),
            },
            Node::Quoted(text) => Ok(Value::Text(text.clone())),
            Node::Sequence(items) => items
                .iter()
                .map(|item| self.transform(item, module, key))
                .collect::<YamletResult<Vec<_>>>()
                .map(Value::Sequence),
            Node::Mapping(entries) => {
                let mut fields = Namespace::with_capacity(entries.len());
                for (field, child) in entries {
                    let value = self.transform(child, module, Some(field))?;
                    fields.insert(field.clone(), value);
                }
                Ok(Value::Mapping(Rc::new(fields)))
            }
            Node::Tagged { tag, value } if tag == FUNC_TAG => {
                self.define_function(value, module, key.unwrap_or("<anonymous>"))
            }
            Node::Tagged { tag, value } if tag == EXPR_TAG => match value.as_text() {
                Some(text) => self.evaluate_scalar(text, text, module),
                None => Err(YamletError::document(
                    self.modules.path(module),
                    format!("`{}` must tag a text scalar, found {}", EXPR_TAG, value.kind_name()),
                )),
            },
            Node::Tagged { tag, value } => {
                tracing::debug!(tag = %tag, "ignoring unsupported tag");
                self.transform(value, module, key)
            }
        }
    }

    /// Parses and evaluates `body` in the top-level scope of `module`.
    /// `scalar` is the text as written, for error locations.
    fn evaluate_scalar(&mut self, body: &str, scalar: &str, module: ModuleId) -> YamletResult<Value> {
        let location = Location::with_expression(self.modules.path(module), scalar.trim());
        let expr = parse(body).map_err(|err| err.located(location.clone()))?;
        let env = Environment::new(module);
        self.eval_expression(&expr, &env)
            .map_err(|err| err.located(location))
    }

    fn define_function(&mut self, node: &Node, module: ModuleId, name: &str) -> YamletResult<Value> {
        let path = self.modules.path(module).to_path_buf();
        let invalid = |message: String| {
            YamletError::document(&path, format!("function `{}`: {}", name, message))
        };

        let entries = node.as_mapping().ok_or_else(|| {
            invalid(format!(
                "`{}` must tag a mapping with `params` and `result`, found {}",
                FUNC_TAG,
                node.kind_name()
            ))
        })?;
        if let Some(extra) = entries
            .keys()
            .find(|key| key.as_str() != "params" && key.as_str() != "result")
        {
            return Err(invalid(format!("unexpected key `{}`", extra)));
        }

        let params = match entries.get("params") {
            Some(Node::Sequence(items)) => items
                .iter()
                .map(|item| match item.as_text() {
                    Some(param) if is_identifier(param) => Ok(param.to_string()),
                    _ => Err(invalid(format!(
                        "parameter {:?} is not a valid identifier",
                        item
                    ))),
                })
                .collect::<YamletResult<Vec<_>>>()?,
            Some(other) => {
                return Err(invalid(format!(
                    "`params` must be a sequence, found {}",
                    other.kind_name()
                )))
            }
            None => return Err(invalid("missing `params`".to_string())),
        };
        let mut seen = HashSet::new();
        if let Some(duplicate) = params.iter().find(|param| !seen.insert(param.as_str())) {
            return Err(invalid(format!("parameter `{}` is declared twice", duplicate)));
        }

        // A scalar body such as `result: 1` is a constant.
        let (source, body) = match entries.get("result") {
            Some(Node::Text(text) | Node::Quoted(text)) => {
                let source = text.trim().to_string();
                let body = parse(&source)
                    .map_err(|err| err.located(Location::with_expression(&path, source.clone())))?;
                (source, body)
            }
            Some(Node::Int(n)) => (n.to_string(), Expression::Literal(Value::Int(*n))),
            Some(Node::Float(n)) => (n.to_string(), Expression::Literal(Value::Float(*n))),
            Some(Node::Bool(b)) => (b.to_string(), Expression::Literal(Value::Bool(*b))),
            Some(other) => {
                return Err(invalid(format!(
                    "`result` must be an expression or a scalar, found {}",
                    other.kind_name()
                )))
            }
            None => return Err(invalid("missing `result`".to_string())),
        };

        Ok(Value::Function(Rc::new(FunctionValue {
            name: name.to_string(),
            params,
            body,
            source,
            module,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorKind, reader::MemoryReader, Options};
    use pretty_assertions::assert_eq;

    fn run(files: &[(&str, &str)]) -> YamletResult<Node> {
        run_with(Options::default(), files)
    }

    fn run_with(options: Options, files: &[(&str, &str)]) -> YamletResult<Node> {
        let reader = files
            .iter()
            .fold(MemoryReader::new(), |reader, &(path, source)| {
                reader.with_file(path, source)
            });
        let mut interpreter = Interpreter::new(&reader, options);
        let root = interpreter.load_file(Path::new(files[0].0))?;
        interpreter.evaluate_document(root)
    }

    fn mapping(entries: &[(&str, Node)]) -> Node {
        Node::Mapping(
            entries
                .iter()
                .map(|(key, value)| (key.to_string(), value.clone()))
                .collect(),
        )
    }

    #[test]
    fn only_parenthesized_scalars_are_evaluated() -> YamletResult<()> {
        let output = run(&[(
            "main.yaml",
            "result:\n  just_an_expr: (1 + 2)\n  not_an_expr: 1 + 2\n",
        )])?;
        assert_eq!(
            output,
            mapping(&[
                ("just_an_expr", Node::Int(3)),
                ("not_an_expr", Node::text("1 + 2")),
            ])
        );
        Ok(())
    }

    #[test]
    fn structure_and_order_are_preserved() -> YamletResult<()> {
        let output = run(&[(
            "main.yaml",
            "result:\n  z: [1, (2 * 2), {inner: (10 / 4)}]\n  a: true\n  m: null\n",
        )])?;
        let entries = output.as_mapping().unwrap();
        assert_eq!(
            entries.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["z", "a", "m"]
        );
        assert_eq!(
            entries["z"],
            Node::Sequence(vec![
                Node::Int(1),
                Node::Int(4),
                mapping(&[("inner", Node::Float(2.5))]),
            ])
        );
        assert_eq!(entries["a"], Node::Bool(true));
        assert_eq!(entries["m"], Node::Null);
        Ok(())
    }

    #[test]
    fn cross_document_function_calls() -> YamletResult<()> {
        let output = run(&[
            (
                "main.yaml",
                "imports:\n  utils: utils.yaml\nresult:\n  some_func_calls: (utils.add(1, utils.add(2, 3)))\n",
            ),
            (
                "utils.yaml",
                "exports:\n  add: !func\n    params: [x, y]\n    result: x + y\n",
            ),
        ])?;
        assert_eq!(output, mapping(&[("some_func_calls", Node::Int(6))]));
        Ok(())
    }

    #[test]
    fn functions_close_over_their_defining_document() -> YamletResult<()> {
        let output = run(&[
            (
                "main.yaml",
                "imports:\n  lib: lib.yaml\nexports:\n  offset: 1000\nresult: (lib.shift(1))\n",
            ),
            (
                "lib.yaml",
                "locals:\n  offset: 10\nexports:\n  shift: !func\n    params: [x]\n    result: x + offset\n",
            ),
        ])?;
        assert_eq!(output, Node::Int(11));
        Ok(())
    }

    #[test]
    fn exports_may_reference_later_exports() -> YamletResult<()> {
        let output = run(&[(
            "main.yaml",
            "exports:\n  total: (double(half))\n  half: (21)\n  double: !func\n    params: [n]\n    result: n * 2\nresult: (total)\n",
        )])?;
        assert_eq!(output, Node::Int(42));
        Ok(())
    }

    #[test]
    fn self_referential_bindings_are_rejected() {
        let err = run(&[("main.yaml", "exports:\n  a: (b + 1)\n  b: (a + 1)\nresult: (a)\n")])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicDefinition);
    }

    #[test]
    fn missing_module_member_names_alias_and_member() {
        let err = run(&[
            ("main.yaml", "imports:\n  alias: lib.yaml\nresult: (alias.missing)\n"),
            ("lib.yaml", "exports:\n  present: 1\n"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Name);
        let message = err.to_string();
        assert!(message.contains("`missing`"), "{}", message);
        assert!(message.contains("`alias`"), "{}", message);
        assert!(message.contains("main.yaml"), "{}", message);
    }

    #[test]
    fn locals_are_not_exported() {
        let err = run(&[
            ("main.yaml", "imports:\n  lib: lib.yaml\nresult: (lib.hidden)\n"),
            ("lib.yaml", "locals:\n  hidden: 1\n"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Name);
    }

    #[test]
    fn imports_are_not_flattened() {
        let err = run(&[
            ("main.yaml", "imports:\n  lib: lib.yaml\nresult: (value)\n"),
            ("lib.yaml", "exports:\n  value: 1\n"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Name);
    }

    #[test]
    fn bare_alias_evaluates_to_its_namespace() -> YamletResult<()> {
        let output = run(&[
            ("main.yaml", "imports:\n  lib: lib.yaml\nresult: (lib)\n"),
            ("lib.yaml", "exports:\n  a: 1\n  b: (a + 1)\n"),
        ])?;
        assert_eq!(output, mapping(&[("a", Node::Int(1)), ("b", Node::Int(2))]));
        Ok(())
    }

    #[test]
    fn function_values_cannot_be_emitted() {
        let err = run(&[(
            "main.yaml",
            "exports:\n  f: !func\n    params: []\n    result: 1\nresult: (f)\n",
        )])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn scalar_function_bodies_are_constants() -> YamletResult<()> {
        let output = run(&[(
            "main.yaml",
            "\
exports:
  one: !func
    params: []
    result: 1
  half: !func
    params: [ignored]
    result: 0.5
  yes: !func
    params: []
    result: true
result: [(one()), (half(7)), (yes())]
",
        )])?;
        assert_eq!(
            output,
            Node::Sequence(vec![Node::Int(1), Node::Float(0.5), Node::Bool(true)])
        );
        Ok(())
    }

    #[test]
    fn quoted_scalars_are_never_evaluated() -> YamletResult<()> {
        let output = run(&[(
            "main.yaml",
            "result:\n  note: \"(see below)\"\n  lit: '(1 + 2)'\n  block: |\n    (1 + 2)\n  plain: (1 + 2)\n",
        )])?;
        assert_eq!(
            output,
            mapping(&[
                ("note", Node::text("(see below)")),
                ("lit", Node::text("(1 + 2)")),
                ("block", Node::text("(1 + 2)\n")),
                ("plain", Node::Int(3)),
            ])
        );
        Ok(())
    }

    #[test]
    fn expr_tag_evaluates_quoted_text() -> YamletResult<()> {
        let output = run(&[("main.yaml", "result: !expr '2 * 3'\n")])?;
        assert_eq!(output, Node::Int(6));
        Ok(())
    }

    #[test]
    fn long_binding_chains_hit_the_depth_limit() {
        let mut source = String::from("exports:\n");
        for i in 0..40 {
            source.push_str(&format!("  x{}: (x{})\n", i, i + 1));
        }
        source.push_str("  x40: 1\nresult: (x0)\n");

        let err = run_with(Options { max_call_depth: 16 }, &[("main.yaml", &source)]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RecursionLimit);

        let output = run_with(Options { max_call_depth: 64 }, &[("main.yaml", &source)]);
        assert_eq!(output.ok(), Some(Node::Int(1)));
    }

    #[test]
    fn expr_tag_forces_evaluation() -> YamletResult<()> {
        let output = run(&[("main.yaml", "result:\n  forced: !expr 1 + 2\n  plain: 1 + 2\n")])?;
        assert_eq!(
            output,
            mapping(&[("forced", Node::Int(3)), ("plain", Node::text("1 + 2"))])
        );
        Ok(())
    }

    #[test]
    fn missing_result_yields_null() -> YamletResult<()> {
        assert_eq!(run(&[("main.yaml", "exports:\n  a: 1\n")])?, Node::Null);
        Ok(())
    }

    #[test]
    fn structural_errors_are_reported() {
        for source in [
            "- not a mapping\n",
            "result: 1\nextra: 2\n",
            "exports: [1, 2]\n",
            "imports:\n  lib: [a]\n",
            "imports:\n  bad-alias: lib.yaml\n",
            "locals:\n  x: 1\nexports:\n  x: 2\n",
            "exports:\n  f: !func\n    params: [a, a]\n    result: a\n",
            "exports:\n  f: !func\n    params: [a]\n",
            "exports:\n  f: !func\n    params: [a]\n    result: a\n    doc: extra\n",
            "exports:\n  f: !func\n    params: [1]\n    result: a\n",
        ] {
            let err = run(&[("main.yaml", source)]).expect_err(source);
            assert_eq!(err.kind(), ErrorKind::Document, "source: {}", source);
        }
    }

    #[test]
    fn syntax_errors_carry_document_and_expression() {
        let err = run(&[("main.yaml", "result:\n  broken: (1 + )\n")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Syntax);
        let locations = err.locations();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].document, PathBuf::from("main.yaml"));
        assert_eq!(locations[0].expression.as_deref(), Some("(1 + )"));
    }

    #[test]
    fn errors_inside_imported_functions_show_both_frames() {
        let err = run(&[
            ("main.yaml", "imports:\n  lib: lib.yaml\nresult: (lib.div(1, 0))\n"),
            ("lib.yaml", "exports:\n  div: !func\n    params: [a, b]\n    result: a / b\n"),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arithmetic);
        let documents: Vec<_> = err
            .locations()
            .iter()
            .map(|location| location.document.clone())
            .collect();
        assert_eq!(
            documents,
            vec![PathBuf::from("main.yaml"), PathBuf::from("lib.yaml")]
        );
    }

    #[test]
    fn evaluation_is_deterministic() -> YamletResult<()> {
        let files = [
            ("main.yaml", "imports:\n  u: u.yaml\nresult:\n  a: (u.f(2))\n  b: [(u.k), x]\n"),
            ("u.yaml", "exports:\n  k: (3.5 * 2)\n  f: !func\n    params: [n]\n    result: n * k\n"),
        ];
        let first = run(&files)?;
        let second = run(&files)?;
        assert_eq!(first, second);
        assert_eq!(
            first,
            mapping(&[
                ("a", Node::Float(14.0)),
                ("b", Node::Sequence(vec![Node::Float(7.0), Node::text("x")])),
            ])
        );
        Ok(())
    }
}

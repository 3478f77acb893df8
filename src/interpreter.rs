use std::{collections::HashMap, path::Path, rc::Rc};

use crate::{
    ast::{BinaryOperator, Expression},
    error::{Location, YamletError, YamletResult},
    module::{ModuleId, ModuleTable},
    reader::DocumentReader,
    tree::Node,
    value::{FunctionValue, Value},
    Options,
};

/// Name bindings visible to an expression: the current call's parameters,
/// then the namespace of the document `module`.
#[derive(Debug, Clone)]
pub struct Environment {
    module: ModuleId,
    values: HashMap<String, Value>,
}

impl Environment {
    /// Top-level scope of a document: no parameters.
    pub fn new(module: ModuleId) -> Self {
        Self {
            module,
            values: HashMap::new(),
        }
    }

    pub fn with_bindings(module: ModuleId, values: HashMap<String, Value>) -> Self {
        Self { module, values }
    }

    pub fn module(&self) -> ModuleId {
        self.module
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Evaluates documents and expressions for one top-level run. Owns the
/// module table, so every document reached from the root is loaded and
/// evaluated at most once.
pub struct Interpreter<'r> {
    pub(crate) reader: &'r dyn DocumentReader,
    pub(crate) modules: ModuleTable,
    options: Options,
    call_depth: usize,
}

impl<'r> Interpreter<'r> {
    pub fn new(reader: &'r dyn DocumentReader, options: Options) -> Self {
        Self {
            reader,
            modules: ModuleTable::new(),
            options,
            call_depth: 0,
        }
    }

    pub fn modules(&self) -> &ModuleTable {
        &self.modules
    }

    /// Loads the document at `path`, and transitively its imports.
    pub fn load_file(&mut self, path: &Path) -> YamletResult<ModuleId> {
        let canonical = self.reader.canonicalize(path)?;
        self.modules.load(self.reader, &canonical)
    }

    /// Registers an already-parsed tree as the document at `path`. Imports
    /// are resolved relative to `path`.
    pub fn load_tree(&mut self, path: &Path, tree: Node) -> YamletResult<ModuleId> {
        let identity = self
            .reader
            .canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf());
        self.modules.register(self.reader, identity, tree)
    }

    pub fn eval_expression(&mut self, expr: &Expression, env: &Environment) -> YamletResult<Value> {
        match expr {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Identifier(name) => self.lookup(name, env),
            Expression::Grouping(inner) => self.eval_expression(inner, env),
            Expression::Attribute { base, field } => {
                if let Expression::Identifier(alias) = base.as_ref() {
                    if self.is_module_alias(alias, env) {
                        return self.module_export(env.module(), alias, field);
                    }
                }
                let target = self.eval_expression(base, env)?;
                self.eval_attribute(target, field)
            }
            Expression::Call { callee, args } => {
                let callee_value = self.eval_expression(callee, env)?;
                let evaluated_args = args
                    .iter()
                    .map(|arg| self.eval_expression(arg, env))
                    .collect::<YamletResult<Vec<_>>>()?;
                match callee_value {
                    Value::Function(func) => self.call_function(func, evaluated_args),
                    other => Err(YamletError::Type(format!(
                        "{} is not callable (found {})",
                        describe_callee(callee),
                        other.type_name()
                    ))),
                }
            }
            Expression::Binary { left, op, right } => {
                let left_value = self.eval_expression(left, env)?;
                let right_value = self.eval_expression(right, env)?;
                eval_binary(*op, left_value, right_value)
            }
        }
    }

    fn lookup(&mut self, name: &str, env: &Environment) -> YamletResult<Value> {
        if let Some(value) = env.get(name) {
            return Ok(value.clone());
        }
        if let Some(value) = self.binding_value(env.module(), name)? {
            return Ok(value);
        }
        if self.modules.alias(env.module(), name).is_some() {
            let namespace = self.resolve(env.module(), name)?;
            return Ok(Value::Mapping(namespace));
        }
        Err(YamletError::Name(format!(
            "name `{}` is not defined in {}",
            name,
            self.modules.path(env.module()).display()
        )))
    }

    /// A parameter or document binding of the same name hides an alias.
    fn is_module_alias(&self, name: &str, env: &Environment) -> bool {
        env.get(name).is_none()
            && !self.modules.has_binding(env.module(), name)
            && self.modules.alias(env.module(), name).is_some()
    }

    fn module_export(&mut self, module: ModuleId, alias: &str, field: &str) -> YamletResult<Value> {
        let namespace = self.resolve(module, alias)?;
        namespace.get(field).cloned().ok_or_else(|| {
            YamletError::Name(format!("module `{}` has no export `{}`", alias, field))
        })
    }

    fn eval_attribute(&self, target: Value, field: &str) -> YamletResult<Value> {
        match target {
            Value::Mapping(fields) => fields.get(field).cloned().ok_or_else(|| {
                YamletError::Name(format!("mapping has no field `{}`", field))
            }),
            other => Err(YamletError::Type(format!(
                "cannot read attribute `{}` of {}",
                field,
                other.type_name()
            ))),
        }
    }

    pub fn call_function(
        &mut self,
        func: Rc<FunctionValue>,
        args: Vec<Value>,
    ) -> YamletResult<Value> {
        if args.len() != func.params.len() {
            return Err(YamletError::Type(format!(
                "function `{}` expects {} argument{}, got {}",
                func.name,
                func.params.len(),
                if func.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }
        self.enter_frame()?;
        tracing::trace!(function = %func.name, depth = self.call_depth, "calling function");
        let bindings = func.params.iter().cloned().zip(args).collect();
        let env = Environment::with_bindings(func.module, bindings);

        let result = self.eval_expression(&func.body, &env);
        self.exit_frame();

        result.map_err(|err| {
            err.located(Location::with_expression(
                self.modules.path(func.module),
                func.source.clone(),
            ))
        })
    }
}

impl Interpreter<'_> {
    /// Counts one nested evaluation (a function call or a binding forced
    /// on demand) against `max_call_depth`.
    pub(crate) fn enter_frame(&mut self) -> YamletResult<()> {
        if self.call_depth >= self.options.max_call_depth {
            return Err(YamletError::RecursionLimit {
                limit: self.options.max_call_depth,
            });
        }
        self.call_depth += 1;
        Ok(())
    }

    pub(crate) fn exit_frame(&mut self) {
        self.call_depth = self.call_depth.saturating_sub(1);
    }
}

fn describe_callee(callee: &Expression) -> String {
    match callee {
        Expression::Identifier(name) => format!("`{}`", name),
        Expression::Attribute { base, field } => match base.as_ref() {
            Expression::Identifier(base) => format!("`{}.{}`", base, field),
            _ => format!("`{}`", field),
        },
        _ => "expression".to_string(),
    }
}

pub fn eval_binary(op: BinaryOperator, left: Value, right: Value) -> YamletResult<Value> {
    match (op, left, right) {
        (BinaryOperator::Add, Value::Text(l), Value::Text(r)) => Ok(Value::Text(l + &r)),
        (BinaryOperator::Div, left, right) => {
            let (l, r) = expect_numbers(op, &left, &right)?;
            if r == 0.0 {
                Err(YamletError::Arithmetic("division by zero".to_string()))
            } else {
                Ok(Value::Float(l / r))
            }
        }
        (BinaryOperator::Add, Value::Int(l), Value::Int(r)) => checked_int(op, l, r, l.checked_add(r)),
        (BinaryOperator::Sub, Value::Int(l), Value::Int(r)) => checked_int(op, l, r, l.checked_sub(r)),
        (BinaryOperator::Mul, Value::Int(l), Value::Int(r)) => checked_int(op, l, r, l.checked_mul(r)),
        (op, left, right) => {
            let (l, r) = expect_numbers(op, &left, &right)?;
            Ok(Value::Float(match op {
                BinaryOperator::Add => l + r,
                BinaryOperator::Sub => l - r,
                BinaryOperator::Mul => l * r,
                BinaryOperator::Div => l / r,
            }))
        }
    }
}

fn checked_int(op: BinaryOperator, l: i64, r: i64, result: Option<i64>) -> YamletResult<Value> {
    result.map(Value::Int).ok_or_else(|| {
        YamletError::Arithmetic(format!(
            "integer overflow in {} {} {}",
            l,
            op.symbol(),
            r
        ))
    })
}

fn expect_numbers(op: BinaryOperator, left: &Value, right: &Value) -> YamletResult<(f64, f64)> {
    match (left.as_number(), right.as_number()) {
        (Some(l), Some(r)) => Ok((l, r)),
        _ => Err(YamletError::Type(format!(
            "unsupported operand types for {}: {} and {}",
            op.symbol(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

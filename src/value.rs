use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::Expression;
use crate::module::ModuleId;

/// Insertion-ordered name → value table: mapping values and export
/// namespaces alike.
pub type Namespace = IndexMap<String, Value>;

#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Sequence(Vec<Value>),
    /// Shared, so passing an export namespace around does not copy it.
    Mapping(Rc<Namespace>),
    Function(Rc<FunctionValue>),
}

/// A user-defined function. The body closes over the namespace of the
/// document that defined it, referenced by module id.
pub struct FunctionValue {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expression,
    /// Body text as written, for error locations.
    pub source: String,
    pub module: ModuleId,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
            Value::Function(_) => "function",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Sequence(values) => f.debug_list().entries(values).finish(),
            Value::Mapping(fields) => f.debug_map().entries(fields.iter()).finish(),
            Value::Function(func) => write!(f, "<fn {}({})>", func.name, func.params.join(", ")),
        }
    }
}

/// Structural equality. Functions compare by identity; `Int` and `Float`
/// never compare equal to each other, so `2` and `2.0` stay distinguishable.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(l), Value::Bool(r)) => l == r,
            (Value::Int(l), Value::Int(r)) => l == r,
            (Value::Float(l), Value::Float(r)) => l == r,
            (Value::Text(l), Value::Text(r)) => l == r,
            (Value::Sequence(l), Value::Sequence(r)) => l == r,
            (Value::Mapping(l), Value::Mapping(r)) => l == r,
            (Value::Function(l), Value::Function(r)) => Rc::ptr_eq(l, r),
            _ => false,
        }
    }
}

impl fmt::Debug for FunctionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionValue")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("source", &self.source)
            .field("module", &self.module)
            .finish()
    }
}

use std::fmt;

use crate::common::*;
use crate::language::types::{Category, ColumnType, FunctionSignature, StructureType, Type, Unit, UnknownReason};
use super::error::Exception;

/// Identifies a stream owned by the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u32);

/// Names bound when a function or structure was created. Closures keep the
/// scope they were created in alive.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub(crate) bindings: Vec<(String, Value)>,
    pub(crate) parent: Option<Arc<Scope>>,
}

impl Scope {
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        match self.bindings.iter().rev().find(|(n, _)| n == name) {
            Some((_, value)) => Some(value),
            None => self.parent.as_ref().and_then(|p| p.lookup(name)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructureValue {
    pub definition: NodeId,
    pub name: String,
    pub interfaces: Vec<NodeId>,
    pub fields: Vec<(String, Value)>,
}

impl StructureValue {
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

/// Runtime values. All values are immutable and can be sent to the thread
/// that records into a stream.
#[derive(Debug, Clone)]
pub enum Value {
    Measurement { number: f64, unit: Unit },
    Text { text: String, format: Option<String> },
    Bool(bool),
    None(Option<String>),
    List(Vec<Value>),
    /// Items are unique by `is_equal_to`.
    Set(Vec<Value>),
    /// Keys are unique by `is_equal_to`.
    Map(Vec<(Value, Value)>),
    Table { columns: Vec<ColumnType>, rows: Vec<Vec<Value>> },
    Structure(Arc<StructureValue>),
    /// A function, structure or conversion definition and the scope it was
    /// created in.
    Function { definition: NodeId, closure: Arc<Scope> },
    /// A native function, bound to the value it was accessed on.
    Native { name: String, receiver: Option<Box<Value>> },
    Stream(StreamId),
    Exception(Box<Exception>),
}

impl Value {
    pub fn number(number: f64) -> Value {
        Value::Measurement { number, unit: Unit::unitless() }
    }

    pub fn text(text: &str) -> Value {
        Value::Text { text: text.to_string(), format: None }
    }

    pub fn none() -> Value {
        Value::None(None)
    }

    pub fn set(values: Vec<Value>) -> Value {
        let mut unique: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !unique.iter().any(|u| u.is_equal_to(&value)) {
                unique.push(value);
            }
        }
        Value::Set(unique)
    }

    pub fn map(pairs: Vec<(Value, Value)>) -> Value {
        let mut unique: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match unique.iter_mut().find(|(k, _)| k.is_equal_to(&key)) {
                Some(existing) => existing.1 = value,
                None => unique.push((key, value)),
            }
        }
        Value::Map(unique)
    }

    pub fn is_exception(&self) -> bool {
        matches!(self, Value::Exception(_))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Measurement { number, .. } => Some(*number),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        let category = match self {
            Value::Measurement { .. } => Category::Measurement,
            Value::Text { .. } => Category::Text,
            Value::Bool(_) => Category::Boolean,
            Value::None(_) => Category::None,
            Value::List(_) => Category::List,
            Value::Set(_) => Category::Set,
            Value::Map(_) => Category::Map,
            Value::Table { .. } => Category::Table,
            Value::Structure(_) => Category::Structure,
            Value::Function { .. } | Value::Native { .. } => Category::Function,
            Value::Stream(_) => Category::Stream,
            Value::Exception(_) => return None,
        };
        Some(category)
    }

    /// Structural equality. Sets and maps ignore order; exceptions equal
    /// nothing.
    pub fn is_equal_to(&self, other: &Value) -> bool {
        use Value::*;
        let all_equal = |a: &[Value], b: &[Value]| a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.is_equal_to(y));
        match (self, other) {
            (Measurement { number: a, unit: ua }, Measurement { number: b, unit: ub }) => a == b && ua == ub,
            (Text { text: a, format: fa }, Text { text: b, format: fb }) => a == b && fa == fb,
            (Bool(a), Bool(b)) => a == b,
            (None(a), None(b)) => a == b,
            (List(a), List(b)) => all_equal(a, b),
            (Set(a), Set(b)) => a.len() == b.len() && a.iter().all(|x| b.iter().any(|y| x.is_equal_to(y))),
            (Map(a), Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k.is_equal_to(k2) && v.is_equal_to(v2)))
            },
            (Table { columns: ca, rows: ra }, Table { columns: cb, rows: rb }) => {
                ca.iter().map(|c| &c.name).eq(cb.iter().map(|c| &c.name))
                    && ra.len() == rb.len()
                    && ra.iter().zip(rb).all(|(x, y)| all_equal(x, y))
            },
            (Structure(a), Structure(b)) => {
                a.definition == b.definition
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().zip(b.fields.iter()).all(|((n1, v1), (n2, v2))| n1 == n2 && v1.is_equal_to(v2))
            },
            (Function { definition: a, .. }, Function { definition: b, .. }) => a == b,
            (Native { name: a, receiver: ra }, Native { name: b, receiver: rb }) => {
                a == b
                    && match (ra, rb) {
                        (Some(x), Some(y)) => x.is_equal_to(y),
                        (Option::None, Option::None) => true,
                        _ => false,
                    }
            },
            (Stream(a), Stream(b)) => a == b,
            _ => false,
        }
    }

    /// Type of the value as far as it can tell on its own. Functions only
    /// know they are functions; their signature lives with the definition.
    pub fn get_type(&self) -> Type {
        let items = |values: &mut dyn Iterator<Item = &Value>| {
            let types: Vec<Type> = values.map(|v| v.get_type()).collect();
            if types.is_empty() {
                Option::None
            } else {
                Some(Box::new(Type::union_of(types)))
            }
        };
        match self {
            Value::Measurement { unit, .. } => Type::measurement(unit.clone()),
            Value::Text { format, .. } => Type::Text(format.clone()),
            Value::Bool(_) => Type::Boolean,
            Value::None(name) => Type::None(name.clone()),
            Value::List(values) => Type::List(items(&mut values.iter())),
            Value::Set(values) => Type::Set(items(&mut values.iter())),
            Value::Map(pairs) => Type::Map(items(&mut pairs.iter().map(|(k, _)| k)), items(&mut pairs.iter().map(|(_, v)| v))),
            Value::Table { columns, .. } => Type::Table(columns.clone()),
            Value::Structure(structure) => Type::Structure(StructureType {
                definition: structure.definition,
                name: structure.name.clone(),
                interfaces: structure.interfaces.clone(),
                inputs: Vec::new(),
            }),
            Value::Function { .. } | Value::Native { .. } => {
                Type::Function(FunctionSignature::new(Vec::new(), Type::Unknown(UnknownReason::NotAnnotated)))
            },
            Value::Stream(_) => Type::Stream(Box::new(Type::Unknown(UnknownReason::NotAnnotated))),
            Value::Exception(_) => Type::Unknown(UnknownReason::NotAnExpression),
        }
    }

    /// Text of the value as a program would write it.
    pub fn to_display_text(&self) -> String {
        let join = |values: &[Value]| values.iter().map(|v| v.to_display_text()).collect::<Vec<_>>().join(" ");
        match self {
            Value::Measurement { number, unit } => format!("{}{}", format_number(*number), unit),
            Value::Text { text, format } => match format {
                Some(format) => format!("\"{}\"/{}", text, format),
                None => format!("\"{}\"", text),
            },
            Value::Bool(true) => "⊤".to_string(),
            Value::Bool(false) => "⊥".to_string(),
            Value::None(Some(name)) => format!("!{}", name),
            Value::None(None) => "!".to_string(),
            Value::List(values) => format!("[{}]", join(values)),
            Value::Set(values) => format!("{{{}}}", join(values)),
            Value::Map(pairs) if pairs.is_empty() => "{:}".to_string(),
            Value::Map(pairs) => format!(
                "{{{}}}",
                pairs
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k.to_display_text(), v.to_display_text()))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Value::Table { columns, rows } => {
                let mut text: String = columns.iter().map(|c| format!("|{}", c.name)).collect();
                for row in rows {
                    text.push('\n');
                    text.extend(row.iter().map(|v| format!("|{}", v.to_display_text())));
                }
                text
            },
            Value::Structure(structure) => format!(
                "{}({})",
                structure.name,
                structure
                    .fields
                    .iter()
                    .map(|(n, v)| format!("{}:{}", n, v.to_display_text()))
                    .collect::<Vec<_>>()
                    .join(" ")
            ),
            Value::Function { definition, .. } => format!("ƒ{:?}", definition),
            Value::Native { name, .. } => format!("ƒ {}", name),
            Value::Stream(id) => format!("∆{}", id.0),
            Value::Exception(exception) => format!("!{}", exception),
        }
    }

    /// Text for splicing into templates: texts without quotes.
    pub fn to_template_text(&self) -> String {
        match self {
            Value::Text { text, .. } => text.clone(),
            other => other.to_display_text(),
        }
    }
}

fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_text())
    }
}

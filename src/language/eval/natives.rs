use std::fmt;

use crate::common::*;
use crate::language::context::Context;
use crate::language::types::{Category, FunctionSignature, InputType, Type, UnknownReason};
use crate::runtime::stream::StreamProducer;
use super::error::{Exception, ExceptionKind};
use super::value::Value;

pub type NativeCallback = Arc<dyn Fn(NodeId, &Evaluation<'_>) -> Value + Send + Sync>;
pub type SignatureBuilder = Arc<dyn Fn(&Type) -> FunctionSignature + Send + Sync>;
pub type ConversionCallback = Arc<dyn Fn(NodeId, &Value) -> Value + Send + Sync>;
pub type ProducerFactory = Arc<dyn Fn() -> Box<dyn StreamProducer> + Send + Sync>;

/// What a native function sees of the evaluation that called it.
pub struct Evaluation<'a> {
    pub(crate) context: &'a Context,
    pub(crate) requestor: NodeId,
    pub(crate) receiver: Option<&'a Value>,
    pub(crate) inputs: Vec<(Option<String>, Value)>,
}

impl<'a> Evaluation<'a> {
    pub fn context(&self) -> &Context {
        self.context
    }

    /// The value the function was accessed on.
    pub fn this(&self) -> Option<&Value> {
        self.receiver
    }

    pub fn input(&self, index: usize) -> Option<&Value> {
        self.inputs.get(index).map(|(_, v)| v)
    }

    pub fn resolve(&self, name: &str) -> Option<&Value> {
        self.inputs.iter().find(|(n, _)| n.as_deref() == Some(name)).map(|(_, v)| v)
    }

    pub fn exception(&self, kind: ExceptionKind, message: &str) -> Value {
        Value::Exception(Box::new(Exception::new(self.context, kind, self.requestor, message.to_string())))
    }
}

pub struct NativeFunction {
    pub name: String,
    /// Signature for a given receiver type. Globals get the none type.
    pub signature: SignatureBuilder,
    pub callback: NativeCallback,
}

pub struct NativeConversion {
    pub input: Type,
    pub output: Type,
    pub callback: ConversionCallback,
}

pub struct NativeStream {
    pub name: String,
    pub ty: Type,
    pub initial: Value,
    pub producer: Option<ProducerFactory>,
}

/// Functions, conversions and streams implemented by the host.
#[derive(Default)]
pub struct NativeRegistry {
    globals: HashMap<String, NativeFunction>,
    members: HashMap<(Category, String), NativeFunction>,
    conversions: Vec<NativeConversion>,
    streams: HashMap<String, NativeStream>,
}

impl fmt::Debug for NativeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRegistry")
            .field("globals", &self.globals.keys().collect::<Vec<_>>())
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .field("conversions", &self.conversions.len())
            .field("streams", &self.streams.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_function<C>(&mut self, name: &str, signature: FunctionSignature, callback: C)
    where
        C: Fn(NodeId, &Evaluation<'_>) -> Value + Send + Sync + 'static,
    {
        self.globals.insert(name.to_string(), NativeFunction {
            name: name.to_string(),
            signature: Arc::new(move |_| signature.clone()),
            callback: Arc::new(callback),
        });
    }

    pub fn register_member<S, C>(&mut self, category: Category, name: &str, signature: S, callback: C)
    where
        S: Fn(&Type) -> FunctionSignature + Send + Sync + 'static,
        C: Fn(NodeId, &Evaluation<'_>) -> Value + Send + Sync + 'static,
    {
        self.members.insert((category, name.to_string()), NativeFunction {
            name: name.to_string(),
            signature: Arc::new(signature),
            callback: Arc::new(callback),
        });
    }

    pub fn register_conversion<C>(&mut self, input: Type, output: Type, callback: C)
    where
        C: Fn(NodeId, &Value) -> Value + Send + Sync + 'static,
    {
        self.conversions.push(NativeConversion { input, output, callback: Arc::new(callback) });
    }

    pub fn register_stream(&mut self, name: &str, ty: Type, initial: Value, producer: Option<ProducerFactory>) {
        self.streams.insert(name.to_string(), NativeStream { name: name.to_string(), ty, initial, producer });
    }

    pub fn global(&self, name: &str) -> Option<&NativeFunction> {
        self.globals.get(name)
    }

    pub fn stream(&self, name: &str) -> Option<&NativeStream> {
        self.streams.get(name)
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.globals.contains_key(name) || self.streams.contains_key(name)
    }

    pub fn member(&self, category: Category, name: &str) -> Option<&NativeFunction> {
        self.members.get(&(category, name.to_string()))
    }

    /// Index of the first conversion that takes `input` and produces
    /// something `output` accepts.
    pub fn conversion(&self, input: &Type, output: &Type) -> Option<usize> {
        self.conversions.iter().position(|c| c.input.accepts(input) && output.accepts(&c.output))
    }

    pub fn conversion_at(&self, index: usize) -> Option<&NativeConversion> {
        self.conversions.get(index)
    }

    /// Registry holding the basic operations on texts and collections and
    /// the conversions to text.
    pub fn with_defaults() -> Self {
        let mut natives = Self::new();
        register_text(&mut natives);
        register_list(&mut natives);
        register_set(&mut natives);
        register_map(&mut natives);
        register_conversions(&mut natives);
        natives
    }
}

fn signature(inputs: Vec<InputType>, output: Type) -> FunctionSignature {
    FunctionSignature::new(inputs, output)
}

/// Item type of a collection type. Empty literals have no item type, in
/// which case anything goes.
fn item_of(ty: &Type) -> Type {
    match ty {
        Type::List(Some(item)) | Type::Set(Some(item)) | Type::Map(Some(item), _) => (**item).clone(),
        _ => Type::Unknown(UnknownReason::NotAnnotated),
    }
}

fn value_of(ty: &Type) -> Type {
    match ty {
        Type::Map(_, Some(value)) => (**value).clone(),
        _ => Type::Unknown(UnknownReason::NotAnnotated),
    }
}

fn type_error(evaluation: &Evaluation<'_>) -> Value {
    evaluation.exception(ExceptionKind::TypeMismatch, "unexpected input")
}

fn register_text(natives: &mut NativeRegistry) {
    natives.register_member(Category::Text, "length", |_| signature(vec![], Type::number()), |_, evaluation| {
        match evaluation.this() {
            Some(Value::Text { text, .. }) => Value::number(text.chars().count() as f64),
            _ => type_error(evaluation),
        }
    });
    natives.register_member(
        Category::Text,
        "has",
        |_| signature(vec![InputType::required("text", Type::text())], Type::Boolean),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Text { text, .. }), Some(Value::Text { text: part, .. })) => Value::Bool(text.contains(part.as_str())),
            _ => type_error(evaluation),
        },
    );
}

fn register_list(natives: &mut NativeRegistry) {
    natives.register_member(Category::List, "length", |_| signature(vec![], Type::number()), |_, evaluation| {
        match evaluation.this() {
            Some(Value::List(values)) => Value::number(values.len() as f64),
            _ => type_error(evaluation),
        }
    });
    natives.register_member(
        Category::List,
        "first",
        |ty| signature(vec![], Type::union_of(vec![item_of(ty), Type::None(None)])),
        |_, evaluation| match evaluation.this() {
            Some(Value::List(values)) => values.first().cloned().unwrap_or_else(Value::none),
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::List,
        "last",
        |ty| signature(vec![], Type::union_of(vec![item_of(ty), Type::None(None)])),
        |_, evaluation| match evaluation.this() {
            Some(Value::List(values)) => values.last().cloned().unwrap_or_else(Value::none),
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::List,
        "has",
        |ty| signature(vec![InputType::required("value", item_of(ty))], Type::Boolean),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::List(values)), Some(value)) => Value::Bool(values.iter().any(|v| v.is_equal_to(value))),
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::List,
        "add",
        |ty| signature(vec![InputType::required("value", item_of(ty))], ty.clone()),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::List(values)), Some(value)) => {
                let mut values = values.clone();
                values.push(value.clone());
                Value::List(values)
            },
            _ => type_error(evaluation),
        },
    );
    natives.register_member(Category::List, "reverse", |ty| signature(vec![], ty.clone()), |_, evaluation| {
        match evaluation.this() {
            Some(Value::List(values)) => Value::List(values.iter().rev().cloned().collect()),
            _ => type_error(evaluation),
        }
    });
}

fn register_set(natives: &mut NativeRegistry) {
    natives.register_member(Category::Set, "size", |_| signature(vec![], Type::number()), |_, evaluation| {
        match evaluation.this() {
            Some(Value::Set(values)) => Value::number(values.len() as f64),
            _ => type_error(evaluation),
        }
    });
    natives.register_member(
        Category::Set,
        "has",
        |ty| signature(vec![InputType::required("value", item_of(ty))], Type::Boolean),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Set(values)), Some(value)) => Value::Bool(values.iter().any(|v| v.is_equal_to(value))),
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::Set,
        "add",
        |ty| signature(vec![InputType::required("value", item_of(ty))], ty.clone()),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Set(values)), Some(value)) => {
                let mut values = values.clone();
                values.push(value.clone());
                Value::set(values)
            },
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::Set,
        "remove",
        |ty| signature(vec![InputType::required("value", item_of(ty))], ty.clone()),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Set(values)), Some(value)) => {
                Value::Set(values.iter().filter(|v| !v.is_equal_to(value)).cloned().collect())
            },
            _ => type_error(evaluation),
        },
    );
    let set_operation = |name: &'static str, keep_shared: Option<bool>| {
        move |natives: &mut NativeRegistry| {
            natives.register_member(
                Category::Set,
                name,
                |ty| signature(vec![InputType::required("set", ty.clone())], ty.clone()),
                move |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
                    (Some(Value::Set(left)), Some(Value::Set(right))) => match keep_shared {
                        None => Value::set(left.iter().chain(right.iter()).cloned().collect()),
                        Some(shared) => Value::Set(
                            left.iter().filter(|v| right.iter().any(|r| r.is_equal_to(v)) == shared).cloned().collect(),
                        ),
                    },
                    _ => type_error(evaluation),
                },
            )
        }
    };
    set_operation("union", None)(natives);
    set_operation("intersection", Some(true))(natives);
    set_operation("difference", Some(false))(natives);
}

fn register_map(natives: &mut NativeRegistry) {
    natives.register_member(Category::Map, "size", |_| signature(vec![], Type::number()), |_, evaluation| {
        match evaluation.this() {
            Some(Value::Map(pairs)) => Value::number(pairs.len() as f64),
            _ => type_error(evaluation),
        }
    });
    natives.register_member(
        Category::Map,
        "has",
        |ty| signature(vec![InputType::required("key", item_of(ty))], Type::Boolean),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Map(pairs)), Some(key)) => Value::Bool(pairs.iter().any(|(k, _)| k.is_equal_to(key))),
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::Map,
        "set",
        |ty| {
            signature(
                vec![InputType::required("key", item_of(ty)), InputType::required("value", value_of(ty))],
                ty.clone(),
            )
        },
        |_, evaluation| match (evaluation.this(), evaluation.input(0), evaluation.input(1)) {
            (Some(Value::Map(pairs)), Some(key), Some(value)) => {
                let mut pairs = pairs.clone();
                pairs.push((key.clone(), value.clone()));
                Value::map(pairs)
            },
            _ => type_error(evaluation),
        },
    );
    natives.register_member(
        Category::Map,
        "unset",
        |ty| signature(vec![InputType::required("key", item_of(ty))], ty.clone()),
        |_, evaluation| match (evaluation.this(), evaluation.input(0)) {
            (Some(Value::Map(pairs)), Some(key)) => {
                Value::Map(pairs.iter().filter(|(k, _)| !k.is_equal_to(key)).cloned().collect())
            },
            _ => type_error(evaluation),
        },
    );
}

fn register_conversions(natives: &mut NativeRegistry) {
    natives.register_conversion(Type::Measurement(None), Type::text(), |_, value| Value::text(&value.to_display_text()));
    natives.register_conversion(Type::Boolean, Type::text(), |_, value| Value::text(&value.to_display_text()));
    natives.register_conversion(Type::List(None), Type::text(), |_, value| Value::text(&value.to_display_text()));
    natives.register_conversion(Type::text(), Type::number(), |_, value| match value {
        Value::Text { text, .. } => match text.trim().parse::<f64>() {
            Ok(number) => Value::number(number),
            Err(_) => Value::none(),
        },
        _ => Value::none(),
    });
    natives.register_conversion(Type::Set(None), Type::List(None), |_, value| match value {
        Value::Set(values) => Value::List(values.clone()),
        other => other.clone(),
    });
    natives.register_conversion(Type::List(None), Type::Set(None), |_, value| match value {
        Value::List(values) => Value::set(values.clone()),
        other => other.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_lookup() {
        let natives = NativeRegistry::with_defaults();
        assert!(natives.conversion(&Type::number(), &Type::text()).is_some());
        assert!(natives.conversion(&Type::Boolean, &Type::number()).is_none());
        let index = natives.conversion(&Type::List(Some(Box::new(Type::number()))), &Type::Set(None));
        assert!(index.is_some());
    }

    #[test]
    fn test_member_signatures_follow_receiver() {
        let natives = NativeRegistry::with_defaults();
        let list = Type::List(Some(Box::new(Type::text())));
        let add = natives.member(Category::List, "add").map(|f| (f.signature)(&list));
        match add {
            Some(signature) => {
                assert_eq!(signature.inputs[0].ty, Type::text());
                assert_eq!(*signature.output, list);
            },
            None => panic!("list add is not registered"),
        }
    }
}

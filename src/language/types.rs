use std::fmt;

use crate::common::*;

/// Product of base units with integer exponents. `m·s/h` is
/// `{m: 1, s: 1, h: -1}`; the empty map is the unitless unit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Unit {
    exponents: BTreeMap<String, i32>,
}

impl Unit {
    pub fn unitless() -> Self {
        Self::default()
    }

    pub fn of(name: &str) -> Self {
        let mut exponents = BTreeMap::new();
        exponents.insert(name.to_string(), 1);
        Self { exponents }
    }

    pub fn from_exponents<I: IntoIterator<Item = (String, i32)>>(pairs: I) -> Self {
        let mut exponents = BTreeMap::new();
        for (name, exponent) in pairs {
            *exponents.entry(name).or_insert(0) += exponent;
        }
        exponents.retain(|_, exponent| *exponent != 0);
        Self { exponents }
    }

    pub fn is_unitless(&self) -> bool {
        self.exponents.is_empty()
    }

    pub fn product(&self, other: &Unit) -> Unit {
        Self::from_exponents(
            self.exponents.iter().chain(other.exponents.iter()).map(|(n, e)| (n.clone(), *e)),
        )
    }

    pub fn quotient(&self, other: &Unit) -> Unit {
        Self::from_exponents(
            self.exponents.iter().map(|(n, e)| (n.clone(), *e))
                .chain(other.exponents.iter().map(|(n, e)| (n.clone(), -*e))),
        )
    }

    pub fn power(&self, exponent: i32) -> Unit {
        Self::from_exponents(self.exponents.iter().map(|(n, e)| (n.clone(), *e * exponent)))
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_part = |f: &mut fmt::Formatter<'_>, parts: Vec<(&String, i32)>| -> fmt::Result {
            for (index, (name, exponent)) in parts.iter().enumerate() {
                if index > 0 {
                    write!(f, "·")?;
                }
                write!(f, "{}", name)?;
                if *exponent != 1 {
                    write!(f, "^{}", exponent)?;
                }
            }
            Ok(())
        };
        let numerator: Vec<_> = self.exponents.iter().filter(|(_, e)| **e > 0).map(|(n, e)| (n, *e)).collect();
        let denominator: Vec<_> = self.exponents.iter().filter(|(_, e)| **e < 0).map(|(n, e)| (n, -*e)).collect();
        write_part(f, numerator)?;
        if !denominator.is_empty() {
            write!(f, "/")?;
            write_part(f, denominator)?;
        }
        Ok(())
    }
}

/// Why a type could not be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UnknownReason {
    #[display(fmt = "cycle")]
    Cycle,
    #[display(fmt = "not annotated")]
    NotAnnotated,
    #[display(fmt = "unknown name")]
    UnknownName,
    #[display(fmt = "unparsable")]
    Unparsable,
    #[display(fmt = "not a function")]
    NotAFunction,
    #[display(fmt = "incompatible operands")]
    Incompatible,
    #[display(fmt = "placeholder")]
    Placeholder,
    #[display(fmt = "not an expression")]
    NotAnExpression,
}

/// Value categories, the unit natives are registered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum Category {
    #[display(fmt = "measurement")]
    Measurement,
    #[display(fmt = "text")]
    Text,
    #[display(fmt = "boolean")]
    Boolean,
    #[display(fmt = "none")]
    None,
    #[display(fmt = "list")]
    List,
    #[display(fmt = "set")]
    Set,
    #[display(fmt = "map")]
    Map,
    #[display(fmt = "table")]
    Table,
    #[display(fmt = "function")]
    Function,
    #[display(fmt = "stream")]
    Stream,
    #[display(fmt = "structure")]
    Structure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnType {
    pub name: String,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputType {
    pub name: Option<String>,
    pub ty: Type,
    pub required: bool,
}

impl InputType {
    pub fn required(name: &str, ty: Type) -> Self {
        Self { name: Some(name.to_string()), ty, required: true }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub type_variables: Vec<NodeId>,
    pub inputs: Vec<InputType>,
    pub output: Box<Type>,
}

impl FunctionSignature {
    pub fn new(inputs: Vec<InputType>, output: Type) -> Self {
        Self { type_variables: Vec::new(), inputs, output: Box::new(output) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureType {
    pub definition: NodeId,
    pub name: String,
    pub interfaces: Vec<NodeId>,
    pub inputs: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// `None` accepts measurements of any unit.
    Measurement(Option<Unit>),
    /// `None` accepts texts of any format.
    Text(Option<String>),
    Boolean,
    None(Option<String>),
    /// Collections with an absent item type are empty literals or accept
    /// any items.
    List(Option<Box<Type>>),
    Set(Option<Box<Type>>),
    Map(Option<Box<Type>>, Option<Box<Type>>),
    Table(Vec<ColumnType>),
    Function(FunctionSignature),
    Stream(Box<Type>),
    Structure(StructureType),
    Variable { definition: NodeId, name: String },
    Union(Vec<Type>),
    Unknown(UnknownReason),
}

fn items_accept(expected: &Option<Box<Type>>, given: &Option<Box<Type>>) -> bool {
    match (expected, given) {
        (None, _) | (_, None) => true,
        (Some(expected), Some(given)) => expected.accepts(given),
    }
}

impl Type {
    pub fn measurement(unit: Unit) -> Type {
        Type::Measurement(Some(unit))
    }

    pub fn number() -> Type {
        Type::Measurement(Some(Unit::unitless()))
    }

    pub fn text() -> Type {
        Type::Text(None)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Type::Unknown(_))
    }

    /// Types the conflict engine cannot judge: unknown types and type
    /// variables that are only bound when a function is evaluated.
    pub fn is_indeterminate(&self) -> bool {
        match self {
            Type::Unknown(_) | Type::Variable { .. } => true,
            Type::Union(members) => members.iter().any(|m| m.is_indeterminate()),
            _ => false,
        }
    }

    /// Whether a value of type `other` may be used where `self` is expected.
    /// Structural for everything but structures, which are nominal.
    pub fn accepts(&self, other: &Type) -> bool {
        use Type::*;
        match (self, other) {
            (Unknown(_), _) | (_, Unknown(_)) => false,
            (_, Union(members)) => self.accepts_all(members),
            (Union(members), _) => members.iter().any(|m| m.accepts(other)),
            (Measurement(Option::None), Measurement(_)) => true,
            (Measurement(Some(expected)), Measurement(Some(given))) => expected == given,
            (Text(Option::None), Text(_)) => true,
            (Text(Some(expected)), Text(given)) => given.as_ref() == Some(expected),
            (Boolean, Boolean) => true,
            (None(Option::None), None(_)) => true,
            (None(Some(expected)), None(given)) => given.as_ref() == Some(expected),
            (List(expected), List(given)) => items_accept(expected, given),
            (Set(expected), Set(given)) => items_accept(expected, given),
            (Map(ek, ev), Map(gk, gv)) => items_accept(ek, gk) && items_accept(ev, gv),
            (Table(expected), Table(given)) => {
                expected.len() == given.len()
                    && expected.iter().zip(given.iter()).all(|(e, g)| e.name == g.name && e.ty.accepts(&g.ty))
            },
            (Function(expected), Function(given)) => {
                expected.inputs.len() == given.inputs.len()
                    && expected.inputs.iter().zip(given.inputs.iter()).all(|(e, g)| g.ty.accepts(&e.ty))
                    && expected.output.accepts(&given.output)
            },
            (Stream(expected), Stream(given)) => expected.accepts(given),
            (Structure(expected), Structure(given)) => {
                expected.definition == given.definition || given.interfaces.contains(&expected.definition)
            },
            (Variable { definition: expected, .. }, Variable { definition: given, .. }) => expected == given,
            _ => false,
        }
    }

    pub fn accepts_all(&self, types: &[Type]) -> bool {
        types.iter().all(|t| self.accepts(t))
    }

    /// Flattened members of a union, or the type itself.
    pub fn members(&self) -> Vec<Type> {
        match self {
            Type::Union(members) => members.iter().flat_map(|m| m.members()).collect(),
            other => vec![other.clone()],
        }
    }

    /// Union of the given types without duplicates. A single type stays
    /// itself; no types at all make the none type.
    pub fn union_of<I: IntoIterator<Item = Type>>(types: I) -> Type {
        let mut members: Vec<Type> = Vec::new();
        for ty in types {
            for member in ty.members() {
                if !members.contains(&member) {
                    members.push(member);
                }
            }
        }
        match members.len() {
            0 => Type::None(None),
            1 => members.remove(0),
            _ => Type::Union(members),
        }
    }

    /// Replaces bound type variables.
    pub fn substitute(&self, bindings: &HashMap<NodeId, Type>) -> Type {
        use Type::*;
        let sub = |t: &Option<Box<Type>>| t.as_ref().map(|t| Box::new(t.substitute(bindings)));
        match self {
            Variable { definition, .. } => match bindings.get(definition) {
                Some(bound) => bound.clone(),
                Option::None => self.clone(),
            },
            List(item) => List(sub(item)),
            Set(item) => Set(sub(item)),
            Map(key, value) => Map(sub(key), sub(value)),
            Table(columns) => Table(
                columns.iter().map(|c| ColumnType { name: c.name.clone(), ty: c.ty.substitute(bindings) }).collect(),
            ),
            Function(signature) => Function(FunctionSignature {
                type_variables: signature.type_variables.iter()
                    .filter(|v| !bindings.contains_key(v)).copied().collect(),
                inputs: signature.inputs.iter().map(|i| InputType {
                    name: i.name.clone(),
                    ty: i.ty.substitute(bindings),
                    required: i.required,
                }).collect(),
                output: Box::new(signature.output.substitute(bindings)),
            }),
            Stream(inner) => Stream(Box::new(inner.substitute(bindings))),
            Structure(structure) => Structure(StructureType {
                definition: structure.definition,
                name: structure.name.clone(),
                interfaces: structure.interfaces.clone(),
                inputs: structure.inputs.iter().map(|t| t.substitute(bindings)).collect(),
            }),
            Union(members) => Type::union_of(members.iter().map(|m| m.substitute(bindings))),
            other => other.clone(),
        }
    }

    /// Binds the type variables in `self` by matching it against `given`.
    /// Variables that are already bound keep their first binding.
    pub fn infer(&self, given: &Type, bindings: &mut HashMap<NodeId, Type>) {
        use Type::*;
        match (self, given) {
            (Variable { definition, .. }, _) => {
                if !given.is_unknown() {
                    bindings.entry(*definition).or_insert_with(|| given.clone());
                }
            },
            (List(Some(e)), List(Some(g))) | (Set(Some(e)), Set(Some(g))) | (Stream(e), Stream(g)) => {
                e.infer(g, bindings)
            },
            (Map(ek, ev), Map(gk, gv)) => {
                if let (Some(e), Some(g)) = (ek, gk) {
                    e.infer(g, bindings);
                }
                if let (Some(e), Some(g)) = (ev, gv) {
                    e.infer(g, bindings);
                }
            },
            (Function(e), Function(g)) => {
                for (ei, gi) in e.inputs.iter().zip(g.inputs.iter()) {
                    ei.ty.infer(&gi.ty, bindings);
                }
                e.output.infer(&g.output, bindings);
            },
            _ => {},
        }
    }

    /// Removes the members accepted by `removed`.
    pub fn without(&self, removed: &Type) -> Type {
        let remaining: Vec<Type> = self.members().into_iter().filter(|m| !removed.accepts(m)).collect();
        Type::union_of(remaining)
    }

    pub fn category(&self) -> Option<Category> {
        use Type::*;
        match self {
            Measurement(_) => Some(Category::Measurement),
            Text(_) => Some(Category::Text),
            Boolean => Some(Category::Boolean),
            None(_) => Some(Category::None),
            List(_) => Some(Category::List),
            Set(_) => Some(Category::Set),
            Map(_, _) => Some(Category::Map),
            Table(_) => Some(Category::Table),
            Function(_) => Some(Category::Function),
            Stream(_) => Some(Category::Stream),
            Structure(_) => Some(Category::Structure),
            Variable { .. } | Union(_) | Unknown(_) => Option::None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Type::*;
        let item = |t: &Option<Box<Type>>| t.as_ref().map(|t| t.to_string()).unwrap_or_default();
        match self {
            Measurement(Some(unit)) => write!(f, "#{}", unit),
            Measurement(Option::None) => write!(f, "#*"),
            Text(Some(format)) => write!(f, "''/{}", format),
            Text(Option::None) => write!(f, "''"),
            Boolean => write!(f, "?"),
            None(Some(name)) => write!(f, "!{}", name),
            None(Option::None) => write!(f, "!"),
            List(t) => write!(f, "[{}]", item(t)),
            Set(t) => write!(f, "{{{}}}", item(t)),
            Map(k, v) => write!(f, "{{{}:{}}}", item(k), item(v)),
            Table(columns) => {
                for column in columns {
                    write!(f, "|{}•{}", column.name, column.ty)?;
                }
                Ok(())
            },
            Function(signature) => {
                write!(f, "ƒ(")?;
                for (index, input) in signature.inputs.iter().enumerate() {
                    if index > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", input.ty)?;
                }
                write!(f, ") {}", signature.output)
            },
            Stream(inner) => write!(f, "∆{}", inner),
            Structure(structure) => write!(f, "{}", structure.name),
            Variable { name, .. } => write!(f, "{}", name),
            Union(members) => {
                for (index, member) in members.iter().enumerate() {
                    if index > 0 {
                        write!(f, "∨")?;
                    }
                    write!(f, "{}", member)?;
                }
                Ok(())
            },
            Unknown(reason) => write!(f, "unknown ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples() -> Vec<Type> {
        vec![
            Type::number(),
            Type::measurement(Unit::of("m")),
            Type::Measurement(None),
            Type::text(),
            Type::Text(Some("eng".to_string())),
            Type::Boolean,
            Type::None(None),
            Type::List(Some(Box::new(Type::number()))),
            Type::List(None),
            Type::Set(Some(Box::new(Type::text()))),
            Type::Map(Some(Box::new(Type::text())), Some(Box::new(Type::Boolean))),
            Type::Table(vec![ColumnType { name: "a".to_string(), ty: Type::number() }]),
            Type::Function(FunctionSignature::new(vec![InputType::required("x", Type::number())], Type::text())),
            Type::Stream(Box::new(Type::number())),
            Type::Union(vec![Type::number(), Type::None(None)]),
        ]
    }

    #[test]
    fn test_unspecified_unit_and_format_accept_any() {
        assert!(Type::Measurement(None).accepts(&Type::number()));
        assert!(Type::Measurement(None).accepts(&Type::measurement(Unit::of("m"))));
        assert!(Type::Text(None).accepts(&Type::Text(Some("eng".to_string()))));
        assert!(!Type::Text(Some("eng".to_string())).accepts(&Type::Text(None)));
        assert!(!Type::measurement(Unit::of("m")).accepts(&Type::number()));
    }

    #[test]
    fn test_acceptance_is_reflexive() {
        for ty in samples() {
            assert!(ty.accepts(&ty), "{} does not accept itself", ty);
        }
    }

    #[test]
    fn test_unknown_accepts_nothing() {
        let unknown = Type::Unknown(UnknownReason::Cycle);
        assert!(!unknown.accepts(&unknown));
        for ty in samples() {
            assert!(!unknown.accepts(&ty));
            assert!(!ty.accepts(&unknown));
        }
    }

    #[test]
    fn test_units_must_match() {
        let meters = Type::measurement(Unit::of("m"));
        let seconds = Type::measurement(Unit::of("s"));
        assert!(!meters.accepts(&seconds));
        assert!(Type::Measurement(None).accepts(&seconds));
        let speed = Unit::of("m").quotient(&Unit::of("s"));
        assert_eq!(speed.to_string(), "m/s");
        assert!(speed.product(&Unit::of("s")) == Unit::of("m"));
    }

    #[test]
    fn test_unions() {
        let optional = Type::union_of(vec![Type::number(), Type::None(None)]);
        assert!(optional.accepts(&Type::number()));
        assert!(optional.accepts(&Type::None(None)));
        assert!(!Type::number().accepts(&optional));
        assert_eq!(optional.without(&Type::None(None)), Type::number());
    }

    #[test]
    fn test_function_variance() {
        let takes_any = Type::Function(FunctionSignature::new(
            vec![InputType::required("x", Type::Measurement(None))], Type::number(),
        ));
        let takes_meters = Type::Function(FunctionSignature::new(
            vec![InputType::required("x", Type::measurement(Unit::of("m")))], Type::number(),
        ));
        // A function taking any measurement can stand in for one taking meters
        assert!(takes_meters.accepts(&takes_any));
        assert!(!takes_any.accepts(&takes_meters));
    }
}

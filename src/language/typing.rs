//! Name resolution and type computation. Everything here is a pure
//! function of the tree; `Context` caches the results.

use crate::common::*;
use crate::language::context::{Context, Definition};
use crate::language::types::*;

/// Binary and unary operators by meaning, independent of spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
    NotEqual,
    And,
    Or,
    Negate,
    Not,
}

impl Operator {
    pub fn binary(symbol: &str) -> Option<Operator> {
        use Operator::*;
        let operator = match symbol {
            "+" => Add,
            "-" => Subtract,
            "×" | "*" | "·" => Multiply,
            "÷" => Divide,
            "%" => Remainder,
            "^" => Power,
            "<" => Less,
            ">" => Greater,
            "≤" | "<=" => LessOrEqual,
            "≥" | ">=" => GreaterOrEqual,
            "=" => Equal,
            "≠" | "!=" => NotEqual,
            "∧" | "&" => And,
            "∨" => Or,
            _ => return None,
        };
        Some(operator)
    }

    pub fn unary(symbol: &str) -> Option<Operator> {
        match symbol {
            "-" => Some(Operator::Negate),
            "¬" | "~" => Some(Operator::Not),
            _ => None,
        }
    }

    pub fn is_comparison(&self) -> bool {
        use Operator::*;
        matches!(self, Less | Greater | LessOrEqual | GreaterOrEqual)
    }
}

//------------------------------------------------------------------------------
// Names
//------------------------------------------------------------------------------

/// The names in a `Names` node, in order.
pub fn names_of(context: &Context, names: NodeId) -> Vec<String> {
    match node_as!(context.heap(), names, Names) {
        Some(names) => names
            .names
            .iter()
            .filter_map(|name| node_as!(context.heap(), *name, Name))
            .map(|name| context.text(name.name).to_string())
            .collect(),
        None => Vec::new(),
    }
}

/// Names a statement defines.
pub fn defined_names(context: &Context, statement: NodeId) -> Vec<String> {
    match context.node(statement) {
        Node::Bind(bind) => names_of(context, bind.names),
        Node::Share(share) => defined_names(context, share.bind),
        Node::FunctionDefinition(function) => function.names.map(|n| names_of(context, n)).unwrap_or_default(),
        Node::StructureDefinition(structure) => names_of(context, structure.names),
        Node::TypeVariable(variable) => names_of(context, variable.names),
        _ => Vec::new(),
    }
}

fn statement_definition(context: &Context, statement: NodeId, name: &str) -> Option<Definition> {
    if !defined_names(context, statement).iter().any(|n| n == name) {
        return None;
    }
    match context.node(statement) {
        Node::Bind(_) => Some(Definition::Bind(statement)),
        Node::Share(share) => Some(Definition::Bind(share.bind)),
        Node::FunctionDefinition(_) => Some(Definition::Function(statement)),
        Node::StructureDefinition(_) => Some(Definition::Structure(statement)),
        _ => None,
    }
}

fn find_in(context: &Context, definitions: &[NodeId], name: &str) -> Option<NodeId> {
    definitions.iter().copied().find(|d| defined_names(context, *d).iter().any(|n| n == name))
}

/// Finds what `name` refers to at `from`, walking outwards. Binds are
/// visible from their own statement on; functions and structures anywhere
/// in their block.
pub fn resolve(context: &Context, from: NodeId, name: &str) -> Option<Definition> {
    let mut child = from;
    for ancestor in context.ancestors(from) {
        match context.node(ancestor) {
            Node::Block(block) => {
                let position = block.statements.iter().position(|s| *s == child);
                for (index, statement) in block.statements.iter().enumerate() {
                    match statement_definition(context, *statement, name) {
                        Some(Definition::Bind(bind)) => {
                            if position.map_or(true, |p| index <= p) {
                                return Some(Definition::Bind(bind));
                            }
                        },
                        Some(definition) => return Some(definition),
                        None => {},
                    }
                }
            },
            Node::FunctionDefinition(function) => {
                if let Some(input) = find_in(context, &function.inputs, name) {
                    return Some(Definition::Bind(input));
                }
                if let Some(variable) = find_in(context, &function.type_variables, name) {
                    return Some(Definition::TypeVariable(variable));
                }
            },
            Node::StructureDefinition(structure) => {
                if let Some(input) = find_in(context, &structure.inputs, name) {
                    return Some(Definition::Bind(input));
                }
                if let Some(variable) = find_in(context, &structure.type_variables, name) {
                    return Some(Definition::TypeVariable(variable));
                }
            },
            Node::Select(_) | Node::Update(_) | Node::Delete(_) => {
                if let Some(table) = query_table(context, ancestor) {
                    if child != table {
                        if let Type::Table(columns) = resolve_stream(context.get_type(table)) {
                            if let Some(index) = columns.iter().position(|c| c.name == name) {
                                return Some(Definition::Column { query: ancestor, index });
                            }
                        }
                    }
                }
            },
            Node::Program(program) => {
                for borrow in &program.borrows {
                    if let Some(b) = node_as!(context.heap(), *borrow, Borrow) {
                        if context.text(b.name) == name {
                            return Some(Definition::Borrow(*borrow));
                        }
                    }
                }
            },
            _ => {},
        }
        child = ancestor;
    }
    if context.natives().has_global(name) {
        return Some(Definition::Native);
    }
    None
}

/// The table expression of a select, update or delete.
pub fn query_table(context: &Context, query: NodeId) -> Option<NodeId> {
    match context.node(query) {
        Node::Select(select) => Some(select.table),
        Node::Update(update) => Some(update.table),
        Node::Delete(delete) => Some(delete.table),
        Node::Insert(insert) => Some(insert.table),
        _ => None,
    }
}

/// Member of a structure definition by name: an input or a definition in
/// its block.
pub fn structure_member(context: &Context, structure: NodeId, name: &str) -> Option<NodeId> {
    let definition = node_as!(context.heap(), structure, StructureDefinition)?;
    if let Some(input) = find_in(context, &definition.inputs, name) {
        return Some(input);
    }
    let block = node_as!(context.heap(), definition.block?, Block)?;
    block.statements.iter().copied().find_map(|statement| match statement_definition(context, statement, name)? {
        Definition::Bind(bind) => Some(bind),
        _ => Some(statement),
    })
}

//------------------------------------------------------------------------------
// Input matching
//------------------------------------------------------------------------------

/// How the inputs of an evaluation line up with a signature.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputMatch {
    /// Expression given for each declared input, if any.
    pub assigned: Vec<Option<NodeId>>,
    /// Position of each given input in `assigned`, `None` if unexpected.
    pub positions: Vec<Option<usize>>,
}

impl InputMatch {
    pub fn missing(&self, signature: &FunctionSignature) -> Vec<usize> {
        signature.inputs.iter().enumerate()
            .filter(|(i, input)| input.required && self.assigned.get(*i).map_or(true, |a| a.is_none()))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Named inputs (`name: value`) go to the input with that name, the others
/// fill the remaining inputs in order.
pub fn match_inputs(context: &Context, signature: &FunctionSignature, inputs: &[NodeId]) -> InputMatch {
    let mut result = InputMatch { assigned: vec![None; signature.inputs.len()], positions: Vec::new() };
    for input in inputs {
        let (target, expression) = match node_as!(context.heap(), *input, Bind) {
            Some(bind) => {
                let name = names_of(context, bind.names);
                let target = signature.inputs.iter().position(|i| match &i.name {
                    Some(declared) => name.contains(declared),
                    None => false,
                });
                (target, bind.value.unwrap_or(*input))
            },
            None => (result.assigned.iter().position(|a| a.is_none()), *input),
        };
        match target {
            Some(position) if result.assigned[position].is_none() => {
                result.assigned[position] = Some(expression);
                result.positions.push(Some(position));
            },
            _ => result.positions.push(None),
        }
    }
    result
}

/// The expression an evaluation input provides.
pub fn input_expression(context: &Context, input: NodeId) -> NodeId {
    match node_as!(context.heap(), input, Bind) {
        Some(bind) => bind.value.unwrap_or(input),
        None => input,
    }
}

//------------------------------------------------------------------------------
// Signatures and structures
//------------------------------------------------------------------------------

fn input_types(context: &Context, inputs: &[NodeId]) -> Vec<InputType> {
    inputs
        .iter()
        .map(|input| {
            let (name, required) = match node_as!(context.heap(), *input, Bind) {
                Some(bind) => (names_of(context, bind.names).into_iter().next(), bind.value.is_none()),
                None => (None, true),
            };
            InputType { name, ty: context.get_type(*input), required }
        })
        .collect()
}

pub fn function_signature(context: &Context, function: NodeId) -> Option<FunctionSignature> {
    let definition = node_as!(context.heap(), function, FunctionDefinition)?;
    let output = match (definition.output, definition.body) {
        (Some(output), _) => context.get_type(output),
        (None, Some(body)) => context.get_type(body),
        (None, None) => Type::Unknown(UnknownReason::NotAnnotated),
    };
    Some(FunctionSignature {
        type_variables: definition.type_variables.clone(),
        inputs: input_types(context, &definition.inputs),
        output: Box::new(output),
    })
}

pub fn structure_type(context: &Context, structure: NodeId) -> Type {
    let definition = match node_as!(context.heap(), structure, StructureDefinition) {
        Some(definition) => definition,
        None => return Type::Unknown(UnknownReason::NotAnExpression),
    };
    let interfaces = definition
        .interfaces
        .iter()
        .filter_map(|interface| {
            let name = node_as!(context.heap(), *interface, NameType)?;
            match resolve(context, *interface, context.text(name.name))? {
                Definition::Structure(found) => Some(found),
                _ => None,
            }
        })
        .collect();
    Type::Structure(StructureType {
        definition: structure,
        name: names_of(context, definition.names).into_iter().next().unwrap_or_default(),
        interfaces,
        inputs: definition
            .type_variables
            .iter()
            .map(|variable| context.get_type(*variable))
            .collect(),
    })
}

/// Signature of evaluating a structure definition as a function.
pub fn structure_signature(context: &Context, structure: NodeId) -> Option<FunctionSignature> {
    let definition = node_as!(context.heap(), structure, StructureDefinition)?;
    Some(FunctionSignature {
        type_variables: definition.type_variables.clone(),
        inputs: input_types(context, &definition.inputs),
        output: Box::new(structure_type(context, structure)),
    })
}

/// Whether the structure has abstract functions, which makes it an
/// interface that cannot be evaluated.
pub fn abstract_functions(context: &Context, structure: NodeId) -> Vec<NodeId> {
    let block = node_as!(context.heap(), structure, StructureDefinition)
        .and_then(|s| s.block)
        .and_then(|b| node_as!(context.heap(), b, Block));
    match block {
        Some(block) => block
            .statements
            .iter()
            .copied()
            .filter(|s| matches!(node_as!(context.heap(), *s, FunctionDefinition), Some(f) if f.etc.is_some()))
            .collect(),
        None => Vec::new(),
    }
}

pub fn resolve_stream(ty: Type) -> Type {
    match ty {
        Type::Stream(inner) => *inner,
        other => other,
    }
}

pub fn unit_of(context: &Context, unit: Option<NodeId>) -> Unit {
    let unit = match unit.and_then(|u| node_as!(context.heap(), u, Unit)) {
        Some(unit) => unit,
        None => return Unit::unitless(),
    };
    let mut sign = 1;
    let mut exponents: Vec<(String, i32)> = Vec::new();
    let mut tokens = unit.tokens.iter().peekable();
    while let Some(token) = tokens.next() {
        let token = context.heap().token(*token);
        match token.kind {
            TokenKind::Name => exponents.push((token.text.clone(), sign)),
            TokenKind::Language => sign = -1,
            TokenKind::BinaryOp if token.text == "^" => {
                let exponent = tokens.next().and_then(|t| context.heap().text(*t).parse::<i32>().ok());
                if let (Some(exponent), Some(last)) = (exponent, exponents.last_mut()) {
                    last.1 = sign * exponent;
                }
            },
            _ => {},
        }
    }
    Unit::from_exponents(exponents)
}

//------------------------------------------------------------------------------
// Types
//------------------------------------------------------------------------------

pub fn definition_type(context: &Context, definition: Definition, name: &str) -> Type {
    match definition {
        Definition::Bind(bind) => context.get_type(bind),
        Definition::Function(function) => function_signature(context, function)
            .map(Type::Function)
            .unwrap_or(Type::Unknown(UnknownReason::NotAFunction)),
        Definition::Structure(structure) => structure_signature(context, structure)
            .map(Type::Function)
            .unwrap_or(Type::Unknown(UnknownReason::NotAFunction)),
        Definition::TypeVariable(variable) => Type::Variable { definition: variable, name: name.to_string() },
        Definition::Column { query, index } => {
            let table = query_table(context, query).map(|t| resolve_stream(context.get_type(t)));
            match table {
                Some(Type::Table(columns)) if index < columns.len() => columns[index].ty.clone(),
                _ => Type::Unknown(UnknownReason::UnknownName),
            }
        },
        Definition::Borrow(_) => match context.shares().get(name) {
            Some(shared) => shared.ty.clone(),
            None => Type::Unknown(UnknownReason::UnknownName),
        },
        Definition::Native => {
            let natives = context.natives();
            if let Some(stream) = natives.stream(name) {
                Type::Stream(Box::new(stream.ty.clone()))
            } else if let Some(function) = natives.global(name) {
                Type::Function((function.signature)(&Type::None(None)))
            } else {
                Type::Unknown(UnknownReason::UnknownName)
            }
        },
    }
}

/// Type of the value `op` produces from operands of the given types, or
/// `None` if the operator does not apply to them.
pub fn operation_type(operator: Operator, left: &Type, right: &Type, exponent: Option<i32>) -> Option<Type> {
    use Operator::*;
    let boolean = Some(Type::Boolean);
    if matches!(operator, Equal | NotEqual) {
        return boolean;
    }
    match (left, right) {
        (Type::Measurement(l), Type::Measurement(r)) => {
            let (l, r) = match (l, r) {
                (Some(l), Some(r)) => (l, r),
                _ => return if operator.is_comparison() { boolean } else { Some(Type::Measurement(None)) },
            };
            match operator {
                Add | Subtract | Remainder if l == r => Some(Type::measurement(l.clone())),
                Multiply => Some(Type::measurement(l.product(r))),
                Divide => Some(Type::measurement(l.quotient(r))),
                Power if r.is_unitless() => match exponent {
                    Some(exponent) => Some(Type::measurement(l.power(exponent))),
                    None if l.is_unitless() => Some(Type::number()),
                    None => Some(Type::Measurement(None)),
                },
                _ if operator.is_comparison() && l == r => boolean,
                _ => None,
            }
        },
        (Type::Text(_), Type::Text(_)) => match operator {
            Add => Some(left.clone()),
            _ if operator.is_comparison() => boolean,
            _ => None,
        },
        (Type::Boolean, Type::Boolean) => match operator {
            And | Or => boolean,
            _ => None,
        },
        _ => None,
    }
}

fn literal_exponent(context: &Context, node: NodeId) -> Option<i32> {
    let literal = node_as!(context.heap(), node, MeasurementLiteral)?;
    context.text(literal.number).parse::<i32>().ok()
}

/// Whether `reference` is the reaction's own name used in its `next`
/// expression, which refers to the previous value.
fn reaction_initial(context: &Context, bind: NodeId, reference: NodeId) -> Option<NodeId> {
    let value = node_as!(context.heap(), bind, Bind)?.value?;
    let reaction = node_as!(context.heap(), value, Reaction)?;
    if context.is_inside(reference, reaction.next) {
        Some(reaction.initial)
    } else {
        None
    }
}

/// Narrows the type of a reference by the conditionals it sits in.
fn narrow(context: &Context, reference: NodeId, definition: Definition, ty: Type) -> Type {
    if ty.members().len() < 2 {
        return ty;
    }
    let mut narrowed = ty;
    let mut child = reference;
    for ancestor in context.ancestors(reference) {
        if let Some(conditional) = node_as!(context.heap(), ancestor, Conditional) {
            if conditional.yes == child {
                narrowed = narrow_by(context, conditional.condition, definition, narrowed, true);
            } else if conditional.no == child {
                narrowed = narrow_by(context, conditional.condition, definition, narrowed, false);
            }
        }
        child = ancestor;
    }
    narrowed
}

fn refers_to(context: &Context, node: NodeId, definition: Definition) -> bool {
    match node_as!(context.heap(), node, Reference) {
        Some(reference) => resolve(context, node, context.text(reference.name)) == Some(definition),
        None => false,
    }
}

fn narrow_by(context: &Context, condition: NodeId, definition: Definition, ty: Type, positive: bool) -> Type {
    match context.node(condition) {
        Node::Is(is) if refers_to(context, is.expression, definition) => {
            let guard = context.get_type(is.ty);
            if positive {
                let matching: Vec<Type> = ty.members().into_iter().filter(|m| guard.accepts(m)).collect();
                if matching.is_empty() {
                    ty
                } else {
                    Type::union_of(matching)
                }
            } else {
                let remaining: Vec<Type> = ty.members().into_iter().filter(|m| !guard.accepts(m)).collect();
                if remaining.is_empty() {
                    ty
                } else {
                    Type::union_of(remaining)
                }
            }
        },
        Node::BinaryOperation(operation) => {
            let operator = Operator::binary(context.text(operation.operator));
            match operator {
                Some(Operator::And) if positive => {
                    let left = narrow_by(context, operation.left, definition, ty, true);
                    narrow_by(context, operation.right, definition, left, true)
                },
                Some(Operator::Equal) | Some(Operator::NotEqual) => {
                    let (left, right) = (operation.left, operation.right);
                    let compares_none = (refers_to(context, left, definition)
                        && matches!(context.node(right), Node::NoneLiteral(_)))
                        || (refers_to(context, right, definition)
                            && matches!(context.node(left), Node::NoneLiteral(_)));
                    if !compares_none {
                        return ty;
                    }
                    let is_none = (operator == Some(Operator::Equal)) == positive;
                    let none = Type::None(None);
                    let members = ty.members();
                    let selected: Vec<Type> = members.iter().filter(|m| none.accepts(m) == is_none).cloned().collect();
                    if selected.is_empty() {
                        ty
                    } else {
                        Type::union_of(selected)
                    }
                },
                _ => ty,
            }
        },
        Node::UnaryOperation(unary) if Operator::unary(context.text(unary.operator)) == Some(Operator::Not) => {
            narrow_by(context, unary.operand, definition, ty, !positive)
        },
        _ => ty,
    }
}

/// Computes the type of any node. Non-expression nodes that do not stand
/// for a type are of unknown type.
pub fn compute_type(context: &Context, id: NodeId) -> Type {
    let heap = context.heap();
    match context.node(id) {
        Node::Program(program) => context.get_type(program.block),
        Node::Block(block) => match block.statements.last() {
            Some(last) => context.get_type(*last),
            None => Type::None(None),
        },
        Node::Share(share) => context.get_type(share.bind),
        Node::Bind(bind) => match (bind.ty, bind.value) {
            (Some(ty), _) => context.get_type(ty),
            (None, Some(value)) => context.get_type(value),
            (None, None) => Type::Unknown(UnknownReason::NotAnnotated),
        },
        Node::Column(column) => context.get_type(column.bind),
        Node::Cell(cell) => context.get_type(cell.value),
        Node::TypeInput(input) => context.get_type(input.ty),
        Node::TypeVariable(variable) => Type::Variable {
            definition: id,
            name: names_of(context, variable.names).into_iter().next().unwrap_or_default(),
        },

        Node::MeasurementLiteral(literal) => Type::measurement(unit_of(context, literal.unit)),
        Node::BooleanLiteral(_) => Type::Boolean,
        Node::NoneLiteral(none) => Type::None(none.names.and_then(|n| names_of(context, n).into_iter().next())),
        Node::TextLiteral(text) => Type::Text(format_of(context, text.format)),
        Node::Template(template) => Type::Text(format_of(context, template.format)),
        Node::ListLiteral(list) => Type::List(item_type(context, &list.values)),
        Node::SetLiteral(set) => Type::Set(item_type(context, &set.values)),
        Node::MapLiteral(map) => {
            let pairs: Vec<_> = map.pairs.iter().filter_map(|p| node_as!(heap, *p, KeyValue)).collect();
            let keys: Vec<NodeId> = pairs.iter().map(|p| p.key).collect();
            let values: Vec<NodeId> = pairs.iter().map(|p| p.value).collect();
            Type::Map(item_type(context, &keys), item_type(context, &values))
        },
        Node::TableLiteral(table) => Type::Table(column_types(context, &table.columns)),

        Node::Reference(reference) => {
            let name = context.text(reference.name);
            match resolve(context, id, name) {
                Some(Definition::Bind(bind)) => {
                    if let Some(initial) = reaction_initial(context, bind, id) {
                        return context.get_type(initial);
                    }
                    let ty = context.get_type(bind);
                    narrow(context, id, Definition::Bind(bind), ty)
                },
                Some(definition) => definition_type(context, definition, name),
                None => Type::Unknown(UnknownReason::UnknownName),
            }
        },
        Node::This(_) => {
            for ancestor in context.ancestors(id) {
                match context.node(ancestor) {
                    Node::ConversionDefinition(conversion) => return context.get_type(conversion.input),
                    Node::StructureDefinition(_) => return structure_type(context, ancestor),
                    _ => {},
                }
            }
            Type::Unknown(UnknownReason::UnknownName)
        },
        Node::PropertyReference(property) => {
            let subject = resolve_stream(context.get_type(property.structure));
            property_type(context, &subject, context.text(property.name))
        },
        Node::ListAccess(access) => match resolve_stream(context.get_type(access.list)) {
            Type::List(Some(item)) => *item,
            Type::List(None) => Type::None(None),
            _ => Type::Unknown(UnknownReason::Incompatible),
        },
        Node::SetOrMapAccess(access) => match resolve_stream(context.get_type(access.set)) {
            Type::Set(_) => Type::Boolean,
            Type::Map(_, Some(value)) => *value,
            Type::Map(_, None) => Type::None(None),
            _ => Type::Unknown(UnknownReason::Incompatible),
        },
        Node::Evaluate(evaluate) => match resolve_stream(context.get_type(evaluate.func)) {
            Type::Function(signature) => {
                let explicit: Vec<Type> = evaluate.type_inputs.iter().map(|t| context.get_type(*t)).collect();
                let matched = match_inputs(context, &signature, &evaluate.inputs);
                let given: Vec<Type> = matched
                    .assigned
                    .iter()
                    .map(|a| a.map(|e| context.get_type(e)).unwrap_or(Type::Unknown(UnknownReason::NotAnnotated)))
                    .collect();
                *context.instantiate(&signature, &explicit, &given).output
            },
            _ => match context.get_type(evaluate.func) {
                Type::Stream(inner) if evaluate.inputs.is_empty() => Type::Stream(inner),
                _ => Type::Unknown(UnknownReason::NotAFunction),
            },
        },
        Node::Convert(convert) => context.get_type(convert.ty),
        Node::Select(select) => match resolve_stream(context.get_type(select.table)) {
            Type::Table(columns) => {
                let selected: Vec<String> = selected_columns(context, select.row);
                if selected.is_empty() {
                    Type::Table(columns)
                } else {
                    Type::Table(columns.into_iter().filter(|c| selected.contains(&c.name)).collect())
                }
            },
            _ => Type::Unknown(UnknownReason::Incompatible),
        },
        Node::Insert(insert) => resolve_stream(context.get_type(insert.table)),
        Node::Update(update) => resolve_stream(context.get_type(update.table)),
        Node::Delete(delete) => resolve_stream(context.get_type(delete.table)),
        Node::Reaction(reaction) => resolve_stream(context.get_type(reaction.initial)),
        Node::Conditional(conditional) => {
            Type::union_of(vec![context.get_type(conditional.yes), context.get_type(conditional.no)])
        },
        Node::BinaryOperation(operation) => {
            let left = resolve_stream(context.get_type(operation.left));
            let right = resolve_stream(context.get_type(operation.right));
            match Operator::binary(context.text(operation.operator)) {
                Some(operator) => {
                    let exponent = literal_exponent(context, operation.right);
                    operation_type(operator, &left, &right, exponent)
                        .unwrap_or(Type::Unknown(UnknownReason::Incompatible))
                },
                None => Type::Unknown(UnknownReason::Incompatible),
            }
        },
        Node::UnaryOperation(unary) => {
            let operand = resolve_stream(context.get_type(unary.operand));
            match (Operator::unary(context.text(unary.operator)), &operand) {
                (Some(Operator::Negate), Type::Measurement(_)) => operand,
                (Some(Operator::Not), Type::Boolean) => Type::Boolean,
                _ => Type::Unknown(UnknownReason::Incompatible),
            }
        },
        Node::Is(_) => Type::Boolean,
        Node::FunctionDefinition(_) => function_signature(context, id)
            .map(Type::Function)
            .unwrap_or(Type::Unknown(UnknownReason::NotAFunction)),
        Node::StructureDefinition(_) => structure_signature(context, id)
            .map(Type::Function)
            .unwrap_or(Type::Unknown(UnknownReason::NotAFunction)),
        Node::ConversionDefinition(conversion) => Type::Function(FunctionSignature::new(
            vec![InputType { name: None, ty: context.get_type(conversion.input), required: true }],
            context.get_type(conversion.output),
        )),
        Node::ExpressionPlaceholder(_) | Node::TypePlaceholder(_) => Type::Unknown(UnknownReason::Placeholder),
        Node::Unparsable(_) => Type::Unknown(UnknownReason::Unparsable),

        Node::NameType(name_type) => {
            let name = context.text(name_type.name);
            match resolve(context, id, name) {
                Some(Definition::Structure(structure)) => match structure_type(context, structure) {
                    Type::Structure(mut structure) => {
                        structure.inputs = name_type.type_inputs.iter().map(|t| context.get_type(*t)).collect();
                        Type::Structure(structure)
                    },
                    other => other,
                },
                Some(Definition::TypeVariable(variable)) => Type::Variable { definition: variable, name: name.to_string() },
                _ => Type::Unknown(UnknownReason::UnknownName),
            }
        },
        Node::BooleanType(_) => Type::Boolean,
        Node::MeasurementType(measurement) => Type::measurement(unit_of(context, measurement.unit)),
        Node::TextType(text) => Type::Text(format_of(context, text.format)),
        Node::NoneType(none) => Type::None(none.names.and_then(|n| names_of(context, n).into_iter().next())),
        Node::ListType(list) => Type::List(list.item.map(|i| Box::new(context.get_type(i)))),
        Node::SetOrMapType(set) => {
            let key = set.key.map(|k| Box::new(context.get_type(k)));
            if set.bind.is_some() {
                Type::Map(key, set.value.map(|v| Box::new(context.get_type(v))))
            } else {
                Type::Set(key)
            }
        },
        Node::TableType(table) => Type::Table(column_types(context, &table.columns)),
        Node::FunctionType(function) => Type::Function(FunctionSignature::new(
            function
                .inputs
                .iter()
                .map(|i| InputType { name: None, ty: context.get_type(*i), required: true })
                .collect(),
            context.get_type(function.output),
        )),
        Node::StreamType(stream) => Type::Stream(Box::new(context.get_type(stream.ty))),
        Node::UnionType(union) => Type::union_of(vec![context.get_type(union.left), context.get_type(union.right)]),

        Node::Borrow(borrow) => match context.shares().get(context.text(borrow.name)) {
            Some(shared) => shared.ty.clone(),
            None => Type::Unknown(UnknownReason::UnknownName),
        },
        Node::Docs(_) | Node::Doc(_) | Node::Language(_) | Node::Names(_) | Node::Name(_) | Node::Unit(_)
        | Node::KeyValue(_) | Node::Row(_) => Type::Unknown(UnknownReason::NotAnExpression),
    }
}

fn format_of(context: &Context, language: Option<NodeId>) -> Option<String> {
    let language = node_as!(context.heap(), language?, Language)?;
    language.name.map(|n| context.text(n).to_string())
}

fn item_type(context: &Context, items: &[NodeId]) -> Option<Box<Type>> {
    if items.is_empty() {
        None
    } else {
        Some(Box::new(Type::union_of(items.iter().map(|i| context.get_type(*i)))))
    }
}

fn column_types(context: &Context, columns: &[NodeId]) -> Vec<ColumnType> {
    columns
        .iter()
        .filter_map(|c| node_as!(context.heap(), *c, Column))
        .map(|column| ColumnType {
            name: names_of_bind(context, column.bind).into_iter().next().unwrap_or_default(),
            ty: context.get_type(column.bind),
        })
        .collect()
}

pub fn names_of_bind(context: &Context, bind: NodeId) -> Vec<String> {
    match node_as!(context.heap(), bind, Bind) {
        Some(bind) => names_of(context, bind.names),
        None => Vec::new(),
    }
}

/// Column names a select row lists.
pub fn selected_columns(context: &Context, row: NodeId) -> Vec<String> {
    match node_as!(context.heap(), row, Row) {
        Some(row) => row
            .cells
            .iter()
            .filter_map(|c| node_as!(context.heap(), *c, Cell))
            .filter_map(|cell| node_as!(context.heap(), cell.value, Reference))
            .map(|reference| context.text(reference.name).to_string())
            .collect(),
        None => Vec::new(),
    }
}

/// Type of `name` accessed on a value of type `subject`.
pub fn property_type(context: &Context, subject: &Type, name: &str) -> Type {
    if let Type::Structure(structure) = subject {
        if let Some(member) = structure_member(context, structure.definition, name) {
            let ty = context.get_type(member);
            let variables = node_as!(context.heap(), structure.definition, StructureDefinition)
                .map(|s| s.type_variables.clone())
                .unwrap_or_default();
            let bindings: HashMap<NodeId, Type> =
                variables.into_iter().zip(structure.inputs.iter().cloned()).collect();
            return ty.substitute(&bindings);
        }
        return Type::Unknown(UnknownReason::UnknownName);
    }
    match subject.category().and_then(|category| context.natives().member(category, name)) {
        Some(function) => Type::Function((function.signature)(subject)),
        None => Type::Unknown(UnknownReason::UnknownName),
    }
}

/// How a conversion from `input` to `output` is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionTarget {
    Definition(NodeId),
    Native(usize),
    Identity,
}

/// Finds the conversion for a `→` at `from`: conversions defined in
/// enclosing blocks or in the input's structure first, then natives.
pub fn find_conversion(context: &Context, from: NodeId, input: &Type, output: &Type) -> Option<ConversionTarget> {
    let matches = |conversion: NodeId| match node_as!(context.heap(), conversion, ConversionDefinition) {
        Some(definition) => {
            context.get_type(definition.input).accepts(input) && output.accepts(&context.get_type(definition.output))
        },
        None => false,
    };
    let mut scopes: Vec<NodeId> = context.ancestors(from);
    if let Type::Structure(structure) = input {
        if let Some(block) = node_as!(context.heap(), structure.definition, StructureDefinition).and_then(|s| s.block) {
            scopes.push(block);
        }
    }
    for scope in scopes {
        if let Some(block) = node_as!(context.heap(), scope, Block) {
            if let Some(found) = block.statements.iter().copied().find(|s| matches(*s)) {
                return Some(ConversionTarget::Definition(found));
            }
        }
    }
    if let Some(index) = context.natives().conversion(input, output) {
        return Some(ConversionTarget::Native(index));
    }
    if output.accepts(input) {
        return Some(ConversionTarget::Identity);
    }
    None
}

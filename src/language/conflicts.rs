use crate::common::*;
use crate::language::ast::UnparsableReason;
use crate::language::context::{Context, Definition};
use crate::language::types::{Type, UnknownReason};
use crate::language::typing::{
    self, abstract_functions, defined_names, find_conversion, match_inputs, names_of_bind, operation_type,
    property_type, resolve_stream, Operator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Prevents evaluation of the node.
    Blocking,
    Advisory,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum ConflictKind {
    #[display(fmt = "unparsable: {}", _0)]
    Unparsable(UnparsableReason),
    #[display(fmt = "unknown name {}", _0)]
    UnknownName(String),
    #[display(fmt = "refers to something unparsable")]
    ReferenceToUnparsable,
    #[display(fmt = "{} refers to itself", _0)]
    CircularReference(String),
    #[display(fmt = "nothing shares {}", _0)]
    UnknownBorrow(String),
    #[display(fmt = "unknown property {}", _0)]
    UnknownProperty(String),
    #[display(fmt = "unknown type {}", _0)]
    UnknownTypeName(String),
    #[display(fmt = "duplicate name {}", _0)]
    DuplicateName(String),
    #[display(fmt = "duplicate language {}", _0)]
    DuplicateLanguage(String),
    #[display(fmt = "duplicate type variable {}", _0)]
    DuplicateTypeVariables(String),
    #[display(fmt = "required input after an optional one")]
    RequiredAfterOptional,
    #[display(fmt = "function {} of the interface is not implemented", _0)]
    Unimplemented(String),
    #[display(fmt = "interface mixes implemented and unimplemented functions")]
    Implemented,
    #[display(fmt = "interfaces cannot have inputs")]
    DisallowedInputs,
    #[display(fmt = "value does not match the declared type")]
    IncompatibleBind,
    #[display(fmt = "body does not match the declared output")]
    IncompatibleOutput,
    #[display(fmt = "not a function")]
    NotAFunction,
    #[display(fmt = "missing input {}", _0)]
    MissingInput(String),
    #[display(fmt = "unexpected input")]
    UnexpectedInput,
    #[display(fmt = "input does not match the declared type")]
    IncompatibleInput,
    #[display(fmt = "operator does not apply to these operands")]
    IncompatibleOperand,
    #[display(fmt = "condition is not a boolean")]
    ExpectedBooleanCondition,
    #[display(fmt = "not a list")]
    NotAList,
    #[display(fmt = "not a number")]
    NotANumber,
    #[display(fmt = "not a set or map")]
    NotASetOrMap,
    #[display(fmt = "sets and maps cannot be mixed")]
    MixedSetAndMap,
    #[display(fmt = "not a stream")]
    NotAStream,
    #[display(fmt = "not a table")]
    NotATable,
    #[display(fmt = "query is not a boolean")]
    NonBooleanQuery,
    #[display(fmt = "row does not match the table's columns")]
    IncompatibleRow,
    #[display(fmt = "no conversion to {}", _0)]
    UnknownConversion(String),
    #[display(fmt = "placeholder")]
    Placeholder,
    #[display(fmt = "nothing to refer to")]
    MisplacedThis,
}

/// A problem found in a program. `primary` owns the conflict; `secondary`
/// lists related nodes, such as the other half of a duplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub kind: ConflictKind,
    pub primary: NodeId,
    pub secondary: Vec<NodeId>,
    pub severity: Severity,
}

impl Conflict {
    fn new(kind: ConflictKind, primary: NodeId) -> Self {
        let severity = match kind {
            ConflictKind::Implemented => Severity::Advisory,
            _ => Severity::Blocking,
        };
        Conflict { kind, primary, secondary: Vec::new(), severity }
    }

    fn with(mut self, secondary: NodeId) -> Self {
        self.secondary.push(secondary);
        self
    }

    pub fn is_blocking(&self) -> bool {
        self.severity == Severity::Blocking
    }
}

/// Whether the type is known well enough to judge. Checks are skipped on
/// indeterminate types; whatever made them so is reported where it occurs.
fn judged(ty: &Type) -> bool {
    !ty.is_indeterminate()
}

/// Conflicts owned by `id`.
pub fn compute_conflicts(context: &Context, id: NodeId) -> Vec<Conflict> {
    let heap = context.heap();
    let mut conflicts = Vec::new();
    match context.node(id) {
        Node::Unparsable(unparsable) => conflicts.push(Conflict::new(ConflictKind::Unparsable(unparsable.reason), id)),
        Node::ExpressionPlaceholder(_) | Node::TypePlaceholder(_) => conflicts.push(Conflict::new(ConflictKind::Placeholder, id)),

        Node::Borrow(borrow) => {
            let name = context.text(borrow.name);
            if context.shares().get(name).is_none() {
                conflicts.push(Conflict::new(ConflictKind::UnknownBorrow(name.to_string()), id));
            }
        },
        Node::Names(names) => {
            let mut seen: Vec<(String, NodeId)> = Vec::new();
            for name in &names.names {
                if let Some(n) = node_as!(heap, *name, Name) {
                    let text = context.text(n.name).to_string();
                    match seen.iter().find(|(s, _)| *s == text) {
                        Some((_, first)) => {
                            conflicts.push(Conflict::new(ConflictKind::DuplicateName(text.clone()), id).with(*first).with(*name))
                        },
                        None => seen.push((text, *name)),
                    }
                }
            }
        },
        Node::Docs(docs) => {
            let mut seen: Vec<(String, NodeId)> = Vec::new();
            for doc in &docs.docs {
                let language = node_as!(heap, *doc, Doc)
                    .and_then(|d| d.language)
                    .and_then(|l| node_as!(heap, l, Language))
                    .and_then(|l| l.name)
                    .map(|n| context.text(n).to_string());
                if let Some(language) = language {
                    match seen.iter().find(|(s, _)| *s == language) {
                        Some((_, first)) => conflicts
                            .push(Conflict::new(ConflictKind::DuplicateLanguage(language.clone()), id).with(*first).with(*doc)),
                        None => seen.push((language, *doc)),
                    }
                }
            }
        },
        Node::Block(block) => duplicate_definitions(context, id, &block.statements, &mut conflicts),
        Node::Bind(bind) => {
            if let (Some(ty), Some(value)) = (bind.ty, bind.value) {
                let expected = context.get_type(ty);
                let given = context.get_type(value);
                if judged(&expected) && judged(&given) && !expected.accepts(&given) {
                    conflicts.push(Conflict::new(ConflictKind::IncompatibleBind, id).with(value));
                }
            }
        },
        Node::FunctionDefinition(function) => {
            duplicate_definitions(context, id, &function.inputs, &mut conflicts);
            duplicate_type_variables(context, id, &function.type_variables, &mut conflicts);
            required_after_optional(context, id, &function.inputs, &mut conflicts);
            if let (Some(output), Some(body)) = (function.output, function.body) {
                let expected = context.get_type(output);
                let given = context.get_type(body);
                if judged(&expected) && judged(&given) && !expected.accepts(&given) {
                    conflicts.push(Conflict::new(ConflictKind::IncompatibleOutput, id).with(body));
                }
            }
        },
        Node::StructureDefinition(structure) => {
            duplicate_definitions(context, id, &structure.inputs, &mut conflicts);
            duplicate_type_variables(context, id, &structure.type_variables, &mut conflicts);
            required_after_optional(context, id, &structure.inputs, &mut conflicts);
            structure_conflicts(context, id, &mut conflicts);
        },

        Node::Reference(reference) => {
            let name = context.text(reference.name);
            match context.resolve(id, name) {
                None => conflicts.push(Conflict::new(ConflictKind::UnknownName(name.to_string()), id)),
                Some(Definition::Bind(bind)) => {
                    let value = node_as!(heap, bind, Bind).and_then(|b| b.value);
                    if let Some(value) = value {
                        if context.node(value).is_unparsable() {
                            conflicts.push(Conflict::new(ConflictKind::ReferenceToUnparsable, id).with(bind));
                        } else if is_circular(context, id, value) {
                            conflicts.push(Conflict::new(ConflictKind::CircularReference(name.to_string()), id).with(bind));
                        }
                    }
                },
                Some(_) => {},
            }
        },
        Node::NameType(name_type) => {
            let name = context.text(name_type.name);
            match context.resolve(id, name) {
                Some(Definition::Structure(_)) | Some(Definition::TypeVariable(_)) => {},
                _ => conflicts.push(Conflict::new(ConflictKind::UnknownTypeName(name.to_string()), id)),
            }
        },
        Node::This(_) => {
            let enclosed = context
                .ancestors(id)
                .into_iter()
                .any(|a| matches!(context.node(a), Node::ConversionDefinition(_) | Node::StructureDefinition(_)));
            if !enclosed {
                conflicts.push(Conflict::new(ConflictKind::MisplacedThis, id));
            }
        },
        Node::PropertyReference(property) => {
            let subject = resolve_stream(context.get_type(property.structure));
            let name = context.text(property.name);
            if judged(&subject) && property_type(context, &subject, name) == Type::Unknown(UnknownReason::UnknownName) {
                conflicts.push(Conflict::new(ConflictKind::UnknownProperty(name.to_string()), id));
            }
        },
        Node::Evaluate(evaluate) => evaluate_conflicts(context, id, evaluate, &mut conflicts),
        Node::BinaryOperation(operation) => {
            let left = resolve_stream(context.get_type(operation.left));
            let right = resolve_stream(context.get_type(operation.right));
            match Operator::binary(context.text(operation.operator)) {
                Some(operator) => {
                    if judged(&left) && judged(&right) && operation_type(operator, &left, &right, None).is_none() {
                        conflicts.push(Conflict::new(ConflictKind::IncompatibleOperand, id).with(operation.right));
                    }
                },
                None => conflicts.push(Conflict::new(ConflictKind::IncompatibleOperand, id)),
            }
        },
        Node::UnaryOperation(unary) => {
            let operand = resolve_stream(context.get_type(unary.operand));
            let applies = match Operator::unary(context.text(unary.operator)) {
                Some(Operator::Negate) => matches!(operand, Type::Measurement(_)),
                Some(Operator::Not) => operand == Type::Boolean,
                _ => false,
            };
            if judged(&operand) && !applies {
                conflicts.push(Conflict::new(ConflictKind::IncompatibleOperand, id).with(unary.operand));
            }
        },
        Node::Conditional(conditional) => {
            let condition = resolve_stream(context.get_type(conditional.condition));
            if judged(&condition) && condition != Type::Boolean {
                conflicts.push(Conflict::new(ConflictKind::ExpectedBooleanCondition, id).with(conditional.condition));
            }
        },
        Node::ListAccess(access) => {
            let list = resolve_stream(context.get_type(access.list));
            if judged(&list) && !matches!(list, Type::List(_)) {
                conflicts.push(Conflict::new(ConflictKind::NotAList, id).with(access.list));
            }
            let index = resolve_stream(context.get_type(access.index));
            if judged(&index) && !matches!(index, Type::Measurement(_)) {
                conflicts.push(Conflict::new(ConflictKind::NotANumber, id).with(access.index));
            }
        },
        Node::SetOrMapAccess(access) => {
            let set = resolve_stream(context.get_type(access.set));
            if judged(&set) && !matches!(set, Type::Set(_) | Type::Map(_, _)) {
                conflicts.push(Conflict::new(ConflictKind::NotASetOrMap, id).with(access.set));
            }
        },
        Node::MapLiteral(map) => {
            for pair in &map.pairs {
                if !matches!(context.node(*pair), Node::KeyValue(_)) {
                    conflicts.push(Conflict::new(ConflictKind::MixedSetAndMap, id).with(*pair));
                }
            }
        },
        Node::Convert(convert) => {
            let input = resolve_stream(context.get_type(convert.expression));
            let output = context.get_type(convert.ty);
            if judged(&input) && judged(&output) && find_conversion(context, id, &input, &output).is_none() {
                conflicts.push(Conflict::new(ConflictKind::UnknownConversion(output.to_string()), id));
            }
        },
        Node::Reaction(reaction) => {
            let stream = context.get_type(reaction.stream);
            if judged(&stream) && !matches!(stream, Type::Stream(_)) {
                conflicts.push(Conflict::new(ConflictKind::NotAStream, id).with(reaction.stream));
            }
        },
        Node::Select(_) | Node::Update(_) | Node::Delete(_) | Node::Insert(_) => query_conflicts(context, id, &mut conflicts),
        Node::TableLiteral(table) => {
            let columns = match context.get_type(id) {
                Type::Table(columns) => columns,
                _ => Vec::new(),
            };
            for row in &table.rows {
                let cells = crate::language::eval::steps::row_values(context, *row);
                let matches = cells.len() == columns.len()
                    && cells.iter().zip(columns.iter()).all(|(cell, column)| {
                        let given = context.get_type(*cell);
                        !judged(&given) || !judged(&column.ty) || column.ty.accepts(&given)
                    });
                if !matches {
                    conflicts.push(Conflict::new(ConflictKind::IncompatibleRow, id).with(*row));
                }
            }
        },
        _ => {},
    }
    conflicts
}

/// A reference inside the value of its own bind. Function bodies may
/// recurse and a reaction's next expression may read its prior value.
fn is_circular(context: &Context, reference: NodeId, value: NodeId) -> bool {
    if reference == value {
        return true;
    }
    if !context.is_inside(reference, value) {
        return false;
    }
    for ancestor in context.ancestors(reference) {
        match context.node(ancestor) {
            Node::FunctionDefinition(_) | Node::StructureDefinition(_) => return false,
            Node::Reaction(reaction) if context.is_inside(reference, reaction.next) => return false,
            _ => {},
        }
        if ancestor == value {
            break;
        }
    }
    true
}

/// Two definitions among `definitions` sharing a name.
fn duplicate_definitions(context: &Context, id: NodeId, definitions: &[NodeId], conflicts: &mut Vec<Conflict>) {
    let mut seen: Vec<(String, NodeId)> = Vec::new();
    for definition in definitions {
        let names = defined_names(context, *definition);
        let mut reported = false;
        for name in names.iter() {
            if let Some((_, first)) = seen.iter().find(|(s, d)| s == name && d != definition) {
                if !reported {
                    conflicts.push(Conflict::new(ConflictKind::DuplicateName(name.clone()), id).with(*first).with(*definition));
                    reported = true;
                }
            }
        }
        seen.extend(names.into_iter().map(|n| (n, *definition)));
    }
}

fn duplicate_type_variables(context: &Context, id: NodeId, variables: &[NodeId], conflicts: &mut Vec<Conflict>) {
    let mut seen: Vec<String> = Vec::new();
    for variable in variables {
        for name in defined_names(context, *variable) {
            if seen.contains(&name) {
                conflicts.push(Conflict::new(ConflictKind::DuplicateTypeVariables(name), id).with(*variable));
            } else {
                seen.push(name);
            }
        }
    }
}

fn required_after_optional(context: &Context, id: NodeId, inputs: &[NodeId], conflicts: &mut Vec<Conflict>) {
    let mut optional_seen = false;
    for input in inputs {
        if let Some(bind) = node_as!(context.heap(), *input, Bind) {
            if bind.value.is_some() {
                optional_seen = true;
            } else if optional_seen {
                conflicts.push(Conflict::new(ConflictKind::RequiredAfterOptional, id).with(*input));
            }
        }
    }
}

/// Interface rules: every abstract function of an implemented interface
/// must be defined, interfaces take no inputs and do not mix abstract and
/// implemented functions.
fn structure_conflicts(context: &Context, id: NodeId, conflicts: &mut Vec<Conflict>) {
    let heap = context.heap();
    let structure = match node_as!(heap, id, StructureDefinition) {
        Some(structure) => structure,
        None => return,
    };
    let functions: Vec<NodeId> = structure
        .block
        .and_then(|b| node_as!(heap, b, Block))
        .map(|b| b.statements.iter().copied().filter(|s| matches!(context.node(*s), Node::FunctionDefinition(_))).collect())
        .unwrap_or_default();
    let defined: Vec<String> = functions.iter().flat_map(|f| defined_names(context, *f)).collect();

    for interface in &structure.interfaces {
        let name = match node_as!(heap, *interface, NameType) {
            Some(name_type) => context.text(name_type.name),
            None => continue,
        };
        if let Some(Definition::Structure(definition)) = context.resolve(*interface, name) {
            for required in abstract_functions(context, definition) {
                let names = defined_names(context, required);
                if !names.iter().any(|n| defined.contains(n)) {
                    let name = names.into_iter().next().unwrap_or_default();
                    conflicts.push(Conflict::new(ConflictKind::Unimplemented(name), id).with(required));
                }
            }
        }
    }

    let abstract_count = abstract_functions(context, id).len();
    if abstract_count > 0 {
        if abstract_count < functions.len() {
            conflicts.push(Conflict::new(ConflictKind::Implemented, id));
        }
        if !structure.inputs.is_empty() {
            conflicts.push(Conflict::new(ConflictKind::DisallowedInputs, id));
        }
    }
}

fn evaluate_conflicts(context: &Context, id: NodeId, evaluate: &crate::language::ast::Evaluate, conflicts: &mut Vec<Conflict>) {
    let callee = context.get_type(evaluate.func);
    let signature = match resolve_stream(callee.clone()) {
        Type::Function(signature) => signature,
        other => {
            let stream_read = matches!(callee, Type::Stream(_)) && evaluate.inputs.is_empty();
            if judged(&other) && !stream_read {
                conflicts.push(Conflict::new(ConflictKind::NotAFunction, id).with(evaluate.func));
            }
            return;
        },
    };
    let matched = match_inputs(context, &signature, &evaluate.inputs);
    for missing in matched.missing(&signature) {
        let name = signature.inputs[missing].name.clone().unwrap_or_default();
        conflicts.push(Conflict::new(ConflictKind::MissingInput(name), id));
    }
    for (input, position) in evaluate.inputs.iter().zip(matched.positions.iter()) {
        if position.is_none() {
            conflicts.push(Conflict::new(ConflictKind::UnexpectedInput, id).with(*input));
        }
    }
    let explicit: Vec<Type> = evaluate.type_inputs.iter().map(|t| context.get_type(*t)).collect();
    let given: Vec<Type> = matched
        .assigned
        .iter()
        .map(|a| a.map(|e| context.get_type(e)).unwrap_or(Type::Unknown(UnknownReason::NotAnnotated)))
        .collect();
    let instantiated = context.instantiate(&signature, &explicit, &given);
    for ((expected, given), assigned) in instantiated.inputs.iter().zip(given.iter()).zip(matched.assigned.iter()) {
        if let Some(expression) = assigned {
            let given = resolve_stream(given.clone());
            if judged(&expected.ty) && judged(&given) && !expected.ty.accepts(&given) {
                conflicts.push(Conflict::new(ConflictKind::IncompatibleInput, id).with(*expression));
            }
        }
    }
}

fn query_conflicts(context: &Context, id: NodeId, conflicts: &mut Vec<Conflict>) {
    let table = match typing::query_table(context, id) {
        Some(table) => table,
        None => return,
    };
    let table_type = resolve_stream(context.get_type(table));
    let columns = match table_type {
        Type::Table(columns) => columns,
        other => {
            if judged(&other) {
                conflicts.push(Conflict::new(ConflictKind::NotATable, id).with(table));
            }
            return;
        },
    };
    let query = match context.node(id) {
        Node::Select(select) => Some(select.query),
        Node::Update(update) => Some(update.query),
        Node::Delete(delete) => Some(delete.query),
        _ => None,
    };
    if let Some(query) = query {
        let ty = context.get_type(query);
        if judged(&ty) && ty != Type::Boolean {
            conflicts.push(Conflict::new(ConflictKind::NonBooleanQuery, id).with(query));
        }
    }
    let row = match context.node(id) {
        Node::Insert(insert) => Some((insert.row, true)),
        Node::Update(update) => Some((update.row, false)),
        _ => None,
    };
    if let Some((row, complete)) = row {
        let cells = node_as!(context.heap(), row, Row).map(|r| r.cells.clone()).unwrap_or_default();
        let mut compatible = !complete || cells.len() == columns.len();
        for (index, cell) in cells.iter().enumerate() {
            let value = match node_as!(context.heap(), *cell, Cell) {
                Some(cell) => cell.value,
                None => continue,
            };
            let name = names_of_bind(context, value).into_iter().next();
            let column = match &name {
                Some(name) => columns.iter().find(|c| c.name == *name),
                None if complete => columns.get(index),
                None => None,
            };
            match column {
                Some(column) => {
                    let given = context.get_type(crate::language::typing::input_expression(context, value));
                    if judged(&given) && judged(&column.ty) && !column.ty.accepts(&given) {
                        compatible = false;
                    }
                },
                None => compatible = false,
            }
        }
        if !compatible {
            conflicts.push(Conflict::new(ConflictKind::IncompatibleRow, id).with(row));
        }
    }
}

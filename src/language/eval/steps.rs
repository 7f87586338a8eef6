//! Compiles expressions into flat step sequences. Every node compiles to
//! `Start`, the steps of its dependencies in order, then `Finish`. Control
//! steps jump forward over the steps of branches that should not run.

use crate::common::*;
use crate::language::context::Context;
use crate::language::typing::input_expression;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Start,
    Finish,
    /// Skips the given number of steps.
    Jump(usize),
    /// Pops a boolean and skips the given number of steps if it is false.
    JumpIfFalse(usize),
    /// Pops a stream. Skips `next` steps to evaluate the next expression
    /// when the stream changed, or `finish` steps to keep the prior value
    /// when it did not.
    React { next: usize, finish: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub node: NodeId,
}

impl Step {
    fn new(kind: StepKind, node: NodeId) -> Self {
        Step { kind, node }
    }
}

/// Nodes whose values `id` needs, in the order they are evaluated.
/// Branches of conditionals and reactions are included even though only
/// one of them runs.
pub fn dependencies(context: &Context, id: NodeId) -> Vec<NodeId> {
    let heap = context.heap();
    match context.node(id) {
        Node::Program(program) => vec![program.block],
        Node::Block(block) => block.statements.clone(),
        Node::Share(share) => vec![share.bind],
        Node::Bind(bind) => bind.value.into_iter().collect(),
        Node::Template(template) => template
            .parts
            .iter()
            .filter_map(|part| match part {
                Child::Node(n) => Some(*n),
                Child::Token(_) => None,
            })
            .collect(),
        Node::ListLiteral(list) => list.values.clone(),
        Node::SetLiteral(set) => set.values.clone(),
        Node::MapLiteral(map) => map
            .pairs
            .iter()
            .filter_map(|p| node_as!(heap, *p, KeyValue))
            .flat_map(|pair| vec![pair.key, pair.value])
            .collect(),
        Node::TableLiteral(table) => table.rows.iter().flat_map(|row| row_values(context, *row)).collect(),
        Node::PropertyReference(property) => vec![property.structure],
        Node::ListAccess(access) => vec![access.list, access.index],
        Node::SetOrMapAccess(access) => vec![access.set, access.key],
        Node::Evaluate(evaluate) => {
            let mut result = vec![evaluate.func];
            result.extend(evaluate.inputs.iter().map(|i| input_expression(context, *i)));
            result
        },
        Node::Convert(convert) => vec![convert.expression],
        Node::Select(select) => vec![select.table],
        Node::Update(update) => vec![update.table],
        Node::Delete(delete) => vec![delete.table],
        Node::Insert(insert) => {
            let mut result = vec![insert.table];
            result.extend(row_values(context, insert.row));
            result
        },
        Node::Reaction(reaction) => vec![reaction.stream, reaction.initial, reaction.next],
        Node::Conditional(conditional) => vec![conditional.condition, conditional.yes, conditional.no],
        Node::BinaryOperation(operation) => vec![operation.left, operation.right],
        Node::UnaryOperation(unary) => vec![unary.operand],
        Node::Is(is) => vec![is.expression],
        _ => Vec::new(),
    }
}

/// Expressions a row provides, one per cell. Named cells provide their
/// bind's value.
pub fn row_values(context: &Context, row: NodeId) -> Vec<NodeId> {
    match node_as!(context.heap(), row, Row) {
        Some(row) => row
            .cells
            .iter()
            .filter_map(|c| node_as!(context.heap(), *c, Cell))
            .map(|cell| input_expression(context, cell.value))
            .collect(),
        None => Vec::new(),
    }
}

pub fn compile(context: &Context, id: NodeId) -> Vec<Step> {
    let mut steps = Vec::new();
    compile_into(context, id, &mut steps);
    steps
}

fn compile_into(context: &Context, id: NodeId, steps: &mut Vec<Step>) {
    steps.push(Step::new(StepKind::Start, id));
    match context.node(id) {
        Node::Conditional(conditional) => {
            compile_into(context, conditional.condition, steps);
            let yes = compile(context, conditional.yes);
            let no = compile(context, conditional.no);
            steps.push(Step::new(StepKind::JumpIfFalse(yes.len() + 1), id));
            steps.extend(yes);
            steps.push(Step::new(StepKind::Jump(no.len()), id));
            steps.extend(no);
        },
        Node::Reaction(reaction) => {
            compile_into(context, reaction.stream, steps);
            let initial = compile(context, reaction.initial);
            let next = compile(context, reaction.next);
            steps.push(Step::new(
                StepKind::React { next: initial.len() + 1, finish: initial.len() + 1 + next.len() },
                id,
            ));
            steps.extend(initial);
            steps.push(Step::new(StepKind::Jump(next.len()), id));
            steps.extend(next);
        },
        _ => {
            for dependency in dependencies(context, id) {
                compile_into(context, dependency, steps);
            }
        },
    }
    steps.push(Step::new(StepKind::Finish, id));
}

/// Steps of a function or structure body, preceded by the defaults of the
/// inputs the evaluation did not provide.
pub fn compile_with_defaults(context: &Context, defaults: &[NodeId], body: &[NodeId]) -> Vec<Step> {
    let mut steps = Vec::new();
    for bind in defaults.iter().chain(body.iter()) {
        compile_into(context, *bind, &mut steps);
    }
    steps
}

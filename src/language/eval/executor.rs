use crate::common::*;
use crate::language::context::{Context, Definition};
use crate::language::types::{ColumnType, Type};
use crate::language::typing::{
    self, abstract_functions, find_conversion, function_signature, match_inputs, names_of, names_of_bind,
    structure_signature, unit_of, ConversionTarget, Operator,
};
use super::error::{line_of, Exception, ExceptionFrame, ExceptionKind};
use super::natives::Evaluation;
use super::steps::{compile, compile_with_defaults, row_values, Step, StepKind};
use super::value::{Scope, StreamId, StructureValue, Value};

macro_rules! debug_log {
    ($format:literal) => {
        enabled_debug_print!(false, "exec", $format);
    };
    ($format:literal, $($args:expr),*) => {
        enabled_debug_print!(false, "exec", $format, $($args),*);
    };
}

/// What the executor needs from whoever runs it: streams, the values
/// reactions produced last time and a place to put shared values.
pub(crate) trait RunContext {
    /// Stream created by the native stream `name` referenced at `creator`.
    /// The same creator always gets the same stream.
    fn stream(&mut self, creator: NodeId, name: &str) -> Option<StreamId>;
    fn latest(&self, stream: StreamId) -> Option<Value>;
    /// Whether the stream received the value that caused this evaluation.
    fn changed(&self, stream: StreamId) -> bool;
    /// Subscribes the reaction at `reaction` to the stream.
    fn listen(&mut self, stream: StreamId, reaction: NodeId);
    fn prior(&self, reaction: NodeId) -> Option<Value>;
    fn remember(&mut self, reaction: NodeId, value: Value);
    fn share(&mut self, name: &str, value: Value);
}

#[derive(Debug, Clone)]
pub(crate) struct QueryState {
    operation: NodeId,
    columns: Vec<ColumnType>,
    rows: Vec<Vec<Value>>,
    row: usize,
    kept: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
pub(crate) enum FrameKind {
    Program,
    Function { definition: NodeId },
    Structure { definition: NodeId },
    Conversion { definition: NodeId },
    Query(QueryState),
}

#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) kind: FrameKind,
    /// Node whose evaluation created the frame.
    pub(crate) origin: NodeId,
    steps: Rc<Vec<Step>>,
    position: usize,
    values: Vec<Value>,
    scopes: Vec<Vec<(String, Value)>>,
    closure: Option<Arc<Scope>>,
    this: Option<Value>,
}

impl Frame {
    fn new(kind: FrameKind, origin: NodeId, steps: Vec<Step>, bindings: Vec<(String, Value)>, closure: Option<Arc<Scope>>) -> Self {
        Frame {
            kind,
            origin,
            steps: Rc::new(steps),
            position: 0,
            values: Vec::new(),
            scopes: vec![bindings],
            closure,
            this: None,
        }
    }

    fn is_finished(&self) -> bool {
        self.position >= self.steps.len()
    }

    fn pop(&mut self) -> Value {
        self.values.pop().unwrap_or_else(Value::none)
    }

    fn pop_many(&mut self, count: usize) -> Vec<Value> {
        let at = self.values.len().saturating_sub(count);
        self.values.split_off(at)
    }

    fn bind(&mut self, name: String, value: Value) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.push((name, value));
        }
    }

    fn lookup(&self, name: &str) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some((_, value)) = scope.iter().rev().find(|(n, _)| n == name) {
                return Some(value.clone());
            }
        }
        self.closure.as_ref().and_then(|c| c.lookup(name).cloned())
    }

    fn snapshot(&self) -> Arc<Scope> {
        Arc::new(Scope {
            bindings: self.scopes.iter().flat_map(|s| s.iter().cloned()).collect(),
            parent: self.closure.clone(),
        })
    }
}

pub enum EvalContinuation {
    Stepping,
    Finished(Value),
    Faulted(Value),
}

type StepResult = Result<Option<Frame>, Exception>;

/// The evaluation stack of one run of a program.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub(crate) frames: Vec<Frame>,
    steps_taken: usize,
    step_limit: usize,
}

fn exception(context: &Context, kind: ExceptionKind, node: NodeId, message: String) -> Exception {
    Exception::new(context, kind, node, message)
}

fn settle(run: &dyn RunContext, value: Value) -> Value {
    match value {
        Value::Stream(id) => run.latest(id).unwrap_or_else(Value::none),
        other => other,
    }
}

fn names_of_definition(context: &Context, definition: NodeId) -> Vec<String> {
    typing::defined_names(context, definition)
}

impl Prompt {
    pub fn new(context: &Context, step_limit: usize) -> Self {
        let program = context.program();
        let frame = Frame::new(FrameKind::Program, program, compile(context, program), Vec::new(), None);
        Prompt { frames: vec![frame], steps_taken: 0, step_limit }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Node of the step about to run.
    pub fn current_node(&self) -> Option<NodeId> {
        let frame = self.frames.last()?;
        frame.steps.get(frame.position).map(|s| s.node)
    }

    pub(crate) fn step(&mut self, context: &Context, run: &mut dyn RunContext) -> EvalContinuation {
        let mut frame = match self.frames.pop() {
            Some(frame) => frame,
            None => return EvalContinuation::Finished(Value::none()),
        };

        self.steps_taken += 1;
        let next = frame.steps.get(frame.position).copied();
        let step = match next {
            Some(step) => step,
            None => {
                self.frames.push(frame);
                return self.complete_frames(context, run);
            },
        };
        frame.position += 1;
        debug_log!("Step {:?} at {:?}", step.kind, step.node);

        let result = if self.steps_taken > self.step_limit {
            Err(exception(context, ExceptionKind::StepLimit, step.node, format!("more than {} steps", self.step_limit)))
        } else {
            self.execute(context, run, &mut frame, step)
        };
        self.frames.push(frame);
        match result {
            Ok(Some(called)) => {
                self.frames.push(called);
                EvalContinuation::Stepping
            },
            Ok(None) => self.complete_frames(context, run),
            Err(exception) => EvalContinuation::Faulted(self.fault(context, exception)),
        }
    }

    fn fault(&self, context: &Context, mut exception: Exception) -> Value {
        exception.frames = self
            .frames
            .iter()
            .map(|frame| {
                let (procedure, is_func) = match &frame.kind {
                    FrameKind::Program => (context.source().name.clone(), false),
                    FrameKind::Function { definition } | FrameKind::Structure { definition }
                    | FrameKind::Conversion { definition } => {
                        (names_of_definition(context, *definition).into_iter().next().unwrap_or_default(), true)
                    },
                    FrameKind::Query(state) => (context.node(state.operation).kind_name().to_string(), true),
                };
                ExceptionFrame { line: line_of(context, frame.origin), procedure, is_func }
            })
            .collect();
        Value::Exception(Box::new(exception))
    }

    /// Pops every frame that ran out of steps, handing its value to the
    /// frame below.
    fn complete_frames(&mut self, context: &Context, run: &mut dyn RunContext) -> EvalContinuation {
        loop {
            let mut frame = match self.frames.pop() {
                Some(frame) if frame.is_finished() => frame,
                Some(frame) => {
                    self.frames.push(frame);
                    return EvalContinuation::Stepping;
                },
                None => return EvalContinuation::Finished(Value::none()),
            };
            let result = if let FrameKind::Query(_) = frame.kind {
                match self.next_row(context, frame) {
                    Ok(Some(result)) => result,
                    Ok(None) => continue,
                    Err(exception) => return EvalContinuation::Faulted(self.fault(context, exception)),
                }
            } else if let FrameKind::Structure { definition } = frame.kind {
                let fields: Vec<(String, Value)> = frame.scopes.into_iter().next().unwrap_or_default();
                let (name, interfaces) = match typing::structure_type(context, definition) {
                    Type::Structure(structure) => (structure.name, structure.interfaces),
                    _ => (String::new(), Vec::new()),
                };
                Value::Structure(Arc::new(StructureValue { definition, name, interfaces, fields }))
            } else {
                frame.pop()
            };
            match self.frames.last_mut() {
                Some(parent) => parent.values.push(result),
                None => return EvalContinuation::Finished(settle(run, result)),
            }
        }
    }

    /// Applies the result of a query frame to its current row. Returns the
    /// final table once every row is done; otherwise resets the frame for
    /// the next row and puts it back.
    fn next_row(&mut self, context: &Context, mut frame: Frame) -> Result<Option<Value>, Exception> {
        let mut state = match std::mem::replace(&mut frame.kind, FrameKind::Program) {
            FrameKind::Query(state) => state,
            other => {
                frame.kind = other;
                return Ok(Some(frame.pop()));
            },
        };
        let row = state.rows[state.row].clone();
        let (updates, condition) = match context.node(state.operation) {
            Node::Update(update) => {
                let count = row_values(context, update.row).len();
                let updates = frame.pop_many(count);
                (updates, frame.pop())
            },
            _ => (Vec::new(), frame.pop()),
        };
        let matched = match condition {
            Value::Bool(matched) => matched,
            other => {
                return Err(exception(
                    context,
                    ExceptionKind::TypeMismatch,
                    state.operation,
                    format!("query produced {}", other.to_display_text()),
                ))
            },
        };
        match context.node(state.operation) {
            Node::Select(select) => {
                if matched {
                    let selected = typing::selected_columns(context, select.row);
                    state.kept.push(
                        state
                            .columns
                            .iter()
                            .zip(row.into_iter())
                            .filter(|(c, _)| selected.is_empty() || selected.contains(&c.name))
                            .map(|(_, v)| v)
                            .collect(),
                    );
                }
            },
            Node::Delete(_) => {
                if !matched {
                    state.kept.push(row);
                }
            },
            Node::Update(update) => {
                let mut row = row;
                if matched {
                    let cells = node_as!(context.heap(), update.row, Row).map(|r| r.cells.clone()).unwrap_or_default();
                    for (cell, value) in cells.iter().zip(updates.into_iter()) {
                        let name = node_as!(context.heap(), *cell, Cell)
                            .and_then(|c| names_of_bind(context, c.value).into_iter().next());
                        if let Some(index) = name.and_then(|n| state.columns.iter().position(|c| c.name == n)) {
                            row[index] = value;
                        }
                    }
                }
                state.kept.push(row);
            },
            _ => {},
        }

        state.row += 1;
        if state.row < state.rows.len() {
            frame.scopes = vec![row_bindings(&state.columns, &state.rows[state.row])];
            frame.values.clear();
            frame.position = 0;
            frame.kind = FrameKind::Query(state);
            self.frames.push(frame);
            return Ok(None);
        }
        let columns = match context.node(state.operation) {
            Node::Select(select) => select_columns(context, select.row, &state.columns),
            _ => state.columns,
        };
        Ok(Some(Value::Table { columns, rows: state.kept }))
    }

    fn execute(&mut self, context: &Context, run: &mut dyn RunContext, frame: &mut Frame, step: Step) -> StepResult {
        match step.kind {
            StepKind::Start => {
                self.start(context, frame, step.node)?;
                Ok(None)
            },
            StepKind::Finish => self.finish(context, run, frame, step.node),
            StepKind::Jump(count) => {
                frame.position += count;
                Ok(None)
            },
            StepKind::JumpIfFalse(count) => {
                match settle(run, frame.pop()) {
                    Value::Bool(true) => {},
                    Value::Bool(false) => frame.position += count,
                    other => {
                        return Err(exception(
                            context,
                            ExceptionKind::TypeMismatch,
                            step.node,
                            format!("expected a boolean condition, got {}", other.to_display_text()),
                        ))
                    },
                }
                Ok(None)
            },
            StepKind::React { next, finish } => {
                match frame.pop() {
                    Value::Stream(id) => {
                        run.listen(id, step.node);
                        if let Some(prior) = run.prior(step.node) {
                            if run.changed(id) {
                                frame.position += next;
                            } else {
                                frame.values.push(prior);
                                frame.position += finish;
                            }
                        }
                    },
                    other => {
                        return Err(exception(
                            context,
                            ExceptionKind::NotAStream,
                            step.node,
                            format!("{} is not a stream", other.to_display_text()),
                        ))
                    },
                }
                Ok(None)
            },
        }
    }

    fn start(&mut self, context: &Context, frame: &mut Frame, node: NodeId) -> Result<(), Exception> {
        let blocking = context.blocking_conflicts(node);
        if let Some(conflict) = blocking.first() {
            return Err(exception(context, ExceptionKind::BlockingConflict, node, conflict.kind.to_string()));
        }
        match context.node(node) {
            Node::Block(_) => frame.scopes.push(Vec::new()),
            Node::Program(program) => {
                for borrow in &program.borrows {
                    if let Some(borrow) = node_as!(context.heap(), *borrow, Borrow) {
                        let name = context.text(borrow.name);
                        match context.shares().get(name) {
                            Some(shared) => frame.bind(name.to_string(), shared.value.clone()),
                            None => {
                                return Err(exception(context, ExceptionKind::UnknownName, node, format!("nothing shares {}", name)))
                            },
                        }
                    }
                }
            },
            _ => {},
        }
        Ok(())
    }

    fn finish(&mut self, context: &Context, run: &mut dyn RunContext, frame: &mut Frame, node: NodeId) -> StepResult {
        let heap = context.heap();
        let value = match context.node(node) {
            Node::Program(_) | Node::Conditional(_) => return Ok(None),
            Node::Reaction(_) => {
                let value = frame.pop();
                run.remember(node, value.clone());
                value
            },
            Node::Block(block) => {
                let values = frame.pop_many(block.statements.len());
                if frame.scopes.len() > 1 {
                    frame.scopes.pop();
                }
                values.into_iter().last().unwrap_or_else(Value::none)
            },
            Node::Bind(bind) => {
                let value = if bind.value.is_some() { frame.pop() } else { Value::none() };
                // Statements and defaulted inputs of the definition being
                // called bind their names. Named inputs and cells only carry
                // a value.
                let binds_names = match context.parent(node).map(|p| context.node(p)) {
                    Some(Node::Block(_)) | Some(Node::Share(_)) => true,
                    Some(Node::FunctionDefinition(function)) => function.inputs.contains(&node),
                    Some(Node::StructureDefinition(structure)) => structure.inputs.contains(&node),
                    _ => false,
                };
                if binds_names {
                    for name in names_of(context, bind.names) {
                        frame.bind(name, value.clone());
                    }
                }
                value
            },
            Node::Share(_) => {
                let value = frame.pop();
                for name in typing::defined_names(context, node) {
                    run.share(&name, value.clone());
                }
                value
            },
            Node::FunctionDefinition(_) | Node::StructureDefinition(_) | Node::ConversionDefinition(_) => {
                let value = Value::Function { definition: node, closure: frame.snapshot() };
                for name in typing::defined_names(context, node) {
                    frame.bind(name, value.clone());
                }
                value
            },

            Node::MeasurementLiteral(literal) => match context.text(literal.number).parse::<f64>() {
                Ok(number) => Value::Measurement { number, unit: unit_of(context, literal.unit) },
                Err(_) => {
                    return Err(exception(context, ExceptionKind::TypeMismatch, node, "not a number".to_string()))
                },
            },
            Node::BooleanLiteral(literal) => Value::Bool(context.text(literal.value) == "⊤"),
            Node::NoneLiteral(none) => Value::None(none.names.and_then(|n| names_of(context, n).into_iter().next())),
            Node::TextLiteral(text) => Value::Text {
                text: heap.token(text.text).text_content().to_string(),
                format: format_of(context, text.format),
            },
            Node::Template(template) => {
                let count = template.parts.iter().filter(|p| matches!(p, Child::Node(_))).count();
                let mut values = frame.pop_many(count).into_iter();
                let mut text = String::new();
                for part in &template.parts {
                    match part {
                        Child::Token(token) => text.push_str(heap.token(*token).text_content()),
                        Child::Node(_) => {
                            if let Some(value) = values.next() {
                                text.push_str(&settle(run, value).to_template_text());
                            }
                        },
                    }
                }
                Value::Text { text, format: format_of(context, template.format) }
            },
            Node::ListLiteral(list) => Value::List(frame.pop_many(list.values.len())),
            Node::SetLiteral(set) => Value::set(frame.pop_many(set.values.len())),
            Node::MapLiteral(map) => {
                let mut values = frame.pop_many(map.pairs.len() * 2).into_iter();
                let mut pairs = Vec::new();
                while let (Some(key), Some(value)) = (values.next(), values.next()) {
                    pairs.push((key, value));
                }
                Value::map(pairs)
            },
            Node::TableLiteral(table) => {
                let columns = match context.get_type(node) {
                    Type::Table(columns) => columns,
                    _ => Vec::new(),
                };
                let counts: Vec<usize> = table.rows.iter().map(|r| row_values(context, *r).len()).collect();
                let mut values = frame.pop_many(counts.iter().sum()).into_iter();
                let rows = counts.iter().map(|count| (&mut values).take(*count).collect()).collect();
                Value::Table { columns, rows }
            },

            Node::Reference(reference) => self.reference(context, run, frame, node, context.text(reference.name))?,
            Node::This(_) => match &frame.this {
                Some(this) => this.clone(),
                None => return Err(exception(context, ExceptionKind::UnknownName, node, "nothing to refer to".to_string())),
            },
            Node::PropertyReference(property) => {
                let subject = settle(run, frame.pop());
                let name = context.text(property.name);
                match &subject {
                    Value::Structure(structure) => match structure.field(name) {
                        Some(value) => value.clone(),
                        None => {
                            return Err(exception(context, ExceptionKind::UnknownProperty, node, format!("no property {}", name)))
                        },
                    },
                    other => match other.category().and_then(|c| context.natives().member(c, name)) {
                        Some(_) => Value::Native { name: name.to_string(), receiver: Some(Box::new(subject.clone())) },
                        None => {
                            return Err(exception(context, ExceptionKind::UnknownProperty, node, format!("no property {}", name)))
                        },
                    },
                }
            },
            Node::ListAccess(_) => {
                let index = settle(run, frame.pop());
                let list = settle(run, frame.pop());
                match (&list, index.as_number()) {
                    (Value::List(values), Some(index)) => {
                        let position = index.floor() as i64 - 1;
                        if position >= 0 && (position as usize) < values.len() {
                            values[position as usize].clone()
                        } else {
                            Value::none()
                        }
                    },
                    _ => {
                        return Err(exception(context, ExceptionKind::TypeMismatch, node, "expected a list and a number".to_string()))
                    },
                }
            },
            Node::SetOrMapAccess(_) => {
                let key = settle(run, frame.pop());
                match settle(run, frame.pop()) {
                    Value::Set(values) => Value::Bool(values.iter().any(|v| v.is_equal_to(&key))),
                    Value::Map(pairs) => pairs
                        .iter()
                        .find(|(k, _)| k.is_equal_to(&key))
                        .map(|(_, v)| v.clone())
                        .unwrap_or_else(Value::none),
                    _ => {
                        return Err(exception(context, ExceptionKind::TypeMismatch, node, "expected a set or map".to_string()))
                    },
                }
            },
            Node::Evaluate(evaluate) => {
                let inputs = frame.pop_many(evaluate.inputs.len());
                let callee = frame.pop();
                return self.evaluate(context, run, frame, node, callee, inputs);
            },
            Node::Convert(convert) => {
                let value = settle(run, frame.pop());
                let target = context.get_type(convert.ty);
                let input = match &value {
                    Value::Function { definition, .. } => context.get_type(*definition),
                    other => other.get_type(),
                };
                match find_conversion(context, node, &input, &target) {
                    Some(ConversionTarget::Definition(definition)) => {
                        let expression = match node_as!(heap, definition, ConversionDefinition) {
                            Some(conversion) => conversion.expression,
                            None => return Err(exception(context, ExceptionKind::UnknownConversion, node, target.to_string())),
                        };
                        let mut called = Frame::new(
                            FrameKind::Conversion { definition },
                            node,
                            compile(context, expression),
                            Vec::new(),
                            Some(frame.snapshot()),
                        );
                        called.this = Some(value);
                        return Ok(Some(called));
                    },
                    Some(ConversionTarget::Native(index)) => match context.natives().conversion_at(index) {
                        Some(conversion) => (conversion.callback)(node, &value),
                        None => return Err(exception(context, ExceptionKind::UnknownConversion, node, target.to_string())),
                    },
                    Some(ConversionTarget::Identity) => value,
                    None => {
                        return Err(exception(
                            context,
                            ExceptionKind::UnknownConversion,
                            node,
                            format!("no conversion from {} to {}", input, target),
                        ))
                    },
                }
            },
            Node::Select(_) | Node::Update(_) | Node::Delete(_) => {
                let table = settle(run, frame.pop());
                return self.query(context, frame, node, table);
            },
            Node::Insert(insert) => {
                let cells = frame.pop_many(row_values(context, insert.row).len());
                match settle(run, frame.pop()) {
                    Value::Table { columns, mut rows } => {
                        if cells.len() != columns.len() {
                            return Err(exception(
                                context,
                                ExceptionKind::TypeMismatch,
                                node,
                                format!("expected {} cells, got {}", columns.len(), cells.len()),
                            ));
                        }
                        rows.push(order_cells(context, insert.row, &columns, cells));
                        Value::Table { columns, rows }
                    },
                    other => {
                        return Err(exception(context, ExceptionKind::NotATable, node, other.to_display_text()))
                    },
                }
            },
            Node::BinaryOperation(operation) => {
                let right = settle(run, frame.pop());
                let left = settle(run, frame.pop());
                let symbol = context.text(operation.operator);
                match Operator::binary(symbol).and_then(|op| apply_binary(op, &left, &right)) {
                    Some(result) => result,
                    None => {
                        return Err(exception(
                            context,
                            ExceptionKind::TypeMismatch,
                            node,
                            format!("cannot apply {} to {} and {}", symbol, left.to_display_text(), right.to_display_text()),
                        ))
                    },
                }
            },
            Node::UnaryOperation(unary) => {
                let operand = settle(run, frame.pop());
                match (Operator::unary(context.text(unary.operator)), operand) {
                    (Some(Operator::Negate), Value::Measurement { number, unit }) => Value::Measurement { number: -number, unit },
                    (Some(Operator::Not), Value::Bool(value)) => Value::Bool(!value),
                    (_, other) => {
                        return Err(exception(
                            context,
                            ExceptionKind::TypeMismatch,
                            node,
                            format!("cannot apply {} to {}", context.text(unary.operator), other.to_display_text()),
                        ))
                    },
                }
            },
            Node::Is(is) => {
                let value = frame.pop();
                let expected = context.get_type(is.ty);
                let actual = match &value {
                    Value::Function { definition, .. } => context.get_type(*definition),
                    other => other.get_type(),
                };
                Value::Bool(expected.accepts(&actual))
            },
            other => {
                return Err(exception(
                    context,
                    ExceptionKind::BlockingConflict,
                    node,
                    format!("{} cannot be evaluated", other.kind_name()),
                ))
            },
        };
        frame.values.push(value);
        Ok(None)
    }

    fn reference(&mut self, context: &Context, run: &mut dyn RunContext, frame: &Frame, node: NodeId, name: &str) -> Result<Value, Exception> {
        let unknown = || exception(context, ExceptionKind::UnknownName, node, format!("unknown name {}", name));
        match context.resolve(node, name) {
            Some(Definition::Function(definition)) | Some(Definition::Structure(definition)) => {
                Ok(frame.lookup(name).unwrap_or_else(|| Value::Function { definition, closure: frame.snapshot() }))
            },
            Some(Definition::Native) => {
                if context.natives().stream(name).is_some() {
                    run.stream(node, name).map(Value::Stream).ok_or_else(unknown)
                } else {
                    Ok(Value::Native { name: name.to_string(), receiver: None })
                }
            },
            Some(Definition::Bind(bind)) => match frame.lookup(name) {
                Some(value) => Ok(value),
                None => reaction_of(context, bind, node).and_then(|r| run.prior(r)).ok_or_else(unknown),
            },
            _ => frame.lookup(name).ok_or_else(unknown),
        }
    }

    fn evaluate(
        &mut self,
        context: &Context,
        run: &mut dyn RunContext,
        frame: &mut Frame,
        node: NodeId,
        callee: Value,
        inputs: Vec<Value>,
    ) -> StepResult {
        let evaluate = match node_as!(context.heap(), node, Evaluate) {
            Some(evaluate) => evaluate,
            None => return Err(exception(context, ExceptionKind::NotAFunction, node, String::new())),
        };
        match callee {
            Value::Function { definition, closure } => {
                let (signature, declared, body, kind) = match context.node(definition) {
                    Node::FunctionDefinition(function) => {
                        let body = match (function.etc, function.body) {
                            (None, Some(body)) => body,
                            _ => {
                                return Err(exception(
                                    context,
                                    ExceptionKind::Unimplemented,
                                    node,
                                    "the function has no body".to_string(),
                                ))
                            },
                        };
                        (function_signature(context, definition), function.inputs.clone(), vec![body], FrameKind::Function { definition })
                    },
                    Node::StructureDefinition(structure) => {
                        if !abstract_functions(context, definition).is_empty() {
                            return Err(exception(
                                context,
                                ExceptionKind::Unimplemented,
                                node,
                                "the structure has unimplemented functions".to_string(),
                            ));
                        }
                        let body = structure
                            .block
                            .and_then(|b| node_as!(context.heap(), b, Block))
                            .map(|b| b.statements.clone())
                            .unwrap_or_default();
                        (structure_signature(context, definition), structure.inputs.clone(), body, FrameKind::Structure { definition })
                    },
                    _ => return Err(exception(context, ExceptionKind::NotAFunction, node, "not a function".to_string())),
                };
                let signature = match signature {
                    Some(signature) => signature,
                    None => return Err(exception(context, ExceptionKind::NotAFunction, node, "not a function".to_string())),
                };
                let matched = match_inputs(context, &signature, &evaluate.inputs);
                if let Some(missing) = matched.missing(&signature).first() {
                    let name = signature.inputs[*missing].name.clone().unwrap_or_default();
                    return Err(exception(context, ExceptionKind::MissingInput, node, format!("missing input {}", name)));
                }
                let mut bindings = Vec::new();
                for (value, position) in inputs.into_iter().zip(matched.positions.iter()) {
                    if let Some(position) = position {
                        for name in names_of_bind(context, declared[*position]) {
                            bindings.push((name, value.clone()));
                        }
                    }
                }
                let defaults: Vec<NodeId> = declared
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| matched.assigned[*i].is_none())
                    .map(|(_, bind)| *bind)
                    .collect();
                debug_log!("Calling {:?} with {} inputs", definition, bindings.len());
                let steps = compile_with_defaults(context, &defaults, &body);
                Ok(Some(Frame::new(kind, node, steps, bindings, Some(closure))))
            },
            Value::Native { name, receiver } => {
                let function = match &receiver {
                    Some(receiver) => receiver.category().and_then(|c| context.natives().member(c, &name)),
                    None => context.natives().global(&name),
                };
                let function = match function {
                    Some(function) => function,
                    None => return Err(exception(context, ExceptionKind::NotAFunction, node, format!("no native {}", name))),
                };
                let receiver_type = receiver.as_ref().map(|r| r.get_type()).unwrap_or(Type::None(None));
                let signature = (function.signature)(&receiver_type);
                let matched = match_inputs(context, &signature, &evaluate.inputs);
                let mut named: Vec<(Option<String>, Value)> = vec![(None, Value::none()); signature.inputs.len()];
                for (value, position) in inputs.into_iter().zip(matched.positions.iter()) {
                    if let Some(position) = position {
                        named[*position] = (signature.inputs[*position].name.clone(), settle(run, value));
                    }
                }
                let evaluation = Evaluation { context, requestor: node, receiver: receiver.as_deref(), inputs: named };
                match (function.callback)(node, &evaluation) {
                    Value::Exception(exception) => Err(*exception),
                    result => {
                        frame.values.push(result);
                        Ok(None)
                    },
                }
            },
            Value::Stream(id) if inputs.is_empty() => {
                frame.values.push(Value::Stream(id));
                Ok(None)
            },
            other => Err(exception(
                context,
                ExceptionKind::NotAFunction,
                node,
                format!("{} is not a function", other.to_display_text()),
            )),
        }
    }

    fn query(&mut self, context: &Context, frame: &mut Frame, node: NodeId, table: Value) -> StepResult {
        let (columns, rows) = match table {
            Value::Table { columns, rows } => (columns, rows),
            other => return Err(exception(context, ExceptionKind::NotATable, node, other.to_display_text())),
        };
        let mut steps = Vec::new();
        match context.node(node) {
            Node::Select(select) => steps.extend(compile(context, select.query)),
            Node::Delete(delete) => steps.extend(compile(context, delete.query)),
            Node::Update(update) => {
                steps.extend(compile(context, update.query));
                for value in row_values(context, update.row) {
                    steps.extend(compile(context, value));
                }
            },
            _ => {},
        }
        if rows.is_empty() {
            let columns = match node_as!(context.heap(), node, Select) {
                Some(select) => select_columns(context, select.row, &columns),
                None => columns,
            };
            frame.values.push(Value::Table { columns, rows });
            return Ok(None);
        }
        let bindings = row_bindings(&columns, &rows[0]);
        let state = QueryState { operation: node, columns, rows, row: 0, kept: Vec::new() };
        Ok(Some(Frame::new(FrameKind::Query(state), node, steps, bindings, Some(frame.snapshot()))))
    }
}

fn row_bindings(columns: &[ColumnType], row: &[Value]) -> Vec<(String, Value)> {
    columns.iter().zip(row.iter()).map(|(c, v)| (c.name.clone(), v.clone())).collect()
}

fn select_columns(context: &Context, row: NodeId, columns: &[ColumnType]) -> Vec<ColumnType> {
    let selected = typing::selected_columns(context, row);
    columns.iter().filter(|c| selected.is_empty() || selected.contains(&c.name)).cloned().collect()
}

/// Puts the cells of an inserted row in column order. Named cells go to
/// their column, the others fill the remaining columns in order.
fn order_cells(context: &Context, row: NodeId, columns: &[ColumnType], cells: Vec<Value>) -> Vec<Value> {
    let names: Vec<Option<String>> = node_as!(context.heap(), row, Row)
        .map(|r| r.cells.clone())
        .unwrap_or_default()
        .iter()
        .map(|cell| node_as!(context.heap(), *cell, Cell).and_then(|c| names_of_bind(context, c.value).into_iter().next()))
        .collect();
    let mut ordered: Vec<Option<Value>> = vec![None; columns.len()];
    let mut unnamed = Vec::new();
    for (value, name) in cells.into_iter().zip(names.into_iter()) {
        match name.and_then(|n| columns.iter().position(|c| c.name == n)) {
            Some(index) if ordered[index].is_none() => ordered[index] = Some(value),
            _ => unnamed.push(value),
        }
    }
    let mut unnamed = unnamed.into_iter();
    ordered
        .into_iter()
        .map(|slot| slot.or_else(|| unnamed.next()).unwrap_or_else(Value::none))
        .collect()
}

fn format_of(context: &Context, language: Option<NodeId>) -> Option<String> {
    let language = node_as!(context.heap(), language?, Language)?;
    language.name.map(|n| context.text(n).to_string())
}

/// The reaction whose `next` expression refers to its own bind.
fn reaction_of(context: &Context, bind: NodeId, reference: NodeId) -> Option<NodeId> {
    let value = node_as!(context.heap(), bind, Bind)?.value?;
    let reaction = node_as!(context.heap(), value, Reaction)?;
    if context.is_inside(reference, reaction.next) {
        Some(value)
    } else {
        None
    }
}

pub(crate) fn apply_binary(operator: Operator, left: &Value, right: &Value) -> Option<Value> {
    use Operator::*;
    match operator {
        Equal => return Some(Value::Bool(left.is_equal_to(right))),
        NotEqual => return Some(Value::Bool(!left.is_equal_to(right))),
        _ => {},
    }
    match (left, right) {
        (Value::Measurement { number: l, unit: lu }, Value::Measurement { number: r, unit: ru }) => {
            let measurement = |number: f64, unit| Some(Value::Measurement { number, unit });
            match operator {
                Add if lu == ru => measurement(l + r, lu.clone()),
                Subtract if lu == ru => measurement(l - r, lu.clone()),
                Remainder if lu == ru => measurement(l % r, lu.clone()),
                Multiply => measurement(l * r, lu.product(ru)),
                Divide => measurement(l / r, lu.quotient(ru)),
                Power if ru.is_unitless() => {
                    let unit = if r.fract() == 0.0 { lu.power(*r as i32) } else { lu.clone() };
                    measurement(l.powf(*r), unit)
                },
                Less if lu == ru => Some(Value::Bool(l < r)),
                Greater if lu == ru => Some(Value::Bool(l > r)),
                LessOrEqual if lu == ru => Some(Value::Bool(l <= r)),
                GreaterOrEqual if lu == ru => Some(Value::Bool(l >= r)),
                _ => None,
            }
        },
        (Value::Text { text: l, format }, Value::Text { text: r, .. }) => match operator {
            Add => Some(Value::Text { text: format!("{}{}", l, r), format: format.clone() }),
            Less => Some(Value::Bool(l < r)),
            Greater => Some(Value::Bool(l > r)),
            LessOrEqual => Some(Value::Bool(l <= r)),
            GreaterOrEqual => Some(Value::Bool(l >= r)),
            _ => None,
        },
        (Value::Bool(l), Value::Bool(r)) => match operator {
            And => Some(Value::Bool(*l && *r)),
            Or => Some(Value::Bool(*l || *r)),
            _ => None,
        },
        _ => None,
    }
}

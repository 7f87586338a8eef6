use crate::common::*;
use crate::language::{
    ast::UnparsableReason,
    conflicts::{Conflict, ConflictKind},
    context::{Context, Shares},
    eval::{ExceptionKind, NativeRegistry, Value},
    Source,
};
use crate::runtime::{config::Config, logging::DummyLogger, Evaluator};

//------------------------------------------------------------------------------
// Interface for parsing and analysing
//------------------------------------------------------------------------------

pub(crate) struct Tester {
    test_name: String,
    source: String,
    shares: Shares,
    natives: Option<NativeRegistry>,
}

impl Tester {
    pub(crate) fn new<S: ToString>(test_name: S) -> Self {
        Self { test_name: test_name.to_string(), source: String::new(), shares: Shares::new(), natives: None }
    }

    /// Utility for quick tests of a program that should have no blocking
    /// conflicts.
    pub(crate) fn new_single_source_expect_ok<T: ToString, S: ToString>(test_name: T, source: S) -> ProgramTester {
        Self::new(test_name).with_source(source).compile().expect_ok()
    }

    /// Utility for quick tests of a program that should have conflicts.
    pub(crate) fn new_single_source_expect_conflicts<T: ToString, S: ToString>(
        test_name: T,
        source: S,
    ) -> ConflictsTester {
        Self::new(test_name).with_source(source).compile().expect_conflicts()
    }

    pub(crate) fn with_source<S: ToString>(mut self, source: S) -> Self {
        self.source = source.to_string();
        self
    }

    pub(crate) fn with_share(mut self, name: &str, value: Value) -> Self {
        self.shares.insert(name, value.get_type(), value);
        self
    }

    pub(crate) fn with_natives(mut self, natives: NativeRegistry) -> Self {
        self.natives = Some(natives);
        self
    }

    pub(crate) fn compile(self) -> ProgramTester {
        let natives = Arc::new(self.natives.unwrap_or_else(NativeRegistry::with_defaults));
        let source = Source::new(&self.test_name, &self.source);
        let context = Context::new(Rc::new(source), self.shares, natives);
        ProgramTester { test_name: self.test_name, context: Rc::new(context) }
    }
}

//------------------------------------------------------------------------------
// Interface for an analysed program
//------------------------------------------------------------------------------

pub(crate) struct ProgramTester {
    test_name: String,
    context: Rc<Context>,
}

impl ProgramTester {
    pub(crate) fn context(&self) -> &Context {
        &self.context
    }

    pub(crate) fn expect_ok(self) -> Self {
        let blocking: Vec<Conflict> =
            self.context.get_all_conflicts().into_iter().filter(|c| c.is_blocking()).collect();
        assert!(
            blocking.is_empty(),
            "[{}] Expected no blocking conflicts, but found {}",
            self.test_name,
            describe(&self.context, &blocking)
        );
        self
    }

    pub(crate) fn expect_conflicts(self) -> ConflictsTester {
        let conflicts = self.context.get_all_conflicts();
        assert!(!conflicts.is_empty(), "[{}] Expected conflicts, but found none", self.test_name);
        ConflictsTester { test_name: self.test_name, context: self.context, conflicts }
    }

    pub(crate) fn assert_text(self, expected: &str) -> Self {
        let text = self.context.source().text();
        assert_eq!(text, expected, "[{}] Source text differs", self.test_name);
        self
    }

    /// Type of the last statement of the program.
    pub(crate) fn assert_type(self, expected: &str) -> Self {
        let ty = self.context.get_type(self.context.program());
        assert_eq!(ty.to_string(), expected, "[{}] Program type differs", self.test_name);
        self
    }

    /// Calls `f` with the `index`th node of the given kind, in source order.
    pub(crate) fn for_node<F: Fn(NodeTester)>(self, kind: &str, index: usize, f: F) -> Self {
        let found = self
            .context
            .heap()
            .descendants(self.context.program())
            .into_iter()
            .filter(|id| self.context.node(*id).kind_name() == kind)
            .nth(index);
        match found {
            Some(id) => f(NodeTester { test_name: &self.test_name, context: &self.context, id }),
            None => panic!("[{}] No {} node at index {}", self.test_name, kind, index),
        }
        self
    }

    pub(crate) fn count_nodes(&self, kind: &str) -> usize {
        self.context
            .heap()
            .descendants(self.context.program())
            .into_iter()
            .filter(|id| self.context.node(*id).kind_name() == kind)
            .count()
    }

    /// Plays the program to the end in a fresh evaluator.
    pub(crate) fn evaluate(self) -> ValueTester {
        let mut evaluator = Evaluator::new(self.context.clone(), Config::default(), Box::new(DummyLogger));
        if evaluator.start().is_err() {
            panic!("[{}] Evaluator could not start", self.test_name);
        }
        let faulted = evaluator.is_faulted();
        let value = evaluator.current_value().cloned().unwrap_or_else(Value::none);
        ValueTester { test_name: self.test_name, value, faulted }
    }
}

fn describe(context: &Context, conflicts: &[Conflict]) -> String {
    conflicts
        .iter()
        .map(|c| format!("{} on {}", c.kind, context.node(c.primary).kind_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) struct NodeTester<'a> {
    test_name: &'a str,
    context: &'a Context,
    id: NodeId,
}

impl<'a> NodeTester<'a> {
    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn assert_type(&self, expected: &str) -> &Self {
        let ty = self.context.get_type(self.id);
        assert_eq!(ty.to_string(), expected, "[{}] Type of {:?} differs", self.test_name, self.id);
        self
    }

    pub(crate) fn assert_text(&self, expected: &str) -> &Self {
        let text = crate::language::ast_printer::print_source(self.context.heap(), self.id);
        assert_eq!(text.trim(), expected, "[{}] Text of {:?} differs", self.test_name, self.id);
        self
    }

    pub(crate) fn assert_unparsable(&self, reason: UnparsableReason) -> &Self {
        match self.context.node(self.id) {
            Node::Unparsable(unparsable) => assert_eq!(unparsable.reason, reason, "[{}] Reason differs", self.test_name),
            other => panic!("[{}] Expected an unparsable node, found {}", self.test_name, other.kind_name()),
        }
        self
    }

    pub(crate) fn assert_no_conflicts(&self) -> &Self {
        let conflicts = self.context.get_conflicts(self.id);
        assert!(
            conflicts.is_empty(),
            "[{}] Expected no conflicts, found {}",
            self.test_name,
            describe(self.context, &conflicts)
        );
        self
    }
}

//------------------------------------------------------------------------------
// Interface for conflicts
//------------------------------------------------------------------------------

pub(crate) struct ConflictsTester {
    test_name: String,
    context: Rc<Context>,
    conflicts: Vec<Conflict>,
}

impl ConflictsTester {
    pub(crate) fn assert_count(self, expected: usize) -> Self {
        assert_eq!(
            self.conflicts.len(),
            expected,
            "[{}] Expected {} conflicts, found {}",
            self.test_name,
            expected,
            describe(&self.context, &self.conflicts)
        );
        self
    }

    /// Asserts a conflict of the given kind owned by a node of kind `owner`.
    pub(crate) fn assert_conflict(self, owner: &str, kind: ConflictKind) -> Self {
        let found = self
            .conflicts
            .iter()
            .any(|c| c.kind == kind && self.context.node(c.primary).kind_name() == owner);
        assert!(
            found,
            "[{}] Expected '{}' on {}, found {}",
            self.test_name,
            kind,
            owner,
            describe(&self.context, &self.conflicts)
        );
        self
    }

    pub(crate) fn assert_count_of<F: Fn(&ConflictKind) -> bool>(self, expected: usize, f: F) -> Self {
        let count = self.conflicts.iter().filter(|c| f(&c.kind)).count();
        assert_eq!(
            count,
            expected,
            "[{}] Expected {} matching conflicts, found {}",
            self.test_name,
            expected,
            describe(&self.context, &self.conflicts)
        );
        self
    }

    pub(crate) fn assert_advisory(self, kind: ConflictKind) -> Self {
        let conflict = self.conflicts.iter().find(|c| c.kind == kind);
        match conflict {
            Some(conflict) => assert!(!conflict.is_blocking(), "[{}] '{}' should be advisory", self.test_name, kind),
            None => panic!("[{}] No '{}' conflict", self.test_name, kind),
        }
        self
    }
}

//------------------------------------------------------------------------------
// Interface for evaluated values
//------------------------------------------------------------------------------

pub(crate) struct ValueTester {
    test_name: String,
    value: Value,
    faulted: bool,
}

impl ValueTester {
    pub(crate) fn value(&self) -> &Value {
        &self.value
    }

    pub(crate) fn assert_number(self, expected: f64) -> Self {
        assert!(!self.faulted, "[{}] Evaluation faulted with {}", self.test_name, self.value);
        assert_eq!(self.value.as_number(), Some(expected), "[{}] Got {}", self.test_name, self.value);
        self
    }

    pub(crate) fn assert_bool(self, expected: bool) -> Self {
        assert!(!self.faulted, "[{}] Evaluation faulted with {}", self.test_name, self.value);
        assert_eq!(self.value.as_bool(), Some(expected), "[{}] Got {}", self.test_name, self.value);
        self
    }

    pub(crate) fn assert_display(self, expected: &str) -> Self {
        assert!(!self.faulted, "[{}] Evaluation faulted with {}", self.test_name, self.value);
        assert_eq!(self.value.to_display_text(), expected, "[{}] Displayed value differs", self.test_name);
        self
    }

    pub(crate) fn assert_exception(self, kind: ExceptionKind) -> Self {
        assert!(self.faulted, "[{}] Expected a fault, got {}", self.test_name, self.value);
        match &self.value {
            Value::Exception(exception) => assert_eq!(exception.kind, kind, "[{}] {}", self.test_name, exception),
            other => panic!("[{}] Expected an exception, got {}", self.test_name, other),
        }
        self
    }
}

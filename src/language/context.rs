use std::cell::RefCell;

use crate::common::*;
use crate::language::conflicts::{self, Conflict};
use crate::language::eval::natives::NativeRegistry;
use crate::language::eval::value::Value;
use crate::language::types::{FunctionSignature, Type, UnknownReason};
use crate::language::typing;
use crate::language::Source;

/// A value another program shared, visible to borrows by name.
#[derive(Debug, Clone)]
pub struct SharedValue {
    pub ty: Type,
    pub value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Shares {
    entries: HashMap<String, SharedValue>,
}

impl Shares {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, ty: Type, value: Value) {
        self.entries.insert(name.to_string(), SharedValue { ty, value });
    }

    pub fn get(&self, name: &str) -> Option<&SharedValue> {
        self.entries.get(name)
    }

    /// Builds shares from the values a finished evaluation exported.
    pub fn from_values<'a, I: IntoIterator<Item = (&'a String, &'a Value)>>(values: I) -> Self {
        let mut shares = Self::new();
        for (name, value) in values {
            shares.insert(name, value.get_type(), value.clone());
        }
        shares
    }
}

/// What a name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Definition {
    Bind(NodeId),
    Function(NodeId),
    Structure(NodeId),
    TypeVariable(NodeId),
    /// Column `index` of the table the query at `query` operates on.
    Column { query: NodeId, index: usize },
    Borrow(NodeId),
    Native,
}

/// Shared analysis state for one source: the parent index, the borrowed
/// shares, the registered natives and the caches of computed types and
/// conflicts. Types that depend on a cycle are never cached.
pub struct Context {
    source: Rc<Source>,
    shares: Shares,
    natives: Arc<NativeRegistry>,
    parents: HashMap<NodeId, NodeId>,
    types: RefCell<HashMap<NodeId, Type>>,
    conflicts: RefCell<HashMap<NodeId, Rc<Vec<Conflict>>>>,
    visiting: RefCell<Vec<NodeId>>,
    cycles: RefCell<usize>,
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("source", &self.source.name)
            .field("types", &self.types.borrow().len())
            .field("conflicts", &self.conflicts.borrow().len())
            .finish()
    }
}

impl Context {
    pub fn new(source: Rc<Source>, shares: Shares, natives: Arc<NativeRegistry>) -> Self {
        let parents = source.heap.parents(source.program);
        Self {
            source,
            shares,
            natives,
            parents,
            types: RefCell::new(HashMap::new()),
            conflicts: RefCell::new(HashMap::new()),
            visiting: RefCell::new(Vec::new()),
            cycles: RefCell::new(0),
        }
    }

    /// Context without shares, using the default natives.
    pub fn for_source(source: Source) -> Self {
        Self::new(Rc::new(source), Shares::new(), Arc::new(NativeRegistry::with_defaults()))
    }

    pub fn source(&self) -> &Source {
        &self.source
    }

    pub fn heap(&self) -> &Heap {
        &self.source.heap
    }

    pub fn program(&self) -> NodeId {
        self.source.program
    }

    pub fn shares(&self) -> &Shares {
        &self.shares
    }

    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.source.heap[id]
    }

    pub fn text(&self, id: TokenId) -> &str {
        self.source.heap.text(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents.get(&id).copied()
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            result.push(parent);
            current = parent;
        }
        result
    }

    pub fn is_inside(&self, id: NodeId, ancestor: NodeId) -> bool {
        id == ancestor || self.ancestors(id).contains(&ancestor)
    }

    /// Type of `id`. Re-entering a node whose type is being computed yields
    /// an unknown type, and nothing computed while a cycle was open is
    /// cached.
    pub fn get_type(&self, id: NodeId) -> Type {
        if let Some(ty) = self.types.borrow().get(&id) {
            return ty.clone();
        }
        if self.visiting.borrow().contains(&id) {
            *self.cycles.borrow_mut() += 1;
            return Type::Unknown(UnknownReason::Cycle);
        }
        let cycles_before = *self.cycles.borrow();
        self.visiting.borrow_mut().push(id);
        let ty = typing::compute_type(self, id);
        self.visiting.borrow_mut().pop();
        if *self.cycles.borrow() == cycles_before {
            self.types.borrow_mut().insert(id, ty.clone());
        } else if self.visiting.borrow().is_empty() {
            *self.cycles.borrow_mut() = 0;
        }
        ty
    }

    /// Conflicts owned by `id` alone, computed once.
    pub fn get_conflicts(&self, id: NodeId) -> Rc<Vec<Conflict>> {
        if let Some(found) = self.conflicts.borrow().get(&id) {
            return Rc::clone(found);
        }
        let computed = Rc::new(conflicts::compute_conflicts(self, id));
        self.conflicts.borrow_mut().insert(id, Rc::clone(&computed));
        computed
    }

    /// Conflicts of every node in the program, in pre-order.
    pub fn get_all_conflicts(&self) -> Vec<Conflict> {
        self.heap()
            .descendants(self.program())
            .into_iter()
            .flat_map(|id| self.get_conflicts(id).iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Blocking conflicts that prevent the step at `id` from running: those
    /// of the node itself and of the descendants that are not evaluated as
    /// steps of their own.
    pub fn blocking_conflicts(&self, id: NodeId) -> Vec<Conflict> {
        let mut result = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            result.extend(self.get_conflicts(current).iter().filter(|c| c.is_blocking()).cloned());
            for child in self.heap().child_nodes(current) {
                let node = self.node(child);
                if !node.is_expression() && !matches!(node, Node::Bind(_)) {
                    stack.push(child);
                }
            }
        }
        result
    }

    pub fn resolve(&self, reference: NodeId, name: &str) -> Option<Definition> {
        typing::resolve(self, reference, name)
    }

    /// Instantiates a generic signature for one evaluation. Explicit type
    /// inputs bind the type variables in order; the rest are inferred from
    /// the input types. Bindings live only in the returned signature.
    pub fn instantiate(&self, signature: &FunctionSignature, explicit: &[Type], inputs: &[Type]) -> FunctionSignature {
        if signature.type_variables.is_empty() {
            return signature.clone();
        }
        let mut bindings = HashMap::new();
        for (variable, ty) in signature.type_variables.iter().zip(explicit.iter()) {
            bindings.insert(*variable, ty.clone());
        }
        for (input, given) in signature.inputs.iter().zip(inputs.iter()) {
            input.ty.infer(given, &mut bindings);
        }
        match Type::Function(signature.clone()).substitute(&bindings) {
            Type::Function(instantiated) => instantiated,
            _ => signature.clone(),
        }
    }
}

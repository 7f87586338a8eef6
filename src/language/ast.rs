use std::ops::Index;

use super::arena::{Arena, Id};
use super::tokens::{Token, TokenBuffer};
use crate::common::*;

pub use super::tokens::TokenId;
pub type NodeId = Id<Node>;

/// A child of a node, in source order. Tokens are the leaves of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Child {
    Node(NodeId),
    Token(TokenId),
}

/// Why the parser gave up on a production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UnparsableReason {
    #[display(fmt = "expected a name after the borrow")]
    ExpectedBorrowName,
    #[display(fmt = "expected a name for the bind")]
    ExpectedBindName,
    #[display(fmt = "expected a name for the structure")]
    ExpectedStructureName,
    #[display(fmt = "expected a name after the access")]
    ExpectedAccessName,
    #[display(fmt = "expected a name for the type variable")]
    ExpectedTypeVariableName,
    #[display(fmt = "expected opening parenthesis")]
    ExpectedEvalOpen,
    #[display(fmt = "expected closing parenthesis")]
    ExpectedEvalClose,
    #[display(fmt = "expected opening bracket")]
    ExpectedListOpen,
    #[display(fmt = "expected closing bracket")]
    ExpectedListClose,
    #[display(fmt = "expected opening brace")]
    ExpectedSetOpen,
    #[display(fmt = "expected closing brace")]
    ExpectedSetClose,
    #[display(fmt = "expected the start of a text")]
    ExpectedTextOpen,
    #[display(fmt = "expected the end of a text")]
    ExpectedTextClose,
    #[display(fmt = "expected an expression")]
    ExpectedExpression,
    #[display(fmt = "expected a unit name")]
    ExpectedUnitName,
    #[display(fmt = "expected a type")]
    ExpectedType,
}

/// The categories a field of a node accepts. Used to validate replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeClass {
    Expression,
    Type,
    Statement,
    Bind,
    Block,
    Borrow,
    Docs,
    Doc,
    Language,
    Names,
    Name,
    Unit,
    TypeVariable,
    TypeInput,
    Column,
    Row,
    Cell,
    KeyValue,
    Any,
}

/// Describes one field of a node: its name, what it accepts and the
/// children it currently holds.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: &'static str,
    pub classes: &'static [NodeClass],
    pub children: Vec<Child>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    NotInTree(NodeId),
    AlreadyInTree(NodeId),
    IncompatibleReplacement { field: &'static str, replacement: &'static str },
}

// Field kinds understood by `define_nodes!`. Every kind maps to a storage
// type, a way to list the children it holds and a way to rebuild it with
// replaced node children.
macro_rules! field_type {
    (Token) => { TokenId };
    (OptToken) => { Option<TokenId> };
    (Tokens) => { Vec<TokenId> };
    (Node) => { NodeId };
    (OptNode) => { Option<NodeId> };
    (Nodes) => { Vec<NodeId> };
    (Parts) => { Vec<Child> };
    (Reason) => { UnparsableReason };
}

macro_rules! push_children {
    (Token, $v:expr, $out:ident) => { $out.push(Child::Token($v)) };
    (OptToken, $v:expr, $out:ident) => { if let Some(t) = $v { $out.push(Child::Token(t)) } };
    (Tokens, $v:expr, $out:ident) => { $out.extend($v.iter().map(|t| Child::Token(*t))) };
    (Node, $v:expr, $out:ident) => { $out.push(Child::Node($v)) };
    (OptNode, $v:expr, $out:ident) => { if let Some(n) = $v { $out.push(Child::Node(n)) } };
    (Nodes, $v:expr, $out:ident) => { $out.extend($v.iter().map(|n| Child::Node(*n))) };
    (Parts, $v:expr, $out:ident) => { $out.extend($v.iter().copied()) };
    (Reason, $v:expr, $out:ident) => {};
}

macro_rules! map_field {
    (Node, $v:expr, $f:ident) => { $f($v) };
    (OptNode, $v:expr, $f:ident) => { $v.map(|n| $f(n)) };
    (Nodes, $v:expr, $f:ident) => { $v.iter().map(|n| $f(*n)).collect() };
    (Parts, $v:expr, $f:ident) => {
        $v.iter().map(|c| match c {
            Child::Node(n) => Child::Node($f(*n)),
            token => *token,
        }).collect()
    };
    ($other:ident, $v:expr, $f:ident) => { $v.clone() };
}

/// Defines every node struct, the `Node` sum type over them and the
/// uniform child access that traversal and replacement rely on.
macro_rules! define_nodes {
    ($(
        $(#[$meta:meta])*
        $name:ident { $( $field:ident : $kind:ident [ $($class:ident),* ] ),* $(,)? }
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq)]
            pub struct $name { $( pub $field: field_type!($kind), )* }

            impl From<$name> for Node {
                fn from(node: $name) -> Node { Node::$name(node) }
            }
        )*

        #[derive(Debug, Clone, PartialEq)]
        pub enum Node { $( $name($name), )* }

        impl Node {
            pub fn kind_name(&self) -> &'static str {
                match self { $( Node::$name(_) => stringify!($name), )* }
            }

            pub fn children(&self) -> Vec<Child> {
                let mut out = Vec::new();
                match self { $( Node::$name(_node) => { $( push_children!($kind, _node.$field, out); )* } )* }
                out
            }

            /// Copy of this node with every node child passed through `f`.
            pub(crate) fn map_nodes(&self, f: &mut dyn FnMut(NodeId) -> NodeId) -> Node {
                match self {
                    $( Node::$name(_node) => Node::$name($name { $( $field: map_field!($kind, _node.$field, f), )* }), )*
                }
            }

            pub fn fields(&self) -> Vec<Field> {
                match self {
                    $( Node::$name(_node) => vec![ $( Field {
                        name: stringify!($field),
                        classes: &[ $( NodeClass::$class ),* ],
                        children: { let mut out = Vec::new(); push_children!($kind, _node.$field, out); out },
                    }, )* ], )*
                }
            }
        }
    };
}

define_nodes! {
    Program { borrows: Nodes [Borrow], block: Node [Block], end: Token [] }
    Borrow { borrow: Token [], name: Token [], version: OptToken [] }
    Share { share: Token [], bind: Node [Bind] }
    Block {
        docs: OptNode [Docs],
        open: OptToken [],
        statements: Nodes [Statement],
        close: OptToken [],
    }
    Docs { docs: Nodes [Doc] }
    Doc { text: Token [], language: OptNode [Language] }
    Language { slash: Token [], name: OptToken [] }
    Names { names: Nodes [Name] }
    Name { separator: OptToken [], name: Token [], language: OptNode [Language] }
    Bind {
        docs: OptNode [Docs],
        etc: OptToken [],
        names: Node [Names],
        dot: OptToken [],
        ty: OptNode [Type],
        colon: OptToken [],
        value: OptNode [Expression],
    }
    TypeVariable { open: Token [], names: Node [Names] }
    TypeInput { open: Token [], ty: Node [Type] }

    // Expressions
    MeasurementLiteral { number: Token [], unit: OptNode [Unit] }
    Unit { tokens: Tokens [] }
    BooleanLiteral { value: Token [] }
    NoneLiteral { none: Token [], names: OptNode [Names] }
    TextLiteral { text: Token [], format: OptNode [Language] }
    Template { parts: Parts [Expression], format: OptNode [Language] }
    ListLiteral { open: Token [], values: Nodes [Expression], close: Token [] }
    SetLiteral { open: Token [], values: Nodes [Expression], close: Token [] }
    MapLiteral { open: Token [], pairs: Nodes [KeyValue], bind: OptToken [], close: Token [] }
    KeyValue { key: Node [Expression], bind: Token [], value: Node [Expression] }
    TableLiteral { columns: Nodes [Column], rows: Nodes [Row] }
    Column { bar: Token [], bind: Node [Bind] }
    Row { cells: Nodes [Cell] }
    Cell { bar: Token [], value: Node [Expression, Bind] }
    Reference { name: Token [] }
    This { dot: Token [] }
    PropertyReference { structure: Node [Expression], dot: Token [], name: Token [] }
    ListAccess { list: Node [Expression], open: Token [], index: Node [Expression], close: Token [] }
    SetOrMapAccess { set: Node [Expression], open: Token [], key: Node [Expression], close: Token [] }
    Evaluate {
        func: Node [Expression],
        type_inputs: Nodes [TypeInput],
        open: Token [],
        inputs: Nodes [Expression, Bind],
        close: Token [],
    }
    Convert { expression: Node [Expression], convert: Token [], ty: Node [Type] }
    Select { table: Node [Expression], select: Token [], row: Node [Row], query: Node [Expression] }
    Insert { table: Node [Expression], insert: Token [], row: Node [Row] }
    Update { table: Node [Expression], update: Token [], row: Node [Row], query: Node [Expression] }
    Delete { table: Node [Expression], delete: Token [], query: Node [Expression] }
    Reaction { initial: Node [Expression], delta: Token [], stream: Node [Expression], next: Node [Expression] }
    Conditional { condition: Node [Expression], question: Token [], yes: Node [Expression], no: Node [Expression] }
    BinaryOperation { left: Node [Expression], operator: Token [], right: Node [Expression] }
    UnaryOperation { operator: Token [], operand: Node [Expression] }
    Is { expression: Node [Expression], dot: Token [], ty: Node [Type] }
    FunctionDefinition {
        docs: OptNode [Docs],
        fun: Token [],
        names: OptNode [Names],
        type_variables: Nodes [TypeVariable],
        open: Token [],
        inputs: Nodes [Bind],
        close: Token [],
        dot: OptToken [],
        output: OptNode [Type],
        etc: OptToken [],
        body: OptNode [Expression],
    }
    StructureDefinition {
        docs: OptNode [Docs],
        dot: Token [],
        names: Node [Names],
        interfaces: Nodes [Type],
        type_variables: Nodes [TypeVariable],
        open: Token [],
        inputs: Nodes [Bind],
        close: Token [],
        block: OptNode [Block],
    }
    ConversionDefinition {
        docs: OptNode [Docs],
        convert: Token [],
        input: Node [Type],
        output: Node [Type],
        expression: Node [Expression],
    }
    ExpressionPlaceholder { token: Token [] }
    Unparsable { reason: Reason [], parts: Parts [Any] }

    // Types
    NameType { dot: OptToken [], name: Token [], type_inputs: Nodes [TypeInput] }
    BooleanType { token: Token [] }
    MeasurementType { hash: Token [], unit: OptNode [Unit] }
    TextType { quote: Token [], format: OptNode [Language] }
    NoneType { none: Token [], names: OptNode [Names] }
    ListType { open: Token [], item: OptNode [Type], close: Token [] }
    SetOrMapType { open: Token [], key: OptNode [Type], bind: OptToken [], value: OptNode [Type], close: Token [] }
    TableType { columns: Nodes [Column] }
    FunctionType { fun: Token [], open: Token [], inputs: Nodes [Type], close: Token [], output: Node [Type] }
    StreamType { delta: Token [], ty: Node [Type] }
    UnionType { left: Node [Type], or: Token [], right: Node [Type] }
    TypePlaceholder { token: Token [] }
}

impl Node {
    pub fn is_expression(&self) -> bool {
        use Node::*;
        match self {
            MeasurementLiteral(_) | BooleanLiteral(_) | NoneLiteral(_) | TextLiteral(_) | Template(_)
            | ListLiteral(_) | SetLiteral(_) | MapLiteral(_) | TableLiteral(_) | Reference(_) | This(_)
            | PropertyReference(_) | ListAccess(_) | SetOrMapAccess(_) | Evaluate(_) | Convert(_)
            | Select(_) | Insert(_) | Update(_) | Delete(_) | Reaction(_) | Conditional(_)
            | BinaryOperation(_) | UnaryOperation(_) | Is(_) | FunctionDefinition(_)
            | StructureDefinition(_) | ConversionDefinition(_) | ExpressionPlaceholder(_) | Block(_) => true,
            _ => false,
        }
    }

    pub fn is_type(&self) -> bool {
        use Node::*;
        match self {
            NameType(_) | BooleanType(_) | MeasurementType(_) | TextType(_) | NoneType(_) | ListType(_)
            | SetOrMapType(_) | TableType(_) | FunctionType(_) | StreamType(_) | UnionType(_)
            | TypePlaceholder(_) => true,
            _ => false,
        }
    }

    pub fn is_unparsable(&self) -> bool {
        match self {
            Node::Unparsable(_) => true,
            _ => false,
        }
    }

    /// Unparsable nodes stand in for any class.
    pub fn is_class(&self, class: NodeClass) -> bool {
        if self.is_unparsable() {
            return true;
        }
        match class {
            NodeClass::Any => true,
            NodeClass::Expression => self.is_expression(),
            NodeClass::Type => self.is_type(),
            NodeClass::Statement => {
                self.is_expression() || matches!(self, Node::Bind(_) | Node::Share(_))
            }
            NodeClass::Bind => matches!(self, Node::Bind(_)),
            NodeClass::Block => matches!(self, Node::Block(_)),
            NodeClass::Borrow => matches!(self, Node::Borrow(_)),
            NodeClass::Docs => matches!(self, Node::Docs(_)),
            NodeClass::Doc => matches!(self, Node::Doc(_)),
            NodeClass::Language => matches!(self, Node::Language(_)),
            NodeClass::Names => matches!(self, Node::Names(_)),
            NodeClass::Name => matches!(self, Node::Name(_)),
            NodeClass::Unit => matches!(self, Node::Unit(_)),
            NodeClass::TypeVariable => matches!(self, Node::TypeVariable(_)),
            NodeClass::TypeInput => matches!(self, Node::TypeInput(_)),
            NodeClass::Column => matches!(self, Node::Column(_)),
            NodeClass::Row => matches!(self, Node::Row(_)),
            NodeClass::Cell => matches!(self, Node::Cell(_)),
            NodeClass::KeyValue => matches!(self, Node::KeyValue(_)),
        }
    }
}

/// Owns the tokens of a source and every node ever built from them. Nodes
/// are immutable once allocated; editing allocates new ancestors and leaves
/// the previous tree intact.
#[derive(Debug, Clone, Default)]
pub struct Heap {
    pub tokens: TokenBuffer,
    pub nodes: Arena<Node>,
}

impl Heap {
    pub fn new(tokens: TokenBuffer) -> Self {
        Self { tokens, nodes: Arena::new() }
    }

    pub fn alloc(&mut self, node: impl Into<Node>) -> NodeId {
        self.nodes.alloc(node.into())
    }

    pub fn alloc_token(&mut self, token: Token) -> TokenId {
        self.tokens.tokens.alloc(token)
    }

    pub fn token(&self, id: TokenId) -> &Token {
        &self.tokens[id]
    }

    pub fn text(&self, id: TokenId) -> &str {
        &self.tokens[id].text
    }

    pub fn child_nodes(&self, id: NodeId) -> Vec<NodeId> {
        self[id]
            .children()
            .into_iter()
            .filter_map(|c| match c {
                Child::Node(n) => Some(n),
                Child::Token(_) => None,
            })
            .collect()
    }

    /// All nodes of the tree rooted at `root` in pre-order, `root` first.
    pub fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut result = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            result.push(id);
            let children = self.child_nodes(id);
            stack.extend(children.into_iter().rev());
        }
        result
    }

    /// Tokens of the tree in source order.
    pub fn leaves(&self, root: NodeId) -> Vec<TokenId> {
        let mut result = Vec::new();
        let mut stack = vec![Child::Node(root)];
        while let Some(child) = stack.pop() {
            match child {
                Child::Token(t) => result.push(t),
                Child::Node(n) => stack.extend(self[n].children().into_iter().rev()),
            }
        }
        result
    }

    pub fn parents(&self, root: NodeId) -> HashMap<NodeId, NodeId> {
        let mut parents = HashMap::new();
        for id in self.descendants(root) {
            for child in self.child_nodes(id) {
                parents.insert(child, id);
            }
        }
        parents
    }

    /// Path from `root` down to `target`, both included.
    pub fn path_to(&self, root: NodeId, target: NodeId) -> Option<Vec<NodeId>> {
        if root == target {
            return Some(vec![root]);
        }
        for child in self.child_nodes(root) {
            if let Some(mut path) = self.path_to(child, target) {
                path.insert(0, root);
                return Some(path);
            }
        }
        None
    }

    /// Builds a new tree equal to the one at `root` except that `original`
    /// is replaced. Only the ancestors of `original` are allocated anew,
    /// every other subtree is shared with the old tree by id.
    pub fn clone_with_replacement(
        &mut self,
        root: NodeId,
        original: NodeId,
        replacement: NodeId,
    ) -> Result<NodeId, EditError> {
        let path = self.path_to(root, original).ok_or(EditError::NotInTree(original))?;
        if replacement != original && self.descendants(root).contains(&replacement) {
            return Err(EditError::AlreadyInTree(replacement));
        }
        if path.len() >= 2 {
            let parent = &self[path[path.len() - 2]];
            let field = parent
                .fields()
                .into_iter()
                .find(|f| f.children.contains(&Child::Node(original)));
            if let Some(field) = field {
                let node = &self[replacement];
                if !field.classes.iter().any(|class| node.is_class(*class)) {
                    return Err(EditError::IncompatibleReplacement {
                        field: field.name,
                        replacement: node.kind_name(),
                    });
                }
            }
        }

        let mut previous = original;
        let mut current = replacement;
        for ancestor in path.iter().rev().skip(1) {
            let rebuilt = self[*ancestor].map_nodes(&mut |child| if child == previous { current } else { child });
            previous = *ancestor;
            current = self.alloc(rebuilt);
        }
        Ok(current)
    }
}

impl Index<NodeId> for Heap {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }
}

impl Index<TokenId> for Heap {
    type Output = Token;
    fn index(&self, id: TokenId) -> &Token {
        &self.tokens[id]
    }
}

/// Typed access to a node of a known kind.
macro_rules! node_as {
    ($heap:expr, $id:expr, $kind:ident) => {
        match &$heap[$id] {
            crate::language::ast::Node::$kind(node) => Some(node),
            _ => None,
        }
    };
}

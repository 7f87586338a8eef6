///////////////////// PRELUDE /////////////////////

pub(crate) use crate::language::{
    arena::{Arena, Id},
    ast::{Child, Heap, Node, NodeId, TokenId},
    tokens::{Token, TokenKind},
};

pub(crate) use core::fmt::{Debug, Formatter};
pub(crate) use maplit::hashmap;
pub(crate) use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    io::Write,
    rc::Rc,
    sync::Arc,
};

use std::fmt;
use std::rc::Rc;

use crate::error::KonsResult;
use crate::eval::Machine;
use crate::scope::{CapturedScope, ScopeRef};
use crate::symbol::SymbolId;

/// Location of a node on the heap: which page, which slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub page: u32,
    pub slot: u32,
}

/// The fundamental value handle. Copy semantics: the node data lives in
/// the heap, and the variant tells which kind of node the id points at.
///
/// `Nil` is the canonical empty list and the only false value. It is never
/// allocated, so every `Nil` is the same nil.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum KonsValue {
    Nil,
    Pair(NodeId),
    Symbol(NodeId),
    Keyword(NodeId),
    Integer(NodeId),
    Float(NodeId),
    NativeFunction(NodeId),
}

impl KonsValue {
    pub fn is_nil(self) -> bool {
        matches!(self, KonsValue::Nil)
    }

    /// A non-nil cons cell.
    pub fn is_pair(self) -> bool {
        matches!(self, KonsValue::Pair(_))
    }

    /// Nil or a cons cell.
    pub fn is_list(self) -> bool {
        matches!(self, KonsValue::Nil | KonsValue::Pair(_))
    }

    pub fn is_symbol(self) -> bool {
        matches!(self, KonsValue::Symbol(_))
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, KonsValue::Keyword(_))
    }

    pub fn is_integer(self) -> bool {
        matches!(self, KonsValue::Integer(_))
    }

    pub fn is_float(self) -> bool {
        matches!(self, KonsValue::Float(_))
    }

    pub fn is_native_function(self) -> bool {
        matches!(self, KonsValue::NativeFunction(_))
    }

    /// Returns true if this value is an atom (anything but a cons cell).
    pub fn is_atom(self) -> bool {
        !self.is_pair()
    }

    pub fn node_id(self) -> Option<NodeId> {
        match self {
            KonsValue::Nil => None,
            KonsValue::Pair(id)
            | KonsValue::Symbol(id)
            | KonsValue::Keyword(id)
            | KonsValue::Integer(id)
            | KonsValue::Float(id)
            | KonsValue::NativeFunction(id) => Some(id),
        }
    }

    /// The kind of heap node this handle refers to; `None` for nil.
    pub fn node_kind(self) -> Option<NodeKind> {
        match self {
            KonsValue::Nil => None,
            KonsValue::Pair(_) => Some(NodeKind::Pair),
            KonsValue::Symbol(_) => Some(NodeKind::Symbol),
            KonsValue::Keyword(_) => Some(NodeKind::Keyword),
            KonsValue::Integer(_) => Some(NodeKind::Integer),
            KonsValue::Float(_) => Some(NodeKind::Float),
            KonsValue::NativeFunction(_) => Some(NodeKind::NativeFunction),
        }
    }
}

/// Kinds of heap node. Pages are segregated by kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Pair = 0,
    Symbol = 1,
    Keyword = 2,
    Integer = 3,
    Float = 4,
    NativeFunction = 5,
}

impl NodeKind {
    pub const COUNT: usize = 6;

    pub const ALL: [NodeKind; NodeKind::COUNT] = [
        NodeKind::Pair,
        NodeKind::Symbol,
        NodeKind::Keyword,
        NodeKind::Integer,
        NodeKind::Float,
        NodeKind::NativeFunction,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Wrap a heap location in the handle variant for this kind.
    pub fn handle(self, id: NodeId) -> KonsValue {
        match self {
            NodeKind::Pair => KonsValue::Pair(id),
            NodeKind::Symbol => KonsValue::Symbol(id),
            NodeKind::Keyword => KonsValue::Keyword(id),
            NodeKind::Integer => KonsValue::Integer(id),
            NodeKind::Float => KonsValue::Float(id),
            NodeKind::NativeFunction => KonsValue::NativeFunction(id),
        }
    }
}

/// A cons cell. `captured` is only set on lambdas: it is the scope the
/// lambda closes over, and it keeps that scope and its ancestors alive.
pub struct Cons {
    pub first: KonsValue,
    pub rest: KonsValue,
    pub callable: bool,
    pub captured: Option<CapturedScope>,
}

impl Cons {
    pub fn new(first: KonsValue, rest: KonsValue) -> Self {
        Cons {
            first,
            rest,
            callable: false,
            captured: None,
        }
    }
}

/// A float literal kept as source text: mantissa (sign, digits, point,
/// fraction) and the optional exponent digits.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FloatLiteral {
    pub mantissa: String,
    pub exponent: Option<String>,
}

impl FloatLiteral {
    pub fn new(mantissa: impl Into<String>, exponent: Option<String>) -> Self {
        FloatLiteral {
            mantissa: mantissa.into(),
            exponent,
        }
    }

    /// Numeric value of the literal. Arithmetic primitives never call this.
    pub fn to_f64(&self) -> Option<f64> {
        let mut text = self.mantissa.clone();
        if let Some(exp) = &self.exponent {
            text.push('e');
            text.push_str(exp);
        }
        text.parse().ok()
    }
}

impl fmt::Display for FloatLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exponent {
            Some(exp) => write!(f, "{}e{}", self.mantissa, exp),
            None => write!(f, "{}", self.mantissa),
        }
    }
}

/// Native callable contract: (unevaluated argument list, calling scope) -> result.
pub type NativeFn = Rc<dyn Fn(&mut Machine, KonsValue, &ScopeRef) -> KonsResult<KonsValue>>;

/// A host-provided primitive.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: SymbolId,
    pub func: NativeFn,
}

/// Heap payload of a value.
pub enum Node {
    Pair(Cons),
    Symbol(SymbolId),
    Keyword(SymbolId),
    Integer(i64),
    Float(FloatLiteral),
    NativeFunction(NativeFunction),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Pair(_) => NodeKind::Pair,
            Node::Symbol(_) => NodeKind::Symbol,
            Node::Keyword(_) => NodeKind::Keyword,
            Node::Integer(_) => NodeKind::Integer,
            Node::Float(_) => NodeKind::Float,
            Node::NativeFunction(_) => NodeKind::NativeFunction,
        }
    }

    /// Values this node refers to directly.
    pub fn children(&self) -> [KonsValue; 2] {
        match self {
            Node::Pair(cons) => [cons.first, cons.rest],
            _ => [KonsValue::Nil, KonsValue::Nil],
        }
    }
}

impl fmt::Debug for KonsValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KonsValue::Nil => write!(f, "Nil"),
            KonsValue::Pair(id) => write!(f, "Pair({:?})", id),
            KonsValue::Symbol(id) => write!(f, "Symbol({:?})", id),
            KonsValue::Keyword(id) => write!(f, "Keyword({:?})", id),
            KonsValue::Integer(id) => write!(f, "Integer({:?})", id),
            KonsValue::Float(id) => write!(f, "Float({:?})", id),
            KonsValue::NativeFunction(id) => write!(f, "NativeFunction({:?})", id),
        }
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.slot)
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeFunction({:?})", self.name)
    }
}

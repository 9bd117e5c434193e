//! Typed expression trees
//!
//! Every expression owns its children; a sub-expression that would be
//! shared between two consumers is materialized into a temporary by the
//! translator and referenced through its vreg from both sites, so the
//! tree is always a tree.

use mokka_classfile::constant_pool::{FieldRef, MethodRef};
use mokka_classfile::VmType;

use crate::unit::Vreg;

/// Binary operators; comparison operators produce a boolean-valued int,
/// the three-way forms produce the JVM -1/0/1 result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
    /// lcmp and the fcmpl/dcmpl forms (NaN compares less)
    CmpL,
    /// fcmpg/dcmpg (NaN compares greater)
    CmpG,
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Ge | BinOp::Gt | BinOp::Le
        )
    }
}

/// Kind of method invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// A typed expression. The type tag is assigned at construction and never
/// mutated.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Integer-class constant (int, long, reference null, returnAddress)
    Value(VmType, i64),
    /// Floating constant
    FValue(VmType, f64),
    /// Local variable slot
    Local(VmType, u16),
    /// Virtual register holding a previously materialized value
    Temporary(VmType, Vreg),
    /// Field access; `object` is `None` for statics
    Field {
        ty: VmType,
        field: FieldRef,
        object: Option<Box<Expr>>,
    },
    /// Array element access: arrayref, index
    ArrayDeref(VmType, Box<Expr>, Box<Expr>),
    Binop(VmType, BinOp, Box<Expr>, Box<Expr>),
    /// Type conversion to the tagged type
    Conversion(VmType, Box<Expr>),
    /// Method invocation; `args` is an args-list chain
    Invoke {
        kind: InvokeKind,
        ret: VmType,
        method: MethodRef,
        args: Box<Expr>,
    },
    /// One argument in an args list
    Arg(Box<Expr>),
    /// Args-list node: rest on the left, newest `Arg` on the right
    ArgsList(Box<Expr>, Box<Expr>),
    /// Empty argument list
    NoArgs,
    /// Call into a runtime hook (allocation, instanceof); the object
    /// model itself lives behind the hook table.
    RuntimeCall {
        ty: VmType,
        hook: RuntimeHook,
        args: Box<Expr>,
    },
    /// Placeholder for a constant-pool entry that failed to resolve;
    /// lowers to a call that raises the corresponding runtime error.
    ResolutionStub { ty: VmType, cp_index: u16 },
}

/// Runtime services reached from compiled code through the hook table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeHook {
    AllocObject { class_id: u32 },
    AllocPrimArray { atype: u8 },
    AllocRefArray { class_id: u32 },
    AllocMultiArray { class_id: u32, dims: u8 },
    Instanceof { class_id: u32 },
    FloatRem,
    DoubleRem,
}

impl Expr {
    /// The value type this expression computes.
    pub fn ty(&self) -> VmType {
        match self {
            Expr::Value(ty, _)
            | Expr::FValue(ty, _)
            | Expr::Local(ty, _)
            | Expr::Temporary(ty, _)
            | Expr::ArrayDeref(ty, _, _)
            | Expr::Binop(ty, _, _, _)
            | Expr::Conversion(ty, _) => *ty,
            Expr::Field { ty, .. } => *ty,
            Expr::Invoke { ret, .. } => *ret,
            Expr::RuntimeCall { ty, .. } => *ty,
            Expr::ResolutionStub { ty, .. } => *ty,
            Expr::Arg(_) | Expr::ArgsList(_, _) | Expr::NoArgs => VmType::Void,
        }
    }
}

/// Append `expr` to an args list under construction (arguments are popped
/// last-first, so the newest argument lands on the right).
pub fn insert_arg(root: Option<Expr>, expr: Expr) -> Expr {
    match root {
        None => Expr::Arg(Box::new(expr)),
        Some(root) => Expr::ArgsList(Box::new(root), Box::new(Expr::Arg(Box::new(expr)))),
    }
}

/// Flatten an args list into source order (first argument first).
pub fn flatten_args(args: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_args(args, &mut out);
    out.reverse();
    out
}

fn collect_args<'a>(node: &'a Expr, out: &mut Vec<&'a Expr>) {
    match node {
        Expr::NoArgs => {}
        Expr::Arg(inner) => out.push(inner),
        Expr::ArgsList(rest, arg) => {
            collect_args(rest, out);
            collect_args(arg, out);
        }
        other => out.push(other),
    }
}

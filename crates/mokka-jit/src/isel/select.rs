//! Instruction selection
//!
//! Lowers each block's statement list to linear x86-64 instructions over
//! virtual registers. A hand-written tree-pattern cover: every match
//! emits one or more instructions and yields a single result vreg.
//! Missing a pattern the translator can emit is a compiler bug and
//! panics.

use log::trace;
use mokka_classfile::constant_pool::FieldRef;
use mokka_classfile::VmType;

use crate::ir::expr::{flatten_args, BinOp, Expr, InvokeKind, RuntimeHook};
use crate::ir::stmt::StmtKind;
use crate::isel::{Cond, MachInsn, MachOp, MachReg, Operand, Rv, Width, ARG_REGS, FP_ARG_REGS};
use crate::runtime::{hooks, layout, registry};
use crate::unit::{BlockId, CompilationUnit, Vreg};

pub fn width_of(ty: VmType) -> Width {
    match ty.widened() {
        VmType::Long | VmType::Double | VmType::Reference => Width::W64,
        _ => Width::W32,
    }
}

fn cond_of(op: BinOp) -> Cond {
    match op {
        BinOp::Eq => Cond::E,
        BinOp::Ne => Cond::Ne,
        BinOp::Lt => Cond::L,
        BinOp::Ge => Cond::Ge,
        BinOp::Gt => Cond::G,
        BinOp::Le => Cond::Le,
        other => unreachable!("{other:?} is not a branch condition"),
    }
}

/// What a call targets.
enum CallTarget {
    /// Direct call to another method's current entry point
    Method { addr: u64, method_id: u32 },
    /// Virtual/interface dispatch through the patchable inline-cache shape
    InlineCache { addr: u64 },
    /// Runtime helper at an arbitrary (64-bit) address
    Hook { addr: u64 },
}

/// Lower every block's statements into machine instructions.
pub fn select_instructions(cu: &mut CompilationUnit) {
    for idx in 0..cu.blocks.len() {
        let id = BlockId(idx as u32);
        if id == cu.exit {
            continue;
        }
        let stmts = std::mem::take(&mut cu.block_mut(id).stmts);
        let mut sel = Selector {
            cu: &mut *cu,
            out: Vec::new(),
        };
        for stmt in &stmts {
            sel.lower_stmt(&stmt.kind);
        }
        let out = sel.out;
        trace!("isel: {} -> {} insns", id, out.len());
        let bb = cu.block_mut(id);
        bb.insns = out;
        bb.stmts = stmts;
    }
}

struct Selector<'a> {
    cu: &'a mut CompilationUnit,
    out: Vec<MachInsn>,
}

impl<'a> Selector<'a> {
    fn emit(&mut self, insn: MachInsn) {
        self.out.push(insn);
    }

    fn emit_op(&mut self, op: MachOp, width: Width, operands: Vec<Operand>) {
        self.emit(MachInsn::new(op, width, operands));
    }

    fn alloc(&mut self, ty: VmType) -> Vreg {
        self.cu.alloc_var(ty)
    }

    fn reg(v: Vreg) -> Operand {
        Operand::Reg(Rv::Virt(v))
    }

    /// Copy between registers of the same class.
    fn emit_move(&mut self, src: Vreg, dest: Vreg, ty: VmType) {
        let op = if ty.is_float() {
            MachOp::MovfRegReg
        } else {
            MachOp::MovRegReg
        };
        self.emit_op(op, width_of(ty), vec![Self::reg(src), Self::reg(dest)]);
    }

    fn local_membase(&self, index: u16) -> Operand {
        let slot = self.cu.frame.local_slot(index as u32);
        Operand::Membase {
            base: Rv::Phys(MachReg::Rbp),
            disp: self.cu.frame.slot_offset_x64(slot),
        }
    }

    /// Load an immediate into a fresh register.
    fn load_imm(&mut self, ty: VmType, value: i64) -> Vreg {
        let dest = self.alloc(ty);
        self.emit_op(
            MachOp::MovImmReg,
            width_of(ty),
            vec![Operand::Imm(value), Self::reg(dest)],
        );
        dest
    }

    /// Materialize floating bits through a general-purpose register.
    fn load_fimm(&mut self, ty: VmType, value: f64) -> Vreg {
        let (bits, gpr_ty) = if ty == VmType::Float {
            ((value as f32).to_bits() as i64, VmType::Int)
        } else {
            (value.to_bits() as i64, VmType::Long)
        };
        let gpr = self.load_imm(gpr_ty, bits);
        let dest = self.alloc(ty);
        self.emit_op(
            MachOp::MovqGprXmm,
            width_of(ty),
            vec![Self::reg(gpr), Self::reg(dest)],
        );
        dest
    }

    /// Typed load from a membase operand.
    fn load_membase(&mut self, ty: VmType, mem: Operand) -> Vreg {
        let dest = self.alloc(ty);
        let (op, width) = match ty {
            VmType::Byte => (MachOp::MovsxByteMembaseReg, Width::W32),
            VmType::Boolean => (MachOp::MovzxByteMembaseReg, Width::W32),
            VmType::Short => (MachOp::MovsxWordMembaseReg, Width::W32),
            VmType::Char => (MachOp::MovzxWordMembaseReg, Width::W32),
            VmType::Float | VmType::Double => (MachOp::MovfMembaseReg, width_of(ty)),
            _ => (MachOp::MovMembaseReg, width_of(ty)),
        };
        self.emit_op(op, width, vec![mem, Self::reg(dest)]);
        dest
    }

    /// Typed store of a register to a membase operand.
    fn store_membase(&mut self, ty: VmType, src: Vreg, mem: Operand) {
        let (op, width) = match ty {
            VmType::Byte | VmType::Boolean => (MachOp::MovByteRegMembase, Width::W32),
            VmType::Short | VmType::Char => (MachOp::MovWordRegMembase, Width::W32),
            VmType::Float | VmType::Double => (MachOp::MovfRegMembase, width_of(ty)),
            _ => (MachOp::MovRegMembase, width_of(ty)),
        };
        self.emit_op(op, width, vec![Self::reg(src), mem]);
    }

    /// Base register pointing at an array's element data.
    fn array_data_base(&mut self, array: Vreg) -> Vreg {
        let base = self.alloc(VmType::Reference);
        self.emit_move(array, base, VmType::Reference);
        self.emit_op(
            MachOp::AddImmReg,
            Width::W64,
            vec![
                Operand::Imm(layout::ARRAY_DATA_OFFSET as i64),
                Self::reg(base),
            ],
        );
        base
    }

    fn memindex(&self, base: Vreg, index: Vreg, ty: VmType) -> Operand {
        Operand::Memindex {
            base: Rv::Virt(base),
            index: Rv::Virt(index),
            shift: layout::array_shift(ty),
        }
    }

    /// Typed load from an array element.
    fn load_memindex(&mut self, ty: VmType, mem: Operand) -> Vreg {
        let dest = self.alloc(ty);
        let (op, width) = match ty {
            VmType::Byte => (MachOp::MovsxByteMemindexReg, Width::W32),
            VmType::Boolean => (MachOp::MovzxByteMemindexReg, Width::W32),
            VmType::Short => (MachOp::MovsxWordMemindexReg, Width::W32),
            VmType::Char => (MachOp::MovzxWordMemindexReg, Width::W32),
            VmType::Float | VmType::Double => (MachOp::MovfMemindexReg, width_of(ty)),
            _ => (MachOp::MovMemindexReg, width_of(ty)),
        };
        self.emit_op(op, width, vec![mem, Self::reg(dest)]);
        dest
    }

    fn store_memindex(&mut self, ty: VmType, src: Vreg, mem: Operand) {
        let (op, width) = match ty {
            VmType::Byte | VmType::Boolean => (MachOp::MovByteRegMemindex, Width::W32),
            VmType::Short | VmType::Char => (MachOp::MovWordRegMemindex, Width::W32),
            VmType::Float | VmType::Double => (MachOp::MovfRegMemindex, width_of(ty)),
            _ => (MachOp::MovRegMemindex, width_of(ty)),
        };
        self.emit_op(op, width, vec![Self::reg(src), mem]);
    }

    /// Address operand for a field: absolute for statics, base+offset for
    /// instance fields.
    fn field_membase(&mut self, field: &FieldRef, object: Option<&Expr>) -> Operand {
        match object {
            None => {
                let base = self.load_imm(VmType::Long, field.static_addr as i64);
                Operand::Membase {
                    base: Rv::Virt(base),
                    disp: 0,
                }
            }
            Some(object) => {
                let obj = self.eval(object);
                Operand::Membase {
                    base: Rv::Virt(obj),
                    disp: field.offset as i32,
                }
            }
        }
    }

    /// Evaluate an expression tree, returning the vreg holding its value.
    fn eval(&mut self, expr: &Expr) -> Vreg {
        match expr {
            Expr::Value(ty, value) => self.load_imm(*ty, *value),
            Expr::FValue(ty, value) => self.load_fimm(*ty, *value),
            Expr::Local(ty, index) => {
                let mem = self.local_membase(*index);
                self.load_membase(ty.widened(), mem)
            }
            Expr::Temporary(_, vreg) => *vreg,
            Expr::Field { ty, field, object } => {
                let mem = self.field_membase(field, object.as_deref());
                self.load_membase(*ty, mem)
            }
            Expr::ArrayDeref(ty, array, index) => {
                let a = self.eval(array);
                let i = self.eval(index);
                let base = self.array_data_base(a);
                let mem = self.memindex(base, i, *ty);
                self.load_memindex(*ty, mem)
            }
            Expr::Binop(ty, op, left, right) => self.eval_binop(*ty, *op, left, right),
            Expr::Conversion(to, from) => self.eval_conversion(*to, from),
            Expr::Invoke {
                kind,
                ret,
                method,
                args,
            } => self
                .lower_invoke(*kind, *ret, method, args)
                .expect("non-void invoke yields a value"),
            Expr::RuntimeCall { ty, hook, args } => self.lower_runtime_call(*ty, *hook, args),
            Expr::ResolutionStub { ty, cp_index } => {
                self.lower_resolution_error(*cp_index as u32);
                // Unreachable at runtime; the parent still needs a vreg.
                self.alloc(*ty)
            }
            Expr::Arg(_) | Expr::ArgsList(_, _) | Expr::NoArgs => {
                unreachable!("args lists are consumed by call lowering")
            }
        }
    }

    fn eval_binop(&mut self, ty: VmType, op: BinOp, left: &Expr, right: &Expr) -> Vreg {
        if ty.is_float() {
            return self.eval_float_binop(ty, op, left, right);
        }
        match op {
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::And | BinOp::Or | BinOp::Xor => {
                let machop = match op {
                    BinOp::Add => MachOp::AddRegReg,
                    BinOp::Sub => MachOp::SubRegReg,
                    BinOp::Mul => MachOp::ImulRegReg,
                    BinOp::And => MachOp::AndRegReg,
                    BinOp::Or => MachOp::OrRegReg,
                    _ => MachOp::XorRegReg,
                };
                let l = self.eval(left);
                let r = self.eval(right);
                let dest = self.alloc(ty);
                self.emit_move(l, dest, ty);
                self.emit_op(machop, width_of(ty), vec![Self::reg(r), Self::reg(dest)]);
                dest
            }
            BinOp::Div | BinOp::Rem => self.eval_div_rem(ty, op, left, right),
            BinOp::Shl | BinOp::Shr | BinOp::Ushr => self.eval_shift(ty, op, left, right),
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Ge | BinOp::Gt | BinOp::Le => {
                let cmp_width = width_of(left.ty());
                let l = self.eval(left);
                let r = self.eval(right);
                self.emit_op(
                    MachOp::CmpRegReg,
                    cmp_width,
                    vec![Self::reg(l), Self::reg(r)],
                );
                let dest = self.alloc(VmType::Int);
                self.emit_op(MachOp::Setcc(cond_of(op)), Width::W32, vec![Self::reg(dest)]);
                self.emit_op(
                    MachOp::MovzxByteRegReg,
                    Width::W32,
                    vec![Self::reg(dest), Self::reg(dest)],
                );
                dest
            }
            BinOp::CmpL | BinOp::CmpG => self.eval_cmp3(op, left, right),
        }
    }

    /// Integer division pins rax (dividend/quotient) and rdx (remainder).
    fn eval_div_rem(&mut self, ty: VmType, op: BinOp, left: &Expr, right: &Expr) -> Vreg {
        let width = width_of(ty);
        let l = self.eval(left);
        let r = self.eval(right);

        let va = self.cu.alloc_fixed_var(ty, MachReg::Rax);
        let vd = self.cu.alloc_fixed_var(ty, MachReg::Rdx);
        self.emit_move(l, va, ty);
        self.emit(
            MachInsn::new(MachOp::Cdq, width, vec![]).with_implicit(vec![va], vec![vd]),
        );
        self.emit(
            MachInsn::new(MachOp::IdivReg, width, vec![Self::reg(r)])
                .with_implicit(vec![va, vd], vec![va, vd]),
        );
        let dest = self.alloc(ty);
        let src = if op == BinOp::Div { va } else { vd };
        self.emit_move(src, dest, ty);
        dest
    }

    /// Shift counts live in cl.
    fn eval_shift(&mut self, ty: VmType, op: BinOp, left: &Expr, right: &Expr) -> Vreg {
        let machop = match op {
            BinOp::Shl => MachOp::ShlRegReg,
            BinOp::Shr => MachOp::SarRegReg,
            _ => MachOp::ShrRegReg,
        };
        let l = self.eval(left);
        let count = self.eval(right);
        let vc = self.cu.alloc_fixed_var(VmType::Int, MachReg::Rcx);
        self.emit_move(count, vc, VmType::Int);
        let dest = self.alloc(ty);
        self.emit_move(l, dest, ty);
        self.emit_op(machop, width_of(ty), vec![Self::reg(vc), Self::reg(dest)]);
        dest
    }

    /// Three-way compare producing -1/0/1.
    fn eval_cmp3(&mut self, op: BinOp, left: &Expr, right: &Expr) -> Vreg {
        let operand_ty = left.ty().widened();
        if operand_ty.is_float() {
            // fcmpl(l, r) = (l > r) - (l < r or unordered); the NaN-greater
            // form is the negated swap.
            let (a, b) = if op == BinOp::CmpG {
                (right, left)
            } else {
                (left, right)
            };
            let av = self.eval(a);
            let bv = self.eval(b);
            self.emit_op(
                MachOp::UcomifRegReg,
                width_of(operand_ty),
                vec![Self::reg(av), Self::reg(bv)],
            );
            let dest = self.setcc_pair(Cond::A, Cond::B);
            if op == BinOp::CmpG {
                self.emit_op(MachOp::NegReg, Width::W32, vec![Self::reg(dest)]);
            }
            dest
        } else {
            let l = self.eval(left);
            let r = self.eval(right);
            self.emit_op(
                MachOp::CmpRegReg,
                width_of(operand_ty),
                vec![Self::reg(l), Self::reg(r)],
            );
            self.setcc_pair(Cond::G, Cond::L)
        }
    }

    /// `setcc hi; setcc lo; hi - lo` over the current flags.
    fn setcc_pair(&mut self, hi: Cond, lo: Cond) -> Vreg {
        let a = self.alloc(VmType::Int);
        let b = self.alloc(VmType::Int);
        self.emit_op(MachOp::Setcc(hi), Width::W32, vec![Self::reg(a)]);
        self.emit_op(MachOp::Setcc(lo), Width::W32, vec![Self::reg(b)]);
        self.emit_op(
            MachOp::MovzxByteRegReg,
            Width::W32,
            vec![Self::reg(a), Self::reg(a)],
        );
        self.emit_op(
            MachOp::MovzxByteRegReg,
            Width::W32,
            vec![Self::reg(b), Self::reg(b)],
        );
        self.emit_op(MachOp::SubRegReg, Width::W32, vec![Self::reg(b), Self::reg(a)]);
        a
    }

    fn eval_float_binop(&mut self, ty: VmType, op: BinOp, left: &Expr, right: &Expr) -> Vreg {
        // Negation reaches here as 0.0 - x; flip the sign bit instead so
        // -0.0 behaves.
        if op == BinOp::Sub && matches!(left, Expr::FValue(_, v) if *v == 0.0) {
            let x = self.eval(right);
            let mask = if ty == VmType::Float {
                0x8000_0000i64
            } else {
                i64::MIN
            };
            let mask_reg = self.load_fimm_bits(ty, mask);
            let dest = self.alloc(ty);
            self.emit_move(x, dest, ty);
            self.emit_op(
                MachOp::XorpsRegReg,
                width_of(ty),
                vec![Self::reg(mask_reg), Self::reg(dest)],
            );
            return dest;
        }

        let machop = match op {
            BinOp::Add => MachOp::FaddRegReg,
            BinOp::Sub => MachOp::FsubRegReg,
            BinOp::Mul => MachOp::FmulRegReg,
            BinOp::Div => MachOp::FdivRegReg,
            BinOp::Rem => {
                let hook = if ty == VmType::Float {
                    RuntimeHook::FloatRem
                } else {
                    RuntimeHook::DoubleRem
                };
                let args = Expr::ArgsList(
                    Box::new(Expr::Arg(Box::new(left.clone()))),
                    Box::new(Expr::Arg(Box::new(right.clone()))),
                );
                return self.lower_runtime_call(ty, hook, &args);
            }
            other => unreachable!("{other:?} on floats"),
        };
        let l = self.eval(left);
        let r = self.eval(right);
        let dest = self.alloc(ty);
        self.emit_move(l, dest, ty);
        self.emit_op(machop, width_of(ty), vec![Self::reg(r), Self::reg(dest)]);
        dest
    }

    /// Load raw bits into an fp register (sign masks).
    fn load_fimm_bits(&mut self, ty: VmType, bits: i64) -> Vreg {
        let gpr_ty = if ty == VmType::Float {
            VmType::Int
        } else {
            VmType::Long
        };
        let gpr = self.load_imm(gpr_ty, bits);
        let dest = self.alloc(ty);
        self.emit_op(
            MachOp::MovqGprXmm,
            width_of(ty),
            vec![Self::reg(gpr), Self::reg(dest)],
        );
        dest
    }

    fn eval_conversion(&mut self, to: VmType, from_expr: &Expr) -> Vreg {
        let from = from_expr.ty().widened();
        let src = self.eval(from_expr);
        let to_widened = to.widened();

        if from == to_widened {
            // i2b/i2c/i2s re-narrow an int in place
            let (op, needs) = match to {
                VmType::Byte => (MachOp::MovsxByteRegReg, true),
                VmType::Char => (MachOp::MovzxWordRegReg, true),
                VmType::Short => (MachOp::MovsxWordRegReg, true),
                _ => (MachOp::MovRegReg, false),
            };
            if !needs {
                return src;
            }
            let dest = self.alloc(VmType::Int);
            self.emit_op(op, Width::W32, vec![Self::reg(src), Self::reg(dest)]);
            return dest;
        }

        let dest = self.alloc(to_widened);
        let (op, width) = match (from, to_widened) {
            (VmType::Int, VmType::Long) => (MachOp::MovsxdRegReg, Width::W64),
            (VmType::Long, VmType::Int) => (MachOp::MovRegReg, Width::W32),
            (VmType::Int, VmType::Float) => (MachOp::Cvtsi2ss, Width::W32),
            (VmType::Int, VmType::Double) => (MachOp::Cvtsi2sd, Width::W32),
            (VmType::Long, VmType::Float) => (MachOp::Cvtsi2ss, Width::W64),
            (VmType::Long, VmType::Double) => (MachOp::Cvtsi2sd, Width::W64),
            (VmType::Float, VmType::Int) => (MachOp::Cvttss2si, Width::W32),
            (VmType::Float, VmType::Long) => (MachOp::Cvttss2si, Width::W64),
            (VmType::Double, VmType::Int) => (MachOp::Cvttsd2si, Width::W32),
            (VmType::Double, VmType::Long) => (MachOp::Cvttsd2si, Width::W64),
            (VmType::Float, VmType::Double) => (MachOp::Cvtss2sd, Width::W64),
            (VmType::Double, VmType::Float) => (MachOp::Cvtsd2ss, Width::W32),
            (from, to) => unreachable!("no conversion {from} -> {to}"),
        };
        self.emit_op(op, width, vec![Self::reg(src), Self::reg(dest)]);
        dest
    }

    fn lower_resolution_error(&mut self, id: u32) {
        let addr = hooks::get().resolution_error as usize as u64;
        let arg = self.load_imm(VmType::Int, id as i64);
        self.emit_call(CallTarget::Hook { addr }, vec![(arg, VmType::Int)], VmType::Void);
    }

    fn lower_runtime_call(&mut self, ty: VmType, hook: RuntimeHook, args: &Expr) -> Vreg {
        let hooks = hooks::get();
        let flat = flatten_args(args);
        let mut vals: Vec<(Vreg, VmType)> = Vec::new();

        let addr = match hook {
            RuntimeHook::AllocObject { class_id } => {
                vals.push((self.load_imm(VmType::Int, class_id as i64), VmType::Int));
                hooks.alloc_object as usize as u64
            }
            RuntimeHook::AllocPrimArray { atype } => {
                vals.push((self.load_imm(VmType::Int, atype as i64), VmType::Int));
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                hooks.alloc_prim_array as usize as u64
            }
            RuntimeHook::AllocRefArray { class_id } => {
                vals.push((self.load_imm(VmType::Int, class_id as i64), VmType::Int));
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                hooks.alloc_ref_array as usize as u64
            }
            RuntimeHook::AllocMultiArray { class_id, dims } => {
                vals.push((self.load_imm(VmType::Int, class_id as i64), VmType::Int));
                vals.push((self.load_imm(VmType::Int, dims as i64), VmType::Int));
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                for _ in flat.len()..3 {
                    vals.push((self.load_imm(VmType::Int, 0), VmType::Int));
                }
                hooks.alloc_multi_array as usize as u64
            }
            RuntimeHook::Instanceof { class_id } => {
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                vals.push((self.load_imm(VmType::Int, class_id as i64), VmType::Int));
                hooks.instanceof as usize as u64
            }
            RuntimeHook::FloatRem => {
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                hooks.f32_rem as usize as u64
            }
            RuntimeHook::DoubleRem => {
                for e in &flat {
                    vals.push((self.eval(e), e.ty().widened()));
                }
                hooks.f64_rem as usize as u64
            }
        };
        self.emit_call(CallTarget::Hook { addr }, vals, ty)
            .unwrap_or_else(|| self.alloc(ty))
    }

    fn lower_invoke(
        &mut self,
        kind: InvokeKind,
        ret: VmType,
        method: &mokka_classfile::MethodRef,
        args: &Expr,
    ) -> Option<Vreg> {
        let flat = flatten_args(args);
        let vals: Vec<(Vreg, VmType)> = flat
            .iter()
            .map(|e| (self.eval(e), e.ty().widened()))
            .collect();

        let Some(callee) = registry::lookup(method.method_id) else {
            // Resolvable in the pool but never prepared by the runtime
            self.lower_resolution_error(method.method_id);
            return if ret == VmType::Void {
                None
            } else {
                Some(self.alloc(ret))
            };
        };
        let addr = callee.entry_point() as u64;

        let target = match kind {
            InvokeKind::Static | InvokeKind::Special => CallTarget::Method {
                addr,
                method_id: method.method_id,
            },
            InvokeKind::Virtual | InvokeKind::Interface => CallTarget::InlineCache { addr },
        };
        self.emit_call(target, vals, ret)
    }

    /// Marshal arguments per the System V convention, emit the call, and
    /// collect the return value.
    fn emit_call(
        &mut self,
        target: CallTarget,
        args: Vec<(Vreg, VmType)>,
        ret: VmType,
    ) -> Option<Vreg> {
        let mut int_idx = 0;
        let mut fp_idx = 0;
        let mut implicit_uses = Vec::new();
        let mut stack_args: Vec<(Vreg, VmType)> = Vec::new();

        for (v, ty) in args {
            if ty.is_float() {
                if fp_idx < FP_ARG_REGS.len() {
                    let fixed = self.cu.alloc_fixed_var(ty, FP_ARG_REGS[fp_idx]);
                    self.emit_move(v, fixed, ty);
                    implicit_uses.push(fixed);
                    fp_idx += 1;
                } else {
                    stack_args.push((v, ty));
                }
            } else if int_idx < ARG_REGS.len() {
                let fixed = self.cu.alloc_fixed_var(ty, ARG_REGS[int_idx]);
                self.emit_move(v, fixed, ty);
                implicit_uses.push(fixed);
                int_idx += 1;
            } else {
                stack_args.push((v, ty));
            }
        }

        // Overflow arguments go to the outgoing stack area, kept 16-byte
        // aligned around the call.
        let stack_bytes = (stack_args.len() * 8).div_ceil(16) * 16;
        if !stack_args.is_empty() {
            self.emit_op(
                MachOp::SubImmReg,
                Width::W64,
                vec![
                    Operand::Imm(stack_bytes as i64),
                    Operand::Reg(Rv::Phys(MachReg::Rsp)),
                ],
            );
            for (k, (v, ty)) in stack_args.iter().enumerate() {
                let mem = Operand::Membase {
                    base: Rv::Phys(MachReg::Rsp),
                    disp: (k * 8) as i32,
                };
                self.store_membase(ty.widened(), *v, mem);
            }
        }

        let mut implicit_defs = Vec::new();
        let ret_fixed = if ret == VmType::Void {
            None
        } else {
            let reg = if ret.is_float() {
                MachReg::Xmm0
            } else {
                MachReg::Rax
            };
            let fixed = self.cu.alloc_fixed_var(ret, reg);
            implicit_defs.push(fixed);
            Some(fixed)
        };

        let call = match target {
            CallTarget::Method { addr, method_id } => MachInsn::new(
                MachOp::CallRel,
                Width::W64,
                vec![Operand::Rel(addr), Operand::Imm(method_id as i64)],
            ),
            CallTarget::InlineCache { addr } => MachInsn::new(
                MachOp::IcCall,
                Width::W64,
                vec![Operand::Imm(0), Operand::Rel(addr)],
            ),
            CallTarget::Hook { addr } => {
                self.emit_op(
                    MachOp::MovImmReg,
                    Width::W64,
                    vec![Operand::Imm(addr as i64), Operand::Reg(Rv::Phys(MachReg::R11))],
                );
                MachInsn::new(
                    MachOp::CallReg,
                    Width::W64,
                    vec![Operand::Reg(Rv::Phys(MachReg::R11))],
                )
            }
        };
        self.emit(call.with_implicit(implicit_uses, implicit_defs));

        if !stack_args.is_empty() {
            self.emit_op(
                MachOp::AddImmReg,
                Width::W64,
                vec![
                    Operand::Imm(stack_bytes as i64),
                    Operand::Reg(Rv::Phys(MachReg::Rsp)),
                ],
            );
        }

        ret_fixed.map(|fixed| {
            let dest = self.alloc(ret);
            self.emit_move(fixed, dest, ret);
            dest
        })
    }

    fn lower_store(&mut self, dest: &Expr, src: &Expr) {
        match dest {
            Expr::Local(ty, index) => {
                let v = self.eval(src);
                let mem = self.local_membase(*index);
                self.store_membase(ty.widened(), v, mem);
            }
            Expr::Temporary(ty, vreg) => {
                let v = self.eval(src);
                self.emit_move(v, *vreg, *ty);
            }
            Expr::Field { ty, field, object } => {
                let v = self.eval(src);
                let mem = self.field_membase(field, object.as_deref());
                self.store_membase(*ty, v, mem);
            }
            Expr::ArrayDeref(ty, array, index) => {
                let v = self.eval(src);
                let a = self.eval(array);
                let i = self.eval(index);
                let base = self.array_data_base(a);
                let mem = self.memindex(base, i, *ty);
                self.store_memindex(*ty, v, mem);
            }
            other => unreachable!("store into {other:?}"),
        }
    }

    fn lower_if(&mut self, cond: &Expr, target: BlockId) {
        match cond {
            Expr::Binop(_, op, left, right) if op.is_comparison() => {
                let width = width_of(left.ty());
                let l = self.eval(left);
                let r = self.eval(right);
                self.emit_op(MachOp::CmpRegReg, width, vec![Self::reg(l), Self::reg(r)]);
                self.emit_op(
                    MachOp::Jcc(cond_of(*op)),
                    Width::W32,
                    vec![Operand::Branch(target)],
                );
            }
            other => {
                let v = self.eval(other);
                self.emit_op(
                    MachOp::TestRegReg,
                    width_of(other.ty()),
                    vec![Self::reg(v), Self::reg(v)],
                );
                self.emit_op(MachOp::Jcc(Cond::Ne), Width::W32, vec![Operand::Branch(target)]);
            }
        }
    }

    fn lower_stmt(&mut self, kind: &StmtKind) {
        match kind {
            StmtKind::Store { dest, src } => self.lower_store(dest, src),
            StmtKind::If { cond, target } => self.lower_if(cond, *target),
            StmtKind::Goto { target } => {
                self.emit_op(MachOp::Jmp, Width::W32, vec![Operand::Branch(*target)]);
            }
            StmtKind::Return { value } => {
                let exit = self.cu.exit;
                let mut jmp = MachInsn::new(MachOp::Jmp, Width::W32, vec![Operand::Branch(exit)]);
                if let Some(value) = value {
                    let ty = value.ty().widened();
                    let v = self.eval(value);
                    let reg = if ty.is_float() {
                        MachReg::Xmm0
                    } else {
                        MachReg::Rax
                    };
                    let fixed = self.cu.alloc_fixed_var(ty, reg);
                    self.emit_move(v, fixed, ty);
                    jmp = jmp.with_implicit(vec![fixed], vec![]);
                }
                self.emit(jmp);
            }
            StmtKind::Expression(expr) => match expr {
                Expr::Invoke {
                    kind,
                    ret,
                    method,
                    args,
                } => {
                    self.lower_invoke(*kind, *ret, method, args);
                }
                Expr::ResolutionStub { cp_index, .. } => {
                    self.lower_resolution_error(*cp_index as u32);
                }
                other => {
                    self.eval(other);
                }
            },
            StmtKind::NullCheck(expr) => {
                // Touch the object header; a null reference raises the
                // hardware trap the signal layer maps back to the NPE.
                let v = self.eval(expr);
                let dead = self.alloc(VmType::Int);
                self.emit_op(
                    MachOp::MovMembaseReg,
                    Width::W32,
                    vec![
                        Operand::Membase {
                            base: Rv::Virt(v),
                            disp: 0,
                        },
                        Self::reg(dead),
                    ],
                );
            }
            StmtKind::ArrayCheck(deref) => {
                let Expr::ArrayDeref(_, array, index) = deref else {
                    unreachable!("array check guards a deref")
                };
                let a = self.eval(array);
                let i = self.eval(index);
                let len = self.alloc(VmType::Int);
                self.emit_op(
                    MachOp::MovMembaseReg,
                    Width::W32,
                    vec![
                        Operand::Membase {
                            base: Rv::Virt(a),
                            disp: layout::ARRAY_LENGTH_OFFSET,
                        },
                        Self::reg(len),
                    ],
                );
                self.emit_op(
                    MachOp::CmpRegReg,
                    Width::W32,
                    vec![Self::reg(i), Self::reg(len)],
                );
                // index >= length (unsigned, so negative indexes trap too)
                self.emit_op(MachOp::TrapIf(Cond::Ae), Width::W32, vec![]);
            }
            StmtKind::Athrow(expr) => {
                let v = self.eval(expr);
                let addr = hooks::get().throw as usize as u64;
                self.emit_call(
                    CallTarget::Hook { addr },
                    vec![(v, VmType::Reference)],
                    VmType::Void,
                );
            }
            StmtKind::MonitorEnter(expr) => {
                let v = self.eval(expr);
                let addr = hooks::get().monitor_enter as usize as u64;
                self.emit_call(
                    CallTarget::Hook { addr },
                    vec![(v, VmType::Reference)],
                    VmType::Void,
                );
            }
            StmtKind::MonitorExit(expr) => {
                let v = self.eval(expr);
                let addr = hooks::get().monitor_exit as usize as u64;
                self.emit_call(
                    CallTarget::Hook { addr },
                    vec![(v, VmType::Reference)],
                    VmType::Void,
                );
            }
            StmtKind::Checkcast { object, class } => {
                let v = self.eval(object);
                let id = self.load_imm(VmType::Int, class.class_id as i64);
                let addr = hooks::get().checkcast as usize as u64;
                self.emit_call(
                    CallTarget::Hook { addr },
                    vec![(v, VmType::Reference), (id, VmType::Int)],
                    VmType::Void,
                );
            }
            StmtKind::ArrayStoreCheck { src, array } => {
                let a = self.eval(array);
                let v = self.eval(src);
                let addr = hooks::get().array_store_check as usize as u64;
                self.emit_call(
                    CallTarget::Hook { addr },
                    vec![(a, VmType::Reference), (v, VmType::Reference)],
                    VmType::Void,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::translate::convert_to_ir;
    use mokka_classfile::opcodes::*;
    use mokka_classfile::ConstantPool;
    use std::sync::Arc;

    fn selected_unit(code: Vec<u8>, args_count: u16, max_locals: u16) -> CompilationUnit {
        let method = crate::unit::tests::test_method(code, args_count, max_locals);
        let mut cu = CompilationUnit::new(method, Arc::new(ConstantPool::new()));
        build_cfg(&mut cu).unwrap();
        convert_to_ir(&mut cu).unwrap();
        select_instructions(&mut cu);
        cu
    }

    #[test]
    fn test_add_method_selection() {
        let cu = selected_unit(
            vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_IADD, OPC_IRETURN],
            2,
            2,
        );
        let insns = &cu.block(cu.entry).insns;

        // Two local loads, copy, add, move to the return register, jmp exit
        assert!(insns.iter().any(|i| i.op == MachOp::MovMembaseReg));
        assert!(insns.iter().any(|i| i.op == MachOp::AddRegReg));
        let last = insns.last().unwrap();
        assert_eq!(last.op, MachOp::Jmp);
        assert_eq!(last.branch_target(), Some(cu.exit));
        assert_eq!(last.implicit_uses.len(), 1);
        // The implicit use is the rax-pinned return value
        let ret_var = cu.var(last.implicit_uses[0]);
        assert_eq!(ret_var.fixed, Some(MachReg::Rax));
    }

    #[test]
    fn test_local_loads_use_frame_slots() {
        let cu = selected_unit(vec![OPC_ILOAD_1, OPC_IRETURN], 2, 2);
        let insns = &cu.block(cu.entry).insns;
        let load = insns
            .iter()
            .find(|i| i.op == MachOp::MovMembaseReg)
            .unwrap();
        match load.operands[0] {
            Operand::Membase { base, disp } => {
                assert_eq!(base, Rv::Phys(MachReg::Rbp));
                // local 1 lives in the second 8-byte cell below rbp
                assert_eq!(disp, -16);
            }
            ref other => panic!("unexpected operand {other:?}"),
        }
    }

    #[test]
    fn test_conditional_branch_is_cmp_jcc_pair() {
        // if (a <= 0) return 0; return 1;
        let code = vec![
            OPC_ILOAD_0,
            OPC_IFLE, 0x00, 0x06,
            OPC_ICONST_1,
            OPC_IRETURN,
            OPC_ICONST_0,
            OPC_IRETURN,
        ];
        let cu = selected_unit(code, 1, 1);
        let insns = &cu.block(cu.entry).insns;

        let cmp_pos = insns.iter().position(|i| i.op == MachOp::CmpRegReg).unwrap();
        let jcc = &insns[cmp_pos + 1];
        assert_eq!(jcc.op, MachOp::Jcc(Cond::Le));
        let target = jcc.branch_target().unwrap();
        assert_eq!(cu.block(target).start, 6);
    }

    #[test]
    fn test_branch_targets_lie_on_block_starts() {
        let code = vec![
            OPC_ILOAD_0,
            OPC_IFLE, 0x00, 0x08,
            OPC_ICONST_1,
            OPC_GOTO, 0x00, 0x09,
            OPC_ICONST_0,
            OPC_IRETURN,
        ];
        let cu = selected_unit(code, 1, 1);
        for bb in &cu.blocks {
            for insn in &bb.insns {
                if let Some(target) = insn.branch_target() {
                    assert!((target.0 as usize) < cu.blocks.len());
                    if target != cu.exit {
                        let target_bb = cu.block(target);
                        assert!(
                            cu.find_block(target_bb.start) == Some(target),
                            "branch target must begin a block"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_division_pins_rax_rdx() {
        let code = vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_IDIV, OPC_IRETURN];
        let cu = selected_unit(code, 2, 2);
        let insns = &cu.block(cu.entry).insns;

        let idiv = insns.iter().find(|i| i.op == MachOp::IdivReg).unwrap();
        let fixed: Vec<_> = idiv
            .implicit_uses
            .iter()
            .map(|v| cu.var(*v).fixed.unwrap())
            .collect();
        assert!(fixed.contains(&MachReg::Rax));
        assert!(fixed.contains(&MachReg::Rdx));
    }

    #[test]
    fn test_shift_count_pins_rcx() {
        let code = vec![OPC_ILOAD_0, OPC_ILOAD_1, OPC_ISHL, OPC_IRETURN];
        let cu = selected_unit(code, 2, 2);
        let insns = &cu.block(cu.entry).insns;

        let shl = insns.iter().find(|i| i.op == MachOp::ShlRegReg).unwrap();
        let count = shl.operands[0];
        match count {
            Operand::Reg(Rv::Virt(v)) => assert_eq!(cu.var(v).fixed, Some(MachReg::Rcx)),
            other => panic!("unexpected count operand {other:?}"),
        }
    }

    #[test]
    fn test_array_load_emits_bounds_trap() {
        // aload_0; iconst_0; iaload; ireturn
        let code = vec![OPC_ALOAD_0, OPC_ICONST_0, OPC_IALOAD, OPC_IRETURN];
        let cu = selected_unit(code, 1, 1);
        let insns = &cu.block(cu.entry).insns;
        assert!(insns.iter().any(|i| i.op == MachOp::TrapIf(Cond::Ae)));
        assert!(insns.iter().any(|i| i.op == MachOp::MovMemindexReg));
    }

    #[test]
    fn test_float_add_uses_sse() {
        let code = vec![OPC_FLOAD_0, OPC_FLOAD_1, OPC_FADD, OPC_FRETURN];
        let cu = selected_unit(code, 2, 2);
        let insns = &cu.block(cu.entry).insns;
        assert!(insns.iter().any(|i| i.op == MachOp::FaddRegReg));
        // Return value pinned to xmm0
        let jmp = insns.last().unwrap();
        let ret_var = cu.var(jmp.implicit_uses[0]);
        assert_eq!(ret_var.fixed, Some(MachReg::Xmm0));
    }

    #[test]
    fn test_int_to_long_conversion() {
        let code = vec![OPC_ILOAD_0, OPC_I2L, OPC_LRETURN];
        let cu = selected_unit(code, 1, 1);
        let insns = &cu.block(cu.entry).insns;
        assert!(insns.iter().any(|i| i.op == MachOp::MovsxdRegReg));
    }

    #[test]
    fn test_every_block_with_branch_ends_in_branch() {
        let code = vec![
            OPC_ILOAD_0,
            OPC_IFLE, 0x00, 0x08,
            OPC_ICONST_1,
            OPC_GOTO, 0x00, 0x09,
            OPC_ICONST_0,
            OPC_IRETURN,
        ];
        let cu = selected_unit(code, 1, 1);
        for bb in &cu.blocks {
            if bb.has_branch {
                assert!(bb.insns.last().unwrap().is_branch());
            }
        }
    }
}

//! Address computation: placing the address of an expression into a register
//! without loading the value. Covers identifiers, dereferences, indexed
//! expressions (with the bounds check), and dot-chain member selection.

use std::fmt::Write as _;

use super::{Compiler, magic};
use crate::ast::{Expression, ExprKind, Operator};
use crate::error::{CompilerError, codes};
use crate::registers::Register;
use crate::symbols::Symbol;
use crate::types::{Primary, widths};

/// Emits code placing the address of a symbol's storage into `r`.
pub(crate) fn get_address(sym: &Symbol, r: Register) -> String {
    let mut code = String::new();
    let reg_name = r.name();

    if let Some(held) = sym.register() {
        if held != r {
            let _ = writeln!(code, "\tmov {reg_name}, {}", held.name());
        }
        return code;
    }

    let dt = sym.data_type();
    let behind_pointer = dt.qualities().is_dynamic()
        || matches!(
            dt.primary(),
            Primary::Ptr | Primary::Reference | Primary::String
        );

    if dt.qualities().is_static() {
        let _ = writeln!(code, "\tlea {reg_name}, [{}]", sym.name());
    } else if behind_pointer {
        // the slot holds a pointer to the data
        let _ = writeln!(code, "\tmov {reg_name}, [rbp - {}]", sym.stack_offset());
    } else if sym.stack_offset() < 0 {
        let _ = writeln!(code, "\tlea {reg_name}, [rbp + {}]", -sym.stack_offset());
    } else {
        let _ = writeln!(code, "\tlea {reg_name}, [rbp - {}]", sym.stack_offset());
    }

    code
}

impl Compiler {
    /// Places the address of `exp` into register `r`. For indexed
    /// expressions this evaluates the index, emits the bounds check against
    /// the length prefix, and leaves the element address in `r`.
    pub(crate) fn get_exp_address(
        &mut self,
        exp: &Expression,
        r: Register,
        line: u32,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        match &exp.kind {
            ExprKind::Identifier { name } => {
                let sym = self.lookup(name, line)?;
                if !self.is_in_scope(&sym) {
                    return Err(CompilerError::out_of_scope(name, line));
                }
                code.push_str(&get_address(&sym, r));
            }
            ExprKind::Unary { operand, op } => match op {
                Operator::Dereference => {
                    let operand_type = self.expression_type(operand, line)?;
                    if operand_type.primary() != Primary::Ptr {
                        return Err(CompilerError::illegal_indirection(line));
                    }
                    code.push_str(&self.get_exp_address(operand, r, line)?);
                    let _ = writeln!(code, "\tmov {}, [{}]", r.name(), r.name());
                }
                Operator::Address => {
                    // &x as a destination shape never arises; address-of in
                    // value position is handled by the unary evaluator
                    return Err(CompilerError::new(
                        "Illegal address-of argument",
                        codes::ILLEGAL_ADDRESS_OF_ARGUMENT,
                        line,
                    ));
                }
                _ => {
                    return Err(CompilerError::new(
                        "Illegal address-of argument",
                        codes::ILLEGAL_ADDRESS_OF_ARGUMENT,
                        line,
                    ));
                }
            },
            ExprKind::Indexed { to_index, index } => {
                code.push_str(&self.indexed_address(to_index, index, r, line)?);
            }
            ExprKind::Binary { left, right, op } => {
                if *op != Operator::Dot {
                    return Err(CompilerError::new(
                        "Illegal address-of argument",
                        codes::ILLEGAL_ADDRESS_OF_ARGUMENT,
                        line,
                    ));
                }
                let (selection_code, _member) = self.member_address(left, right, line)?;
                code.push_str(&selection_code);
                if r != Register::Rbx {
                    let _ = writeln!(code, "\tmov {}, rbx", r.name());
                }
            }
            _ => {
                return Err(CompilerError::new(
                    "Illegal address-of argument",
                    codes::ILLEGAL_ADDRESS_OF_ARGUMENT,
                    line,
                ));
            }
        }

        Ok(code)
    }

    /// Element addresses follow `base + 4 + index * stride`, after checking
    /// the index against the 32-bit length prefix at `[base]`. An index at or
    /// past the length branches to the runtime's out-of-bounds trap.
    fn indexed_address(
        &mut self,
        to_index: &Expression,
        index: &Expression,
        r: Register,
        line: u32,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();

        let base_type = self.expression_type(to_index, line)?;
        if !crate::types::is_subscriptable(base_type.primary()) {
            return Err(CompilerError::not_subscriptable(line));
        }
        let stride = match base_type.primary() {
            Primary::String => widths::CHAR,
            _ => base_type
                .subtype()
                .map(crate::types::DataType::width)
                .unwrap_or(0),
        };

        code.push_str(&self.get_exp_address(to_index, r, line)?);

        // the width multiply clobbers RCX and RDX
        let rcx_in_use = self.regs_ref().is_in_use(Register::Rcx);
        if rcx_in_use {
            let _ = writeln!(code, "\tpush rcx");
        }
        let rdx_in_use = self.regs_ref().is_in_use(Register::Rdx);
        if rdx_in_use {
            let _ = writeln!(code, "\tpush rdx");
        }

        // the index evaluation runs through RAX (and possibly RBX), so the
        // base address has to move out of the way first
        let r_name = r.name();
        let mut pushed_base = false;
        let mut temp = None;
        if matches!(r, Register::Rax | Register::Rbx) {
            // the index evaluation owns RAX (and RBX for binaries), and the
            // width multiply clobbers RCX and RDX, so the scratch register
            // must be none of those
            let available = Register::iter_integer_scratch()
                .filter(|&r| !matches!(r, Register::Rcx | Register::Rdx))
                .find(|&candidate| !self.regs_ref().is_in_use(candidate));
            match available {
                Some(available) if available != r => {
                    self.regs().set(available, None);
                    temp = Some(available);
                    let _ = writeln!(code, "\tmov {}, {r_name}", available.name());
                }
                _ => {
                    pushed_base = true;
                    let _ = writeln!(code, "\tpush {r_name}");
                }
            }
        } else {
            self.regs().set(r, None);
        }

        let (index_code, _) = self.evaluate_expression(index, line, None)?;
        code.push_str(&index_code);

        if let Some(temp) = temp {
            let _ = writeln!(code, "\tmov {r_name}, {}", temp.name());
            self.regs().clear(temp);
        } else if pushed_base {
            let _ = writeln!(code, "\tpop {r_name}");
        }

        // index in EAX, length prefix at [base]
        let bounds_num = self.rtbounds_num;
        self.rtbounds_num += 1;
        let _ = writeln!(code, "\tcmp [{r_name}], eax");
        let _ = writeln!(code, "\tjg {}{bounds_num}", magic::RTBOUNDS_LABEL);
        let _ = writeln!(code, "\tcall {}", magic::RTE_OUT_OF_BOUNDS);
        let _ = writeln!(code, "{}{bounds_num}:", magic::RTBOUNDS_LABEL);

        let _ = writeln!(code, "\tmov ecx, {stride}");
        let _ = writeln!(code, "\tmul ecx");

        if rdx_in_use {
            let _ = writeln!(code, "\tpop rdx");
        }
        if rcx_in_use {
            let _ = writeln!(code, "\tpop rcx");
        }

        let _ = writeln!(code, "\tadd rax, {}", widths::INT);
        let _ = writeln!(code, "\tadd {r_name}, rax");

        if !matches!(r, Register::Rax | Register::Rbx) {
            self.regs().clear(r);
        }

        Ok(code)
    }

    /// Walks a dot chain left to right, accumulating member offsets from the
    /// struct table. The final member address lands in RBX; the member's
    /// symbol is returned so callers know its type and offset.
    pub(crate) fn member_address(
        &mut self,
        left: &Expression,
        right: &Expression,
        line: u32,
    ) -> Result<(String, Symbol), CompilerError> {
        let mut code = String::new();

        let left_type = self.expression_type(left, line)?;
        if left_type.primary() != Primary::Struct {
            return Err(CompilerError::new(
                "The dot operator requires a struct type on its left side",
                codes::TYPE_ERROR,
                line,
            ));
        }
        let struct_name = left_type
            .struct_name()
            .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?
            .to_string();

        // the left side is an identifier, a nested dot chain, or a
        // dereference; its address goes in RBX
        code.push_str(&self.get_exp_address(left, Register::Rbx, line)?);

        let ExprKind::Identifier { name: member_name } = &right.kind else {
            return Err(CompilerError::new(
                "Expected a member name on the right side of the dot operator",
                codes::TYPE_ERROR,
                line,
            ));
        };

        let info = self.get_struct_info(&struct_name, line)?;
        let member = info
            .member(member_name)
            .ok_or_else(|| {
                CompilerError::new(
                    format!("Unknown struct member '{member_name}'"),
                    codes::SYMBOL_NOT_FOUND,
                    line,
                )
            })?
            .clone();

        if member.stack_offset() != 0 {
            let _ = writeln!(code, "\tadd rbx, {}", member.stack_offset());
        }

        Ok((code, member))
    }
}

//! Assignment, move assignment, and object construction: destination
//! computation for every lvalue shape, and the copy / reference-bump / move
//! code each combination of types requires.

use std::fmt::Write as _;

use super::{Compiler, magic};
use crate::ast::{Assignment, Expression, ExprKind, MemberInitializer, Operator};
use crate::error::{CompilerError, codes};
use crate::registers::{Register, rax_variant_for_width};
use crate::types::{DataType, Primary, widths};

/// Which instruction the destination fetch used to fill RBX; string copies
/// need to know whether RBX holds the slot address or the data address.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) enum MoveInstruction {
    #[default]
    Mov,
    Lea,
}

/// Everything needed to write to an lvalue: the final memory operand, the
/// code that computes it, and an address form usable with LEA when the
/// destination needs its own address taken.
#[derive(Clone, Debug, Default)]
pub(crate) struct DestinationInfo {
    /// The operand to write through, e.g. `[rbx]` or `[rbp - 8]`.
    pub dest_location: String,
    /// Code that prepares `dest_location` (often filling RBX).
    pub fetch_instructions: String,
    /// The slot's address expression, for LEA or direct moves.
    pub address_for_lea: String,
    pub in_register: bool,
    pub can_use_lea: bool,
    pub instruction_used: MoveInstruction,
}

/// Whether assignment to this type runs through a copy routine rather than a
/// plain store.
pub(crate) fn requires_copy(t: &DataType) -> bool {
    matches!(
        t.primary(),
        Primary::String | Primary::Array | Primary::Tuple | Primary::Struct
    )
}

/// Move statements require modifiable-lvalues on both sides: identifiers,
/// dot expressions, dereferences, or indexed expressions.
pub(crate) fn is_valid_move_expression(exp: &Expression) -> bool {
    match &exp.kind {
        ExprKind::Literal { .. } | ExprKind::Call { .. } => false,
        ExprKind::Binary { op, .. } => *op == Operator::Dot,
        ExprKind::Unary { op, .. } => *op == Operator::Dereference,
        _ => true,
    }
}

impl Compiler {
    /// Computes the destination for an assignment lvalue. Indexed lvalues
    /// return `[rbx]` with no fetch code; the caller schedules the index
    /// computation itself so the evaluation of the rvalue is not clobbered.
    pub(crate) fn fetch_destination_operand(
        &mut self,
        exp: &Expression,
        line: u32,
        is_initialization: bool,
    ) -> Result<DestinationInfo, CompilerError> {
        match &exp.kind {
            ExprKind::Identifier { name } => {
                let sym = self.lookup(name, line)?;
                let info = self.fetch_symbol_destination(&sym, line, is_initialization)?;
                self.lookup_mut(name, line)?.set_initialized();
                Ok(info)
            }
            ExprKind::Unary { operand, op } => {
                if *op != Operator::Dereference {
                    return Err(CompilerError::non_modifiable_lvalue(line));
                }
                let operand_type = self.expression_type(operand, line)?;
                if operand_type.primary() != Primary::Ptr {
                    return Err(CompilerError::illegal_indirection(line));
                }

                let fetched = self.fetch_destination_operand(operand, line, is_initialization)?;
                let mut fetch_instructions = fetched.fetch_instructions.clone();
                let _ = writeln!(fetch_instructions, "\tmov rbx, {}", fetched.dest_location);

                Ok(DestinationInfo {
                    dest_location: "[rbx]".into(),
                    fetch_instructions,
                    address_for_lea: fetched.dest_location,
                    in_register: fetched.in_register,
                    can_use_lea: fetched.can_use_lea,
                    instruction_used: MoveInstruction::Mov,
                })
            }
            ExprKind::Binary { op, .. } => {
                if *op != Operator::Dot {
                    return Err(CompilerError::non_modifiable_lvalue(line));
                }
                let fetch_instructions = self.get_exp_address(exp, Register::Rbx, line)?;
                Ok(DestinationInfo {
                    dest_location: "[rbx]".into(),
                    fetch_instructions,
                    address_for_lea: "rbx".into(),
                    in_register: false,
                    can_use_lea: false,
                    instruction_used: MoveInstruction::Lea,
                })
            }
            ExprKind::Indexed { .. } => Ok(DestinationInfo {
                dest_location: "[rbx]".into(),
                ..Default::default()
            }),
            _ => Err(CompilerError::non_modifiable_lvalue(line)),
        }
    }

    /// The destination record for a symbol. Rejects const (always) and
    /// initialized final data; reference types are dereferenced under the
    /// hood except when a `ref<T>` is being initialized.
    pub(crate) fn fetch_symbol_destination(
        &mut self,
        sym: &crate::symbols::Symbol,
        line: u32,
        is_initialization: bool,
    ) -> Result<DestinationInfo, CompilerError> {
        if !sym.is_variable() {
            return Err(CompilerError::new(
                "Cannot assign to this symbol",
                codes::INVALID_SYMBOL_TYPE,
                line,
            ));
        }

        let dt = sym.data_type().clone();
        if dt.qualities().is_const() && !is_initialization {
            return Err(CompilerError::new(
                "Cannot assign to const-qualified data",
                codes::CONST_ASSIGNMENT,
                line,
            ));
        }
        if dt.qualities().is_final() && !is_initialization && sym.was_initialized() {
            return Err(CompilerError::new(
                "Cannot assign to final data that was already initialized",
                codes::FINAL_ASSIGNMENT,
                line,
            ));
        }

        let mut info = DestinationInfo::default();

        if dt.qualities().is_static() {
            info.dest_location = "[rbx]".into();
            info.address_for_lea = format!("[{}]", sym.name());
            info.can_use_lea = true;
            let _ = writeln!(info.fetch_instructions, "\tlea rbx, [{}]", sym.name());
            info.instruction_used = MoveInstruction::Lea;
            return Ok(info);
        }

        let location = match sym.register() {
            Some(register) => {
                info.in_register = true;
                register.name_for_type(&dt).to_string()
            }
            None if sym.stack_offset() < 0 => format!("[rbp + {}]", -sym.stack_offset()),
            None => format!("[rbp - {}]", sym.stack_offset()),
        };

        // references and dynamic data dereference under the hood: the slot
        // holds a pointer to where the value actually lives. A ref<T> being
        // initialized is the exception (the slot itself is written once).
        let dereferences = dt.qualities().is_dynamic() || dt.primary() == Primary::Reference;
        if dereferences && !(dt.primary() == Primary::Reference && is_initialization) {
            info.dest_location = "[rbx]".into();
            let _ = writeln!(info.fetch_instructions, "\tmov rbx, {location}");
            info.instruction_used = MoveInstruction::Mov;
        } else if requires_copy(&dt) {
            info.dest_location = "[rbx]".into();
            if info.in_register {
                let _ = writeln!(info.fetch_instructions, "\tmov rbx, {location}");
                info.instruction_used = MoveInstruction::Mov;
            } else {
                let _ = writeln!(info.fetch_instructions, "\tlea rbx, {location}");
                info.instruction_used = MoveInstruction::Lea;
            }
        } else {
            info.dest_location = location.clone();
        }

        info.address_for_lea = location;
        info.can_use_lea = !info.in_register;
        Ok(info)
    }

    pub(crate) fn handle_assignment(&mut self, a: &Assignment) -> Result<String, CompilerError> {
        let mut dest = self.fetch_destination_operand(&a.lvalue, a.line, false)?;

        let lhs_type = self.expression_type(&a.lvalue, a.line)?;
        let rhs_type = self.expression_type(&a.rvalue, a.line)?;

        // indexed lvalues get their destination computed here, after the
        // rvalue is already in RAX, so the index evaluation must preserve it
        if let ExprKind::Indexed { to_index, .. } = &a.lvalue.kind {
            let base_type = self.expression_type(to_index, a.line)?;
            if !crate::types::is_subscriptable(base_type.primary()) {
                return Err(CompilerError::not_subscriptable(a.line));
            }

            let mut fetch = String::new();
            let must_push = rhs_type.primary() != Primary::Float;
            if must_push {
                let _ = writeln!(fetch, "\tpush rax");
            }
            fetch.push_str(&self.get_exp_address(&a.lvalue, Register::Rbx, a.line)?);
            if must_push {
                let _ = writeln!(fetch, "\tpop rax");
            }
            dest.fetch_instructions = fetch;
        }

        self.assign(&lhs_type, &rhs_type, &dest, &a.rvalue, a.line, false)
    }

    /// Initialization in an `alloc` statement. `ref<T>` initializers are
    /// wrapped in an address-of so the reference binds to the referent's
    /// location.
    pub(crate) fn handle_alloc_init(
        &mut self,
        sym: &crate::symbols::Symbol,
        rvalue: &Expression,
        line: u32,
    ) -> Result<String, CompilerError> {
        let dest = self.fetch_symbol_destination(sym, line, true)?;
        let rhs_type = self.expression_type(rvalue, line)?;
        let lhs_type = sym.data_type().clone();

        if lhs_type.primary() == Primary::Reference {
            let wrapped = Expression::unary(rvalue.clone(), Operator::Address, line);
            return self.assign(&lhs_type, &rhs_type, &dest, &wrapped, line, true);
        }

        self.assign(&lhs_type, &rhs_type, &dest, rvalue, line, true)
    }

    /// The assignment core: free the old referent of a managed pointer,
    /// evaluate the rvalue with the destination type as a hint, store or
    /// copy, bump the reference count, and release any leftover temporary.
    pub(crate) fn assign(
        &mut self,
        lhs_type: &DataType,
        rhs_type: &DataType,
        dest: &DestinationInfo,
        rvalue: &Expression,
        line: u32,
        is_alloc_init: bool,
    ) -> Result<String, CompilerError> {
        if !lhs_type.is_compatible(rhs_type) {
            return Err(CompilerError::type_error(line));
        }

        let mut code = String::new();
        let src_reg = if rhs_type.primary() == Primary::Float {
            Register::Xmm0
        } else {
            Register::Rax
        };

        // release the old referent before it becomes unreachable
        if lhs_type.primary() == Primary::Ptr
            && lhs_type.qualities().is_managed()
            && !is_alloc_init
        {
            code.push_str(&self.push_used_registers(true));
            code.push_str(&dest.fetch_instructions);
            let _ = writeln!(code, "\tmov rdi, {}", dest.dest_location);
            code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            code.push_str(&self.pop_used_registers(true));
        }

        let (rvalue_code, temp_count) =
            self.evaluate_expression(rvalue, line, Some(lhs_type))?;
        code.push_str(&rvalue_code);
        let mut do_free = temp_count > 0;

        code.push_str(&dest.fetch_instructions);
        code.push_str(&self.do_assign(src_reg, lhs_type, dest, &mut do_free));

        // new referent gains a reference: managed pointers always, and
        // ref<T> at its initialization
        if (lhs_type.primary() == Primary::Ptr && lhs_type.qualities().is_managed())
            || (lhs_type.primary() == Primary::Reference && is_alloc_init)
        {
            code.push_str(&self.push_used_registers(true));
            let _ = writeln!(code, "\tmov rdi, {}", dest.dest_location);
            code.push_str(&Self::call_sre_function(magic::SRE_ADD_REF));
            code.push_str(&self.pop_used_registers(true));
        }

        if do_free {
            let _ = writeln!(code, "\tpop rax");
            code.push_str(&self.push_used_registers(true));
            let _ = writeln!(code, "\tmov rdi, rax");
            code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            code.push_str(&self.pop_used_registers(true));
        }

        Ok(code)
    }

    /// Emits the store itself: `rep movsb` for tuples, the runtime copy
    /// routines for strings and arrays, a plain register store for
    /// everything else.
    fn do_assign(
        &mut self,
        src_reg: Register,
        lhs_type: &DataType,
        dest: &DestinationInfo,
        do_free: &mut bool,
    ) -> String {
        let mut code = String::new();
        let src = src_reg.name_for_type(lhs_type);

        if lhs_type.primary() == Primary::Tuple {
            code.push_str(&self.push_used_registers(true));
            let _ = writeln!(code, "\tmov rsi, rax");
            let _ = writeln!(code, "\tmov rdi, rbx");
            let _ = writeln!(code, "\tmov rcx, {}", lhs_type.width());
            let _ = writeln!(code, "\trep movsb");
            code.push_str(&self.pop_used_registers(true));
        } else if requires_copy(lhs_type) {
            code.push_str(&self.push_used_registers(true));
            let _ = writeln!(code, "\tmov rsi, rax");

            // when RBX holds the slot address, the data pointer is behind it
            let dest_operand = if dest.instruction_used == MoveInstruction::Lea
                && (lhs_type.primary() == Primary::String || lhs_type.qualities().is_dynamic())
            {
                "[rbx]"
            } else {
                "rbx"
            };
            let _ = writeln!(code, "\tmov rdi, {dest_operand}");

            if lhs_type.primary() == Primary::Array {
                let element_width = lhs_type.subtype().map(DataType::width).unwrap_or(1);
                let _ = writeln!(code, "\tmov ecx, {element_width}");
                code.push_str(&self.call_sincall_subroutine(magic::ARRAY_COPY));
            } else {
                // strings reallocate on copy, so the returned address has to
                // be stored back through the slot
                let assign_instruction = if dest.in_register {
                    format!("mov {}, rax", dest.address_for_lea)
                } else {
                    if dest.can_use_lea {
                        let _ = writeln!(code, "\tlea r15, {}", dest.address_for_lea);
                    } else {
                        let _ = writeln!(code, "\tmov r15, {}", dest.address_for_lea);
                    }
                    "mov [r15], rax".to_string()
                };

                code.push_str(&self.call_sincall_subroutine(magic::STRING_COPY));

                if lhs_type.primary() == Primary::String {
                    let _ = writeln!(code, "\t{assign_instruction}");
                }
            }

            code.push_str(&self.pop_used_registers(true));
        } else {
            let instruction = if lhs_type.primary() == Primary::Float {
                if lhs_type.width() == widths::DOUBLE {
                    "movsd"
                } else {
                    "movss"
                }
            } else {
                "mov"
            };
            let _ = writeln!(code, "\t{instruction} {}, {src}", dest.dest_location);

            // a plain store of a borrowed reference is a reference copy; the
            // temporary must stay alive
            if *do_free {
                *do_free = false;
            }
        }

        code
    }

    /// `move a -> b`: update references rather than copying. Only meaningful
    /// when the destination is a reference type other than `ref<T>` (which is
    /// final); otherwise it degrades to a copy assignment.
    pub(crate) fn handle_move(&mut self, m: &Assignment) -> Result<String, CompilerError> {
        if !is_valid_move_expression(&m.lvalue) || !is_valid_move_expression(&m.rvalue) {
            return Err(CompilerError::new(
                "Illegal expression in move assignment; expression must be a modifiable-lvalue",
                codes::ILLEGAL_MOVE_ASSIGNMENT,
                m.line,
            ));
        }

        let lvalue_type = self.expression_type(&m.lvalue, m.line)?;
        let rvalue_type = self.expression_type(&m.rvalue, m.line)?;

        if !lvalue_type.is_reference_type() {
            // neither side owns a reference; plain copy
            return self.handle_assignment(m);
        }

        if lvalue_type.primary() == Primary::Reference {
            return Err(CompilerError::new(
                "Move assignment not allowed with references; the reference is final",
                codes::MOVE_TO_REFERENCE,
                m.line,
            ));
        }

        let dest = self.fetch_destination_operand(&m.lvalue, m.line, false)?;
        self.move_assignment(&lvalue_type, &rvalue_type, &dest, &m.rvalue, m.line)
    }

    /// The move proper: free the old referent, store the new pointer, add a
    /// reference to it.
    fn move_assignment(
        &mut self,
        lvalue_type: &DataType,
        rvalue_type: &DataType,
        dest: &DestinationInfo,
        rvalue: &Expression,
        line: u32,
    ) -> Result<String, CompilerError> {
        if !lvalue_type.is_compatible(rvalue_type) {
            return Err(CompilerError::type_error(line));
        }

        let mut code = String::new();

        let (rvalue_code, _) = self.evaluate_expression(rvalue, line, Some(lvalue_type))?;
        code.push_str(&rvalue_code);

        // RBX holds the slot's address for the whole sequence
        if dest.can_use_lea {
            let _ = writeln!(code, "\tlea rbx, {}", dest.address_for_lea);
        } else {
            code.push_str(&dest.fetch_instructions);
        }
        self.regs().set(Register::Rbx, None);

        code.push_str(&self.push_used_registers(false));
        let _ = writeln!(code, "\tmov rdi, [rbx]");
        code.push_str(&Self::call_sre_function(magic::SRE_FREE));
        code.push_str(&self.pop_used_registers(false));

        let _ = writeln!(code, "\tmov [rbx], rax");
        self.regs().clear(Register::Rbx);

        code.push_str(&self.push_used_registers(true));
        let _ = writeln!(code, "\tmov rdi, rax");
        code.push_str(&Self::call_sre_function(magic::SRE_ADD_REF));
        code.push_str(&self.pop_used_registers(true));

        Ok(code)
    }

    /// `construct x { member: value, ... }`. Valid iff either every member is
    /// initialized with no `default`, or a `default` is present with at least
    /// one (but not every) member named; defaulted members are zeroed.
    pub(crate) fn construct_object(
        &mut self,
        to_construct: &Expression,
        initializers: &[MemberInitializer],
        has_default: bool,
        line: u32,
    ) -> Result<String, CompilerError> {
        let ExprKind::Identifier { name } = &to_construct.kind else {
            return Err(CompilerError::new(
                "Invalid expression type in construction",
                codes::INVALID_EXPRESSION_TYPE,
                line,
            ));
        };

        let target_sym = match self.lookup(name, line) {
            Ok(sym) => sym,
            Err(_) if self.structs.contains(name) => {
                return Err(CompilerError::new(
                    "Construction of unnamed objects is not currently supported",
                    codes::UNSUPPORTED_FEATURE,
                    line,
                ));
            }
            Err(_) => {
                return Err(CompilerError::new(
                    format!("Unknown identifier '{name}' in construction"),
                    codes::UNDEFINED,
                    line,
                ));
            }
        };

        let struct_name = target_sym
            .data_type()
            .struct_name()
            .ok_or_else(|| {
                CompilerError::new(
                    "Structure required in construction statements",
                    codes::TYPE_ERROR,
                    line,
                )
            })?
            .to_string();

        let info = self.get_struct_info(&struct_name, line)?;
        let member_count = info.data_member_count();
        let valid = if has_default {
            !initializers.is_empty() && initializers.len() < member_count
        } else {
            initializers.len() == member_count
        };
        if !valid {
            return Err(CompilerError::new(
                "Unexpected number of initializations in construction",
                codes::CONSTRUCTION_NUMBER_INIT,
                line,
            ));
        }

        if target_sym.data_type().qualities().is_const() && has_default {
            return Err(CompilerError::new(
                "const-qualified data cannot be default-constructed",
                codes::ALLOC_INIT_REQUIRED,
                line,
            ));
        }

        let mut code = String::new();
        let mut initialized_members = Vec::new();

        for initializer in initializers {
            let member = self
                .get_struct_info(&struct_name, line)?
                .member(&initializer.member)
                .ok_or_else(|| {
                    CompilerError::new(
                        format!("Unknown struct member '{}'", initializer.member),
                        codes::SYMBOL_NOT_FOUND,
                        line,
                    )
                })?
                .clone();
            initialized_members.push(member.name().to_string());

            let member_type = member.data_type().clone();
            let (value_code, temp_count) =
                self.evaluate_expression(&initializer.value, line, Some(&member_type))?;
            code.push_str(&value_code);

            // the target is a plain identifier, so refreshing its address
            // does not disturb RAX/XMM0
            code.push_str(&self.get_exp_address(to_construct, Register::Rbx, line)?);

            if member_type.primary() == Primary::Float {
                let instruction = if member_type.width() == widths::DOUBLE {
                    "movsd"
                } else {
                    "movss"
                };
                let _ = writeln!(
                    code,
                    "\t{instruction} [rbx + {}], xmm0",
                    member.stack_offset()
                );
            } else {
                let _ = writeln!(
                    code,
                    "\tmov [rbx + {}], {}",
                    member.stack_offset(),
                    rax_variant_for_width(member_type.slot_width())
                );
            }

            if member_type.must_free() {
                let _ = writeln!(code, "\tmov rdi, rax");
                code.push_str(&Self::call_sre_function(magic::SRE_ADD_REF));
            }
            if temp_count > 0 {
                let _ = writeln!(code, "\tpop rdi");
                code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            }
        }

        if has_default {
            code.push_str(&self.get_exp_address(to_construct, Register::Rbx, line)?);
            let defaulted: Vec<_> = self
                .get_struct_info(&struct_name, line)?
                .members()
                .iter()
                .filter(|m| m.is_variable() && !initialized_members.contains(&m.name().to_string()))
                .cloned()
                .collect();
            for member in defaulted {
                let size_keyword = match member.data_type().slot_width() {
                    1 => "byte",
                    2 => "word",
                    4 => "dword",
                    _ => "qword",
                };
                let _ = writeln!(
                    code,
                    "\tmov {size_keyword} [rbx + {}], 0",
                    member.stack_offset()
                );
            }
        }

        Ok(code)
    }
}

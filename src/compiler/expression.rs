//! The expression evaluator. Code generated here leaves the result in RAX
//! (integers, pointers, bools, characters, and the addresses of larger
//! values) or XMM0 (floats), along with a count of RC-owned temporaries whose
//! addresses were pushed to the stack for the caller to free.

use std::fmt::Write as _;

use super::{Compiler, magic};
use crate::ast::{Attribute, Expression, ExprKind, Operator};
use crate::error::{CompilerError, codes, compiler_warning};
use crate::registers::{Register, RegisterClass, rax_variant_for_width};
use crate::types::{self, DataType, Primary, Qualities, Quality, can_pass_in_register, widths};

impl Compiler {
    /// Determines the static type of an expression without generating code.
    pub(crate) fn expression_type(
        &self,
        exp: &Expression,
        line: u32,
    ) -> Result<DataType, CompilerError> {
        match &exp.kind {
            ExprKind::Literal { data_type, .. } => Ok(data_type.clone()),
            ExprKind::Identifier { name } => {
                let sym = self.lookup(name, line)?;
                Ok(sym.data_type().clone())
            }
            ExprKind::List { members, is_tuple } => {
                if *is_tuple {
                    let mut contained = Vec::with_capacity(members.len());
                    for member in members {
                        contained.push(self.expression_type(member, line)?);
                    }
                    Ok(DataType::tuple(contained, Qualities::new()))
                } else {
                    let subtype = match members.first() {
                        Some(first) => self.expression_type(first, line)?,
                        None => DataType::simple(Primary::Raw),
                    };
                    let mut t = DataType::array_of(subtype, Qualities::new(), None);
                    t.set_array_length(members.len());
                    Ok(t)
                }
            }
            ExprKind::Indexed { to_index, .. } => {
                let base = self.expression_type(to_index, line)?;
                match base.primary() {
                    Primary::Array => base
                        .subtype()
                        .cloned()
                        .ok_or_else(|| CompilerError::type_error(line)),
                    Primary::String => Ok(DataType::simple(Primary::Char)),
                    _ => Err(CompilerError::not_subscriptable(line)),
                }
            }
            ExprKind::AttributeSelection { .. } => Ok(attribute_result_type(line)?),
            ExprKind::Binary { left, right, op } => match op {
                Operator::Dot => {
                    let left_type = self.expression_type(left, line)?;
                    if left_type.primary() != Primary::Struct {
                        return Err(CompilerError::type_error(line));
                    }
                    let struct_name = left_type
                        .struct_name()
                        .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?;
                    let ExprKind::Identifier { name } = &right.kind else {
                        return Err(CompilerError::type_error(line));
                    };
                    let info = self.get_struct_info(struct_name, line)?;
                    let member = info.member(name).ok_or_else(|| {
                        CompilerError::new(
                            format!("Unknown struct member '{name}'"),
                            codes::SYMBOL_NOT_FOUND,
                            line,
                        )
                    })?;
                    Ok(member.data_type().clone())
                }
                Operator::Typecast => self.expression_type(right, line),
                Operator::AttributeSelection => attribute_result_type(line),
                _ if op.is_comparison() => Ok(DataType::simple(Primary::Bool)),
                Operator::And | Operator::Or | Operator::Xor => {
                    Ok(DataType::simple(Primary::Bool))
                }
                _ => self.expression_type(left, line),
            },
            ExprKind::Unary { operand, op } => match op {
                Operator::Address => {
                    let pointed = self.expression_type(operand, line)?;
                    Ok(DataType::with_subtype(
                        Primary::Ptr,
                        pointed,
                        Qualities::new(),
                    ))
                }
                Operator::Dereference => {
                    let pointer = self.expression_type(operand, line)?;
                    if pointer.primary() != Primary::Ptr {
                        return Err(CompilerError::illegal_indirection(line));
                    }
                    pointer
                        .subtype()
                        .cloned()
                        .ok_or_else(|| CompilerError::illegal_indirection(line))
                }
                Operator::Not => Ok(DataType::simple(Primary::Bool)),
                _ => self.expression_type(operand, line),
            },
            ExprKind::Cast { new_type, .. } => Ok(new_type.clone()),
            ExprKind::Call { name, .. } => {
                let sym = self.lookup(name, line)?;
                if !sym.is_function() {
                    return Err(CompilerError::new(
                        format!("'{name}' is not a function"),
                        codes::INVALID_SYMBOL_TYPE,
                        line,
                    ));
                }
                Ok(sym.data_type().clone())
            }
            ExprKind::Keyword { data_type, .. } => Ok(data_type.clone()),
            ExprKind::Procedure { .. } => Err(CompilerError::invalid_expression_type(line)),
        }
    }

    /// Generates code to evaluate an expression. Returns the code and the
    /// number of RC temporaries left on the stack; before returning, more
    /// than one temporary is consolidated down to a single one so parents
    /// only ever track the top of the stack.
    pub(crate) fn evaluate_expression(
        &mut self,
        exp: &Expression,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<(String, usize), CompilerError> {
        let mut code = String::new();
        let mut count = 0;

        match &exp.kind {
            ExprKind::Literal { .. } => {
                code.push_str(&self.evaluate_literal(exp, line, type_hint)?);
            }
            ExprKind::Identifier { .. } => {
                code.push_str(&self.evaluate_identifier(exp, line)?);
            }
            ExprKind::Indexed { .. } => {
                let t = self.expression_type(exp, line)?;
                code.push_str(&self.get_exp_address(exp, Register::Rbx, line)?);
                let _ = writeln!(
                    code,
                    "\tmov {}, [rbx]",
                    rax_variant_for_width(t.width().max(1))
                );
            }
            ExprKind::List { .. } => {
                let (list_code, list_count) = self.evaluate_list(exp, line, type_hint)?;
                code.push_str(&list_code);
                count += list_count;
            }
            ExprKind::Binary { .. } => {
                let (binary_code, binary_count) = self.evaluate_binary(exp, line, type_hint)?;
                code.push_str(&binary_code);
                count += binary_count;
            }
            ExprKind::Unary { .. } => {
                code.push_str(&self.evaluate_unary(exp, line, type_hint)?);
            }
            ExprKind::Call { name, args } => {
                let (call_code, call_count) = self.call_function(name, args, line, false)?;
                code.push_str(&call_code);
                count += call_count;
                if call_count > 0 {
                    // the returned reference is a temporary; park its address
                    // so the parent can free it once consumed
                    let _ = writeln!(code, "\tpush rax");
                }
            }
            ExprKind::Cast { operand, new_type } => {
                if !new_type.is_valid() {
                    return Err(CompilerError::new(
                        "Invalid type in cast",
                        codes::TYPE_ERROR,
                        line,
                    ));
                }
                let old_type = self.expression_type(operand, line)?;
                if !types::is_valid_cast(&old_type, new_type) {
                    return Err(CompilerError::invalid_cast(line));
                }

                // casting a literal int or float to a differently-sized type
                // of the same primary just re-emits the literal at that width
                if let ExprKind::Literal { data_type, value } = &operand.kind
                    && data_type.primary() == new_type.primary()
                    && matches!(data_type.primary(), Primary::Int | Primary::Float)
                {
                    let retyped = Expression::literal(new_type.clone(), value.clone(), line);
                    let (literal_code, _) = self.evaluate_expression(&retyped, line, type_hint)?;
                    code.push_str(&literal_code);
                } else {
                    let (operand_code, operand_count) =
                        self.evaluate_expression(operand, line, type_hint)?;
                    code.push_str(&operand_code);
                    count += operand_count;
                    code.push_str(&types::cast(&old_type, new_type, line, self.mode())?);
                }
            }
            ExprKind::AttributeSelection {
                selected,
                attribute,
            } => {
                let (attr_code, attr_count) = self.evaluate_attribute(selected, *attribute, line)?;
                code.push_str(&attr_code);
                count += attr_count;
            }
            ExprKind::Keyword { .. } | ExprKind::Procedure { .. } => {
                return Err(CompilerError::invalid_expression_type(line));
            }
        }

        // consolidate: free all but the top temporary so the caller only has
        // one address to track
        if count > 1 {
            let _ = writeln!(code, "; consolidating temporary references");
            let _ = writeln!(code, "\tpop r12");
            let _ = writeln!(code, "\tmov r13, rax");
            for _ in 1..count {
                let _ = writeln!(code, "\tpop rdi");
                code.push_str(&Self::call_sre_function(magic::SRE_FREE));
            }
            let _ = writeln!(code, "\tpush r12");
            let _ = writeln!(code, "\tmov rax, r13");
            count = 1;
        }

        Ok((code, count))
    }

    /// Loads a literal into the A register (or XMM0), materializing float and
    /// string constants into the data sections.
    fn evaluate_literal(
        &mut self,
        exp: &Expression,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<String, CompilerError> {
        let ExprKind::Literal { data_type, value } = &exp.kind else {
            return Err(CompilerError::invalid_expression_type(line));
        };

        let t = type_hint.unwrap_or(data_type);
        let mut code = String::new();

        match t.primary() {
            Primary::Void => {
                // used by return statements in void-returning functions
                let _ = writeln!(code, "\tmov rax, 0");
            }
            Primary::Int => match t.width() {
                widths::SHORT => {
                    // zero-extend so a later 32-bit store doesn't pick up
                    // garbage high bytes
                    let _ = writeln!(code, "\tmov ax, {value}");
                    let _ = writeln!(code, "\tmovzx eax, ax");
                }
                widths::INT => {
                    let _ = writeln!(code, "\tmov eax, {value}");
                }
                widths::LONG => {
                    let _ = writeln!(code, "\tmov rax, {value}");
                }
                _ => {
                    return Err(CompilerError::new(
                        "Invalid type width",
                        codes::DATA_WIDTH,
                        line,
                    ));
                }
            },
            Primary::Float => {
                // floats can't be immediates; label a constant and load it
                let label = format!("{}{}", magic::FLOAT_LITERAL_LABEL, self.fltc_num);
                self.fltc_num += 1;

                let (directive, instruction) = if t.width() == widths::DOUBLE {
                    ("dq", "movsd")
                } else {
                    ("dd", "movss")
                };
                let _ = writeln!(self.data, "{label}: {directive} {value}");
                let _ = writeln!(code, "\t{instruction} xmm0, [{label}]");
            }
            Primary::Bool => match value.as_str() {
                "true" => {
                    let _ = writeln!(code, "\tmov al, 1");
                }
                "false" => {
                    let _ = writeln!(code, "\tmov al, 0");
                }
                _ => {
                    return Err(CompilerError::new(
                        format!("Invalid boolean literal '{value}'"),
                        codes::TYPE_ERROR,
                        line,
                    ));
                }
            },
            Primary::Char => {
                if value.chars().count() > 1 && !value.starts_with('\\') {
                    return Err(CompilerError::new(
                        "Unicode currently not supported",
                        codes::UNICODE,
                        line,
                    ));
                }
                // backticks let NASM interpret escape sequences
                let _ = writeln!(code, "\tmov al, `{value}`");
            }
            Primary::String => {
                let label = format!("{}{}", magic::CONST_STRING_LABEL, self.strc_num);
                self.strc_num += 1;

                // length-prefixed, NUL-terminated
                let _ = writeln!(
                    self.rodata,
                    "\t{label}\tdd {}, `{value}`, 0",
                    value.len()
                );
                let _ = writeln!(code, "\tlea rax, [{label}]");
            }
            _ => return Err(CompilerError::type_error(line)),
        }

        Ok(code)
    }

    /// Loads a variable. Register-sized values land in the appropriately
    /// sized A register; larger values load their address instead.
    fn evaluate_identifier(
        &mut self,
        exp: &Expression,
        line: u32,
    ) -> Result<String, CompilerError> {
        let ExprKind::Identifier { name } = &exp.kind else {
            return Err(CompilerError::invalid_expression_type(line));
        };

        let mut code = String::new();
        let sym = self.lookup(name, line)?;

        if !sym.was_initialized() {
            return Err(CompilerError::referenced_before_initialization(
                sym.name(),
                line,
            ));
        }
        if sym.was_freed() {
            compiler_warning(
                &format!("Symbol '{}' may have been freed", sym.name()),
                codes::DATA_FREED,
                line,
            );
        }
        if sym.is_function() {
            return Err(CompilerError::unexpected_function_symbol(line));
        }
        if !self.is_in_scope(&sym) {
            return Err(CompilerError::out_of_scope(name, line));
        }

        self.regs().set(Register::Rax, None);
        let dt = sym.data_type();

        if dt.primary() == Primary::Void {
            return Err(CompilerError::void_type(line));
        }

        if can_pass_in_register(dt) {
            let reg_string = rax_variant_for_width(dt.width());

            if dt.qualities().is_static() {
                let _ = writeln!(code, "\tlea rax, [{}]", sym.name());
                let _ = writeln!(code, "\tmov {reg_string}, [rax]");
            } else if dt.qualities().is_dynamic() {
                // the slot holds a pointer; fetch it through a scratch
                // register, falling back to RSI when none is free
                let mut pushed = false;
                let scratch = match self.regs_ref().get_available(RegisterClass::Integer) {
                    Some(r) => r,
                    None => {
                        let owner = self.regs_ref().owner(Register::Rsi).map(str::to_string);
                        match owner {
                            Some(owner_name) => {
                                if let Some(owner_sym) =
                                    self.symbols.find_by_mangled_mut(&owner_name)
                                {
                                    code.push_str(&crate::registers::store_symbol(owner_sym));
                                    owner_sym.set_register(None);
                                }
                                self.regs().clear(Register::Rsi);
                            }
                            None => {
                                let _ = writeln!(code, "\tpush rsi");
                                pushed = true;
                            }
                        }
                        Register::Rsi
                    }
                };
                let scratch_name = scratch.name();
                let _ = writeln!(code, "\tmov {scratch_name}, [rbp - {}]", sym.stack_offset());
                let _ = writeln!(code, "\tmov {reg_string}, [{scratch_name}]");
                if pushed {
                    let _ = writeln!(code, "\tpop rsi");
                }
            } else if let Some(held) = sym.register() {
                if held.is_xmm() {
                    let instruction = if dt.qualities().is_long() { "movsd" } else { "movss" };
                    let _ = writeln!(code, "\t{instruction} xmm0, {}", held.name());
                } else {
                    let _ = writeln!(code, "\tmov rax, {}", held.name());
                }
            } else if sym.stack_offset() < 0 {
                let _ = writeln!(code, "\tmov {reg_string}, [rbp + {}]", -sym.stack_offset());
            } else {
                let _ = writeln!(code, "\tmov {reg_string}, [rbp - {}]", sym.stack_offset());
            }
        } else {
            // too large for a register: produce the address
            if dt.qualities().is_static() {
                let _ = writeln!(code, "\tlea rax, [{}]", sym.name());
            } else if dt.qualities().is_dynamic() || dt.primary() == Primary::String {
                let _ = writeln!(code, "\tmov rax, [rbp - {}]", sym.stack_offset());
            } else if sym.stack_offset() < 0 {
                let _ = writeln!(code, "\tlea rax, [rbp + {}]", -sym.stack_offset());
            } else {
                let _ = writeln!(code, "\tlea rax, [rbp - {}]", sym.stack_offset());
            }
        }

        Ok(code)
    }

    /// Builds a list literal in a reserved `.bss` region, elements written at
    /// their offsets, with the length in the leading doubleword for arrays.
    /// The aggregate's address is returned in RAX.
    fn evaluate_list(
        &mut self,
        exp: &Expression,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<(String, usize), CompilerError> {
        let ExprKind::List { members, is_tuple } = &exp.kind else {
            return Err(CompilerError::invalid_expression_type(line));
        };

        let mut code = String::new();
        let mut count = 0;

        let label = format!("{}{}", magic::LIST_LITERAL_LABEL, self.list_num);
        self.list_num += 1;

        // R15 tracks the write position for the whole literal
        let mut pushed_r15 = false;
        if self.regs_ref().is_in_use(Register::R15) {
            let owner = self.regs_ref().owner(Register::R15).map(str::to_string);
            match owner {
                Some(owner_name) => {
                    if let Some(owner_sym) = self.symbols.find_by_mangled_mut(&owner_name) {
                        code.push_str(&crate::registers::store_symbol(owner_sym));
                        owner_sym.set_register(None);
                    }
                    self.regs().clear(Register::R15);
                }
                None => {
                    let _ = writeln!(code, "\tpush r15");
                    pushed_r15 = true;
                }
            }
        }

        let t = self.expression_type(exp, line)?;

        let _ = writeln!(code, "\tlea r15, [{label}]");
        if !is_tuple {
            let _ = writeln!(code, "\tmov eax, {}", members.len());
            let _ = writeln!(code, "\tmov [r15], eax");
            let _ = writeln!(code, "\tadd r15, {}", widths::INT);
        }

        let mut offset = 0;
        for (i, member) in members.iter().enumerate() {
            let member_type = self.expression_type(member, line)?;

            if !is_tuple {
                let declared = type_hint
                    .and_then(DataType::subtype)
                    .or_else(|| t.subtype());
                if let Some(declared) = declared
                    && member_type != *declared
                {
                    return Err(CompilerError::new(
                        "Type mismatch (arrays must be homogeneous)",
                        codes::TYPE_ERROR,
                        line,
                    ));
                }
            } else if let Some(expected) = t.contained_types().get(i)
                && *expected != member_type
            {
                return Err(CompilerError::new(
                    "Tuple type mismatch",
                    codes::TYPE_ERROR,
                    line,
                ));
            }

            let member_hint = if *is_tuple {
                type_hint.and_then(|h| h.contained_types().get(i))
            } else {
                type_hint.and_then(DataType::subtype)
            };

            let (member_code, member_count) =
                self.evaluate_expression(member, line, member_hint)?;
            code.push_str(&member_code);
            count += member_count;

            if member_type.primary() == Primary::Float {
                let instruction = if member_type.width() == widths::DOUBLE {
                    "movsd"
                } else {
                    "movss"
                };
                let _ = writeln!(code, "\t{instruction} [r15 + {offset}], xmm0");
            } else {
                let _ = writeln!(
                    code,
                    "\tmov [r15 + {offset}], {}",
                    rax_variant_for_width(member_type.width())
                );
            }
            offset += member_type.width();
        }

        let _ = writeln!(code, "\tlea rax, [{label}]");

        if pushed_r15 {
            let _ = writeln!(code, "\tpop r15");
        }

        // reserve the backing storage
        if !is_tuple {
            let subtype_width = t.subtype().map(DataType::width).unwrap_or(1);
            let res_instruction = match subtype_width {
                8 => "resq",
                4 => "resd",
                2 => "resw",
                _ => "resb",
            };
            let _ = writeln!(self.bss, "{label}: resd 1");
            let _ = writeln!(self.bss, "{label}_data: {res_instruction} {}", members.len());
        } else {
            let _ = writeln!(self.bss, "{label}: resb {}", offset.max(1));
        }

        Ok((code, count))
    }

    /// `len` and `size` attribute selection. Results are always
    /// `int &unsigned &final`.
    fn evaluate_attribute(
        &mut self,
        selected: &Expression,
        attribute: Attribute,
        line: u32,
    ) -> Result<(String, usize), CompilerError> {
        let mut code = String::new();
        let mut count = 0;

        let t = self.expression_type(selected, line)?;

        match attribute {
            Attribute::Length => match t.primary() {
                Primary::Array | Primary::String => {
                    let (selected_code, selected_count) =
                        self.evaluate_expression(selected, line, None)?;
                    code.push_str(&selected_code);
                    count += selected_count;
                    let _ = writeln!(code, "\tmov eax, [rax]");
                }
                Primary::Struct => {
                    // member counts are not surfaced yet
                    let _ = writeln!(code, "\tmov eax, 1");
                }
                _ => {
                    let _ = writeln!(code, "\tmov eax, 1");
                }
            },
            Attribute::Size => match t.primary() {
                Primary::Struct => {
                    let struct_name = t
                        .struct_name()
                        .ok_or_else(|| CompilerError::undefined_struct("<anonymous>", line))?;
                    let width = self.get_struct_info(struct_name, line)?.width();
                    let _ = writeln!(code, "\tmov eax, {width}");
                }
                Primary::Array | Primary::String => {
                    let (selected_code, selected_count) =
                        self.evaluate_expression(selected, line, None)?;
                    code.push_str(&selected_code);
                    count += selected_count;
                    let _ = writeln!(code, "\tmov eax, [rax]");

                    let element_width = if t.primary() == Primary::Array {
                        t.subtype().map(DataType::width).unwrap_or(1)
                    } else {
                        1
                    };
                    let _ = writeln!(code, "\tmov rbx, {element_width}");
                    let _ = writeln!(code, "\tmul rbx");
                }
                _ => {
                    let _ = writeln!(code, "\tmov eax, {}", t.width());
                }
            },
            Attribute::Variability => {
                return Err(CompilerError::new(
                    "Not yet implemented",
                    codes::UNKNOWN_ATTRIBUTE,
                    line,
                ));
            }
        }

        Ok((code, count))
    }
}

/// Attribute results have type `int &unsigned &final`.
fn attribute_result_type(line: u32) -> Result<DataType, CompilerError> {
    let qualities = Qualities::from_list(&[Quality::Unsigned, Quality::Final], line)?;
    Ok(DataType::with_qualities(Primary::Int, qualities))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Mode;

    fn compiler() -> Compiler {
        Compiler::new(Mode::Normal)
    }

    #[test]
    fn short_literal_zero_extends() {
        let mut c = compiler();
        let mut q = Qualities::new();
        q.add(Quality::Short, 0).unwrap();
        let short = DataType::with_qualities(Primary::Int, q);
        let exp = Expression::literal(short.clone(), "7", 1);

        let (code, count) = c.evaluate_expression(&exp, 1, Some(&short)).unwrap();
        assert!(code.contains("mov ax, 7"));
        assert!(code.contains("movzx eax, ax"));
        assert_eq!(count, 0);
    }

    #[test]
    fn string_literal_lands_in_rodata() {
        let mut c = compiler();
        let exp = Expression::literal(DataType::simple(Primary::String), "hello", 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("lea rax, [sinl_strc_0]"));
        assert!(c.rodata.contains("sinl_strc_0\tdd 5, `hello`, 0"));
    }

    #[test]
    fn float_literal_is_materialized() {
        let mut c = compiler();
        let exp = Expression::literal(DataType::simple(Primary::Float), "1.5", 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("movss xmm0, [sinl_fltc_0]"));
        assert!(c.data.contains("sinl_fltc_0: dd 1.5"));
    }

    #[test]
    fn double_literal_uses_movsd() {
        let mut c = compiler();
        let mut q = Qualities::new();
        q.add(Quality::Long, 0).unwrap();
        let double = DataType::with_qualities(Primary::Float, q);
        let exp = Expression::literal(double, "2.25", 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("movsd xmm0, [sinl_fltc_0]"));
        assert!(c.data.contains("sinl_fltc_0: dq 2.25"));
    }

    #[test]
    fn bool_literals_load_al() {
        let mut c = compiler();
        let t = DataType::simple(Primary::Bool);
        let (code, _) = c
            .evaluate_expression(&Expression::literal(t.clone(), "true", 1), 1, None)
            .unwrap();
        assert!(code.contains("mov al, 1"));

        let err = c
            .evaluate_expression(&Expression::literal(t, "yes", 1), 1, None)
            .unwrap_err();
        assert_eq!(err.code(), codes::TYPE_ERROR);
    }

    #[test]
    fn float_cast_of_literal_re_emits_at_new_width() {
        let mut c = compiler();
        let mut q = Qualities::new();
        q.add(Quality::Long, 0).unwrap();
        let double = DataType::with_qualities(Primary::Float, q);
        let cast = Expression::cast(
            Expression::literal(DataType::simple(Primary::Float), "1.5", 1),
            double,
            1,
        );
        let (code, _) = c.evaluate_expression(&cast, 1, None).unwrap();

        // no conversion instruction, just the literal at the new width
        assert!(code.contains("movsd"));
        assert!(!code.contains("cvtss2sd"));
        assert!(c.data.contains("dq 1.5"));
    }

    #[test]
    fn undeclared_identifier_fails() {
        let mut c = compiler();
        let err = c
            .evaluate_expression(&Expression::identifier("ghost", 9), 9, None)
            .unwrap_err();
        assert_eq!(err.code(), codes::SYMBOL_NOT_FOUND);
        assert_eq!(err.line(), 9);
    }

    #[test]
    fn attribute_type_is_unsigned_final_int() {
        let t = attribute_result_type(1).unwrap();
        assert_eq!(t.primary(), Primary::Int);
        assert!(t.qualities().is_unsigned());
        assert!(t.qualities().is_final());
    }
}

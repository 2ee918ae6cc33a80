//! Binary and unary operator dispatch: operand evaluation order, operand
//! shuffling through RAX/RBX and XMM0/XMM1, and the per-operator, per-type
//! instruction selection.

use std::fmt::Write as _;

use super::{Compiler, magic};
use crate::ast::{Attribute, Expression, ExprKind, Operator};
use crate::error::{CompilerError, codes, compiler_note, compiler_warning, warn_or_error};
use crate::registers::{Register, rax_variant_for_width};
use crate::types::{DataType, Primary, widths};

impl Compiler {
    pub(crate) fn evaluate_binary(
        &mut self,
        exp: &Expression,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<(String, usize), CompilerError> {
        let ExprKind::Binary { left, right, op } = &exp.kind else {
            return Err(CompilerError::invalid_expression_type(line));
        };

        match op {
            Operator::Dot => {
                let mut code = String::new();
                let (selection_code, member) = self.member_address(left, right, line)?;
                code.push_str(&selection_code);

                let member_type = member.data_type();
                if crate::types::can_pass_in_register(member_type) {
                    if member_type.primary() == Primary::Float {
                        let instruction = if member_type.width() == widths::DOUBLE {
                            "movsd"
                        } else {
                            "movss"
                        };
                        let _ = writeln!(code, "\t{instruction} xmm0, [rbx]");
                    } else {
                        let _ = writeln!(
                            code,
                            "\tmov {}, [rbx]",
                            rax_variant_for_width(member_type.width())
                        );
                    }
                } else {
                    let _ = writeln!(code, "\tmov rax, rbx");
                }
                Ok((code, 0))
            }
            Operator::Typecast => {
                // rewrite into a cast node and evaluate that
                let ExprKind::Keyword { data_type, .. } = &right.kind else {
                    return Err(CompilerError::new(
                        "Expected a type name on the right side of a typecast",
                        codes::TYPE_ERROR,
                        line,
                    ));
                };
                let rewritten = Expression::cast((**left).clone(), data_type.clone(), line);
                self.evaluate_expression(&rewritten, line, type_hint)
            }
            Operator::AttributeSelection => {
                // rewrite into an attribute-selection node
                let attribute = match &right.kind {
                    ExprKind::Identifier { name } | ExprKind::Keyword { keyword: name, .. } => {
                        match name.as_str() {
                            "len" => Attribute::Length,
                            "size" => Attribute::Size,
                            "var" => Attribute::Variability,
                            other => {
                                return Err(CompilerError::new(
                                    format!("Unknown attribute '{other}'"),
                                    codes::UNKNOWN_ATTRIBUTE,
                                    line,
                                ));
                            }
                        }
                    }
                    _ => {
                        return Err(CompilerError::new(
                            "Invalid attribute",
                            codes::UNKNOWN_ATTRIBUTE,
                            line,
                        ));
                    }
                };
                let rewritten = Expression::attribute((**left).clone(), attribute, line);
                self.evaluate_expression(&rewritten, line, type_hint)
            }
            _ => self.evaluate_arithmetic_binary(left, right, *op, line, type_hint),
        }
    }

    /// The general binary path: evaluate left, stash it, evaluate right into
    /// the B-side register, restore, then dispatch on operator and type.
    fn evaluate_arithmetic_binary(
        &mut self,
        left: &Expression,
        right: &Expression,
        op: Operator,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<(String, usize), CompilerError> {
        let mut code = String::new();
        let mut count = 0;

        if matches!(left.kind, ExprKind::List { .. }) || matches!(right.kind, ExprKind::List { .. })
        {
            return Err(CompilerError::new(
                "List expressions may not appear in binary expressions",
                codes::INVALID_EXPRESSION_TYPE,
                line,
            ));
        }

        let left_type = self.expression_type(left, line)?;
        let right_type = self.expression_type(right, line)?;

        let primary = left_type.primary();
        let mut data_width = left_type.width();
        let is_signed =
            left_type.qualities().is_signed() || right_type.qualities().is_signed();

        if left_type.qualities().is_signed() != right_type.qualities().is_signed() {
            compiler_warning(
                "Signed/unsigned mismatch",
                codes::SIGNED_UNSIGNED_MISMATCH,
                line,
            );
        }

        // width differences matter for bitwise operators in particular
        if left_type.width() != right_type.width() && op.is_bitwise() {
            warn_or_error(
                self.mode(),
                "Width mismatch in bitwise operation",
                codes::WIDTH_MISMATCH,
                line,
            )?;
        }

        if !left_type.is_compatible(&right_type) {
            return Err(CompilerError::type_error(line));
        }

        // left first
        let hint = type_hint.filter(|h| h.primary() == primary);
        let (left_code, left_count) = self.evaluate_expression(left, line, hint)?;
        code.push_str(&left_code);
        count += left_count;

        if primary == Primary::Float {
            // 'push xmm0' does not exist; spill through the stack
            let _ = writeln!(code, "\tsub rsp, 16");
            let _ = writeln!(code, "\tmovdqu [rsp], xmm0");
        } else {
            let _ = writeln!(code, "\tpush rax");
        }

        // then right
        let (right_code, right_count) = self.evaluate_expression(right, line, hint)?;
        code.push_str(&right_code);
        count += right_count;

        if right_type.primary() == Primary::Float {
            let move_instruction = if right_type.width() == widths::DOUBLE {
                "movsd"
            } else {
                "movss"
            };
            let _ = writeln!(code, "\t{move_instruction} xmm1, xmm0");
            let _ = writeln!(code, "\tmovdqu xmm0, [rsp]");
            let _ = writeln!(code, "\tadd rsp, 16");

            // mixed widths promote the narrower side to double
            if left_type.width() != right_type.width() {
                if left_type.width() == widths::FLOAT {
                    let _ = writeln!(code, "\tcvtss2sd xmm0, xmm0");
                    data_width = widths::DOUBLE;
                } else {
                    let _ = writeln!(code, "\tcvtss2sd xmm1, xmm1");
                }
            }
        } else {
            let _ = writeln!(code, "\tmov rbx, rax");
            let _ = writeln!(code, "\tpop rax");
        }

        match op {
            Operator::Plus => match primary {
                Primary::Int | Primary::Ptr => {
                    let _ = writeln!(code, "\tadd rax, rbx");
                }
                Primary::Float => {
                    let instruction = if data_width == widths::FLOAT {
                        "addss"
                    } else {
                        "addsd"
                    };
                    let _ = writeln!(code, "\t{instruction} xmm0, xmm1");
                }
                Primary::String => {
                    // concatenation produces a fresh string owned by the
                    // expression; it must eventually be freed
                    let _ = writeln!(code, "\tmov rsi, rax");
                    let _ = writeln!(code, "\tmov rdi, rbx");
                    code.push_str(&self.call_sincall_subroutine(magic::STRING_CONCAT));
                    let _ = writeln!(code, "\tpush rax");
                    count += 1;
                }
                _ => return Err(undefined_operator("plus", line)),
            },
            Operator::Minus => match primary {
                Primary::Int | Primary::Ptr => {
                    let _ = writeln!(code, "\tsub rax, rbx");
                }
                Primary::Float => {
                    let instruction = if data_width == widths::FLOAT {
                        "subss"
                    } else {
                        "subsd"
                    };
                    let _ = writeln!(code, "\t{instruction} xmm0, xmm1");
                }
                _ => return Err(undefined_operator("minus", line)),
            },
            Operator::Mult => match primary {
                Primary::Int => {
                    if is_signed {
                        let _ = writeln!(code, "\timul rax, rbx");
                    } else {
                        // one-operand mul writes RDX:RAX
                        let rdx_in_use = self.regs_ref().is_in_use(Register::Rdx);
                        if rdx_in_use {
                            let _ = writeln!(code, "\tpush rdx");
                        }
                        let _ = writeln!(code, "\tmul rbx");
                        if rdx_in_use {
                            let _ = writeln!(code, "\tpop rdx");
                        }
                    }
                }
                Primary::Float => {
                    let instruction = if data_width == widths::FLOAT {
                        "mulss"
                    } else {
                        "mulsd"
                    };
                    let _ = writeln!(code, "\t{instruction} xmm0, xmm1");
                }
                _ => return Err(undefined_operator("multiplication", line)),
            },
            Operator::Div => match primary {
                Primary::Int => {
                    // the divide clobbers RDX
                    let rdx_in_use = self.regs_ref().is_in_use(Register::Rdx);
                    if rdx_in_use {
                        let _ = writeln!(code, "\tpush rdx");
                    }
                    if is_signed {
                        let _ = writeln!(code, "\tcqo");
                        let _ = writeln!(code, "\tidiv rbx");
                    } else {
                        let _ = writeln!(code, "\tmov rdx, 0");
                        let _ = writeln!(code, "\tdiv rbx");
                    }
                    if rdx_in_use {
                        let _ = writeln!(code, "\tpop rdx");
                    }
                }
                Primary::Float => {
                    let instruction = if data_width == widths::FLOAT {
                        "divss"
                    } else {
                        "divsd"
                    };
                    let _ = writeln!(code, "\t{instruction} xmm0, xmm1");
                }
                _ => return Err(undefined_operator("division", line)),
            },
            Operator::Modulo => match primary {
                Primary::Int => {
                    // remainder comes back in RDX
                    let rdx_in_use = self.regs_ref().is_in_use(Register::Rdx);
                    if rdx_in_use {
                        let _ = writeln!(code, "\tpush rdx");
                    }
                    if is_signed {
                        let _ = writeln!(code, "\tcqo");
                        let _ = writeln!(code, "\tidiv rbx");
                    } else {
                        let _ = writeln!(code, "\tmov rdx, 0");
                        let _ = writeln!(code, "\tdiv rbx");
                    }
                    let _ = writeln!(code, "\tmov rax, rdx");
                    if rdx_in_use {
                        let _ = writeln!(code, "\tpop rdx");
                    }
                }
                Primary::Float => {
                    // truncated division: a - trunc(a / b) * b
                    code.push_str(&float_modulo(data_width));
                }
                _ => return Err(undefined_operator("modulo", line)),
            },
            Operator::BitAnd | Operator::BitOr | Operator::BitXor => {
                let mnemonic = match op {
                    Operator::BitAnd => "and",
                    Operator::BitOr => "or",
                    _ => "xor",
                };
                match primary {
                    Primary::Int => {
                        let _ = writeln!(code, "\t{mnemonic} rax, rbx");
                    }
                    Primary::Float => {
                        // bitwise on floats operates on the packed registers
                        let suffix = if data_width == widths::DOUBLE { "pd" } else { "ps" };
                        let _ = writeln!(code, "\t{mnemonic}{suffix} xmm0, xmm1");
                    }
                    _ => return Err(undefined_operator("bitwise", line)),
                }
            }
            Operator::And | Operator::Or | Operator::Xor => {
                if primary != Primary::Bool {
                    return Err(undefined_operator("logical", line));
                }
                let mnemonic = match op {
                    Operator::And => "and",
                    Operator::Or => "or",
                    _ => "xor",
                };
                let _ = writeln!(code, "\t{mnemonic} al, bl");
            }
            _ if op.is_comparison() => {
                code.push_str(&self.comparison(
                    op,
                    &left_type,
                    &right_type,
                    data_width,
                    line,
                )?);
            }
            _ => {
                return Err(CompilerError::new(
                    "Undefined operator",
                    codes::UNDEFINED_OPERATOR,
                    line,
                ));
            }
        }

        Ok((code, count))
    }

    /// Equivalency operators: CMP (or its SSE/string equivalents) followed by
    /// SETcc and a zero-extension of AL.
    fn comparison(
        &mut self,
        op: Operator,
        left_type: &DataType,
        right_type: &DataType,
        data_width: usize,
        line: u32,
    ) -> Result<String, CompilerError> {
        let mut code = String::new();
        let mut use_unsigned_setcc = false;

        match left_type.primary() {
            Primary::String => {
                // strings support = and != only, via a byte comparison over
                // the length prefix plus payload
                if !matches!(op, Operator::Equal | Operator::NotEqual) {
                    return Err(CompilerError::new(
                        "Illegal equivalency operator on string type",
                        codes::UNDEFINED_OPERATOR,
                        line,
                    ));
                }
                let _ = writeln!(code, "\tmov rsi, rax");
                let _ = writeln!(code, "\tmov rdi, rbx");
                let _ = writeln!(code, "\tmov ecx, [rsi]");
                let _ = writeln!(code, "\tadd ecx, 4");
                let _ = writeln!(code, "\trepe cmpsb");
            }
            Primary::Float => {
                // SSE compares set CF/ZF like unsigned integer compares
                let instruction = if data_width == widths::DOUBLE {
                    "comisd"
                } else {
                    "comiss"
                };
                let _ = writeln!(code, "\t{instruction} xmm0, xmm1");
                use_unsigned_setcc = true;
            }
            _ => {
                use_unsigned_setcc = left_type.qualities().is_unsigned()
                    && right_type.qualities().is_unsigned();
                let _ = writeln!(code, "\tcmp rax, rbx");
            }
        }

        let instruction = match (op, use_unsigned_setcc) {
            (Operator::Equal, _) => "sete",
            (Operator::NotEqual, _) => "setne",
            (Operator::Greater, false) => "setg",
            (Operator::Greater, true) => "seta",
            (Operator::Less, false) => "setl",
            (Operator::Less, true) => "setb",
            (Operator::GreaterOrEqual, false) => "setge",
            (Operator::GreaterOrEqual, true) => "setae",
            (Operator::LessOrEqual, false) => "setle",
            (Operator::LessOrEqual, true) => "setbe",
            _ => {
                return Err(CompilerError::new(
                    "Undefined operator",
                    codes::UNDEFINED_OPERATOR,
                    line,
                ));
            }
        };

        let _ = writeln!(code, "\t{instruction} al");
        let _ = writeln!(code, "\tmovzx rax, al");

        Ok(code)
    }

    pub(crate) fn evaluate_unary(
        &mut self,
        exp: &Expression,
        line: u32,
        type_hint: Option<&DataType>,
    ) -> Result<String, CompilerError> {
        let ExprKind::Unary { operand, op } = &exp.kind else {
            return Err(CompilerError::invalid_expression_type(line));
        };

        let mut code = String::new();
        let unary_type = self.expression_type(operand, line)?;

        // the operand is evaluated first for everything except address-of,
        // which takes an lvalue without loading it
        if *op != Operator::Address {
            let (operand_code, _) = self.evaluate_expression(operand, line, type_hint)?;
            code.push_str(&operand_code);
        }

        match op {
            Operator::UnaryPlus => {
                compiler_note("Note the unary plus operator has no effect", line);
            }
            Operator::UnaryMinus => match unary_type.primary() {
                Primary::Float => {
                    // flip the sign bit with the precision-matched mask
                    if unary_type.width() == widths::DOUBLE {
                        let _ = writeln!(code, "\tmovsd xmm1, [{}]", magic::DP_MASK_LABEL);
                        let _ = writeln!(code, "\txorpd xmm0, xmm1");
                    } else {
                        let _ = writeln!(code, "\tmovss xmm1, [{}]", magic::SP_MASK_LABEL);
                        let _ = writeln!(code, "\txorps xmm0, xmm1");
                    }
                }
                Primary::Int => {
                    if unary_type.qualities().is_unsigned() {
                        compiler_warning(
                            "Unary minus on unsigned data may result in data loss because the compiler will not modify the data's width",
                            codes::POTENTIAL_DATA_LOSS,
                            line,
                        );
                    }
                    let _ = writeln!(
                        code,
                        "\tneg {}",
                        rax_variant_for_width(unary_type.width())
                    );
                }
                _ => return Err(unary_not_supported(line)),
            },
            Operator::Not => {
                if unary_type.primary() != Primary::Bool {
                    return Err(unary_not_supported(line));
                }
                // booleans are 0 or 1 in AL
                let _ = writeln!(code, "\txor al, 0xFF");
            }
            Operator::BitNot => {
                if matches!(
                    unary_type.primary(),
                    Primary::String | Primary::Array | Primary::Struct
                ) {
                    return Err(unary_not_supported(line));
                }
                let _ = writeln!(code, "\tnot rax");
            }
            Operator::Dereference => {
                if unary_type.primary() != Primary::Ptr {
                    return Err(CompilerError::illegal_indirection(line));
                }
                let pointed = unary_type
                    .subtype()
                    .ok_or_else(|| CompilerError::illegal_indirection(line))?;
                if pointed.primary() == Primary::Float {
                    let instruction = if pointed.width() == widths::DOUBLE {
                        "movsd"
                    } else {
                        "movss"
                    };
                    let _ = writeln!(code, "\t{instruction} xmm0, [rax]");
                } else {
                    let _ = writeln!(
                        code,
                        "\tmov {}, [rax]",
                        rax_variant_for_width(pointed.width())
                    );
                }
            }
            Operator::Address => {
                code.push_str(&self.get_exp_address(operand, Register::Rax, line)?);
            }
            _ => {
                return Err(CompilerError::new(
                    "Invalid unary operator",
                    codes::INVALID_UNARY_OPERATOR,
                    line,
                ));
            }
        }

        Ok(code)
    }
}

/// Float modulo by truncated division, `a - trunc(a / b) * b`, keeping the
/// operands in XMM0/XMM1 and the result in XMM0.
fn float_modulo(data_width: usize) -> String {
    let mut code = String::new();
    if data_width == widths::DOUBLE {
        let _ = writeln!(code, "\tmovsd xmm2, xmm0");
        let _ = writeln!(code, "\tdivsd xmm2, xmm1");
        let _ = writeln!(code, "\tcvttsd2si rax, xmm2");
        let _ = writeln!(code, "\tcvtsi2sd xmm2, rax");
        let _ = writeln!(code, "\tmulsd xmm2, xmm1");
        let _ = writeln!(code, "\tsubsd xmm0, xmm2");
    } else {
        let _ = writeln!(code, "\tmovss xmm2, xmm0");
        let _ = writeln!(code, "\tdivss xmm2, xmm1");
        let _ = writeln!(code, "\tcvttss2si eax, xmm2");
        let _ = writeln!(code, "\tcvtsi2ss xmm2, eax");
        let _ = writeln!(code, "\tmulss xmm2, xmm1");
        let _ = writeln!(code, "\tsubss xmm0, xmm2");
    }
    code
}

fn undefined_operator(name: &str, line: u32) -> CompilerError {
    CompilerError::new(
        format!("The {name} operator is not defined for this type"),
        codes::UNDEFINED_OPERATOR,
        line,
    )
}

fn unary_not_supported(line: u32) -> CompilerError {
    CompilerError::new(
        "The unary operator is not supported for this type",
        codes::UNARY_TYPE_NOT_SUPPORTED,
        line,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Mode;
    use crate::types::{Qualities, Quality};

    fn compiler() -> Compiler {
        Compiler::new(Mode::Normal)
    }

    fn int_literal(value: &str) -> Expression {
        Expression::literal(DataType::simple(Primary::Int), value, 1)
    }

    fn float_literal(value: &str) -> Expression {
        Expression::literal(DataType::simple(Primary::Float), value, 1)
    }

    #[test]
    fn integer_addition_shuffles_through_the_stack() {
        let mut c = compiler();
        let exp = Expression::binary(int_literal("3"), int_literal("4"), Operator::Plus, 1);
        let (code, count) = c.evaluate_expression(&exp, 1, None).unwrap();

        let push_at = code.find("push rax").unwrap();
        let shuffle_at = code.find("mov rbx, rax").unwrap();
        let pop_at = code.find("pop rax").unwrap();
        let add_at = code.find("add rax, rbx").unwrap();
        assert!(push_at < shuffle_at && shuffle_at < pop_at && pop_at < add_at);
        assert_eq!(count, 0);
    }

    #[test]
    fn signed_multiplication_uses_imul() {
        let mut c = compiler();
        let exp = Expression::binary(int_literal("6"), int_literal("7"), Operator::Mult, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("imul rax, rbx"));
    }

    #[test]
    fn unsigned_multiplication_preserves_a_live_rdx() {
        let mut c = compiler();
        c.regs().set(Register::Rdx, None);

        let mut q = Qualities::new();
        q.add(Quality::Unsigned, 0).unwrap();
        let unsigned_int = DataType::with_qualities(Primary::Int, q);
        let exp = Expression::binary(
            Expression::literal(unsigned_int.clone(), "6", 1),
            Expression::literal(unsigned_int, "7", 1),
            Operator::Mult,
            1,
        );
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        // one-operand mul writes RDX:RAX, so the live value is saved around it
        let push_at = code.find("push rdx").expect("rdx should be preserved");
        let mul_at = code.find("mul rbx").expect("unsigned multiply expected");
        let pop_at = code.find("pop rdx").expect("rdx should be restored");
        assert!(push_at < mul_at && mul_at < pop_at);
    }

    #[test]
    fn signed_division_sign_extends_into_rdx() {
        let mut c = compiler();
        let exp = Expression::binary(int_literal("9"), int_literal("2"), Operator::Div, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("cqo"));
        assert!(code.contains("idiv rbx"));
    }

    #[test]
    fn modulo_takes_remainder_from_rdx() {
        let mut c = compiler();
        let exp = Expression::binary(int_literal("9"), int_literal("4"), Operator::Modulo, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("idiv rbx"));
        assert!(code.contains("mov rax, rdx"));
    }

    #[test]
    fn float_operands_spill_through_sixteen_bytes() {
        let mut c = compiler();
        let exp = Expression::binary(float_literal("1.0"), float_literal("2.0"), Operator::Plus, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("sub rsp, 16"));
        assert!(code.contains("movdqu [rsp], xmm0"));
        assert!(code.contains("movss xmm1, xmm0"));
        assert!(code.contains("movdqu xmm0, [rsp]"));
        assert!(code.contains("add rsp, 16"));
        assert!(code.contains("addss xmm0, xmm1"));
    }

    #[test]
    fn comparison_sets_and_extends() {
        let mut c = compiler();
        let exp = Expression::binary(int_literal("1"), int_literal("2"), Operator::Less, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("cmp rax, rbx"));
        assert!(code.contains("setl al"));
        assert!(code.contains("movzx rax, al"));
    }

    #[test]
    fn float_comparison_uses_unsigned_setcc() {
        let mut c = compiler();
        let exp = Expression::binary(
            float_literal("1.0"),
            float_literal("2.0"),
            Operator::Greater,
            1,
        );
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("comiss xmm0, xmm1"));
        assert!(code.contains("seta al"));
    }

    #[test]
    fn string_concat_calls_the_runtime_and_owns_a_temporary() {
        let mut c = compiler();
        let string = DataType::simple(Primary::String);
        let exp = Expression::binary(
            Expression::literal(string.clone(), "foo", 1),
            Expression::literal(string, "bar", 1),
            Operator::Plus,
            1,
        );
        let (code, count) = c.evaluate_expression(&exp, 1, None).unwrap();

        assert!(code.contains("call sinl_string_concat"));
        assert_eq!(count, 1);
    }

    #[test]
    fn incompatible_operands_are_rejected() {
        let mut c = compiler();
        let exp = Expression::binary(
            int_literal("1"),
            Expression::literal(DataType::simple(Primary::String), "x", 1),
            Operator::Plus,
            1,
        );
        let err = c.evaluate_expression(&exp, 1, None).unwrap_err();
        assert_eq!(err.code(), codes::TYPE_ERROR);
    }

    #[test]
    fn lists_may_not_appear_in_binaries() {
        let mut c = compiler();
        let list = Expression::list(vec![int_literal("1")], false, 1);
        let exp = Expression::binary(list, int_literal("2"), Operator::Plus, 1);
        assert!(c.evaluate_expression(&exp, 1, None).is_err());
    }

    #[test]
    fn unary_minus_on_int_negates() {
        let mut c = compiler();
        let exp = Expression::unary(int_literal("5"), Operator::UnaryMinus, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("neg eax"));
    }

    #[test]
    fn unary_minus_on_float_uses_sign_mask() {
        let mut c = compiler();
        let exp = Expression::unary(float_literal("5.0"), Operator::UnaryMinus, 1);
        let (code, _) = c.evaluate_expression(&exp, 1, None).unwrap();
        assert!(code.contains("movss xmm1, [sinl_sp_mask]"));
        assert!(code.contains("xorps xmm0, xmm1"));
    }

    #[test]
    fn logical_not_requires_bool() {
        let mut c = compiler();
        let good = Expression::unary(
            Expression::literal(DataType::simple(Primary::Bool), "true", 1),
            Operator::Not,
            1,
        );
        let (code, _) = c.evaluate_expression(&good, 1, None).unwrap();
        assert!(code.contains("xor al, 0xFF"));

        let bad = Expression::unary(int_literal("1"), Operator::Not, 1);
        let err = c.evaluate_expression(&bad, 1, None).unwrap_err();
        assert_eq!(err.code(), codes::UNARY_TYPE_NOT_SUPPORTED);
    }

    #[test]
    fn dereferencing_non_pointer_is_illegal() {
        let mut c = compiler();
        let exp = Expression::unary(int_literal("5"), Operator::Dereference, 1);
        let err = c.evaluate_expression(&exp, 1, None).unwrap_err();
        assert_eq!(err.code(), codes::ILLEGAL_INDIRECTION);
    }
}

//! End-to-end scenarios: build an AST by hand (the parser ships separately)
//! and check the shape of the emitted assembly.

use std::path::Path;

use sinc::ast::{
    Allocation, Assignment, Expression, FunctionDefinition, MemberInitializer, Operator,
    Parameter, Statement,
};
use sinc::compiler::Compiler;
use sinc::error::codes;
use sinc::frontend::{NoFrontEnd, StaticSource};
use sinc::options::Mode;
use sinc::types::{DataType, Primary, Qualities, Quality};

fn int_type() -> DataType {
    DataType::simple(Primary::Int)
}

fn qualities(list: &[Quality]) -> Qualities {
    Qualities::from_list(list, 0).expect("test qualities are conflict-free")
}

fn int_literal(value: &str, line: u32) -> Expression {
    Expression::literal(int_type(), value, line)
}

fn alloc(name: &str, data_type: DataType, initial_value: Option<Expression>, line: u32) -> Statement {
    Statement::Allocation(Allocation {
        name: name.to_string(),
        data_type,
        initial_value,
        line,
    })
}

fn function(name: &str, return_type: DataType, parameters: Vec<Parameter>, body: Vec<Statement>) -> Statement {
    Statement::FunctionDefinition(FunctionDefinition {
        name: name.to_string(),
        return_type,
        formal_parameters: parameters,
        procedure: body,
        line: 1,
    })
}

fn return_int(value: &str, line: u32) -> Statement {
    Statement::Return {
        value: int_literal(value, line),
        line,
    }
}

fn compile(ast: Vec<Statement>) -> String {
    Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
        .expect("compilation should succeed")
}

fn compile_err(ast: Vec<Statement>) -> sinc::error::CompilerError {
    Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
        .expect_err("compilation should fail")
}

/// A position assertion: all needles appear, in order.
fn assert_in_order(haystack: &str, needles: &[&str]) {
    let mut at = 0;
    for needle in needles {
        match haystack[at..].find(needle) {
            Some(found) => at += found + needle.len(),
            None => panic!("expected to find {needle:?} (in order) in:\n{haystack}"),
        }
    }
}

#[test]
fn global_int_allocation_reserves_and_initializes() {
    let asm = compile(vec![alloc("x", int_type(), Some(int_literal("5", 1)), 1)]);

    assert!(asm.contains("SIN_x: resb 4"), "missing bss slot:\n{asm}");
    assert!(asm.contains("mov dword [SIN_x], 5"), "missing init store:\n{asm}");
}

#[test]
fn global_bool_and_char_literals_are_normalized() {
    let bool_type = DataType::simple(Primary::Bool);
    let char_type = DataType::simple(Primary::Char);
    let asm = compile(vec![
        alloc(
            "flag",
            bool_type.clone(),
            Some(Expression::literal(bool_type, "true", 1)),
            1,
        ),
        alloc(
            "c",
            char_type.clone(),
            Some(Expression::literal(char_type, "A", 2)),
            2,
        ),
    ]);

    // bool and char initializers go through the evaluator (0/1, backtick
    // escapes); the literal text is never a store operand
    assert!(!asm.contains("], true"), "raw bool literal in a store:\n{asm}");
    assert!(!asm.contains("], A"), "raw char literal in a store:\n{asm}");
    assert!(asm.contains("SIN_flag: resb 1"));
    assert!(asm.contains("SIN_c: resb 1"));
    assert_in_order(
        &asm,
        &[
            "mov al, 1",
            "lea rbx, [SIN_flag]",
            "mov [rbx], al",
            "mov al, `A`",
            "lea rbx, [SIN_c]",
            "mov [rbx], al",
        ],
    );
}

#[test]
fn local_alloc_and_assignment_reuse_one_slot() {
    let body = vec![
        alloc("x", int_type(), Some(int_literal("5", 2)), 2),
        Statement::Assignment(Assignment {
            lvalue: Expression::identifier("x", 3),
            rvalue: Expression::binary(
                Expression::identifier("x", 3),
                int_literal("3", 3),
                Operator::Plus,
                3,
            ),
            line: 3,
        }),
        return_int("0", 4),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    // the first local of a parameterless function sits at [rbp - 4]
    assert_in_order(
        &asm,
        &[
            "SIN_f:",
            "mov eax, 5",
            "mov [rbp - 4], eax",
            "mov eax, [rbp - 4]",
            "push rax",
            "mov eax, 3",
            "mov rbx, rax",
            "pop rax",
            "add rax, rbx",
            "mov [rbp - 4], eax",
        ],
    );
    // one slot only: no second offset appears
    assert!(!asm.contains("[rbp - 8]"), "unexpected second slot:\n{asm}");
}

#[test]
fn if_then_else_uses_numbered_labels() {
    let condition = Expression::binary(
        Expression::identifier("a", 3),
        Expression::identifier("b", 3),
        Operator::Equal,
        3,
    );
    let body = vec![
        alloc("a", int_type(), Some(int_literal("1", 2)), 2),
        alloc("b", int_type(), Some(int_literal("2", 2)), 2),
        Statement::IfThenElse {
            condition,
            if_branch: Box::new(Statement::ScopedBlock {
                statements: vec![return_int("1", 4)],
                line: 3,
            }),
            else_branch: Some(Box::new(Statement::ScopedBlock {
                statements: vec![return_int("0", 5)],
                line: 5,
            })),
            line: 3,
        },
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    assert_in_order(
        &asm,
        &[
            "cmp rax, rbx",
            "sete al",
            "movzx rax, al",
            "cmp al, 1",
            "jne .sinl_ite_else_0",
            ".sinl_ite_0:",
            "jmp .sinl_ite_done_0",
            ".sinl_ite_else_0:",
            ".sinl_ite_done_0:",
        ],
    );
}

#[test]
fn while_loop_evaluates_condition_at_the_top() {
    let body = vec![
        alloc(
            "go",
            DataType::simple(Primary::Bool),
            Some(Expression::literal(DataType::simple(Primary::Bool), "true", 2)),
            2,
        ),
        Statement::WhileLoop {
            condition: Expression::identifier("go", 3),
            body: Box::new(Statement::ScopedBlock {
                statements: vec![Statement::Assignment(Assignment {
                    lvalue: Expression::identifier("go", 4),
                    rvalue: Expression::literal(DataType::simple(Primary::Bool), "false", 4),
                    line: 4,
                })],
                line: 3,
            }),
            line: 3,
        },
        return_int("0", 6),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    assert_in_order(
        &asm,
        &[
            ".sinl_while_0:",
            "cmp al, 1",
            "jne .sinl_while_done_0",
            "jmp .sinl_while_0",
            ".sinl_while_done_0:",
        ],
    );
}

#[test]
fn dynamic_int_array_allocates_and_copies_the_literal() {
    let mut array_type = DataType::array_of(int_type(), qualities(&[Quality::Dynamic]), None);
    // the declared type's length resolves from the literal
    array_type.set_array_length(0);

    let list = Expression::list(
        vec![int_literal("1", 2), int_literal("2", 2), int_literal("3", 2)],
        false,
        2,
    );
    let body = vec![
        alloc("xs", array_type, Some(list), 2),
        return_int("0", 3),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    // runtime allocation of 3 elements of width 4, pointer stored in the slot
    assert_in_order(
        &asm,
        &[
            "mov rsi, 4",
            "mov rdi, 3",
            "call sinl_dynamic_array_alloc",
            "mov [rbp - 8], rax",
        ],
    );

    // the list literal writes its length and elements into the reserved region
    assert_in_order(
        &asm,
        &[
            "lea r15, [sinl_list_0]",
            "mov eax, 3",
            "mov [r15], eax",
            "mov eax, 1",
            "mov [r15 + 0], eax",
            "mov eax, 2",
            "mov [r15 + 4], eax",
            "mov eax, 3",
            "mov [r15 + 8], eax",
        ],
    );
    assert!(asm.contains("sinl_list_0: resd 1"));
    assert!(asm.contains("sinl_list_0_data: resd 3"));
    assert!(asm.contains("call sinl_array_copy"));
}

#[test]
fn main_definition_exports_the_entry_wrapper() {
    let args_type = DataType::array_of(
        DataType::simple(Primary::String),
        qualities(&[Quality::Dynamic]),
        None,
    );
    let ast = vec![function(
        "main",
        int_type(),
        vec![Parameter::new("args", args_type, 1)],
        vec![return_int("0", 2)],
    )];
    let asm = compile(ast);

    assert_in_order(
        &asm,
        &[
            "global %[SIN_MAIN]",
            "%[SIN_MAIN]:",
            "mov r12, rdi",
            "mov r13, rsi",
            "call %[SRE_INIT]",
            "mov rsi, 8",
            "mov rdi, r12",
            "call sinl_dynamic_array_alloc",
            "push rax",
            "mov rsi, rax",
            "call SIN_main",
            "mov [rsp], rax",
            "call %[SRE_CLEAN]",
            "pop rax",
            "ret",
        ],
    );
    assert!(asm.contains("extern sinl_dynamic_array_alloc"));
}

#[test]
fn wrong_main_signature_is_an_error() {
    let ast = vec![function("main", int_type(), Vec::new(), vec![return_int("0", 2)])];
    let err = compile_err(ast);
    assert_eq!(err.code(), codes::MAIN_SIGNATURE);
}

#[test]
fn move_to_managed_pointer_frees_stores_and_add_refs() {
    let ptr_type = DataType::with_subtype(Primary::Ptr, int_type(), Qualities::new());
    let body = vec![
        alloc("x", int_type(), Some(int_literal("5", 2)), 2),
        alloc("y", int_type(), Some(int_literal("7", 3)), 3),
        alloc(
            "a",
            ptr_type.clone(),
            Some(Expression::unary(
                Expression::identifier("x", 4),
                Operator::Address,
                4,
            )),
            4,
        ),
        alloc(
            "b",
            ptr_type,
            Some(Expression::unary(
                Expression::identifier("y", 5),
                Operator::Address,
                5,
            )),
            5,
        ),
        Statement::Movement(Assignment {
            lvalue: Expression::identifier("b", 6),
            rvalue: Expression::identifier("a", 6),
            line: 6,
        }),
        return_int("0", 7),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    // free the old referent, store the new pointer, bump its count
    assert_in_order(
        &asm,
        &[
            "mov rdi, [rbx]",
            "call %[SRE_FREE]",
            "mov [rbx], rax",
            "mov rdi, rax",
            "call %[SRE_ADD_REF]",
        ],
    );
}

#[test]
fn move_between_plain_ints_degrades_to_copy() {
    let body = vec![
        alloc("a", int_type(), Some(int_literal("1", 2)), 2),
        alloc("b", int_type(), Some(int_literal("2", 3)), 3),
        Statement::Movement(Assignment {
            lvalue: Expression::identifier("b", 4),
            rvalue: Expression::identifier("a", 4),
            line: 4,
        }),
        return_int("0", 5),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    // a plain store, with no reference-count traffic for the move
    assert!(asm.contains("mov [rbp - 8], eax"));
    assert!(!asm.contains("%[SRE_ADD_REF]"), "copy should not add refs:\n{asm}");
}

#[test]
fn move_to_reference_is_illegal() {
    let ref_type = DataType::with_subtype(Primary::Reference, int_type(), Qualities::new());
    let body = vec![
        alloc("x", int_type(), Some(int_literal("5", 2)), 2),
        alloc("r", ref_type, Some(Expression::identifier("x", 3)), 3),
        Statement::Movement(Assignment {
            lvalue: Expression::identifier("r", 4),
            rvalue: Expression::identifier("x", 4),
            line: 4,
        }),
        return_int("0", 5),
    ];
    let err = compile_err(vec![function("f", int_type(), Vec::new(), body)]);
    assert_eq!(err.code(), codes::MOVE_TO_REFERENCE);
}

#[test]
fn indexed_access_bounds_checks_against_the_length_prefix() {
    let array_type = DataType::array_of(
        int_type(),
        Qualities::new(),
        Some(int_literal("3", 2).constant()),
    );
    let body = vec![
        alloc("arr", array_type, None, 2),
        Statement::Assignment(Assignment {
            lvalue: Expression::indexed(
                Expression::identifier("arr", 3),
                int_literal("1", 3),
                3,
            ),
            rvalue: int_literal("9", 3),
            line: 3,
        }),
        return_int("0", 4),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    assert_in_order(
        &asm,
        &[
            "cmp [rbx], eax",
            "jg .sinl_rtbounds_0",
            "call %[SINL_RTE_OUT_OF_BOUNDS]",
            ".sinl_rtbounds_0:",
            "mov ecx, 4",
            "mul ecx",
            "add rax, 4",
            "add rbx, rax",
        ],
    );
}

#[test]
fn string_concat_assignment_frees_the_temporary() {
    let string = DataType::simple(Primary::String);
    let body = vec![
        alloc(
            "a",
            string.clone(),
            Some(Expression::literal(string.clone(), "foo", 2)),
            2,
        ),
        alloc(
            "b",
            string.clone(),
            Some(Expression::literal(string.clone(), "bar", 3)),
            3,
        ),
        alloc(
            "c",
            string.clone(),
            Some(Expression::binary(
                Expression::identifier("a", 4),
                Expression::identifier("b", 4),
                Operator::Plus,
                4,
            )),
            4,
        ),
        return_int("0", 5),
    ];
    let asm = compile(vec![function("f", int_type(), Vec::new(), body)]);

    assert_in_order(
        &asm,
        &[
            "call sinl_string_concat",
            "push rax",
            "call sinl_string_copy",
            "pop rax",
            "mov rdi, rax",
            "call %[SRE_FREE]",
        ],
    );
}

#[test]
fn function_call_places_arguments_in_sincall_registers() {
    let add = function(
        "add",
        int_type(),
        vec![
            Parameter::new("a", int_type(), 1),
            Parameter::new("b", int_type(), 1),
        ],
        vec![Statement::Return {
            value: Expression::binary(
                Expression::identifier("a", 2),
                Expression::identifier("b", 2),
                Operator::Plus,
                2,
            ),
            line: 2,
        }],
    );
    let caller = function(
        "f",
        int_type(),
        Vec::new(),
        vec![
            alloc(
                "r",
                int_type(),
                Some(Expression::call("add", vec![int_literal("1", 5), int_literal("2", 5)], 5)),
                5,
            ),
            return_int("0", 6),
        ],
    );
    let asm = compile(vec![add, caller]);

    // callee binds its register parameters to their slots
    assert_in_order(&asm, &["SIN_add:", "mov [rbp - 12], esi", "mov [rbp - 16], edi"]);

    // caller: frame setup, args into RSI/RDI, call, frame teardown
    assert_in_order(
        &asm,
        &[
            "pushq rbp",
            "mov rbp, rsp",
            "pop rdi",
            "pop rsi",
            "call SIN_add",
            "mov rsp, rbp",
            "popq rbp",
        ],
    );
}

#[test]
fn missing_argument_without_default_is_a_signature_error() {
    let callee = function(
        "g",
        int_type(),
        vec![Parameter::new("a", int_type(), 1)],
        vec![return_int("0", 2)],
    );
    let caller = function(
        "f",
        int_type(),
        Vec::new(),
        vec![
            Statement::Call {
                name: "g".to_string(),
                args: Vec::new(),
                line: 5,
            },
            return_int("0", 6),
        ],
    );
    let err = compile_err(vec![callee, caller]);
    assert_eq!(err.code(), codes::SIGNATURE);
}

#[test]
fn default_parameter_fills_a_missing_argument() {
    let callee = function(
        "g",
        int_type(),
        vec![Parameter::new("a", int_type(), 1).with_default(int_literal("42", 1))],
        vec![return_int("0", 2)],
    );
    let caller = function(
        "f",
        int_type(),
        Vec::new(),
        vec![
            Statement::Call {
                name: "g".to_string(),
                args: Vec::new(),
                line: 5,
            },
            return_int("0", 6),
        ],
    );
    let asm = compile(vec![callee, caller]);
    assert_in_order(&asm, &["mov eax, 42", "call SIN_g"]);
}

#[test]
fn struct_definition_and_construction_write_member_offsets() {
    let point = Statement::StructDefinition {
        name: "point".to_string(),
        procedure: vec![
            alloc("x", int_type(), None, 2),
            alloc("y", int_type(), None, 3),
        ],
        line: 1,
    };
    let body = vec![
        alloc("p", DataType::structure("point", Qualities::new()), None, 6),
        Statement::Construction {
            to_construct: Expression::identifier("p", 7),
            initializers: vec![
                MemberInitializer {
                    member: "x".to_string(),
                    value: int_literal("1", 7),
                },
                MemberInitializer {
                    member: "y".to_string(),
                    value: int_literal("2", 7),
                },
            ],
            has_default: false,
            line: 7,
        },
        Statement::Assignment(Assignment {
            lvalue: Expression::binary(
                Expression::identifier("p", 8),
                Expression::identifier("y", 8),
                Operator::Dot,
                8,
            ),
            rvalue: int_literal("3", 8),
            line: 8,
        }),
        return_int("0", 9),
    ];
    let asm = compile(vec![point, function("f", int_type(), Vec::new(), body)]);

    // construction initializes both members at their offsets
    assert_in_order(&asm, &["mov [rbx + 0], eax", "mov [rbx + 4], eax"]);
    // the dot-assignment reaches y through its offset
    assert_in_order(&asm, &["add rbx, 4", "mov [rbx], eax"]);
}

#[test]
fn construction_count_mismatch_is_rejected() {
    let point = Statement::StructDefinition {
        name: "point".to_string(),
        procedure: vec![
            alloc("x", int_type(), None, 2),
            alloc("y", int_type(), None, 3),
        ],
        line: 1,
    };
    let body = vec![
        alloc("p", DataType::structure("point", Qualities::new()), None, 6),
        Statement::Construction {
            to_construct: Expression::identifier("p", 7),
            initializers: vec![MemberInitializer {
                member: "x".to_string(),
                value: int_literal("1", 7),
            }],
            has_default: false,
            line: 7,
        },
        return_int("0", 8),
    ];
    let err = compile_err(vec![point, function("f", int_type(), Vec::new(), body)]);
    assert_eq!(err.code(), codes::CONSTRUCTION_NUMBER_INIT);
}

#[test]
fn self_containing_struct_is_rejected() {
    let node = Statement::StructDefinition {
        name: "node".to_string(),
        procedure: vec![alloc(
            "next",
            DataType::structure("node", Qualities::new()),
            None,
            2,
        )],
        line: 1,
    };
    let err = compile_err(vec![node]);
    assert_eq!(err.code(), codes::SELF_CONTAINMENT);
}

#[test]
fn scope_exit_frees_managed_locals_in_reverse_order() {
    let string = DataType::simple(Primary::String);
    let inner = Statement::ScopedBlock {
        statements: vec![
            alloc(
                "first",
                string.clone(),
                Some(Expression::literal(string.clone(), "a", 3)),
                3,
            ),
            alloc(
                "second",
                string.clone(),
                Some(Expression::literal(string.clone(), "b", 4)),
                4,
            ),
        ],
        line: 2,
    };
    let asm = compile(vec![function(
        "f",
        int_type(),
        Vec::new(),
        vec![inner, return_int("0", 6)],
    )]);

    // frees run in reverse insertion order before the stack is reclaimed
    assert_in_order(
        &asm,
        &[
            "; freeing symbol SIN_f_second",
            "call %[SRE_FREE]",
            "; freeing symbol SIN_f_first",
            "call %[SRE_FREE]",
            "add rsp, 16",
        ],
    );
}

#[test]
fn includes_pull_in_extern_symbols_only_once() {
    let mut source = StaticSource::new();
    source.insert(
        "proj/lib.sin",
        vec![alloc(
            "counter",
            DataType::with_qualities(Primary::Int, qualities(&[Quality::Extern])),
            None,
            1,
        )],
    );

    let ast = vec![
        Statement::Include {
            filename: "lib.sin".to_string(),
            line: 1,
        },
        Statement::Include {
            filename: "lib.sin".to_string(),
            line: 2,
        },
    ];
    let asm = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("proj/main.sin"), &ast, &mut source)
        .expect("include should compile");

    // extern names pass through unmangled, and only once
    assert_eq!(asm.matches("extern counter").count(), 1);
}

#[test]
fn non_extern_symbols_in_includes_are_invisible() {
    let mut source = StaticSource::new();
    source.insert(
        "proj/lib.sin",
        vec![alloc("hidden", int_type(), Some(int_literal("1", 1)), 1)],
    );

    let ast = vec![Statement::Include {
        filename: "lib.sin".to_string(),
        line: 1,
    }];
    let err = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("proj/main.sin"), &ast, &mut source)
        .expect_err("non-extern include symbols are invisible");
    assert_eq!(err.code(), codes::INVISIBLE_SYMBOL);
}

#[test]
fn strict_mode_promotes_bitwise_width_mismatch() {
    let long_type = DataType::with_qualities(Primary::Int, qualities(&[Quality::Long]));
    let body = |line| {
        vec![
            alloc(
                "x",
                int_type(),
                Some(Expression::binary(
                    int_literal("5", line),
                    Expression::literal(long_type.clone(), "70000", line),
                    Operator::BitAnd,
                    line,
                )),
                line,
            ),
            return_int("0", line + 1),
        ]
    };

    // normal mode warns and proceeds
    Compiler::new(Mode::Normal)
        .generate_asm(
            Path::new("test.sin"),
            &[function("f", int_type(), Vec::new(), body(2))],
            &mut NoFrontEnd,
        )
        .expect("normal mode only warns");

    // strict mode raises the width mismatch
    let err = Compiler::new(Mode::Strict)
        .generate_asm(
            Path::new("test.sin"),
            &[function("g", int_type(), Vec::new(), body(2))],
            &mut NoFrontEnd,
        )
        .expect_err("strict mode promotes the warning");
    assert_eq!(err.code(), codes::WIDTH_MISMATCH);
}

#[test]
fn function_without_return_on_all_paths_is_rejected() {
    let body = vec![Statement::IfThenElse {
        condition: Expression::literal(DataType::simple(Primary::Bool), "true", 2),
        if_branch: Box::new(Statement::ScopedBlock {
            statements: vec![return_int("1", 3)],
            line: 2,
        }),
        else_branch: None,
        line: 2,
    }];
    let err = compile_err(vec![function("f", int_type(), Vec::new(), body)]);
    assert_eq!(err.code(), codes::NO_RETURN);
}

#[test]
fn referenced_before_initialization_is_an_error() {
    let body = vec![
        alloc("x", int_type(), None, 2),
        alloc("y", int_type(), Some(Expression::identifier("x", 3)), 3),
        return_int("0", 4),
    ];
    let err = compile_err(vec![function("f", int_type(), Vec::new(), body)]);
    assert_eq!(err.code(), codes::REFERENCED_BEFORE_INITIALIZATION);
}

#[test]
fn assignment_to_const_is_rejected() {
    let const_int = DataType::with_qualities(Primary::Int, qualities(&[Quality::Const]));
    let body = vec![
        alloc("k", const_int, Some(int_literal("1", 2).constant()), 2),
        Statement::Assignment(Assignment {
            lvalue: Expression::identifier("k", 3),
            rvalue: int_literal("2", 3),
            line: 3,
        }),
        return_int("0", 4),
    ];
    let err = compile_err(vec![function("f", int_type(), Vec::new(), body)]);
    assert_eq!(err.code(), codes::CONST_ASSIGNMENT);
}

//! Law-style checks over the public table and type APIs: mangling round
//! trips, compatibility symmetry, width determinism, and duplicate handling.

use std::path::Path;

use sinc::ast::{Allocation, Expression, FunctionDefinition, Parameter, Statement};
use sinc::compiler::Compiler;
use sinc::error::codes;
use sinc::frontend::NoFrontEnd;
use sinc::options::Mode;
use sinc::symbols::{GLOBAL_SCOPE, Symbol, SymbolTable};
use sinc::types::{DataType, Primary, Qualities, Quality};

fn int_type() -> DataType {
    DataType::simple(Primary::Int)
}

#[test]
fn find_after_insert_holds_for_arbitrary_scopes() {
    for scope in [GLOBAL_SCOPE, "main", "deeply_nested_helper"] {
        let mut table = SymbolTable::new();
        let mut offset = 0;
        let sym = Symbol::allocate("value", int_type(), 4, scope, 1, &mut offset, true, 1);
        let key = table.insert(sym, 1).expect("first insert succeeds");

        let found = table.find("value", scope).expect("lookup by raw name");
        assert_eq!(found.name(), key);
    }
}

#[test]
fn extern_names_pass_through_unmangled() {
    let mut offset = 0;
    let extern_q = Qualities::from_list(&[Quality::Extern], 0).unwrap();
    let sym = Symbol::allocate(
        "puts",
        DataType::with_qualities(Primary::Int, extern_q),
        0,
        GLOBAL_SCOPE,
        0,
        &mut offset,
        true,
        1,
    );
    assert_eq!(sym.name(), "puts");

    let mut table = SymbolTable::new();
    table.insert(sym, 1).unwrap();
    assert!(table.find("puts", GLOBAL_SCOPE).is_ok());
}

#[test]
fn compatibility_laws() {
    let int = int_type();
    let raw = DataType::simple(Primary::Raw);
    let string = DataType::simple(Primary::String);
    let int_array = DataType::array_of(int.clone(), Qualities::new(), None);
    let string_array = DataType::array_of(string.clone(), Qualities::new(), None);
    let int_ptr = DataType::with_subtype(Primary::Ptr, int.clone(), Qualities::new());
    let string_ptr = DataType::with_subtype(Primary::Ptr, string.clone(), Qualities::new());

    let all = [&int, &raw, &string, &int_array, &string_array, &int_ptr, &string_ptr];

    // symmetry, and raw is compatible with everything
    for a in all {
        for b in all {
            assert_eq!(a.is_compatible(b), b.is_compatible(a));
        }
        assert!(a.is_compatible(&raw));
    }

    // array compatibility follows the subtypes
    assert_eq!(
        int_array.is_compatible(&string_array),
        int.is_compatible(&string)
    );
    assert!(int_array.is_compatible(&int));
    assert!(!int_ptr.is_compatible(&string_ptr));
}

#[test]
fn width_is_a_pure_function_of_the_type() {
    let a = DataType::with_qualities(
        Primary::Int,
        Qualities::from_list(&[Quality::Long], 0).unwrap(),
    );
    let b = DataType::with_qualities(
        Primary::Int,
        Qualities::from_list(&[Quality::Long], 0).unwrap(),
    );
    assert_eq!(a.width(), b.width());

    let mut arr_a = DataType::array_of(int_type(), Qualities::new(), None);
    let mut arr_b = DataType::array_of(int_type(), Qualities::new(), None);
    arr_a.set_array_length(5);
    arr_b.set_array_length(5);
    assert_eq!(arr_a.width(), arr_b.width());
    assert_eq!(arr_a.width(), 4 + 5 * 4);
}

#[test]
fn duplicate_function_definition_is_rejected() {
    let make = || {
        Statement::FunctionDefinition(FunctionDefinition {
            name: "twice".to_string(),
            return_type: int_type(),
            formal_parameters: vec![Parameter::new("a", int_type(), 1)],
            procedure: vec![Statement::Return {
                value: Expression::literal(int_type(), "0", 2),
                line: 2,
            }],
            line: 1,
        })
    };
    let err = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &[make(), make()], &mut NoFrontEnd)
        .expect_err("second definition must fail");
    assert_eq!(err.code(), codes::DUPLICATE_DEFINITION);
}

#[test]
fn duplicate_global_variable_is_rejected() {
    let make = |line| {
        Statement::Allocation(Allocation {
            name: "x".to_string(),
            data_type: int_type(),
            initial_value: Some(Expression::literal(int_type(), "1", line)),
            line,
        })
    };
    let err = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &[make(1), make(2)], &mut NoFrontEnd)
        .expect_err("duplicate symbol must fail");
    assert_eq!(err.code(), codes::DUPLICATE_SYMBOL);
}

#[test]
fn struct_redefinition_is_rejected() {
    let make = || Statement::StructDefinition {
        name: "pair".to_string(),
        procedure: vec![Statement::Allocation(Allocation {
            name: "first".to_string(),
            data_type: int_type(),
            initial_value: None,
            line: 2,
        })],
        line: 1,
    };
    let err = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &[make(), make()], &mut NoFrontEnd)
        .expect_err("struct redefinition must fail");
    assert_eq!(err.code(), codes::DUPLICATE_DEFINITION);
}

#[test]
fn const_and_final_conflict_names_the_second_quality() {
    let err = Qualities::from_list(&[Quality::Const, Quality::Final], 7).unwrap_err();
    assert_eq!(err.code(), codes::QUALITY_CONFLICT);
    assert!(err.message().contains("final"));
    assert_eq!(err.line(), 7);

    let err = Qualities::from_list(&[Quality::Final, Quality::Const], 7).unwrap_err();
    assert!(err.message().contains("const"));
}

#[test]
fn non_const_array_length_is_rejected() {
    let length = Expression::identifier("n", 2); // not marked const
    let array_type = DataType::array_of(int_type(), Qualities::new(), Some(length));
    let ast = vec![
        Statement::FunctionDefinition(FunctionDefinition {
            name: "f".to_string(),
            return_type: int_type(),
            formal_parameters: Vec::new(),
            procedure: vec![
                Statement::Allocation(Allocation {
                    name: "arr".to_string(),
                    data_type: array_type,
                    initial_value: None,
                    line: 2,
                }),
                Statement::Return {
                    value: Expression::literal(int_type(), "0", 3),
                    line: 3,
                },
            ],
            line: 1,
        }),
    ];
    let err = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
        .expect_err("non-const length must fail");
    assert_eq!(err.code(), codes::TYPE_VALIDITY_RULE_VIOLATION);
}

#[test]
fn const_array_length_folds_through_the_evaluator() {
    let length = Expression::binary(
        Expression::literal(int_type(), "2", 2).constant(),
        Expression::literal(int_type(), "3", 2).constant(),
        sinc::ast::Operator::Mult,
        2,
    )
    .constant();
    let array_type = DataType::array_of(int_type(), Qualities::new(), Some(length));
    let ast = vec![Statement::FunctionDefinition(FunctionDefinition {
        name: "f".to_string(),
        return_type: int_type(),
        formal_parameters: Vec::new(),
        procedure: vec![
            Statement::Allocation(Allocation {
                name: "arr".to_string(),
                data_type: array_type,
                initial_value: None,
                line: 2,
            }),
            Statement::Return {
                value: Expression::literal(int_type(), "0", 3),
                line: 3,
            },
        ],
        line: 1,
    })];
    let asm = Compiler::new(Mode::Normal)
        .generate_asm(Path::new("test.sin"), &ast, &mut NoFrontEnd)
        .expect("const length compiles");

    // 6 elements of 4 bytes plus the length prefix
    assert!(asm.contains("sub rsp, 28"), "expected a 28-byte slot:\n{asm}");
}

use std::sync::mpsc::Receiver;
use std::sync::Arc;
use wacc_codegen::ast::{BinaryOp, Expr, Function, Param, Program, Rhs, Stmt, Type};
use wacc_codegen::backend::abi::Reg;
use wacc_codegen::backend::expr::weight;
use wacc_codegen::backend::helpers::HelperPool;
use wacc_codegen::backend::instruction::{Instr, InstrSink};
use wacc_codegen::backend::regalloc::RegAllocator;
use wacc_codegen::backend::stmt::lower_stmt;
use wacc_codegen::backend::strings::StringPool;
use wacc_codegen::compile_to_arm;

fn fresh_alloc(name: &str) -> RegAllocator {
    RegAllocator::new(
        name,
        Arc::new(StringPool::new()),
        Arc::new(HelperPool::new()),
    )
}

fn drain(sink: InstrSink, rx: Receiver<Instr>) -> Vec<String> {
    drop(sink);
    rx.iter().map(|i| i.to_string()).collect()
}

// ── Register pool discipline ─────────────────────────────────────────────

#[test]
fn registers_rotate_through_the_pool() {
    let (sink, rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    let handed: Vec<Reg> = (0..8).map(|_| alloc.get_reg(&sink)).collect();
    assert_eq!(handed, Reg::POOL.to_vec());

    // No spills yet: nothing was emitted.
    for reg in handed.into_iter().rev() {
        alloc.free_reg(reg, &sink);
    }
    assert!(drain(sink, rx).is_empty());
}

#[test]
fn ninth_request_spills_and_free_reloads() {
    let (sink, rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    let mut handed = Vec::new();
    for _ in 0..9 {
        handed.push(alloc.get_reg(&sink));
    }
    // The rotation wraps: the ninth register is r4 again, spilled first.
    assert_eq!(handed[8], Reg::R4);
    assert_eq!(alloc.stack_size(), 4);

    for reg in handed.into_iter().rev() {
        alloc.free_reg(reg, &sink);
    }
    assert_eq!(alloc.stack_size(), 0);

    let emitted = drain(sink, rx);
    assert_eq!(emitted, vec!["\tPUSH {r4}", "\tPOP {r4}"]);
}

#[test]
#[should_panic(expected = "register free order mismatch")]
fn out_of_order_free_fails_fast() {
    let (sink, _rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    let first = alloc.get_reg(&sink);
    let _second = alloc.get_reg(&sink);
    alloc.free_reg(first, &sink);
}

// ── Scopes and stack bookkeeping ─────────────────────────────────────────

#[test]
fn declared_variables_resolve_relative_to_sp() {
    let (sink, _rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    alloc.start_scope();
    alloc.declare_var("x", &sink);
    alloc.declare_var("y", &sink);

    // The most recent declaration sits at the stack pointer.
    assert_eq!(alloc.resolve_var("y"), 0);
    assert_eq!(alloc.resolve_var("x"), 4);
    assert_eq!(alloc.stack_size(), 8);
}

#[test]
fn inner_scopes_shadow_and_unwind() {
    let (sink, _rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    alloc.start_scope();
    alloc.declare_var("x", &sink);

    alloc.start_scope();
    alloc.declare_var("x", &sink);
    assert_eq!(alloc.resolve_var("x"), 0);

    alloc.cleanup_scope(&sink);
    assert_eq!(alloc.resolve_var("x"), 0);
    assert_eq!(alloc.stack_size(), 4);
}

#[test]
#[should_panic(expected = "not found in scope")]
fn unknown_variable_fails_fast() {
    let (_sink, _rx) = InstrSink::collector();
    let alloc = fresh_alloc("f");
    alloc.resolve_var("ghost");
}

#[test]
fn large_scope_cleanup_splits_sp_adjustment() {
    let (sink, rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");

    alloc.start_scope();
    for i in 0..70 {
        alloc.declare_var(&format!("v{i}"), &sink);
    }
    alloc.cleanup_scope(&sink);
    assert_eq!(alloc.stack_size(), 0);

    let emitted = drain(sink, rx);
    // 280 bytes reclaimed in imm8-legal chunks.
    assert!(emitted.contains(&"\tADD sp, sp, #255".to_string()));
    assert!(emitted.contains(&"\tADD sp, sp, #25".to_string()));
}

// ── Statement stack neutrality ───────────────────────────────────────────

fn assert_neutral(stmt: Stmt, expected_delta: i32) {
    let (sink, _rx) = InstrSink::collector();
    let mut alloc = fresh_alloc("f");
    alloc.start_scope();

    let before = alloc.stack_size();
    lower_stmt(&stmt, &mut alloc, &sink);
    assert_eq!(
        alloc.stack_size() - before,
        expected_delta,
        "stack delta for {stmt:?}"
    );
}

#[test]
fn statements_leave_the_stack_where_they_found_it() {
    assert_neutral(Stmt::Skip, 0);
    assert_neutral(Stmt::Exit(Expr::IntLiteral(1)), 0);
    assert_neutral(Stmt::Println(Expr::IntLiteral(1)), 0);
    assert_neutral(
        Stmt::Print(Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::IntLiteral(1)),
            rhs: Box::new(Expr::IntLiteral(2)),
        }),
        0,
    );
    assert_neutral(
        Stmt::If {
            cond: Expr::BoolLiteral(true),
            then_body: vec![Stmt::Skip],
            else_body: vec![Stmt::Skip],
        },
        0,
    );
    assert_neutral(
        Stmt::While { cond: Expr::BoolLiteral(false), body: vec![Stmt::Skip] },
        0,
    );
    assert_neutral(
        Stmt::Block(vec![Stmt::Declare {
            ty: Type::Int,
            name: "x".to_string(),
            rhs: Rhs::Expr(Expr::IntLiteral(1)),
        }]),
        0,
    );
}

#[test]
fn declare_grows_the_stack_by_one_slot() {
    assert_neutral(
        Stmt::Declare {
            ty: Type::Int,
            name: "x".to_string(),
            rhs: Rhs::Expr(Expr::IntLiteral(1)),
        },
        4,
    );
}

// ── Operand weights ──────────────────────────────────────────────────────

fn bin(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
}

#[test]
fn leaf_weights_are_one() {
    assert_eq!(weight(&Expr::IntLiteral(7)), 1);
    assert_eq!(weight(&Expr::BoolLiteral(true)), 1);
    assert_eq!(weight(&Expr::NullPair), 1);
    assert_eq!(
        weight(&Expr::Ident { name: "x".to_string(), ty: Type::Int }),
        1
    );
}

#[test]
fn binary_weights_follow_the_min_max_rule() {
    let two = bin(BinaryOp::Mul, Expr::IntLiteral(2), Expr::IntLiteral(3));
    assert_eq!(weight(&two), 2);

    // A leaf against a heavier subtree still needs only the subtree's
    // registers when the heavy side runs first.
    let balanced = bin(BinaryOp::Add, Expr::IntLiteral(1), two.clone());
    assert_eq!(weight(&balanced), 2);

    let deep = bin(BinaryOp::Sub, two.clone(), balanced);
    assert_eq!(weight(&deep), 3);
}

#[test]
fn unary_weight_inherits_the_operand() {
    let negated = Expr::Unary {
        op: wacc_codegen::ast::UnaryOp::Negate,
        expr: Box::new(bin(BinaryOp::Add, Expr::IntLiteral(1), Expr::IntLiteral(2))),
    };
    assert_eq!(weight(&negated), 2);
}

// ── Whole-program invariants ─────────────────────────────────────────────

fn sample_program() -> Program {
    let n = || Expr::Ident { name: "n".to_string(), ty: Type::Int };
    Program {
        functions: vec![Function {
            return_ty: Some(Type::Int),
            name: "f".to_string(),
            params: vec![Param { ty: Type::Int, name: "n".to_string() }],
            body: vec![Stmt::If {
                cond: bin(BinaryOp::Eq, n(), Expr::IntLiteral(0)),
                then_body: vec![Stmt::Return(Expr::IntLiteral(1))],
                else_body: vec![
                    Stmt::Declare {
                        ty: Type::Int,
                        name: "rec".to_string(),
                        rhs: Rhs::Call {
                            name: "f".to_string(),
                            args: vec![bin(BinaryOp::Sub, n(), Expr::IntLiteral(1))],
                        },
                    },
                    Stmt::Return(bin(
                        BinaryOp::Mul,
                        n(),
                        Expr::Ident { name: "rec".to_string(), ty: Type::Int },
                    )),
                ],
            }],
        }],
        main: vec![
            Stmt::Declare {
                ty: Type::Int,
                name: "r".to_string(),
                rhs: Rhs::Call { name: "f".to_string(), args: vec![Expr::IntLiteral(6)] },
            },
            Stmt::While {
                cond: bin(
                    BinaryOp::Gt,
                    Expr::Ident { name: "r".to_string(), ty: Type::Int },
                    Expr::IntLiteral(0),
                ),
                body: vec![Stmt::Println(Expr::Ident {
                    name: "r".to_string(),
                    ty: Type::Int,
                })],
            },
            Stmt::If {
                cond: Expr::BoolLiteral(true),
                then_body: vec![Stmt::Println(Expr::StrLiteral("done".to_string()))],
                else_body: vec![Stmt::Skip],
            },
        ],
    }
}

#[test]
fn every_label_is_unique() {
    let asm = compile_to_arm(&sample_program());
    let mut seen = std::collections::HashSet::new();
    for line in asm.lines() {
        if let Some(label) = line.strip_suffix(':') {
            if !line.starts_with('\t') {
                assert!(seen.insert(label.to_string()), "duplicate label {label}");
            }
        }
    }
}

#[test]
fn every_branched_to_helper_is_defined_once() {
    let asm = compile_to_arm(&sample_program());
    for line in asm.lines() {
        let target = match line.trim_start().strip_prefix("BL") {
            Some(rest) => rest.split_whitespace().last().unwrap_or(""),
            None => continue,
        };
        if target.starts_with("p_") {
            let count = asm
                .lines()
                .filter(|l| *l == format!("{target}:"))
                .count();
            assert_eq!(count, 1, "helper {target} defined {count} times");
        }
    }
}

#[test]
fn every_message_reference_is_backed_by_data() {
    let asm = compile_to_arm(&sample_program());
    for line in asm.lines() {
        if let Some(pos) = line.find("=msg_") {
            let label: String = line[pos + 1..]
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            assert!(
                asm.contains(&format!("{label}:")),
                "reference to undefined {label}"
            );
        }
    }

    // Data entries come as label/word/ascii triples.
    let lines: Vec<&str> = asm.lines().collect();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("msg_") && line.ends_with(':') {
            assert!(lines[i + 1].starts_with("\t.word "));
            assert!(lines[i + 2].starts_with("\t.ascii "));
        }
    }
}

#[test]
fn data_section_precedes_text_section() {
    let asm = compile_to_arm(&sample_program());
    let data = asm.find(".data").expect("missing .data");
    let text = asm.find(".text").expect("missing .text");
    assert!(data < text);

    let global = asm.find(".global main").expect("missing .global");
    assert!(text < global);
}

#[test]
fn helpers_are_emitted_after_all_procedures() {
    let asm = compile_to_arm(&sample_program());
    let main_label = asm.find("\nmain:").expect("missing main");
    let helper = asm.find("p_print_int:").expect("missing print helper");
    assert!(main_label < helper);
}

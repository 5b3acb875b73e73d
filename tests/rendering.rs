use wacc_codegen::backend::abi::Reg;
use wacc_codegen::backend::instruction::{Cond, Instr, LoadOperand, MemRef, Operand, Shift};
use wacc_codegen::backend::strings::StringPool;

// ── Instruction rendering ────────────────────────────────────────────────
// Every instruction renders to exactly one line of ARM assembly.

#[test]
fn mov_renders_immediate_and_register() {
    assert_eq!(Instr::mov_imm(Reg::R0, 0).to_string(), "\tMOV r0, #0");
    assert_eq!(Instr::mov_reg(Reg::R1, Reg::R0).to_string(), "\tMOV r1, r0");
}

#[test]
fn conditional_mov_suffixes_mnemonic() {
    let instr = Instr::mov_cond(Cond::Gt, Reg::R4, Operand::Imm(1));
    assert_eq!(instr.to_string(), "\tMOVGT r4, #1");
}

#[test]
fn char_operand_renders_quoted() {
    assert_eq!(
        Instr::mov(Reg::R4, Operand::Char('a')).to_string(),
        "\tMOV r4, #'a'"
    );
    assert_eq!(
        Instr::mov(Reg::R4, Operand::Char('\n')).to_string(),
        "\tMOV r4, #'\\n'"
    );
    assert_eq!(
        Instr::mov(Reg::R4, Operand::Char('\0')).to_string(),
        "\tMOV r4, #'\\0'"
    );
}

#[test]
fn ldr_renders_all_source_forms() {
    assert_eq!(
        Instr::ldr_const(Reg::R4, 42).to_string(),
        "\tLDR r4, =42"
    );
    assert_eq!(
        Instr::ldr_label(Reg::R0, "msg_0").to_string(),
        "\tLDR r0, =msg_0"
    );
    assert_eq!(
        Instr::ldr_mem(Reg::R4, Reg::Sp, 8).to_string(),
        "\tLDR r4, [sp, #8]"
    );
    assert_eq!(
        Instr::ldr_mem(Reg::R4, Reg::R4, 0).to_string(),
        "\tLDR r4, [r4]"
    );
    assert_eq!(
        Instr::ldr_cond_label(Cond::Eq, Reg::R0, "msg_1").to_string(),
        "\tLDREQ r0, =msg_1"
    );
}

#[test]
fn str_renders_memory_reference() {
    assert_eq!(
        Instr::str_mem(Reg::R5, Reg::Sp, 4).to_string(),
        "\tSTR r5, [sp, #4]"
    );
    assert_eq!(
        Instr::str_mem(Reg::R5, Reg::R4, 0).to_string(),
        "\tSTR r5, [r4]"
    );
}

#[test]
fn flag_setting_arithmetic_gets_s_suffix() {
    assert_eq!(
        Instr::adds(Reg::R4, Reg::R5, Operand::Reg(Reg::R4)).to_string(),
        "\tADDS r4, r5, r4"
    );
    assert_eq!(
        Instr::add(Reg::Sp, Reg::Sp, Operand::Imm(4)).to_string(),
        "\tADD sp, sp, #4"
    );
    assert_eq!(
        Instr::subs(Reg::R4, Reg::R4, Operand::Imm(1)).to_string(),
        "\tSUBS r4, r4, #1"
    );
    assert_eq!(
        Instr::rsbs(Reg::R4, Reg::R4, Operand::Imm(0)).to_string(),
        "\tRSBS r4, r4, #0"
    );
}

#[test]
fn shifted_register_operands() {
    let indexed = Instr::add(
        Reg::R0,
        Reg::R0,
        Operand::RegShift { reg: Reg::R1, shift: Shift::Lsl, amount: 2 },
    );
    assert_eq!(indexed.to_string(), "\tADD r0, r0, r1, LSL #2");

    let sign_check = Instr::cmp(
        Reg::R5,
        Operand::RegShift { reg: Reg::R4, shift: Shift::Asr, amount: 31 },
    );
    assert_eq!(sign_check.to_string(), "\tCMP r5, r4, ASR #31");
}

#[test]
fn smull_renders_four_registers() {
    let instr = Instr::Smull { rd_lo: Reg::R4, rd_hi: Reg::R5, rm: Reg::R4, rs: Reg::R5 };
    assert_eq!(instr.to_string(), "\tSMULL r4, r5, r4, r5");
}

#[test]
fn branches_carry_conditions() {
    assert_eq!(Instr::b("end_main_0").to_string(), "\tB end_main_0");
    assert_eq!(
        Instr::b_cond(Cond::Eq, "else_main_1").to_string(),
        "\tBEQ else_main_1"
    );
    assert_eq!(Instr::bl("exit").to_string(), "\tBL exit");
    assert_eq!(
        Instr::bl_cond(Cond::Vs, "p_throw_overflow_error").to_string(),
        "\tBLVS p_throw_overflow_error"
    );
}

#[test]
fn stack_instructions_render_register_lists() {
    assert_eq!(Instr::push1(Reg::Lr).to_string(), "\tPUSH {lr}");
    assert_eq!(
        Instr::pop(vec![Reg::R4, Reg::R5]).to_string(),
        "\tPOP {r4, r5}"
    );
    assert_eq!(
        Instr::push(Reg::POOL.to_vec()).to_string(),
        "\tPUSH {r4, r5, r6, r7, r8, r9, r10, r11}"
    );
}

#[test]
fn labels_and_directives() {
    assert_eq!(Instr::label("main").to_string(), "main:");
    assert_eq!(Instr::Ltorg.to_string(), "\t.ltorg");
    assert_eq!(Instr::DataSeg.to_string(), ".data");
    assert_eq!(Instr::TextSeg.to_string(), ".text");
    assert_eq!(Instr::Global("main".to_string()).to_string(), ".global main");
    assert_eq!(Instr::DataWord(5).to_string(), "\t.word 5");
    assert_eq!(
        Instr::DataAscii("%d\\0".to_string()).to_string(),
        "\t.ascii \"%d\\0\""
    );
}

#[test]
fn memory_reference_omits_zero_offset() {
    assert_eq!(MemRef { reg: Reg::R1, offset: 0 }.to_string(), "[r1]");
    assert_eq!(MemRef { reg: Reg::Sp, offset: 56 }.to_string(), "[sp, #56]");
    assert_eq!(
        LoadOperand::Mem(MemRef { reg: Reg::Sp, offset: -4 }).to_string(),
        "[sp, #-4]"
    );
}

// ── Condition codes ──────────────────────────────────────────────────────

#[test]
fn condition_complements_are_involutions() {
    let all = [
        Cond::Al,
        Cond::Eq,
        Cond::Ne,
        Cond::Lt,
        Cond::Le,
        Cond::Gt,
        Cond::Ge,
        Cond::Vs,
        Cond::Vc,
        Cond::Cs,
        Cond::Cc,
    ];
    for cond in all {
        assert_eq!(cond.opposite().opposite(), cond);
    }
    assert_eq!(Cond::Eq.opposite(), Cond::Ne);
    assert_eq!(Cond::Lt.opposite(), Cond::Ge);
    assert_eq!(Cond::Gt.opposite(), Cond::Le);
    assert_eq!(Cond::Al.opposite(), Cond::Al);
}

// ── String pool ──────────────────────────────────────────────────────────

fn pool_text(pool: &StringPool) -> String {
    let mut out = Vec::new();
    pool.emit(&mut out);
    out.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

#[test]
fn lookup8_stores_raw_bytes_with_byte_length() {
    let pool = StringPool::new();
    let label = pool.lookup8("%d\\0");
    assert_eq!(label, "msg_0");

    let text = pool_text(&pool);
    assert!(text.contains("msg_0:"));
    assert!(text.contains("\t.word 4"));
    assert!(text.contains("\t.ascii \"%d\\0\""));
}

#[test]
fn lookup32_widens_each_character() {
    let pool = StringPool::new();
    let label = pool.lookup32("ab");
    assert_eq!(label, "msg_0");

    let text = pool_text(&pool);
    assert!(text.contains("\t.word 2"));
    assert!(text.contains("\t.ascii \"a\\000\\000\\000b\\000\\000\\000\""));
}

#[test]
fn lookup32_passes_backslashes_through_unwidened() {
    let pool = StringPool::new();
    pool.lookup32("a\\n");

    let text = pool_text(&pool);
    // Three source bytes, one of them a backslash: logical length 2, and
    // the escape sequence stays contiguous.
    assert!(text.contains("\t.word 2"));
    assert!(text.contains("\t.ascii \"a\\000\\000\\000\\n\\000\\000\\000\""));
}

#[test]
fn identical_payloads_share_one_entry() {
    let pool = StringPool::new();
    let a = pool.lookup8("%d\\0");
    let b = pool.lookup8("%d\\0");
    assert_eq!(a, b);
    assert_eq!(pool.len(), 1);
}

#[test]
fn different_encodings_get_distinct_labels() {
    let pool = StringPool::new();
    let raw = pool.lookup8("a");
    let wide = pool.lookup32("a");
    assert_ne!(raw, wide);
    assert_eq!(pool.len(), 2);
}

#[test]
fn labels_are_stable_and_insertion_ordered() {
    let pool = StringPool::new();
    assert_eq!(pool.lookup8("one"), "msg_0");
    assert_eq!(pool.lookup8("two"), "msg_1");
    assert_eq!(pool.lookup8("one"), "msg_0");

    let text = pool_text(&pool);
    let one = text.find("\"one\"").unwrap();
    let two = text.find("\"two\"").unwrap();
    assert!(one < two);
}

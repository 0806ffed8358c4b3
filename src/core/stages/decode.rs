//! Stage 1: decode and register fetch.
//!
//! Operand fetch forwards from the younger latches ahead of the
//! register file, in priority order. A fetch that can only be satisfied
//! by a load still two stages away either stalls decode or, for
//! operands that tolerate it, is deferred to Execute.

use crate::core::latch::{FetchTarget, ResultStage};
use crate::core::stages::StageCtx;
use crate::core::{
    NpcSource, PcUpdate, Shared, STAGE_DECODE, STAGE_EXECUTE, STAGE_FETCH, STAGE_MEMORY,
    STAGE_WRITEBACK,
};
use crate::isa::{funct, op, regimm, InstructionWord, REG_HI, REG_LO, REG_RA, SYSCALL_HANDLER_ADDRESS};

pub(crate) fn run(shared: &Shared) {
    let mut ctx = StageCtx::new(shared);
    ctx.take_input(STAGE_DECODE);

    let (inst, pc) = {
        let latch = &ctx.st().out_latch[STAGE_DECODE];
        (latch.inst, latch.pc)
    };

    if inst.is_nop() {
        ctx.finish(STAGE_DECODE);
        return;
    }

    if ctx.st().trace {
        eprintln!("[ID ] {:#010x} at {pc:#x}", inst.0);
    }

    let done = match inst.op() {
        op::ZERO => decode_special(&mut ctx, inst, pc),
        op::ONE => decode_regimm(&mut ctx, inst, pc),
        op::J => {
            update_pc(&mut ctx, inst.target().wrapping_mul(4) as i32, PcUpdate::Absolute);
            true
        }
        op::JAL => {
            set_result(&mut ctx, ResultStage::AtDecode, Some(REG_RA), None);
            ctx.st().out_latch[STAGE_DECODE].decode_result = pc.wrapping_add(4) as i32;
            update_pc(&mut ctx, inst.target().wrapping_mul(4) as i32, PcUpdate::Absolute);
            true
        }
        // BEQ and BNE need both operands and resolve in Execute.
        op::BEQ | op::BNE => {
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm().wrapping_mul(4);
            register_fetch(&mut ctx, FetchTarget::OperandA, inst.rs(), false)
                && register_fetch(&mut ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        // Single-operand branches resolve right here.
        op::BLEZ => branch_on_rs(&mut ctx, inst, |a| a <= 0),
        op::BGTZ => branch_on_rs(&mut ctx, inst, |a| a > 0),
        op::ADDI | op::SLTI | op::ANDI | op::ORI | op::XORI => {
            set_result(&mut ctx, ResultStage::AtExecute, Some(inst.rt()), None);
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm();
            register_fetch(&mut ctx, FetchTarget::OperandA, inst.rs(), false)
        }
        op::LUI => {
            set_result(&mut ctx, ResultStage::AtExecute, Some(inst.rt()), None);
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm().wrapping_shl(16);
            register_fetch(&mut ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        op::LW => {
            set_result(&mut ctx, ResultStage::AtMemory, Some(inst.rt()), None);
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm();
            register_fetch(&mut ctx, FetchTarget::OperandA, inst.rs(), false)
        }
        op::SW => {
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm();
            register_fetch(&mut ctx, FetchTarget::OperandA, inst.rs(), false)
                && register_fetch(&mut ctx, FetchTarget::OperandB, inst.rt(), true)
        }
        // Device input addressed by the immediate; nothing to fetch.
        op::DIN => {
            set_result(&mut ctx, ResultStage::AtMemory, Some(inst.rt()), None);
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm();
            true
        }
        op::DOUT => {
            ctx.st().out_latch[STAGE_DECODE].imm = inst.imm();
            register_fetch(&mut ctx, FetchTarget::OperandA, inst.rs(), true)
        }
        other => {
            eprintln!("[ID ] unknown opcode {other:#x} at {pc:#x}, dropped as a bubble");
            true
        }
    };

    if done {
        ctx.finish(STAGE_DECODE);
    }
}

fn decode_special(ctx: &mut StageCtx, inst: InstructionWord, pc: u32) -> bool {
    match inst.funct() {
        funct::SLL | funct::SRL | funct::SRA => {
            set_result(ctx, ResultStage::AtExecute, Some(inst.rd()), None);
            ctx.st().out_latch[STAGE_DECODE].a = inst.shamt() as i32;
            register_fetch(ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        funct::SLLV | funct::SRLV | funct::SRAV => {
            set_result(ctx, ResultStage::AtExecute, Some(inst.rd()), None);
            register_fetch(ctx, FetchTarget::OperandB, inst.rt(), false)
                && register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false)
        }
        // Target comes from rs; the redirect happens in Execute.
        funct::JR => register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false),
        funct::JALR => {
            set_result(ctx, ResultStage::AtDecode, Some(inst.rd()), None);
            ctx.st().out_latch[STAGE_DECODE].decode_result = pc.wrapping_add(4) as i32;
            register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false)
        }
        funct::SYSCALL => {
            set_result(ctx, ResultStage::AtDecode, Some(REG_RA), None);
            ctx.st().out_latch[STAGE_DECODE].decode_result = pc.wrapping_add(4) as i32;
            update_pc(ctx, SYSCALL_HANDLER_ADDRESS as i32, PcUpdate::Absolute);
            true
        }
        funct::MFHI => {
            set_result(ctx, ResultStage::AtDecode, Some(inst.rd()), None);
            register_fetch(ctx, FetchTarget::DecodeResult, REG_HI, false)
        }
        funct::MFLO => {
            set_result(ctx, ResultStage::AtDecode, Some(inst.rd()), None);
            register_fetch(ctx, FetchTarget::DecodeResult, REG_LO, false)
        }
        funct::MTHI => {
            set_result(ctx, ResultStage::AtDecode, Some(REG_HI), None);
            register_fetch(ctx, FetchTarget::DecodeResult, inst.rs(), false)
        }
        funct::MTLO => {
            set_result(ctx, ResultStage::AtDecode, Some(REG_LO), None);
            register_fetch(ctx, FetchTarget::DecodeResult, inst.rs(), false)
        }
        funct::MULT | funct::DIV => {
            set_result(ctx, ResultStage::AtExecute, Some(REG_LO), Some(REG_HI));
            register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false)
                && register_fetch(ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        funct::ADD
        | funct::SUB
        | funct::AND
        | funct::OR
        | funct::XOR
        | funct::NOR
        | funct::SLT => {
            set_result(ctx, ResultStage::AtExecute, Some(inst.rd()), None);
            register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false)
                && register_fetch(ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        funct::RDIN => {
            set_result(ctx, ResultStage::AtMemory, Some(inst.rd()), None);
            register_fetch(ctx, FetchTarget::OperandB, inst.rt(), false)
        }
        funct::RDOUT => {
            register_fetch(ctx, FetchTarget::OperandB, inst.rt(), true)
                && register_fetch(ctx, FetchTarget::OperandA, inst.rs(), true)
        }
        other => {
            eprintln!("[ID ] unknown function code {other:#x} at {pc:#x}, dropped as a bubble");
            true
        }
    }
}

fn decode_regimm(ctx: &mut StageCtx, inst: InstructionWord, pc: u32) -> bool {
    match inst.rt() as u32 {
        regimm::BGEZ => branch_on_rs(ctx, inst, |a| a >= 0),
        regimm::BLTZ => branch_on_rs(ctx, inst, |a| a < 0),
        other => {
            eprintln!("[ID ] unknown branch selector {other:#x} at {pc:#x}, dropped as a bubble");
            true
        }
    }
}

/// Fetches rs and, when the branch condition holds, redirects fetch
/// straight from this stage.
fn branch_on_rs(ctx: &mut StageCtx, inst: InstructionWord, taken: impl Fn(i32) -> bool) -> bool {
    ctx.st().out_latch[STAGE_DECODE].imm = inst.imm().wrapping_mul(4);
    if !register_fetch(ctx, FetchTarget::OperandA, inst.rs(), false) {
        return false;
    }
    let (a, imm) = {
        let latch = &ctx.st().out_latch[STAGE_DECODE];
        (latch.a, latch.imm)
    };
    if taken(a) {
        update_pc(ctx, imm, PcUpdate::Relative);
    }
    true
}

fn set_result(
    ctx: &mut StageCtx,
    stage: ResultStage,
    targ: Option<usize>,
    targ2: Option<usize>,
) {
    let latch = &mut ctx.st().out_latch[STAGE_DECODE];
    latch.result_stage = stage;
    latch.targ_reg = targ;
    latch.targ_reg2 = targ2;
}

/// Where an operand value will come from, in forwarding priority order.
enum Source {
    Zero,
    ExDecode,
    ExDeferred,
    ExAlu,
    MemDecode,
    MemAlu,
    MemAluHi,
    MemLoad,
    RegFile,
}

/// Resolves one operand and stores it in the stage's output latch.
///
/// Returns false when the operand depends on an in-flight load and the
/// caller cannot tolerate a deferred fetch; the stage then leaves its
/// output unfinished and the clock inserts a bubble downstream.
fn register_fetch(ctx: &mut StageCtx, target: FetchTarget, reg: usize, no_fail: bool) -> bool {
    let source = {
        let st = ctx.st();
        let ex = &st.in_latch[STAGE_EXECUTE];
        let mem = &st.in_latch[STAGE_MEMORY];
        if reg == 0 {
            Source::Zero
        } else if ex.targ_reg == Some(reg) && ex.result_stage == ResultStage::AtDecode {
            Source::ExDecode
        } else if (ex.targ_reg == Some(reg) || ex.targ_reg2 == Some(reg))
            && ex.result_stage == ResultStage::AtMemory
        {
            Source::ExDeferred
        } else if (ex.targ_reg == Some(reg) || ex.targ_reg2 == Some(reg))
            && ex.result_stage == ResultStage::AtExecute
        {
            Source::ExAlu
        } else if mem.targ_reg == Some(reg) && mem.result_stage == ResultStage::AtDecode {
            Source::MemDecode
        } else if (mem.targ_reg == Some(reg) || mem.targ_reg2 == Some(reg))
            && mem.result_stage == ResultStage::AtExecute
        {
            if mem.targ_reg == Some(reg) {
                Source::MemAlu
            } else {
                Source::MemAluHi
            }
        } else if mem.targ_reg == Some(reg) && mem.result_stage == ResultStage::AtMemory {
            Source::MemLoad
        } else {
            Source::RegFile
        }
    };

    let value = match source {
        Source::Zero => 0,
        Source::ExDecode => ctx.st().in_latch[STAGE_EXECUTE].decode_result,
        Source::ExDeferred => {
            // The producer is a load still two stages from its data.
            if !no_fail {
                if ctx.st().trace {
                    eprintln!("[ID ] r{reg} pending a load, stalling");
                }
                return false;
            }
            let st = ctx.st();
            st.out_latch[STAGE_DECODE].fetch_incomplete = true;
            st.out_latch[STAGE_DECODE].fetch_failed_for = target;
            if st.trace {
                eprintln!("[ID ] r{reg} pending a load, fetch deferred to Execute");
            }
            return true;
        }
        Source::ExAlu => {
            ctx.wait_until(|s| s.out_latch[STAGE_EXECUTE].finished);
            let st = ctx.st();
            if st.in_latch[STAGE_EXECUTE].targ_reg == Some(reg) {
                st.out_latch[STAGE_EXECUTE].alu_out
            } else {
                st.out_latch[STAGE_EXECUTE].alu_out_hi
            }
        }
        Source::MemDecode => ctx.st().in_latch[STAGE_MEMORY].decode_result,
        Source::MemAlu => ctx.st().in_latch[STAGE_MEMORY].alu_out,
        Source::MemAluHi => ctx.st().in_latch[STAGE_MEMORY].alu_out_hi,
        Source::MemLoad => {
            ctx.wait_until(|s| s.out_latch[STAGE_MEMORY].finished);
            ctx.st().out_latch[STAGE_MEMORY].load_data
        }
        Source::RegFile => {
            ctx.wait_until(|s| s.out_latch[STAGE_WRITEBACK].finished);
            ctx.st().regs.read(reg)
        }
    };

    let st = ctx.st();
    match target {
        FetchTarget::OperandA => st.out_latch[STAGE_DECODE].a = value,
        FetchTarget::OperandB => st.out_latch[STAGE_DECODE].b = value,
        FetchTarget::DecodeResult => st.out_latch[STAGE_DECODE].decode_result = value,
    }
    if st.trace {
        eprintln!("[ID ] r{reg} = {value} ({value:#x})");
    }
    true
}

/// Redirects fetch from decode. A later redirect from Execute wins: the
/// wait lets Execute flush this stage first, in which case the request
/// is dropped.
fn update_pc(ctx: &mut StageCtx, value: i32, kind: PcUpdate) {
    let target = {
        let st = ctx.st();
        match kind {
            PcUpdate::Absolute => value as u32,
            PcUpdate::Relative => st.pc.wrapping_add(value as u32),
        }
    };
    if ctx.st().pc == target {
        // The target is already being fetched this cycle.
        return;
    }
    ctx.wait_until(|s| s.out_latch[STAGE_EXECUTE].finished);
    let st = ctx.st();
    if st.flush[STAGE_DECODE] {
        if st.trace {
            eprintln!("[ID ] redirect to {target:#x} cancelled by an Execute flush");
        }
        return;
    }
    st.flush[STAGE_FETCH] = true;
    st.pc_update_control(target, NpcSource::Decode);
}

//! Stage 2: execute.
//!
//! Runs the ALU, resolves the two-operand branches and register jumps,
//! and completes operand fetches that decode deferred behind an
//! in-flight load.

use crate::core::latch::{FetchTarget, ResultStage};
use crate::core::stages::StageCtx;
use crate::core::{
    NpcSource, PcUpdate, Shared, STAGE_DECODE, STAGE_EXECUTE, STAGE_FETCH, STAGE_MEMORY,
};
use crate::isa::{funct, op, InstructionWord};

pub(crate) fn run(shared: &Shared) {
    let mut ctx = StageCtx::new(shared);
    ctx.take_input(STAGE_EXECUTE);

    let (inst, a, b, imm, deferred) = {
        let latch = &ctx.st().out_latch[STAGE_EXECUTE];
        (latch.inst, latch.a, latch.b, latch.imm, latch.fetch_incomplete)
    };

    if inst.is_nop() {
        ctx.finish(STAGE_EXECUTE);
        return;
    }

    let done = match inst.op() {
        op::ZERO => execute_special(&mut ctx, inst, a, b, deferred),
        op::BEQ => {
            if a == b {
                update_pc(&mut ctx, imm, PcUpdate::Relative);
            }
            true
        }
        op::BNE => {
            if a != b {
                update_pc(&mut ctx, imm, PcUpdate::Relative);
            }
            true
        }
        op::ADDI => set_alu(&mut ctx, a.wrapping_add(imm)),
        op::SLTI => set_alu(&mut ctx, (a < imm) as i32),
        op::ANDI => set_alu(&mut ctx, a & imm),
        op::ORI => set_alu(&mut ctx, a | imm),
        op::XORI => set_alu(&mut ctx, a ^ imm),
        // The immediate already sits in the upper half; keep the low
        // half of rt.
        op::LUI => set_alu(&mut ctx, (b & 0xffff) | imm),
        op::LW => set_alu(&mut ctx, a.wrapping_add(imm)),
        op::SW => {
            set_alu(&mut ctx, a.wrapping_add(imm));
            if deferred {
                complete_deferred_fetch(&mut ctx, inst)
            } else {
                true
            }
        }
        op::DOUT => {
            if deferred {
                complete_deferred_fetch(&mut ctx, inst)
            } else {
                true
            }
        }
        // Branches resolved in decode, jumps taken in decode, and
        // device input all pass through idle.
        op::ONE | op::J | op::JAL | op::BLEZ | op::BGTZ | op::DIN => true,
        _ => true,
    };

    if done {
        ctx.finish(STAGE_EXECUTE);
    }
}

fn execute_special(
    ctx: &mut StageCtx,
    inst: InstructionWord,
    a: i32,
    b: i32,
    deferred: bool,
) -> bool {
    match inst.funct() {
        funct::SLL | funct::SLLV => set_alu(ctx, b.wrapping_shl(a as u32)),
        funct::SRL | funct::SRLV => set_alu(ctx, (b as u32).wrapping_shr(a as u32) as i32),
        funct::SRA | funct::SRAV => set_alu(ctx, b.wrapping_shr(a as u32)),
        funct::JR | funct::JALR => {
            update_pc(ctx, a, PcUpdate::Absolute);
            true
        }
        funct::MULT => {
            let product = a as i64 * b as i64;
            set_alu_pair(ctx, product as i32, (product >> 32) as i32)
        }
        funct::DIV => {
            if b == 0 {
                eprintln!("[EX ] division by zero at {:#x}, result forced to 0", ctx.st().out_latch[STAGE_EXECUTE].pc);
                set_alu_pair(ctx, 0, 0)
            } else {
                set_alu_pair(ctx, a.wrapping_div(b), a.wrapping_rem(b))
            }
        }
        funct::ADD => set_alu(ctx, a.wrapping_add(b)),
        funct::SUB => set_alu(ctx, a.wrapping_sub(b)),
        funct::AND => set_alu(ctx, a & b),
        funct::OR => set_alu(ctx, a | b),
        funct::XOR => set_alu(ctx, a ^ b),
        funct::NOR => set_alu(ctx, !(a | b)),
        funct::SLT => set_alu(ctx, (a < b) as i32),
        funct::RDOUT => {
            if deferred {
                complete_deferred_fetch(ctx, inst)
            } else {
                true
            }
        }
        // Hi/Lo moves and the link were produced in decode; device
        // input reads in Memory.
        funct::SYSCALL
        | funct::MFHI
        | funct::MFLO
        | funct::MTHI
        | funct::MTLO
        | funct::RDIN => true,
        _ => true,
    }
}

fn set_alu(ctx: &mut StageCtx, value: i32) -> bool {
    let st = ctx.st();
    st.out_latch[STAGE_EXECUTE].alu_out = value;
    if st.trace {
        eprintln!("[EX ] alu = {value} ({value:#x})");
    }
    true
}

fn set_alu_pair(ctx: &mut StageCtx, lo: i32, hi: i32) -> bool {
    let st = ctx.st();
    st.out_latch[STAGE_EXECUTE].alu_out = lo;
    st.out_latch[STAGE_EXECUTE].alu_out_hi = hi;
    if st.trace {
        eprintln!("[EX ] alu = {lo:#x}, alu hi = {hi:#x}");
    }
    true
}

/// Retries an operand fetch decode left behind. Only a producer now
/// sitting in the Memory stage can satisfy it; anything else leaves the
/// stage unfinished for a retry next cycle.
fn complete_deferred_fetch(ctx: &mut StageCtx, inst: InstructionWord) -> bool {
    let target = ctx.st().out_latch[STAGE_EXECUTE].fetch_failed_for;
    let reg = match target {
        FetchTarget::OperandA => inst.rs(),
        FetchTarget::OperandB => inst.rt(),
        FetchTarget::DecodeResult => return false,
    };
    let hit = {
        let st = ctx.st();
        let mem = &st.in_latch[STAGE_MEMORY];
        mem.targ_reg == Some(reg) && mem.result_stage == ResultStage::AtMemory
    };
    if !hit {
        if ctx.st().trace {
            eprintln!("[EX ] deferred fetch of r{reg} has no producer in Memory, stalling");
        }
        return false;
    }
    ctx.wait_until(|s| s.out_latch[STAGE_MEMORY].finished);
    let st = ctx.st();
    let value = st.out_latch[STAGE_MEMORY].load_data;
    match target {
        FetchTarget::OperandA => st.out_latch[STAGE_EXECUTE].a = value,
        FetchTarget::OperandB => st.out_latch[STAGE_EXECUTE].b = value,
        FetchTarget::DecodeResult => return false,
    }
    st.out_latch[STAGE_EXECUTE].fetch_incomplete = false;
    if st.trace {
        eprintln!("[EX ] deferred fetch of r{reg} = {value} ({value:#x})");
    }
    true
}

/// Redirects fetch from Execute. This stage holds the oldest
/// control-transfer in flight, so its proposal always wins and it may
/// flush decode outright.
fn update_pc(ctx: &mut StageCtx, value: i32, kind: PcUpdate) {
    let st = ctx.st();
    let target = match kind {
        PcUpdate::Absolute => value as u32,
        PcUpdate::Relative => st.pc.wrapping_add(value as u32).wrapping_sub(4),
    };
    if st.in_latch[STAGE_DECODE].pc == target {
        // The target instruction is already in decode.
        return;
    }
    if st.pc == target {
        // The target is being fetched; only the stale decode entry
        // goes.
        st.flush[STAGE_DECODE] = true;
        return;
    }
    st.flush[STAGE_DECODE] = true;
    st.flush[STAGE_FETCH] = true;
    st.pc_update_control(target, NpcSource::Execute);
}

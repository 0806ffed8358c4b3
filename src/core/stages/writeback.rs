//! Stage 4: writeback.
//!
//! Commits results to the register file. Values are taken from the
//! stage's input latch, so forwarding readers that snoop the latch and
//! the final architectural write always agree.

use crate::core::latch::WriteSource;
use crate::core::stages::StageCtx;
use crate::core::{CoreState, Shared, STAGE_WRITEBACK};
use crate::isa::{funct, op};

pub(crate) fn run(shared: &Shared) {
    let mut ctx = StageCtx::new(shared);
    ctx.take_input(STAGE_WRITEBACK);

    let inst = ctx.st().out_latch[STAGE_WRITEBACK].inst;
    if inst.is_nop() {
        ctx.finish(STAGE_WRITEBACK);
        return;
    }

    let st = ctx.st();
    match inst.op() {
        op::ZERO => match inst.funct() {
            funct::SLL
            | funct::SRL
            | funct::SRA
            | funct::SLLV
            | funct::SRLV
            | funct::SRAV
            | funct::ADD
            | funct::SUB
            | funct::AND
            | funct::OR
            | funct::XOR
            | funct::NOR
            | funct::SLT => register_write(st, WriteSource::Alu),
            funct::MULT | funct::DIV => {
                register_write(st, WriteSource::Alu);
                register_write_second(st);
            }
            funct::JALR
            | funct::SYSCALL
            | funct::MFHI
            | funct::MFLO
            | funct::MTHI
            | funct::MTLO => register_write(st, WriteSource::Decode),
            funct::RDIN => register_write(st, WriteSource::Load),
            _ => {}
        },
        op::ADDI | op::SLTI | op::ANDI | op::ORI | op::XORI | op::LUI => {
            register_write(st, WriteSource::Alu)
        }
        op::JAL => register_write(st, WriteSource::Decode),
        op::LW | op::DIN => register_write(st, WriteSource::Load),
        _ => {}
    }
    st.stats.instructions += 1;

    ctx.finish(STAGE_WRITEBACK);
}

/// Commits the primary result. Skipped while the machine is draining.
fn register_write(st: &mut CoreState, source: WriteSource) {
    if st.block_updates {
        return;
    }
    let latch = &st.in_latch[STAGE_WRITEBACK];
    let value = match source {
        WriteSource::Decode => latch.decode_result,
        WriteSource::Alu => latch.alu_out,
        WriteSource::AluHi => latch.alu_out_hi,
        WriteSource::Load => latch.load_data,
    };
    match latch.targ_reg {
        Some(reg) => {
            if st.trace {
                eprintln!("[WB ] r{reg} <- {value} ({value:#x})");
            }
            st.regs.write(reg, value);
        }
        None => {
            eprintln!(
                "[WB ] instruction {:#010x} has no target register, nothing written",
                latch.inst.0
            );
        }
    }
}

/// Commits the Hi half of a multiply or divide.
fn register_write_second(st: &mut CoreState) {
    if st.block_updates {
        return;
    }
    let latch = &st.in_latch[STAGE_WRITEBACK];
    let value = latch.alu_out_hi;
    match latch.targ_reg2 {
        Some(reg) => {
            if st.trace {
                eprintln!("[WB ] r{reg} <- {value} ({value:#x})");
            }
            st.regs.write(reg, value);
        }
        None => {
            eprintln!(
                "[WB ] instruction {:#010x} has no second target register, nothing written",
                latch.inst.0
            );
        }
    }
}

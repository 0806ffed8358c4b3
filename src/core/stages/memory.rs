//! Stage 3: memory and device access.
//!
//! Loads and stores go through the data cache path. A failed access
//! leaves the output latch unfinished; the clock inserts a bubble
//! downstream and the access retries next cycle. Device transfers never
//! stall the pipe; a failed transfer is logged and the instruction
//! completes anyway.

use crate::core::stages::StageCtx;
use crate::core::{CoreState, Shared, STAGE_MEMORY};
use crate::isa::{funct, op, InstructionWord};

pub(crate) fn run(shared: &Shared) {
    let mut ctx = StageCtx::new(shared);
    ctx.take_input(STAGE_MEMORY);

    let (inst, a, b, imm, addr) = {
        let latch = &ctx.st().out_latch[STAGE_MEMORY];
        (latch.inst, latch.a, latch.b, latch.imm, latch.alu_out)
    };

    if inst.is_nop() {
        ctx.finish(STAGE_MEMORY);
        return;
    }

    let done = match inst.op() {
        op::ZERO => match inst.funct() {
            funct::RDIN => {
                device_read(&mut ctx, b as u32, inst);
                true
            }
            funct::RDOUT => {
                device_write(&mut ctx, b as u32, a, inst);
                true
            }
            _ => true,
        },
        op::LW => {
            let st = ctx.st();
            let CoreState { dcache, mem, .. } = &mut *st;
            match dcache.read(addr as u32, 4, mem) {
                Ok(word) => {
                    let st = ctx.st();
                    st.out_latch[STAGE_MEMORY].load_data = word;
                    if st.trace {
                        eprintln!("[MEM] loaded {word} ({word:#x}) from {addr:#x}");
                    }
                    true
                }
                Err(e) => {
                    eprintln!("[MEM] load at {addr:#x} failed ({e}), will retry next clock");
                    false
                }
            }
        }
        op::SW => {
            let st = ctx.st();
            if st.block_updates {
                // Draining: report success without touching memory.
                true
            } else {
                let CoreState { dcache, mem, .. } = &mut *st;
                match dcache.write(addr as u32, b, 4, mem) {
                    Ok(()) => {
                        let st = ctx.st();
                        if st.trace {
                            eprintln!("[MEM] stored {b} ({b:#x}) at {addr:#x}");
                        }
                        true
                    }
                    Err(e) => {
                        eprintln!("[MEM] store at {addr:#x} failed ({e}), will retry next clock");
                        false
                    }
                }
            }
        }
        op::DIN => {
            device_read(&mut ctx, imm as u32, inst);
            true
        }
        op::DOUT => {
            device_write(&mut ctx, imm as u32, a, inst);
            true
        }
        _ => true,
    };

    if done {
        ctx.finish(STAGE_MEMORY);
    }
}

fn device_read(ctx: &mut StageCtx, device: u32, inst: InstructionWord) {
    let st = ctx.st();
    match st.ports.read(device) {
        Ok(word) => {
            st.out_latch[STAGE_MEMORY].load_data = word;
            if st.trace {
                eprintln!("[MEM] device {device} -> {word} ({word:#x})");
            }
        }
        Err(e) => {
            eprintln!(
                "[MEM] device read {device} failed ({e}), instruction {:#010x} dropped",
                inst.0
            );
        }
    }
}

fn device_write(ctx: &mut StageCtx, device: u32, word: i32, inst: InstructionWord) {
    let st = ctx.st();
    match st.ports.write(device, word) {
        Ok(()) => {
            if st.trace {
                eprintln!("[MEM] device {device} <- {word} ({word:#x})");
            }
        }
        Err(e) => {
            eprintln!(
                "[MEM] device write {device} failed ({e}), instruction {:#010x} dropped",
                inst.0
            );
        }
    }
}

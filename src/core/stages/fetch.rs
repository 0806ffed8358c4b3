//! Stage 0: instruction fetch.

use crate::core::stages::StageCtx;
use crate::core::{CoreState, NpcSource, Shared, STAGE_FETCH};
use crate::isa::InstructionWord;

pub(crate) fn run(shared: &Shared) {
    let mut ctx = StageCtx::new(shared);
    // The fetch input latch is a permanent bubble; all work happens on
    // the output latch.
    ctx.take_input(STAGE_FETCH);

    let st = ctx.st();
    let pc = st.pc;
    let CoreState { icache, mem, .. } = &mut *st;
    match icache.read(pc, 4, mem) {
        Ok(word) => {
            let st = ctx.st();
            st.out_latch[STAGE_FETCH].pc = pc;
            st.out_latch[STAGE_FETCH].inst = InstructionWord(word as u32);
            if st.trace {
                eprintln!("[IF ] fetched {:#010x} from {pc:#x}", word as u32);
            }
            st.pc_update_control(pc.wrapping_add(4), NpcSource::Fetch);
            ctx.finish(STAGE_FETCH);
        }
        Err(e) => {
            eprintln!("[IF ] fetch at {pc:#x} failed ({e}), will retry next clock");
        }
    }
}

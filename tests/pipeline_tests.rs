//! End-to-end pipeline tests.
//!
//! Each test pokes an encoded program into memory, runs the clock for a
//! fixed number of cycles and checks architectural state. Programs park
//! in a jump-to-self loop once done, so extra cycles are harmless.

use mips_pipeline::config::{CacheKind, CacheLevelConfig, Config};
use mips_pipeline::core::Processor;
use mips_pipeline::isa::{
    encode_i, encode_j, encode_r, funct, op, regimm, REG_HI, REG_LO, REG_RA,
    SYSTEM_START_ADDRESS,
};
use mips_pipeline::ports::{pipe_pair, WordChannel};

fn boot_with(config: Config, program: &[u32]) -> Processor {
    let mut cpu = Processor::new(&config);
    for (i, word) in program.iter().enumerate() {
        cpu.write_word(SYSTEM_START_ADDRESS + 4 * i as u32, *word)
            .expect("program fits in memory");
    }
    cpu.start();
    cpu
}

fn boot(program: &[u32]) -> Processor {
    let mut config = Config::default();
    config.memory.size_bytes = 64 * 1024;
    boot_with(config, program)
}

/// A jump back to the program word at `index`; parked there, the
/// machine idles without touching state.
fn halt_at(index: usize) -> u32 {
    encode_j(op::J, SYSTEM_START_ADDRESS / 4 + index as u32)
}

/// ALU results flow through forwarding into dependent instructions and
/// commit to the register file.
#[test]
fn alu_chain_commits_with_forwarding() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 6),
        encode_i(op::ADDI, 0, 2, 3),
        encode_r(1, 2, 3, 0, funct::SUB),
        encode_r(1, 2, 4, 0, funct::AND),
        encode_r(2, 1, 5, 0, funct::SLT),
        encode_r(0, 1, 6, 3, funct::SLL),
        halt_at(6),
    ]);
    cpu.run_cycles(25);
    assert_eq!(cpu.read_register(1), 6);
    assert_eq!(cpu.read_register(2), 3);
    assert_eq!(cpu.read_register(3), 3);
    assert_eq!(cpu.read_register(4), 2);
    assert_eq!(cpu.read_register(5), 1);
    assert_eq!(cpu.read_register(6), 48);
}

/// Register 0 stays zero no matter what targets it, and reads of it
/// never pick up a forwarded value.
#[test]
fn zero_register_never_written() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 0, 7),
        encode_r(0, 0, 1, 0, funct::ADD),
        halt_at(2),
    ]);
    cpu.run_cycles(20);
    assert_eq!(cpu.read_register(0), 0);
    assert_eq!(cpu.read_register(1), 0);
}

/// LUI plus ORI builds a full 32-bit constant.
#[test]
fn lui_ori_builds_constant() {
    let mut cpu = boot(&[
        encode_i(op::LUI, 0, 1, 0x1234),
        encode_i(op::ORI, 1, 1, 0x5678),
        halt_at(2),
    ]);
    cpu.run_cycles(20);
    assert_eq!(cpu.read_register(1), 0x1234_5678);
}

/// A store followed by a load round-trips through memory, and a
/// consumer right behind the load stalls until the data arrives.
#[test]
fn load_use_stalls_then_forwards() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 99),
        encode_i(op::SW, 0, 1, 0x200),
        encode_i(op::LW, 0, 2, 0x200),
        encode_r(2, 2, 3, 0, funct::ADD),
        halt_at(4),
    ]);
    cpu.run_cycles(30);
    assert_eq!(cpu.peek_memory(0x200).unwrap(), 99);
    assert_eq!(cpu.read_register(2), 99);
    assert_eq!(cpu.read_register(3), 198);
}

/// A taken BEQ flushes the two younger instructions; an untaken BNE
/// falls straight through.
#[test]
fn beq_taken_skips_bne_untaken_falls_through() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 1),
        encode_i(op::ADDI, 0, 2, 1),
        encode_i(op::BEQ, 1, 2, 1),
        encode_i(op::ADDI, 0, 3, 55), // skipped
        encode_i(op::BNE, 1, 2, 1),
        encode_i(op::ADDI, 0, 4, 77), // not skipped
        halt_at(6),
    ]);
    cpu.run_cycles(30);
    assert_eq!(cpu.read_register(3), 0);
    assert_eq!(cpu.read_register(4), 77);
}

/// BGEZ resolves already in decode, killing only the one instruction
/// behind it.
#[test]
fn bgez_resolves_in_decode() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 1),
        encode_i(op::ONE, 1, regimm::BGEZ as usize, 1),
        encode_i(op::ADDI, 0, 5, 11), // skipped
        encode_i(op::ADDI, 0, 6, 22),
        halt_at(4),
    ]);
    cpu.run_cycles(25);
    assert_eq!(cpu.read_register(5), 0);
    assert_eq!(cpu.read_register(6), 22);
}

/// MULT and DIV leave their two halves in Lo and Hi, readable through
/// MFLO and MFHI.
#[test]
fn mult_div_write_hi_lo() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 13),
        encode_i(op::ADDI, 0, 2, 4),
        encode_r(1, 2, 0, 0, funct::MULT),
        encode_r(0, 0, 3, 0, funct::MFLO),
        encode_r(1, 2, 0, 0, funct::DIV),
        encode_r(0, 0, 4, 0, funct::MFLO),
        encode_r(0, 0, 5, 0, funct::MFHI),
        halt_at(7),
    ]);
    cpu.run_cycles(40);
    assert_eq!(cpu.read_register(3), 52);
    assert_eq!(cpu.read_register(4), 3);
    assert_eq!(cpu.read_register(5), 1);
    assert_eq!(cpu.read_register(REG_LO), 3);
    assert_eq!(cpu.read_register(REG_HI), 1);
}

/// JAL links the return address and JR returns through it.
#[test]
fn jal_links_and_jr_returns() {
    let base = SYSTEM_START_ADDRESS / 4;
    let mut cpu = boot(&[
        encode_j(op::JAL, base + 4),
        encode_i(op::ADDI, 0, 1, 111), // runs after the return
        halt_at(2),
        0,
        encode_i(op::ADDI, 0, 2, 5),
        encode_r(REG_RA, 0, 0, 0, funct::JR),
    ]);
    cpu.run_cycles(40);
    assert_eq!(cpu.read_register(REG_RA) as u32, SYSTEM_START_ADDRESS + 4);
    assert_eq!(cpu.read_register(2), 5);
    assert_eq!(cpu.read_register(1), 111);
}

/// DIN pulls a word from the input device, DOUT pushes one to the
/// output device.
#[test]
fn din_dout_move_words_through_devices() {
    let (mut host_in, sim_in) = pipe_pair();
    let (host_out, sim_out) = pipe_pair();
    host_in.write_word(41).unwrap();

    let mut cpu = boot(&[
        encode_i(op::DIN, 0, 1, 1),
        encode_i(op::ADDI, 1, 2, 1),
        encode_i(op::DOUT, 2, 0, 2),
        halt_at(3),
    ]);
    cpu.add_port(1, Box::new(sim_in)).unwrap();
    cpu.add_port(2, Box::new(sim_out)).unwrap();
    cpu.run_cycles(30);

    assert_eq!(cpu.read_register(1), 41);
    assert_eq!(host_out.try_read_word(), Some(42));
}

/// RDIN and RDOUT address their devices through registers; the RDOUT
/// operand arrives via a fetch deferred behind the device read.
#[test]
fn rdin_rdout_use_register_devices() {
    let (mut host_in, sim_in) = pipe_pair();
    let (host_out, sim_out) = pipe_pair();
    host_in.write_word(7).unwrap();

    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 1),
        encode_i(op::ADDI, 0, 2, 2),
        encode_r(0, 1, 3, 0, funct::RDIN),
        encode_r(3, 2, 0, 0, funct::RDOUT),
        halt_at(4),
    ]);
    cpu.add_port(1, Box::new(sim_in)).unwrap();
    cpu.add_port(2, Box::new(sim_out)).unwrap();
    cpu.run_cycles(40);

    assert_eq!(cpu.read_register(3), 7);
    assert_eq!(host_out.try_read_word(), Some(7));
}

/// A breakpoint interrupts a pending continue run at the exact PC.
#[test]
fn breakpoint_stops_continue_run() {
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 1),
        encode_i(op::ADDI, 0, 2, 2),
        encode_i(op::ADDI, 0, 3, 3),
        encode_i(op::ADDI, 0, 4, 4),
        halt_at(4),
    ]);
    assert!(cpu.set_breakpoint(0, (SYSTEM_START_ADDRESS + 8) as i64));
    cpu.set_continue_count(50);
    while cpu.continue_count() > 0 {
        cpu.cycle();
    }
    assert_eq!(cpu.pc(), SYSTEM_START_ADDRESS + 8);
    assert!(cpu.cycle_count() < 50);
}

/// Stores and loads work through a data cache, and the cache sees the
/// traffic.
#[test]
fn store_load_through_data_cache() {
    let mut config = Config::default();
    config.memory.size_bytes = 64 * 1024;
    config.cache.data = vec![CacheLevelConfig {
        kind: CacheKind::SetAssociative,
        blocks: 4,
        words_per_block: 2,
        associativity: 2,
        verbose: false,
    }];
    let mut cpu = boot_with(
        config,
        &[
            encode_i(op::ADDI, 0, 1, 31),
            encode_i(op::SW, 0, 1, 0x300),
            encode_i(op::LW, 0, 2, 0x300),
            halt_at(3),
        ],
    );
    cpu.run_cycles(30);
    assert_eq!(cpu.read_register(2), 31);
    // The dirty line has not been written back yet.
    assert_eq!(cpu.peek_data_cache(0x300).unwrap(), 31);
    let (reads, read_hits, writes, _) = cpu.data_cache_counters().unwrap();
    assert!(reads >= 1);
    assert_eq!(read_hits, reads); // the store allocated the line
    assert!(writes >= 1);
}

/// Computes 5! in a MULT/MFLO loop, converts it to decimal digits and
/// emits the characters "120" on the output device.
#[test]
fn factorial_loop_emits_digits() {
    let (host_out, sim_out) = pipe_pair();
    let mut cpu = boot(&[
        encode_i(op::ADDI, 0, 1, 5),
        encode_i(op::ADDI, 0, 2, 1),
        encode_r(2, 1, 0, 0, funct::MULT), // loop head
        encode_r(0, 0, 2, 0, funct::MFLO),
        encode_i(op::ADDI, 1, 1, -1),
        encode_i(op::BNE, 1, 0, -4),
        // r2 = 120; split into hundreds, tens, units.
        encode_i(op::ADDI, 0, 10, 100),
        encode_i(op::ADDI, 0, 11, 10),
        encode_r(2, 10, 0, 0, funct::DIV),
        encode_r(0, 0, 3, 0, funct::MFLO),
        encode_r(0, 0, 4, 0, funct::MFHI),
        encode_i(op::ADDI, 3, 3, 48),
        encode_i(op::DOUT, 3, 0, 2),
        encode_r(4, 11, 0, 0, funct::DIV),
        encode_r(0, 0, 5, 0, funct::MFLO),
        encode_r(0, 0, 6, 0, funct::MFHI),
        encode_i(op::ADDI, 5, 5, 48),
        encode_i(op::ADDI, 6, 6, 48),
        encode_i(op::DOUT, 5, 0, 2),
        encode_i(op::DOUT, 6, 0, 2),
        halt_at(20),
    ]);
    cpu.add_port(2, Box::new(sim_out)).unwrap();
    cpu.run_cycles(200);

    assert_eq!(cpu.read_register(2), 120);
    assert_eq!(cpu.read_register(1), 0);
    assert_eq!(host_out.try_read_word(), Some(b'1' as i32));
    assert_eq!(host_out.try_read_word(), Some(b'2' as i32));
    assert_eq!(host_out.try_read_word(), Some(b'0' as i32));
}

//! Interactive debugger console.
//!
//! A thin line-oriented front end over [`Processor`]: single-step,
//! continue with breakpoints, and peeks into registers, latches, memory
//! and the caches. Query commands run immediately; only `n`, `c` and
//! `q` hand control back to the clock loop.

use std::io::{self, BufRead, Write};

use ansi_term::Colour;

use crate::core::{Processor, BREAKPOINT_SLOTS};

/// A parsed console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run a single cycle.
    Step,
    /// Run this many cycles without prompting.
    Continue(u64),
    PrintRegisters,
    PrintNonzeroRegisters,
    PeekMemory(u32),
    PeekDataCache(u32),
    PeekInstrCache(u32),
    Statistics,
    /// `addr` -1 clears the slot.
    SetBreakpoint { slot: usize, addr: i64 },
    ListBreakpoints,
    Quit,
    Help,
}

/// What the clock loop should do after a console session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Run,
    Quit,
}

/// Parses one input line. Returns None for anything unrecognized.
pub fn parse(line: &str) -> Option<Command> {
    let mut words = line.split_whitespace();
    let cmd = words.next()?;
    let parsed = match cmd {
        "n" => Command::Step,
        "c" => Command::Continue(parse_number(words.next()?)? as u64),
        "p" => Command::PrintRegisters,
        "P" => Command::PrintNonzeroRegisters,
        "m" => Command::PeekMemory(parse_number(words.next()?)? as u32),
        "d" => Command::PeekDataCache(parse_number(words.next()?)? as u32),
        "i" => Command::PeekInstrCache(parse_number(words.next()?)? as u32),
        "s" => Command::Statistics,
        "b" => Command::SetBreakpoint {
            slot: parse_number(words.next()?)? as usize,
            addr: parse_number(words.next()?)?,
        },
        "B" => Command::ListBreakpoints,
        "q" => Command::Quit,
        "h" | "?" => Command::Help,
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some(parsed)
}

fn parse_number(word: &str) -> Option<i64> {
    if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("-0x")) {
        let magnitude = i64::from_str_radix(hex, 16).ok()?;
        Some(if word.starts_with('-') { -magnitude } else { magnitude })
    } else {
        word.parse().ok()
    }
}

/// The interactive prompt.
pub struct Console {
    prompt: String,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            prompt: Colour::Cyan.bold().paint("sim> ").to_string(),
        }
    }

    /// Prompts until a command that resumes the clock (or quits). Query
    /// commands execute in place.
    pub fn interact(&self, cpu: &mut Processor) -> Action {
        let stdin = io::stdin();
        loop {
            print!("{}", self.prompt);
            let _ = io::stdout().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return Action::Quit,
                Ok(_) => {}
                Err(e) => {
                    eprintln!("console read failed: {e}");
                    return Action::Quit;
                }
            }
            if line.trim().is_empty() {
                continue;
            }
            let command = match parse(&line) {
                Some(c) => c,
                None => {
                    // Garbled input also cancels any pending run.
                    cpu.set_continue_count(0);
                    println!("unrecognized input, try 'h'");
                    continue;
                }
            };
            match command {
                Command::Step => return Action::Run,
                Command::Continue(count) => {
                    cpu.set_continue_count(count as i64);
                    return Action::Run;
                }
                Command::Quit => return Action::Quit,
                Command::PrintRegisters => print_registers(cpu, false),
                Command::PrintNonzeroRegisters => print_registers(cpu, true),
                Command::PeekMemory(addr) => match cpu.peek_memory(addr) {
                    Ok(word) => println!("mem[{addr:#x}] = {word} ({word:#010x})"),
                    Err(e) => println!("{e}"),
                },
                Command::PeekDataCache(addr) => match cpu.peek_data_cache(addr) {
                    Ok(word) => println!("dcache[{addr:#x}] = {word} ({word:#010x})"),
                    Err(e) => println!("{e}"),
                },
                Command::PeekInstrCache(addr) => match cpu.peek_instr_cache(addr) {
                    Ok(word) => println!("icache[{addr:#x}] = {word} ({word:#010x})"),
                    Err(e) => println!("{e}"),
                },
                Command::Statistics => cpu.print_statistics(),
                Command::SetBreakpoint { slot, addr } => {
                    if !cpu.set_breakpoint(slot, addr) {
                        println!("breakpoint slots are 0..{}", BREAKPOINT_SLOTS - 1);
                    }
                }
                Command::ListBreakpoints => {
                    for (slot, addr) in cpu.breakpoints().iter().enumerate() {
                        if *addr >= 0 {
                            println!("  {slot:2}: {addr:#x}");
                        }
                    }
                }
                Command::Help => print_help(),
            }
        }
    }
}

fn print_registers(cpu: &Processor, nonzero_only: bool) {
    println!(
        "{} cycle {} pc {:#x}",
        Colour::Yellow.paint("registers"),
        cpu.cycle_count(),
        cpu.pc()
    );
    if nonzero_only {
        for reg in 1..32 {
            let value = cpu.read_register(reg);
            if value != 0 {
                println!("  r{reg:<2} {value:>11} ({value:#010x})");
            }
        }
    } else {
        for row in 0..8 {
            for col in 0..4 {
                let reg = row * 4 + col;
                let value = cpu.read_register(reg);
                print!("  r{reg:<2} {value:>11}");
            }
            println!();
        }
    }
    println!(
        "  hi  {:>11}  lo  {:>11}",
        cpu.read_register(crate::isa::REG_HI),
        cpu.read_register(crate::isa::REG_LO)
    );
}

fn print_help() {
    println!("  n              run one cycle");
    println!("  c <count>      run <count> cycles (stops at breakpoints)");
    println!("  p              print the register file");
    println!("  P              print only the nonzero registers");
    println!("  m <addr>       read a word from main memory");
    println!("  d <addr>       peek the data cache (no fetch)");
    println!("  i <addr>       peek the instruction cache (no fetch)");
    println!("  s              print statistics");
    println!("  b <slot> <pc>  set a breakpoint (-1 clears the slot)");
    println!("  B              list breakpoints");
    println!("  q              quit");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(parse("n"), Some(Command::Step));
        assert_eq!(parse("c 100"), Some(Command::Continue(100)));
        assert_eq!(parse("m 0x400"), Some(Command::PeekMemory(0x400)));
        assert_eq!(
            parse("b 3 0x500"),
            Some(Command::SetBreakpoint { slot: 3, addr: 0x500 })
        );
        assert_eq!(
            parse("b 3 -1"),
            Some(Command::SetBreakpoint { slot: 3, addr: -1 })
        );
        assert_eq!(parse("?"), Some(Command::Help));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse("x"), None);
        assert_eq!(parse("c"), None);
        assert_eq!(parse("n now"), None);
        assert_eq!(parse("m zzz"), None);
    }
}

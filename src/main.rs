//! Pipelined MIPS-like simulator CLI.
//!
//! Loads a program image, builds the processor from a TOML
//! configuration, then either runs a fixed number of cycles or drops
//! into the interactive debugger console.

use std::path::Path;
use std::process;

use clap::Parser;

use mips_pipeline::common::{ConfigError, EXIT_ALLOC_FAILURE, EXIT_TERMINATED};
use mips_pipeline::config::Config;
use mips_pipeline::console::{Action, Console};
use mips_pipeline::core::Processor;

/// Command-line arguments for the pipeline simulator.
#[derive(Parser, Debug)]
#[command(author, version, about = "Cycle-level simulator of a 5-stage pipelined processor")]
struct Args {
    /// Program image: 8-byte address/word records, first record is the
    /// start marker.
    image: Option<String>,

    #[arg(short, long, default_value = "configs/default.toml")]
    config: String,

    /// Run this many cycles without prompting, then exit.
    #[arg(long)]
    cycles: Option<u64>,

    /// Narrate pipeline activity on stderr.
    #[arg(short, long)]
    trace: bool,
}

fn main() {
    let args = Args::parse();

    let mut config = match Config::from_file(Path::new(&args.config)) {
        Ok(config) => config,
        Err(e @ ConfigError::BadMemorySize(_)) => {
            eprintln!("error: {e}");
            process::exit(EXIT_ALLOC_FAILURE);
        }
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };
    if args.trace || cfg!(feature = "always-trace") {
        config.general.trace_instructions = true;
    }

    println!("Global Configuration");
    println!("--------------------");
    println!("General:");
    println!("  Trace:       {}", config.general.trace_instructions);
    println!("  Start PC:    {:#x}", config.general.start_address);
    println!("Memory:");
    println!(
        "  Size:        {} KB",
        config.memory.size_bytes / 1024
    );
    println!(
        "  I-cache:     {} level(s)",
        config.cache.instruction.len()
    );
    println!("  D-cache:     {} level(s)", config.cache.data.len());
    println!("Ports:");
    println!("  Connect:     {}", config.ports.connect);
    println!("--------------------");

    let mut cpu = Processor::new(&config);

    if let Some(ref image) = args.image {
        match cpu.load_image(Path::new(image)) {
            Ok(start) => {
                println!("[Loader] {image} loaded, start marker {start:#x}");
                cpu.set_pc(start);
            }
            Err(e) => {
                eprintln!("error: {e}");
                process::exit(1);
            }
        }
    }

    if config.ports.connect {
        let ports = &config.ports;
        if let Err(e) = cpu.connect_tcp(ports.input_device, &ports.host, ports.input_port) {
            eprintln!("input device {}: {e}", ports.input_device);
        }
        if let Err(e) = cpu.connect_tcp(ports.output_device, &ports.host, ports.output_port) {
            eprintln!("output device {}: {e}", ports.output_device);
        }
    }

    cpu.start();

    if let Some(cycles) = args.cycles {
        cpu.run_cycles(cycles);
        cpu.finalize();
        return;
    }

    let console = Console::new();
    loop {
        if cpu.continue_count() == 0 {
            match console.interact(&mut cpu) {
                Action::Run => {}
                Action::Quit => break,
            }
        }
        cpu.cycle();
    }
    cpu.finalize();
    process::exit(EXIT_TERMINATED);
}

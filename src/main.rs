use std::{env, fs, process};

use tracing_subscriber::{EnvFilter, fmt};

use cinder::bytecode::disasm::{print_program, print_stats};
use cinder::bytecode::program::Program;
use cinder::bytecode::validate::validate;
use cinder::runtime::binder::BinderFlags;
use cinder::runtime::memory::ScriptMem;
use cinder::runtime::vm::{EvalResult, FailPolicy, VmConfig, eval};
use cinder::stdlib::{StdContext, demo_program, std_binder, std_binder_with, std_strings};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str);
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        Some("run") => run(rest),
        Some("dis") => dis(rest),
        Some("demo") => demo(rest),
        Some("--help") | Some("-h") => print_usage(),
        _ => {
            print_usage();
            process::exit(1);
        }
    }
}

/// `RUST_LOG` overrides the default `info` filter. Logs go to stderr.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_usage() {
    println!("CINDER - embedded script runtime");
    println!();
    println!("Usage:");
    println!("  cinder run <file> [--max-ops N] [--fail-null] [--dev]");
    println!("                              Evaluate a compiled program");
    println!("  cinder dis <file> [--stats] Disassemble a compiled program");
    println!("  cinder demo <file>          Write the demo program to <file>");
    println!("  cinder --help, -h           Show this help");
}

/// First argument that is not a flag or a flag's value.
fn file_arg(args: &[String]) -> Option<&str> {
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg == "--max-ops" {
            skip = true;
            continue;
        }
        if !arg.starts_with('-') {
            return Some(arg);
        }
    }
    None
}

fn require_file(args: &[String]) -> &str {
    match file_arg(args) {
        Some(file) => file,
        None => {
            print_usage();
            process::exit(1);
        }
    }
}

fn load(filename: &str) -> Program {
    let bytes = match fs::read(filename) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    };
    match Program::from_bytes(&bytes) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("Load error: {}", e);
            process::exit(1);
        }
    }
}

fn parse_config(args: &[String]) -> VmConfig {
    let mut config = VmConfig::default();
    if let Some(pos) = args.iter().position(|a| a == "--max-ops") {
        match args.get(pos + 1).and_then(|n| n.parse().ok()) {
            Some(n) => config.max_executed_ops = n,
            None => {
                eprintln!("Error: --max-ops expects a number");
                process::exit(1);
            }
        }
    }
    if args.iter().any(|a| a == "--fail-null") {
        config.fail_policy = FailPolicy::ReturnNull;
    }
    config
}

fn run(args: &[String]) {
    let filename = require_file(args);
    let config = parse_config(args);
    let flags = if args.iter().any(|a| a == "--dev") {
        BinderFlags::DEV_SUPPORT
    } else {
        BinderFlags::NONE
    };

    let binder = match std_binder_with(flags) {
        Ok(binder) => binder,
        Err(e) => {
            eprintln!("Binder error: {}", e);
            process::exit(1);
        }
    };
    let program = load(filename);
    let valid = match validate(&program, &binder) {
        Ok(valid) => valid,
        Err(e) => {
            eprintln!("Validation error: {}", e);
            process::exit(1);
        }
    };

    let mut mem = ScriptMem::new();
    let mut ctx = StdContext::new();
    let result = eval(valid, &mut mem, &mut ctx, config);

    for line in &ctx.output {
        println!("{}", line);
    }
    match result {
        EvalResult::Returned {
            value,
            executed_ops,
        } => {
            println!("=> {}  ({} ops)", value.display(&ctx.strings), executed_ops);
        }
        EvalResult::Panicked {
            panic,
            executed_ops,
        } => {
            eprintln!("Panic: {}  ({} ops)", panic.render(true), executed_ops);
            process::exit(1);
        }
    }
}

fn dis(args: &[String]) {
    let filename = require_file(args);
    let binder = match std_binder() {
        Ok(binder) => binder,
        Err(e) => {
            eprintln!("Binder error: {}", e);
            process::exit(1);
        }
    };
    let program = load(filename);

    print_program(&program, &binder, &std_strings());
    if args.iter().any(|a| a == "--stats") {
        println!();
        print_stats(&program);
    }
}

fn demo(args: &[String]) {
    let filename = require_file(args);
    let bytes = std_binder()
        .map_err(|e| e.to_string())
        .and_then(|binder| demo_program(&binder).map_err(|e| e.to_string()))
        .and_then(|program| program.to_bytes().map_err(|e| e.to_string()));

    match bytes {
        Ok(bytes) => match fs::write(filename, &bytes) {
            Ok(()) => println!("wrote {} bytes to {}", bytes.len(), filename),
            Err(e) => {
                eprintln!("Failed to write '{}': {}", filename, e);
                process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("Demo error: {}", e);
            process::exit(1);
        }
    }
}

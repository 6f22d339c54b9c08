use std::collections::{BTreeSet, HashMap};
use std::fmt;

use crate::lang::strings::StringTable;
use crate::lang::value::Value;
use crate::runtime::binder::Binder;

use super::instr::{Instr, Instrs};
use super::program::Program;

/// Print disassembly of a program
pub fn print_program<C>(program: &Program, binder: &Binder<C>, strings: &StringTable) {
    println!("════════════════════════════════════════");
    println!(" program (binder {:016x})", program.binder_hash());
    println!(
        " {} bytes, {} literals, {} locations",
        program.code().len(),
        program.literals().len(),
        program.locations().len()
    );
    println!("════════════════════════════════════════");
    print!("{}", disassemble_with_binder(program, binder, strings));
    println!();
    print!("{}", literals_to_string(program, strings));
    print!("{}", locations_to_string(program));
}

/// Return disassembly as a String; extern calls show the function id only.
pub fn disassemble_to_string(program: &Program, strings: &StringTable) -> String {
    disassemble(program, strings, &|_| None)
}

/// Return disassembly as a String with extern calls annotated by name.
pub fn disassemble_with_binder<C>(
    program: &Program,
    binder: &Binder<C>,
    strings: &StringTable,
) -> String {
    disassemble(program, strings, &|id| {
        binder.func(id).map(|f| f.name().to_string())
    })
}

fn disassemble(
    program: &Program,
    strings: &StringTable,
    func_name: &dyn Fn(u16) -> Option<String>,
) -> String {
    Listing {
        program,
        strings,
        func_name,
    }
    .to_string()
}

struct Listing<'a> {
    program: &'a Program,
    strings: &'a StringTable,
    func_name: &'a dyn Fn(u16) -> Option<String>,
}

impl fmt::Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let jump_targets = collect_jump_targets(self.program);

        for item in Instrs::new(self.program.code()) {
            let (offset, instr) = match item {
                Ok(decoded) => decoded,
                Err(e) => return writeln!(f, "<{}>", e),
            };

            let is_target = jump_targets.contains(&offset);
            if is_target {
                writeln!(f, "      ┌──────────────────────────────────")?;
            }
            write!(f, "{:04} {}", offset, if is_target { "► " } else { "  " })?;
            write!(f, "{}", instr)?;

            if let Some(note) = annotate(self.program, self.strings, self.func_name, &instr) {
                write!(f, "  ; {}", note)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

fn annotate(
    program: &Program,
    strings: &StringTable,
    func_name: &dyn Fn(u16) -> Option<String>,
    instr: &Instr,
) -> Option<String> {
    match *instr {
        Instr::Value { literal, .. } => program
            .literals()
            .get(literal as usize)
            .map(|v| v.display(strings).to_string()),
        Instr::MemLoad { key, .. } | Instr::MemStore { key, .. } => {
            strings.lookup(key).map(|s| format!("${}", s))
        }
        Instr::Extern { func, .. } => func_name(func),
        _ => None,
    }
}

fn collect_jump_targets(program: &Program) -> BTreeSet<usize> {
    Instrs::new(program.code())
        .filter_map(Result::ok)
        .filter_map(|(_, instr)| instr.target())
        .map(|t| t as usize)
        .collect()
}

pub fn literals_to_string(program: &Program, strings: &StringTable) -> String {
    Literals { program, strings }.to_string()
}

struct Literals<'a> {
    program: &'a Program,
    strings: &'a StringTable,
}

impl fmt::Display for Literals<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "literals:")?;
        for (i, value) in self.program.literals().iter().enumerate() {
            let text = value_text(value, self.strings);
            writeln!(f, "  [{:>3}] {:<6} {}", i, value.ty(), text)?;
        }
        Ok(())
    }
}

fn value_text(value: &Value, strings: &StringTable) -> String {
    match value {
        Value::Str(_) => format!("\"{}\"", value.display(strings)),
        _ => value.display(strings).to_string(),
    }
}

pub fn locations_to_string(program: &Program) -> String {
    Locations(program).to_string()
}

struct Locations<'a>(&'a Program);

impl fmt::Display for Locations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "locations:")?;
        for loc in self.0.locations() {
            writeln!(f, "  {:04} {}", loc.offset, loc.range)?;
        }
        Ok(())
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Print instruction frequency
pub fn print_stats(program: &Program) {
    let counts = op_counts(program);
    let total: usize = counts.values().sum();

    println!("=== PROGRAM STATISTICS ===\n");
    println!("Instructions:     {}", total);
    println!("Code bytes:       {}", program.code().len());
    println!("Literals:         {}", program.literals().len());
    println!();

    if total == 0 {
        return;
    }

    println!("Op frequency:");
    let mut sorted: Vec<_> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    for (op, count) in sorted.iter().take(10) {
        let pct = (*count as f64 / total as f64) * 100.0;
        println!("  {:<16} {:>4} ({:>5.1}%)", op, count, pct);
    }
}

fn op_counts(program: &Program) -> HashMap<&'static str, usize> {
    let mut counts = HashMap::new();
    for (_, instr) in Instrs::new(program.code()).filter_map(Result::ok) {
        *counts.entry(instr.opcode().name()).or_insert(0) += 1;
    }
    counts
}

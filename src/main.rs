use std::io::{self, IsTerminal, Read};

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use kons::error::KonsError;
use kons::eval::{Machine, DEFAULT_MAX_DEPTH};
use kons::heap::HeapConfig;
use kons::printer;
use kons::reader;

struct Options {
    load_files: Vec<String>,
    run_files: Vec<String>,
    heap: HeapConfig,
    max_depth: usize,
    trace: bool,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let options = match parse_args(&args[1..]) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{}", msg);
            eprintln!("Try 'kons --help' for usage information.");
            std::process::exit(1);
        }
    };

    init_logging(options.trace);

    let mut machine = match Machine::new(options.heap.clone(), options.max_depth) {
        Ok(machine) => machine,
        Err(e) => fatal_fault(e),
    };

    // Preloaded files run silently.
    for path in &options.load_files {
        let input = read_file(path);
        if !run_source(&mut machine, &input, false) {
            std::process::exit(1);
        }
    }

    if !options.run_files.is_empty() {
        for path in &options.run_files {
            let input = read_file(path);
            if !run_source(&mut machine, &input, true) {
                std::process::exit(1);
            }
        }
        return;
    }

    if io::stdin().is_terminal() {
        println!("kons interpreter");
        println!(
            "  Heap: {} nodes in {} pages, Symbols: {} interned",
            machine.heap.live_count(),
            machine.heap.page_count(),
            machine.symbols.count()
        );
        println!("Ready.\n");
        run_interactive(&mut machine);
    } else {
        run_piped(&mut machine);
    }
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut options = Options {
        load_files: Vec::new(),
        run_files: Vec::new(),
        heap: HeapConfig::default(),
        max_depth: DEFAULT_MAX_DEPTH,
        trace: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--load" => {
                options.load_files.push(flag_value(args, i)?.to_string());
                i += 2;
            }
            "--page-capacity" => {
                options.heap.page_capacity = parse_number(args, i)?;
                i += 2;
            }
            "--grow-threshold" => {
                options.heap.grow_threshold = parse_number(args, i)?;
                i += 2;
            }
            "--max-pages" => {
                options.heap.max_pages = Some(parse_number(args, i)?);
                i += 2;
            }
            "--max-depth" => {
                options.max_depth = parse_number(args, i)?;
                i += 2;
            }
            "--trace" => {
                options.trace = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other if other.starts_with("--") => {
                return Err(format!("Unknown argument: {}", other));
            }
            path => {
                options.run_files.push(path.to_string());
                i += 1;
            }
        }
    }

    if std::env::var("KONS_TRACE").map(|v| v == "1").unwrap_or(false) {
        options.trace = true;
    }
    Ok(options)
}

fn flag_value(args: &[String], i: usize) -> Result<&str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires a value", args[i]))
}

fn parse_number(args: &[String], i: usize) -> Result<usize, String> {
    let value = flag_value(args, i)?;
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("{} expects a positive integer, got '{}'", args[i], value)),
    }
}

fn print_help() {
    println!("Usage: kons [OPTIONS] [FILE...]");
    println!();
    println!("Runs each FILE and prints every result. Without files, starts a REPL");
    println!("on a terminal or evaluates piped standard input.");
    println!();
    println!("Options:");
    println!("  --load <file>           Evaluate a file silently first (repeatable)");
    println!("  --page-capacity <n>     Nodes per heap page (default 128)");
    println!("  --grow-threshold <n>    Add a page when a collection frees fewer nodes (default 100)");
    println!("  --max-pages <n>         Upper bound on heap pages (default unlimited)");
    println!("  --max-depth <n>         Evaluation nesting limit (default {})", DEFAULT_MAX_DEPTH);
    println!("  --trace                 Log at trace level");
    println!("  --help, -h              Show this help message");
    println!();
    println!("Environment variables:");
    println!("  RUST_LOG=<filter>   Log filter (default warn)");
    println!("  KONS_TRACE=1        Same as --trace");
}

fn init_logging(trace: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if trace {
        builder.filter_level(log::LevelFilter::Trace);
    }
    builder.init();
}

/// Evaluation faults end the process. Every fault goes through here.
fn fatal_fault(err: KonsError) -> ! {
    log::error!("evaluation fault: {:?}", err);
    eprintln!("{}", err);
    std::process::exit(1);
}

fn read_file(path: &str) -> String {
    match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

/// Read and evaluate one form at a time, so unread text never holds heap
/// references. Returns false if reading stopped on a syntax error.
fn run_source(machine: &mut Machine, input: &str, print: bool) -> bool {
    let mut pos = 0;
    loop {
        match reader::read_one_at(input, pos, &mut machine.heap, &mut machine.symbols) {
            Ok(Some((expr, new_pos))) => {
                pos = new_pos;
                match machine.eval(expr) {
                    Ok(val) => {
                        if print {
                            println!("{}", printer::describe(val, &machine.heap, &machine.symbols));
                        }
                    }
                    Err(e) => fatal_fault(e),
                }
            }
            Ok(None) => return true,
            Err(KonsError::EndOfInput) => {
                eprintln!("{}", KonsError::EndOfInput);
                return true;
            }
            Err(e) => {
                eprintln!("{}", e);
                return false;
            }
        }
    }
}

/// Piped mode: read all of stdin, then evaluate it form by form.
fn run_piped(machine: &mut Machine) {
    let mut input = String::new();
    if let Err(e) = io::stdin().read_to_string(&mut input) {
        eprintln!("Read error: {}", e);
        std::process::exit(1);
    }
    if !run_source(machine, &input, true) {
        std::process::exit(1);
    }
}

/// Interactive REPL: lines accumulate while the reader reports that the
/// pending form is unfinished.
fn run_interactive(machine: &mut Machine) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Could not initialize REPL: {}", e);
            std::process::exit(1);
        }
    };
    let mut buf = String::new();

    loop {
        let prompt = if buf.is_empty() { "> " } else { "  " };
        let line = match rl.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Eof) | Err(ReadlineError::Interrupted) => break,
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        };
        if !line.trim().is_empty() {
            let _ = rl.add_history_entry(line.as_str());
        }
        buf.push_str(&line);
        buf.push('\n');

        let mut pos = 0;
        loop {
            match reader::read_one_at(&buf, pos, &mut machine.heap, &mut machine.symbols) {
                Ok(Some((expr, new_pos))) => {
                    pos = new_pos;
                    match machine.eval(expr) {
                        Ok(val) => {
                            println!("{}", printer::describe(val, &machine.heap, &machine.symbols))
                        }
                        Err(e) => fatal_fault(e),
                    }
                }
                Ok(None) => {
                    buf.clear();
                    break;
                }
                Err(KonsError::EndOfInput) => {
                    buf.drain(..pos);
                    break;
                }
                Err(e) => {
                    eprintln!("{}", e);
                    buf.clear();
                    break;
                }
            }
        }
    }
}

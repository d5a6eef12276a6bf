use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use bytecode::Program;
use clap::{Parser as ClapParser, Subcommand};
use heap::HeapCreateInfo;
use log::LevelFilter;

use vm::{Fixture, FixtureError, Image, Prepared, VMCreateInfo, exit_status};

const EXIT_FAILURE: i32 = 1;
const EXIT_LOAD_ERROR: i32 = 2;

#[derive(ClapParser, Debug)]
#[command(author, version, about = "Typed stack bytecode VM", long_about = None)]
struct Cli {
    /// Raise the log level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a fixture or program binary and print the resulting stack or trap
    Run {
        #[arg(help = "The .json fixture or program binary to run")]
        image: PathBuf,

        /// Print the program listing before running
        #[arg(short, long)]
        disassemble: bool,

        #[arg(long, default_value_t = VMCreateInfo::default().stack_limit)]
        stack_limit: usize,

        #[arg(long, default_value_t = VMCreateInfo::default().frame_limit)]
        frame_limit: usize,

        /// Pass these strings to the entry function as `args: str[]`
        #[arg(last = true)]
        args: Vec<String>,
    },
    /// Print the listing of every function in a fixture or program binary
    #[command(alias = "asm")]
    Disassemble { image: PathBuf },
    /// Show the header and table sizes of a program binary
    Info { binary: PathBuf },
    /// Write a fixture's functions as a program binary
    Build {
        fixture: PathBuf,

        /// Output path, the fixture path with a .fub extension by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Run fixtures and compare them with their expectations
    Check {
        #[arg(required = true)]
        fixtures: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli.command {
        Command::Run {
            image,
            disassemble,
            stack_limit,
            frame_limit,
            args,
        } => {
            let info = VMCreateInfo {
                stack_limit,
                frame_limit,
            };
            run(&image, disassemble, &info, &args)
        }
        Command::Disassemble { image } => disassemble_image(&image),
        Command::Info { binary } => show_info(&binary, cli.verbose > 0),
        Command::Build { fixture, output } => build(&fixture, output.as_deref()),
        Command::Check { fixtures } => check(&fixtures),
    };
    process::exit(code);
}

fn init_logging(verbose: u8) {
    let mut builder = env_logger::Builder::from_default_env();
    let level = match verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.format_timestamp(None).init();
}

fn prepare(path: &Path) -> Result<Prepared, FixtureError> {
    Fixture::load(path)?.prepare(HeapCreateInfo::default())
}

fn run(path: &Path, disassemble: bool, info: &VMCreateInfo, args: &[String]) -> i32 {
    let image = match Image::load(path) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("Error loading '{}': {}", path.display(), err);
            return EXIT_LOAD_ERROR;
        }
    };
    let mut prepared = match image.prepare(HeapCreateInfo::default(), args) {
        Ok(prepared) => prepared,
        Err(err) => {
            eprintln!("Error preparing '{}': {}", path.display(), err);
            return EXIT_LOAD_ERROR;
        }
    };

    if disassemble {
        print_listing(&prepared.program);
    }

    let outcome = match prepared.run(info) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("Error starting '{}': {}", path.display(), err);
            return EXIT_LOAD_ERROR;
        }
    };

    let mut code = match &outcome {
        Ok(stack) => {
            for value in stack {
                println!("{value}");
            }
            if image.is_binary() {
                exit_status(stack)
            } else {
                0
            }
        }
        Err(trap) => {
            eprintln!("trap: {trap}");
            EXIT_FAILURE
        }
    };

    // Expectations only describe the fixture's own arguments.
    if args.is_empty() {
        if let Err(mismatch) = prepared.check(&outcome) {
            eprintln!("expectation failed: {mismatch}");
            code = EXIT_FAILURE;
        }
    }
    code
}

fn print_listing(program: &Program) {
    for (idx, function) in program.functions().iter().enumerate() {
        println!(
            "== {idx}: {} (args {}, locals {}, returns {}) ==",
            function.name, function.arity, function.locals, function.returns
        );
        print!("{}", bytecode::disassemble(&function.code));
    }
}

fn disassemble_image(path: &Path) -> i32 {
    match Image::load(path).and_then(|image| image.program()) {
        Ok(program) => {
            print_listing(&program);
            0
        }
        Err(err) => {
            eprintln!("Error loading '{}': {}", path.display(), err);
            EXIT_LOAD_ERROR
        }
    }
}

fn show_info(path: &Path, verbose: bool) -> i32 {
    let (program, info) = match Image::load(path) {
        Ok(Image::Binary { program, info }) => (program, info),
        Ok(Image::Fixture(_)) => {
            eprintln!("'{}' is a fixture, not a program binary", path.display());
            return EXIT_LOAD_ERROR;
        }
        Err(err) => {
            eprintln!("Error loading '{}': {}", path.display(), err);
            return EXIT_LOAD_ERROR;
        }
    };

    println!("Flags:\t\t{} (1 byte)", info.flags);
    if let Some(entry) = info.entry {
        println!("Entrypoint:\t{entry:#010x} (4 bytes)");
    }
    println!("Types:\t\t{}", info.types);
    println!("Strings:\t{} ({} bytes total)", info.strings, info.string_bytes);
    println!(
        "Bytecode:\t{} functions ({} bytes total)",
        info.functions, info.code_bytes
    );
    println!("Debug info:\t{} bytecode-to-source maps", info.source_maps);
    if verbose {
        for (idx, function) in program.functions().iter().enumerate() {
            println!(
                "\t#{idx} {} (args {}, locals {}, returns {}, {} bytes)",
                function.name,
                function.arity,
                function.locals,
                function.returns,
                function.code.len()
            );
        }
    }
    0
}

fn build(path: &Path, output: Option<&Path>) -> i32 {
    let bytes = Fixture::load(path)
        .and_then(|fixture| fixture.program())
        .map_err(|err| err.to_string())
        .and_then(|program| program.to_binary().map_err(|err| err.to_string()));
    let bytes = match bytes {
        Ok(bytes) => bytes,
        Err(err) => {
            eprintln!("Error building '{}': {}", path.display(), err);
            return EXIT_LOAD_ERROR;
        }
    };

    let output = output.map_or_else(|| path.with_extension("fub"), Path::to_path_buf);
    if let Err(err) = fs::write(&output, &bytes) {
        eprintln!("Error writing '{}': {}", output.display(), err);
        return EXIT_LOAD_ERROR;
    }
    println!("wrote {} ({} bytes)", output.display(), bytes.len());
    0
}

fn check(paths: &[PathBuf]) -> i32 {
    let info = VMCreateInfo::default();
    let mut worst = 0;

    for path in paths {
        let mut prepared = match prepare(path) {
            Ok(prepared) => prepared,
            Err(err) => {
                eprintln!("{}: load error: {}", path.display(), err);
                worst = worst.max(EXIT_LOAD_ERROR);
                continue;
            }
        };
        let result = prepared
            .run(&info)
            .map_err(|err| err.to_string())
            .and_then(|outcome| prepared.check(&outcome).map_err(|err| err.to_string()));
        match result {
            Ok(()) => println!("{}: ok", path.display()),
            Err(err) => {
                println!("{}: FAILED: {}", path.display(), err);
                worst = worst.max(EXIT_FAILURE);
            }
        }
    }
    worst
}

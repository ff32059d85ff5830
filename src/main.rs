use std::path::PathBuf;

use arrayc::{
    frontend::{
        SourceFile, SourceFileOrigin,
        parser::{ParseError, Parser},
    },
    middle::optimization::{
        reorder_stores::{ReorderOptions, alias::StructuralAlias, reorder_stores},
        verify::verify_reorder_stores,
    },
};
use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use tracing::{Level, info};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Also forward stored values into stores of let-bound loads
    #[arg(long)]
    forward_through_lets: bool,

    /// Keep writes behind earlier reads and writes of the same location
    #[arg(long)]
    strict_hazards: bool,

    /// Never move a statement across a free of a buffer it uses
    #[arg(long)]
    free_barriers: bool,

    /// Check the result against the input and fail if it is not a legal
    /// reordering
    #[arg(long)]
    verify: bool,

    /// Print each program as parsed before the reordered one
    #[arg(long)]
    print_input: bool,

    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn reorder_options(&self) -> ReorderOptions {
        ReorderOptions {
            forward_through_lets: self.forward_through_lets,
            strict_hazards: self.strict_hazards,
            free_barriers: self.free_barriers,
        }
    }

    fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

fn report_parse_error(source_file: &SourceFile, error: &ParseError) -> ! {
    let position = error.span().start;

    eprintln!(
        "{} ({}:{}:{})",
        error,
        source_file.origin,
        source_file.row_for_position(position),
        source_file.column_for_position(position)
    );
    eprintln!("    {}", source_file.line_for_position(position));
    eprintln!(
        "    {:>width$}",
        "^",
        width = source_file.column_for_position(position)
    );
    std::process::exit(1);
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    let options = args.reorder_options();

    for path in &args.source_files {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(error) => Args::command()
                .error(
                    ErrorKind::Io,
                    format!("Failed to read '{}': {error}", path.display()),
                )
                .exit(),
        };

        let source_file = SourceFile::new(contents, SourceFileOrigin::File(path.clone()));

        let program = match Parser::parse_program(&source_file) {
            Ok(program) => program,
            Err(error) => report_parse_error(&source_file, &error),
        };

        if args.print_input {
            println!("// {} (input)", source_file.origin);
            print!("{program}");
        }

        let reordered = reorder_stores(&program, &options);

        if args.verify {
            if let Err(error) = verify_reorder_stores(&program, &reordered, &options, &StructuralAlias) {
                eprintln!("Verification failed ({}): {error}", source_file.origin);
                std::process::exit(1);
            }

            info!(file = %source_file.origin, "reordering verified");
        }

        if args.print_input {
            println!("// {} (reordered)", source_file.origin);
        }
        print!("{reordered}");
    }
}

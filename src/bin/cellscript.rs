use std::{fs, io, path::PathBuf, process::ExitCode};

use clap::{ArgAction, Parser, Subcommand};
use tracing::level_filters::LevelFilter;

use cellscript::{
    diagnostics::Result, library, output::select_output, Context, EngineConfig, ExecutionHost,
    ExecutionLimits, Interpreter, Repl,
};

#[derive(Parser)]
#[command(author, version, about = "Notebook cell scripting engine")]
struct Args {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Maximum statements and loop iterations per run (0 disables the limit)
    #[arg(long, global = true)]
    max_steps: Option<u64>,
    /// Wall-clock limit per run, in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,
    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a cell script file
    Run { script: PathBuf },
    /// Evaluate a snippet of cell code
    Eval { source: String },
    /// Start an interactive notebook session
    Repl,
    /// Serve newline-delimited JSON execute requests on stdin/stdout
    Serve,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level, args.verbose);

    match dispatch(args.command.unwrap_or(Command::Repl), config.limits()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = EngineConfig::load_or_default(args.config.as_deref())?;
    if let Some(steps) = args.max_steps {
        config.max_steps = Some(steps);
    }
    if let Some(timeout) = args.timeout_ms {
        config.timeout_ms = Some(timeout);
    }
    Ok(config)
}

fn init_tracing(level: &str, verbose: u8) {
    const LEVELS: [LevelFilter; 6] = [
        LevelFilter::OFF,
        LevelFilter::ERROR,
        LevelFilter::WARN,
        LevelFilter::INFO,
        LevelFilter::DEBUG,
        LevelFilter::TRACE,
    ];
    let base = level.parse::<LevelFilter>().unwrap_or(LevelFilter::WARN);
    let index = LEVELS.iter().position(|l| *l == base).unwrap_or(2);
    let effective = LEVELS[(index + verbose as usize).min(LEVELS.len() - 1)];
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(effective)
        .with_target(false)
        .init();
}

fn dispatch(command: Command, limits: ExecutionLimits) -> Result<ExitCode> {
    match command {
        Command::Run { script } => {
            let source = fs::read_to_string(&script)?;
            run_source(&source, limits)
        }
        Command::Eval { source } => run_source(&source, limits),
        Command::Repl => {
            Repl::new(library::shared(), limits).run()?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve => {
            let host = ExecutionHost::standard().with_limits(limits);
            host.serve(io::stdin().lock(), io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_source(source: &str, limits: ExecutionLimits) -> Result<ExitCode> {
    let mut interpreter = Interpreter::new(library::shared()).with_limits(limits);
    let mut context = Context::new();
    match interpreter.eval_source(source, &mut context) {
        Ok(evaluation) => {
            for display in &evaluation.displays {
                println!("{}", display.value.to_text());
            }
            if evaluation.displays.is_empty() {
                println!("{}", serde_json::to_string(&select_output(&evaluation))?);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(diagnostic) => {
            eprintln!("error: {diagnostic}");
            Ok(ExitCode::FAILURE)
        }
    }
}

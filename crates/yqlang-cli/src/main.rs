//! `yq` — console driver for yqlang scripts.
//!
//! With a script path, compiles and runs it once against the event flags,
//! printing the buffered actions (or the final value) and optionally
//! persisting globals to a JSON file between invocations. Without a path it
//! opens a line-accumulating REPL: input is read until it parses, `exit`,
//! `stop`, or end-of-file terminates the session.

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing_subscriber::EnvFilter;
use yqlang::{
    Action, BufferHost, EventMap, Program, ReplOutcome, ReplSession, Runner, RunnerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "yq", version, about = "Run yqlang scripts or start a REPL")]
struct Cli {
    /// Script file to run; omit for an interactive session.
    script: Option<PathBuf>,

    /// JSON file holding persisted globals; read before the run and written
    /// back afterwards.
    #[arg(long)]
    globals: Option<PathBuf>,

    /// Bind the `text` event global.
    #[arg(long)]
    text: Option<String>,

    /// Bind the `sender` event global.
    #[arg(long)]
    sender: Option<i64>,

    /// Bind the `clock` event global.
    #[arg(long)]
    clock: Option<i64>,

    /// Bind the `nudged` event global.
    #[arg(long)]
    nudged: Option<i64>,

    /// Per-run CPU budget in milliseconds (excludes sleeps).
    #[arg(long, default_value_t = 800)]
    allowance_ms: u64,

    /// Print the compiled bytecode and exit.
    #[arg(long)]
    dump_bytecode: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match &cli.script {
        Some(path) => run_script(&cli, path),
        None => run_repl(&cli),
    }
}

fn run_script(cli: &Cli, path: &PathBuf) -> ExitCode {
    let source = match std::fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("error reading {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    };
    let name = path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let program = match Program::compile(&source, &name) {
        Ok(program) => program,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.dump_bytecode {
        print!("{}", program.disassemble());
        return ExitCode::SUCCESS;
    }

    let prior = match load_globals(cli) {
        Ok(prior) => prior,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let config = RunnerConfig::default().allowance_ms(cli.allowance_ms);
    let runner = Runner::new(program, config);
    let outcome = match runner.run(build_events(cli), prior, BufferHost::new()) {
        Ok(outcome) => outcome,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    for action in &outcome.actions {
        print_action(action);
    }
    if outcome.actions.is_empty() && outcome.value_repr != "null" && !outcome.value_repr.is_empty() {
        println!("{}", outcome.value_repr);
    }

    if let Some(path) = &cli.globals {
        let rendered = serde_json::to_string_pretty(&serde_json::Value::Object(outcome.globals))
            .expect("globals serialize to JSON");
        if let Err(err) = std::fs::write(path, rendered) {
            eprintln!("error writing {}: {err}", path.display());
            return ExitCode::FAILURE;
        }
    }

    match outcome.error {
        Some(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}

fn run_repl(cli: &Cli) -> ExitCode {
    let config = RunnerConfig::default().allowance_ms(cli.allowance_ms);
    let mut session = ReplSession::with_config(config);
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(err) => {
            eprintln!("error initializing terminal: {err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        let prompt = if session.is_pending() { "... " } else { ">>> " };
        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                session.reset();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{err}");
                break;
            }
        };

        let trimmed = line.trim();
        if !session.is_pending() && (trimmed == "exit" || trimmed == "stop") {
            break;
        }
        if trimmed.is_empty() && !session.is_pending() {
            continue;
        }
        let _ = editor.add_history_entry(&line);

        match session.feed(&line) {
            ReplOutcome::NeedMore => {}
            ReplOutcome::CompileError(err) => eprintln!("{err}"),
            ReplOutcome::Ran(run) => {
                for action in &run.actions {
                    print_action(action);
                }
                if let Some(err) = run.error {
                    eprintln!("{err}");
                } else if run.actions.is_empty() && run.value_repr != "null" {
                    println!("{}", run.value_repr);
                }
            }
        }
    }
    ExitCode::SUCCESS
}

fn build_events(cli: &Cli) -> EventMap {
    let mut events = EventMap::new();
    if let Some(text) = &cli.text {
        events = events.with_text(text.clone());
    }
    if let Some(sender) = cli.sender {
        events = events.with_sender(sender);
    }
    if let Some(clock) = cli.clock {
        events = events.with_clock(clock);
    }
    if let Some(nudged) = cli.nudged {
        events = events.with_nudged(nudged);
    }
    events
}

fn load_globals(cli: &Cli) -> Result<Option<serde_json::Map<String, serde_json::Value>>, String> {
    let Some(path) = &cli.globals else {
        return Ok(None);
    };
    match std::fs::read_to_string(path) {
        Err(_) => Ok(None), // first run: no persisted state yet
        Ok(raw) => match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(serde_json::Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(format!("{}: expected a JSON object", path.display())),
            Err(err) => Err(format!("{}: {err}", path.display())),
        },
    }
}

fn print_action(action: &Action) {
    match action {
        Action::Text(text) => println!("{text}"),
        Action::Nudge(target) => println!("[nudge {target}]"),
        Action::PicSave(id) => println!("[picsave {id}]"),
        Action::PicSend(id) => println!("[picsend {id}]"),
    }
}

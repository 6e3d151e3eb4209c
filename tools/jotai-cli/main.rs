use clap::Parser;
use jotai::builder::StateMachine;
use jotai::config::EngineConfig;
use jotai::definition::{FileSystemLibraryResolver, StateMachineArtifact, StateMachineDefinition};
use jotai::execution::{ExecutionEngine, ExecutionEvent};
use jotai::model::{PortValues, Value};
use jotai::trace::HistoryFormatter;
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Runs hierarchical state machines stored as JSON or binary artifacts
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the state machine JSON file (or artifact with --artifact)
    machine_path: String,

    /// Treat the machine path as a binary artifact
    #[arg(long)]
    artifact: bool,

    /// Library root in the form NAME=DIR, may be repeated
    #[arg(short, long = "library", value_name = "NAME=DIR")]
    libraries: Vec<String>,

    /// Optional engine configuration JSON file
    #[arg(short, long)]
    config: Option<String>,

    /// Root input in the form KEY=JSON, may be repeated
    #[arg(long = "input", value_name = "KEY=JSON")]
    inputs: Vec<String>,

    /// Save the resolved machine as a binary artifact before running
    #[arg(long, value_name = "PATH")]
    save_artifact: Option<String>,

    /// Print the execution history after the run
    #[arg(long)]
    history: bool,

    /// Drive the execution interactively from stdin
    #[arg(short = 'i', long)]
    interactive: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let total_start = Instant::now();

    // --- 1. Loading ---
    let definition = if cli.artifact {
        StateMachineArtifact::from_file(&cli.machine_path)
            .map(|artifact| artifact.definition)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to load artifact '{}': {}", cli.machine_path, e)))
    } else {
        StateMachineDefinition::from_file(&cli.machine_path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to load '{}': {}", cli.machine_path, e)))
    };
    let config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to load config '{}': {}", path, e))),
        None => EngineConfig::default(),
    };

    let mut resolver = FileSystemLibraryResolver::new();
    for library in &cli.libraries {
        let (name, dir) = split_pair(library, "--library");
        resolver.add_root(name, dir);
    }
    let inputs = parse_inputs(&cli.inputs);

    // --- 2. Building ---
    let build_start = Instant::now();
    let machine = StateMachine::builder(definition)
        .with_library_resolver(resolver)
        .build()
        .unwrap_or_else(|e| exit_with_error(&format!("Build failed: {}", e)));
    let build_duration = build_start.elapsed();
    println!("Built state machine '{}' in {:?}", machine.name(), build_duration);

    if let Some(path) = &cli.save_artifact {
        machine
            .artifact()
            .save(path)
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to save artifact '{}': {}", path, e)));
        println!("Saved artifact to '{}'", path);
    }

    // --- 3. Execution ---
    let engine = ExecutionEngine::with_config(machine, config).with_inputs(inputs);
    let run_start = Instant::now();
    if cli.interactive {
        run_interactive(&engine);
    } else {
        engine
            .start()
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to start: {}", e)));
    }
    engine
        .join()
        .unwrap_or_else(|e| exit_with_error(&format!("Execution failed: {}", e)));
    let run_duration = run_start.elapsed();

    // --- 4. Results ---
    println!("\nExecution Finished! ({})", engine.mode());
    match engine.last_output() {
        Some(output) => {
            println!("  -> Outcome: {}", output.outcome);
            println!("  -> Outputs: {}", HistoryFormatter::format_values(&output.outputs));
        }
        None => println!("  -> The root state did not return"),
    }
    if cli.history {
        println!("\n--- History ---");
        println!("{}", HistoryFormatter::format_history(&engine.history()));
    }

    println!("\n--- Performance Summary ---");
    println!("Build:            {:?}", build_duration);
    println!("Execution:        {:?}", run_duration);
    println!("Total:            {:?}", total_start.elapsed());
}

/// Reads control commands from stdin until the run finishes or the user quits.
fn run_interactive(engine: &ExecutionEngine) {
    let entered = Arc::new(Mutex::new(String::new()));
    let last_entered = entered.clone();
    engine.events().subscribe(Arc::new(move |event: &ExecutionEvent| {
        if let ExecutionEvent::StateEntered { path } = event {
            *last_entered.lock() = path.clone();
        }
    }));

    println!("--- Jotai Interactive Mode ---");
    println!("Commands: start, pause, stop, into, over, out, back, run-to <path>, status, quit");
    let stdin = io::stdin();
    loop {
        print!("> ");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let mut words = line.split_whitespace();
        let result = match words.next() {
            Some("start") => engine.start(),
            Some("pause") => {
                if !engine.pause() {
                    println!("Nothing to pause.");
                }
                Ok(())
            }
            Some("stop") => engine.stop(),
            Some("into") => engine.step_into(),
            Some("over") => engine.step_over(),
            Some("out") => engine.step_out(),
            Some("back") => engine.step_backward(),
            Some("run-to") => match words.next() {
                Some(path) => engine.run_to_selected_state(path),
                None => {
                    println!("Usage: run-to <state path>");
                    Ok(())
                }
            },
            Some("status") => {
                let last = entered.lock().clone();
                println!("Mode: {}, last entered: {}", engine.mode(), last);
                Ok(())
            }
            Some("quit") => {
                let _ = engine.stop();
                break;
            }
            Some(other) => {
                println!("Unknown command '{}'", other);
                Ok(())
            }
            None => Ok(()),
        };
        if let Err(e) = result {
            println!("Error: {}", e);
        }
        if !engine.is_running() && engine.last_output().is_some() {
            break;
        }
    }
}

fn parse_inputs(raw: &[String]) -> PortValues {
    let mut inputs = PortValues::default();
    for entry in raw {
        let (key, json) = split_pair(entry, "--input");
        let value: serde_json::Value = serde_json::from_str(json)
            .unwrap_or_else(|_| serde_json::Value::String(json.to_string()));
        inputs.insert(key.to_string(), Value::from(value));
    }
    inputs
}

fn split_pair<'a>(raw: &'a str, flag: &str) -> (&'a str, &'a str) {
    raw.split_once('=')
        .unwrap_or_else(|| exit_with_error(&format!("{} expects KEY=VALUE, got '{}'", flag, raw)))
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}

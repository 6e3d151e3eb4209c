use clap::Parser;
use jotai::definition::{StateDefinition, StateMachineDefinition};
use jotai::model::{DataType, Value};
use rand::Rng;
use rand::rngs::ThreadRng;

/// A CLI tool to generate random state machines for the Jotai engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// The path to write the generated JSON file to
    #[arg(short, long, default_value = "generated_statemachine.json")]
    output: String,

    /// Maximum nesting depth of containers
    #[arg(long, default_value_t = 3)]
    depth: usize,

    /// Maximum number of children per container
    #[arg(long, default_value_t = 4)]
    width: usize,

    /// Upper bound in seconds for the duration of generated wait states
    #[arg(long, default_value_t = 0.2)]
    max_wait: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut rng = rand::rng();

    if cli.width == 0 {
        eprintln!("Error: --width must be at least 1");
        std::process::exit(1);
    }

    println!(
        "Generating state machine (depth up to {}, up to {} children per container)...",
        cli.depth, cli.width
    );

    let mut counter = 0;
    let root = generate_container(&mut rng, &cli, cli.depth, &mut counter, "root".to_string());
    let definition = StateMachineDefinition::new("generated", root);
    definition.save(&cli.output)?;

    println!("Successfully generated {} states and saved them to '{}'", counter, cli.output);
    Ok(())
}

fn next_id(counter: &mut usize, prefix: &str) -> String {
    *counter += 1;
    format!("{}_{}", prefix, counter)
}

/// A random leaf: mostly waits, sometimes a sum.
fn generate_leaf(rng: &mut ThreadRng, cli: &Cli, counter: &mut usize) -> StateDefinition {
    if rng.random_bool(0.7) {
        let duration = rng.random_range(0.0..=cli.max_wait);
        StateDefinition::execution(next_id(counter, "wait"), "wait")
            .with_input_default("duration", DataType::Float, Value::Float(duration))
            .with_output("waited", DataType::Float)
            .with_outcome(0, "success")
    } else {
        StateDefinition::execution(next_id(counter, "sum"), "sum")
            .with_input_default("a", DataType::Int, Value::Int(rng.random_range(0..100)))
            .with_input_default("b", DataType::Int, Value::Int(rng.random_range(0..100)))
            .with_output("sum", DataType::Int)
            .with_outcome(0, "success")
    }
}

fn generate_child(rng: &mut ThreadRng, cli: &Cli, depth: usize, counter: &mut usize) -> StateDefinition {
    if depth > 0 && rng.random_bool(0.3) {
        let id = next_id(counter, "container");
        generate_container(rng, cli, depth - 1, counter, id)
    } else {
        generate_leaf(rng, cli, counter)
    }
}

/// Generates a hierarchy, barrier or preemptive container with random children.
/// Every generated machine finishes with outcome 0.
fn generate_container(
    rng: &mut ThreadRng,
    cli: &Cli,
    depth: usize,
    counter: &mut usize,
    id: String,
) -> StateDefinition {
    *counter += 1;
    let count = rng.random_range(1..=cli.width);
    let children: Vec<StateDefinition> = (0..count).map(|_| generate_child(rng, cli, depth, counter)).collect();
    let ids: Vec<String> = children.iter().map(|c| c.id.clone()).collect();

    let mut container = match rng.random_range(0..3) {
        0 if depth < cli.depth => StateDefinition::barrier(id),
        1 if depth < cli.depth => StateDefinition::preemptive(id),
        _ => StateDefinition::hierarchy(id).with_start_state(ids[0].clone()),
    }
    .with_outcome(0, "done");
    let sequential = container.container().is_some_and(|c| c.start_state.is_some());

    for child in children {
        container = container.with_state(child);
    }
    for (i, child_id) in ids.iter().enumerate() {
        container = match ids.get(i + 1) {
            Some(next) if sequential => container.with_transition(child_id.clone(), 0, Some(next.as_str()), None),
            _ => container.with_transition(child_id.clone(), 0, None, Some(0)),
        };
    }
    container
}

use anyhow::{Context, Result};
use box_core::{Field, FieldKind, FieldSchema, FieldSet, PrimitiveValue};
use box_graph::{BoxGraph, BoxNode, Editing, GraphConfig};
use box_sync::{run_simulator, Settings, SimulatorConfig};
use box_test_utils::{random_edit, registry};
use bytes::Bytes;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use rand::{rngs::StdRng, SeedableRng};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Command::new("boxgraph")
        .version(box_sync::VERSION)
        .about("Box graph sync simulator and project file tools")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Mirror random edits to a replica and verify convergence")
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Number of random edits"),
                )
                .arg(
                    Arg::new("drop-every")
                        .long("drop-every")
                        .default_value("0")
                        .value_parser(value_parser!(u64))
                        .help("Drop every n-th batch in transit to exercise resync"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML settings file with [graph], [editing] and [sync] tables"),
                ),
        )
        .subcommand(
            Command::new("generate")
                .about("Write a project snapshot built from random edits")
                .arg(
                    Arg::new("output")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Snapshot file to write"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64)),
                )
                .arg(
                    Arg::new("steps")
                        .long("steps")
                        .default_value("100")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Decode a project snapshot and print its boxes")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Snapshot file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(Command::new("schemas").about("Print the fixture schema registry as JSON"));

    let matches = cli.get_matches();
    match matches.subcommand() {
        Some(("simulate", args)) => simulate(args),
        Some(("generate", args)) => generate(args),
        Some(("inspect", args)) => inspect(args),
        Some(("schemas", _)) => {
            println!("{}", registry().to_json()?);
            Ok(())
        }
        _ => Ok(()),
    }
}

fn arg<T: Clone + Send + Sync + 'static>(args: &ArgMatches, name: &str) -> Result<T> {
    args.get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing --{name}"))
}

fn simulate(args: &ArgMatches) -> Result<()> {
    let settings = match args.get_one::<PathBuf>("config") {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let config = SimulatorConfig {
        seed: arg(args, "seed")?,
        steps: arg(args, "steps")?,
        drop_every: arg(args, "drop-every")?,
        settings,
    };

    println!("Running box graph sync simulator...");
    println!("Seed: {}", config.seed);
    println!("Steps: {}", config.steps);
    println!("Drop Every: {}", config.drop_every);
    println!();

    let report = run_simulator(config);
    println!("{}", report.generate_text());
    std::process::exit(if report.passed() { 0 } else { 1 });
}

fn generate(args: &ArgMatches) -> Result<()> {
    let output: PathBuf = arg(args, "output")?;
    let mut rng = StdRng::seed_from_u64(arg(args, "seed")?);
    let steps: u64 = arg(args, "steps")?;

    let mut graph = BoxGraph::new(registry());
    let mut editing = Editing::default();
    for _ in 0..steps {
        if let Err(err) = random_edit(&mut editing, &mut graph, &mut rng) {
            tracing::debug!(error = %err, "edit rejected");
        }
    }
    let snapshot = graph.to_snapshot();
    std::fs::write(&output, &snapshot)
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!(
        "Wrote {} boxes ({} bytes, checksum {}) to {}",
        graph.box_count(),
        snapshot.len(),
        graph.checksum(),
        output.display()
    );
    Ok(())
}

fn inspect(args: &ArgMatches) -> Result<()> {
    let path: PathBuf = arg(args, "file")?;
    let bytes = std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let graph = BoxGraph::from_snapshot(GraphConfig::default(), registry(), Bytes::from(bytes))
        .with_context(|| format!("failed to decode {}", path.display()))?;

    if args.get_flag("json") {
        let boxes: Vec<Value> = graph.boxes().map(|node| box_json(&graph, node)).collect();
        let document = json!({
            "checksum": graph.checksum().to_hex(),
            "boxes": boxes,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Boxes: {}", graph.box_count());
    println!("Checksum: {}", graph.checksum());
    for node in graph.boxes() {
        println!();
        println!("{} {} (incoming {})", node.uuid(), node.name(), graph.incoming_to_box(node.uuid()).len());
        print_fields(&node.schema().fields, node.fields(), 1);
    }
    Ok(())
}

fn box_json(graph: &BoxGraph, node: &BoxNode) -> Value {
    json!({
        "uuid": node.uuid().to_string(),
        "name": node.name(),
        "incoming": graph.incoming_to_box(node.uuid()).len(),
        "fields": fields_json(&node.schema().fields, node.fields()),
    })
}

fn fields_json(schemas: &[FieldSchema], fields: &FieldSet) -> Value {
    let mut map = Map::new();
    for schema in schemas {
        if let Some(field) = fields.get(&[schema.key]) {
            map.insert(schema.name.clone(), field_json(schema, field));
        }
    }
    Value::Object(map)
}

fn field_json(schema: &FieldSchema, field: &Field) -> Value {
    match (field, &schema.kind) {
        (Field::Primitive(value), _) => primitive_json(value),
        (Field::Pointer(target), _) => target
            .as_ref()
            .map_or(Value::Null, |address| Value::String(address.to_string())),
        (Field::Array(items), FieldKind::Array { element, .. }) => {
            Value::Array(items.iter().map(|item| field_json(element, item)).collect())
        }
        (Field::Object(set), FieldKind::Object { fields }) => fields_json(fields, set),
        _ => Value::Null,
    }
}

fn primitive_json(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::Int32(v) => json!(v),
        PrimitiveValue::Float32(v) => json!(v),
        PrimitiveValue::Boolean(v) => json!(v),
        PrimitiveValue::String(v) => json!(v),
        PrimitiveValue::Bytes(v) => json!(hex::encode(v)),
    }
}

fn print_fields(schemas: &[FieldSchema], fields: &FieldSet, depth: usize) {
    let indent = "  ".repeat(depth);
    for schema in schemas {
        let Some(field) = fields.get(&[schema.key]) else {
            continue;
        };
        match (field, &schema.kind) {
            (Field::Object(set), FieldKind::Object { fields }) => {
                println!("{indent}{} ({}):", schema.name, schema.key);
                print_fields(fields, set, depth + 1);
            }
            (Field::Target, _) => {}
            _ => println!("{indent}{} ({}) = {}", schema.name, schema.key, field_json(schema, field)),
        }
    }
}

use std::path::Path;

use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use log::{error, info};
use tinylm_export::{Init, SyntheticModel, export_model, synthesize_model};
use tinylm_inference::{Backend, InferenceConfigBuilder, InferenceEngine, run_inference};

fn backend_arg() -> Arg {
    Arg::new("backend")
        .short('b')
        .long("backend")
        .value_name("STRING")
        .help("Backend: cpu|cuda|metal [default: cpu]")
        .default_value("cpu")
}

/// Define the export subcommand.
fn export_subcommand() -> Command {
    Command::new("export")
        .about("Export rank-2 SafeTensors weights into a layer-stack model file")
        .arg(Arg::new("MODEL_PATH")
            .help("SafeTensors file or directory (an optional layers.json selects and orders layers)")
            .required(true)
            .index(1))
        .arg(Arg::new("OUTPUT_PATH")
            .help("Output path for the model file")
            .required(true)
            .index(2))
}

/// Define the synth subcommand.
fn synth_subcommand() -> Command {
    Command::new("synth")
        .about("Generate a model file with synthetic weights")
        .arg(Arg::new("OUTPUT_PATH")
            .help("Output path for the model file")
            .required(true)
            .index(1))
        .arg(Arg::new("input-width")
            .short('w')
            .long("input-width")
            .value_name("INT")
            .help("Width of the first layer's input")
            .default_value("8")
            .value_parser(clap::value_parser!(u32)))
        .arg(Arg::new("layers")
            .short('l')
            .long("layers")
            .value_name("LIST")
            .help("Comma-separated output widths of successive layers")
            .default_value("16,256"))
        .arg(Arg::new("init")
            .long("init")
            .value_name("STRING")
            .help("Weight init: identity|uniform [default: uniform]")
            .default_value("uniform"))
        .arg(Arg::new("seed")
            .short('s')
            .long("seed")
            .value_name("INT")
            .help("Random seed for uniform init")
            .default_value("42")
            .value_parser(clap::value_parser!(u64)))
        .arg(Arg::new("scale")
            .long("scale")
            .value_name("FLOAT")
            .help("Uniform init range [-scale, scale)")
            .default_value("1.0")
            .value_parser(clap::value_parser!(f32)))
}

/// Define the inference subcommand.
fn inference_subcommand() -> Command {
    Command::new("inference")
        .about("Run byte-level generation over a layer-stack model")
        .arg(
            Arg::new("checkpoint")
                .help("Model file")
                .required(true)
                .index(1),
        )
        .arg(backend_arg())
        .arg(
            Arg::new("max-tokens")
                .short('n')
                .long("max-tokens")
                .value_name("INT")
                .help("Number of bytes to generate, default 80")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("temperature")
                .short('t')
                .long("temperature")
                .value_name("FLOAT")
                .help("Temperature, accepted but selection is greedy, default 0.8")
                .value_parser(clap::value_parser!(f32)),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("STRING")
                .help("Mode: generate|chat [default: generate]")
                .default_value("generate"),
        )
        .arg(
            Arg::new("input")
                .short('i')
                .long("input")
                .value_name("STRING")
                .help("Input prompt"),
        )
        .arg(
            Arg::new("device-capacity")
                .long("device-capacity")
                .value_name("BYTES")
                .help("Cap the emulated accelerator memory")
                .value_parser(clap::value_parser!(usize)),
        )
}

/// Define the info subcommand.
fn info_subcommand() -> Command {
    Command::new("info")
        .about("Print backend and device information, optionally for a loaded model")
        .arg(backend_arg())
        .arg(Arg::new("checkpoint")
            .help("Model file to load")
            .index(1))
}

fn parse_backend(matches: &ArgMatches) -> Result<Backend> {
    matches.get_one::<String>("backend").map_or(Ok(Backend::default()), |value| value.parse())
}

fn run_export_command(matches: &ArgMatches) -> Result<()> {
    let model_path = matches.get_one::<String>("MODEL_PATH").map(String::as_str).unwrap_or_default();
    let output_path = matches.get_one::<String>("OUTPUT_PATH").map(String::as_str).unwrap_or_default();

    if !Path::new(model_path).exists() {
        anyhow::bail!("Model path does not exist: {model_path}");
    }

    info!("🚀 tinylm exporter");
    info!("📁 Model path: {model_path}");
    info!("💾 Output path: {output_path}");

    export_model(model_path, output_path)?;
    Ok(())
}

fn run_synth_command(matches: &ArgMatches) -> Result<()> {
    let output_path = matches.get_one::<String>("OUTPUT_PATH").map(String::as_str).unwrap_or_default();
    let input_width = matches.get_one::<u32>("input-width").copied().unwrap_or(8);

    let widths = matches
        .get_one::<String>("layers")
        .map(String::as_str)
        .unwrap_or_default()
        .split(',')
        .map(|width| width.trim().parse::<u32>().map_err(|_| anyhow::anyhow!("Invalid layer width: {width:?}")))
        .collect::<Result<Vec<_>>>()?;

    if input_width == 0 || widths.contains(&0) {
        anyhow::bail!("Layer widths must be positive");
    }

    let init = match matches.get_one::<String>("init").map(String::as_str) {
        Some("identity") => Init::Identity,
        Some("uniform") | None => Init::Uniform {
            seed: matches.get_one::<u64>("seed").copied().unwrap_or(42),
            scale: matches.get_one::<f32>("scale").copied().unwrap_or(1.0),
        },
        Some(other) => anyhow::bail!("Unknown init: {other}"),
    };

    let count = synthesize_model(output_path, &SyntheticModel::chain(input_width, &widths, init))?;
    info!("✅ Wrote {count} synthetic layers to {output_path}");
    Ok(())
}

fn run_inference_command(matches: &ArgMatches) -> Result<()> {
    let config = InferenceConfigBuilder::default()
        .model_path(matches.get_one::<String>("checkpoint"))
        .backend(Some(parse_backend(matches)?))
        .max_tokens(matches.get_one::<usize>("max-tokens").copied())
        .temperature(matches.get_one::<f32>("temperature").copied())
        .mode(matches.get_one::<String>("mode"))
        .prompt(matches.get_one::<String>("input"))
        .device_capacity(matches.get_one::<usize>("device-capacity").copied())
        .build()
        .map_err(|e| anyhow::anyhow!(e))?;

    run_inference(config).map_err(|e| anyhow::anyhow!("Inference failed: {e:#}"))?;

    Ok(())
}

fn run_info_command(matches: &ArgMatches) -> Result<()> {
    let mut engine = InferenceEngine::new(parse_backend(matches)?);

    if let Some(checkpoint) = matches.get_one::<String>("checkpoint") {
        let layers = engine.try_load_model(checkpoint)?;
        println!("Model: {checkpoint} ({layers} layers)");
        for (idx, weight) in engine.weights().iter().enumerate() {
            println!("  layer {idx}: {:?}{}", weight.shape(), if weight.is_on_device() { " [device]" } else { "" });
        }
    }

    println!("Backend: {}", engine.device_info());
    Ok(())
}

fn execute_commands() -> Result<()> {
    // Messages only, no timestamp or module prefix
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "{}", record.args())
        })
        .init();

    let matches = Command::new("tinylm")
        .about("tinylm CLI: export, synthesize and run layer-stack models")
        .subcommand(export_subcommand())
        .subcommand(synth_subcommand())
        .subcommand(inference_subcommand())
        .subcommand(info_subcommand())
        .get_matches();

    match matches.subcommand() {
        Some(("export", matches)) => run_export_command(matches),
        Some(("synth", matches)) => run_synth_command(matches),
        Some(("inference", matches)) => run_inference_command(matches),
        Some(("info", matches)) => run_info_command(matches),
        _ => anyhow::bail!("No subcommand specified. Use -h to print help information."),
    }
}

fn main() {
    if let Err(e) = execute_commands() {
        error!("Error: {e:#}");
        std::process::exit(1);
    }
}

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use onnx_digits::{
    config::{Config, OnnxConfig, DEFAULT_MODEL_FILE},
    digits::{EvaluationOptions, Evaluator, MnistTestSet},
    image::InputLayout,
    models::{ArtifactStore, OnnxClassifier},
    web::serve,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "onnx-digits")]
#[command(about = "ONNX-powered handwritten digit recognition service")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Log level
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Score a model on the MNIST test set
    Evaluate(EvaluateArgs),
    /// Copy an exported model into the models directory
    Publish(PublishArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// Server bind address
    #[arg(long, env = "DIGITS_BIND", default_value = "0.0.0.0:5000")]
    bind: String,

    /// Number of worker threads
    #[arg(long, env = "DIGITS_WORKERS")]
    workers: Option<usize>,

    /// Model directory path
    #[arg(long, env = "DIGITS_MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,

    /// Model file name inside the model directory
    #[arg(long, env = "DIGITS_MODEL_FILE", default_value = DEFAULT_MODEL_FILE)]
    model_file: String,

    /// Input tensor layout expected by the model
    #[arg(long, env = "DIGITS_INPUT_LAYOUT", value_enum, default_value_t = InputLayout::Flat)]
    input_layout: InputLayout,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

#[derive(Args)]
struct EvaluateArgs {
    /// ONNX model to evaluate
    #[arg(long, default_value = "models/mnist_model.onnx")]
    model: PathBuf,

    /// Directory containing all four uncompressed MNIST IDX files
    /// (train-images/train-labels/t10k-images/t10k-labels). The loader
    /// reads the training files too, so they must be present and complete.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Input tensor layout expected by the model
    #[arg(long, value_enum, default_value_t = InputLayout::Flat)]
    input_layout: InputLayout,

    /// Only evaluate the first N test images
    #[arg(long)]
    limit: Option<usize>,

    /// Number of misclassified samples to list
    #[arg(long, default_value_t = 5)]
    show_errors: usize,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PublishArgs {
    /// Freshly exported ONNX model
    #[arg(long)]
    source: PathBuf,

    /// Model directory path
    #[arg(long, env = "DIGITS_MODELS_DIR", default_value = "models")]
    models_dir: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Command::Serve(cli.serve)) {
        Command::Serve(args) => run_server(args),
        Command::Evaluate(args) => run_evaluation(args),
        Command::Publish(args) => run_publish(args),
    }
}

fn run_server(args: ServeArgs) -> Result<()> {
    tracing::info!("Starting ONNX digit recognition service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir.display());

    let config = Config::new(
        args.bind,
        args.models_dir,
        args.model_file,
        args.input_layout,
        args.workers,
        args.dev,
    )?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config))?;
    Ok(())
}

fn run_evaluation(args: EvaluateArgs) -> Result<()> {
    let model = OnnxClassifier::new(&args.model, &OnnxConfig::detect(), args.input_layout)?;
    let dataset = MnistTestSet::load(&args.data_dir)?;

    let options = EvaluationOptions {
        limit: args.limit,
        max_mistakes: args.show_errors,
    };
    let report = Evaluator::run(&model, &dataset, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "=".repeat(60));
    println!(
        "Accuracy: {}/{} = {:.2}%",
        report.correct,
        report.total,
        report.accuracy * 100.0
    );
    println!("{}", "=".repeat(60));
    for digit in &report.per_digit {
        println!(
            "  {}: {:>5}/{:<5} {:.2}%",
            digit.digit,
            digit.correct,
            digit.total,
            digit.accuracy * 100.0
        );
    }
    if !report.mistakes.is_empty() {
        println!("First misclassifications:");
        for mistake in &report.mistakes {
            println!(
                "  #{}: predicted={} ({:.1}%), actual={}",
                mistake.index,
                mistake.predicted,
                mistake.confidence * 100.0,
                mistake.actual
            );
        }
    }

    Ok(())
}

fn run_publish(args: PublishArgs) -> Result<()> {
    let store = ArtifactStore::new(args.models_dir);
    let published = store.publish(&args.source)?;

    println!("Archived:  {}", published.archived.display());
    println!("Canonical: {}", published.canonical.display());
    println!("Send POST /reload to a running service to pick up the new model.");
    Ok(())
}

use std::path::{Path, PathBuf};

use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use wann_common::WannConfig;
use wann_core::{SharedWeight, WannNetwork};
use wann_train::{weight_histograms, Trainer, TrainerConfig};

#[derive(Parser, Debug)]
#[command(name = "wann", about = "Weight-agnostic ternary network toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default network config to disk.
    InitConfig(InitConfigArgs),
    /// Build a network from config and print its shape and weight statistics.
    Inspect(InspectArgs),
    /// Train on the built-in parity toy problem.
    Train(TrainArgs),
}

#[derive(Parser, Debug)]
struct InitConfigArgs {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Layer sizes, input first (e.g. `--layer-sizes 4,3,2`).
    #[arg(long, value_delimiter = ',')]
    layer_sizes: Option<Vec<usize>>,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    /// Shared weight used for the sample forward pass.
    #[arg(long, default_value_t = 1.0, allow_hyphen_values = true)]
    shared_weight: f32,
}

#[derive(Parser, Debug)]
struct TrainArgs {
    #[arg(long, default_value = "config.json")]
    config: PathBuf,
    #[arg(long, default_value_t = 256)]
    samples: usize,
    #[arg(long, default_value_t = 2000)]
    max_steps: usize,
    #[arg(long, default_value_t = 1e-2)]
    lr: f64,
    #[arg(long, default_value_t = 0.0)]
    weight_decay: f64,
    #[arg(long, default_value_t = 100)]
    log_every: usize,
    #[arg(long, default_value_t = 500)]
    eval_every: usize,
    /// Log weight histograms every N steps (0 = never).
    #[arg(long, default_value_t = 500)]
    hist_every: usize,
    #[arg(long, default_value_t = 20)]
    hist_bins: usize,
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::InitConfig(args) => cmd_init_config(args),
        Command::Inspect(args) => cmd_inspect(args),
        Command::Train(args) => cmd_train(args),
    }
}

fn load_or_create_config(path: &Path) -> Result<WannConfig> {
    if path.exists() {
        return WannConfig::load(path);
    }
    let default = WannConfig::default();
    default.save(path)?;
    eprintln!("Created default config at {}", path.display());
    Ok(default)
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_init_config(args: InitConfigArgs) -> Result<()> {
    let config = match args.layer_sizes {
        Some(sizes) => WannConfig::with_layer_sizes(&sizes),
        None => WannConfig::default(),
    };
    config.validate().map_err(anyhow::Error::msg)?;
    config.save(&args.config)?;
    println!("Wrote {}", args.config.display());
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let config = load_or_create_config(&args.config)?;
    let device = Device::Cpu;
    let varmap = candle_nn::VarMap::new();
    let vb = candle_nn::VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let shared = SharedWeight::new(args.shared_weight, &device)?;
    let network = WannNetwork::from_config(&config, shared, vb)?;

    let (linear, mixture) = network.num_params();
    println!("layer sizes     : {:?}", network.layer_sizes());
    println!("feature widths  : {:?}", network.feature_widths());
    let menu: Vec<String> = config.activations.iter().map(|a| a.to_string()).collect();
    println!("activation menu : {}", menu.join(", "));
    println!("params          : {linear} ternary + {mixture} mixture");

    let (neg, zero, pos) = network.weight_distribution()?;
    println!("ternary weights : -1:{neg} 0:{zero} +1:{pos}");
    let (_, actual) = weight_histograms(&network, 10)?;
    println!("actual weights  : {}", actual.render());

    for (k, choice) in network.activation_choices()?.iter().enumerate() {
        let names: Vec<&str> = choice.iter().map(|a| a.name()).collect();
        println!("block {k} acts    : {}", names.join(", "));
    }

    let x = Tensor::randn(0f32, 1.0, (1, network.n_in()), &device)?;
    let probs = network.forward(&x)?;
    println!("sample output   : {:?}", probs.to_vec2::<f32>()?[0]);
    Ok(())
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let model_config = load_or_create_config(&args.config)?;
    let trainer_config = TrainerConfig {
        lr: args.lr,
        weight_decay: args.weight_decay,
        max_steps: args.max_steps,
        log_every: args.log_every,
        eval_every: args.eval_every,
        hist_every: args.hist_every,
        hist_bins: args.hist_bins,
    };

    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let (x, labels) = parity_problem(
        &mut rng,
        args.samples,
        model_config.n_in(),
        model_config.n_out(),
        &device,
    )?;
    let (val_x, val_labels) = parity_problem(
        &mut rng,
        args.samples / 4 + 1,
        model_config.n_in(),
        model_config.n_out(),
        &device,
    )?;

    tracing::info!(
        train = args.samples,
        val = args.samples / 4 + 1,
        seed = args.seed,
        "Generated parity problem"
    );

    let mut trainer = Trainer::new(model_config, trainer_config, device)?;
    let eval = trainer.fit(&x, &labels, Some((&val_x, &val_labels)))?;

    if let Some(eval) = eval {
        println!("shared weight  accuracy  loss");
        for w in &eval.per_weight {
            println!("{:>13.2}  {:>8.3}  {:.4}", w.shared_weight, w.accuracy, w.loss);
        }
        println!("mean accuracy: {:.3}", eval.mean_accuracy());
    }
    Ok(())
}

/// Random ±1 inputs labelled by the count of +1 entries modulo `n_classes`.
fn parity_problem(
    rng: &mut StdRng,
    samples: usize,
    n_in: usize,
    n_classes: usize,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let mut xs = Vec::with_capacity(samples * n_in);
    let mut ys = Vec::with_capacity(samples);
    for _ in 0..samples {
        let mut positives = 0usize;
        for _ in 0..n_in {
            let bit = rng.gen_bool(0.5);
            positives += bit as usize;
            xs.push(if bit { 1f32 } else { -1f32 });
        }
        ys.push((positives % n_classes.max(1)) as u32);
    }
    let x = Tensor::from_vec(xs, (samples, n_in), device)?;
    let y = Tensor::from_vec(ys, samples, device)?;
    Ok((x, y))
}

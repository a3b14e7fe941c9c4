//! Bandit Lab: trains a wide & deep contextual bandit on synthetic data and
//! scores it against the naive per-action mean reward.

use anyhow::Context;
use bandit_core::config::{AppConfig, CombineMethod, ExpectationMethod, ModelType};
use bandit_rl_engine::Experiment;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bandit-lab")]
#[command(about = "Wide & deep bandit convergence experiment")]
#[command(version)]
struct Cli {
    /// Config file (TOML, JSON or YAML)
    #[arg(long, env = "BANDIT_LAB_CONFIG")]
    config: Option<String>,

    /// Synthetic rows to generate (overrides config)
    #[arg(long, env = "BANDIT_LAB__SYNTHETIC__NUM_ROWS")]
    rows: Option<usize>,

    /// Number of actions (overrides config)
    #[arg(long, env = "BANDIT_LAB__SYNTHETIC__NUM_ACTIONS")]
    actions: Option<usize>,

    /// Context features per row (overrides config)
    #[arg(long, env = "BANDIT_LAB__SYNTHETIC__CONTEXT_DIM")]
    features: Option<usize>,

    /// Distinct users (overrides config)
    #[arg(long, env = "BANDIT_LAB__SYNTHETIC__NUM_USERS")]
    users: Option<u64>,

    /// Seed for data generation and model initialisation (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Share of rows held out for validation (overrides config)
    #[arg(long, env = "BANDIT_LAB__SPLIT__VALIDATION_FRACTION")]
    validation_fraction: Option<f64>,

    /// deep, wide or wide_deep (overrides config)
    #[arg(long, env = "BANDIT_LAB__MODEL__MODEL_TYPE")]
    model_type: Option<ModelType>,

    /// add, concat_reward, concat_reward_llr or concat_representation_llr
    #[arg(long, env = "BANDIT_LAB__MODEL__COMBINE_METHOD")]
    combine_method: Option<CombineMethod>,

    /// blr or forward (overrides config)
    #[arg(long, env = "BANDIT_LAB__MODEL__PREDICTION_METHOD")]
    prediction_method: Option<ExpectationMethod>,

    /// Write the JSON report here as well as to stdout
    #[arg(long)]
    report_out: Option<PathBuf>,

    /// Save the fitted model as JSON
    #[arg(long)]
    model_out: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bandit_lab=info,bandit_rl_engine=info".into()),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("Bandit Lab starting up");

    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(rows) = cli.rows {
        config.synthetic.num_rows = rows;
    }
    if let Some(actions) = cli.actions {
        config.synthetic.num_actions = actions;
    }
    if let Some(features) = cli.features {
        config.synthetic.context_dim = features;
    }
    if let Some(users) = cli.users {
        config.synthetic.num_users = users;
    }
    if let Some(seed) = cli.seed {
        config.synthetic.seed = seed;
        config.model.seed = Some(seed);
    }
    if let Some(fraction) = cli.validation_fraction {
        config.split.validation_fraction = fraction;
    }
    if let Some(model_type) = cli.model_type {
        config.model.model_type = model_type;
    }
    if let Some(combine) = cli.combine_method {
        config.model.combine_method = combine;
    }
    if let Some(method) = cli.prediction_method {
        config.model.prediction_method = method;
    }

    info!(
        rows = config.synthetic.num_rows,
        actions = config.synthetic.num_actions,
        features = config.synthetic.context_dim,
        users = config.synthetic.num_users,
        model_type = %config.model.model_type,
        combine_method = %config.model.combine_method,
        "Configuration loaded"
    );

    let outcome = Experiment::new(config).run()?;
    let report = serde_json::to_string_pretty(&outcome.report)?;
    println!("{report}");

    if let Some(path) = cli.report_out {
        std::fs::write(&path, &report)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }
    if let Some(path) = cli.model_out {
        outcome
            .model
            .save(&path)
            .with_context(|| format!("saving model to {}", path.display()))?;
        info!(path = %path.display(), "Model saved");
    }

    info!(
        score = outcome.report.convergence.score,
        beats_benchmark = outcome.report.convergence.beats_benchmark(),
        "Bandit Lab finished"
    );
    Ok(())
}

use crate::error::{BanditError, BanditResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root experiment configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `BANDIT_LAB__`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub synthetic: SyntheticConfig,
    #[serde(default)]
    pub split: SplitConfig,
    #[serde(default)]
    pub model: WideDeepConfig,
}

// ─── Model selection enums ──────────────────────────────────────────────

/// Which reward network backs the bandit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Context-only fully connected network.
    Deep,
    /// User-id embedding network.
    Wide,
    #[default]
    WideDeep,
}

/// How the wide and deep halves are merged in a wide+deep network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CombineMethod {
    Add,
    ConcatReward,
    ConcatRewardLlr,
    #[default]
    ConcatRepresentationLlr,
}

/// Policy used by `action` once the round-robin warm-up is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    /// Bayesian linear regression + Thompson sampling.
    #[default]
    ThompsonSampling,
    /// Argmax of the posterior mean.
    PosteriorMean,
    /// Argmax of the network forward pass.
    Forward,
}

/// Source of point predictions for expected rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationMethod {
    #[default]
    Blr,
    Forward,
}

impl FromStr for ModelType {
    type Err = BanditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deep" => Ok(Self::Deep),
            "wide" => Ok(Self::Wide),
            "wide_deep" | "wide-deep" => Ok(Self::WideDeep),
            other => Err(BanditError::Config(format!(
                "model type must be \"deep\", \"wide\" or \"wide_deep\", got \"{other}\""
            ))),
        }
    }
}

impl FromStr for CombineMethod {
    type Err = BanditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "concat_reward" => Ok(Self::ConcatReward),
            "concat_reward_llr" => Ok(Self::ConcatRewardLlr),
            "concat_representation_llr" => Ok(Self::ConcatRepresentationLlr),
            other => Err(BanditError::Config(format!(
                "combine method must be \"add\", \"concat_reward\", \"concat_reward_llr\" \
                 or \"concat_representation_llr\", got \"{other}\""
            ))),
        }
    }
}

impl FromStr for SelectionMethod {
    type Err = BanditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "thompson_sampling" | "blr_ts" => Ok(Self::ThompsonSampling),
            "posterior_mean" | "blr" => Ok(Self::PosteriorMean),
            "forward" => Ok(Self::Forward),
            other => Err(BanditError::Config(format!(
                "selection method must be \"thompson_sampling\", \"posterior_mean\" or \
                 \"forward\", got \"{other}\""
            ))),
        }
    }
}

impl FromStr for ExpectationMethod {
    type Err = BanditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "blr" => Ok(Self::Blr),
            "forward" => Ok(Self::Forward),
            other => Err(BanditError::Config(format!(
                "expectation method must be \"blr\" or \"forward\", got \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelType::Deep => write!(f, "deep"),
            ModelType::Wide => write!(f, "wide"),
            ModelType::WideDeep => write!(f, "wide_deep"),
        }
    }
}

impl fmt::Display for CombineMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CombineMethod::Add => write!(f, "add"),
            CombineMethod::ConcatReward => write!(f, "concat_reward"),
            CombineMethod::ConcatRewardLlr => write!(f, "concat_reward_llr"),
            CombineMethod::ConcatRepresentationLlr => write!(f, "concat_representation_llr"),
        }
    }
}

// ─── Wide & Deep bandit hyperparameters ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideDeepConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub model_type: ModelType,
    #[serde(default)]
    pub combine_method: CombineMethod,
    /// Rows in the user embedding table, including the unknown-user row.
    #[serde(default = "default_wide_embed_size")]
    pub wide_embed_size: usize,
    #[serde(default = "default_wide_embed_dim")]
    pub wide_embed_dim: usize,
    /// Hidden layer widths of the deep network.
    #[serde(default = "default_deep_layer_sizes")]
    pub deep_layer_sizes: Vec<usize>,
    /// Retrain the network every this many updates. `1` retrains on every row.
    #[serde(default = "default_update_freq")]
    pub update_freq_nn: u64,
    /// Refresh the Bayesian posterior every this many updates.
    #[serde(default = "default_update_freq")]
    pub update_freq_lr: u64,
    /// Minibatch steps per network retrain.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    #[serde(default = "default_a0")]
    pub a0: f64,
    #[serde(default = "default_b0")]
    pub b0: f64,
    #[serde(default = "default_lambda_prior")]
    pub lambda_prior: f64,
    /// Round-robin pulls per action before `action` starts exploiting.
    #[serde(default = "default_initial_pulls")]
    pub initial_pulls: u64,
    #[serde(default = "default_initial_lr")]
    pub initial_lr_wide: f64,
    #[serde(default = "default_initial_lr")]
    pub initial_lr_deep: f64,
    #[serde(default)]
    pub lr_decay_rate_wide: f64,
    #[serde(default)]
    pub lr_decay_rate_deep: f64,
    #[serde(default = "default_model_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_grad_norm")]
    pub max_grad_norm: f64,
    #[serde(default = "default_do_scaling")]
    pub do_scaling: bool,
    #[serde(default)]
    pub prediction_method: ExpectationMethod,
    /// `None` seeds from entropy.
    #[serde(default = "default_model_seed")]
    pub seed: Option<u64>,
}

fn default_name() -> String {
    "wide_deep_bandits".to_string()
}
fn default_wide_embed_size() -> usize {
    100
}
fn default_wide_embed_dim() -> usize {
    64
}
fn default_deep_layer_sizes() -> Vec<usize> {
    vec![50]
}
fn default_update_freq() -> u64 {
    100
}
fn default_num_epochs() -> usize {
    50
}
fn default_a0() -> f64 {
    6.0
}
fn default_b0() -> f64 {
    6.0
}
fn default_lambda_prior() -> f64 {
    0.25
}
fn default_initial_pulls() -> u64 {
    100
}
fn default_initial_lr() -> f64 {
    0.01
}
fn default_model_batch_size() -> usize {
    256
}
fn default_max_grad_norm() -> f64 {
    5.0
}
fn default_do_scaling() -> bool {
    true
}
fn default_model_seed() -> Option<u64> {
    Some(42)
}

impl Default for WideDeepConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            model_type: ModelType::default(),
            combine_method: CombineMethod::default(),
            wide_embed_size: default_wide_embed_size(),
            wide_embed_dim: default_wide_embed_dim(),
            deep_layer_sizes: default_deep_layer_sizes(),
            update_freq_nn: default_update_freq(),
            update_freq_lr: default_update_freq(),
            num_epochs: default_num_epochs(),
            a0: default_a0(),
            b0: default_b0(),
            lambda_prior: default_lambda_prior(),
            initial_pulls: default_initial_pulls(),
            initial_lr_wide: default_initial_lr(),
            initial_lr_deep: default_initial_lr(),
            lr_decay_rate_wide: 0.0,
            lr_decay_rate_deep: 0.0,
            batch_size: default_model_batch_size(),
            max_grad_norm: default_max_grad_norm(),
            do_scaling: default_do_scaling(),
            prediction_method: ExpectationMethod::default(),
            seed: default_model_seed(),
        }
    }
}

impl WideDeepConfig {
    /// Reject hyperparameters the bandit cannot run with.
    pub fn validate(&self) -> BanditResult<()> {
        let uses_wide = matches!(self.model_type, ModelType::Wide | ModelType::WideDeep);
        let uses_deep = matches!(self.model_type, ModelType::Deep | ModelType::WideDeep);

        if uses_wide && (self.wide_embed_size == 0 || self.wide_embed_dim == 0) {
            return Err(BanditError::Config(
                "wide_embed_size and wide_embed_dim must be positive".to_string(),
            ));
        }
        if uses_deep
            && (self.deep_layer_sizes.is_empty() || self.deep_layer_sizes.contains(&0))
        {
            return Err(BanditError::Config(
                "deep_layer_sizes must be a non-empty list of positive widths".to_string(),
            ));
        }
        if self.update_freq_nn == 0 || self.update_freq_lr == 0 {
            return Err(BanditError::Config(
                "update_freq_nn and update_freq_lr must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(BanditError::Config("batch_size must be positive".to_string()));
        }
        if self.lambda_prior <= 0.0 || self.a0 <= 0.0 || self.b0 <= 0.0 {
            return Err(BanditError::Config(
                "lambda_prior, a0 and b0 must be positive".to_string(),
            ));
        }
        if self.initial_lr_wide < 0.0
            || self.initial_lr_deep < 0.0
            || self.lr_decay_rate_wide < 0.0
            || self.lr_decay_rate_deep < 0.0
        {
            return Err(BanditError::Config(
                "learning rates and decay rates must be non-negative".to_string(),
            ));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(BanditError::Config("max_grad_norm must be positive".to_string()));
        }
        Ok(())
    }

    /// Width of the last-layer representation fed to the Bayesian head.
    pub fn latent_dim(&self) -> usize {
        let deep_width = self.deep_layer_sizes.last().copied().unwrap_or(0);
        match self.model_type {
            ModelType::Deep => deep_width,
            ModelType::Wide => self.wide_embed_dim,
            ModelType::WideDeep => deep_width + self.wide_embed_dim,
        }
    }
}

// ─── Synthetic data ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticConfig {
    #[serde(default = "default_num_rows")]
    pub num_rows: usize,
    #[serde(default = "default_num_actions")]
    pub num_actions: usize,
    #[serde(default = "default_context_dim")]
    pub context_dim: usize,
    #[serde(default = "default_num_users")]
    pub num_users: u64,
    /// Standard deviation of the observation noise on rewards.
    #[serde(default = "default_noise_std")]
    pub noise_std: f64,
    /// Standard deviation of the per-user, per-action reward offsets.
    #[serde(default = "default_user_effect_std")]
    pub user_effect_std: f64,
    #[serde(default = "default_synthetic_seed")]
    pub seed: u64,
}

fn default_num_rows() -> usize {
    5000
}
fn default_num_actions() -> usize {
    3
}
fn default_context_dim() -> usize {
    5
}
fn default_num_users() -> u64 {
    50
}
fn default_noise_std() -> f64 {
    0.5
}
fn default_user_effect_std() -> f64 {
    0.5
}
fn default_synthetic_seed() -> u64 {
    42
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            num_rows: default_num_rows(),
            num_actions: default_num_actions(),
            context_dim: default_context_dim(),
            num_users: default_num_users(),
            noise_std: default_noise_std(),
            user_effect_std: default_user_effect_std(),
            seed: default_synthetic_seed(),
        }
    }
}

// ─── Train / validation split ───────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitConfig {
    #[serde(default = "default_validation_fraction")]
    pub validation_fraction: f64,
    #[serde(default = "default_split_seed")]
    pub seed: u64,
}

fn default_validation_fraction() -> f64 {
    0.2
}
fn default_split_seed() -> u64 {
    7
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: default_validation_fraction(),
            seed: default_split_seed(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            synthetic: SyntheticConfig::default(),
            split: SplitConfig::default(),
            model: WideDeepConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional config file, then environment
    /// variables (which take precedence).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("BANDIT_LAB")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("model.deep_layer_sizes"),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

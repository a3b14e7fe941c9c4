//! Reward networks for the wide & deep bandit.
//!
//! - [`WideModel`] memorises individual users through an embedding table.
//! - [`DeepModel`] generalises over contexts with fully connected ReLU layers.
//! - [`WideDeepModel`] joins the two according to a [`CombineMethod`].
//!
//! Every model exposes the last-layer representation (`z`) consumed by the
//! Bayesian linear head, and a backward pass returning gradients in the
//! same order as `params_mut`.

use crate::layers::{hsplit, hstack, relu, Embedding, Linear};
use crate::optimizer::ParamGroup;
use bandit_core::config::CombineMethod;
use ndarray::{Array2, ArrayD, ArrayViewMutD};
use rand::Rng;
use serde::{Deserialize, Serialize};

// ─── Wide ───────────────────────────────────────────────────────────────

/// Learns the expected reward of each action given a user index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideModel {
    embedding: Embedding,
    head: Linear,
}

/// Activations kept from a wide forward pass.
#[derive(Debug, Clone)]
pub struct WidePass {
    pub users: Vec<usize>,
    pub rep: Array2<f64>,
    pub output: Array2<f64>,
}

impl WideModel {
    pub fn new<R: Rng + ?Sized>(
        embed_size: usize,
        embed_dim: usize,
        num_actions: usize,
        rng: &mut R,
    ) -> Self {
        Self {
            embedding: Embedding::new(embed_size, embed_dim, rng),
            head: Linear::new(embed_dim, num_actions, rng),
        }
    }

    pub fn forward(&self, users: &[usize]) -> WidePass {
        let rep = self.embedding.forward(users);
        let output = self.head.forward(&rep);
        WidePass {
            users: users.to_vec(),
            rep,
            output,
        }
    }

    pub fn representation(&self, users: &[usize]) -> Array2<f64> {
        self.embedding.forward(users)
    }

    /// `grad_output` flows in through the head, `grad_rep` directly into the
    /// embedding rows. Either may be absent.
    pub fn backward(
        &self,
        pass: &WidePass,
        grad_output: Option<&Array2<f64>>,
        grad_rep: Option<&Array2<f64>>,
    ) -> Vec<ArrayD<f64>> {
        let (head_grad, mut g_rep) = match grad_output {
            Some(g) => self.head.backward(&pass.rep, g),
            None => (self.head.zero_grad(), Array2::zeros(pass.rep.raw_dim())),
        };
        if let Some(extra) = grad_rep {
            g_rep += extra;
        }

        let mut grads = vec![self.embedding.backward(&pass.users, &g_rep).into_dyn()];
        grads.extend(head_grad.into_params());
        grads
    }

    pub fn params_mut(&mut self) -> Vec<(ParamGroup, ArrayViewMutD<'_, f64>)> {
        let mut params: Vec<_> = self
            .embedding
            .params_mut()
            .into_iter()
            .map(|p| (ParamGroup::Wide, p))
            .collect();
        params.extend(self.head.params_mut().into_iter().map(|p| (ParamGroup::Wide, p)));
        params
    }

    pub fn embed_size(&self) -> usize {
        self.embedding.num_embeddings()
    }

    pub fn embed_dim(&self) -> usize {
        self.embedding.embedding_dim()
    }

    pub fn num_actions(&self) -> usize {
        self.head.output_dim()
    }
}

// ─── Deep ───────────────────────────────────────────────────────────────

/// Learns the expected reward of each action given a context vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepModel {
    hidden: Vec<Linear>,
    output: Linear,
}

/// Activations kept from a deep forward pass.
#[derive(Debug, Clone)]
pub struct DeepPass {
    inputs: Vec<Array2<f64>>,
    pre_activations: Vec<Array2<f64>>,
    pub rep: Array2<f64>,
    pub output: Array2<f64>,
}

impl DeepModel {
    /// All layers draw their weights from `U(0, 1)`.
    pub fn new<R: Rng + ?Sized>(
        context_dim: usize,
        layer_sizes: &[usize],
        num_actions: usize,
        rng: &mut R,
    ) -> Self {
        let mut hidden = Vec::with_capacity(layer_sizes.len());
        let mut input_dim = context_dim;
        for &width in layer_sizes {
            hidden.push(Linear::with_unit_uniform_weights(input_dim, width, rng));
            input_dim = width;
        }
        let output = Linear::with_unit_uniform_weights(input_dim, num_actions, rng);
        Self { hidden, output }
    }

    pub fn forward(&self, contexts: &Array2<f64>) -> DeepPass {
        let mut inputs = Vec::with_capacity(self.hidden.len());
        let mut pre_activations = Vec::with_capacity(self.hidden.len());
        let mut x = contexts.clone();
        for layer in &self.hidden {
            let z = layer.forward(&x);
            inputs.push(x);
            x = z.mapv(relu);
            pre_activations.push(z);
        }
        let output = self.output.forward(&x);
        DeepPass {
            inputs,
            pre_activations,
            rep: x,
            output,
        }
    }

    /// Last hidden activation.
    pub fn representation(&self, contexts: &Array2<f64>) -> Array2<f64> {
        let mut x = contexts.clone();
        for layer in &self.hidden {
            x = layer.forward(&x).mapv(relu);
        }
        x
    }

    pub fn backward(
        &self,
        pass: &DeepPass,
        grad_output: Option<&Array2<f64>>,
        grad_rep: Option<&Array2<f64>>,
    ) -> Vec<ArrayD<f64>> {
        let (output_grad, mut g) = match grad_output {
            Some(go) => self.output.backward(&pass.rep, go),
            None => (self.output.zero_grad(), Array2::zeros(pass.rep.raw_dim())),
        };
        if let Some(extra) = grad_rep {
            g += extra;
        }

        let mut hidden_grads = Vec::with_capacity(self.hidden.len());
        for (i, layer) in self.hidden.iter().enumerate().rev() {
            let local = &g * &pass.pre_activations[i].mapv(|z| if z > 0.0 { 1.0 } else { 0.0 });
            let (layer_grad, grad_input) = layer.backward(&pass.inputs[i], &local);
            hidden_grads.push(layer_grad);
            g = grad_input;
        }
        hidden_grads.reverse();

        let mut grads = Vec::with_capacity(2 * (self.hidden.len() + 1));
        for layer_grad in hidden_grads {
            grads.extend(layer_grad.into_params());
        }
        grads.extend(output_grad.into_params());
        grads
    }

    pub fn params_mut(&mut self) -> Vec<(ParamGroup, ArrayViewMutD<'_, f64>)> {
        let mut params = Vec::new();
        for layer in self.hidden.iter_mut() {
            params.extend(layer.params_mut().into_iter().map(|p| (ParamGroup::Deep, p)));
        }
        params.extend(self.output.params_mut().into_iter().map(|p| (ParamGroup::Deep, p)));
        params
    }

    pub fn latent_dim(&self) -> usize {
        self.hidden
            .last()
            .map(Linear::output_dim)
            .unwrap_or_else(|| self.output.input_dim())
    }

    pub fn num_actions(&self) -> usize {
        self.output.output_dim()
    }
}

// ─── Wide + Deep ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideDeepModel {
    wide: WideModel,
    deep: DeepModel,
    /// Linear layer over concatenated rewards (`concat_reward_llr`).
    reward_head: Linear,
    /// Linear layer over concatenated representations
    /// (`concat_representation_llr`).
    representation_head: Linear,
    combine: CombineMethod,
}

#[derive(Debug, Clone)]
pub struct WideDeepPass {
    pub wide: WidePass,
    pub deep: DeepPass,
    pub output: Array2<f64>,
}

impl WideDeepModel {
    #[allow(clippy::too_many_arguments)]
    pub fn new<R: Rng + ?Sized>(
        context_dim: usize,
        deep_layer_sizes: &[usize],
        num_actions: usize,
        embed_size: usize,
        embed_dim: usize,
        combine: CombineMethod,
        rng: &mut R,
    ) -> Self {
        let wide = WideModel::new(embed_size, embed_dim, num_actions, rng);
        let deep = DeepModel::new(context_dim, deep_layer_sizes, num_actions, rng);
        let reward_head = Linear::new(num_actions * 2, num_actions, rng);
        let representation_head = Linear::new(embed_dim + deep.latent_dim(), num_actions, rng);
        Self {
            wide,
            deep,
            reward_head,
            representation_head,
            combine,
        }
    }

    /// Raw network output: `batch × k`, or `batch × 2k` for
    /// [`CombineMethod::ConcatReward`].
    pub fn forward(&self, users: &[usize], contexts: &Array2<f64>) -> WideDeepPass {
        let wide = self.wide.forward(users);
        let deep = self.deep.forward(contexts);
        let output = match self.combine {
            CombineMethod::Add => &wide.output + &deep.output,
            CombineMethod::ConcatReward => hstack(&wide.output, &deep.output),
            CombineMethod::ConcatRewardLlr => self
                .reward_head
                .forward(&hstack(&wide.output, &deep.output)),
            CombineMethod::ConcatRepresentationLlr => self
                .representation_head
                .forward(&hstack(&wide.rep, &deep.rep)),
        };
        WideDeepPass { wide, deep, output }
    }

    /// Expected reward per action (`batch × k`).
    pub fn predict(&self, users: &[usize], contexts: &Array2<f64>) -> Array2<f64> {
        let pass = self.forward(users, contexts);
        match self.combine {
            CombineMethod::ConcatReward => {
                let (wide, deep) = hsplit(&pass.output, self.num_actions());
                wide + deep
            }
            _ => pass.output,
        }
    }

    /// Concatenated wide embedding and deep last hidden layer.
    pub fn representation(&self, users: &[usize], contexts: &Array2<f64>) -> Array2<f64> {
        hstack(
            &self.wide.representation(users),
            &self.deep.representation(contexts),
        )
    }

    /// Targets and action mask in the shape of the raw output.
    pub fn training_targets(
        &self,
        rewards: &Array2<f64>,
        weights: &Array2<f64>,
    ) -> (Array2<f64>, Array2<f64>) {
        match self.combine {
            CombineMethod::ConcatReward => (hstack(rewards, rewards), hstack(weights, weights)),
            _ => (rewards.clone(), weights.clone()),
        }
    }

    pub fn backward(&self, pass: &WideDeepPass, grad_output: &Array2<f64>) -> Vec<ArrayD<f64>> {
        let k = self.num_actions();
        let mut reward_head_grad = self.reward_head.zero_grad();
        let mut representation_head_grad = self.representation_head.zero_grad();

        let (wide_grads, deep_grads) = match self.combine {
            CombineMethod::Add => (
                self.wide.backward(&pass.wide, Some(grad_output), None),
                self.deep.backward(&pass.deep, Some(grad_output), None),
            ),
            CombineMethod::ConcatReward => {
                let (gw, gd) = hsplit(grad_output, k);
                (
                    self.wide.backward(&pass.wide, Some(&gw), None),
                    self.deep.backward(&pass.deep, Some(&gd), None),
                )
            }
            CombineMethod::ConcatRewardLlr => {
                let input = hstack(&pass.wide.output, &pass.deep.output);
                let (head_grad, grad_input) = self.reward_head.backward(&input, grad_output);
                reward_head_grad = head_grad;
                let (gw, gd) = hsplit(&grad_input, k);
                (
                    self.wide.backward(&pass.wide, Some(&gw), None),
                    self.deep.backward(&pass.deep, Some(&gd), None),
                )
            }
            CombineMethod::ConcatRepresentationLlr => {
                let input = hstack(&pass.wide.rep, &pass.deep.rep);
                let (head_grad, grad_input) =
                    self.representation_head.backward(&input, grad_output);
                representation_head_grad = head_grad;
                let (gw, gd) = hsplit(&grad_input, self.wide.embed_dim());
                (
                    self.wide.backward(&pass.wide, None, Some(&gw)),
                    self.deep.backward(&pass.deep, None, Some(&gd)),
                )
            }
        };

        let mut grads = wide_grads;
        grads.extend(deep_grads);
        grads.extend(reward_head_grad.into_params());
        grads.extend(representation_head_grad.into_params());
        grads
    }

    pub fn params_mut(&mut self) -> Vec<(ParamGroup, ArrayViewMutD<'_, f64>)> {
        let mut params = self.wide.params_mut();
        params.extend(self.deep.params_mut());
        params.extend(
            self.reward_head
                .params_mut()
                .into_iter()
                .map(|p| (ParamGroup::Head, p)),
        );
        params.extend(
            self.representation_head
                .params_mut()
                .into_iter()
                .map(|p| (ParamGroup::Head, p)),
        );
        params
    }

    pub fn embed_size(&self) -> usize {
        self.wide.embed_size()
    }

    pub fn latent_dim(&self) -> usize {
        self.wide.embed_dim() + self.deep.latent_dim()
    }

    pub fn num_actions(&self) -> usize {
        self.reward_head.output_dim()
    }
}

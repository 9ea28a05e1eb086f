//! A small PointNet-style classifier: a shared per-point MLP, max-pooling over points and a
//! fully connected head. It exists so the attack and defense can be exercised end to end; the
//! input gradient is computed by explicit backpropagation.
use crate::batch::Labels;
use crate::error::ModelError;
use crate::model::loss::softmax_cross_entropy;
use crate::model::{Classifier, Dense, Dropout, Loss, Mode, ReLU};
use crate::PcFloat;
use ndarray::{Array2, Array3, ArrayView3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PointNetClassifier {
    point_dim: usize,
    point_mlp: Vec<Dense>,
    head: Vec<Dense>,
    dropout: Option<Dropout>,
}

/// Intermediate values of a forward pass needed by the backward pass.
struct ForwardCache {
    batch_size: usize,
    num_points: usize,
    point_pre: Vec<Array2<PcFloat>>,
    pooled: Array2<PcFloat>,
    pool_argmax: Array2<usize>,
    head_pre: Vec<Array2<PcFloat>>,
    dropout_mask: Option<Array2<PcFloat>>,
    logits: Array2<PcFloat>,
}

impl PointNetClassifier {
    /// # Errors
    /// If the layers do not chain, or the head is empty.
    pub fn new(
        point_dim: usize,
        point_mlp: Vec<Dense>,
        head: Vec<Dense>,
        dropout: Option<Dropout>,
    ) -> Result<Self, ModelError> {
        let mut width = point_dim;
        for layer in point_mlp.iter().chain(head.iter()) {
            if layer.input_dim() != width {
                return Err(ModelError::InputShape {
                    expected_dim: width,
                    actual_dim: layer.input_dim(),
                });
            }
            width = layer.output_dim();
        }
        if head.is_empty() {
            return Err(ModelError::Custom("classifier head needs an output layer".into()));
        }
        Ok(Self {
            point_dim,
            point_mlp,
            head,
            dropout,
        })
    }

    /// Randomly initialised network with the given hidden widths.
    ///
    /// # Errors
    /// If the dropout probability is invalid.
    pub fn random<R: Rng>(
        point_dim: usize,
        point_widths: &[usize],
        head_widths: &[usize],
        num_classes: usize,
        dropout_prob: Option<PcFloat>,
        rng: &mut R,
    ) -> Result<Self, ModelError> {
        let mut width = point_dim;
        let mut point_mlp = Vec::with_capacity(point_widths.len());
        for &w in point_widths {
            point_mlp.push(Dense::random(width, w, rng));
            width = w;
        }
        let mut head = Vec::with_capacity(head_widths.len() + 1);
        for &w in head_widths.iter().chain(std::iter::once(&num_classes)) {
            head.push(Dense::random(width, w, rng));
            width = w;
        }
        let dropout = dropout_prob
            .map(|p| Dropout::new(p, rng.gen()))
            .transpose()?;
        Self::new(point_dim, point_mlp, head, dropout)
    }

    pub fn feature_dim(&self) -> usize {
        self.point_mlp
            .last()
            .map_or(self.point_dim, Dense::output_dim)
    }

    fn check_input(&self, x: &ArrayView3<PcFloat>) -> Result<(), ModelError> {
        let (_, num_points, dim) = x.dim();
        if dim != self.point_dim {
            return Err(ModelError::InputShape {
                expected_dim: self.point_dim,
                actual_dim: dim,
            });
        }
        if num_points == 0 {
            return Err(ModelError::Custom("point clouds must not be empty".into()));
        }
        Ok(())
    }

    /// Shared MLP and max-pool. Returns pre-activations of every point layer, the pooled
    /// features and, for each pooled entry, the index of the point that won the max.
    fn encode(
        &self,
        x: &ArrayView3<PcFloat>,
    ) -> Result<(Vec<Array2<PcFloat>>, Array2<PcFloat>, Array2<usize>), ModelError> {
        self.check_input(x)?;
        let (batch_size, num_points, dim) = x.dim();
        let mut h =
            Array2::from_shape_vec((batch_size * num_points, dim), x.iter().copied().collect())
                .map_err(|e| ModelError::Custom(e.to_string()))?;
        let mut point_pre = Vec::with_capacity(self.point_mlp.len());
        for layer in &self.point_mlp {
            let z = layer.forward(&h.view());
            h = ReLU::forward(&z.view());
            point_pre.push(z);
        }

        let width = h.ncols();
        let mut pooled = Array2::zeros((batch_size, width));
        let mut pool_argmax = Array2::zeros((batch_size, width));
        for b in 0..batch_size {
            for f in 0..width {
                let mut best = 0;
                for n in 1..num_points {
                    if h[[b * num_points + n, f]] > h[[b * num_points + best, f]] {
                        best = n;
                    }
                }
                pooled[[b, f]] = h[[b * num_points + best, f]];
                pool_argmax[[b, f]] = best;
            }
        }
        Ok((point_pre, pooled, pool_argmax))
    }

    fn forward_cached(
        &self,
        x: &ArrayView3<PcFloat>,
        mode: Mode,
    ) -> Result<ForwardCache, ModelError> {
        let (batch_size, num_points, _) = x.dim();
        let (point_pre, pooled, pool_argmax) = self.encode(x)?;

        let (output, hidden) = match self.head.split_last() {
            Some(split) => split,
            None => return Err(ModelError::Custom("classifier head needs an output layer".into())),
        };
        let mut g = pooled.clone();
        let mut head_pre = Vec::with_capacity(hidden.len());
        for layer in hidden {
            let z = layer.forward(&g.view());
            g = ReLU::forward(&z.view());
            head_pre.push(z);
        }
        let dropout_mask = self
            .dropout
            .as_ref()
            .and_then(|d| d.mask(g.dim(), mode));
        if let Some(mask) = &dropout_mask {
            g *= mask;
        }
        let logits = output.forward(&g.view());
        Ok(ForwardCache {
            batch_size,
            num_points,
            point_pre,
            pooled,
            pool_argmax,
            head_pre,
            dropout_mask,
            logits,
        })
    }

    /// Backpropagates a gradient on the logits to the input points.
    fn backward(
        &self,
        cache: &ForwardCache,
        dlogits: &Array2<PcFloat>,
    ) -> Result<Array3<PcFloat>, ModelError> {
        let (output, hidden) = match self.head.split_last() {
            Some(split) => split,
            None => return Err(ModelError::Custom("classifier head needs an output layer".into())),
        };
        let mut g = output.backward(&dlogits.view());
        if let Some(mask) = &cache.dropout_mask {
            g *= mask;
        }
        for (layer, z) in hidden.iter().zip(cache.head_pre.iter()).rev() {
            g = ReLU::backward(&z.view(), &g.view());
            g = layer.backward(&g.view());
        }

        // Max-pool routes each feature's gradient to the point that produced it.
        let (batch_size, num_points) = (cache.batch_size, cache.num_points);
        let mut gp = Array2::zeros((batch_size * num_points, cache.pooled.ncols()));
        for ((b, f), &n) in cache.pool_argmax.indexed_iter() {
            gp[[b * num_points + n, f]] += g[[b, f]];
        }
        for (layer, z) in self.point_mlp.iter().zip(cache.point_pre.iter()).rev() {
            gp = ReLU::backward(&z.view(), &gp.view());
            gp = layer.backward(&gp.view());
        }
        Array3::from_shape_vec(
            (batch_size, num_points, self.point_dim),
            gp.iter().copied().collect(),
        )
        .map_err(|e| ModelError::Custom(e.to_string()))
    }
}

impl Classifier for PointNetClassifier {
    fn point_dim(&self) -> usize {
        self.point_dim
    }

    fn num_classes(&self) -> usize {
        self.head.last().map_or(0, Dense::output_dim)
    }

    fn forward(&self, x: ArrayView3<PcFloat>, mode: Mode) -> Result<Array2<PcFloat>, ModelError> {
        Ok(self.forward_cached(&x, mode)?.logits)
    }

    fn features(
        &self,
        x: ArrayView3<PcFloat>,
        _mode: Mode,
    ) -> Result<Array2<PcFloat>, ModelError> {
        Ok(self.encode(&x)?.1)
    }

    fn loss_and_input_grad(
        &self,
        x: ArrayView3<PcFloat>,
        labels: &Labels,
        mode: Mode,
    ) -> Result<(Array2<PcFloat>, Loss), ModelError> {
        let cache = self.forward_cached(&x, mode)?;
        let (value, dlogits) = softmax_cross_entropy(&cache.logits.view(), labels)?;
        let input_grad = self.backward(&cache, &dlogits)?;
        Ok((cache.logits, Loss { value, input_grad }))
    }
}

impl fmt::Display for PointNetClassifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PointNet({}) [", self.point_dim)?;
        for layer in &self.point_mlp {
            write!(f, "{layer}, {}, ", ReLU)?;
        }
        write!(f, "MaxPool")?;
        if let Some((output, hidden)) = self.head.split_last() {
            for layer in hidden {
                write!(f, ", {layer}, {}", ReLU)?;
            }
            if let Some(dropout) = &self.dropout {
                write!(f, ", Dropout({})", dropout.prob())?;
            }
            write!(f, ", {output}")?;
        }
        write!(f, "]")
    }
}

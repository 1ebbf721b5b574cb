use candle_core::{DType, Tensor};
use candle_nn::ops;

use crate::TrainingError;

/// A per-example training objective over class scores.
///
/// `pred` carries the class scores along the loss's class axis; `label`
/// holds integer class indices and has `pred`'s shape with the class axis
/// removed. The returned tensor has one value per element of the batch axis.
pub trait Loss {
    fn forward(
        &self,
        pred: &Tensor,
        label: &Tensor,
        sample_weight: Option<&Tensor>,
    ) -> Result<Tensor, TrainingError>;
}

/// Softmax focal loss: `-alpha * (1 - p)^gamma * log(p)` where `p` is the
/// softmax probability of the true class.
///
/// Well-classified examples (`p` close to one) are attenuated by the
/// `(1 - p)^gamma` factor. With `gamma = 0` and `alpha = 1` this is exactly
/// [`SoftmaxCrossEntropyLoss`].
#[derive(Debug, Clone)]
pub struct SoftmaxFocalLoss {
    axis: isize,
    alpha: f64,
    gamma: f64,
    weight: Option<f64>,
    batch_axis: usize,
}

impl SoftmaxFocalLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Result<Self, TrainingError> {
        if !alpha.is_finite() {
            return Err(TrainingError::initialization(
                "focal loss alpha must be finite",
            ));
        }
        self.alpha = alpha;
        Ok(self)
    }

    pub fn with_gamma(mut self, gamma: f64) -> Result<Self, TrainingError> {
        if !gamma.is_finite() || gamma < 0.0 {
            return Err(TrainingError::initialization(
                "focal loss gamma must be finite and >= 0",
            ));
        }
        self.gamma = gamma;
        Ok(self)
    }

    /// Class axis; negative values count from the last dimension.
    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_batch_axis(mut self, batch_axis: usize) -> Self {
        self.batch_axis = batch_axis;
        self
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }
}

impl Default for SoftmaxFocalLoss {
    fn default() -> Self {
        Self {
            axis: -1,
            alpha: 0.25,
            gamma: 2.0,
            weight: None,
            batch_axis: 0,
        }
    }
}

impl Loss for SoftmaxFocalLoss {
    fn forward(
        &self,
        pred: &Tensor,
        label: &Tensor,
        sample_weight: Option<&Tensor>,
    ) -> Result<Tensor, TrainingError> {
        let picked = pick_log_probs(pred, label, self.axis, self.batch_axis)?;
        let chosen_log = &picked.log_probs;

        let chosen = chosen_log.exp().map_err(to_runtime_error)?;
        // relu keeps rounding from pushing 1 - p below zero
        let modulating = chosen
            .affine(-1.0, 1.0)
            .and_then(|t| t.relu())
            .and_then(|t| t.powf(self.gamma))
            .map_err(to_runtime_error)?;
        let loss = (modulating * chosen_log)
            .and_then(|t| t.affine(-self.alpha, 0.0))
            .map_err(to_runtime_error)?;

        let loss = apply_weighting(loss, self.weight, sample_weight)?;
        mean_except_batch(&loss, picked.batch_axis)
    }
}

/// Softmax cross entropy on sparse labels (negative log-likelihood of the
/// true class), with the same axis, weighting and reduction rules as
/// [`SoftmaxFocalLoss`].
#[derive(Debug, Clone)]
pub struct SoftmaxCrossEntropyLoss {
    axis: isize,
    weight: Option<f64>,
    batch_axis: usize,
}

impl SoftmaxCrossEntropyLoss {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_axis(mut self, axis: isize) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_weight(mut self, weight: Option<f64>) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_batch_axis(mut self, batch_axis: usize) -> Self {
        self.batch_axis = batch_axis;
        self
    }
}

impl Default for SoftmaxCrossEntropyLoss {
    fn default() -> Self {
        Self {
            axis: -1,
            weight: None,
            batch_axis: 0,
        }
    }
}

impl Loss for SoftmaxCrossEntropyLoss {
    fn forward(
        &self,
        pred: &Tensor,
        label: &Tensor,
        sample_weight: Option<&Tensor>,
    ) -> Result<Tensor, TrainingError> {
        let picked = pick_log_probs(pred, label, self.axis, self.batch_axis)?;
        let loss = picked.log_probs.neg().map_err(to_runtime_error)?;
        let loss = apply_weighting(loss, self.weight, sample_weight)?;
        mean_except_batch(&loss, picked.batch_axis)
    }
}

struct PickedLogProbs {
    /// Log-probability of the true class; shaped like the label.
    log_probs: Tensor,
    /// Batch axis re-indexed into the label's dimensions.
    batch_axis: usize,
}

fn pick_log_probs(
    pred: &Tensor,
    label: &Tensor,
    axis: isize,
    batch_axis: usize,
) -> Result<PickedLogProbs, TrainingError> {
    let dims = pred.dims();
    if dims.len() < 2 {
        return Err(TrainingError::runtime(
            "predictions need at least a batch and a class dimension",
        ));
    }

    let class_axis = resolve_axis(axis, dims.len())?;
    if batch_axis >= dims.len() || batch_axis == class_axis {
        return Err(TrainingError::runtime(format!(
            "batch axis {} is invalid for predictions of rank {} with class axis {}",
            batch_axis,
            dims.len(),
            class_axis
        )));
    }

    let num_classes = dims[class_axis];
    if num_classes == 0 {
        return Err(TrainingError::runtime(
            "class dimension must be greater than zero",
        ));
    }

    let expected: Vec<usize> = dims
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != class_axis)
        .map(|(_, &dim)| dim)
        .collect();
    if label.dims() != expected.as_slice() {
        return Err(TrainingError::runtime(format!(
            "label shape {:?} must equal prediction shape {:?} without axis {}",
            label.dims(),
            dims,
            class_axis
        )));
    }
    if label.elem_count() == 0 {
        return Err(TrainingError::runtime("no labels available for loss computation"));
    }

    let label = label.to_device(pred.device()).map_err(to_runtime_error)?;
    let label = match label.dtype() {
        DType::U32 => label,
        DType::I64 | DType::U8 => label.to_dtype(DType::U32).map_err(to_runtime_error)?,
        dtype => {
            return Err(TrainingError::runtime(format!(
                "unsupported label dtype {:?}; expected integer class indices",
                dtype
            )))
        }
    };

    let max_label = label
        .flatten_all()
        .and_then(|t| t.max(0))
        .and_then(|t| t.to_scalar::<u32>())
        .map_err(to_runtime_error)?;
    if max_label as usize >= num_classes {
        return Err(TrainingError::runtime(format!(
            "label {} out of range for {} classes",
            max_label, num_classes
        )));
    }

    let log_probs = ops::log_softmax(pred, class_axis).map_err(to_runtime_error)?;
    let index = label
        .unsqueeze(class_axis)
        .and_then(|t| t.contiguous())
        .map_err(to_runtime_error)?;
    let chosen = log_probs
        .gather(&index, class_axis)
        .and_then(|t| t.squeeze(class_axis))
        .map_err(to_runtime_error)?;

    let batch_axis = if batch_axis > class_axis {
        batch_axis - 1
    } else {
        batch_axis
    };

    Ok(PickedLogProbs {
        log_probs: chosen,
        batch_axis,
    })
}

fn resolve_axis(axis: isize, rank: usize) -> Result<usize, TrainingError> {
    let resolved = if axis < 0 { rank as isize + axis } else { axis };
    if resolved < 0 || resolved as usize >= rank {
        return Err(TrainingError::runtime(format!(
            "axis {} out of range for rank {}",
            axis, rank
        )));
    }
    Ok(resolved as usize)
}

/// Scales by the element-wise `sample_weight`, which must broadcast to the
/// loss shape, then by the global `weight`.
fn apply_weighting(
    loss: Tensor,
    weight: Option<f64>,
    sample_weight: Option<&Tensor>,
) -> Result<Tensor, TrainingError> {
    let loss = match sample_weight {
        Some(sample_weight) => {
            let sample_weight = sample_weight
                .to_device(loss.device())
                .and_then(|t| t.to_dtype(loss.dtype()))
                .map_err(to_runtime_error)?;
            let weighted = loss.broadcast_mul(&sample_weight).map_err(to_runtime_error)?;
            if weighted.dims() != loss.dims() {
                return Err(TrainingError::runtime(format!(
                    "sample weight shape {:?} does not broadcast to label shape {:?}",
                    sample_weight.dims(),
                    loss.dims()
                )));
            }
            weighted
        }
        None => loss,
    };

    match weight {
        Some(weight) => loss.affine(weight, 0.0).map_err(to_runtime_error),
        None => Ok(loss),
    }
}

fn mean_except_batch(loss: &Tensor, batch_axis: usize) -> Result<Tensor, TrainingError> {
    if loss.rank() == 1 {
        return Ok(loss.clone());
    }

    let leading = if batch_axis == 0 {
        loss.clone()
    } else {
        loss.transpose(0, batch_axis).map_err(to_runtime_error)?
    };
    leading
        .flatten_from(1)
        .and_then(|t| t.mean(1))
        .map_err(to_runtime_error)
}

fn to_runtime_error(err: candle_core::Error) -> TrainingError {
    TrainingError::runtime(err.to_string())
}

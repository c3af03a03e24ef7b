//! Word-context update: squared error and the proposed next embeddings
//!
//! Nothing here mutates storage. The outputs are the would-be-next values of
//! both embeddings; the driver decides when to write them back.

use sgnsim_fixed_point::{EmbeddingVector, Fixed, FixedFormat};
use sgnsim_kernel::{CombContext, Combinational, Netlist, Result, Signal, SignalId};

use crate::datapath::DatapathConfig;
use crate::word_context_product::{wire_product, ProductPorts};

/// `diff = score - label` and `error = diff²`, both narrowed to `format`
pub struct SquaredError {
    name: String,
    score: Signal<Fixed>,
    label: Signal<Fixed>,
    diff: Signal<Fixed>,
    error: Signal<Fixed>,
    format: FixedFormat,
}

impl SquaredError {
    pub fn new(
        name: impl Into<String>,
        score: Signal<Fixed>,
        label: Signal<Fixed>,
        diff: Signal<Fixed>,
        error: Signal<Fixed>,
        format: FixedFormat,
    ) -> Self {
        Self {
            name: name.into(),
            score,
            label,
            diff,
            error,
            format,
        }
    }
}

impl Combinational for SquaredError {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.score.id(), self.label.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.diff.id(), self.error.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let score = ctx.get(self.score)?;
        let label = ctx.get(self.label)?;
        let diff = score.sub(label, self.format);
        ctx.drive(self.diff, diff)?;
        ctx.drive(self.error, diff.mul(diff, self.format))
    }
}

/// `out_j = current_j - rate · diff · grad_j`.
///
/// `rate · diff` is exact in the widened format and the product with `grad_j`
/// is exact before the single rounding into the narrow format.
pub struct GradientStep {
    name: String,
    current: Signal<EmbeddingVector>,
    grad: Signal<EmbeddingVector>,
    diff: Signal<Fixed>,
    out: Signal<EmbeddingVector>,
    rate: Fixed,
    format: FixedFormat,
    wide: FixedFormat,
}

impl GradientStep {
    pub fn new(
        name: impl Into<String>,
        current: Signal<EmbeddingVector>,
        grad: Signal<EmbeddingVector>,
        diff: Signal<Fixed>,
        out: Signal<EmbeddingVector>,
        rate: Fixed,
        format: FixedFormat,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            current,
            grad,
            diff,
            out,
            rate,
            format,
            wide: format.widened()?,
        })
    }

    /// The update rule on plain values
    pub fn step(
        &self,
        current: &EmbeddingVector,
        grad: &EmbeddingVector,
        diff: Fixed,
    ) -> Result<EmbeddingVector> {
        let scaled = self.rate.mul(diff, self.wide);
        let values = current
            .iter()
            .zip(grad.iter())
            .map(|(x, g)| x.sub(scaled.mul(g, self.format), self.format))
            .collect();
        Ok(EmbeddingVector::from_values(values, self.format)?)
    }
}

impl Combinational for GradientStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.current.id(), self.grad.id(), self.diff.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.out.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let current = ctx.get(self.current)?;
        let grad = ctx.get(self.grad)?;
        let diff = ctx.get(self.diff)?;
        let next = self.step(&current, &grad, diff)?;
        ctx.drive(self.out, next)
    }
}

/// Output ports of a wired word-context update
#[derive(Debug, Clone, Copy)]
pub struct UpdatePorts {
    pub product: ProductPorts,
    /// `score - label`
    pub diff: Signal<Fixed>,
    /// Squared error
    pub error: Signal<Fixed>,
    pub new_word: Signal<EmbeddingVector>,
    pub new_context: Signal<EmbeddingVector>,
}

impl UpdatePorts {
    pub fn score(&self) -> Signal<Fixed> {
        self.product.score
    }
}

/// Wire the full update datapath for one word/context pair against `label`
pub fn wire_update(
    net: &mut Netlist,
    prefix: &str,
    word: Signal<EmbeddingVector>,
    context: Signal<EmbeddingVector>,
    label: Signal<Fixed>,
    config: &DatapathConfig,
) -> Result<UpdatePorts> {
    let format = config.format;
    let product = wire_product(net, prefix, word, context, config)?;

    let diff = net.signal(format!("{}.diff", prefix), config.zero());
    let error = net.signal(format!("{}.error", prefix), config.zero());
    let new_word = net.signal(format!("{}.new_word", prefix), config.zero_vector());
    let new_context = net.signal(format!("{}.new_context", prefix), config.zero_vector());

    net.add_block(SquaredError::new(
        format!("{}.mse", prefix),
        product.score,
        label,
        diff,
        error,
        format,
    ));

    let rate = config.rate()?;
    net.add_block(GradientStep::new(
        format!("{}.update_word", prefix),
        word,
        product.dscore_dword,
        diff,
        new_word,
        rate,
        format,
    )?);
    net.add_block(GradientStep::new(
        format!("{}.update_context", prefix),
        context,
        product.dscore_dcontext,
        diff,
        new_context,
        rate,
        format,
    )?);

    Ok(UpdatePorts {
        product,
        diff,
        error,
        new_word,
        new_context,
    })
}

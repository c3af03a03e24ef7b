//! Vector dot product block

use sgnsim_fixed_point::{EmbeddingVector, Fixed, FixedFormat};
use sgnsim_kernel::{CombContext, Combinational, Result, Signal, SignalId};

/// `y = Σ a_j · b_j`, accumulated in the widened format and narrowed to `format`.
///
/// The dot product is bilinear, so its gradients are the opposite operand
/// wired straight through: `∂y/∂a = b` and `∂y/∂b = a`.
pub struct DotProduct {
    name: String,
    a: Signal<EmbeddingVector>,
    b: Signal<EmbeddingVector>,
    y: Signal<Fixed>,
    format: FixedFormat,
}

impl DotProduct {
    pub fn new(
        name: impl Into<String>,
        a: Signal<EmbeddingVector>,
        b: Signal<EmbeddingVector>,
        y: Signal<Fixed>,
        format: FixedFormat,
    ) -> Self {
        Self {
            name: name.into(),
            a,
            b,
            y,
            format,
        }
    }

    /// Signal carrying `∂y/∂a`
    pub fn grad_a(&self) -> Signal<EmbeddingVector> {
        self.b
    }

    /// Signal carrying `∂y/∂b`
    pub fn grad_b(&self) -> Signal<EmbeddingVector> {
        self.a
    }
}

impl Combinational for DotProduct {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.a.id(), self.b.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.y.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let a = ctx.get(self.a)?;
        let b = ctx.get(self.b)?;
        let y = a.dot(&b, self.format)?;
        ctx.drive(self.y, y)
    }
}

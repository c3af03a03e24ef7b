//! Scalar-times-vector block used for chain-rule gradients

use sgnsim_fixed_point::{EmbeddingVector, Fixed};
use sgnsim_kernel::{CombContext, Combinational, Result, Signal, SignalId};

/// `out_j = scalar · vector_j`, one rounding per element
pub struct GradientScale {
    name: String,
    scalar: Signal<Fixed>,
    vector: Signal<EmbeddingVector>,
    out: Signal<EmbeddingVector>,
}

impl GradientScale {
    pub fn new(
        name: impl Into<String>,
        scalar: Signal<Fixed>,
        vector: Signal<EmbeddingVector>,
        out: Signal<EmbeddingVector>,
    ) -> Self {
        Self {
            name: name.into(),
            scalar,
            vector,
            out,
        }
    }
}

impl Combinational for GradientScale {
    fn name(&self) -> &str {
        &self.name
    }

    fn inputs(&self) -> Vec<SignalId> {
        vec![self.scalar.id(), self.vector.id()]
    }

    fn outputs(&self) -> Vec<SignalId> {
        vec![self.out.id()]
    }

    fn evaluate(&mut self, ctx: &mut CombContext<'_>) -> Result<()> {
        let scalar = ctx.get(self.scalar)?;
        let vector = ctx.get(self.vector)?;
        ctx.drive(self.out, vector.scale_by(scalar))
    }
}

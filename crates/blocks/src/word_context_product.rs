//! Word-context product: `score = rectifier(dot(word, context))`

use sgnsim_fixed_point::{EmbeddingVector, Fixed};
use sgnsim_kernel::{Netlist, Result, Signal};

use crate::datapath::DatapathConfig;
use crate::dot_product::DotProduct;
use crate::rectifier::Rectifier;
use crate::scale::GradientScale;

/// Output ports of a wired word-context product
#[derive(Debug, Clone, Copy)]
pub struct ProductPorts {
    /// Rectified score
    pub score: Signal<Fixed>,
    /// Raw dot product before the rectifier
    pub dot: Signal<Fixed>,
    /// Rectifier slope at `dot`
    pub slope: Signal<Fixed>,
    /// `∂score/∂word_j = slope · context_j`
    pub dscore_dword: Signal<EmbeddingVector>,
    /// `∂score/∂context_j = slope · word_j`
    pub dscore_dcontext: Signal<EmbeddingVector>,
}

/// Wire dot product, rectifier and gradient scaling between `word` and `context`
pub fn wire_product(
    net: &mut Netlist,
    prefix: &str,
    word: Signal<EmbeddingVector>,
    context: Signal<EmbeddingVector>,
    config: &DatapathConfig,
) -> Result<ProductPorts> {
    let format = config.format;
    let dot = net.signal(format!("{}.dot", prefix), config.zero());
    let score = net.signal(format!("{}.score", prefix), config.zero());
    let slope = net.signal(format!("{}.slope", prefix), config.zero());
    let dscore_dword = net.signal(format!("{}.dscore_dword", prefix), config.zero_vector());
    let dscore_dcontext = net.signal(format!("{}.dscore_dcontext", prefix), config.zero_vector());

    let dot_block = DotProduct::new(format!("{}.dot", prefix), word, context, dot, format);
    let ddot_dword = dot_block.grad_a();
    let ddot_dcontext = dot_block.grad_b();
    net.add_block(dot_block);

    net.add_block(Rectifier::new(
        format!("{}.relu", prefix),
        dot,
        score,
        slope,
        config.leaky_val,
        format,
    )?);
    net.add_block(GradientScale::new(
        format!("{}.dscore_dword", prefix),
        slope,
        ddot_dword,
        dscore_dword,
    ));
    net.add_block(GradientScale::new(
        format!("{}.dscore_dcontext", prefix),
        slope,
        ddot_dcontext,
        dscore_dcontext,
    ));

    Ok(ProductPorts {
        score,
        dot,
        slope,
        dscore_dword,
        dscore_dcontext,
    })
}

//! sgnsim Datapath Blocks
//!
//! Combinational building blocks of the word-context datapath and the
//! clocked memory bank that stores embeddings. The composite blocks are
//! wired as sub-netlists: `wire_product` builds dot product, rectifier and
//! gradient ports, `wire_update` adds squared error and the gradient step.

mod datapath;
mod dot_product;
mod memory;
mod rectifier;
mod scale;
mod word_context_product;
mod word_context_update;

pub use datapath::DatapathConfig;
pub use dot_product::DotProduct;
pub use memory::{MemoryBank, MemoryPorts, MemoryStore, SharedStore};
pub use rectifier::{leaky_relu, Rectifier};
pub use scale::GradientScale;
pub use word_context_product::{wire_product, ProductPorts};
pub use word_context_update::{wire_update, GradientStep, SquaredError, UpdatePorts};

//! Graphics and compute pipeline objects.

mod compute;
mod graphics;

pub use compute::ComputePipeline;
pub use graphics::{GraphicsPipeline, PipelineConfig};

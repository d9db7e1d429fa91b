pub mod gpu;
pub mod handle;
pub mod vertex;

pub use gpu::{CurGpu, Gpu, GpuType, Gpus, Limits};
pub use handle::Handle;
pub use vertex::Vertex;

pub mod bvh;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod rendergraph;
pub mod renderer;
pub mod resource;
pub mod shader;
pub mod swapchain;
pub mod texture;
mod tasks;

pub use context::GraphicsContext;
pub use error::RendererError;
pub use swapchain::{Swapchain, SwapchainCreateOptions};

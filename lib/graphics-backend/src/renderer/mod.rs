//! Frame-level rendering: the forward render loop, its managed `GlobalUBO`,
//! auto-exposure, and tonemap/post-process pass.

pub mod auto_exposure;
pub mod forward;
pub mod global_uniforms;
pub mod tonemap;

pub use auto_exposure::{AutoExposure, AutoExposureConfig, Method as AutoExposureMethod};
pub use forward::{EnvironmentSettings, Frustum, RenderStats, Renderable};
pub use global_uniforms::{GlobalUniforms, Light, MAX_LIGHTS};
pub use tonemap::{TonemapOperator, TonemapSettings};

pub use forward::ForwardRenderer;

use thiserror::Error;

/// Fatal, structurally-typed failures a caller wants to match on, plus the
/// two swapchain-acquire outcomes a per-frame caller must distinguish from
/// fatal ones. Everything else either goes through `anyhow::Result`
/// (construction-time failures with no useful variant) or is a recoverable
/// sentinel return (`LayoutHandle(0)`, bindless index `0`, `None`, `false`).
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("device lost")]
    DeviceLost,
    #[error("out of device memory")]
    OutOfDeviceMemory,
    #[error("required device feature not supported: {0}")]
    MissingDeviceFeature(&'static str),
    #[error("swapchain out of date")]
    SwapchainOutOfDate,
    #[error("swapchain suboptimal")]
    SwapchainSuboptimal,
}

impl RendererError {
    /// Swapchain acquire failures are recoverable: recreate and
    /// skip the frame rather than propagate as fatal.
    pub fn is_recoverable_per_frame(&self) -> bool {
        matches!(
            self,
            RendererError::SwapchainOutOfDate | RendererError::SwapchainSuboptimal
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_swapchain_variants_are_per_frame_recoverable() {
        assert!(RendererError::SwapchainOutOfDate.is_recoverable_per_frame());
        assert!(RendererError::SwapchainSuboptimal.is_recoverable_per_frame());
        assert!(!RendererError::DeviceLost.is_recoverable_per_frame());
        assert!(!RendererError::OutOfDeviceMemory.is_recoverable_per_frame());
        assert!(!RendererError::MissingDeviceFeature("descriptorIndexing").is_recoverable_per_frame());
    }
}

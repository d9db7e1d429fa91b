//! Logical resources tracked by a `RenderGraph`: either an imported external
//! image/buffer or a transient image owned by the graph itself.

use ash::vk;

/// Pipeline stage, access mask, and (for images) layout a resource sits in at
/// a given point in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl ResourceState {
    pub fn buffer(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self {
            stage,
            access,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
}

enum ResourceKind {
    Image { image: vk::Image },
    Buffer { buffer: vk::Buffer },
    TransientImage { image: vk::Image, desc: ImageDesc },
}

/// One named slot in the graph: an imported external image/buffer, or a
/// transient image the graph itself owns for the frame.
pub struct LogicalResource {
    kind: ResourceKind,
    pub current: ResourceState,
    /// Imported resources declare the state they must end the frame in
    /// (e.g. the swapchain image -> `PresentSrcKhr`); transient resources
    /// have none, since nothing outside the frame observes them.
    pub final_state: Option<ResourceState>,
}

impl LogicalResource {
    pub fn imported_image(image: vk::Image, initial_state: ResourceState, final_state: ResourceState) -> Self {
        Self {
            kind: ResourceKind::Image { image },
            current: initial_state,
            final_state: Some(final_state),
        }
    }

    pub fn imported_buffer(buffer: vk::Buffer, initial_state: ResourceState, final_state: ResourceState) -> Self {
        Self {
            kind: ResourceKind::Buffer { buffer },
            current: initial_state,
            final_state: Some(final_state),
        }
    }

    pub fn transient_image(image: vk::Image, desc: ImageDesc) -> Self {
        Self {
            kind: ResourceKind::TransientImage { image, desc },
            current: ResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            },
            final_state: None,
        }
    }

    pub fn kind_image(&self) -> Option<vk::Image> {
        match self.kind {
            ResourceKind::Image { image } | ResourceKind::TransientImage { image, .. } => Some(image),
            ResourceKind::Buffer { .. } => None,
        }
    }

    pub fn kind_buffer(&self) -> Option<vk::Buffer> {
        match self.kind {
            ResourceKind::Buffer { buffer } => Some(buffer),
            _ => None,
        }
    }

    pub fn image_desc(&self) -> Option<ImageDesc> {
        match self.kind {
            ResourceKind::TransientImage { desc, .. } => Some(desc),
            _ => None,
        }
    }
}

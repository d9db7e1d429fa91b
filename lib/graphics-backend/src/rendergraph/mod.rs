//! Per-frame render graph: logical resources, producer/consumer passes, and
//! the derived `pipelineBarrier2` calls between them.

mod resource;

use std::collections::HashMap;

use ash::vk;

pub use resource::{ImageDesc, LogicalResource, ResourceState};

/// One read or write access a pass declares against a named resource.
#[derive(Debug, Clone, Copy)]
pub struct PassAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: Option<vk::ImageLayout>,
    pub is_write: bool,
}

pub struct PassDecl {
    pub name: String,
    pub reads: Vec<(String, PassAccess)>,
    pub writes: Vec<(String, PassAccess)>,
}

/// Builds per-frame barrier lists from a declared sequence of passes over a
/// set of imported/transient resources.
pub struct RenderGraph {
    resources: HashMap<String, LogicalResource>,
    passes: Vec<PassDecl>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self {
            resources: HashMap::new(),
            passes: Vec::new(),
        }
    }

    /// External resources are registered with `import_{image,buffer}(name,
    /// resource, initial_state, final_state)`.
    pub fn import_image(
        &mut self,
        name: &str,
        image: vk::Image,
        initial_state: ResourceState,
        final_state: ResourceState,
    ) {
        self.resources.insert(
            name.to_string(),
            LogicalResource::imported_image(image, initial_state, final_state),
        );
    }

    pub fn import_buffer(
        &mut self,
        name: &str,
        buffer: vk::Buffer,
        initial_state: ResourceState,
        final_state: ResourceState,
    ) {
        self.resources.insert(
            name.to_string(),
            LogicalResource::imported_buffer(buffer, initial_state, final_state),
        );
    }

    /// Transient resources are declared with `create_transient_image(name,
    /// image, desc)`.
    pub fn create_transient_image(&mut self, name: &str, image: vk::Image, desc: ImageDesc) {
        self.resources
            .insert(name.to_string(), LogicalResource::transient_image(image, desc));
    }

    pub fn add_pass(&mut self, pass: PassDecl) {
        self.passes.push(pass);
    }

    pub fn clear_passes(&mut self) {
        self.passes.clear();
    }

    /// Returns, for the pass at `pass_index`, the image/buffer barriers
    /// needed to transition every resource it reads or writes from its
    /// previously-recorded state, using the narrowest stage/access masks the
    /// producer/consumer metadata allows.
    pub fn barriers_for_pass(&mut self, pass_index: usize) -> (Vec<vk::ImageMemoryBarrier2<'static>>, Vec<vk::BufferMemoryBarrier2<'static>>) {
        let Some(pass) = self.passes.get(pass_index) else {
            return (Vec::new(), Vec::new());
        };
        let accesses: Vec<(String, PassAccess)> =
            pass.reads.iter().cloned().chain(pass.writes.iter().cloned()).collect();

        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        for (name, access) in accesses {
            let Some(resource) = self.resources.get_mut(&name) else {
                log::warn!("render graph pass '{}' references unknown resource '{name}'", pass.name);
                continue;
            };
            let new_state = ResourceState {
                stage: access.stage,
                access: access.access,
                layout: access.layout.unwrap_or(resource.current.layout),
            };
            if new_state.stage == resource.current.stage
                && new_state.access == resource.current.access
                && new_state.layout == resource.current.layout
            {
                continue;
            }

            match resource.kind_image() {
                Some(image) => image_barriers.push(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(resource.current.stage)
                        .src_access_mask(resource.current.access)
                        .dst_stage_mask(new_state.stage)
                        .dst_access_mask(new_state.access)
                        .old_layout(resource.current.layout)
                        .new_layout(new_state.layout)
                        .image(image)
                        .subresource_range(
                            vk::ImageSubresourceRange::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .level_count(1)
                                .layer_count(1),
                        ),
                ),
                None => {
                    if let Some(buffer) = resource.kind_buffer() {
                        buffer_barriers.push(
                            vk::BufferMemoryBarrier2::default()
                                .src_stage_mask(resource.current.stage)
                                .src_access_mask(resource.current.access)
                                .dst_stage_mask(new_state.stage)
                                .dst_access_mask(new_state.access)
                                .buffer(buffer)
                                .offset(0)
                                .size(vk::WHOLE_SIZE),
                        );
                    }
                }
            }
            resource.current = new_state;
        }
        (image_barriers, buffer_barriers)
    }

    /// Records the barriers for `pass_index` via `vkCmdPipelineBarrier2`.
    pub fn apply_pass_barriers(&mut self, device: &ash::Device, cmd: vk::CommandBuffer, pass_index: usize) {
        let (image_barriers, buffer_barriers) = self.barriers_for_pass(pass_index);
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    /// Transitions every imported resource to its declared final state,
    /// called once after the last pass (e.g. swapchain image -> PresentSrc).
    pub fn finalize(&mut self, device: &ash::Device, cmd: vk::CommandBuffer) {
        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        for resource in self.resources.values_mut() {
            let Some(final_state) = resource.final_state else {
                continue;
            };
            if final_state.stage == resource.current.stage
                && final_state.access == resource.current.access
                && final_state.layout == resource.current.layout
            {
                continue;
            }
            if let Some(image) = resource.kind_image() {
                image_barriers.push(
                    vk::ImageMemoryBarrier2::default()
                        .src_stage_mask(resource.current.stage)
                        .src_access_mask(resource.current.access)
                        .dst_stage_mask(final_state.stage)
                        .dst_access_mask(final_state.access)
                        .old_layout(resource.current.layout)
                        .new_layout(final_state.layout)
                        .image(image)
                        .subresource_range(
                            vk::ImageSubresourceRange::default()
                                .aspect_mask(vk::ImageAspectFlags::COLOR)
                                .level_count(1)
                                .layer_count(1),
                        ),
                );
            } else if let Some(buffer) = resource.kind_buffer() {
                buffer_barriers.push(
                    vk::BufferMemoryBarrier2::default()
                        .src_stage_mask(resource.current.stage)
                        .src_access_mask(resource.current.access)
                        .dst_stage_mask(final_state.stage)
                        .dst_access_mask(final_state.access)
                        .buffer(buffer)
                        .offset(0)
                        .size(vk::WHOLE_SIZE),
                );
            }
            resource.current = final_state;
        }
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe { device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_state_produces_no_barrier() {
        let mut graph = RenderGraph::new();
        graph.import_image(
            "hdr_color",
            vk::Image::null(),
            ResourceState {
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
            ResourceState {
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
        );
        graph.add_pass(PassDecl {
            name: "Main".into(),
            reads: Vec::new(),
            writes: vec![(
                "hdr_color".into(),
                PassAccess {
                    stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                    layout: Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                    is_write: true,
                },
            )],
        });
        let (image_barriers, buffer_barriers) = graph.barriers_for_pass(0);
        assert!(image_barriers.is_empty());
        assert!(buffer_barriers.is_empty());
    }

    #[test]
    fn layout_transition_produces_one_image_barrier() {
        let mut graph = RenderGraph::new();
        graph.import_image(
            "hdr_color",
            vk::Image::null(),
            ResourceState {
                stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
                access: vk::AccessFlags2::NONE,
                layout: vk::ImageLayout::UNDEFINED,
            },
            ResourceState {
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
        );
        graph.add_pass(PassDecl {
            name: "Main".into(),
            reads: Vec::new(),
            writes: vec![(
                "hdr_color".into(),
                PassAccess {
                    stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                    access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                    layout: Some(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
                    is_write: true,
                },
            )],
        });
        let (image_barriers, buffer_barriers) = graph.barriers_for_pass(0);
        assert_eq!(image_barriers.len(), 1);
        assert!(buffer_barriers.is_empty());
        assert_eq!(image_barriers[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }
}

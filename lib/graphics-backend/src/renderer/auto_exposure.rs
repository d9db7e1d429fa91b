//! GPU luminance measurement with a delayed CPU readback, driving an
//! exponentially-smoothed EV100.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::context::GraphicsContext;
use crate::pipeline::ComputePipeline;
use crate::resource::BufferResource;

/// Frames between a compute dispatch writing the readback buffer and the CPU
/// treating its contents as valid.
pub const READBACK_DELAY: u32 = 2;

const HISTOGRAM_BINS: usize = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SimpleReadback {
    avg_log_luminance: f32,
    min: f32,
    max: f32,
    sample_count: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct HistogramReadback {
    bins: [u32; HISTOGRAM_BINS],
    min_log_luminance: f32,
    max_log_luminance: f32,
    pixel_count: u32,
    _padding: u32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct HistogramPushConstants {
    min_log_lum: f32,
    max_log_lum: f32,
    center_weight_power: f32,
    enabled: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Simple,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct AutoExposureConfig {
    pub method: Method,
    pub min_ev100: f32,
    pub max_ev100: f32,
    pub exposure_compensation: f32,
    pub adaptation_speed: f32,
    pub min_log_luminance: f32,
    pub max_log_luminance: f32,
    pub center_weight_power: f32,
    pub low_percentile: f32,
    pub high_percentile: f32,
}

impl Default for AutoExposureConfig {
    fn default() -> Self {
        Self {
            method: Method::Histogram,
            min_ev100: -4.0,
            max_ev100: 16.0,
            exposure_compensation: 0.0,
            adaptation_speed: 2.0,
            min_log_luminance: -8.0,
            max_log_luminance: 4.0,
            center_weight_power: 1.0,
            low_percentile: 0.5,
            high_percentile: 0.95,
        }
    }
}

/// One pending readback in flight, tagged with the frame it was dispatched
/// on so `update` knows when `READBACK_DELAY` has elapsed.
struct PendingFrame {
    dispatched_frame: u64,
}

/// Luminance-measurement compute pass plus the CPU-side EV100 smoothing
/// state.
pub struct AutoExposure {
    config: AutoExposureConfig,
    pipeline: ComputePipeline,
    readback_buffer: BufferResource,
    pending: Option<PendingFrame>,
    frame_counter: u64,
    current_ev100: f32,
    enabled: bool,
}

impl AutoExposure {
    pub fn new(pipeline: ComputePipeline, readback_buffer: BufferResource, config: AutoExposureConfig) -> Self {
        Self {
            config,
            pipeline,
            readback_buffer,
            pending: None,
            frame_counter: 0,
            current_ev100: 0.0,
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn current_ev100(&self) -> f32 {
        self.current_ev100
    }

    pub fn readback_buffer(&self) -> &BufferResource {
        &self.readback_buffer
    }

    /// Zeroes the readback buffer, then dispatches the
    /// configured compute pipeline over `extent`.
    pub fn record_dispatch(&mut self, ctx: &GraphicsContext, cmd: vk::CommandBuffer, extent: vk::Extent2D) {
        if !self.enabled {
            return;
        }
        unsafe {
            ctx.device.cmd_fill_buffer(cmd, self.readback_buffer.buffer, 0, self.readback_buffer.size, 0);

            let barrier = vk::BufferMemoryBarrier2::default()
                .src_stage_mask(vk::PipelineStageFlags2::TRANSFER)
                .src_access_mask(vk::AccessFlags2::TRANSFER_WRITE)
                .dst_stage_mask(vk::PipelineStageFlags2::COMPUTE_SHADER)
                .dst_access_mask(vk::AccessFlags2::SHADER_WRITE)
                .buffer(self.readback_buffer.buffer)
                .offset(0)
                .size(vk::WHOLE_SIZE);
            ctx.device.cmd_pipeline_barrier2(
                cmd,
                &vk::DependencyInfo::default().buffer_memory_barriers(std::slice::from_ref(&barrier)),
            );

            ctx.device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::COMPUTE, self.pipeline.handle());

            let push = HistogramPushConstants {
                min_log_lum: self.config.min_log_luminance,
                max_log_lum: self.config.max_log_luminance,
                center_weight_power: self.config.center_weight_power,
                enabled: 1,
            };
            ctx.device.cmd_push_constants(
                cmd,
                self.pipeline.layout(),
                vk::ShaderStageFlags::COMPUTE,
                0,
                bytemuck::bytes_of(&push),
            );

            let (group_x, group_y, group_z) = match self.config.method {
                Method::Histogram => (extent.width.div_ceil(16).max(1), extent.height.div_ceil(16).max(1), 1),
                Method::Simple => (1, 1, 1),
            };
            ctx.device.cmd_dispatch(cmd, group_x, group_y, group_z);
        }
        // Only arm a new wait if nothing is already in flight — overwriting
        // `pending` every frame would reset the elapsed-frame count before
        // it ever reaches `READBACK_DELAY`.
        if self.pending.is_none() {
            self.pending = Some(PendingFrame {
                dispatched_frame: self.frame_counter,
            });
        }
        self.frame_counter += 1;
    }

    /// After `READBACK_DELAY` frames, reads the
    /// mapped buffer and derive `target_ev100` via the Frostbite formula,
    /// then exponentially interpolate `current_ev100` toward it.
    pub fn update(&mut self, dt: f32) {
        if !self.enabled {
            return;
        }
        let Some(pending) = &self.pending else {
            return;
        };
        if self.frame_counter.saturating_sub(pending.dispatched_frame) < READBACK_DELAY as u64 {
            return;
        }
        self.pending = None;

        let Some(avg_lum) = self.read_avg_luminance() else {
            return;
        };

        let target_ev100 = (avg_lum * 100.0 / 12.5).log2() + self.config.exposure_compensation;
        let target_ev100 = target_ev100.clamp(self.config.min_ev100, self.config.max_ev100);
        let alpha = 1.0 - (-self.config.adaptation_speed * dt).exp();
        self.current_ev100 = (self.current_ev100 + (target_ev100 - self.current_ev100) * alpha)
            .clamp(self.config.min_ev100, self.config.max_ev100);
    }

    fn read_avg_luminance(&self) -> Option<f32> {
        let Some(ptr) = self.readback_buffer.mapped_ptr else {
            return None;
        };
        match self.config.method {
            Method::Simple => {
                let readback = unsafe { std::ptr::read_unaligned(ptr as *const SimpleReadback) };
                if readback.sample_count == 0 {
                    return None;
                }
                Some(2f32.powf(readback.avg_log_luminance))
            }
            Method::Histogram => {
                let readback = unsafe { std::ptr::read_unaligned(ptr as *const HistogramReadback) };
                if readback.pixel_count == 0 {
                    return None;
                }
                let avg_log_lum = weighted_mean_bin(
                    &readback.bins,
                    readback.pixel_count,
                    readback.min_log_luminance,
                    readback.max_log_luminance,
                    self.config.low_percentile,
                    self.config.high_percentile,
                )?;
                Some(2f32.powf(avg_log_lum))
            }
        }
    }
}

/// Drops the lowest/highest percentile of samples, then computes the
/// weighted mean over the remaining bins and maps it back to a log-luminance
/// value (Histogram branch).
fn weighted_mean_bin(
    bins: &[u32; HISTOGRAM_BINS],
    pixel_count: u32,
    min_log_luminance: f32,
    max_log_luminance: f32,
    low_percentile: f32,
    high_percentile: f32,
) -> Option<f32> {
    let total = pixel_count as f64;
    let low_cut = total * low_percentile as f64;
    let high_cut = total * high_percentile as f64;

    let mut cumulative = 0f64;
    let mut weighted_sum = 0f64;
    let mut weight_total = 0f64;
    for (index, &count) in bins.iter().enumerate() {
        let bin_start = cumulative;
        let bin_end = cumulative + count as f64;
        cumulative = bin_end;
        if bin_end <= low_cut || bin_start >= high_cut {
            continue;
        }
        let included = (bin_end.min(high_cut) - bin_start.max(low_cut)).max(0.0);
        weighted_sum += included * index as f64;
        weight_total += included;
    }
    if weight_total <= 0.0 {
        return None;
    }
    let mean_bin = weighted_sum / weight_total;
    let t = (mean_bin / (HISTOGRAM_BINS - 1) as f64) as f32;
    Some(min_log_luminance + (max_log_luminance - min_log_luminance) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_readback_converts_log_luminance_to_linear() {
        let value = 2f32.powf(0.0);
        assert!((value - 1.0).abs() < 1e-5);
    }

    #[test]
    fn frostbite_formula_matches_worked_example() {
        // avg_lum = 1.0 -> target_ev100 = log2(100/12.5) = 3.0
        let avg_lum = 1.0f32;
        let target = (avg_lum * 100.0 / 12.5).log2();
        assert!((target - 3.0).abs() < 1e-4);
    }

    #[test]
    fn exponential_interpolation_matches_worked_example() {
        let current = 9.0f32;
        let target = 3.0f32;
        let adaptation_speed = 2.0f32;
        let dt = 0.5f32;
        let alpha = 1.0 - (-adaptation_speed * dt).exp();
        let next = current + (target - current) * alpha;
        assert!((next - 5.21).abs() < 0.05);
    }

    #[test]
    fn weighted_mean_ignores_outlier_percentiles() {
        let mut bins = [0u32; HISTOGRAM_BINS];
        bins[0] = 1; // extreme low outlier
        bins[32] = 100; // bulk of the distribution
        bins[63] = 1; // extreme high outlier
        let pixel_count = bins.iter().sum();
        let mean = weighted_mean_bin(&bins, pixel_count, -8.0, 4.0, 0.05, 0.95).unwrap();
        let expected_t = 32.0 / (HISTOGRAM_BINS - 1) as f32;
        let expected = -8.0 + 12.0 * expected_t;
        assert!((mean - expected).abs() < 0.5);
    }

    #[test]
    fn zero_pixel_count_yields_no_reading() {
        let bins = [0u32; HISTOGRAM_BINS];
        assert!(weighted_mean_bin(&bins, 0, -8.0, 4.0, 0.05, 0.95).is_none());
    }

    /// Models `record_dispatch`/`update`'s arm-once-per-in-flight-readback
    /// protocol without a real device: `pending` must only be armed while
    /// `None`, or the elapsed-frame gap never reaches `READBACK_DELAY`.
    #[test]
    fn pending_frame_reaches_readback_delay_when_not_clobbered() {
        let mut pending: Option<u64> = None;
        let mut frame_counter = 0u64;
        let mut readbacks = 0u32;
        for _ in 0..6 {
            if let Some(dispatched) = pending {
                if frame_counter.saturating_sub(dispatched) >= READBACK_DELAY as u64 {
                    pending = None;
                    readbacks += 1;
                }
            }
            if pending.is_none() {
                pending = Some(frame_counter);
            }
            frame_counter += 1;
        }
        assert!(readbacks >= 2, "expected periodic readbacks, got {readbacks}");
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use metalwerk_frame::{FrameCompletion, MAX_FRAMES_IN_FLIGHT, SlotIndex};
use metalwerk_render::{
    CommandQueue, DrawableSize, FrameSubmission, FrameUniforms, QueueError, SubmitFailure,
};

/// Size in bytes of one slot's uniform buffer.
const UNIFORM_SIZE: u64 = std::mem::size_of::<FrameUniforms>() as u64;

/// Format of the offscreen colour target frames are cleared into.
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Errors from setting up the wgpu backend.
#[derive(Debug, thiserror::Error)]
pub enum WgpuQueueError {
    #[error("buffer count must be in 1..={max}, got {requested}")]
    BufferCount { requested: usize, max: usize },
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("failed to spawn GPU poll thread: {0}")]
    PollThread(#[from] std::io::Error),
}

struct OffscreenTarget {
    size: DrawableSize,
    view: wgpu::TextureView,
}

/// [`CommandQueue`] over a host-owned wgpu device and queue.
///
/// Each frame slot has its own uniform buffer and bind group. Completion is
/// reported through `Queue::on_submitted_work_done`; a background thread
/// polls the device so those callbacks fire without the host's help.
pub struct WgpuQueue {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    uniform_buffers: Vec<wgpu::Buffer>,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_groups: Vec<wgpu::BindGroup>,
    target: Option<OffscreenTarget>,
    lost: Arc<AtomicBool>,
    poller: Option<Sender<wgpu::SubmissionIndex>>,
    poll_thread: Option<JoinHandle<()>>,
}

impl WgpuQueue {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        buffer_count: usize,
    ) -> Result<Self, WgpuQueueError> {
        if buffer_count == 0 || buffer_count > MAX_FRAMES_IN_FLIGHT {
            return Err(WgpuQueueError::BufferCount {
                requested: buffer_count,
                max: MAX_FRAMES_IN_FLIGHT,
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("frame_uniforms_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(UNIFORM_SIZE),
                },
                count: None,
            }],
        });

        let uniform_buffers: Vec<wgpu::Buffer> = (0..buffer_count)
            .map(|i| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("frame_uniforms_{i}")),
                    size: UNIFORM_SIZE,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let bind_groups = uniform_buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("frame_uniforms_bind_group_{i}")),
                    layout: &bind_group_layout,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                })
            })
            .collect();

        let lost = Arc::new(AtomicBool::new(false));
        {
            let lost = Arc::clone(&lost);
            device.set_device_lost_callback(move |reason, message| {
                tracing::error!(?reason, %message, "GPU device lost");
                lost.store(true, Ordering::Release);
            });
        }

        let (poller, indices) = mpsc::channel::<wgpu::SubmissionIndex>();
        let poll_device = Arc::clone(&device);
        let poll_thread = thread::Builder::new()
            .name("gpu-completion".into())
            .spawn(move || {
                // Each wait fires the completion callbacks registered for
                // that submission on this thread.
                for index in indices {
                    let _ = poll_device.poll(wgpu::Maintain::wait_for(index));
                }
            })?;

        tracing::debug!(buffer_count, "wgpu frame queue created");

        Ok(Self {
            device,
            queue,
            uniform_buffers,
            bind_group_layout,
            bind_groups,
            target: None,
            lost,
            poller: Some(poller),
            poll_thread: Some(poll_thread),
        })
    }

    /// Create a device with no surface, for tools and tests.
    pub fn headless(buffer_count: usize) -> Result<Self, WgpuQueueError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(WgpuQueueError::NoAdapter)?;
        tracing::info!(adapter = ?adapter.get_info().name, "using headless adapter");

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("metalwerk_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: Default::default(),
            },
            None,
        ))?;

        Self::new(Arc::new(device), Arc::new(queue), buffer_count)
    }

    pub fn buffer_count(&self) -> usize {
        self.uniform_buffers.len()
    }

    /// Layout hosts use when building pipelines that read frame uniforms.
    pub fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn bind_group(&self, slot: SlotIndex) -> Option<&wgpu::BindGroup> {
        self.bind_groups.get(slot.0)
    }

    pub fn uniform_buffer(&self, slot: SlotIndex) -> Option<&wgpu::Buffer> {
        self.uniform_buffers.get(slot.0)
    }

    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn target_view(&mut self, size: DrawableSize) -> &wgpu::TextureView {
        let target = match self.target.take() {
            Some(target) if target.size == size => target,
            _ => Self::create_target(&self.device, size),
        };
        &self.target.insert(target).view
    }

    fn create_target(device: &wgpu::Device, size: DrawableSize) -> OffscreenTarget {
        tracing::debug!(width = size.width, height = size.height, "recreating offscreen target");
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("frame_target"),
            size: wgpu::Extent3d {
                width: size.width.max(1),
                height: size.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        OffscreenTarget {
            size,
            view: texture.create_view(&Default::default()),
        }
    }
}

impl CommandQueue for WgpuQueue {
    fn submit(
        &mut self,
        submission: FrameSubmission,
        completion: FrameCompletion,
    ) -> Result<(), SubmitFailure> {
        if self.is_lost() {
            return Err(SubmitFailure {
                error: QueueError::DeviceLost,
                completion,
            });
        }
        let Some(buffer) = self.uniform_buffers.get(submission.slot.0) else {
            return Err(SubmitFailure {
                error: QueueError::Rejected(format!(
                    "slot {} has no uniform buffer ({} allocated)",
                    submission.slot,
                    self.uniform_buffers.len()
                )),
                completion,
            });
        };

        self.queue
            .write_buffer(buffer, 0, bytemuck::bytes_of(&submission.uniforms));

        let device = Arc::clone(&self.device);
        let view = self.target_view(submission.drawable_size);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("frame_encoder"),
        });
        {
            let [r, g, b, a] = submission.clear_color;
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
        }

        let index = self.queue.submit(std::iter::once(encoder.finish()));
        let frame = submission.frame;
        self.queue.on_submitted_work_done(move || {
            tracing::trace!(frame, "GPU finished frame");
            completion.signal();
        });

        let handed_off = self
            .poller
            .as_ref()
            .is_some_and(|poller| poller.send(index.clone()).is_ok());
        if !handed_off {
            // No poll thread left: wait here so the completion still fires.
            let _ = self.device.poll(wgpu::Maintain::wait_for(index));
        }
        Ok(())
    }
}

impl Drop for WgpuQueue {
    fn drop(&mut self) {
        self.poller.take();
        if let Some(thread) = self.poll_thread.take() {
            let _ = thread.join();
        }
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

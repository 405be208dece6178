use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use bytemuck::{Pod, Zeroable};
use wgpu::{
    vertex_attr_array, AddressMode, BindGroup, BindGroupDescriptor, BindGroupEntry,
    BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingResource,
    BindingType, Buffer, BufferBindingType, BufferDescriptor, BufferUsages, ColorTargetState,
    ColorWrites, CommandEncoderDescriptor, CompositeAlphaMode, DeviceDescriptor, Extent3d,
    FilterMode, FragmentState, Instance, LoadOp, MapMode, MultisampleState, Operations, Origin3d,
    PipelineLayoutDescriptor, PresentMode, PrimitiveState, RenderPassColorAttachment,
    RenderPassDescriptor, RenderPipeline, RenderPipelineDescriptor, RequestAdapterOptions,
    Sampler, SamplerBindingType, SamplerDescriptor, ShaderModule, ShaderModuleDescriptor,
    ShaderSource, SurfaceConfiguration, TexelCopyBufferInfo, TexelCopyBufferLayout,
    TexelCopyTextureInfo, Texture, TextureAspect, TextureDescriptor, TextureDimension,
    TextureFormat, TextureSampleType, TextureUsages, TextureViewDescriptor, TextureViewDimension,
    VertexAttribute, VertexBufferLayout, VertexState, VertexStepMode,
};
use winit::{dpi::PhysicalSize, window::Window};

use crate::config::EngineConfig;
use crate::render::instances::{FrameInstances, TileInstance};
use crate::render::staging::{align_up, BufferCursor};
use crate::sprite::{composite_frame, SpriteRegistry};

/// Instances one frame slot can hold, tiles and entities together.
const MAX_INSTANCES: u64 = 16_384;
const INSTANCE_STRIDE: u64 = std::mem::size_of::<TileInstance>() as u64;
const SLOT_BUFFER_SIZE: u64 = MAX_INSTANCES * INSTANCE_STRIDE;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.06,
    g: 0.05,
    b: 0.09,
    a: 1.0,
};

/// Unit quad as two triangles; instances scale it to their screen rect.
const QUAD_VERTICES: [[f32; 2]; 6] = [
    [0.0, 0.0],
    [1.0, 0.0],
    [1.0, 1.0],
    [0.0, 0.0],
    [1.0, 1.0],
    [0.0, 1.0],
];

const QUAD_ATTRIBUTES: [VertexAttribute; 1] = vertex_attr_array![0 => Float32x2];
const TILE_ATTRIBUTES: [VertexAttribute; 2] = vertex_attr_array![1 => Float32x4, 2 => Float32x4];
const ENTITY_ATTRIBUTES: [VertexAttribute; 3] =
    vertex_attr_array![1 => Float32x4, 2 => Uint32, 3 => Uint32];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Globals {
    screen_size: [f32; 2],
    _pad: [f32; 2],
}

/// Per-frame dynamic buffers. A slot is only written after the GPU finished
/// the submission that last read from it.
struct FrameSlot {
    /// Host-visible, mapped for writing between frames.
    staging: Buffer,
    /// Device-local copy the draws read from.
    instances: Buffer,
    cursor: BufferCursor,
    mapped: Arc<AtomicBool>,
    submission: Option<wgpu::SubmissionIndex>,
}

struct ArrayTexture {
    /// Must outlive the bind group.
    _texture: Texture,
    bind_group: BindGroup,
}

/// Resources created once by [`Renderer::upload_static`].
struct StaticResources {
    quad: Buffer,
    tileset: ArrayTexture,
    /// Indexed by `SpriteId`; `None` for sprites without frames.
    sprites: Vec<Option<ArrayTexture>>,
}

/// One image layer waiting in the static-upload staging buffer.
struct LayerUpload {
    texture: usize,
    layer: u32,
    width: u32,
    height: u32,
    bytes_per_row: u32,
    offset: u64,
    rows: Vec<u8>,
}

/// Owns the surface, pipelines, static textures and frame slots.
pub struct Renderer<'window> {
    surface: wgpu::Surface<'window>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: SurfaceConfiguration,
    present_mode: PresentMode,
    pixel_scale: u32,
    globals: Buffer,
    globals_bind_group: BindGroup,
    texture_layout: BindGroupLayout,
    sampler: Sampler,
    tile_pipeline: RenderPipeline,
    entity_pipeline: RenderPipeline,
    slots: Vec<FrameSlot>,
    frame_index: usize,
    statics: Option<StaticResources>,
}

impl<'window> Renderer<'window> {
    pub fn new(window: &'window Window, config: &EngineConfig) -> Result<Self> {
        let instance = Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = pollster::block_on(instance.request_adapter(&RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;

        let (device, queue) = pollster::block_on(adapter.request_device(&DeviceDescriptor {
            label: Some("platcore-device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        }))?;

        let size = window.inner_size();
        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface reports no supported formats"))?;

        let present_mode = choose_present_mode(&capabilities.present_modes, config.vsync);
        let alpha_mode = choose_alpha_mode(&capabilities.alpha_modes);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: config.frames_in_flight,
        };
        surface.configure(&device, &surface_config);

        let globals_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("globals-bind-group-layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let texture_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("sprite-array-bind-group-layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2Array,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let globals = device.create_buffer(&BufferDescriptor {
            label: Some("globals-uniform-buffer"),
            size: std::mem::size_of::<Globals>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let globals_bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("globals-bind-group"),
            layout: &globals_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            }],
        });

        // Pixel art: never blur between texels.
        let sampler = device.create_sampler(&SamplerDescriptor {
            label: Some("pixel-sampler"),
            address_mode_u: AddressMode::ClampToEdge,
            address_mode_v: AddressMode::ClampToEdge,
            address_mode_w: AddressMode::ClampToEdge,
            mag_filter: FilterMode::Nearest,
            min_filter: FilterMode::Nearest,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("sprite-shader"),
            source: ShaderSource::Wgsl(include_str!("sprite.wgsl").into()),
        });
        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("sprite-pipeline-layout"),
            bind_group_layouts: &[&globals_layout, &texture_layout],
            immediate_size: 0,
        });
        let tile_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            "vs_tile",
            &TILE_ATTRIBUTES,
        );
        let entity_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            "vs_entity",
            &ENTITY_ATTRIBUTES,
        );

        let slots = (0..config.frames_in_flight.max(1))
            .map(|index| create_slot(&device, index))
            .collect();

        let renderer = Self {
            surface,
            device,
            queue,
            surface_config,
            present_mode,
            pixel_scale: config.pixel_scale.max(1),
            globals,
            globals_bind_group,
            texture_layout,
            sampler,
            tile_pipeline,
            entity_pipeline,
            slots,
            frame_index: 0,
            statics: None,
        };
        renderer.write_globals();
        log::info!(
            "renderer ready: {}x{} {:?}, {} frame slots",
            renderer.surface_config.width,
            renderer.surface_config.height,
            format,
            renderer.slots.len()
        );
        Ok(renderer)
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }

        self.surface_config.width = new_size.width;
        self.surface_config.height = new_size.height;
        self.surface_config.present_mode = self.present_mode;
        self.surface.configure(&self.device, &self.surface_config);
        self.write_globals();
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Size of the render target in game pixels.
    pub fn view_size(&self) -> (f32, f32) {
        view_size(self.surface_size(), self.pixel_scale)
    }

    fn write_globals(&self) {
        let (width, height) = self.view_size();
        let globals = Globals {
            screen_size: [width, height],
            _pad: [0.0; 2],
        };
        self.queue
            .write_buffer(&self.globals, 0, bytemuck::bytes_of(&globals));
    }

    /// Composite every sprite frame into a texture array, upload the tileset
    /// atlas and create the unit quad, all through one staging buffer that
    /// is dropped once the copies are submitted.
    ///
    /// Runs once; later calls are ignored.
    pub fn upload_static(&mut self, registry: &SpriteRegistry, tileset: Option<&Path>) -> Result<()> {
        if self.statics.is_some() {
            log::warn!("static resources already uploaded");
            return Ok(());
        }

        let limits = self.device.limits();
        let mut textures = Vec::with_capacity(registry.len() + 1);
        let mut uploads = Vec::new();

        let (atlas_width, atlas_height, atlas_pixels) = match tileset {
            Some(path) => {
                let image = image::open(path)
                    .map_err(|err| anyhow!("failed to load tileset {}: {err}", path.display()))?
                    .to_rgba8();
                let (width, height) = image.dimensions();
                (width, height, image.into_raw())
            }
            None => (1, 1, vec![0; 4]),
        };
        check_texture_size(&limits, "tileset", atlas_width, atlas_height, 1)?;
        textures.push(create_array_texture(
            &self.device,
            "tileset-texture",
            atlas_width,
            atlas_height,
            1,
        ));
        uploads.push(layer_upload(0, 0, atlas_width, atlas_height, &atlas_pixels));

        let mut sprite_textures = Vec::with_capacity(registry.len());
        for (id, sprite) in registry.iter() {
            let frames = sprite.frame_count() as u32;
            if frames == 0 || sprite.width == 0 || sprite.height == 0 {
                sprite_textures.push(None);
                continue;
            }
            let name = registry.name(id).unwrap_or("sprite");
            check_texture_size(&limits, name, sprite.width, sprite.height, frames)?;
            let texture_index = textures.len();
            textures.push(create_array_texture(
                &self.device,
                name,
                sprite.width,
                sprite.height,
                frames,
            ));
            for frame in 0..sprite.frame_count() {
                let pixels = composite_frame(sprite, frame);
                uploads.push(layer_upload(
                    texture_index,
                    frame as u32,
                    sprite.width,
                    sprite.height,
                    &pixels,
                ));
            }
            sprite_textures.push(Some(texture_index));
        }

        let quad_bytes: &[u8] = bytemuck::cast_slice(&QUAD_VERTICES);
        let mut cursor = BufferCursor::new(u64::MAX);
        for upload in &mut uploads {
            upload.offset = cursor
                .reserve(upload.rows.len() as u64, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64)?
                .start;
        }
        let quad_range = cursor.reserve(quad_bytes.len() as u64, wgpu::COPY_BUFFER_ALIGNMENT)?;
        let staging_size = align_up(cursor.written(), wgpu::COPY_BUFFER_ALIGNMENT);

        let staging = self.device.create_buffer(&BufferDescriptor {
            label: Some("static-upload-staging"),
            size: staging_size,
            usage: BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
            mapped_at_creation: true,
        });
        for upload in &uploads {
            let end = upload.offset + upload.rows.len() as u64;
            staging
                .slice(upload.offset..end)
                .get_mapped_range_mut()
                .copy_from_slice(&upload.rows);
        }
        staging
            .slice(quad_range.clone())
            .get_mapped_range_mut()
            .copy_from_slice(quad_bytes);
        staging.unmap();

        let quad = self.device.create_buffer(&BufferDescriptor {
            label: Some("unit-quad"),
            size: quad_bytes.len() as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("static-upload-encoder"),
            });
        for upload in &uploads {
            encoder.copy_buffer_to_texture(
                TexelCopyBufferInfo {
                    buffer: &staging,
                    layout: TexelCopyBufferLayout {
                        offset: upload.offset,
                        bytes_per_row: Some(upload.bytes_per_row),
                        rows_per_image: Some(upload.height),
                    },
                },
                TexelCopyTextureInfo {
                    texture: &textures[upload.texture],
                    mip_level: 0,
                    origin: Origin3d {
                        x: 0,
                        y: 0,
                        z: upload.layer,
                    },
                    aspect: TextureAspect::All,
                },
                Extent3d {
                    width: upload.width,
                    height: upload.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        encoder.copy_buffer_to_buffer(
            &staging,
            quad_range.start,
            &quad,
            0,
            quad_bytes.len() as u64,
        );
        self.queue.submit(Some(encoder.finish()));
        drop(staging);

        log::info!(
            "uploaded {} sprite textures ({} layers, {} staging bytes)",
            sprite_textures.iter().flatten().count(),
            uploads.len() - 1,
            staging_size
        );

        let mut textures: Vec<Option<Texture>> = textures.into_iter().map(Some).collect();
        let mut bind = |index: usize| -> Result<ArrayTexture> {
            let texture = textures[index]
                .take()
                .ok_or_else(|| anyhow!("texture {index} bound twice"))?;
            Ok(self.bind_array_texture(texture))
        };
        let tileset = bind(0)?;
        let sprites = sprite_textures
            .into_iter()
            .map(|slot| slot.map(&mut bind).transpose())
            .collect::<Result<Vec<_>>>()?;

        self.statics = Some(StaticResources {
            quad,
            tileset,
            sprites,
        });
        Ok(())
    }

    fn bind_array_texture(&self, texture: Texture) -> ArrayTexture {
        let view = texture.create_view(&TextureViewDescriptor {
            dimension: Some(TextureViewDimension::D2Array),
            ..Default::default()
        });
        let bind_group = self.device.create_bind_group(&BindGroupDescriptor {
            label: Some("sprite-array-bind-group"),
            layout: &self.texture_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: BindingResource::TextureView(&view),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: BindingResource::Sampler(&self.sampler),
                },
            ],
        });
        ArrayTexture {
            _texture: texture,
            bind_group,
        }
    }

    /// Block until the slot's last submission finished and its staging
    /// buffer is mapped again.
    fn wait_for_slot(&mut self, index: usize) -> Result<()> {
        let slot = &mut self.slots[index];
        if let Some(submission) = slot.submission.take() {
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index: Some(submission),
                    timeout: None,
                })
                .map_err(|err| anyhow!("waiting on frame slot {index} failed: {err}"))?;
        }
        if !slot.mapped.load(Ordering::Acquire) {
            // The re-map callback fires from a later poll.
            self.device
                .poll(wgpu::PollType::Wait {
                    submission_index: None,
                    timeout: None,
                })
                .map_err(|err| anyhow!("waiting on frame slot {index} failed: {err}"))?;
        }
        if !slot.mapped.load(Ordering::Acquire) {
            return Err(anyhow!("frame slot {index} staging buffer was not re-mapped"));
        }
        Ok(())
    }

    /// `None` when the surface timed out and the frame should be skipped.
    fn acquire_surface(&mut self) -> Result<Option<wgpu::SurfaceTexture>> {
        loop {
            match self.surface.get_current_texture() {
                Ok(surface_texture) => return Ok(Some(surface_texture)),
                Err(e) => match e {
                    wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => {
                        log::info!("surface {e}, reconfiguring");
                        self.surface.configure(&self.device, &self.surface_config);
                        continue;
                    }
                    wgpu::SurfaceError::Timeout => {
                        log::debug!("surface timed out, skipping frame");
                        return Ok(None);
                    }
                    wgpu::SurfaceError::OutOfMemory => {
                        return Err(anyhow!("Surface ran out of memory"));
                    }
                    wgpu::SurfaceError::Other => {
                        return Err(anyhow!("Surface error: Other"));
                    }
                },
            }
        }
    }

    /// Stage, copy, draw, submit and present one frame.
    pub fn render(&mut self, frame: &FrameInstances) -> Result<()> {
        let slot_index = self.frame_index % self.slots.len();
        self.wait_for_slot(slot_index)?;
        let Some(surface_texture) = self.acquire_surface()? else {
            return Ok(());
        };
        let view = surface_texture
            .texture
            .create_view(&TextureViewDescriptor::default());
        let Some(statics) = self.statics.as_ref() else {
            return Err(anyhow!("render called before static upload"));
        };

        let (tile_count, entity_count) = fit_instances(frame.tiles.len(), frame.entities.len());
        if tile_count + entity_count < frame.tiles.len() + frame.entities.len() {
            log::warn!(
                "frame has {} instances, drawing the first {}",
                frame.tiles.len() + frame.entities.len(),
                tile_count + entity_count
            );
        }
        let tile_bytes: &[u8] = bytemuck::cast_slice(&frame.tiles[..tile_count]);
        let entity_bytes: &[u8] = bytemuck::cast_slice(&frame.entities[..entity_count]);

        let slot = &mut self.slots[slot_index];
        let tile_range = slot.cursor.reserve(tile_bytes.len() as u64, INSTANCE_STRIDE)?;
        let entity_range = slot.cursor.reserve(entity_bytes.len() as u64, INSTANCE_STRIDE)?;
        for (range, bytes) in [(&tile_range, tile_bytes), (&entity_range, entity_bytes)] {
            if !bytes.is_empty() {
                slot.staging
                    .slice(range.clone())
                    .get_mapped_range_mut()
                    .copy_from_slice(bytes);
            }
        }
        slot.staging.unmap();
        slot.mapped.store(false, Ordering::Release);

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });
        let pending = slot.cursor.consume();
        if !pending.is_empty() {
            encoder.copy_buffer_to_buffer(
                &slot.staging,
                pending.start,
                &slot.instances,
                pending.start,
                pending.end - pending.start,
            );
        }

        {
            let mut pass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("sprite-pass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                multiview_mask: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_bind_group(0, &self.globals_bind_group, &[]);
            pass.set_vertex_buffer(0, statics.quad.slice(..));

            if tile_count > 0 {
                pass.set_pipeline(&self.tile_pipeline);
                pass.set_bind_group(1, &statics.tileset.bind_group, &[]);
                pass.set_vertex_buffer(1, slot.instances.slice(tile_range.clone()));
                pass.draw(0..QUAD_VERTICES.len() as u32, 0..tile_count as u32);
            }

            if entity_count > 0 {
                pass.set_pipeline(&self.entity_pipeline);
                pass.set_vertex_buffer(1, slot.instances.slice(entity_range.clone()));
                for batch in &frame.batches {
                    let start = batch.first_instance.min(entity_count as u32);
                    let end = (batch.first_instance + batch.instance_count).min(entity_count as u32);
                    if start == end {
                        continue;
                    }
                    let Some(texture) = statics.sprites.get(batch.sprite.index()).and_then(Option::as_ref)
                    else {
                        continue;
                    };
                    pass.set_bind_group(1, &texture.bind_group, &[]);
                    pass.draw(0..QUAD_VERTICES.len() as u32, start..end);
                }
            }
        }

        let submission = self.queue.submit(Some(encoder.finish()));
        slot.submission = Some(submission);
        surface_texture.present();

        let mapped = Arc::clone(&slot.mapped);
        slot.staging.slice(..).map_async(MapMode::Write, move |result| match result {
            Ok(()) => mapped.store(true, Ordering::Release),
            Err(err) => log::error!("staging buffer re-map failed: {err}"),
        });
        slot.cursor.reset();
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(())
    }
}

fn create_slot(device: &wgpu::Device, index: u32) -> FrameSlot {
    let staging = device.create_buffer(&BufferDescriptor {
        label: Some(&format!("frame-staging-{index}")),
        size: SLOT_BUFFER_SIZE,
        usage: BufferUsages::MAP_WRITE | BufferUsages::COPY_SRC,
        mapped_at_creation: true,
    });
    let instances = device.create_buffer(&BufferDescriptor {
        label: Some(&format!("frame-instances-{index}")),
        size: SLOT_BUFFER_SIZE,
        usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    FrameSlot {
        staging,
        instances,
        cursor: BufferCursor::new(SLOT_BUFFER_SIZE),
        mapped: Arc::new(AtomicBool::new(true)),
        submission: None,
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &ShaderModule,
    surface_format: TextureFormat,
    vertex_entry: &str,
    instance_attributes: &[VertexAttribute],
) -> RenderPipeline {
    device.create_render_pipeline(&RenderPipelineDescriptor {
        label: Some(vertex_entry),
        layout: Some(layout),
        vertex: VertexState {
            module: shader,
            entry_point: Some(vertex_entry),
            buffers: &[
                VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &QUAD_ATTRIBUTES,
                },
                VertexBufferLayout {
                    array_stride: INSTANCE_STRIDE,
                    step_mode: VertexStepMode::Instance,
                    attributes: instance_attributes,
                },
            ],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            targets: &[Some(ColorTargetState {
                format: surface_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: PrimitiveState::default(),
        depth_stencil: None,
        multisample: MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}

fn create_array_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    layers: u32,
) -> Texture {
    device.create_texture(&TextureDescriptor {
        label: Some(label),
        size: Extent3d {
            width,
            height,
            depth_or_array_layers: layers,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: TextureDimension::D2,
        format: TextureFormat::Rgba8UnormSrgb,
        usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn check_texture_size(
    limits: &wgpu::Limits,
    name: &str,
    width: u32,
    height: u32,
    layers: u32,
) -> Result<()> {
    if width > limits.max_texture_dimension_2d || height > limits.max_texture_dimension_2d {
        return Err(anyhow!(
            "{name} is {width}x{height}, the device limit is {}",
            limits.max_texture_dimension_2d
        ));
    }
    if layers > limits.max_texture_array_layers {
        return Err(anyhow!(
            "{name} has {layers} frames, the device limit is {}",
            limits.max_texture_array_layers
        ));
    }
    Ok(())
}

fn layer_upload(texture: usize, layer: u32, width: u32, height: u32, pixels: &[u8]) -> LayerUpload {
    let (bytes_per_row, rows) = pad_rows(pixels, width, height);
    LayerUpload {
        texture,
        layer,
        width,
        height,
        bytes_per_row,
        offset: 0,
        rows,
    }
}

/// Copy tightly packed RGBA8 rows into rows padded to the buffer-to-texture
/// copy alignment. Missing source bytes stay transparent.
fn pad_rows(pixels: &[u8], width: u32, height: u32) -> (u32, Vec<u8>) {
    let row = width as usize * 4;
    let bytes_per_row = align_up(row as u64, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64) as usize;
    let mut padded = vec![0u8; bytes_per_row * height as usize];
    for (src, dst) in pixels.chunks(row).zip(padded.chunks_mut(bytes_per_row)) {
        dst[..src.len()].copy_from_slice(src);
    }
    (bytes_per_row as u32, padded)
}

/// Instance counts that fit one slot, tiles first.
fn fit_instances(tiles: usize, entities: usize) -> (usize, usize) {
    let max = MAX_INSTANCES as usize;
    let tiles = tiles.min(max);
    (tiles, entities.min(max - tiles))
}

fn view_size((width, height): (u32, u32), pixel_scale: u32) -> (f32, f32) {
    let scale = pixel_scale.max(1) as f32;
    (width as f32 / scale, height as f32 / scale)
}

fn choose_present_mode(modes: &[PresentMode], vsync: bool) -> PresentMode {
    if vsync {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Fifo | PresentMode::FifoRelaxed))
            .unwrap_or(PresentMode::Fifo)
    } else {
        modes
            .iter()
            .copied()
            .find(|mode| matches!(mode, PresentMode::Immediate | PresentMode::Mailbox))
            .unwrap_or(PresentMode::Fifo)
    }
}

fn choose_alpha_mode(modes: &[CompositeAlphaMode]) -> CompositeAlphaMode {
    modes
        .iter()
        .copied()
        .find(|mode| matches!(mode, CompositeAlphaMode::Auto))
        .unwrap_or_else(|| modes.first().copied().unwrap_or(CompositeAlphaMode::Opaque))
}

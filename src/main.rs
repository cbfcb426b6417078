//! Shape scene graph demo
//!
//! Builds a retained tree of shapes once and animates it through transforms,
//! color and stroke updates. Space adds a random dot, Backspace removes
//! the last one, T toggles the orbiting group between attached and detached.

use glam::{Mat4, Vec3};
use rand::Rng;
use shape_graph::{
    Color, ImageRef, ResolvedTexture, Scene, ShapeId, ShapeKind, ShapeSettings, StrokeCap,
    TextureMap, VertexCode,
};
use shape_graph_wgpu::ShapeRenderer;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const CHECKER_IMAGE: u64 = 1;
const CHECKER_SIZE: u32 = 8;

/// Handles of the nodes the demo animates
struct DemoScene {
    scene: Scene,
    root: ShapeId,
    orbit: ShapeId,
    orbit_attached: bool,
    pulse: ShapeId,
    spinner: ShapeId,
    cube: ShapeId,
    confetti: ShapeId,
    dots: Vec<ShapeId>,
}

impl DemoScene {
    fn build() -> shape_graph::Result<Self> {
        let settings = ShapeSettings::default().with_stroke_weight(2.0);
        let mut scene = Scene::new(settings);
        let root = scene.create_group();

        // Static background panel with rounded corners
        let panel = scene.create_primitive(ShapeKind::Rect, &[40.0, 40.0, 420.0, 300.0, 24.0]);
        scene.fill(panel, Color::from_argb(0xFF313244))?;
        scene.stroke(panel, Color::from_argb(0xFF89B4FA))?;
        scene.add_child(root, panel)?;

        // Textured quad
        let card = scene.create_primitive(ShapeKind::Quad, &[
            80.0, 80.0, 200.0, 80.0, 200.0, 200.0, 80.0, 200.0,
        ]);
        scene.texture(card, ImageRef::new(CHECKER_IMAGE, CHECKER_SIZE, CHECKER_SIZE))?;
        scene.no_stroke(card)?;
        scene.add_child(root, card)?;

        // Star with a hole, filled as a polygon
        let star = scene.create_geometry(ShapeKind::Polygon);
        scene.fill(star, Color::from_argb(0xFFF9E2AF))?;
        for i in 0..10 {
            let angle = i as f32 * std::f32::consts::TAU / 10.0;
            let radius = if i % 2 == 0 { 70.0 } else { 30.0 };
            scene.vertex(star, Vec3::new(330.0 + radius * angle.cos(), 160.0 + radius * angle.sin(), 0.0))?;
        }
        scene.begin_contour(star)?;
        for i in 0..6 {
            let angle = -(i as f32) * std::f32::consts::TAU / 6.0;
            scene.vertex(star, Vec3::new(330.0 + 12.0 * angle.cos(), 160.0 + 12.0 * angle.sin(), 0.0))?;
        }
        scene.end_contour(star)?;
        scene.end(star, true)?;
        scene.add_child(root, star)?;

        // Curve stroke built from path codes
        let wave = scene.create_path(
            vec![
                [60.0, 300.0, 0.0],
                [120.0, 220.0, 0.0],
                [180.0, 380.0, 0.0],
                [240.0, 300.0, 0.0],
                [300.0, 260.0, 0.0],
                [420.0, 300.0, 0.0],
            ],
            vec![
                VertexCode::Vertex,
                VertexCode::BezierVertex,
                VertexCode::QuadBezierVertex,
            ],
            false,
        );
        scene.no_fill(wave)?;
        scene.stroke(wave, Color::from_argb(0xFFA6E3A1))?;
        scene.add_child(root, wave)?;

        // Group that orbits, its children batch unless they carry matrices
        let orbit = scene.create_group();
        scene.add_child(root, orbit)?;
        let pulse = scene.create_primitive(ShapeKind::Ellipse, &[0.0, 0.0, 60.0, 60.0]);
        scene.fill(pulse, Color::from_argb(0xFFF38BA8))?;
        scene.add_child(orbit, pulse)?;
        let spinner = scene.create_primitive(ShapeKind::Arc, &[
            0.0,
            0.0,
            110.0,
            110.0,
            0.0,
            std::f32::consts::PI * 1.5,
        ]);
        scene.no_fill(spinner)?;
        scene.stroke(spinner, Color::from_argb(0xFFCBA6F7))?;
        scene.stroke_weight(spinner, 6.0)?;
        scene.add_child(orbit, spinner)?;

        let cube = scene.create_primitive(ShapeKind::Box, &[80.0]);
        scene.fill(cube, Color::from_argb(0xFF94E2D5))?;
        scene.stroke(cube, Color::from_argb(0xFF11111B))?;
        scene.specular(cube, Color::WHITE)?;
        scene.shininess(cube, 24.0)?;
        scene.add_child(root, cube)?;

        let confetti = scene.create_group();
        scene.add_child(root, confetti)?;

        let mut demo = Self {
            scene,
            root,
            orbit,
            orbit_attached: true,
            pulse,
            spinner,
            cube,
            confetti,
            dots: Vec::new(),
        };
        for _ in 0..12 {
            demo.add_dot()?;
        }
        Ok(demo)
    }

    fn add_dot(&mut self) -> shape_graph::Result<()> {
        let mut rng = rand::rng();
        let (x, y) = (rng.random_range(500.0..1200.0), rng.random_range(60.0..660.0));
        let size = rng.random_range(10.0..40.0);

        let dot = if rng.random::<bool>() {
            self.scene
                .create_primitive(ShapeKind::Ellipse, &[x, y, size, size])
        } else {
            let dot = self.scene.create_primitive(ShapeKind::Point, &[x, y]);
            self.scene.stroke_weight(dot, size)?;
            self.scene.stroke_cap(dot, StrokeCap::Round)?;
            dot
        };
        let color = Color::rgb(rng.random(), rng.random(), rng.random());
        self.scene.fill(dot, color)?;
        self.scene.stroke(dot, color.with_alpha(0.8))?;
        self.scene.add_child(self.confetti, dot)?;
        self.dots.push(dot);
        log::info!("{} dots", self.dots.len());
        Ok(())
    }

    fn remove_dot(&mut self) -> shape_graph::Result<()> {
        if let Some(dot) = self.dots.pop() {
            self.scene.destroy(dot)?;
            log::info!("{} dots", self.dots.len());
        }
        Ok(())
    }

    fn toggle_orbit(&mut self) -> shape_graph::Result<()> {
        if self.orbit_attached {
            self.scene.remove_child(self.root, self.orbit)?;
        } else {
            self.scene.add_child(self.root, self.orbit)?;
        }
        self.orbit_attached = !self.orbit_attached;
        log::info!(
            "orbit group {}",
            if self.orbit_attached { "attached" } else { "detached" }
        );
        Ok(())
    }

    /// Per-frame updates: matrices, recolor and stroke weight, none of which
    /// re-tessellate
    fn animate(&mut self, t: f32) -> shape_graph::Result<()> {
        let scene = &mut self.scene;

        scene.reset_matrix(self.orbit)?;
        scene.translate(
            self.orbit,
            Vec3::new(700.0 + 120.0 * t.cos(), 360.0 + 80.0 * t.sin(), 0.0),
        )?;

        scene.reset_matrix(self.spinner)?;
        scene.rotate(self.spinner, t * 2.0)?;

        let glow = 0.5 + 0.5 * (t * 3.0).sin();
        scene.fill(self.pulse, Color::new(0.95, 0.55 + 0.3 * glow, 0.66, 1.0))?;
        scene.stroke_weight(self.pulse, 1.0 + 5.0 * glow)?;

        scene.reset_matrix(self.cube)?;
        scene.translate(self.cube, Vec3::new(260.0, 520.0, 0.0))?;
        scene.rotate_axis(self.cube, t, Vec3::new(1.0, 1.0, 0.3))?;
        scene.emissive(self.cube, Color::gray(0.08 * (1.0 + (2.0 * t).sin())))?;
        Ok(())
    }

    fn roots(&self) -> Vec<ShapeId> {
        if self.orbit_attached {
            vec![self.root]
        } else {
            vec![self.root, self.orbit]
        }
    }
}

fn checkerboard() -> Vec<u8> {
    let mut pixels = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let value = if (x + y) % 2 == 0 { 235 } else { 60 };
            pixels.extend_from_slice(&[value, value, value, 255]);
        }
    }
    pixels
}

fn create_depth_texture(device: &wgpu::Device, config: &wgpu::SurfaceConfiguration) -> wgpu::TextureView {
    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d {
            width: config.width,
            height: config.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    depth_texture.create_view(&wgpu::TextureViewDescriptor::default())
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_texture: wgpu::TextureView,

    renderer: ShapeRenderer,
    textures: TextureMap,
    demo: DemoScene,

    start_time: Instant,
    frame_times: VecDeque<f32>,
    last_frame_time: Instant,
}

impl GpuState {
    async fn new(window: Arc<Window>) -> Self {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window.clone()).unwrap();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .unwrap();

        log::info!("Using GPU: {}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .unwrap();

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_texture = create_depth_texture(&device, &config);

        let mut renderer = ShapeRenderer::new(&device, &queue, surface_format, Some(DEPTH_FORMAT));

        let mut textures = TextureMap::new();
        if let Some(handle) = renderer.create_texture(CHECKER_SIZE, CHECKER_SIZE, &checkerboard()) {
            textures.insert(
                CHECKER_IMAGE,
                ResolvedTexture {
                    handle,
                    flipped: false,
                },
            );
        }

        let demo = DemoScene::build().unwrap();
        log::info!(
            "Scene built: {} nodes under the root",
            demo.scene.subtree(demo.root).map(|s| s.len()).unwrap_or(0)
        );

        Self {
            surface,
            device,
            queue,
            config,
            depth_texture,
            renderer,
            textures,
            demo,
            start_time: Instant::now(),
            frame_times: VecDeque::with_capacity(60),
            last_frame_time: Instant::now(),
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
            self.depth_texture = create_depth_texture(&self.device, &self.config);
        }
    }

    fn handle_key(&mut self, key: KeyCode) {
        let result = match key {
            KeyCode::Space => self.demo.add_dot(),
            KeyCode::Backspace => self.demo.remove_dot(),
            KeyCode::KeyT => self.demo.toggle_orbit(),
            _ => Ok(()),
        };
        if let Err(err) = result {
            log::error!("scene update failed: {err}");
        }
    }

    fn render(&mut self) -> Result<f32, wgpu::SurfaceError> {
        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_times.push_back(frame_time);
        if self.frame_times.len() > 60 {
            self.frame_times.pop_front();
        }
        let avg_frame_time = self.frame_times.iter().sum::<f32>() / self.frame_times.len() as f32;

        if let Err(err) = self.demo.animate(self.start_time.elapsed().as_secs_f32()) {
            log::error!("animation failed: {err}");
        }

        let (width, height) = (self.config.width as f32, self.config.height as f32);
        let view_proj = Mat4::orthographic_rh(0.0, width, height, 0.0, -1000.0, 1000.0);
        self.renderer.begin_frame(view_proj, [width, height]);

        // A failed tree is skipped for this frame
        self.demo.scene.reset_stats();
        for root in self.demo.roots() {
            if let Err(err) = self
                .demo
                .scene
                .render(root, &mut self.renderer, &mut self.textures)
            {
                log::error!("failed to render tree: {err}");
            }
        }
        log::trace!("{:?}", self.demo.scene.stats());

        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Shape Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: 0.01176,
                            g: 0.01176,
                            b: 0.02447,
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            self.renderer.render(&mut render_pass);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();
        Ok(avg_frame_time)
    }
}

struct App {
    window: Option<Arc<Window>>,
    gpu_state: Option<GpuState>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            let window_attributes = Window::default_attributes()
                .with_title("Shapes")
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

            let window = Arc::new(event_loop.create_window(window_attributes).unwrap());
            self.window = Some(window.clone());
            self.gpu_state = Some(pollster::block_on(GpuState::new(window)));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        ..
                    },
                ..
            } => event_loop.exit(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.handle_key(key);
                }
            }

            WindowEvent::Resized(physical_size) => {
                if let Some(gpu_state) = &mut self.gpu_state {
                    gpu_state.resize(physical_size);
                }
            }

            WindowEvent::RedrawRequested => {
                if let (Some(window), Some(gpu_state)) = (&self.window, &mut self.gpu_state) {
                    match gpu_state.render() {
                        Ok(frame_time) => {
                            window.set_title(&format!(
                                "Shapes - {:.0} FPS ({:.2}ms) - {} dots",
                                1.0 / frame_time.max(1e-6),
                                frame_time * 1000.0,
                                gpu_state.demo.dots.len()
                            ));
                        }
                        Err(wgpu::SurfaceError::Lost) => gpu_state.resize(window.inner_size()),
                        Err(wgpu::SurfaceError::OutOfMemory) => event_loop.exit(),
                        Err(e) => log::error!("Render error: {:?}", e),
                    }
                }
            }

            _ => {}
        }

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() {
    // Initialize logger (RUST_LOG=debug for pipeline details)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting shape scene graph demo...");

    let event_loop = EventLoop::new().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        window: None,
        gpu_state: None,
    };

    event_loop.run_app(&mut app).unwrap();
}

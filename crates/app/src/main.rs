//! Abrogue - main entry point.
//!
//! Wires the window, render engine and game world together: winit drives
//! the event loop, the world advances in fixed ticks, and every redraw
//! copies the quad pool into the engine.

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use abrogue_core::{Config, TickTimer};
use abrogue_game::{World, TICK_DURATION};
use abrogue_platform::{InputState, Window};
use abrogue_render::RenderEngine;

const CONFIG_PATH: &str = "abrogue.json";
const ENEMY_COUNT: usize = 12;

struct App {
    config: Config,
    window: Option<Window>,
    engine: Option<RenderEngine>,
    world: World,
    input: InputState,
    timer: TickTimer,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            window: None,
            engine: None,
            world: World::new(ENEMY_COUNT),
            input: InputState::new(),
            timer: TickTimer::new(Duration::from_secs_f64(TICK_DURATION)),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        match Window::new(event_loop, &self.config, "Abrogue") {
            Ok(window) => match RenderEngine::new(&window) {
                Ok(engine) => {
                    info!("Initialization complete, entering main loop");
                    self.engine = Some(engine);
                    self.window = Some(window);
                }
                Err(e) => {
                    error!("Failed to create render engine: {e}");
                    event_loop.exit();
                }
            },
            Err(e) => {
                error!("Failed to create window: {e}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut engine) = self.engine {
                    engine.notify_resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::RedrawRequested => {
                for _ in 0..self.timer.ticks() {
                    self.world.update(&self.input);
                }

                if let Some(ref mut engine) = self.engine {
                    if engine.draw_frame(self.world.pool().quads()).is_err() {
                        // The engine already logged the failure and latched
                        // its error state; there is nothing to recover.
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let config = Config::load_or_default(Path::new(CONFIG_PATH))?;
    abrogue_core::init_logging(config.log_file.as_deref());
    info!("Starting Abrogue");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

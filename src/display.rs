//! Display geometry for the headset. There is no real panel behind it: the
//! host renders into a desktop window split side by side between the eyes.

use crate::config::DisplayConfig;
use crate::host::{DisplayComponent, DistortionCoordinates, Eye, ProjectionBounds, Viewport, WindowBounds};

#[derive(Debug, Clone, PartialEq)]
pub struct VirtualDisplay {
    config: DisplayConfig,
}

impl VirtualDisplay {
    pub fn new(config: DisplayConfig) -> Self {
        Self { config }
    }
}

impl DisplayComponent for VirtualDisplay {
    fn window_bounds(&self) -> WindowBounds {
        WindowBounds {
            x: 0,
            y: 0,
            width: self.config.window_width,
            height: self.config.window_height,
        }
    }

    fn is_display_on_desktop(&self) -> bool {
        true
    }

    fn is_display_real_display(&self) -> bool {
        false
    }

    /// Per-eye target.
    fn recommended_render_target_size(&self) -> (u32, u32) {
        (self.config.render_width / 2, self.config.render_height)
    }

    fn eye_output_viewport(&self, eye: Eye) -> Viewport {
        let half = self.config.window_width / 2;
        Viewport {
            x: match eye {
                Eye::Left => 0,
                Eye::Right => half,
            },
            y: 0,
            width: half,
            height: self.config.window_height,
        }
    }

    fn projection_raw(&self, _eye: Eye) -> ProjectionBounds {
        ProjectionBounds {
            left: -1.0,
            right: 1.0,
            top: -1.0,
            bottom: 1.0,
        }
    }

    fn compute_distortion(&self, _eye: Eye, u: f32, v: f32) -> DistortionCoordinates {
        DistortionCoordinates {
            red: [u, v],
            green: [u, v],
            blue: [u, v],
        }
    }

    fn compute_inverse_distortion(&self, _eye: Eye, _channel: u32, u: f32, v: f32) -> Option<[f32; 2]> {
        Some([u, v])
    }
}

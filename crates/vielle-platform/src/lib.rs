// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Windowing glue. Everything window related goes through `winit`, which is
//! re-exported so downstream crates pin the same version.
pub use winit;

use anyhow::{Context, Result};
use tracing::info;
use winit::{dpi::PhysicalSize, event_loop::ActiveEventLoop, window::Window};

#[derive(Debug, Clone)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        WindowSpec {
            title: "vielle".into(),
            width: 1280,
            height: 720,
        }
    }
}

pub fn open_window(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Window> {
    let attrs = Window::default_attributes()
        .with_title(spec.title.clone())
        .with_inner_size(PhysicalSize::new(spec.width, spec.height));
    let window = event_loop
        .create_window(attrs)
        .context("create_window")?;
    let size = window.inner_size();
    info!("window {}x{} \"{}\"", size.width, size.height, spec.title);
    Ok(window)
}

/// Current drawable size in physical pixels.
pub fn drawable_size(window: &Window) -> (u32, u32) {
    let size = window.inner_size();
    (size.width, size.height)
}

/// Minimised windows report a zero-area drawable; nothing can be presented then.
pub fn is_zero_area((width, height): (u32, u32)) -> bool {
    width == 0 || height == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_area_detects_either_axis() {
        assert!(is_zero_area((0, 720)));
        assert!(is_zero_area((1280, 0)));
        assert!(!is_zero_area((1, 1)));
    }
}

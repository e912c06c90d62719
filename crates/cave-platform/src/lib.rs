// SPDX-License-Identifier: CEPL-1.0
//! Window system glue. The renderer never sees winit directly; the app pulls raw handles
//! out of the window this crate opens.
#![deny(unsafe_op_in_unsafe_fn)]

use anyhow::{Context, Result};
use tracing::info;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};
use winit::window::{Window, WindowAttributes};

pub use winit;

/// Fixed-size window description; the renderer has no resize path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSpec {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            title: "Cave Explorer".into(),
            width: 640,
            height: 480,
        }
    }
}

impl WindowSpec {
    pub fn attributes(&self) -> WindowAttributes {
        Window::default_attributes()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(false)
    }
}

/// Opens the window and logs the size the compositor actually gave us.
pub fn open_window(event_loop: &ActiveEventLoop, spec: &WindowSpec) -> Result<Window> {
    let window = event_loop
        .create_window(spec.attributes())
        .context("create_window")?;
    let size = window.inner_size();
    info!(title = %spec.title, width = size.width, height = size.height, "window opened");
    Ok(window)
}

/// Raw display and window handles for surface creation.
pub fn raw_handles(window: &Window) -> Result<(RawDisplayHandle, RawWindowHandle)> {
    let display = window.display_handle().context("display_handle")?.as_raw();
    let handle = window.window_handle().context("window_handle")?.as_raw();
    Ok((display, handle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_window_matches_fixed_size() {
        let spec = WindowSpec::default();
        assert_eq!(spec.title, "Cave Explorer");
        assert_eq!((spec.width, spec.height), (640, 480));
    }
}

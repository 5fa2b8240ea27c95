// Primary-monitor capture via xcap, encoded as PNG.
use std::io::Cursor;

use async_trait::async_trait;

use crate::errors::{DeskPilotError, DeskPilotResult};
use crate::perception::traits::ScreenCapture;
use crate::perception::types::{ImageHandle, ScreenshotMeta};

/// Captures the primary monitor.
#[derive(Debug, Default, Clone)]
pub struct XcapScreenCapture;

#[async_trait]
impl ScreenCapture for XcapScreenCapture {
    async fn capture(&self) -> DeskPilotResult<ImageHandle> {
        tokio::task::spawn_blocking(capture_primary_blocking)
            .await
            .map_err(|e| DeskPilotError::Perception(format!("capture task join: {e}")))?
    }
}

fn capture_primary_blocking() -> DeskPilotResult<ImageHandle> {
    let monitors = xcap::Monitor::all()
        .map_err(|e| DeskPilotError::Perception(format!("Failed to enumerate monitors: {e}")))?;
    let (index, monitor) = monitors
        .iter()
        .enumerate()
        .find(|(_, m)| m.is_primary())
        .or_else(|| monitors.iter().enumerate().next())
        .ok_or_else(|| DeskPilotError::Perception("no monitor found".into()))?;

    let scale_factor = monitor.scale_factor() as f64;
    let captured = monitor
        .capture_image()
        .map_err(|e| DeskPilotError::Perception(format!("Failed to capture monitor: {e}")))?;

    let (width, height) = (captured.width(), captured.height());
    // Rebuild through our own `image` version so the encoder types line up.
    let rgba = image::RgbaImage::from_raw(width, height, captured.into_raw())
        .ok_or_else(|| DeskPilotError::Perception("capture buffer size mismatch".into()))?;

    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(rgba)
        .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
        .map_err(|e| DeskPilotError::Perception(format!("PNG encode failed: {e}")))?;

    let scale = if scale_factor > 0.0 { scale_factor } else { 1.0 };
    let meta = ScreenshotMeta {
        monitor_index: index as u32,
        scale_factor: scale,
        physical_width: width,
        physical_height: height,
        logical_width: (width as f64 / scale).round() as u32,
        logical_height: (height as f64 / scale).round() as u32,
    };

    tracing::debug!(
        monitor = index,
        width,
        height,
        scale,
        bytes = png.len(),
        "screenshot captured"
    );
    Ok(ImageHandle::new(png, meta))
}

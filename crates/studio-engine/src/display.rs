//! Preview surfaces bound to host windows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use studio_ipc::{SourceKey, WindowHandle};

use crate::error::{StudioError, StudioResult};
use crate::registry::validate_id;

/// Placement of a display inside its parent window, in logical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A named preview surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayBinding {
    pub name: String,
    pub parent: WindowHandle,
    pub scale_factor: u32,
    pub source: SourceKey,

    /// Last placement, `None` until the first move.
    pub rect: Option<DisplayRect>,
}

impl DisplayBinding {
    /// Surface size in physical pixels.
    pub fn surface_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.saturating_mul(self.scale_factor),
            height.saturating_mul(self.scale_factor),
        )
    }
}

#[derive(Debug, Default)]
pub(crate) struct DisplayManager {
    displays: BTreeMap<String, DisplayBinding>,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(
        &mut self,
        name: &str,
        parent: WindowHandle,
        scale_factor: u32,
        source: SourceKey,
    ) -> StudioResult<&DisplayBinding> {
        validate_id("display", name)?;
        if scale_factor == 0 {
            return Err(StudioError::InvalidArgument(format!(
                "display {name} scale factor must be at least 1"
            )));
        }
        if self.displays.contains_key(name) {
            return Err(StudioError::exists("display", name));
        }
        let binding = self
            .displays
            .entry(name.to_string())
            .or_insert(DisplayBinding {
                name: name.to_string(),
                parent,
                scale_factor,
                source,
                rect: None,
            });
        Ok(binding)
    }

    /// Record a new placement. Returns the binding for size conversion.
    pub fn place(&mut self, name: &str, rect: DisplayRect) -> StudioResult<&DisplayBinding> {
        let binding = self
            .displays
            .get_mut(name)
            .ok_or_else(|| StudioError::not_found("display", name))?;
        binding.rect = Some(rect);
        Ok(binding)
    }

    pub fn remove(&mut self, name: &str) -> StudioResult<DisplayBinding> {
        self.displays
            .remove(name)
            .ok_or_else(|| StudioError::not_found("display", name))
    }

    /// Remove every display, returning their names.
    pub fn clear(&mut self) -> Vec<String> {
        std::mem::take(&mut self.displays).into_keys().collect()
    }

    pub fn list(&self) -> Vec<DisplayBinding> {
        self.displays.values().cloned().collect()
    }
}

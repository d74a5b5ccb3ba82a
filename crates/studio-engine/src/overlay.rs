//! Overlay stack and downstream-key layer.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use studio_ipc::{Align, CgItem, Dsk, Overlay, OverlayStatus, OverlayView};

use crate::error::{StudioError, StudioResult};

/// Absolute rectangle on the base canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

fn offset(align: Align, canvas: u32, size: u32, inset: i32) -> i32 {
    let free = i64::from(canvas) - i64::from(size);
    let pos = match align {
        Align::Start => i64::from(inset),
        Align::Middle => free / 2 + i64::from(inset),
        Align::End => free - i64::from(inset),
    };
    pos.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Place a downstream key on a canvas of `canvas_width` x `canvas_height`.
///
/// `left`/`top` are insets from the anchored edge, or shifts from the
/// centered position on a middle axis.
pub fn dsk_rect(dsk: &Dsk, canvas_width: u32, canvas_height: u32) -> LayerRect {
    let (horizontal, vertical) = dsk.position.alignment();
    LayerRect {
        x: offset(horizontal, canvas_width, dsk.width, dsk.left),
        y: offset(vertical, canvas_height, dsk.height, dsk.top),
        width: dsk.width,
        height: dsk.height,
    }
}

/// Check the content of an overlay.
pub(crate) fn validate_overlay(overlay: &Overlay) -> StudioResult<()> {
    match overlay {
        Overlay::Cg(cg) => {
            if cg.base_width == 0 || cg.base_height == 0 {
                return Err(StudioError::InvalidArgument(format!(
                    "overlay {} has an empty base size",
                    cg.id
                )));
            }
            for (index, item) in cg.items.iter().enumerate() {
                let rect = item.rect();
                if rect.width < 0 || rect.height < 0 {
                    return Err(StudioError::InvalidArgument(format!(
                        "overlay {} item {index} has a negative size",
                        cg.id
                    )));
                }
                if let CgItem::Text(text) = item {
                    let valid = text.color_abgr.len() == 8
                        && text.color_abgr.chars().all(|c| c.is_ascii_hexdigit());
                    if !valid {
                        return Err(StudioError::InvalidArgument(format!(
                            "overlay {} item {index} color '{}' is not 8 hex digits",
                            cg.id, text.color_abgr
                        )));
                    }
                }
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone)]
struct OverlayEntry {
    overlay: Overlay,
    status: OverlayStatus,
    raise_seq: u64,
}

/// Overlays ordered by when they were last raised.
///
/// Adding or raising an overlay puts it on top; lowering only hides it.
#[derive(Debug, Default)]
pub(crate) struct OverlayStack {
    entries: HashMap<String, OverlayEntry>,
    next_seq: u64,
}

impl OverlayStack {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Insert on top. Id uniqueness is checked by the caller.
    pub fn add(&mut self, overlay: Overlay) {
        let status = overlay.requested_status().unwrap_or_default();
        let raise_seq = self.bump();
        self.entries.insert(
            overlay.id().to_string(),
            OverlayEntry {
                overlay,
                status,
                raise_seq,
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> StudioResult<Overlay> {
        self.entries
            .remove(id)
            .map(|entry| entry.overlay)
            .ok_or_else(|| StudioError::not_found("overlay", id))
    }

    /// Move to the top and show.
    pub fn up(&mut self, id: &str) -> StudioResult<()> {
        if !self.entries.contains_key(id) {
            return Err(StudioError::not_found("overlay", id));
        }
        let raise_seq = self.bump();
        if let Some(entry) = self.entries.get_mut(id) {
            entry.status = OverlayStatus::Up;
            entry.raise_seq = raise_seq;
        }
        Ok(())
    }

    /// Hide, keeping the stack position.
    pub fn down(&mut self, id: &str) -> StudioResult<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| StudioError::not_found("overlay", id))?;
        entry.status = OverlayStatus::Down;
        Ok(())
    }

    fn sorted(&self) -> Vec<&OverlayEntry> {
        let mut entries: Vec<&OverlayEntry> = self.entries.values().collect();
        entries.sort_by_key(|entry| entry.raise_seq);
        entries
    }

    /// Every overlay, top first.
    pub fn views(&self) -> Vec<OverlayView> {
        self.sorted()
            .into_iter()
            .rev()
            .map(|entry| OverlayView {
                id: entry.overlay.id().to_string(),
                name: entry.overlay.name().to_string(),
                kind: entry.overlay.kind().to_string(),
                status: entry.status,
                overlay: entry.overlay.clone(),
            })
            .collect()
    }

    /// Shown overlays as composited, bottom first.
    pub fn composite(&self) -> Vec<Overlay> {
        self.sorted()
            .into_iter()
            .filter(|entry| entry.status == OverlayStatus::Up)
            .map(|entry| entry.overlay.clone())
            .collect()
    }
}

/// Downstream keys in creation order. Add only.
#[derive(Debug, Default)]
pub(crate) struct DskLayer {
    keys: Vec<Dsk>,
}

impl DskLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, dsk: Dsk) {
        self.keys.push(dsk);
    }

    pub fn get(&self, id: &str) -> StudioResult<&Dsk> {
        self.keys
            .iter()
            .find(|dsk| dsk.id == id)
            .ok_or_else(|| StudioError::not_found("dsk", id))
    }

    pub fn all(&self) -> &[Dsk] {
        &self.keys
    }
}

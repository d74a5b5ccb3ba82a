//! Identity rules shared by every entity.

use std::collections::HashMap;

use crate::error::{StudioError, StudioResult};

/// Longest id accepted for any entity.
const MAX_ID_LEN: usize = 256;

/// Check that `id` is usable as an identifier of a `kind` entity.
///
/// Ids must be non-empty, free of surrounding whitespace and control
/// characters, and may not contain `/` which separates scene and source ids
/// in composite keys.
pub(crate) fn validate_id(kind: &'static str, id: &str) -> StudioResult<()> {
    if id.is_empty() {
        return Err(StudioError::InvalidArgument(format!("{kind} id is empty")));
    }
    if id.len() > MAX_ID_LEN {
        return Err(StudioError::InvalidArgument(format!(
            "{kind} id longer than {MAX_ID_LEN} bytes"
        )));
    }
    if id.trim() != id || id.chars().any(|c| c.is_control() || c == '/') {
        return Err(StudioError::InvalidArgument(format!(
            "{kind} id '{}' contains invalid characters",
            id.escape_debug()
        )));
    }
    Ok(())
}

/// Kind of layer that owns an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LayerKind {
    Overlay,
    Dsk,
}

impl LayerKind {
    fn name(self) -> &'static str {
        match self {
            Self::Overlay => "overlay",
            Self::Dsk => "dsk",
        }
    }
}

/// Ids of overlays and downstream keys, unique across both kinds.
#[derive(Debug, Default)]
pub(crate) struct LayerIds {
    ids: HashMap<String, LayerKind>,
}

impl LayerIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `id` could be claimed without claiming it.
    pub fn check(&self, id: &str, kind: LayerKind) -> StudioResult<()> {
        validate_id(kind.name(), id)?;
        match self.ids.get(id) {
            Some(owner) => Err(StudioError::exists(owner.name(), id)),
            None => Ok(()),
        }
    }

    /// Reserve `id` for a layer of `kind`.
    pub fn claim(&mut self, id: &str, kind: LayerKind) -> StudioResult<()> {
        self.check(id, kind)?;
        self.ids.insert(id.to_string(), kind);
        Ok(())
    }

    /// Free an overlay id. Downstream keys are never released.
    pub fn release_overlay(&mut self, id: &str) {
        if self.ids.get(id) == Some(&LayerKind::Overlay) {
            self.ids.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_validate_id() {
        assert!(validate_id("scene", "scene1").is_ok());
        assert!(validate_id("scene", "Scene 2").is_ok());
        for bad in ["", " scene", "a/b", "tab\there"] {
            let err = validate_id("scene", bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{bad:?}");
        }
        assert!(validate_id("scene", &"x".repeat(300)).is_err());
    }

    #[test]
    fn test_layer_ids_unique_across_kinds() {
        let mut ids = LayerIds::new();
        ids.claim("cg1", LayerKind::Overlay).unwrap();
        ids.claim("dsk1", LayerKind::Dsk).unwrap();

        let err = ids.claim("cg1", LayerKind::Dsk).unwrap_err();
        assert_eq!(err.to_string(), "overlay already exists: cg1");
        assert!(ids.claim("dsk1", LayerKind::Overlay).is_err());

        ids.release_overlay("cg1");
        ids.claim("cg1", LayerKind::Dsk).unwrap();

        // Releasing never frees a downstream key.
        ids.release_overlay("dsk1");
        assert!(ids.check("dsk1", LayerKind::Overlay).is_err());
    }
}

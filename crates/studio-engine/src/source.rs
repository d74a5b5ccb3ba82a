//! Source records and validation.

use std::collections::HashMap;

use studio_audio::{check_volume, MixerInput};
use studio_ipc::{
    MediaState, OutputBinding, SourceKey, SourceSettings, SourceType, SourceView,
    UpdateSourceSettings,
};

use crate::error::{StudioError, StudioResult};
use crate::registry::validate_id;

/// Default gain of a new source.
pub const DEFAULT_VOLUME: f32 = 1.0;

/// Output binding of a source's dedicated pipeline.
pub fn source_binding(key: &SourceKey) -> OutputBinding {
    OutputBinding::Source {
        scene_id: key.scene_id.clone(),
        source_id: key.source_id.clone(),
    }
}

/// Playback state assumed until the engine reports otherwise.
pub fn initial_media_state(source_type: SourceType) -> MediaState {
    match source_type {
        SourceType::Image => MediaState::Playing,
        SourceType::MediaSource => MediaState::Opening,
    }
}

/// Check creation settings. Embedded outputs are validated separately.
///
/// Only media sources need a url; an image source without one renders blank.
pub(crate) fn validate_settings(key: &SourceKey, settings: &SourceSettings) -> StudioResult<()> {
    validate_id("source", &key.source_id)?;
    if settings.source_type == SourceType::MediaSource && settings.url.trim().is_empty() {
        return Err(StudioError::InvalidArgument(format!(
            "source {key} has an empty url"
        )));
    }
    if settings.buffer_size == Some(0) {
        return Err(StudioError::InvalidArgument(format!(
            "source {key} buffer size must be positive"
        )));
    }
    Ok(())
}

/// Check a partial update of a source of `source_type` before anything is
/// applied.
pub(crate) fn validate_update(
    request: &UpdateSourceSettings,
    source_type: SourceType,
) -> StudioResult<()> {
    if let Some(volume) = request.volume {
        check_volume(volume)?;
    }
    if let Some(url) = &request.url {
        if source_type == SourceType::MediaSource && url.trim().is_empty() {
            return Err(StudioError::InvalidArgument("url is empty".into()));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub(crate) struct SourceRecord {
    pub settings: SourceSettings,
    pub restarts: u32,
}

/// Every source of every scene, keyed by (scene, source).
#[derive(Debug, Default)]
pub(crate) struct SourceManager {
    sources: HashMap<SourceKey, SourceRecord>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &SourceKey) -> bool {
        self.sources.contains_key(key)
    }

    pub fn insert(&mut self, key: SourceKey, settings: SourceSettings) -> StudioResult<()> {
        if self.sources.contains_key(&key) {
            return Err(StudioError::exists("source", key.to_string()));
        }
        self.sources.insert(
            key,
            SourceRecord {
                settings,
                restarts: 0,
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &SourceKey) -> StudioResult<&SourceRecord> {
        self.sources
            .get(key)
            .ok_or_else(|| StudioError::not_found("source", key.to_string()))
    }

    pub fn get_mut(&mut self, key: &SourceKey) -> StudioResult<&mut SourceRecord> {
        self.sources
            .get_mut(key)
            .ok_or_else(|| StudioError::not_found("source", key.to_string()))
    }

    /// Resolve a bare source id, searching scenes in the given order.
    pub fn find_by_id<'a>(
        &self,
        source_id: &str,
        scene_order: impl IntoIterator<Item = &'a String>,
    ) -> Option<SourceKey> {
        scene_order
            .into_iter()
            .map(|scene_id| SourceKey::new(scene_id.as_str(), source_id))
            .find(|key| self.sources.contains_key(key))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

/// Materialize the host-facing view of a source.
pub(crate) fn source_view(key: &SourceKey, record: &SourceRecord, input: Option<&MixerInput>) -> SourceView {
    SourceView {
        id: key.source_id.clone(),
        scene_id: key.scene_id.clone(),
        source_type: record.settings.source_type,
        url: record.settings.url.clone(),
        volume: input.map_or(DEFAULT_VOLUME, |input| input.volume),
        audio_lock: input.is_some_and(|input| input.audio_lock),
        audio_monitor: input.is_some_and(|input| input.audio_monitor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_insert_and_lookup() {
        let mut sources = SourceManager::new();
        let key = SourceKey::new("scene1", "source1");
        sources
            .insert(key.clone(), SourceSettings::media("rtmp://host/live/source1"))
            .unwrap();

        let err = sources
            .insert(key.clone(), SourceSettings::media("rtmp://other"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        // Same source id in another scene is a different source.
        sources
            .insert(SourceKey::new("scene2", "source1"), SourceSettings::image("a.png"))
            .unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(
            sources.get(&key).unwrap().settings.url,
            "rtmp://host/live/source1"
        );
    }

    #[test]
    fn test_find_by_id_prefers_first_scene() {
        let mut sources = SourceManager::new();
        sources
            .insert(SourceKey::new("scene2", "cam"), SourceSettings::media("rtmp://b"))
            .unwrap();
        sources
            .insert(SourceKey::new("scene1", "cam"), SourceSettings::media("rtmp://a"))
            .unwrap();

        let order = vec!["scene1".to_string(), "scene2".to_string()];
        assert_eq!(
            sources.find_by_id("cam", &order),
            Some(SourceKey::new("scene1", "cam"))
        );
        assert_eq!(sources.find_by_id("missing", &order), None);
    }

    #[test]
    fn test_validation() {
        let key = SourceKey::new("scene1", "source1");
        assert!(validate_settings(&key, &SourceSettings::media("")).is_err());
        assert!(validate_settings(&key, &SourceSettings::image("")).is_ok());
        let settings = SourceSettings {
            buffer_size: Some(0),
            ..SourceSettings::media("rtmp://a")
        };
        assert!(validate_settings(&key, &settings).is_err());

        let request = UpdateSourceSettings {
            volume: Some(1.5),
            ..Default::default()
        };
        assert_eq!(
            validate_update(&request, SourceType::Image).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );

        let request = UpdateSourceSettings {
            url: Some(" ".into()),
            ..Default::default()
        };
        assert!(validate_update(&request, SourceType::MediaSource).is_err());
        assert!(validate_update(&request, SourceType::Image).is_ok());
    }

    #[test]
    fn test_view_defaults_without_mixer_input() {
        let key = SourceKey::new("scene1", "logo");
        let record = SourceRecord {
            settings: SourceSettings::image("logo.png"),
            restarts: 0,
        };
        let view = source_view(&key, &record, None);
        assert_eq!(view.volume, 1.0);
        assert_eq!(view.source_type, SourceType::Image);

        let mut input = MixerInput::new(0.3, MediaState::Playing);
        input.audio_lock = true;
        let view = source_view(&key, &record, Some(&input));
        assert_eq!(view.volume, 0.3);
        assert!(view.audio_lock);
    }
}

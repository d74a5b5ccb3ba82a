//! Scene graph and transitioned switching.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use studio_ipc::TransitionType;

use crate::error::{StudioError, StudioResult};
use crate::registry::validate_id;

/// Longest transition accepted; longer requests are clamped.
pub const MAX_TRANSITION_MS: u32 = 60_000;

/// Weights below this are dropped from a mix.
const MIN_WEIGHT: f32 = 1e-4;

/// One scene's share of the program picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixLayer {
    pub scene_id: String,
    pub weight: f32,
}

/// Visual state of the program: scene weights summing to 1.0.
///
/// Outside of a transition the mix holds a single scene with weight 1.0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneMix {
    layers: Vec<MixLayer>,
}

impl SceneMix {
    /// Mix showing only `scene_id`.
    pub fn solo(scene_id: impl Into<String>) -> Self {
        Self {
            layers: vec![MixLayer {
                scene_id: scene_id.into(),
                weight: 1.0,
            }],
        }
    }

    /// Layers of the mix.
    pub fn layers(&self) -> &[MixLayer] {
        &self.layers
    }

    /// Weight of a scene, 0.0 if absent.
    pub fn weight(&self, scene_id: &str) -> f32 {
        self.layers
            .iter()
            .find(|layer| layer.scene_id == scene_id)
            .map_or(0.0, |layer| layer.weight)
    }

    /// Move a fraction `t` of the picture from this mix to `scene_id`.
    pub fn blend_towards(&self, scene_id: &str, t: f32) -> SceneMix {
        let t = t.clamp(0.0, 1.0);
        if self.layers.is_empty() {
            return Self::solo(scene_id);
        }

        let mut layers: Vec<MixLayer> = self
            .layers
            .iter()
            .map(|layer| MixLayer {
                scene_id: layer.scene_id.clone(),
                weight: layer.weight * (1.0 - t),
            })
            .collect();
        match layers.iter_mut().find(|layer| layer.scene_id == scene_id) {
            Some(layer) => layer.weight += t,
            None => layers.push(MixLayer {
                scene_id: scene_id.to_string(),
                weight: t,
            }),
        }
        layers.retain(|layer| layer.weight > MIN_WEIGHT);
        Self { layers }
    }
}

/// Map linear progress through a transition to blend progress.
pub fn transition_curve(transition: TransitionType, t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    match transition {
        TransitionType::Cut => {
            if t > 0.0 {
                1.0
            } else {
                0.0
            }
        }
        TransitionType::Fade => t,
        TransitionType::Swipe => {
            if t < 0.5 {
                2.0 * t * t
            } else {
                1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
            }
        }
        TransitionType::Slide => 1.0 - (1.0 - t).powi(3),
    }
}

/// Scene switch accepted by the graph, to be handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchPlan {
    pub previous: Option<String>,
    pub from: SceneMix,
    pub to: String,
    pub transition: TransitionType,
    pub duration: Duration,

    /// The target scene has never been active before.
    pub first_activation: bool,
}

#[derive(Debug, Clone)]
struct Switch {
    from: SceneMix,
    to: String,
    transition: TransitionType,
    started: Instant,
    duration: Duration,
}

impl Switch {
    fn progress(&self, now: Instant) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started);
        (elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }

    fn is_done(&self, now: Instant) -> bool {
        self.progress(now) >= 1.0
    }

    fn mix(&self, now: Instant) -> SceneMix {
        let t = transition_curve(self.transition, self.progress(now));
        self.from.blend_towards(&self.to, t)
    }
}

#[derive(Debug)]
struct Scene {
    id: String,
    sources: Vec<String>,
}

/// Scenes in creation order, their sources in z-order, and the switcher.
#[derive(Debug, Default)]
pub(crate) struct SceneGraph {
    scenes: Vec<Scene>,
    active: Option<String>,
    switch: Option<Switch>,
    activated: HashSet<String>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scene_id: &str) -> StudioResult<()> {
        validate_id("scene", scene_id)?;
        if self.contains(scene_id) {
            return Err(StudioError::exists("scene", scene_id));
        }
        self.scenes.push(Scene {
            id: scene_id.to_string(),
            sources: Vec::new(),
        });
        debug!(scene = scene_id, "Scene added");
        Ok(())
    }

    pub fn contains(&self, scene_id: &str) -> bool {
        self.scenes.iter().any(|scene| scene.id == scene_id)
    }

    /// Scene ids in creation order.
    pub fn ids(&self) -> Vec<String> {
        self.scenes.iter().map(|scene| scene.id.clone()).collect()
    }

    /// Source ids of a scene, bottom first.
    pub fn sources(&self, scene_id: &str) -> StudioResult<&[String]> {
        self.scenes
            .iter()
            .find(|scene| scene.id == scene_id)
            .map(|scene| scene.sources.as_slice())
            .ok_or_else(|| StudioError::not_found("scene", scene_id))
    }

    /// Put a source on top of a scene.
    pub fn attach_source(&mut self, scene_id: &str, source_id: &str) -> StudioResult<()> {
        let scene = self
            .scenes
            .iter_mut()
            .find(|scene| scene.id == scene_id)
            .ok_or_else(|| StudioError::not_found("scene", scene_id))?;
        scene.sources.push(source_id.to_string());
        Ok(())
    }

    /// The active scene: the target of the latest switch.
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn in_transition(&self, now: Instant) -> bool {
        self.switch.as_ref().is_some_and(|switch| !switch.is_done(now))
    }

    /// Current visual state of the program.
    pub fn mix(&self, now: Instant) -> SceneMix {
        match &self.switch {
            Some(switch) if !switch.is_done(now) => switch.mix(now),
            _ => self.active.as_deref().map(SceneMix::solo).unwrap_or_default(),
        }
    }

    /// Start a switch to `scene_id`, superseding any switch in flight.
    ///
    /// Returns `None` if the scene is already shown and nothing is in flight.
    pub fn switch_to(
        &mut self,
        scene_id: &str,
        transition: TransitionType,
        transition_ms: u32,
        now: Instant,
    ) -> StudioResult<Option<SwitchPlan>> {
        if !self.contains(scene_id) {
            return Err(StudioError::not_found("scene", scene_id));
        }
        if self.active() == Some(scene_id) && !self.in_transition(now) {
            debug!(scene = scene_id, "Scene already active");
            return Ok(None);
        }

        let duration = match transition {
            TransitionType::Cut => Duration::ZERO,
            _ => Duration::from_millis(u64::from(transition_ms.min(MAX_TRANSITION_MS))),
        };
        let from = self.mix(now);
        let previous = self.active.replace(scene_id.to_string());
        let first_activation = self.activated.insert(scene_id.to_string());

        self.switch = Some(Switch {
            from: from.clone(),
            to: scene_id.to_string(),
            transition,
            started: now,
            duration,
        });

        Ok(Some(SwitchPlan {
            previous,
            from,
            to: scene_id.to_string(),
            transition,
            duration,
            first_activation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(ids: &[&str]) -> SceneGraph {
        let mut graph = SceneGraph::new();
        for id in ids {
            graph.add(id).unwrap();
        }
        graph
    }

    #[test]
    fn test_duplicate_scene_rejected() {
        let mut graph = graph(&["scene1"]);
        let err = graph.add("scene1").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::AlreadyExists);
        assert_eq!(graph.ids(), vec!["scene1"]);
    }

    #[test]
    fn test_cut_is_instant() {
        let mut graph = graph(&["scene1", "scene2"]);
        let now = Instant::now();
        graph.switch_to("scene1", TransitionType::Cut, 0, now).unwrap();

        let plan = graph
            .switch_to("scene2", TransitionType::Cut, 1000, now)
            .unwrap()
            .unwrap();
        assert_eq!(plan.duration, Duration::ZERO);
        assert_eq!(plan.previous.as_deref(), Some("scene1"));
        assert!(!graph.in_transition(now));
        assert_eq!(graph.mix(now), SceneMix::solo("scene2"));
    }

    #[test]
    fn test_fade_blends_over_duration() {
        let mut graph = graph(&["a", "b"]);
        let start = Instant::now();
        graph.switch_to("a", TransitionType::Cut, 0, start).unwrap();
        graph.switch_to("b", TransitionType::Fade, 1000, start).unwrap();

        let mid = graph.mix(start + Duration::from_millis(500));
        assert!((mid.weight("a") - 0.5).abs() < 1e-3);
        assert!((mid.weight("b") - 0.5).abs() < 1e-3);

        let end = graph.mix(start + Duration::from_millis(1000));
        assert_eq!(end, SceneMix::solo("b"));
        assert_eq!(graph.active(), Some("b"));
    }

    #[test]
    fn test_superseded_switch_starts_from_current_mix() {
        let mut graph = graph(&["a", "b", "c"]);
        let start = Instant::now();
        graph.switch_to("a", TransitionType::Cut, 0, start).unwrap();
        graph.switch_to("b", TransitionType::Fade, 1000, start).unwrap();

        let halfway = start + Duration::from_millis(500);
        let plan = graph
            .switch_to("c", TransitionType::Fade, 1000, halfway)
            .unwrap()
            .unwrap();
        assert!((plan.from.weight("a") - 0.5).abs() < 1e-3);
        assert!((plan.from.weight("b") - 0.5).abs() < 1e-3);

        let later = graph.mix(halfway + Duration::from_millis(500));
        let total: f32 = later.layers().iter().map(|l| l.weight).sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!((later.weight("c") - 0.5).abs() < 1e-3);

        assert_eq!(graph.mix(halfway + Duration::from_secs(1)), SceneMix::solo("c"));
        assert_eq!(graph.active(), Some("c"));
    }

    #[test]
    fn test_switch_to_active_scene_is_noop() {
        let mut graph = graph(&["a"]);
        let now = Instant::now();
        assert!(graph.switch_to("a", TransitionType::Cut, 0, now).unwrap().is_some());
        assert!(graph.switch_to("a", TransitionType::Fade, 500, now).unwrap().is_none());
    }

    #[test]
    fn test_unknown_target_leaves_active_unchanged() {
        let mut graph = graph(&["a"]);
        let now = Instant::now();
        graph.switch_to("a", TransitionType::Cut, 0, now).unwrap();
        assert!(graph.switch_to("missing", TransitionType::Fade, 500, now).is_err());
        assert_eq!(graph.active(), Some("a"));
    }

    #[test]
    fn test_duration_is_clamped() {
        let mut graph = graph(&["a", "b"]);
        let now = Instant::now();
        graph.switch_to("a", TransitionType::Cut, 0, now).unwrap();
        let plan = graph
            .switch_to("b", TransitionType::Slide, u32::MAX, now)
            .unwrap()
            .unwrap();
        assert_eq!(plan.duration, Duration::from_millis(60_000));
    }

    #[test]
    fn test_first_activation_reported_once() {
        let mut graph = graph(&["a", "b"]);
        let now = Instant::now();
        assert!(graph.switch_to("a", TransitionType::Cut, 0, now).unwrap().unwrap().first_activation);
        assert!(graph.switch_to("b", TransitionType::Cut, 0, now).unwrap().unwrap().first_activation);
        assert!(!graph.switch_to("a", TransitionType::Cut, 0, now).unwrap().unwrap().first_activation);
    }

    #[test]
    fn test_curves_hit_endpoints() {
        for transition in [
            TransitionType::Cut,
            TransitionType::Fade,
            TransitionType::Swipe,
            TransitionType::Slide,
        ] {
            assert_eq!(transition_curve(transition, 0.0), 0.0);
            assert_eq!(transition_curve(transition, 1.0), 1.0);
        }
        assert!(transition_curve(TransitionType::Slide, 0.5) > 0.5);
        assert!((transition_curve(TransitionType::Swipe, 0.5) - 0.5).abs() < 1e-6);
    }
}

//! Timeline arithmetic.
//!
//! Converts declarative timing (scene durations, transition choices, global
//! caption and music times) into the offsets the render stages need.

use crate::transition::TransitionKind;

/// Tolerance used when comparing durations.
pub const DURATION_EPSILON: f64 = 1e-6;

/// Plan for one scene boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Boundary position, 0 between the first and second clip
    pub index: usize,
    pub from_scene: String,
    pub to_scene: String,
    pub transition: TransitionKind,
    /// Seconds the two clips overlap; 0 for cuts
    pub overlap: f64,
}

impl Boundary {
    pub fn is_cut(&self) -> bool {
        self.transition.is_cut() || self.overlap <= 0.0
    }
}

/// Pick the transition for the boundary that follows a scene.
///
/// The scene's own `transition_to_next` wins, then the project transition,
/// then a cross-fade.
pub fn select_transition(
    scene_transition: Option<&TransitionKind>,
    project_transition: Option<&TransitionKind>,
) -> TransitionKind {
    scene_transition
        .or(project_transition)
        .cloned()
        .unwrap_or_default()
}

/// Plan every boundary of an ordered list of surviving scenes.
///
/// `scenes` is `(id, duration, transition_to_next)` in timeline order. The
/// last scene's transition is ignored.
pub fn plan_boundaries(
    scenes: &[(String, f64, Option<TransitionKind>)],
    project_transition: Option<&TransitionKind>,
    transition_duration: f64,
) -> Vec<Boundary> {
    scenes
        .windows(2)
        .enumerate()
        .map(|(index, pair)| {
            let (from_id, _, from_transition) = &pair[0];
            let (to_id, _, _) = &pair[1];
            let transition = select_transition(from_transition.as_ref(), project_transition);
            let overlap = if transition.is_cut() {
                0.0
            } else {
                transition_duration.max(0.0)
            };
            Boundary {
                index,
                from_scene: from_id.clone(),
                to_scene: to_id.clone(),
                transition,
                overlap,
            }
        })
        .collect()
}

/// Total composed length: sum of durations minus sum of overlaps.
pub fn composed_duration(durations: &[f64], boundaries: &[Boundary]) -> f64 {
    let total: f64 = durations.iter().sum();
    let overlaps: f64 = boundaries.iter().map(|b| b.overlap).sum();
    (total - overlaps).max(0.0)
}

/// Join point of a transition: the composed length so far minus the overlap.
pub fn transition_offset(composed_so_far: f64, overlap: f64) -> f64 {
    (composed_so_far - overlap).max(0.0)
}

/// An overlap can only be rendered when it is shorter than both clips.
pub fn overlap_fits(composed_so_far: f64, next_duration: f64, overlap: f64) -> bool {
    overlap > 0.0 && overlap < composed_so_far && overlap < next_duration
}

/// Start time of each scene in the composed timeline.
pub fn scene_start_times(durations: &[f64], boundaries: &[Boundary]) -> Vec<f64> {
    let mut starts = Vec::with_capacity(durations.len());
    let mut cursor = 0.0;
    for (i, duration) in durations.iter().enumerate() {
        if i > 0 {
            let overlap = boundaries.get(i - 1).map(|b| b.overlap).unwrap_or(0.0);
            cursor -= overlap;
        }
        starts.push(cursor.max(0.0));
        cursor += duration;
    }
    starts
}

/// Seconds to whole milliseconds, as `adelay` expects.
pub fn delay_millis(seconds: f64) -> u64 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1000.0).round() as u64
}

/// Seconds to microseconds, as the project bundle stores times.
pub fn to_micros(seconds: f64) -> i64 {
    if !seconds.is_finite() {
        return 0;
    }
    (seconds * 1_000_000.0).round() as i64
}

/// Music envelope with every fallback applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedEnvelope {
    pub volume: f64,
    pub fade_in: f64,
    pub fade_out: f64,
}

/// Concrete fade times for an output of known length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeSchedule {
    /// Fade-in length from t=0, `None` when disabled
    pub fade_in: Option<f64>,
    /// (start, length) of the fade-out, ending at the total duration
    pub fade_out: Option<(f64, f64)>,
}

impl FadeSchedule {
    pub fn new(envelope: &ResolvedEnvelope, total_duration: f64) -> Self {
        let fade_in = (envelope.fade_in > 0.0).then_some(envelope.fade_in);
        let fade_out = (envelope.fade_out > 0.0).then(|| {
            let start = (total_duration - envelope.fade_out).max(0.0);
            (start, total_duration - start)
        });
        Self { fade_in, fade_out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenes(plan: &[(&str, f64, Option<&str>)]) -> Vec<(String, f64, Option<TransitionKind>)> {
        plan.iter()
            .map(|(id, d, t)| (id.to_string(), *d, t.map(TransitionKind::from)))
            .collect()
    }

    #[test]
    fn test_three_scene_duration() {
        let list = scenes(&[
            ("a", 3.0, Some("fade")),
            ("b", 3.0, Some("slideLeft")),
            ("c", 3.0, None),
        ]);
        let boundaries = plan_boundaries(&list, None, 1.0);
        assert_eq!(boundaries.len(), 2);
        assert_eq!(boundaries[0].transition, TransitionKind::Fade);
        assert_eq!(boundaries[1].transition, TransitionKind::SlideLeft);

        let durations: Vec<f64> = list.iter().map(|s| s.1).collect();
        let total = composed_duration(&durations, &boundaries);
        assert!((total - 7.0).abs() < DURATION_EPSILON);
    }

    #[test]
    fn test_transition_precedence() {
        let project = TransitionKind::Wipe;
        let list = scenes(&[("a", 2.0, None), ("b", 2.0, Some("none")), ("c", 2.0, None)]);

        let boundaries = plan_boundaries(&list, Some(&project), 0.5);
        assert_eq!(boundaries[0].transition, TransitionKind::Wipe);
        assert_eq!(boundaries[0].overlap, 0.5);
        assert_eq!(boundaries[1].transition, TransitionKind::None);
        assert_eq!(boundaries[1].overlap, 0.0);

        let defaulted = plan_boundaries(&list, None, 0.5);
        assert_eq!(defaulted[0].transition, TransitionKind::Fade);
    }

    #[test]
    fn test_last_scene_transition_ignored() {
        let list = scenes(&[("a", 2.0, None), ("b", 2.0, Some("zoomIn"))]);
        let boundaries = plan_boundaries(&list, None, 1.0);
        assert_eq!(boundaries.len(), 1);
        assert_eq!(boundaries[0].transition, TransitionKind::Fade);
    }

    #[test]
    fn test_offsets_and_starts() {
        assert_eq!(transition_offset(3.0, 1.0), 2.0);
        assert!(overlap_fits(3.0, 3.0, 1.0));
        assert!(!overlap_fits(0.8, 3.0, 1.0));
        assert!(!overlap_fits(3.0, 3.0, 0.0));

        let list = scenes(&[("a", 3.0, None), ("b", 3.0, Some("cut")), ("c", 3.0, None)]);
        let boundaries = plan_boundaries(&list, None, 1.0);
        let starts = scene_start_times(&[3.0, 3.0, 3.0], &boundaries);
        assert_eq!(starts, vec![0.0, 2.0, 5.0]);
    }

    #[test]
    fn test_unit_conversions() {
        assert_eq!(delay_millis(1.2345), 1235);
        assert_eq!(delay_millis(-1.0), 0);
        assert_eq!(to_micros(6.0), 6_000_000);
    }

    #[test]
    fn test_fade_schedule() {
        let env = ResolvedEnvelope {
            volume: 0.3,
            fade_in: 2.0,
            fade_out: 2.0,
        };
        let schedule = FadeSchedule::new(&env, 10.0);
        assert_eq!(schedule.fade_in, Some(2.0));
        assert_eq!(schedule.fade_out, Some((8.0, 2.0)));

        let short = FadeSchedule::new(&env, 1.5);
        assert_eq!(short.fade_out, Some((0.0, 1.5)));

        let none = FadeSchedule::new(
            &ResolvedEnvelope {
                volume: 1.0,
                fade_in: 0.0,
                fade_out: -1.0,
            },
            10.0,
        );
        assert_eq!(none.fade_in, None);
        assert_eq!(none.fade_out, None);
    }
}

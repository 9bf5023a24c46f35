use std::time::Instant;

use crate::{
    config::GestureConfig,
    types::{HandIndicator, Landmark, NavDirection},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GestureOutcome {
    pub detected: bool,
    pub event: Option<NavDirection>,
}

impl GestureOutcome {
    const NONE: GestureOutcome = GestureOutcome {
        detected: false,
        event: None,
    };
}

/// Turns index-finger swipes into debounced navigation events.
///
/// A single cooldown is shared by both directions, and only accepted events move it.
pub struct GestureEngine {
    config: GestureConfig,
    last_accepted: Option<Instant>,
    detected: bool,
}

impl GestureEngine {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            config,
            last_accepted: None,
            detected: false,
        }
    }

    /// Candidate direction for one hand, ignoring cooldown.
    pub fn classify(&self, landmarks: &[Landmark]) -> Option<NavDirection> {
        let tip = landmarks.get(self.config.fingertip_index)?;
        let knuckle = landmarks.get(self.config.knuckle_index)?;
        let horizontal = tip.x - knuckle.x;

        if horizontal > self.config.swipe_threshold {
            Some(NavDirection::Right)
        } else if horizontal < -self.config.swipe_threshold {
            Some(NavDirection::Left)
        } else {
            None
        }
    }

    /// Feed one hand-detector result. `suppressed` is set while try-all owns navigation.
    pub fn observe(&mut self, landmarks: &[Landmark], now: Instant, suppressed: bool) -> GestureOutcome {
        if landmarks.is_empty() {
            self.detected = false;
            return GestureOutcome::NONE;
        }
        self.detected = true;

        let outcome = GestureOutcome {
            detected: true,
            event: None,
        };
        if suppressed {
            return outcome;
        }

        let Some(candidate) = self.classify(landmarks) else {
            return outcome;
        };

        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.config.cooldown {
                log::trace!("swipe {} rejected by cooldown", candidate.label());
                return outcome;
            }
        }

        self.last_accepted = Some(now);
        log::debug!("swipe {} accepted", candidate.label());
        GestureOutcome {
            event: Some(candidate),
            ..outcome
        }
    }

    pub fn indicator(&self, now: Instant) -> HandIndicator {
        let flashing = self
            .last_accepted
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.flash);
        match (self.detected, flashing) {
            (_, true) => HandIndicator::Flash,
            (true, false) => HandIndicator::Active,
            (false, false) => HandIndicator::NotDetected,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;

    fn hand_with_offset(dx: f32) -> Vec<Landmark> {
        let mut points = vec![Landmark::new(0.5, 0.5); 21];
        points[5] = Landmark::new(0.4, 0.5);
        points[8] = Landmark::new(0.4 + dx, 0.3);
        points
    }

    #[test]
    fn no_hand_reports_not_detected() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let outcome = engine.observe(&[], Instant::now(), false);
        assert_eq!(outcome, GestureOutcome::NONE);
        assert_eq!(engine.indicator(Instant::now()), HandIndicator::NotDetected);
    }

    #[test]
    fn small_offsets_do_not_navigate() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let outcome = engine.observe(&hand_with_offset(0.05), Instant::now(), false);
        assert!(outcome.detected);
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn left_swipe_is_classified() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let outcome = engine.observe(&hand_with_offset(-0.2), Instant::now(), false);
        assert_eq!(outcome.event, Some(NavDirection::Left));
    }

    #[test]
    fn cooldown_is_shared_across_directions() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let t0 = Instant::now();
        assert_eq!(
            engine.observe(&hand_with_offset(0.2), t0, false).event,
            Some(NavDirection::Right)
        );
        let t1 = t0 + Duration::from_millis(599);
        assert_eq!(engine.observe(&hand_with_offset(-0.2), t1, false).event, None);
        assert_eq!(engine.observe(&hand_with_offset(0.2), t1, false).event, None);

        let t2 = t0 + Duration::from_millis(600);
        assert_eq!(
            engine.observe(&hand_with_offset(-0.2), t2, false).event,
            Some(NavDirection::Left)
        );
    }

    #[test]
    fn rejected_events_do_not_extend_cooldown() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let t0 = Instant::now();
        engine.observe(&hand_with_offset(0.2), t0, false);
        engine.observe(&hand_with_offset(0.2), t0 + Duration::from_millis(500), false);
        let outcome = engine.observe(&hand_with_offset(0.2), t0 + Duration::from_millis(650), false);
        assert_eq!(outcome.event, Some(NavDirection::Right));
    }

    #[test]
    fn suppression_blocks_events_and_keeps_cooldown_untouched() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let t0 = Instant::now();
        let outcome = engine.observe(&hand_with_offset(0.3), t0, true);
        assert!(outcome.detected);
        assert_eq!(outcome.event, None);
        assert_eq!(
            engine.observe(&hand_with_offset(0.3), t0, false).event,
            Some(NavDirection::Right)
        );
    }

    #[test]
    fn short_landmark_lists_are_detected_but_inert() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let outcome = engine.observe(&[Landmark::new(0.1, 0.1); 4], Instant::now(), false);
        assert!(outcome.detected);
        assert_eq!(outcome.event, None);
    }

    #[test]
    fn indicator_flashes_after_accepted_swipe() {
        let mut engine = GestureEngine::new(GestureConfig::default());
        let t0 = Instant::now();
        engine.observe(&hand_with_offset(0.2), t0, false);
        assert_eq!(engine.indicator(t0 + Duration::from_millis(100)), HandIndicator::Flash);
        assert_eq!(engine.indicator(t0 + Duration::from_millis(400)), HandIndicator::Active);
    }

    proptest! {
        #[test]
        fn right_swipes_past_threshold_are_accepted_once(dx in 0.121f32..0.5) {
            let mut engine = GestureEngine::new(GestureConfig::default());
            let t0 = Instant::now();
            let first = engine.observe(&hand_with_offset(dx), t0, false);
            let second = engine.observe(&hand_with_offset(dx), t0 + Duration::from_millis(10), false);
            prop_assert_eq!(first.event, Some(NavDirection::Right));
            prop_assert_eq!(second.event, None);
        }
    }
}

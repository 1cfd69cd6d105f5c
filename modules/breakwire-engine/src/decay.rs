//! Peak-then-decline detection over a story's recent virality snapshots.
//! A decaying verdict is what makes a story eligible for settlement.

use breakwire_common::{ViralityConfig, ViralitySnapshot, ViralityTrend};

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct DecayVerdict {
    pub decaying: bool,
    /// Human-readable cause when decaying; None otherwise.
    pub reason: Option<String>,
}

impl DecayVerdict {
    fn holding() -> Self {
        Self {
            decaying: false,
            reason: None,
        }
    }

    fn decayed(reason: String) -> Self {
        Self {
            decaying: true,
            reason: Some(reason),
        }
    }
}

pub struct DecayDetector {
    config: ViralityConfig,
}

impl DecayDetector {
    pub fn new(config: ViralityConfig) -> Self {
        Self { config }
    }

    /// Assess a story from its snapshot history (most recent first, as the
    /// store returns them) and its all-time peak score.
    ///
    /// Two independent triggers:
    /// - sustained decline: every snapshot in the window trends declining
    ///   and the mean velocity over the window is below the threshold;
    /// - peak drop: the current score has fallen more than the configured
    ///   fraction below the peak.
    ///
    /// With fewer snapshots than the window the story is never decaying —
    /// too little history to call a peak.
    pub fn assess(&self, snapshots: &[ViralitySnapshot], peak_score: f64) -> DecayVerdict {
        let window = self.config.decay_window;
        if snapshots.len() < window {
            return DecayVerdict::holding();
        }
        let recent = &snapshots[..window];

        let all_declining = recent.iter().all(|s| s.trend == ViralityTrend::Declining);
        let mean_velocity =
            recent.iter().map(|s| s.velocity_change).sum::<f64>() / window as f64;
        if all_declining && mean_velocity < -self.config.decay_velocity {
            return DecayVerdict::decayed(format!(
                "sustained decline over last {window} snapshots (mean velocity {mean_velocity:.1})"
            ));
        }

        let current = recent[0].score;
        if peak_score > 0.0 {
            let drop = (peak_score - current) / peak_score;
            if drop > self.config.decay_drop_fraction {
                return DecayVerdict::decayed(format!(
                    "score dropped {:.0}% from peak {peak_score:.1} to {current:.1}",
                    drop * 100.0
                ));
            }
        }

        DecayVerdict::holding()
    }
}

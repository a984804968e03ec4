//! Season plausibility from clothing and scenery, scored against prompt
//! banks of precomputed text embeddings.
//!
//! The crate never runs a text encoder: banks are exported offline into JSON
//! beside the model binaries, one embedding per description, each tagged with
//! the season it implies or marked as excluded (uniforms, evergreen plants,
//! indoor/retail scenes carry no seasonal information).

use crate::config::SeasonConfig;
use crate::models::embedder::cosine_similarity;
use anyhow::Context;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    /// Cyclic calendar distance: 0 same, 1 adjacent, 2 opposite.
    fn wheel_distance(self, other: Season) -> u32 {
        let idx = |s: Season| match s {
            Season::Spring => 0i32,
            Season::Summer => 1,
            Season::Autumn => 2,
            Season::Winter => 3,
        };
        let d = (idx(self) - idx(other)).rem_euclid(4);
        d.min(4 - d) as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptEntry {
    pub label: String,
    /// None for excluded entries, which abstain from the vote.
    pub season: Option<Season>,
    #[serde(default)]
    pub excluded: bool,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptBank {
    pub clothing: Vec<PromptEntry>,
    pub scenery: Vec<PromptEntry>,
}

impl PromptBank {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open prompt bank {}", path.display()))?;
        let bank: PromptBank = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("malformed prompt bank {}", path.display()))?;
        Ok(bank)
    }
}

/// Outcome of one channel (clothing or scenery).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelCall {
    Known(Season, f32),
    /// Best and runner-up too close to call.
    Uncertain,
    /// Top match carries no seasonal information.
    Excluded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeasonResult {
    pub season: Option<Season>,
    pub confidence: f32,
    pub matches_current: Option<bool>,
}

impl SeasonResult {
    pub fn unknown() -> Self {
        Self {
            season: None,
            confidence: 0.0,
            matches_current: None,
        }
    }
}

/// Score one embedding against a bank with a relative best/second ratio
/// test: the winning margin matters, not the absolute gap, so borderline
/// cases come back as uncertain rather than a coin flip.
pub fn vote(embedding: &[f32], entries: &[PromptEntry], cfg: &SeasonConfig) -> ChannelCall {
    let mut scored: Vec<(f32, &PromptEntry)> = entries
        .iter()
        .map(|e| (cosine_similarity(embedding, &e.vector).max(1e-6), e))
        .collect();
    if scored.is_empty() {
        return ChannelCall::Uncertain;
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    let (best_sim, best) = scored[0];
    let Some(season) = best.season.filter(|_| !best.excluded) else {
        return ChannelCall::Excluded;
    };
    // Ratio against the best entry of a different season; same-season
    // runners-up reinforce rather than contest the call.
    let contesting = scored[1..]
        .iter()
        .find(|(_, e)| e.season != best.season)
        .map(|(sim, _)| *sim);
    match contesting {
        None => ChannelCall::Known(season, 1.0),
        Some(second_sim) => {
            let ratio = best_sim / second_sim.max(1e-6);
            if ratio < cfg.min_ratio {
                ChannelCall::Uncertain
            } else {
                let confidence =
                    ((ratio - 1.0) / (cfg.strong_ratio - 1.0)).clamp(0.0, 1.0);
                ChannelCall::Known(season, confidence)
            }
        }
    }
}

/// Combine the clothing and scenery channels into one verdict.
///
/// Opposite seasons cannot both be true on one calendar date, so that case is
/// unknown with zero confidence. Adjacent seasons defer to scenery (the
/// environment outlasts wardrobe choices) at reduced confidence.
pub fn combine(clothing: ChannelCall, scenery: ChannelCall, cfg: &SeasonConfig) -> SeasonResult {
    let verdict = match (clothing, scenery) {
        (ChannelCall::Known(c, cc), ChannelCall::Known(s, sc)) => match c.wheel_distance(s) {
            0 => Some((c, cc.min(sc))),
            1 => Some((s, cc.min(sc) * 0.5)),
            _ => return SeasonResult::unknown(),
        },
        (ChannelCall::Known(c, cc), _) => Some((c, cc * 0.8)),
        (_, ChannelCall::Known(s, sc)) => Some((s, sc * 0.8)),
        _ => None,
    };

    match verdict {
        Some((season, confidence)) => {
            let month = cfg
                .reference_month
                .unwrap_or_else(|| Utc::now().month());
            SeasonResult {
                season: Some(season),
                confidence,
                matches_current: Some(season == Season::from_month(month)),
            }
        }
        None => SeasonResult::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, season: Option<Season>, excluded: bool, vector: Vec<f32>) -> PromptEntry {
        PromptEntry {
            label: label.to_string(),
            season,
            excluded,
            vector,
        }
    }

    fn cfg() -> SeasonConfig {
        SeasonConfig {
            reference_month: Some(7),
            ..SeasonConfig::default()
        }
    }

    #[test]
    fn month_mapping() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(7), Season::Summer);
        assert_eq!(Season::from_month(10), Season::Autumn);
        assert_eq!(Season::from_month(12), Season::Winter);
    }

    #[test]
    fn clear_winner_is_known() {
        let entries = vec![
            entry("down jacket", Some(Season::Winter), false, vec![1.0, 0.0]),
            entry("t-shirt", Some(Season::Summer), false, vec![0.0, 1.0]),
        ];
        let call = vote(&[0.95, 0.2], &entries, &cfg());
        assert!(matches!(call, ChannelCall::Known(Season::Winter, _)));
    }

    #[test]
    fn borderline_ratio_is_uncertain() {
        let entries = vec![
            entry("down jacket", Some(Season::Winter), false, vec![1.0, 0.0]),
            entry("t-shirt", Some(Season::Summer), false, vec![0.0, 1.0]),
        ];
        // Nearly equidistant from both prompts.
        let call = vote(&[0.71, 0.70], &entries, &cfg());
        assert_eq!(call, ChannelCall::Uncertain);
    }

    #[test]
    fn excluded_top_match_abstains() {
        let entries = vec![
            entry("work uniform", None, true, vec![1.0, 0.0]),
            entry("t-shirt", Some(Season::Summer), false, vec![0.0, 1.0]),
        ];
        let call = vote(&[0.9, 0.1], &entries, &cfg());
        assert_eq!(call, ChannelCall::Excluded);
    }

    #[test]
    fn same_season_runner_up_does_not_contest() {
        let entries = vec![
            entry("down jacket", Some(Season::Winter), false, vec![1.0, 0.05]),
            entry("wool coat", Some(Season::Winter), false, vec![0.98, 0.1]),
            entry("t-shirt", Some(Season::Summer), false, vec![0.0, 1.0]),
        ];
        let call = vote(&[1.0, 0.0], &entries, &cfg());
        assert!(matches!(call, ChannelCall::Known(Season::Winter, _)));
    }

    #[test]
    fn opposite_seasons_are_unknown_with_zero_confidence() {
        let result = combine(
            ChannelCall::Known(Season::Winter, 0.9),
            ChannelCall::Known(Season::Summer, 0.9),
            &cfg(),
        );
        assert_eq!(result.season, None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.matches_current, None);
    }

    #[test]
    fn agreeing_channels_keep_the_season() {
        let result = combine(
            ChannelCall::Known(Season::Summer, 0.8),
            ChannelCall::Known(Season::Summer, 0.6),
            &cfg(),
        );
        assert_eq!(result.season, Some(Season::Summer));
        assert_eq!(result.confidence, 0.6);
        assert_eq!(result.matches_current, Some(true));
    }

    #[test]
    fn adjacent_seasons_defer_to_scenery() {
        let result = combine(
            ChannelCall::Known(Season::Summer, 0.8),
            ChannelCall::Known(Season::Autumn, 0.8),
            &cfg(),
        );
        assert_eq!(result.season, Some(Season::Autumn));
        assert!(result.confidence < 0.8);
        assert_eq!(result.matches_current, Some(false));
    }

    #[test]
    fn both_channels_abstaining_is_unknown() {
        let result = combine(ChannelCall::Uncertain, ChannelCall::Excluded, &cfg());
        assert_eq!(result.season, None);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn bank_round_trips_through_json() {
        let bank = PromptBank {
            clothing: vec![entry("t-shirt", Some(Season::Summer), false, vec![0.1; 4])],
            scenery: vec![entry("shopping mall", None, true, vec![0.2; 4])],
        };
        let json = serde_json::to_string(&bank).unwrap();
        let back: PromptBank = serde_json::from_str(&json).unwrap();
        assert_eq!(back.clothing[0].season, Some(Season::Summer));
        assert!(back.scenery[0].excluded);
    }
}

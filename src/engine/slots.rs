//! Ranked slot discovery. Candidates are generated on a fixed granularity
//! grid, filtered against precomputed free windows and scored by tunable
//! preference weights. Pure: the engine snapshots free windows under read
//! locks and hands them in.

use ulid::Ulid;

use crate::limits;
use crate::model::*;

/// Why a search returned nothing.
pub const NO_CAPACITY_IN_RANGE: &str = "no_capacity_in_range";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotWeights {
    pub preferred: f64,
    pub avoided: f64,
    pub resource: f64,
    pub earliness: f64,
}

impl Default for SlotWeights {
    fn default() -> Self {
        Self { preferred: 0.3, avoided: 0.4, resource: 0.15, earliness: 0.15 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotConfig {
    /// Candidate grid step.
    pub granularity_ms: Ms,
    pub max_results: usize,
    pub weights: SlotWeights,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            granularity_ms: 15 * MINUTE_MS,
            max_results: 20,
            weights: SlotWeights::default(),
        }
    }
}

/// What the caller needs, used by the engine to filter resources before
/// ranking.
#[derive(Debug, Clone, Default)]
pub struct Requirement {
    pub kind: Option<ResourceKind>,
    pub skills: Vec<String>,
    pub min_capacity: u32,
    /// Resources that must be free simultaneously. 0 is rejected upstream.
    pub count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Preferences {
    /// Time bands the caller likes (scored up) and avoids (scored down).
    pub preferred: Vec<Span>,
    pub avoided: Vec<Span>,
    pub preferred_resources: Vec<Ulid>,
}

/// One resource eligible for the search, with the contiguous spans in
/// which it has at least one free unit.
#[derive(Debug, Clone)]
pub struct CandidateResource {
    pub id: Ulid,
    pub preferred: bool,
    /// Sorted, non-overlapping.
    pub windows: Vec<Span>,
}

impl CandidateResource {
    fn covers(&self, span: &Span) -> bool {
        let idx = self.windows.partition_point(|w| w.start <= span.start);
        idx > 0 && self.windows[idx - 1].contains_span(span)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlotOutcome {
    pub slots: Vec<RankedSlot>,
    /// Set when `slots` is empty, distinguishing "nothing fits" from an
    /// error.
    pub reason: Option<&'static str>,
}

fn band_fraction(candidate: &Span, bands: &[Span]) -> f64 {
    let duration = candidate.duration_ms();
    if duration == 0 {
        return 0.0;
    }
    let covered: Ms = bands.iter().map(|b| candidate.overlap_ms(b)).sum();
    (covered as f64 / duration as f64).min(1.0)
}

fn score(
    candidate: &Span,
    range: &Span,
    duration: Ms,
    chosen: &[&CandidateResource],
    prefs: &Preferences,
    weights: &SlotWeights,
) -> f64 {
    let mut confidence = 0.5;
    confidence += weights.preferred * band_fraction(candidate, &prefs.preferred);
    confidence -= weights.avoided * band_fraction(candidate, &prefs.avoided);

    if !prefs.preferred_resources.is_empty() && !chosen.is_empty() {
        let hits = chosen.iter().filter(|c| c.preferred).count();
        confidence += weights.resource * hits as f64 / chosen.len() as f64;
    }

    let slack = (range.duration_ms() - duration).max(1);
    let earliness = 1.0 - (candidate.start - range.start) as f64 / slack as f64;
    confidence += weights.earliness * earliness;

    confidence.clamp(0.0, 1.0)
}

/// Rank every grid-aligned start in `range` where `count` of the
/// candidates are simultaneously free for `duration`.
pub fn rank_slots(
    duration: Ms,
    range: &Span,
    candidates: &[CandidateResource],
    count: usize,
    prefs: &Preferences,
    cfg: &SlotConfig,
) -> SlotOutcome {
    let mut slots: Vec<RankedSlot> = Vec::new();

    if candidates.len() >= count {
        let mut start = range.start;
        let mut examined = 0usize;
        while start + duration <= range.end && examined < limits::MAX_SLOT_CANDIDATES {
            examined += 1;
            let span = Span::new(start, start + duration);

            let mut qualifying: Vec<&CandidateResource> =
                candidates.iter().filter(|c| c.covers(&span)).collect();
            if qualifying.len() >= count {
                // Preferred resources win the cut when more qualify than
                // needed; id order keeps the rest deterministic.
                qualifying.sort_by_key(|c| (!c.preferred, c.id));
                qualifying.truncate(count);

                let confidence = score(&span, range, duration, &qualifying, prefs, &cfg.weights);
                slots.push(RankedSlot {
                    span,
                    resource_ids: qualifying.iter().map(|c| c.id).collect(),
                    confidence,
                });
            }
            start += cfg.granularity_ms;
        }
    }

    slots.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.span.start.cmp(&b.span.start))
    });
    slots.truncate(cfg.max_results);

    let reason = slots.is_empty().then_some(NO_CAPACITY_IN_RANGE);
    SlotOutcome { slots, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;
    const MONDAY: i64 = 23_531;

    fn candidate(windows: Vec<Span>) -> CandidateResource {
        CandidateResource { id: Ulid::new(), preferred: false, windows }
    }

    #[test]
    fn grid_alignment_and_coverage() {
        let day = MONDAY * DAY_MS;
        // Free 09:00-12:00.
        let c = candidate(vec![Span::new(day + 9 * H, day + 12 * H)]);
        let range = Span::new(day + 8 * H, day + 13 * H);
        let cfg = SlotConfig { granularity_ms: 30 * MINUTE_MS, ..Default::default() };

        let out = rank_slots(2 * H, &range, &[c], 1, &Preferences::default(), &cfg);
        // Starts 09:00, 09:30, 10:00 fit a 2h slot inside 09:00-12:00.
        assert_eq!(out.slots.len(), 3);
        assert!(out.reason.is_none());
        for slot in &out.slots {
            assert_eq!((slot.span.start - range.start) % (30 * MINUTE_MS), 0);
            assert!(slot.span.start >= day + 9 * H);
            assert!(slot.span.end <= day + 12 * H);
        }
    }

    #[test]
    fn earlier_slots_rank_higher_by_default() {
        let day = MONDAY * DAY_MS;
        let c = candidate(vec![Span::new(day + 9 * H, day + 17 * H)]);
        let range = Span::new(day + 9 * H, day + 17 * H);

        let out = rank_slots(H, &range, &[c], 1, &Preferences::default(), &SlotConfig::default());
        let starts: Vec<Ms> = out.slots.iter().map(|s| s.span.start).collect();
        let mut sorted = starts.clone();
        sorted.sort();
        assert_eq!(starts, sorted);
        assert_eq!(out.slots.len(), 20); // default max_results
    }

    #[test]
    fn preferred_band_outranks_earliness() {
        let day = MONDAY * DAY_MS;
        let c = candidate(vec![Span::new(day + 9 * H, day + 17 * H)]);
        let range = Span::new(day + 9 * H, day + 17 * H);
        let prefs = Preferences {
            preferred: vec![Span::new(day + 14 * H, day + 16 * H)],
            ..Default::default()
        };

        let out = rank_slots(2 * H, &range, &[c], 1, &prefs, &SlotConfig::default());
        // 14:00-16:00 sits fully inside the preferred band: +0.3 beats the
        // at most +0.15 earliness edge of 09:00.
        assert_eq!(out.slots[0].span, Span::new(day + 14 * H, day + 16 * H));
    }

    #[test]
    fn avoided_band_sinks_slots() {
        let day = MONDAY * DAY_MS;
        let c = candidate(vec![Span::new(day + 9 * H, day + 13 * H)]);
        let range = Span::new(day + 9 * H, day + 13 * H);
        let prefs = Preferences {
            avoided: vec![Span::new(day + 9 * H, day + 11 * H)],
            ..Default::default()
        };

        let out = rank_slots(2 * H, &range, &[c], 1, &prefs, &SlotConfig::default());
        assert_eq!(out.slots[0].span, Span::new(day + 11 * H, day + 13 * H));
    }

    #[test]
    fn multi_resource_needs_simultaneous_freedom() {
        let day = MONDAY * DAY_MS;
        let a = candidate(vec![Span::new(day + 9 * H, day + 12 * H)]);
        let b = candidate(vec![Span::new(day + 11 * H, day + 14 * H)]);
        let range = Span::new(day + 9 * H, day + 14 * H);
        let cfg = SlotConfig { granularity_ms: H, ..Default::default() };

        let out = rank_slots(H, &range, &[a, b], 2, &Preferences::default(), &cfg);
        // Only the 11:00-12:00 overlap works for both.
        assert_eq!(out.slots.len(), 1);
        assert_eq!(out.slots[0].span, Span::new(day + 11 * H, day + 12 * H));
        assert_eq!(out.slots[0].resource_ids.len(), 2);
    }

    #[test]
    fn preferred_resources_chosen_and_scored() {
        let day = MONDAY * DAY_MS;
        let window = vec![Span::new(day + 9 * H, day + 10 * H)];
        let plain = candidate(window.clone());
        let mut starred = candidate(window);
        starred.preferred = true;

        let range = Span::new(day + 9 * H, day + 10 * H);
        let prefs = Preferences {
            preferred_resources: vec![starred.id],
            ..Default::default()
        };
        let out = rank_slots(
            H,
            &range,
            &[plain.clone(), starred.clone()],
            1,
            &prefs,
            &SlotConfig::default(),
        );
        assert_eq!(out.slots.len(), 1);
        assert_eq!(out.slots[0].resource_ids, vec![starred.id]);

        // Same search without the preference may pick either, scored lower.
        let neutral = rank_slots(
            H,
            &range,
            &[plain, starred],
            1,
            &Preferences::default(),
            &SlotConfig::default(),
        );
        assert!(out.slots[0].confidence > neutral.slots[0].confidence);
    }

    #[test]
    fn empty_result_names_the_reason() {
        let day = MONDAY * DAY_MS;
        let c = candidate(vec![]);
        let range = Span::new(day, day + 4 * H);
        let out = rank_slots(H, &range, &[c], 1, &Preferences::default(), &SlotConfig::default());
        assert!(out.slots.is_empty());
        assert_eq!(out.reason, Some(NO_CAPACITY_IN_RANGE));

        // Too few candidates at all.
        let out = rank_slots(H, &range, &[], 1, &Preferences::default(), &SlotConfig::default());
        assert_eq!(out.reason, Some(NO_CAPACITY_IN_RANGE));
    }

    #[test]
    fn confidence_stays_in_unit_range() {
        let day = MONDAY * DAY_MS;
        let c = candidate(vec![Span::new(day, day + 8 * H)]);
        let range = Span::new(day, day + 8 * H);
        let prefs = Preferences {
            preferred: vec![range],
            preferred_resources: vec![c.id],
            ..Default::default()
        };
        let mut starred = c.clone();
        starred.preferred = true;

        let out = rank_slots(H, &range, &[starred], 1, &prefs, &SlotConfig::default());
        for slot in &out.slots {
            assert!((0.0..=1.0).contains(&slot.confidence));
        }
        // Earliest slot maxes every component and clamps at 1.0.
        assert_eq!(out.slots[0].confidence, 1.0);
    }
}

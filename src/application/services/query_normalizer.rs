//! Rewrites terse technician queries into richer domain phrasing before embedding.

/// How a rule decides whether it applies to a lower-cased query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Contains(&'static str),
    AnyOf(&'static [&'static str]),
}

impl Trigger {
    fn fires(&self, query: &str) -> bool {
        match self {
            Trigger::Contains(needle) => query.contains(needle),
            Trigger::AnyOf(needles) => needles.iter().any(|needle| query.contains(needle)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizationRule {
    pub trigger: Trigger,
    pub canonical: &'static str,
}

/// Evaluated top to bottom; the first firing rule wins.
pub const DEFAULT_RULES: &[NormalizationRule] = &[
    NormalizationRule {
        trigger: Trigger::Contains("door"),
        canonical: "elevator door not closing or door sensor malfunction",
    },
    NormalizationRule {
        trigger: Trigger::Contains("stuck"),
        canonical: "elevator stuck between floors or motor jammed",
    },
    NormalizationRule {
        trigger: Trigger::Contains("noise"),
        canonical: "elevator making unusual mechanical noise",
    },
    NormalizationRule {
        trigger: Trigger::Contains("vibration"),
        canonical: "elevator vibrating due to misalignment or bearing fault",
    },
    NormalizationRule {
        trigger: Trigger::Contains("not moving"),
        canonical: "elevator not moving possibly due to control failure or power issue",
    },
    NormalizationRule {
        trigger: Trigger::AnyOf(&["overheat", "hot"]),
        canonical: "motor overheating or electrical contactor failure",
    },
];

#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    rules: &'static [NormalizationRule],
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_RULES)
    }
}

impl QueryNormalizer {
    pub fn new(rules: &'static [NormalizationRule]) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &'static [NormalizationRule] {
        self.rules
    }

    /// Never fails: unmatched queries come back trimmed and lower-cased.
    pub fn normalize(&self, raw_query: &str) -> String {
        let query = raw_query.trim().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.trigger.fires(&query))
            .map(|rule| rule.canonical.to_string())
            .unwrap_or(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stuck_maps_to_jammed_phrase() {
        let normalizer = QueryNormalizer::default();
        assert_eq!(
            normalizer.normalize("the elevator is stuck"),
            "elevator stuck between floors or motor jammed"
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        let normalizer = QueryNormalizer::default();
        assert_eq!(
            normalizer.normalize("Motor feels HOT"),
            "motor overheating or electrical contactor failure"
        );
    }

    #[test]
    fn door_rule_wins_over_stuck() {
        let normalizer = QueryNormalizer::default();
        assert_eq!(
            normalizer.normalize("door stuck open"),
            "elevator door not closing or door sensor malfunction"
        );
    }

    #[test]
    fn unmatched_query_is_trimmed_and_lowercased() {
        let normalizer = QueryNormalizer::default();
        assert_eq!(
            normalizer.normalize("  Random Unrelated Text "),
            "random unrelated text"
        );
    }

    #[test]
    fn every_rule_is_reachable_on_its_own_trigger() {
        let normalizer = QueryNormalizer::default();
        for rule in normalizer.rules() {
            let sample = match rule.trigger {
                Trigger::Contains(needle) => needle,
                Trigger::AnyOf(needles) => needles[0],
            };
            assert_eq!(normalizer.normalize(sample), rule.canonical);
        }
    }

    #[test]
    fn normalization_is_deterministic() {
        let normalizer = QueryNormalizer::default();
        let first = normalizer.normalize("strange vibration at floor 3");
        assert_eq!(first, normalizer.normalize("strange vibration at floor 3"));
    }
}

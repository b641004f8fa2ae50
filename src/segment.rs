//! RFM scores and the rule table that maps them onto named customer segments

use crate::error::{RfmError, RfmResult};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Three quartile digits in fixed order: Recency, Frequency, Monetary.
///
/// Every digit is in `1..=4`, 1 being the most favorable quartile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RfmScore([u8; 3]);

impl RfmScore {
    /// Compose a score from its three quartiles
    pub fn new(recency: u8, frequency: u8, monetary: u8) -> RfmResult<Self> {
        let digits = [recency, frequency, monetary];
        if digits.iter().any(|d| !(1..=4).contains(d)) {
            return Err(RfmError::InvalidScore(format!(
                "{}{}{}",
                recency, frequency, monetary
            )));
        }
        Ok(Self(digits))
    }

    pub fn recency(&self) -> u8 {
        self.0[0]
    }

    pub fn frequency(&self) -> u8 {
        self.0[1]
    }

    pub fn monetary(&self) -> u8 {
        self.0[2]
    }

    /// All 64 valid scores, "111" through "444"
    pub fn all() -> impl Iterator<Item = RfmScore> {
        (1..=4u8).flat_map(|r| {
            (1..=4u8).flat_map(move |f| (1..=4u8).map(move |m| RfmScore([r, f, m])))
        })
    }
}

impl fmt::Display for RfmScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.0[0], self.0[1], self.0[2])
    }
}

impl FromStr for RfmScore {
    type Err = RfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits: Vec<u8> = trimmed
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<Vec<u8>>>()
            .ok_or_else(|| RfmError::InvalidScore(s.to_string()))?;

        match digits.as_slice() {
            [r, f, m] => {
                RfmScore::new(*r, *f, *m).map_err(|_| RfmError::InvalidScore(s.to_string()))
            }
            _ => Err(RfmError::InvalidScore(s.to_string())),
        }
    }
}

impl Serialize for RfmScore {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Named customer segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RfmCategory {
    Core,
    Loyal,
    Whales,
    Promising,
    Rookies,
    Slipping,
    Risk,
    Churned,
    Regular,
}

impl RfmCategory {
    /// Every category, in rule precedence order
    pub const ALL: [RfmCategory; 9] = [
        RfmCategory::Core,
        RfmCategory::Loyal,
        RfmCategory::Whales,
        RfmCategory::Promising,
        RfmCategory::Rookies,
        RfmCategory::Slipping,
        RfmCategory::Risk,
        RfmCategory::Churned,
        RfmCategory::Regular,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RfmCategory::Core => "Core",
            RfmCategory::Loyal => "Loyal",
            RfmCategory::Whales => "Whales",
            RfmCategory::Promising => "Promising",
            RfmCategory::Rookies => "Rookies",
            RfmCategory::Slipping => "Slipping",
            RfmCategory::Risk => "Risk",
            RfmCategory::Churned => "Churned",
            RfmCategory::Regular => "Regular",
        }
    }
}

impl fmt::Display for RfmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the segmentation decision list
#[derive(Debug, Clone, Copy)]
pub struct SegmentRule {
    /// Human-readable condition, shown in the CLI explanation
    pub condition: &'static str,
    pub matches: fn(&RfmScore) -> bool,
    pub category: RfmCategory,
}

/// Rules evaluated top-down; the first match wins.
///
/// Rules overlap ("111" also has a middle digit of 1), so the order here is
/// what makes the categories mutually exclusive. The last rule always matches.
pub static SEGMENT_RULES: [SegmentRule; 9] = [
    SegmentRule {
        condition: "score == 111",
        matches: |s| s.0 == [1, 1, 1],
        category: RfmCategory::Core,
    },
    SegmentRule {
        condition: "frequency == 1",
        matches: |s| s.frequency() == 1,
        category: RfmCategory::Loyal,
    },
    SegmentRule {
        condition: "monetary == 1",
        matches: |s| s.monetary() == 1,
        category: RfmCategory::Whales,
    },
    SegmentRule {
        condition: "frequency,monetary in {13, 14}",
        matches: |s| s.frequency() == 1 && matches!(s.monetary(), 3 | 4),
        category: RfmCategory::Promising,
    },
    SegmentRule {
        condition: "recency,frequency == 14",
        matches: |s| s.recency() == 1 && s.frequency() == 4,
        category: RfmCategory::Rookies,
    },
    SegmentRule {
        condition: "recency,frequency == 44",
        matches: |s| s.recency() == 4 && s.frequency() == 4,
        category: RfmCategory::Slipping,
    },
    SegmentRule {
        condition: "monetary == 4",
        matches: |s| s.monetary() == 4,
        category: RfmCategory::Risk,
    },
    SegmentRule {
        condition: "recency == 4",
        matches: |s| s.recency() == 4,
        category: RfmCategory::Churned,
    },
    SegmentRule {
        condition: "otherwise",
        matches: |_| true,
        category: RfmCategory::Regular,
    },
];

/// Find the rule that decides the category of `score`
pub fn matching_rule(score: &RfmScore) -> &'static SegmentRule {
    SEGMENT_RULES
        .iter()
        .find(|rule| (rule.matches)(score))
        .unwrap_or(&SEGMENT_RULES[SEGMENT_RULES.len() - 1])
}

/// Classify a score into its segment
pub fn classify(score: &RfmScore) -> RfmCategory {
    matching_rule(score).category
}

/// Parse a score string like "131" and classify it
pub fn classify_str(score: &str) -> RfmResult<RfmCategory> {
    let score: RfmScore = score.parse()?;
    Ok(classify(&score))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category_of(score: &str) -> RfmCategory {
        classify_str(score).unwrap()
    }

    #[test]
    fn test_core_takes_precedence() {
        // 111 would also satisfy the Loyal and Whales rules
        assert_eq!(category_of("111"), RfmCategory::Core);
    }

    #[test]
    fn test_rule_examples() {
        assert_eq!(category_of("211"), RfmCategory::Loyal);
        assert_eq!(category_of("414"), RfmCategory::Loyal);
        assert_eq!(category_of("441"), RfmCategory::Whales);
        assert_eq!(category_of("221"), RfmCategory::Whales);
        assert_eq!(category_of("144"), RfmCategory::Rookies);
        assert_eq!(category_of("143"), RfmCategory::Rookies);
        assert_eq!(category_of("442"), RfmCategory::Slipping);
        assert_eq!(category_of("444"), RfmCategory::Slipping);
        assert_eq!(category_of("234"), RfmCategory::Risk);
        assert_eq!(category_of("424"), RfmCategory::Risk);
        assert_eq!(category_of("432"), RfmCategory::Churned);
        assert_eq!(category_of("222"), RfmCategory::Regular);
        assert_eq!(category_of("333"), RfmCategory::Regular);
    }

    #[test]
    fn test_promising_is_shadowed_by_loyal() {
        // Any score ending in 13 or 14 has a middle digit of 1, so Loyal wins
        for score in ["113", "114", "213", "314", "414"] {
            assert_eq!(category_of(score), RfmCategory::Loyal, "score {}", score);
        }
        let promising = RfmScore::all()
            .filter(|s| classify(s) == RfmCategory::Promising)
            .count();
        assert_eq!(promising, 0);
    }

    #[test]
    fn test_classify_is_total() {
        let scores: Vec<RfmScore> = RfmScore::all().collect();
        assert_eq!(scores.len(), 64);

        for score in &scores {
            let winners: Vec<_> = SEGMENT_RULES
                .iter()
                .filter(|rule| (rule.matches)(score))
                .collect();
            assert!(!winners.is_empty());
            assert_eq!(classify(score), winners[0].category);
        }
    }

    #[test]
    fn test_rules_follow_category_order() {
        let rule_order: Vec<_> = SEGMENT_RULES.iter().map(|r| r.category).collect();
        assert_eq!(rule_order, RfmCategory::ALL.to_vec());
    }

    #[test]
    fn test_score_parsing() {
        let score: RfmScore = "131".parse().unwrap();
        assert_eq!(score.recency(), 1);
        assert_eq!(score.frequency(), 3);
        assert_eq!(score.monetary(), 1);
        assert_eq!(score.to_string(), "131");
        assert_eq!(" 242 ".parse::<RfmScore>().unwrap().to_string(), "242");

        for invalid in ["", "11", "1111", "150", "0 1", "abc", "-11"] {
            assert!(
                matches!(invalid.parse::<RfmScore>(), Err(RfmError::InvalidScore(_))),
                "{:?} should be rejected",
                invalid
            );
        }
    }

    #[test]
    fn test_score_new_rejects_out_of_range() {
        assert!(RfmScore::new(1, 2, 3).is_ok());
        assert!(RfmScore::new(0, 2, 3).is_err());
        assert!(RfmScore::new(1, 5, 3).is_err());
    }

    #[test]
    fn test_score_serializes_as_string() {
        let score = RfmScore::new(1, 4, 4).unwrap();
        assert_eq!(serde_json::to_string(&score).unwrap(), "\"144\"");
    }
}

//! Reputation labels derived from a score.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Rank {
    NoviceQuestioner,
    CuriousLearner,
    InquisitiveScholar,
    InsightfulThinker,
    MasterQuestioner,
}

/// Lower score bound of each rank, highest first.
const THRESHOLDS: [(i32, Rank); 4] = [
    (1000, Rank::MasterQuestioner),
    (400, Rank::InsightfulThinker),
    (150, Rank::InquisitiveScholar),
    (50, Rank::CuriousLearner),
];

impl Rank {
    pub fn for_score(score: i32) -> Self {
        THRESHOLDS
            .iter()
            .find(|(min, _)| score >= *min)
            .map(|(_, rank)| *rank)
            .unwrap_or(Rank::NoviceQuestioner)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Rank::NoviceQuestioner => "Novice Questioner",
            Rank::CuriousLearner => "Curious Learner",
            Rank::InquisitiveScholar => "Inquisitive Scholar",
            Rank::InsightfulThinker => "Insightful Thinker",
            Rank::MasterQuestioner => "Master Questioner",
        }
    }
}

impl Default for Rank {
    fn default() -> Self {
        Rank::NoviceQuestioner
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds() {
        assert_eq!(Rank::for_score(-20), Rank::NoviceQuestioner);
        assert_eq!(Rank::for_score(0), Rank::NoviceQuestioner);
        assert_eq!(Rank::for_score(49), Rank::NoviceQuestioner);
        assert_eq!(Rank::for_score(50), Rank::CuriousLearner);
        assert_eq!(Rank::for_score(149), Rank::CuriousLearner);
        assert_eq!(Rank::for_score(150), Rank::InquisitiveScholar);
        assert_eq!(Rank::for_score(400), Rank::InsightfulThinker);
        assert_eq!(Rank::for_score(999), Rank::InsightfulThinker);
        assert_eq!(Rank::for_score(1000), Rank::MasterQuestioner);
    }

    #[test]
    fn default_label_matches_new_accounts() {
        assert_eq!(Rank::default().to_string(), "Novice Questioner");
    }
}

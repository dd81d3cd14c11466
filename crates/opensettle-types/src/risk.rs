//! Risk assessment types for treasury operations.
//!
//! Scoring is additive over independent factors (never averaged) and the
//! sum is not clamped above 100. Classification thresholds:
//!
//! ```text
//! score >= 70  → CRITICAL / deny
//! score >= 50  → HIGH     / review
//! score >= 30  → MEDIUM   / review
//! otherwise    → LOW      / approve
//! ```
//!
//! `review` is informational — only `deny` blocks operation creation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::constants;

/// Overall risk classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Severity of an individual factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// What triggered a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskFactorKind {
    /// Amount exceeds the single-transaction cap.
    AmountOverCap,
    /// Amount exceeds half the single-transaction cap.
    AmountOverHalfCap,
    /// Destination appears on the blacklist.
    BlacklistedDestination,
    /// A whitelist is configured and the destination is absent from it.
    UnlistedDestination,
    /// Execution requested outside business hours.
    OutsideBusinessHours,
}

/// One contribution to the summed risk score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    pub severity: Severity,
    pub score: u32,
    pub description: String,
}

/// What the engine recommends for the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Recommendation {
    Approve,
    Review,
    Deny,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "APPROVE"),
            Self::Review => write!(f, "REVIEW"),
            Self::Deny => write!(f, "DENY"),
        }
    }
}

/// A scored, time-bounded evaluation gating whether an operation may
/// proceed. Cached per operation id; expired entries are swept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    /// Sum of factor scores; not clamped above 100.
    pub score: u32,
    pub factors: Vec<RiskFactor>,
    pub recommendation: Recommendation,
    pub assessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RiskAssessment {
    /// Classify a summed score into (level, recommendation) and stamp the
    /// one-hour expiry.
    #[must_use]
    pub fn from_factors(factors: Vec<RiskFactor>, now: DateTime<Utc>) -> Self {
        let score: u32 = factors.iter().map(|f| f.score).sum();
        let (level, recommendation) = if score >= constants::RISK_SCORE_CRITICAL {
            (RiskLevel::Critical, Recommendation::Deny)
        } else if score >= constants::RISK_SCORE_HIGH {
            (RiskLevel::High, Recommendation::Review)
        } else if score >= constants::RISK_SCORE_MEDIUM {
            (RiskLevel::Medium, Recommendation::Review)
        } else {
            (RiskLevel::Low, Recommendation::Approve)
        };
        Self {
            level,
            score,
            factors,
            recommendation,
            assessed_at: now,
            expires_at: now + Duration::seconds(constants::RISK_ASSESSMENT_TTL_SECS),
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// One-line summary for metadata annotations and logs.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} score={} recommendation={} factors={}",
            self.level,
            self.score,
            self.recommendation,
            self.factors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factor(kind: RiskFactorKind, severity: Severity, score: u32) -> RiskFactor {
        RiskFactor {
            kind,
            severity,
            score,
            description: String::new(),
        }
    }

    #[test]
    fn empty_factors_approve() {
        let a = RiskAssessment::from_factors(vec![], Utc::now());
        assert_eq!(a.score, 0);
        assert_eq!(a.level, RiskLevel::Low);
        assert_eq!(a.recommendation, Recommendation::Approve);
    }

    #[test]
    fn threshold_boundaries() {
        let now = Utc::now();
        let cases = [
            (29, RiskLevel::Low, Recommendation::Approve),
            (30, RiskLevel::Medium, Recommendation::Review),
            (50, RiskLevel::High, Recommendation::Review),
            (69, RiskLevel::High, Recommendation::Review),
            (70, RiskLevel::Critical, Recommendation::Deny),
        ];
        for (score, level, rec) in cases {
            let a = RiskAssessment::from_factors(
                vec![factor(RiskFactorKind::AmountOverCap, Severity::High, score)],
                now,
            );
            assert_eq!(a.level, level, "score {score}");
            assert_eq!(a.recommendation, rec, "score {score}");
        }
    }

    #[test]
    fn score_is_additive_not_clamped() {
        let a = RiskAssessment::from_factors(
            vec![
                factor(RiskFactorKind::AmountOverCap, Severity::High, 40),
                factor(RiskFactorKind::BlacklistedDestination, Severity::High, 40),
                factor(RiskFactorKind::UnlistedDestination, Severity::Medium, 20),
                factor(RiskFactorKind::OutsideBusinessHours, Severity::Low, 10),
            ],
            Utc::now(),
        );
        assert_eq!(a.score, 110);
        assert_eq!(a.recommendation, Recommendation::Deny);
    }

    #[test]
    fn expiry_is_one_hour() {
        let now = Utc::now();
        let a = RiskAssessment::from_factors(vec![], now);
        assert!(!a.is_expired(now));
        assert!(!a.is_expired(now + Duration::minutes(59)));
        assert!(a.is_expired(now + Duration::hours(1)));
    }
}

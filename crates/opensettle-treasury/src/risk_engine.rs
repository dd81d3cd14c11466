//! Additive risk scoring for treasury operations.
//!
//! Each factor contributes a fixed score; the sum classifies the
//! operation. Amount factors are exclusive (over-cap supersedes
//! over-half-cap), destination and timing factors stack on top.
//! Assessments are cached per operation id for one hour.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use opensettle_types::{
    OperationId, RiskAssessment, RiskFactor, RiskFactorKind, RiskPolicy, Severity, constants,
};

/// Scores operations against a [`RiskPolicy`] and caches the results.
#[derive(Debug)]
pub struct RiskEngine {
    policy: RiskPolicy,
    cache: HashMap<OperationId, RiskAssessment>,
}

impl RiskEngine {
    #[must_use]
    pub fn new(policy: RiskPolicy) -> Self {
        Self {
            policy,
            cache: HashMap::new(),
        }
    }

    /// Score one operation and cache the assessment under its id.
    pub fn assess(
        &mut self,
        id: OperationId,
        amount: Decimal,
        destination: Option<&str>,
        now: DateTime<Utc>,
    ) -> RiskAssessment {
        let mut factors = Vec::new();

        let cap = self.policy.max_single_transaction;
        if amount > cap {
            factors.push(RiskFactor {
                kind: RiskFactorKind::AmountOverCap,
                severity: Severity::High,
                score: constants::RISK_FACTOR_OVER_CAP,
                description: format!("amount {amount} exceeds cap {cap}"),
            });
        } else if amount > cap / Decimal::TWO {
            factors.push(RiskFactor {
                kind: RiskFactorKind::AmountOverHalfCap,
                severity: Severity::Medium,
                score: constants::RISK_FACTOR_OVER_HALF_CAP,
                description: format!("amount {amount} exceeds half of cap {cap}"),
            });
        }

        if let Some(dest) = destination {
            if self.policy.blacklist.iter().any(|b| b == dest) {
                factors.push(RiskFactor {
                    kind: RiskFactorKind::BlacklistedDestination,
                    severity: Severity::High,
                    score: constants::RISK_FACTOR_BLACKLISTED,
                    description: format!("destination {dest} is blacklisted"),
                });
            }
            if let Some(whitelist) = &self.policy.whitelist {
                if !whitelist.iter().any(|w| w == dest) {
                    factors.push(RiskFactor {
                        kind: RiskFactorKind::UnlistedDestination,
                        severity: Severity::Medium,
                        score: constants::RISK_FACTOR_NOT_WHITELISTED,
                        description: format!("destination {dest} is not whitelisted"),
                    });
                }
            }
        }

        if !self.policy.business_hours.contains(now) {
            factors.push(RiskFactor {
                kind: RiskFactorKind::OutsideBusinessHours,
                severity: Severity::Low,
                score: constants::RISK_FACTOR_OUTSIDE_HOURS,
                description: "requested outside business hours".to_string(),
            });
        }

        let assessment = RiskAssessment::from_factors(factors, now);
        tracing::debug!(
            operation = %id,
            score = assessment.score,
            level = %assessment.level,
            recommendation = %assessment.recommendation,
            "Risk assessed"
        );
        self.cache.insert(id, assessment.clone());
        assessment
    }

    /// The cached assessment for an operation, if any (possibly expired).
    #[must_use]
    pub fn cached(&self, id: OperationId) -> Option<&RiskAssessment> {
        self.cache.get(&id)
    }

    /// Drop expired assessments. Returns how many were evicted.
    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, a| !a.is_expired(now));
        let evicted = before - self.cache.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Expired risk assessments evicted");
        }
        evicted
    }

    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use opensettle_types::{ProcessingWindow, Recommendation, RiskLevel};

    use super::*;

    fn midday() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    fn policy() -> RiskPolicy {
        RiskPolicy {
            max_single_transaction: Decimal::new(5, 0),
            blacklist: vec!["0xbanned".to_string()],
            whitelist: None,
            business_hours: ProcessingWindow::business_hours(0),
        }
    }

    #[test]
    fn small_amount_in_hours_is_low() {
        let mut engine = RiskEngine::new(policy());
        let a = engine.assess(OperationId::new(), Decimal::ONE, Some("0xok"), midday());
        assert_eq!(a.score, 0);
        assert_eq!(a.recommendation, Recommendation::Approve);
    }

    #[test]
    fn over_cap_with_unlisted_destination_is_review_not_deny() {
        let mut p = policy();
        p.whitelist = Some(vec!["0xallowed".to_string()]);
        let mut engine = RiskEngine::new(p);

        // 10 > cap 5 (40) + unlisted (20): the half-cap factor must not
        // also fire, or this would wrongly reach deny territory.
        let a = engine.assess(
            OperationId::new(),
            Decimal::new(10, 0),
            Some("0xother"),
            midday(),
        );
        assert_eq!(a.score, 60);
        assert_eq!(a.level, RiskLevel::High);
        assert_eq!(a.recommendation, Recommendation::Review);
    }

    #[test]
    fn half_cap_factor_fires_alone() {
        let mut engine = RiskEngine::new(policy());
        let a = engine.assess(OperationId::new(), Decimal::new(3, 0), Some("0xok"), midday());
        assert_eq!(a.score, constants::RISK_FACTOR_OVER_HALF_CAP);
        assert_eq!(a.factors[0].kind, RiskFactorKind::AmountOverHalfCap);
    }

    #[test]
    fn blacklist_plus_over_cap_denies() {
        let mut engine = RiskEngine::new(policy());
        let a = engine.assess(
            OperationId::new(),
            Decimal::new(10, 0),
            Some("0xbanned"),
            midday(),
        );
        assert_eq!(a.score, 80); // 40 over-cap + 40 blacklist
        assert_eq!(a.recommendation, Recommendation::Deny);
    }

    #[test]
    fn outside_hours_adds_low_factor() {
        let mut engine = RiskEngine::new(policy());
        let night = Utc.with_ymd_and_hms(2026, 3, 2, 22, 0, 0).unwrap();
        let a = engine.assess(OperationId::new(), Decimal::ONE, Some("0xok"), night);
        assert_eq!(a.score, constants::RISK_FACTOR_OUTSIDE_HOURS);
        assert_eq!(a.recommendation, Recommendation::Approve);
    }

    #[test]
    fn no_destination_skips_destination_factors() {
        let mut p = policy();
        p.whitelist = Some(vec![]);
        let mut engine = RiskEngine::new(p);
        let a = engine.assess(OperationId::new(), Decimal::ONE, None, midday());
        assert_eq!(a.score, 0);
    }

    #[test]
    fn cache_and_eviction() {
        let mut engine = RiskEngine::new(policy());
        let id = OperationId::new();
        let now = midday();
        engine.assess(id, Decimal::ONE, Some("0xok"), now);
        assert!(engine.cached(id).is_some());

        assert_eq!(engine.evict_expired(now + Duration::minutes(30)), 0);
        assert_eq!(engine.evict_expired(now + Duration::hours(2)), 1);
        assert!(engine.cached(id).is_none());
        assert_eq!(engine.cache_size(), 0);
    }
}

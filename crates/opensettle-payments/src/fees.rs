//! Fee calculator — pure function of (policy, amount, strategy, snapshot).
//!
//! The dynamic strategy takes its network fee data as an explicit snapshot
//! argument so the computation stays deterministic: same inputs, same fee.
//! Fetching the snapshot (and tolerating its absence) is the caller's job.

use rust_decimal::Decimal;

use opensettle_types::{ChainPolicy, FeeConfig, FeeStrategy};

/// Computes withdrawal fees. Stateless apart from its configuration.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    config: FeeConfig,
}

impl FeeCalculator {
    #[must_use]
    pub fn new(config: FeeConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn strategy(&self) -> FeeStrategy {
        self.config.strategy
    }

    /// Compute the fee for `amount` on the given chain.
    ///
    /// `fee_data` is the live network fee snapshot used by the dynamic
    /// strategy; `None` falls back to the chain's fixed fee. The result is
    /// clamped to `amount * max_fee_percentage / 100` and is never
    /// negative.
    #[must_use]
    pub fn calculate(
        &self,
        policy: &ChainPolicy,
        amount: Decimal,
        fee_data: Option<Decimal>,
    ) -> Decimal {
        let hundred = Decimal::new(100, 0);
        let percentage_fee = amount * self.config.percentage / hundred;

        let computed = match self.config.strategy {
            FeeStrategy::Fixed => policy.fixed_fee,
            FeeStrategy::Percentage => percentage_fee,
            FeeStrategy::Dynamic => fee_data
                .map_or(policy.fixed_fee, |data| data * self.config.dynamic_multiplier),
            FeeStrategy::Hybrid => policy.fixed_fee.max(percentage_fee),
        };

        let cap = amount * self.config.max_fee_percentage / hundred;
        computed.min(cap).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calculator(strategy: FeeStrategy) -> FeeCalculator {
        FeeCalculator::new(FeeConfig {
            strategy,
            percentage: Decimal::new(5, 1),          // 0.5%
            dynamic_multiplier: Decimal::new(12, 1), // 1.2x
            max_fee_percentage: Decimal::new(10, 0), // 10%
        })
    }

    #[test]
    fn fixed_strategy_uses_chain_fee() {
        let calc = calculator(FeeStrategy::Fixed);
        let fee = calc.calculate(&ChainPolicy::ethereum(), Decimal::new(10, 0), None);
        assert_eq!(fee, Decimal::new(2, 3)); // 0.002 ETH
    }

    #[test]
    fn percentage_strategy() {
        let calc = calculator(FeeStrategy::Percentage);
        let fee = calc.calculate(&ChainPolicy::ethereum(), Decimal::new(10, 0), None);
        assert_eq!(fee, Decimal::new(5, 2)); // 10 * 0.5% = 0.05
    }

    #[test]
    fn dynamic_strategy_multiplies_snapshot() {
        let calc = calculator(FeeStrategy::Dynamic);
        let fee = calc.calculate(
            &ChainPolicy::ethereum(),
            Decimal::new(10, 0),
            Some(Decimal::new(1, 2)), // 0.01
        );
        assert_eq!(fee, Decimal::new(12, 3)); // 0.01 * 1.2
    }

    #[test]
    fn dynamic_strategy_falls_back_to_fixed() {
        let calc = calculator(FeeStrategy::Dynamic);
        let fee = calc.calculate(&ChainPolicy::ethereum(), Decimal::new(10, 0), None);
        assert_eq!(fee, Decimal::new(2, 3));
    }

    #[test]
    fn hybrid_takes_max_of_fixed_and_percentage() {
        let calc = calculator(FeeStrategy::Hybrid);
        // Small amount: fixed (0.002) > percentage (0.0005).
        let small = calc.calculate(&ChainPolicy::ethereum(), Decimal::new(1, 1), None);
        assert_eq!(small, Decimal::new(2, 3));
        // Large amount: percentage (0.5) > fixed (0.002).
        let large = calc.calculate(&ChainPolicy::ethereum(), Decimal::new(100, 0), None);
        assert_eq!(large, Decimal::new(5, 1));
    }

    #[test]
    fn fee_clamped_to_max_percentage() {
        // Fixed fee 0.002 on a 0.01 amount would be 20% — clamp to 10%.
        let calc = calculator(FeeStrategy::Fixed);
        let amount = Decimal::new(1, 2);
        let fee = calc.calculate(&ChainPolicy::ethereum(), amount, None);
        assert_eq!(fee, amount * Decimal::new(10, 0) / Decimal::new(100, 0));
    }

    #[test]
    fn fee_never_negative() {
        let calc = FeeCalculator::new(FeeConfig {
            strategy: FeeStrategy::Dynamic,
            percentage: Decimal::new(5, 1),
            dynamic_multiplier: Decimal::new(-1, 0), // hostile config
            max_fee_percentage: Decimal::new(10, 0),
        });
        let fee = calc.calculate(
            &ChainPolicy::ethereum(),
            Decimal::new(10, 0),
            Some(Decimal::ONE),
        );
        assert_eq!(fee, Decimal::ZERO);
    }

    #[test]
    fn deterministic_for_same_snapshot() {
        let calc = calculator(FeeStrategy::Dynamic);
        let policy = ChainPolicy::ethereum();
        let snapshot = Some(Decimal::new(3, 3));
        let a = calc.calculate(&policy, Decimal::new(7, 0), snapshot);
        let b = calc.calculate(&policy, Decimal::new(7, 0), snapshot);
        assert_eq!(a, b);
    }
}

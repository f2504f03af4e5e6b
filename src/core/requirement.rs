use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use super::error::{ConfigurationError, EngineResult};
use super::money::{Money, Rate};
use super::types::{FinancialAssumptions, HorizonMode, PersonProfile};
use super::withdrawal::annual_withdrawal;

/// Lump sum needed at retirement to fund the desired spending.
pub fn required_corpus(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    mode: HorizonMode,
) -> EngineResult<Money> {
    match mode {
        HorizonMode::FixedHorizon => fixed_horizon_requirement(profile, assumptions),
        HorizonMode::Perpetuity => perpetuity_requirement(profile, assumptions),
    }
}

/// Present value at retirement of the withdrawal stream up to the plan-to
/// age, worked backwards from the last retirement year.
///
/// Each step asks for the smallest balance that, after one year of growth,
/// still covers everything that comes later. The result is therefore exactly
/// the smallest corpus the withdrawal simulator carries to the plan-to age.
fn fixed_horizon_requirement(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
) -> EngineResult<Money> {
    let rate = assumptions.post_retirement_return;
    let mut needed = Money::ZERO;
    for year_index in (0..profile.retirement_years()).rev() {
        let withdrawal = annual_withdrawal(profile, assumptions, year_index)?;
        let carried = minimal_balance_reaching(needed, rate)?;
        needed = withdrawal.checked_add(carried, "required corpus")?;
    }
    Ok(needed)
}

/// Growing perpetuity paid at the start of each year:
/// `W0 x (1 + r) / (r - g)`, rounded up to the next minor unit.
fn perpetuity_requirement(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
) -> EngineResult<Money> {
    let post_return = assumptions.post_retirement_return;
    let growth = assumptions.withdrawal_growth();
    // A corpus that only keeps its nominal value still erodes in real terms.
    if post_return <= growth || post_return <= assumptions.inflation {
        return Err(ConfigurationError::PerpetuityImpossible {
            post_return: post_return.to_string(),
            inflation: assumptions.inflation.to_string(),
            withdrawal_growth: growth.to_string(),
        });
    }

    let first_withdrawal = annual_withdrawal(profile, assumptions, 0)?;
    let spread = post_return.as_decimal() - growth.as_decimal();
    let factor = Decimal::ONE
        .checked_add(post_return.as_decimal())
        .and_then(|numerator| numerator.checked_div(spread))
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "perpetuity corpus",
        })?;
    first_withdrawal.scale_ceil(factor, "perpetuity corpus")
}

/// Smallest non-negative balance whose one-year growth at `rate` is at least
/// `target`.
fn minimal_balance_reaching(target: Money, rate: Rate) -> EngineResult<Money> {
    if target <= Money::ZERO {
        return Ok(Money::ZERO);
    }
    let base = Decimal::ONE
        .checked_add(rate.as_decimal())
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "required corpus",
        })?;
    if base <= Decimal::ZERO {
        return Err(ConfigurationError::InvalidRate {
            field: "post-retirement return",
            reason: "must be greater than -100%".to_string(),
        });
    }

    let estimate = Decimal::from(target.minor_units())
        .checked_div(base)
        .map(|quotient| quotient.ceil())
        .and_then(|quotient| quotient.to_i64())
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "required corpus",
        })?;

    // The decimal quotient is only a starting point; half-even rounding of the
    // growth can move the true minimum by a unit either way.
    let one = Money::from_minor(1);
    let mut candidate = Money::from_minor(estimate.max(0));
    while candidate.grown_by(rate, "required corpus")? < target {
        candidate = candidate.checked_add(one, "required corpus")?;
    }
    while candidate > Money::ZERO {
        let lower = candidate.checked_sub(one, "required corpus")?;
        if lower.grown_by(rate, "required corpus")? < target {
            break;
        }
        candidate = lower;
    }
    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContributionTiming, WithdrawalIndexation};
    use crate::core::withdrawal::simulate_withdrawals;
    use rust_decimal_macros::dec;

    fn profile(current_age: u32, retirement_age: u32, plan_to_age: u32) -> PersonProfile {
        PersonProfile {
            current_age,
            retirement_age,
            plan_to_age,
        }
    }

    fn assumptions(post_return: Decimal, inflation: Decimal) -> FinancialAssumptions {
        FinancialAssumptions {
            monthly_contribution: Money::ZERO,
            contribution_step_up: Rate::ZERO,
            pre_retirement_return: Rate::ZERO,
            post_retirement_return: Rate::new(post_return),
            inflation: Rate::new(inflation),
            desired_monthly_expense: Money::from_major(100),
            existing_corpus: Money::ZERO,
            contribution_timing: ContributionTiming::StartOfYear,
            withdrawal_indexation: WithdrawalIndexation::InflationLinked,
        }
    }

    #[test]
    fn zero_rates_require_sum_of_withdrawals() {
        let required = required_corpus(
            &profile(60, 60, 62),
            &assumptions(dec!(0), dec!(0)),
            HorizonMode::FixedHorizon,
        )
        .unwrap();
        assert_eq!(required, Money::from_major(2_400));
    }

    #[test]
    fn oracle_fixed_horizon_discounts_later_withdrawals() {
        // Year 1 needs 1200.00 at its start, i.e. 1090.91 one year earlier
        // (1090.90 grows to only 1199.99). Year 0 adds its own 1200.00.
        let required = required_corpus(
            &profile(60, 60, 62),
            &assumptions(dec!(0.10), dec!(0)),
            HorizonMode::FixedHorizon,
        )
        .unwrap();
        assert_eq!(required, Money::from_minor(229_091));
    }

    #[test]
    fn expense_is_inflated_to_retirement() {
        let required = required_corpus(
            &profile(58, 60, 61),
            &assumptions(dec!(0), dec!(0.10)),
            HorizonMode::FixedHorizon,
        )
        .unwrap();
        assert_eq!(required, Money::from_minor(145_200));
    }

    #[test]
    fn required_corpus_is_the_smallest_sustainable_corpus() {
        for (post, inflation) in [
            (dec!(0.05), dec!(0.05)),
            (dec!(0.07), dec!(0.03)),
            (dec!(0.03), dec!(0.06)),
            (dec!(-0.02), dec!(0.04)),
        ] {
            let p = profile(35, 60, 85);
            let inputs = assumptions(post, inflation);
            let required = required_corpus(&p, &inputs, HorizonMode::FixedHorizon).unwrap();

            let at_required = simulate_withdrawals(required, &p, &inputs).unwrap();
            assert!(at_required.is_sustainable(), "post {post} inflation {inflation}");

            let one_short = required.checked_sub(Money::from_minor(1), "t").unwrap();
            let below = simulate_withdrawals(one_short, &p, &inputs).unwrap();
            assert!(!below.is_sustainable(), "post {post} inflation {inflation}");
        }
    }

    #[test]
    fn equal_return_and_inflation_require_flat_multiple_of_first_withdrawal() {
        let p = profile(30, 60, 85);
        let mut inputs = assumptions(dec!(0.05), dec!(0.05));
        inputs.desired_monthly_expense = Money::from_major(2_000);
        let first = annual_withdrawal(&p, &inputs, 0).unwrap();
        let required = required_corpus(&p, &inputs, HorizonMode::FixedHorizon).unwrap();
        let flat = first.minor_units() * 25;
        assert!(
            (required.minor_units() - flat).abs() <= 100,
            "required {required}, 25 x first withdrawal {}",
            Money::from_minor(flat)
        );
    }

    #[test]
    fn oracle_perpetuity_is_growing_perpetuity_due() {
        // 1200 * 1.05 / 0.03 = 42000
        let required = required_corpus(
            &profile(60, 60, 85),
            &assumptions(dec!(0.05), dec!(0.02)),
            HorizonMode::Perpetuity,
        )
        .unwrap();
        assert_eq!(required, Money::from_major(42_000));
    }

    #[test]
    fn perpetuity_rounds_up() {
        // 1200 * 1.08 / 0.07 = 18514.2857...
        let required = required_corpus(
            &profile(60, 60, 85),
            &assumptions(dec!(0.08), dec!(0.01)),
            HorizonMode::Perpetuity,
        )
        .unwrap();
        assert_eq!(required, Money::from_minor(1_851_429));
    }

    #[test]
    fn perpetuity_rejects_return_not_above_inflation() {
        for (post, inflation) in [(dec!(0.06), dec!(0.06)), (dec!(0.04), dec!(0.06))] {
            let err = required_corpus(
                &profile(30, 60, 85),
                &assumptions(post, inflation),
                HorizonMode::Perpetuity,
            )
            .expect_err("perpetuity must be rejected");
            assert!(matches!(err, ConfigurationError::PerpetuityImpossible { .. }));
        }
    }

    #[test]
    fn nominal_perpetuity_still_needs_real_return() {
        let mut inputs = assumptions(dec!(0.05), dec!(0.06));
        inputs.withdrawal_indexation = WithdrawalIndexation::Nominal;
        let err =
            required_corpus(&profile(60, 60, 85), &inputs, HorizonMode::Perpetuity).unwrap_err();
        assert!(matches!(err, ConfigurationError::PerpetuityImpossible { .. }));

        inputs.post_retirement_return = Rate::new(dec!(0.07));
        // 1200 * 1.07 / 0.07 = 18342.857..., rounded up to the cent
        let required =
            required_corpus(&profile(60, 60, 85), &inputs, HorizonMode::Perpetuity).unwrap();
        assert_eq!(required, Money::from_minor(1_834_286));
    }

    #[test]
    fn perpetuity_exceeds_fixed_horizon_requirement() {
        let p = profile(40, 60, 90);
        let inputs = assumptions(dec!(0.07), dec!(0.03));
        let fixed = required_corpus(&p, &inputs, HorizonMode::FixedHorizon).unwrap();
        let forever = required_corpus(&p, &inputs, HorizonMode::Perpetuity).unwrap();
        assert!(forever > fixed);
    }
}

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use super::accumulation::{ContributionSchedule, project_with_schedule, projected_corpus_for};
use super::error::{ConfigurationError, EngineResult};
use super::money::{Money, Rate};
use super::types::{
    CatchUpRecommendation, FinancialAssumptions, PersonProfile, RampPlan, SearchIteration,
};

/// Hard cap on candidate evaluations for one catch-up search.
pub const MAX_SEARCH_ITERATIONS: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct RampSettings {
    pub max_annual_step_up: Rate,
    pub overshoot_factor: Rate,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            max_annual_step_up: Rate::new(dec!(0.15)),
            overshoot_factor: Rate::new(dec!(1.10)),
        }
    }
}

/// Finds the smallest monthly contribution, in minor units, whose projection
/// reaches `required`.
///
/// The projected corpus never decreases as the contribution rises, so an
/// upper bound is found by doubling an initial guess of
/// `shortfall / months_to_retirement` and then narrowed by integer bisection.
pub fn solve_catch_up(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    projected: Money,
    required: Money,
) -> EngineResult<CatchUpRecommendation> {
    let shortfall = required.shortfall_from(projected);
    if shortfall.is_zero() {
        return Ok(CatchUpRecommendation::OnTrack);
    }

    let years = profile.years_to_retirement();
    if years == 0 {
        return Ok(CatchUpRecommendation::NoFeasibleSolution {
            lump_sum_top_up: shortfall,
        });
    }

    let current = assumptions.monthly_contribution;
    let months = i64::from(years) * 12;
    let mut step = Money::from_minor(ceil_div(shortfall.minor_units(), months).max(1));
    let mut iterations = Vec::new();
    let mut iteration = 0_u32;

    let mut lo = current;
    let mut hi = current.checked_add(step, "catch-up search")?;
    let mut hi_corpus = projected_corpus_for(profile, assumptions, hi)?;
    while hi_corpus < required {
        iteration += 1;
        iterations.push(SearchIteration {
            iteration,
            lower_bound: lo,
            upper_bound: hi,
            candidate: hi,
            projected_corpus: hi_corpus,
        });
        if iteration >= MAX_SEARCH_ITERATIONS {
            return Err(ConfigurationError::SearchExhausted {
                iterations: iteration,
            });
        }
        lo = hi;
        step = step.checked_add(step, "catch-up search")?;
        hi = current.checked_add(step, "catch-up search")?;
        hi_corpus = projected_corpus_for(profile, assumptions, hi)?;
    }

    while hi.minor_units() - lo.minor_units() > 1 && iteration < MAX_SEARCH_ITERATIONS {
        iteration += 1;
        let mid =
            Money::from_minor(lo.minor_units() + (hi.minor_units() - lo.minor_units()) / 2);
        let corpus = projected_corpus_for(profile, assumptions, mid)?;
        iterations.push(SearchIteration {
            iteration,
            lower_bound: lo,
            upper_bound: hi,
            candidate: mid,
            projected_corpus: corpus,
        });
        if corpus >= required {
            hi = mid;
            hi_corpus = corpus;
        } else {
            lo = mid;
        }
    }

    let converged = hi.minor_units() - lo.minor_units() <= 1;
    debug!(
        recommended = %hi,
        iterations = iteration,
        converged,
        "catch-up contribution solved"
    );

    Ok(CatchUpRecommendation::IncreaseContribution {
        recommended_monthly_contribution: hi,
        additional_monthly_contribution: hi.checked_sub(current, "catch-up search")?,
        projected_corpus_with_catch_up: hi_corpus,
        converged,
        iterations,
    })
}

/// Builds a gradual path from today's contribution toward
/// `overshoot_factor x recommended`, rising at most `max_annual_step_up` a
/// year. The path replaces the assumed step-up for its projection.
pub fn plan_ramp(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    recommended: Money,
    required: Money,
    settings: RampSettings,
) -> EngineResult<RampPlan> {
    let years = profile.years_to_retirement();
    let cap = recommended.scale(settings.overshoot_factor.as_decimal(), "ramp cap")?;

    let growth_to_retirement = settings
        .max_annual_step_up
        .compound(years, "ramp step-up")?;
    let inverse = Decimal::ONE
        .checked_div(growth_to_retirement)
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "ramp step-up",
        })?;
    let minimum_start_contribution = cap.scale_ceil(inverse, "ramp start")?;

    let step = Decimal::ONE
        .checked_add(settings.max_annual_step_up.as_decimal())
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "ramp step-up",
        })?;
    let mut yearly_contributions = Vec::with_capacity(years as usize);
    let mut monthly = assumptions.monthly_contribution;
    for _ in 0..years {
        yearly_contributions.push(monthly);
        monthly = monthly.scale(step, "ramp step-up")?.min(cap);
    }

    let schedule = ContributionSchedule::Explicit(yearly_contributions.clone());
    let projected_corpus = project_with_schedule(profile, assumptions, &schedule)?.projected_corpus;

    Ok(RampPlan {
        max_annual_step_up: settings.max_annual_step_up,
        overshoot_factor: settings.overshoot_factor,
        contribution_cap: cap,
        minimum_start_contribution,
        can_recover: assumptions.monthly_contribution >= minimum_start_contribution,
        yearly_contributions,
        projected_corpus,
        closes_gap: projected_corpus >= required,
    })
}

fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ContributionTiming, WithdrawalIndexation};
    use proptest::prelude::{prop_assert, proptest};

    fn profile(current_age: u32, retirement_age: u32) -> PersonProfile {
        PersonProfile {
            current_age,
            retirement_age,
            plan_to_age: retirement_age + 25,
        }
    }

    fn assumptions() -> FinancialAssumptions {
        FinancialAssumptions {
            monthly_contribution: Money::ZERO,
            contribution_step_up: Rate::ZERO,
            pre_retirement_return: Rate::ZERO,
            post_retirement_return: Rate::new(dec!(0.05)),
            inflation: Rate::new(dec!(0.05)),
            desired_monthly_expense: Money::from_major(1_000),
            existing_corpus: Money::ZERO,
            contribution_timing: ContributionTiming::StartOfYear,
            withdrawal_indexation: WithdrawalIndexation::InflationLinked,
        }
    }

    fn recommended(recommendation: &CatchUpRecommendation) -> Money {
        match recommendation {
            CatchUpRecommendation::IncreaseContribution {
                recommended_monthly_contribution,
                ..
            } => *recommended_monthly_contribution,
            other => panic!("expected a contribution increase, got {other:?}"),
        }
    }

    #[test]
    fn no_shortfall_is_on_track() {
        let result = solve_catch_up(
            &profile(30, 60),
            &assumptions(),
            Money::from_major(500),
            Money::from_major(500),
        )
        .unwrap();
        assert_eq!(result, CatchUpRecommendation::OnTrack);
    }

    #[test]
    fn no_accumulation_years_requires_lump_sum() {
        let result = solve_catch_up(
            &profile(60, 60),
            &assumptions(),
            Money::from_major(300),
            Money::from_major(1_000),
        )
        .unwrap();
        assert_eq!(
            result,
            CatchUpRecommendation::NoFeasibleSolution {
                lump_sum_top_up: Money::from_major(700)
            }
        );
    }

    #[test]
    fn oracle_single_year_zero_return_needs_one_twelfth_per_month() {
        let p = profile(30, 31);
        let inputs = assumptions();
        let result = solve_catch_up(&p, &inputs, Money::ZERO, Money::from_major(1_200)).unwrap();
        assert_eq!(recommended(&result), Money::from_major(100));

        let below = projected_corpus_for(&p, &inputs, Money::from_minor(9_999)).unwrap();
        assert!(below < Money::from_major(1_200));
    }

    #[test]
    fn additional_contribution_is_measured_from_current() {
        let p = profile(30, 32);
        let mut inputs = assumptions();
        inputs.monthly_contribution = Money::from_major(50);
        let projected = projected_corpus_for(&p, &inputs, inputs.monthly_contribution).unwrap();
        let result = solve_catch_up(&p, &inputs, projected, Money::from_major(2_400)).unwrap();
        match result {
            CatchUpRecommendation::IncreaseContribution {
                recommended_monthly_contribution,
                additional_monthly_contribution,
                converged,
                ref iterations,
                ..
            } => {
                assert_eq!(recommended_monthly_contribution, Money::from_major(100));
                assert_eq!(additional_monthly_contribution, Money::from_major(50));
                assert!(converged);
                assert!(iterations.len() as u32 <= MAX_SEARCH_ITERATIONS);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn negative_return_widens_search_by_doubling() {
        let p = profile(30, 40);
        let mut inputs = assumptions();
        inputs.pre_retirement_return = Rate::new(dec!(-0.30));
        let required = Money::from_major(50_000);
        let result = solve_catch_up(&p, &inputs, Money::ZERO, required).unwrap();
        let monthly = recommended(&result);
        assert!(projected_corpus_for(&p, &inputs, monthly).unwrap() >= required);
        let one_less = Money::from_minor(monthly.minor_units() - 1);
        assert!(projected_corpus_for(&p, &inputs, one_less).unwrap() < required);
    }

    #[test]
    fn oracle_ramp_path_grows_toward_cap() {
        let p = profile(30, 33);
        let mut inputs = assumptions();
        inputs.monthly_contribution = Money::from_major(100);
        let plan = plan_ramp(
            &p,
            &inputs,
            Money::from_major(200),
            Money::from_major(100_000),
            RampSettings::default(),
        )
        .unwrap();
        assert_eq!(plan.contribution_cap, Money::from_major(220));
        assert_eq!(
            plan.yearly_contributions,
            vec![
                Money::from_major(100),
                Money::from_major(115),
                Money::from_minor(13_225)
            ]
        );
        // 220 / 1.15^3 = 144.6535...
        assert_eq!(plan.minimum_start_contribution, Money::from_minor(14_466));
        assert!(!plan.can_recover);
        // 12 * (100 + 115 + 132.25) at zero return
        assert_eq!(plan.projected_corpus, Money::from_major(4_167));
        assert!(!plan.closes_gap);
    }

    #[test]
    fn ramp_is_capped() {
        let p = profile(30, 40);
        let mut inputs = assumptions();
        inputs.monthly_contribution = Money::from_major(190);
        let plan = plan_ramp(
            &p,
            &inputs,
            Money::from_major(200),
            Money::from_major(1),
            RampSettings::default(),
        )
        .unwrap();
        assert_eq!(plan.yearly_contributions[1], Money::from_minor(21_850));
        assert!(
            plan.yearly_contributions[2..]
                .iter()
                .all(|monthly| *monthly == Money::from_major(220))
        );
        assert!(plan.can_recover);
        assert!(plan.closes_gap);
    }

    proptest! {
        #[test]
        fn recommended_contribution_is_minimal_and_sufficient(
            years in 1_u32..40,
            current in 0_i64..200_000,
            existing in 0_i64..50_000_000,
            rate_bps in -300_i64..1_200,
            step_bps in 0_i64..800,
            gap in 1_i64..500_000_000,
        ) {
            let p = profile(25, 25 + years);
            let mut inputs = assumptions();
            inputs.monthly_contribution = Money::from_minor(current);
            inputs.existing_corpus = Money::from_minor(existing);
            inputs.pre_retirement_return = Rate::new(Decimal::new(rate_bps, 4));
            inputs.contribution_step_up = Rate::new(Decimal::new(step_bps, 4));

            let projected = projected_corpus_for(&p, &inputs, inputs.monthly_contribution).unwrap();
            let required = Money::from_minor(projected.minor_units() + gap);
            let result = solve_catch_up(&p, &inputs, projected, required).unwrap();
            let monthly = recommended(&result);

            prop_assert!(monthly > inputs.monthly_contribution);
            prop_assert!(projected_corpus_for(&p, &inputs, monthly).unwrap() >= required);
            let one_less = Money::from_minor(monthly.minor_units() - 1);
            prop_assert!(projected_corpus_for(&p, &inputs, one_less).unwrap() < required);
        }
    }
}

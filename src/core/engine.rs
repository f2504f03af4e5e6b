use rust_decimal::Decimal;
use tracing::{debug, warn};

use super::accumulation::project_accumulation;
use super::error::{ConfigurationError, EngineResult};
use super::money::Rate;
use super::requirement::required_corpus;
use super::solver::{RampSettings, plan_ramp, solve_catch_up};
use super::types::{
    CatchUpRecommendation, FinancialAssumptions, HorizonMode, PersonProfile, SimulationReport,
    SustainabilityResult,
};
use super::withdrawal::{annual_withdrawal, simulate_withdrawals};

pub const MAX_PLAN_AGE: u32 = 150;

/// Rejects inputs that no simulation can honour. Nothing is clamped.
pub fn validate_inputs(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
) -> EngineResult<()> {
    if profile.current_age > profile.retirement_age {
        return Err(ConfigurationError::InvalidAges {
            reason: format!(
                "current age {} is past retirement age {}",
                profile.current_age, profile.retirement_age
            ),
        });
    }
    if profile.retirement_age >= profile.plan_to_age {
        return Err(ConfigurationError::InvalidAges {
            reason: format!(
                "retirement age {} must be below plan-to age {}",
                profile.retirement_age, profile.plan_to_age
            ),
        });
    }
    if profile.plan_to_age > MAX_PLAN_AGE {
        return Err(ConfigurationError::InvalidAges {
            reason: format!("plan-to age {} exceeds {MAX_PLAN_AGE}", profile.plan_to_age),
        });
    }

    if assumptions.monthly_contribution.is_negative() {
        return Err(ConfigurationError::NegativeAmount {
            field: "monthly contribution",
        });
    }
    if assumptions.existing_corpus.is_negative() {
        return Err(ConfigurationError::NegativeAmount {
            field: "existing corpus",
        });
    }
    if assumptions.desired_monthly_expense.is_negative()
        || assumptions.desired_monthly_expense.is_zero()
    {
        return Err(ConfigurationError::NonPositiveAmount {
            field: "desired monthly expense",
        });
    }

    non_negative("contribution step-up", assumptions.contribution_step_up)?;
    non_negative("inflation", assumptions.inflation)?;
    above_total_loss("pre-retirement return", assumptions.pre_retirement_return)?;
    above_total_loss("post-retirement return", assumptions.post_retirement_return)?;
    Ok(())
}

fn non_negative(field: &'static str, rate: Rate) -> EngineResult<()> {
    if rate.is_negative() {
        return Err(ConfigurationError::InvalidRate {
            field,
            reason: format!("{rate} must not be negative"),
        });
    }
    Ok(())
}

fn above_total_loss(field: &'static str, rate: Rate) -> EngineResult<()> {
    if rate <= Rate::new(-Decimal::ONE) {
        return Err(ConfigurationError::InvalidRate {
            field,
            reason: format!("{rate} must be greater than -100%"),
        });
    }
    Ok(())
}

/// Projects savings to retirement, tests whether they last to the plan-to
/// age and, when they fall short, solves for the contribution that closes
/// the gap.
pub fn run_retirement_simulation(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    horizon_mode: HorizonMode,
) -> EngineResult<SimulationReport> {
    run_retirement_simulation_with(profile, assumptions, horizon_mode, RampSettings::default())
}

pub fn run_retirement_simulation_with(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    horizon_mode: HorizonMode,
    ramp_settings: RampSettings,
) -> EngineResult<SimulationReport> {
    validate_inputs(profile, assumptions)?;

    // Perpetuity feasibility is an input error, so it is settled before any
    // projection runs.
    let required = required_corpus(profile, assumptions, horizon_mode)?;
    let first_year_withdrawal = annual_withdrawal(profile, assumptions, 0)?;
    debug!(%required, %first_year_withdrawal, ?horizon_mode, "requirement computed");

    let accumulation = project_accumulation(profile, assumptions)?;
    let projected = accumulation.projected_corpus;
    debug!(
        %projected,
        years = accumulation.timeline.len(),
        "accumulation projected"
    );

    let withdrawal = simulate_withdrawals(projected, profile, assumptions)?;
    if let Some(depletion) = withdrawal.depletion {
        warn!(
            age = depletion.age,
            plan_to_age = profile.plan_to_age,
            "projected corpus runs out before plan-to age"
        );
    }

    let catch_up = solve_catch_up(profile, assumptions, projected, required)?;
    let (monthly_catch_up, ramp) = match &catch_up {
        CatchUpRecommendation::IncreaseContribution {
            recommended_monthly_contribution,
            additional_monthly_contribution,
            ..
        } => (
            Some(*additional_monthly_contribution),
            Some(plan_ramp(
                profile,
                assumptions,
                *recommended_monthly_contribution,
                required,
                ramp_settings,
            )?),
        ),
        CatchUpRecommendation::OnTrack | CatchUpRecommendation::NoFeasibleSolution { .. } => {
            (None, None)
        }
    };

    // Surviving the plan-to horizon is not enough for a perpetuity; the
    // corpus must also meet the perpetual requirement.
    let shortfall = required.shortfall_from(projected);
    let sustainability = SustainabilityResult {
        sustainable: withdrawal.is_sustainable() && shortfall.is_zero(),
        depletion: withdrawal.depletion,
        shortfall_at_retirement: shortfall,
        monthly_catch_up,
    };

    Ok(SimulationReport {
        profile: *profile,
        assumptions: *assumptions,
        horizon_mode,
        accumulation: accumulation.timeline,
        withdrawal: withdrawal.timeline,
        first_year_withdrawal,
        required_corpus: required,
        projected_corpus: projected,
        sustainability,
        catch_up,
        ramp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::accumulation::projected_corpus_for;
    use crate::core::money::Money;
    use crate::core::types::{ContributionTiming, WithdrawalIndexation};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};
    use rust_decimal_macros::dec;

    fn profile() -> PersonProfile {
        PersonProfile {
            current_age: 30,
            retirement_age: 60,
            plan_to_age: 85,
        }
    }

    fn assumptions() -> FinancialAssumptions {
        FinancialAssumptions {
            monthly_contribution: Money::from_major(500),
            contribution_step_up: Rate::ZERO,
            pre_retirement_return: Rate::new(dec!(0.08)),
            post_retirement_return: Rate::new(dec!(0.05)),
            inflation: Rate::new(dec!(0.05)),
            desired_monthly_expense: Money::from_major(2_000),
            existing_corpus: Money::ZERO,
            contribution_timing: ContributionTiming::StartOfYear,
            withdrawal_indexation: WithdrawalIndexation::InflationLinked,
        }
    }

    #[test]
    fn reference_scenario_reports_shortfall_and_catch_up() {
        let report =
            run_retirement_simulation(&profile(), &assumptions(), HorizonMode::FixedHorizon)
                .expect("valid scenario");

        assert_eq!(report.accumulation.len(), 30);
        assert!(!report.projected_corpus.is_negative());
        assert!(report.required_corpus > report.projected_corpus);
        assert!(!report.sustainability.sustainable);
        assert!(report.withdrawal.len() <= 25);
        assert_eq!(
            report.sustainability.shortfall_at_retirement,
            report.required_corpus.shortfall_from(report.projected_corpus)
        );
        assert!(report.sustainability.monthly_catch_up.is_some());
        assert!(report.ramp.is_some());

        match &report.catch_up {
            CatchUpRecommendation::IncreaseContribution {
                recommended_monthly_contribution,
                converged,
                ..
            } => {
                assert!(*converged);
                let with_catch_up =
                    projected_corpus_for(&profile(), &assumptions(), *recommended_monthly_contribution)
                        .unwrap();
                assert!(with_catch_up >= report.required_corpus);
            }
            other => panic!("expected a contribution increase, got {other:?}"),
        }
    }

    #[test]
    fn reference_scenario_is_reproducible() {
        let first =
            run_retirement_simulation(&profile(), &assumptions(), HorizonMode::FixedHorizon)
                .unwrap();
        let second =
            run_retirement_simulation(&profile(), &assumptions(), HorizonMode::FixedHorizon)
                .unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn retiring_now_has_empty_accumulation_and_lump_sum_gap() {
        let p = PersonProfile {
            current_age: 60,
            retirement_age: 60,
            plan_to_age: 85,
        };
        let mut inputs = assumptions();
        inputs.existing_corpus = Money::from_major(100_000);
        let report = run_retirement_simulation(&p, &inputs, HorizonMode::FixedHorizon).unwrap();

        assert!(report.accumulation.is_empty());
        assert_eq!(report.projected_corpus, Money::from_major(100_000));
        assert_eq!(
            report.catch_up,
            CatchUpRecommendation::NoFeasibleSolution {
                lump_sum_top_up: report.required_corpus.shortfall_from(report.projected_corpus)
            }
        );
        assert_eq!(report.sustainability.monthly_catch_up, None);
        assert_eq!(report.ramp, None);
    }

    #[test]
    fn well_funded_plan_is_on_track() {
        let mut inputs = assumptions();
        inputs.existing_corpus = Money::from_major(5_000_000);
        let report =
            run_retirement_simulation(&profile(), &inputs, HorizonMode::FixedHorizon).unwrap();
        assert!(report.sustainability.sustainable);
        assert_eq!(report.sustainability.shortfall_at_retirement, Money::ZERO);
        assert_eq!(report.catch_up, CatchUpRecommendation::OnTrack);
        assert_eq!(report.withdrawal.len(), 25);
    }

    #[test]
    fn perpetuity_without_real_return_is_rejected() {
        let mut inputs = assumptions();
        inputs.post_retirement_return = Rate::new(dec!(0.06));
        inputs.inflation = Rate::new(dec!(0.06));
        let err = run_retirement_simulation(&profile(), &inputs, HorizonMode::Perpetuity)
            .expect_err("perpetuity must be rejected");
        assert!(matches!(err, ConfigurationError::PerpetuityImpossible { .. }));
    }

    fn perpetuity_scenario(existing_corpus: i64) -> (PersonProfile, FinancialAssumptions) {
        let profile = PersonProfile {
            current_age: 60,
            retirement_age: 60,
            plan_to_age: 85,
        };
        let assumptions = FinancialAssumptions {
            monthly_contribution: Money::ZERO,
            post_retirement_return: Rate::new(dec!(0.07)),
            inflation: Rate::new(dec!(0.03)),
            desired_monthly_expense: Money::from_major(1_000),
            existing_corpus: Money::from_major(existing_corpus),
            ..assumptions()
        };
        (profile, assumptions)
    }

    #[test]
    fn perpetuity_shortfall_is_never_reported_sustainable() {
        let (profile, inputs) = perpetuity_scenario(250_000);
        let report = run_retirement_simulation(&profile, &inputs, HorizonMode::Perpetuity)
            .expect("valid scenario");

        // 12000 * 1.07 / 0.04
        assert_eq!(report.required_corpus, Money::from_major(321_000));
        assert_eq!(report.projected_corpus, Money::from_major(250_000));
        // The finite timeline alone survives to the plan-to age.
        assert!(report.sustainability.depletion.is_none());
        assert!(!report.sustainability.sustainable);
        assert_eq!(
            report.sustainability.shortfall_at_retirement,
            Money::from_major(71_000)
        );
        assert_eq!(
            report.catch_up,
            CatchUpRecommendation::NoFeasibleSolution {
                lump_sum_top_up: Money::from_major(71_000)
            }
        );
    }

    #[test]
    fn funded_perpetuity_is_sustainable() {
        let (profile, inputs) = perpetuity_scenario(400_000);
        let report = run_retirement_simulation(&profile, &inputs, HorizonMode::Perpetuity)
            .expect("valid scenario");

        assert!(report.sustainability.sustainable);
        assert!(report.sustainability.shortfall_at_retirement.is_zero());
        assert_eq!(report.catch_up, CatchUpRecommendation::OnTrack);
    }

    #[test]
    fn invalid_ages_are_rejected() {
        let mut p = profile();
        p.current_age = 61;
        assert!(matches!(
            run_retirement_simulation(&p, &assumptions(), HorizonMode::FixedHorizon),
            Err(ConfigurationError::InvalidAges { .. })
        ));

        let mut p = profile();
        p.plan_to_age = 60;
        assert!(matches!(
            run_retirement_simulation(&p, &assumptions(), HorizonMode::FixedHorizon),
            Err(ConfigurationError::InvalidAges { .. })
        ));
    }

    #[test]
    fn invalid_amounts_and_rates_are_rejected() {
        let mut inputs = assumptions();
        inputs.monthly_contribution = Money::from_major(-1);
        assert_eq!(
            validate_inputs(&profile(), &inputs),
            Err(ConfigurationError::NegativeAmount {
                field: "monthly contribution"
            })
        );

        let mut inputs = assumptions();
        inputs.desired_monthly_expense = Money::ZERO;
        assert_eq!(
            validate_inputs(&profile(), &inputs),
            Err(ConfigurationError::NonPositiveAmount {
                field: "desired monthly expense"
            })
        );

        let mut inputs = assumptions();
        inputs.post_retirement_return = Rate::new(dec!(-1));
        assert!(matches!(
            validate_inputs(&profile(), &inputs),
            Err(ConfigurationError::InvalidRate { .. })
        ));

        let mut inputs = assumptions();
        inputs.inflation = Rate::new(dec!(-0.01));
        assert!(matches!(
            validate_inputs(&profile(), &inputs),
            Err(ConfigurationError::InvalidRate { .. })
        ));
    }

    #[test]
    fn absurd_growth_reports_overflow() {
        let mut inputs = assumptions();
        inputs.pre_retirement_return = Rate::new(dec!(50));
        let err = run_retirement_simulation(&profile(), &inputs, HorizonMode::FixedHorizon)
            .expect_err("must overflow");
        assert!(matches!(err, ConfigurationError::NumericOverflow { .. }));
    }

    proptest! {
        #[test]
        fn fixed_horizon_verdict_matches_shortfall(
            current_age in 20_u32..60,
            years_to_retirement in 0_u32..30,
            retirement_years in 1_u32..35,
            monthly in 0_i64..500_000,
            existing in 0_i64..100_000_000,
            pre_bps in -200_i64..1_200,
            post_bps in -200_i64..900,
            inflation_bps in 0_i64..700,
            expense in 1_i64..1_000_000,
        ) {
            let p = PersonProfile {
                current_age,
                retirement_age: current_age + years_to_retirement,
                plan_to_age: current_age + years_to_retirement + retirement_years,
            };
            let mut inputs = assumptions();
            inputs.monthly_contribution = Money::from_minor(monthly);
            inputs.existing_corpus = Money::from_minor(existing);
            inputs.pre_retirement_return = Rate::new(Decimal::new(pre_bps, 4));
            inputs.post_retirement_return = Rate::new(Decimal::new(post_bps, 4));
            inputs.inflation = Rate::new(Decimal::new(inflation_bps, 4));
            inputs.desired_monthly_expense = Money::from_minor(expense);

            let report = run_retirement_simulation(&p, &inputs, HorizonMode::FixedHorizon).unwrap();
            prop_assert_eq!(
                report.sustainability.sustainable,
                report.sustainability.shortfall_at_retirement.is_zero()
            );
            prop_assert!(!report.projected_corpus.is_negative());
            prop_assert_eq!(report.accumulation.len() as u32, years_to_retirement);
        }

        #[test]
        fn recommended_contribution_fed_back_is_on_track(
            years_to_retirement in 1_u32..35,
            monthly in 0_i64..200_000,
            pre_bps in 0_i64..1_000,
            inflation_bps in 0_i64..500,
        ) {
            let p = PersonProfile {
                current_age: 30,
                retirement_age: 30 + years_to_retirement,
                plan_to_age: 30 + years_to_retirement + 25,
            };
            let mut inputs = assumptions();
            inputs.monthly_contribution = Money::from_minor(monthly);
            inputs.pre_retirement_return = Rate::new(Decimal::new(pre_bps, 4));
            inputs.inflation = Rate::new(Decimal::new(inflation_bps, 4));

            let report = run_retirement_simulation(&p, &inputs, HorizonMode::FixedHorizon).unwrap();
            if let CatchUpRecommendation::IncreaseContribution {
                recommended_monthly_contribution, ..
            } = report.catch_up {
                inputs.monthly_contribution = recommended_monthly_contribution;
                let again = run_retirement_simulation(&p, &inputs, HorizonMode::FixedHorizon).unwrap();
                prop_assert!(again.projected_corpus >= again.required_corpus);
                prop_assert!(again.sustainability.sustainable);
                prop_assert_eq!(again.catch_up, CatchUpRecommendation::OnTrack);
            }
        }
    }
}

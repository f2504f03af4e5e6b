use rust_decimal::Decimal;

use super::error::{ConfigurationError, EngineResult};
use super::money::{Money, Rate};
use super::types::{
    AccumulationProjection, ContributionTiming, FinancialAssumptions, PersonProfile,
    YearProjection,
};

const MONTHS_PER_YEAR: i64 = 12;

/// Where monthly contributions come from during accumulation.
#[derive(Clone, Debug)]
pub enum ContributionSchedule {
    /// A base monthly amount raised every year by `step_up`.
    SteppedUp { monthly: Money, step_up: Rate },
    /// An explicit monthly amount per accumulation year; missing years
    /// contribute nothing.
    Explicit(Vec<Money>),
}

impl ContributionSchedule {
    pub fn from_assumptions(assumptions: &FinancialAssumptions) -> Self {
        Self::SteppedUp {
            monthly: assumptions.monthly_contribution,
            step_up: assumptions.contribution_step_up,
        }
    }

    fn annual_contribution(&self, year_index: u32) -> EngineResult<Money> {
        match self {
            Self::SteppedUp { monthly, step_up } => {
                let factor = step_up
                    .compound(year_index, "contribution step-up")?
                    .checked_mul(Decimal::from(MONTHS_PER_YEAR))
                    .ok_or(ConfigurationError::NumericOverflow {
                        stage: "contribution step-up",
                    })?;
                monthly.scale(factor, "annual contribution")
            }
            Self::Explicit(monthly) => monthly
                .get(year_index as usize)
                .copied()
                .unwrap_or(Money::ZERO)
                .scale(Decimal::from(MONTHS_PER_YEAR), "annual contribution"),
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct YearState {
    year_index: u32,
    age: u32,
    balance: Money,
}

impl YearState {
    fn advance(self, projection: &YearProjection) -> Self {
        Self {
            year_index: self.year_index + 1,
            age: self.age + 1,
            balance: projection.closing_balance,
        }
    }
}

/// Projects the corpus from today to retirement using the assumptions'
/// stepped-up contribution.
pub fn project_accumulation(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
) -> EngineResult<AccumulationProjection> {
    project_with_schedule(
        profile,
        assumptions,
        &ContributionSchedule::from_assumptions(assumptions),
    )
}

/// Corpus at retirement if the monthly contribution were `monthly` and
/// everything else stayed as assumed.
pub fn projected_corpus_for(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    monthly: Money,
) -> EngineResult<Money> {
    let schedule = ContributionSchedule::SteppedUp {
        monthly,
        step_up: assumptions.contribution_step_up,
    };
    Ok(project_with_schedule(profile, assumptions, &schedule)?.projected_corpus)
}

pub fn project_with_schedule(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    schedule: &ContributionSchedule,
) -> EngineResult<AccumulationProjection> {
    let years = profile.years_to_retirement();
    let mut timeline = Vec::with_capacity(years as usize);
    let mut state = YearState {
        year_index: 0,
        age: profile.current_age,
        balance: assumptions.existing_corpus,
    };

    while state.age < profile.retirement_age {
        let contribution = schedule.annual_contribution(state.year_index)?;
        let year = accumulate_year(
            state,
            contribution,
            assumptions.pre_retirement_return,
            assumptions.contribution_timing,
        )?;
        state = state.advance(&year);
        timeline.push(year);
    }

    Ok(AccumulationProjection {
        timeline,
        projected_corpus: state.balance,
    })
}

fn accumulate_year(
    state: YearState,
    contribution: Money,
    rate: Rate,
    timing: ContributionTiming,
) -> EngineResult<YearProjection> {
    let opening = state.balance;
    let (growth, closing) = match timing {
        ContributionTiming::StartOfYear => {
            let invested = opening.checked_add(contribution, "accumulation")?;
            let growth = invested.growth_at(rate, "accumulation growth")?;
            (growth, invested.checked_add(growth, "accumulation")?)
        }
        ContributionTiming::EndOfYear => {
            let growth = opening.growth_at(rate, "accumulation growth")?;
            let grown = opening.checked_add(growth, "accumulation")?;
            (growth, grown.checked_add(contribution, "accumulation")?)
        }
    };

    Ok(YearProjection {
        year_index: state.year_index,
        age: state.age,
        opening_balance: opening,
        contribution,
        withdrawal: Money::ZERO,
        growth,
        closing_balance: closing,
    })
}

use serde::{Deserialize, Serialize};

use super::money::{Money, Rate};

/// Whether the year's contribution is invested before or after that year's
/// growth is credited.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributionTiming {
    /// closing = (opening + contribution) x (1 + return)
    #[default]
    StartOfYear,
    /// closing = opening x (1 + return) + contribution
    EndOfYear,
}

/// How retirement withdrawals evolve once retirement begins.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalIndexation {
    /// Withdrawals rise with inflation every retirement year.
    #[default]
    InflationLinked,
    /// Withdrawals stay at the retirement-date amount.
    Nominal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HorizonMode {
    FixedHorizon,
    Perpetuity,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonProfile {
    pub current_age: u32,
    pub retirement_age: u32,
    pub plan_to_age: u32,
}

impl PersonProfile {
    pub fn years_to_retirement(&self) -> u32 {
        self.retirement_age.saturating_sub(self.current_age)
    }

    pub fn retirement_years(&self) -> u32 {
        self.plan_to_age.saturating_sub(self.retirement_age)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialAssumptions {
    pub monthly_contribution: Money,
    pub contribution_step_up: Rate,
    pub pre_retirement_return: Rate,
    pub post_retirement_return: Rate,
    pub inflation: Rate,
    /// Desired monthly spending, in today's currency.
    pub desired_monthly_expense: Money,
    pub existing_corpus: Money,
    pub contribution_timing: ContributionTiming,
    pub withdrawal_indexation: WithdrawalIndexation,
}

impl FinancialAssumptions {
    /// Annual growth rate of withdrawals during retirement.
    pub fn withdrawal_growth(&self) -> Rate {
        match self.withdrawal_indexation {
            WithdrawalIndexation::InflationLinked => self.inflation,
            WithdrawalIndexation::Nominal => Rate::ZERO,
        }
    }
}

/// One simulated year. Accumulation years carry a contribution and a zero
/// withdrawal; retirement years the reverse.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearProjection {
    pub year_index: u32,
    pub age: u32,
    pub opening_balance: Money,
    pub contribution: Money,
    pub withdrawal: Money,
    pub growth: Money,
    pub closing_balance: Money,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AccumulationProjection {
    pub timeline: Vec<YearProjection>,
    pub projected_corpus: Money,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Depletion {
    /// Retirement year (0-based) whose withdrawal could not be met in full.
    pub year_index: u32,
    pub age: u32,
    /// Portion of that year's withdrawal left unpaid.
    pub unmet_withdrawal: Money,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WithdrawalProjection {
    pub timeline: Vec<YearProjection>,
    pub depletion: Option<Depletion>,
}

impl WithdrawalProjection {
    pub fn is_sustainable(&self) -> bool {
        self.depletion.is_none()
    }

    pub fn terminal_balance(&self) -> Money {
        self.timeline
            .last()
            .map(|year| year.closing_balance)
            .unwrap_or(Money::ZERO)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SustainabilityResult {
    /// The projected corpus survives every planned withdrawal and meets the
    /// horizon mode's requirement.
    pub sustainable: bool,
    pub depletion: Option<Depletion>,
    /// Required minus projected corpus at retirement, floored at zero.
    pub shortfall_at_retirement: Money,
    /// Extra monthly contribution that closes the shortfall; `None` when
    /// there is no shortfall or no accumulation years remain.
    pub monthly_catch_up: Option<Money>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchIteration {
    pub iteration: u32,
    pub lower_bound: Money,
    pub upper_bound: Money,
    pub candidate: Money,
    pub projected_corpus: Money,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(
    tag = "kind",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum CatchUpRecommendation {
    OnTrack,
    IncreaseContribution {
        recommended_monthly_contribution: Money,
        additional_monthly_contribution: Money,
        projected_corpus_with_catch_up: Money,
        converged: bool,
        iterations: Vec<SearchIteration>,
    },
    /// No accumulation years remain; only a lump sum closes the gap.
    NoFeasibleSolution { lump_sum_top_up: Money },
}

/// A gradual catch-up: the contribution climbs from today's amount toward a
/// cap slightly above the recommended contribution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RampPlan {
    pub max_annual_step_up: Rate,
    pub overshoot_factor: Rate,
    pub contribution_cap: Money,
    /// Smallest starting contribution that reaches the cap by retirement.
    pub minimum_start_contribution: Money,
    pub can_recover: bool,
    pub yearly_contributions: Vec<Money>,
    pub projected_corpus: Money,
    pub closes_gap: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationReport {
    pub profile: PersonProfile,
    pub assumptions: FinancialAssumptions,
    pub horizon_mode: HorizonMode,
    pub accumulation: Vec<YearProjection>,
    pub withdrawal: Vec<YearProjection>,
    /// Annual withdrawal in the first retirement year.
    pub first_year_withdrawal: Money,
    pub required_corpus: Money,
    pub projected_corpus: Money,
    pub sustainability: SustainabilityResult,
    pub catch_up: CatchUpRecommendation,
    pub ramp: Option<RampPlan>,
}

use rust_decimal::Decimal;
use tracing::debug;

use super::error::{ConfigurationError, EngineResult};
use super::money::Money;
use super::types::{
    Depletion, FinancialAssumptions, PersonProfile, WithdrawalProjection, YearProjection,
};

/// Annual withdrawal for retirement year `year_index` (0 = the retirement
/// year), in that year's currency.
///
/// The desired expense is quoted in today's currency, so it is inflated over
/// the years to retirement and then grown by the withdrawal indexation.
pub fn annual_withdrawal(
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
    year_index: u32,
) -> EngineResult<Money> {
    let to_retirement = assumptions
        .inflation
        .compound(profile.years_to_retirement(), "inflation to retirement")?;
    let in_retirement = assumptions
        .withdrawal_growth()
        .compound(year_index, "withdrawal growth")?;
    let factor = to_retirement
        .checked_mul(in_retirement)
        .and_then(|f| f.checked_mul(Decimal::from(12)))
        .ok_or(ConfigurationError::NumericOverflow {
            stage: "annual withdrawal",
        })?;
    assumptions
        .desired_monthly_expense
        .scale(factor, "annual withdrawal")
}

#[derive(Copy, Clone, Debug)]
enum RetirementState {
    Drawing {
        year_index: u32,
        age: u32,
        balance: Money,
    },
    Exhausted(Depletion),
    Complete,
}

/// Runs the retirement phase from `corpus`: each year the withdrawal is taken
/// first and the remainder earns the post-retirement return.
///
/// The first year whose opening balance cannot cover its withdrawal is the
/// depletion year. That year is recorded with the balance drawn to zero and
/// the timeline stops there.
pub fn simulate_withdrawals(
    corpus: Money,
    profile: &PersonProfile,
    assumptions: &FinancialAssumptions,
) -> EngineResult<WithdrawalProjection> {
    let rate = assumptions.post_retirement_return;
    let mut timeline = Vec::with_capacity(profile.retirement_years() as usize);
    let mut state = RetirementState::Drawing {
        year_index: 0,
        age: profile.retirement_age,
        balance: corpus,
    };

    loop {
        state = match state {
            RetirementState::Drawing { age, .. } if age >= profile.plan_to_age => {
                RetirementState::Complete
            }
            RetirementState::Drawing {
                year_index,
                age,
                balance,
            } => {
                let withdrawal = annual_withdrawal(profile, assumptions, year_index)?;
                if balance < withdrawal {
                    timeline.push(YearProjection {
                        year_index,
                        age,
                        opening_balance: balance,
                        contribution: Money::ZERO,
                        withdrawal: balance,
                        growth: Money::ZERO,
                        closing_balance: Money::ZERO,
                    });
                    RetirementState::Exhausted(Depletion {
                        year_index,
                        age,
                        unmet_withdrawal: withdrawal.checked_sub(balance, "unmet withdrawal")?,
                    })
                } else {
                    let remaining = balance.checked_sub(withdrawal, "withdrawal")?;
                    let growth = remaining.growth_at(rate, "retirement growth")?;
                    let closing = remaining.checked_add(growth, "retirement growth")?;
                    timeline.push(YearProjection {
                        year_index,
                        age,
                        opening_balance: balance,
                        contribution: Money::ZERO,
                        withdrawal,
                        growth,
                        closing_balance: closing,
                    });
                    RetirementState::Drawing {
                        year_index: year_index + 1,
                        age: age + 1,
                        balance: closing,
                    }
                }
            }
            RetirementState::Exhausted(depletion) => {
                debug!(
                    age = depletion.age,
                    unmet = %depletion.unmet_withdrawal,
                    "corpus depleted before plan-to age"
                );
                return Ok(WithdrawalProjection {
                    timeline,
                    depletion: Some(depletion),
                });
            }
            RetirementState::Complete => {
                return Ok(WithdrawalProjection {
                    timeline,
                    depletion: None,
                });
            }
        };
    }
}

//! Rule-table estimate of life and health cover.
//!
//! Stateless and independent of the retirement engine; it only shares the
//! money type so amounts round the same way.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::error::{ConfigurationError, EngineResult};
use super::money::Money;

const PREMIUM_UNIT: i64 = 1_000_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CityTier {
    #[serde(alias = "Tier_1", alias = "tier-1", alias = "1")]
    Tier1,
    #[serde(alias = "Tier_2", alias = "tier-2", alias = "2")]
    Tier2,
    #[serde(alias = "Tier_3", alias = "tier-3", alias = "3")]
    Tier3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifestyleRisk {
    Smoking,
    Sedentary,
    #[serde(alias = "high_stress", alias = "highStress")]
    HighStress,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageStatus {
    Adequate,
    Underinsured,
}

/// Annual premium band, in whole currency units.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct PremiumRange {
    pub low: Money,
    pub high: Money,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EstimatedPremiums {
    pub life: PremiumRange,
    pub health: PremiumRange,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceRecommendation {
    pub recommended_life_cover: Money,
    pub recommended_health_cover: Money,
    pub estimated_premium_range: EstimatedPremiums,
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceProfile {
    pub age: u32,
    pub annual_income: Money,
    pub dependents: u32,
    #[serde(default)]
    pub existing_life_cover: Money,
    #[serde(default)]
    pub existing_health_cover: Money,
    pub city_tier: CityTier,
    #[serde(default)]
    pub lifestyle_risks: Vec<LifestyleRisk>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageAssessment {
    pub required_life_cover: Money,
    pub required_health_cover: Money,
    pub life_gap: Money,
    pub health_gap: Money,
    pub life_status: CoverageStatus,
    pub health_status: CoverageStatus,
    pub life_premium: PremiumRange,
    pub health_premium: PremiumRange,
}

/// Recommended cover for someone with no existing policies, with the premium
/// band for buying all of it.
pub fn estimate_insurance_adequacy(
    annual_income: Money,
    dependents: u32,
    age: u32,
    lifestyle: &[LifestyleRisk],
    city_tier: CityTier,
) -> EngineResult<InsuranceRecommendation> {
    if annual_income.is_negative() {
        return Err(ConfigurationError::NegativeAmount {
            field: "annual income",
        });
    }
    let life = required_life_cover(annual_income, dependents)?;
    let health = required_health_cover(age, dependents, city_tier, lifestyle)?;
    Ok(InsuranceRecommendation {
        recommended_life_cover: life,
        recommended_health_cover: health,
        estimated_premium_range: EstimatedPremiums {
            life: life_premium(life, age)?,
            health: health_premium(health, age)?,
        },
    })
}

/// Compares recommended cover with what is already held and prices only the
/// gap.
pub fn assess_coverage(profile: &InsuranceProfile) -> EngineResult<CoverageAssessment> {
    for (field, amount) in [
        ("annual income", profile.annual_income),
        ("existing life cover", profile.existing_life_cover),
        ("existing health cover", profile.existing_health_cover),
    ] {
        if amount.is_negative() {
            return Err(ConfigurationError::NegativeAmount { field });
        }
    }

    let required_life = required_life_cover(profile.annual_income, profile.dependents)?;
    let required_health = required_health_cover(
        profile.age,
        profile.dependents,
        profile.city_tier,
        &profile.lifestyle_risks,
    )?;
    let life_gap = required_life.shortfall_from(profile.existing_life_cover);
    let health_gap = required_health.shortfall_from(profile.existing_health_cover);

    Ok(CoverageAssessment {
        required_life_cover: required_life,
        required_health_cover: required_health,
        life_gap,
        health_gap,
        life_status: status(life_gap),
        health_status: status(health_gap),
        life_premium: life_premium(life_gap, profile.age)?,
        health_premium: health_premium(health_gap, profile.age)?,
    })
}

fn status(gap: Money) -> CoverageStatus {
    if gap.is_zero() {
        CoverageStatus::Adequate
    } else {
        CoverageStatus::Underinsured
    }
}

fn required_life_cover(annual_income: Money, dependents: u32) -> EngineResult<Money> {
    let multiple = match dependents {
        0 => 10,
        1 | 2 => 12,
        _ => 15,
    };
    annual_income.scale(Decimal::from(multiple), "life cover")
}

fn required_health_cover(
    age: u32,
    dependents: u32,
    city_tier: CityTier,
    lifestyle: &[LifestyleRisk],
) -> EngineResult<Money> {
    let mut cover = match age {
        0..=29 => 1_000_000,
        30..=45 => 1_500_000,
        _ => 2_500_000,
    };
    if dependents >= 2 {
        cover += 500_000;
    }
    cover += match city_tier {
        CityTier::Tier1 => 500_000,
        CityTier::Tier2 => 250_000,
        CityTier::Tier3 => 0,
    };
    for (risk, loading) in [
        (LifestyleRisk::Smoking, 500_000),
        (LifestyleRisk::Sedentary, 250_000),
        (LifestyleRisk::HighStress, 250_000),
    ] {
        if lifestyle.contains(&risk) {
            cover += loading;
        }
    }
    Ok(Money::from_major(cover))
}

fn life_premium(gap: Money, age: u32) -> EngineResult<PremiumRange> {
    let (low, high) = match age {
        0..=29 => (500, 800),
        30..=45 => (800, 1_200),
        _ => (1_500, 2_500),
    };
    premium_range(gap, low, high)
}

fn health_premium(gap: Money, age: u32) -> EngineResult<PremiumRange> {
    let (low, high) = match age {
        0..=29 => (6_000, 8_000),
        30..=45 => (8_000, 12_000),
        _ => (15_000, 25_000),
    };
    premium_range(gap, low, high)
}

/// Rates are quoted per million of cover; premiums round to whole units.
fn premium_range(gap: Money, low_rate: i64, high_rate: i64) -> EngineResult<PremiumRange> {
    if gap <= Money::ZERO {
        return Ok(PremiumRange::default());
    }
    Ok(PremiumRange {
        low: premium(gap, low_rate)?,
        high: premium(gap, high_rate)?,
    })
}

fn premium(gap: Money, rate_per_unit: i64) -> EngineResult<Money> {
    let factor = Decimal::from(rate_per_unit) / Decimal::from(PREMIUM_UNIT);
    let whole_units = gap
        .to_decimal()
        .checked_mul(factor)
        .ok_or(ConfigurationError::NumericOverflow { stage: "premium" })?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven);
    Money::from_decimal(whole_units)
}

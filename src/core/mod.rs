mod accumulation;
mod engine;
mod error;
mod insurance;
mod money;
mod requirement;
mod risk;
mod solver;
mod types;
mod withdrawal;

pub use accumulation::{
    ContributionSchedule, project_accumulation, project_with_schedule, projected_corpus_for,
};
pub use engine::{
    MAX_PLAN_AGE, run_retirement_simulation, run_retirement_simulation_with, validate_inputs,
};
pub use error::{ConfigurationError, EngineResult};
pub use insurance::{
    CityTier, CoverageAssessment, CoverageStatus, EstimatedPremiums, InsuranceProfile,
    InsuranceRecommendation, LifestyleRisk, PremiumRange, assess_coverage,
    estimate_insurance_adequacy,
};
pub use money::{MONEY_LIMIT_MINOR, Money, Rate};
pub use requirement::required_corpus;
pub use risk::{
    AssetAllocation, AssetClass, RiskAdvice, RiskLevel, advise, allocate, blended_risk,
    portfolio_return, system_risk_level,
};
pub use solver::{MAX_SEARCH_ITERATIONS, RampSettings, plan_ramp, solve_catch_up};
pub use types::{
    AccumulationProjection, CatchUpRecommendation, ContributionTiming, Depletion,
    FinancialAssumptions, HorizonMode, PersonProfile, RampPlan, SearchIteration,
    SimulationReport, SustainabilityResult, WithdrawalIndexation, WithdrawalProjection,
    YearProjection,
};
pub use withdrawal::{annual_withdrawal, simulate_withdrawals};

use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CatchUpRecommendation, CityTier, ContributionTiming, CoverageAssessment,
    FinancialAssumptions, HorizonMode, InsuranceProfile, InsuranceRecommendation, LifestyleRisk,
    Money, PersonProfile, RampSettings, Rate, RiskAdvice, RiskLevel, SimulationReport,
    WithdrawalIndexation, advise, assess_coverage, blended_risk, estimate_insurance_adequacy,
    portfolio_return, run_retirement_simulation_with, system_risk_level,
};

const TOTAL_LOSS_PERCENT: Decimal = dec!(-100);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliContributionTiming {
    StartOfYear,
    EndOfYear,
}

impl From<CliContributionTiming> for ContributionTiming {
    fn from(value: CliContributionTiming) -> Self {
        match value {
            CliContributionTiming::StartOfYear => ContributionTiming::StartOfYear,
            CliContributionTiming::EndOfYear => ContributionTiming::EndOfYear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliWithdrawalIndexation {
    InflationLinked,
    Nominal,
}

impl From<CliWithdrawalIndexation> for WithdrawalIndexation {
    fn from(value: CliWithdrawalIndexation) -> Self {
        match value {
            CliWithdrawalIndexation::InflationLinked => WithdrawalIndexation::InflationLinked,
            CliWithdrawalIndexation::Nominal => WithdrawalIndexation::Nominal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliHorizonMode {
    FixedHorizon,
    Perpetuity,
}

impl From<CliHorizonMode> for HorizonMode {
    fn from(value: CliHorizonMode) -> Self {
        match value {
            CliHorizonMode::FixedHorizon => HorizonMode::FixedHorizon,
            CliHorizonMode::Perpetuity => HorizonMode::Perpetuity,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliCityTier {
    #[value(alias = "1")]
    Tier1,
    #[value(alias = "2")]
    Tier2,
    #[value(alias = "3")]
    Tier3,
}

impl From<CliCityTier> for CityTier {
    fn from(value: CliCityTier) -> Self {
        match value {
            CliCityTier::Tier1 => CityTier::Tier1,
            CliCityTier::Tier2 => CityTier::Tier2,
            CliCityTier::Tier3 => CityTier::Tier3,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLifestyleRisk {
    Smoking,
    Sedentary,
    HighStress,
}

impl From<CliLifestyleRisk> for LifestyleRisk {
    fn from(value: CliLifestyleRisk) -> Self {
        match value {
            CliLifestyleRisk::Smoking => LifestyleRisk::Smoking,
            CliLifestyleRisk::Sedentary => LifestyleRisk::Sedentary,
            CliLifestyleRisk::HighStress => LifestyleRisk::HighStress,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiContributionTiming {
    #[serde(alias = "startOfYear", alias = "start_of_year", alias = "start")]
    StartOfYear,
    #[serde(alias = "endOfYear", alias = "end_of_year", alias = "end")]
    EndOfYear,
}

impl From<ApiContributionTiming> for CliContributionTiming {
    fn from(value: ApiContributionTiming) -> Self {
        match value {
            ApiContributionTiming::StartOfYear => CliContributionTiming::StartOfYear,
            ApiContributionTiming::EndOfYear => CliContributionTiming::EndOfYear,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiWithdrawalIndexation {
    #[serde(alias = "inflationLinked", alias = "inflation_linked", alias = "real")]
    InflationLinked,
    #[serde(alias = "flat")]
    Nominal,
}

impl From<ApiWithdrawalIndexation> for CliWithdrawalIndexation {
    fn from(value: ApiWithdrawalIndexation) -> Self {
        match value {
            ApiWithdrawalIndexation::InflationLinked => CliWithdrawalIndexation::InflationLinked,
            ApiWithdrawalIndexation::Nominal => CliWithdrawalIndexation::Nominal,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiHorizonMode {
    #[serde(alias = "fixedHorizon", alias = "fixed_horizon", alias = "FIXED_HORIZON")]
    FixedHorizon,
    #[serde(alias = "PERPETUITY")]
    Perpetuity,
}

impl From<ApiHorizonMode> for CliHorizonMode {
    fn from(value: ApiHorizonMode) -> Self {
        match value {
            ApiHorizonMode::FixedHorizon => CliHorizonMode::FixedHorizon,
            ApiHorizonMode::Perpetuity => CliHorizonMode::Perpetuity,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    plan_to_age: Option<u32>,

    monthly_contribution: Option<Decimal>,
    contribution_step_up: Option<Decimal>,
    existing_corpus: Option<Decimal>,
    desired_monthly_expense: Option<Decimal>,

    pre_retirement_return: Option<Decimal>,
    post_retirement_return: Option<Decimal>,
    inflation: Option<Decimal>,
    risk_tolerance: Option<u8>,

    contribution_timing: Option<ApiContributionTiming>,
    withdrawal_indexation: Option<ApiWithdrawalIndexation>,
    horizon_mode: Option<ApiHorizonMode>,

    ramp_step_up: Option<Decimal>,
    ramp_cap: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InsurancePayload {
    age: Option<u32>,
    annual_income: Option<Decimal>,
    dependents: Option<u32>,
    existing_life_cover: Option<Decimal>,
    existing_health_cover: Option<Decimal>,
    city_tier: Option<CityTier>,
    /// Comma-separated, e.g. `smoking,high-stress`.
    lifestyle: Option<String>,
}

#[derive(Parser, Debug)]
#[command(
    name = "nestegg",
    about = "Deterministic retirement corpus projection, sustainability check and catch-up planner"
)]
struct App {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Project savings to retirement and test whether they last
    Simulate(Cli),
    /// Estimate life and health cover and the gap over existing policies
    Insurance(InsuranceCli),
}

#[derive(Args, Debug)]
struct Cli {
    #[arg(long, default_value_t = 30)]
    current_age: u32,
    #[arg(long, default_value_t = 60)]
    retirement_age: u32,
    #[arg(long, default_value_t = 85, help = "Age the money must last to")]
    plan_to_age: u32,
    #[arg(long, default_value = "500")]
    monthly_contribution: Decimal,
    #[arg(
        long,
        default_value = "0",
        help = "Annual increase of the monthly contribution in percent"
    )]
    contribution_step_up: Decimal,
    #[arg(long, default_value = "0")]
    existing_corpus: Decimal,
    #[arg(long, default_value = "2000", help = "Monthly spending in today's money")]
    desired_monthly_expense: Decimal,
    #[arg(
        long,
        help = "Expected annual return before retirement in percent; derived from --risk-tolerance when omitted"
    )]
    pre_retirement_return: Option<Decimal>,
    #[arg(long, default_value = "5", help = "Expected annual return in retirement in percent")]
    post_retirement_return: Decimal,
    #[arg(long, default_value = "5", help = "Annual inflation in percent")]
    inflation: Decimal,
    #[arg(long, default_value_t = 3, help = "Risk tolerance from 1 (cautious) to 5 (aggressive)")]
    risk_tolerance: u8,
    #[arg(long, value_enum, default_value_t = CliContributionTiming::StartOfYear)]
    contribution_timing: CliContributionTiming,
    #[arg(long, value_enum, default_value_t = CliWithdrawalIndexation::InflationLinked)]
    withdrawal_indexation: CliWithdrawalIndexation,
    #[arg(long, value_enum, default_value_t = CliHorizonMode::FixedHorizon)]
    horizon_mode: CliHorizonMode,
    #[arg(
        long,
        default_value = "15",
        help = "Largest yearly rise of the catch-up ramp in percent"
    )]
    ramp_step_up: Decimal,
    #[arg(
        long,
        default_value = "110",
        help = "Ramp ceiling as a percent of the recommended contribution"
    )]
    ramp_cap: Decimal,
}

#[derive(Args, Debug)]
struct InsuranceCli {
    #[arg(long, default_value_t = 30)]
    age: u32,
    #[arg(long)]
    annual_income: Decimal,
    #[arg(long, default_value_t = 0)]
    dependents: u32,
    #[arg(long, default_value = "0")]
    existing_life_cover: Decimal,
    #[arg(long, default_value = "0")]
    existing_health_cover: Decimal,
    #[arg(long, value_enum, default_value_t = CliCityTier::Tier3)]
    city_tier: CliCityTier,
    #[arg(long, value_enum, value_delimiter = ',')]
    lifestyle: Vec<CliLifestyleRisk>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ReturnSource {
    Explicit,
    RiskProfile,
}

#[derive(Debug)]
struct SimulationRequest {
    profile: PersonProfile,
    assumptions: FinancialAssumptions,
    horizon_mode: HorizonMode,
    ramp: RampSettings,
    risk_tolerance: RiskLevel,
    return_source: ReturnSource,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    #[serde(flatten)]
    report: SimulationReport,
    pre_retirement_return_source: ReturnSource,
    risk_advice: RiskAdvice,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InsuranceResponse {
    recommendation: InsuranceRecommendation,
    assessment: CoverageAssessment,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn money_arg(flag: &str, value: Decimal) -> Result<Money, String> {
    Money::from_decimal(value).map_err(|e| format!("{flag}: {e}"))
}

fn build_inputs(cli: Cli) -> Result<SimulationRequest, String> {
    if cli.retirement_age < cli.current_age {
        return Err("--retirement-age must be >= --current-age".to_string());
    }

    if cli.plan_to_age <= cli.retirement_age {
        return Err("--plan-to-age must be > --retirement-age".to_string());
    }

    if cli.monthly_contribution < Decimal::ZERO {
        return Err("--monthly-contribution must be >= 0".to_string());
    }

    if cli.existing_corpus < Decimal::ZERO {
        return Err("--existing-corpus must be >= 0".to_string());
    }

    if cli.desired_monthly_expense <= Decimal::ZERO {
        return Err("--desired-monthly-expense must be > 0".to_string());
    }

    if cli.contribution_step_up < Decimal::ZERO {
        return Err("--contribution-step-up must be >= 0".to_string());
    }

    if cli.inflation < Decimal::ZERO {
        return Err("--inflation must be >= 0".to_string());
    }

    if cli
        .pre_retirement_return
        .is_some_and(|rate| rate <= TOTAL_LOSS_PERCENT)
    {
        return Err("--pre-retirement-return must be > -100".to_string());
    }

    if cli.post_retirement_return <= TOTAL_LOSS_PERCENT {
        return Err("--post-retirement-return must be > -100".to_string());
    }

    if cli.ramp_step_up < Decimal::ZERO {
        return Err("--ramp-step-up must be >= 0".to_string());
    }

    if cli.ramp_cap < Decimal::ONE_HUNDRED {
        return Err("--ramp-cap must be >= 100".to_string());
    }

    let risk_tolerance = RiskLevel::new(cli.risk_tolerance)
        .map_err(|_| "--risk-tolerance must be between 1 and 5".to_string())?;

    let profile = PersonProfile {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        plan_to_age: cli.plan_to_age,
    };

    let (pre_retirement_return, return_source) = match cli.pre_retirement_return {
        Some(percent) => (Rate::from_percent(percent), ReturnSource::Explicit),
        None => {
            let system = system_risk_level(profile.years_to_retirement(), false);
            (
                portfolio_return(blended_risk(risk_tolerance, system)),
                ReturnSource::RiskProfile,
            )
        }
    };

    Ok(SimulationRequest {
        profile,
        assumptions: FinancialAssumptions {
            monthly_contribution: money_arg("--monthly-contribution", cli.monthly_contribution)?,
            contribution_step_up: Rate::from_percent(cli.contribution_step_up),
            pre_retirement_return,
            post_retirement_return: Rate::from_percent(cli.post_retirement_return),
            inflation: Rate::from_percent(cli.inflation),
            desired_monthly_expense: money_arg(
                "--desired-monthly-expense",
                cli.desired_monthly_expense,
            )?,
            existing_corpus: money_arg("--existing-corpus", cli.existing_corpus)?,
            contribution_timing: cli.contribution_timing.into(),
            withdrawal_indexation: cli.withdrawal_indexation.into(),
        },
        horizon_mode: cli.horizon_mode.into(),
        ramp: RampSettings {
            max_annual_step_up: Rate::from_percent(cli.ramp_step_up),
            overshoot_factor: Rate::from_percent(cli.ramp_cap),
        },
        risk_tolerance,
        return_source,
    })
}

fn build_insurance_profile(cli: InsuranceCli) -> Result<InsuranceProfile, String> {
    if cli.annual_income < Decimal::ZERO {
        return Err("--annual-income must be >= 0".to_string());
    }

    if cli.existing_life_cover < Decimal::ZERO {
        return Err("--existing-life-cover must be >= 0".to_string());
    }

    if cli.existing_health_cover < Decimal::ZERO {
        return Err("--existing-health-cover must be >= 0".to_string());
    }

    let mut lifestyle_risks: Vec<LifestyleRisk> = Vec::new();
    for risk in cli.lifestyle {
        let risk = LifestyleRisk::from(risk);
        if !lifestyle_risks.contains(&risk) {
            lifestyle_risks.push(risk);
        }
    }

    Ok(InsuranceProfile {
        age: cli.age,
        annual_income: money_arg("--annual-income", cli.annual_income)?,
        dependents: cli.dependents,
        existing_life_cover: money_arg("--existing-life-cover", cli.existing_life_cover)?,
        existing_health_cover: money_arg("--existing-health-cover", cli.existing_health_cover)?,
        city_tier: cli.city_tier.into(),
        lifestyle_risks,
    })
}

fn run_simulation(request: &SimulationRequest) -> Result<SimulateResponse, String> {
    let report = run_retirement_simulation_with(
        &request.profile,
        &request.assumptions,
        request.horizon_mode,
        request.ramp,
    )
    .map_err(|e| e.to_string())?;

    let is_behind = !report.sustainability.shortfall_at_retirement.is_zero();
    let monthly = match &report.catch_up {
        CatchUpRecommendation::IncreaseContribution {
            recommended_monthly_contribution,
            ..
        } => *recommended_monthly_contribution,
        CatchUpRecommendation::OnTrack | CatchUpRecommendation::NoFeasibleSolution { .. } => {
            request.assumptions.monthly_contribution
        }
    };
    let risk_advice = advise(request.risk_tolerance, &request.profile, is_behind, monthly)
        .map_err(|e| e.to_string())?;

    Ok(SimulateResponse {
        report,
        pre_retirement_return_source: request.return_source,
        risk_advice,
    })
}

fn run_insurance(profile: &InsuranceProfile) -> Result<InsuranceResponse, String> {
    let recommendation = estimate_insurance_adequacy(
        profile.annual_income,
        profile.dependents,
        profile.age,
        &profile.lifestyle_risks,
        profile.city_tier,
    )
    .map_err(|e| e.to_string())?;
    let assessment = assess_coverage(profile).map_err(|e| e.to_string())?;
    Ok(InsuranceResponse {
        recommendation,
        assessment,
    })
}

/// Parses command-line arguments, runs the chosen command and returns its
/// JSON output.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let app = App::parse_from(args);
    let json = match app.command {
        Command::Simulate(cli) => {
            let request = build_inputs(cli)?;
            serde_json::to_string_pretty(&run_simulation(&request)?)
        }
        Command::Insurance(cli) => {
            let profile = build_insurance_profile(cli)?;
            serde_json::to_string_pretty(&run_insurance(&profile)?)
        }
    };
    json.map_err(|e| format!("failed to serialize output: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/insurance",
            get(insurance_get_handler).post(insurance_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nestegg HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let result =
        simulation_request_from_payload(payload).and_then(|request| run_simulation(&request));
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => {
            warn!(error = %msg, "rejected simulate request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

async fn insurance_get_handler(Query(payload): Query<InsurancePayload>) -> Response {
    insurance_handler_impl(payload).await
}

async fn insurance_post_handler(Json(payload): Json<InsurancePayload>) -> Response {
    insurance_handler_impl(payload).await
}

async fn insurance_handler_impl(payload: InsurancePayload) -> Response {
    let result =
        insurance_profile_from_payload(payload).and_then(|profile| run_insurance(&profile));
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => {
            warn!(error = %msg, "rejected insurance request");
            error_response(StatusCode::BAD_REQUEST, &msg)
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn simulation_request_from_json(json: &str) -> Result<SimulationRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    simulation_request_from_payload(payload)
}

fn simulation_request_from_payload(payload: SimulatePayload) -> Result<SimulationRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.plan_to_age {
        cli.plan_to_age = v;
    }
    if let Some(v) = payload.monthly_contribution {
        cli.monthly_contribution = v;
    }
    if let Some(v) = payload.contribution_step_up {
        cli.contribution_step_up = v;
    }
    if let Some(v) = payload.existing_corpus {
        cli.existing_corpus = v;
    }
    if let Some(v) = payload.desired_monthly_expense {
        cli.desired_monthly_expense = v;
    }
    if payload.pre_retirement_return.is_some() {
        cli.pre_retirement_return = payload.pre_retirement_return;
    }
    if let Some(v) = payload.post_retirement_return {
        cli.post_retirement_return = v;
    }
    if let Some(v) = payload.inflation {
        cli.inflation = v;
    }
    if let Some(v) = payload.risk_tolerance {
        cli.risk_tolerance = v;
    }
    if let Some(v) = payload.contribution_timing {
        cli.contribution_timing = v.into();
    }
    if let Some(v) = payload.withdrawal_indexation {
        cli.withdrawal_indexation = v.into();
    }
    if let Some(v) = payload.horizon_mode {
        cli.horizon_mode = v.into();
    }
    if let Some(v) = payload.ramp_step_up {
        cli.ramp_step_up = v;
    }
    if let Some(v) = payload.ramp_cap {
        cli.ramp_cap = v;
    }

    build_inputs(cli)
}

fn insurance_profile_from_payload(payload: InsurancePayload) -> Result<InsuranceProfile, String> {
    let Some(annual_income) = payload.annual_income else {
        return Err("annualIncome is required".to_string());
    };

    let mut lifestyle = Vec::new();
    for item in payload
        .lifestyle
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
    {
        let risk = CliLifestyleRisk::from_str(&item.replace('_', "-"), true)
            .map_err(|_| format!("lifestyle: unknown risk '{item}'"))?;
        lifestyle.push(risk);
    }

    let city_tier = match payload.city_tier.unwrap_or(CityTier::Tier3) {
        CityTier::Tier1 => CliCityTier::Tier1,
        CityTier::Tier2 => CliCityTier::Tier2,
        CityTier::Tier3 => CliCityTier::Tier3,
    };

    build_insurance_profile(InsuranceCli {
        age: payload.age.unwrap_or(30),
        annual_income,
        dependents: payload.dependents.unwrap_or(0),
        existing_life_cover: payload.existing_life_cover.unwrap_or_default(),
        existing_health_cover: payload.existing_health_cover.unwrap_or_default(),
        city_tier,
        lifestyle,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 30,
        retirement_age: 60,
        plan_to_age: 85,
        monthly_contribution: Decimal::from(500),
        contribution_step_up: Decimal::ZERO,
        existing_corpus: Decimal::ZERO,
        desired_monthly_expense: Decimal::from(2_000),
        pre_retirement_return: Some(Decimal::from(8)),
        post_retirement_return: Decimal::from(5),
        inflation: Decimal::from(5),
        risk_tolerance: 3,
        contribution_timing: CliContributionTiming::StartOfYear,
        withdrawal_indexation: CliWithdrawalIndexation::InflationLinked,
        horizon_mode: CliHorizonMode::FixedHorizon,
        ramp_step_up: Decimal::from(15),
        ramp_cap: Decimal::from(110),
    }
}

use thiserror::Error;

/// Input that the engine refuses to simulate.
///
/// Every variant is raised before a report is assembled; nothing is clamped or
/// defaulted on the caller's behalf.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("invalid ages: {reason}")]
    InvalidAges { reason: String },

    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },

    #[error("{field} must be positive")]
    NonPositiveAmount { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    InvalidRate { field: &'static str, reason: String },

    #[error(
        "perpetuity requires post-retirement return ({post_return}) to exceed inflation ({inflation}) and withdrawal growth ({withdrawal_growth})"
    )]
    PerpetuityImpossible {
        post_return: String,
        inflation: String,
        withdrawal_growth: String,
    },

    #[error("numeric overflow while computing {stage}; check input magnitudes and rates")]
    NumericOverflow { stage: &'static str },

    #[error("target corpus not reachable within {iterations} search iterations")]
    SearchExhausted { iterations: u32 },
}

pub type EngineResult<T> = Result<T, ConfigurationError>;

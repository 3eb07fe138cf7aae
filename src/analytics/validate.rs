use crate::config::EngineConfig;

/// Analysis families with independent limits and cache TTLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    SessionDuration,
    UserJourneys,
    Trends,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::SessionDuration => "session-duration",
            QueryType::UserJourneys => "user-journeys",
            QueryType::Trends => "trends",
        }
    }

    /// Per-type ceiling on requested result size.
    pub fn max_limit(&self, config: &EngineConfig) -> i64 {
        match self {
            QueryType::SessionDuration => config.session_duration.max_sessions_to_analyze,
            QueryType::UserJourneys => config.user_journeys.max_sessions_to_analyze,
            QueryType::Trends => config.trends.max_data_points,
        }
    }
}

/// Raw, caller-supplied parameter values, before defaulting.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawQuery {
    pub days: Option<i64>,
    pub limit: Option<i64>,
    pub min_steps: Option<i64>,
    pub max_steps: Option<i64>,
}

/// Check bounds without mutating anything. All violations are collected;
/// nothing short-circuits.
pub fn validate(query_type: QueryType, params: &RawQuery, config: &EngineConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(days) = params.days {
        if days > 365 {
            errors.push("requested period cannot exceed 365 days".to_string());
        }
    }

    let max_limit = query_type.max_limit(config);
    if let Some(limit) = params.limit {
        if limit > max_limit {
            errors.push(format!("requested limit cannot exceed {max_limit}"));
        }
    }

    if query_type == QueryType::UserJourneys {
        if let Some(min_steps) = params.min_steps {
            if min_steps < 1 {
                errors.push("minSteps must be at least 1".to_string());
            }
        }
        if let Some(max_steps) = params.max_steps {
            if max_steps > 50 {
                errors.push("maxSteps cannot exceed 50".to_string());
            }
        }
        if let (Some(min_steps), Some(max_steps)) = (params.min_steps, params.max_steps) {
            if min_steps > max_steps {
                errors.push("minSteps cannot be greater than maxSteps".to_string());
            }
        }
    }

    errors
}

/// Execution parameters derived from configuration. Unlike [`validate`],
/// this clamps rather than rejects.
#[derive(Debug, Clone, Copy)]
pub struct QueryPlan {
    pub limit: i64,
    pub timeout_ms: u64,
    pub batch_size: usize,
}

pub fn optimize(query_type: QueryType, limit: i64, config: &EngineConfig) -> QueryPlan {
    QueryPlan {
        limit: limit.min(query_type.max_limit(config)),
        timeout_ms: config.performance.query_timeout_ms,
        batch_size: config.performance.batch_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_params_pass() {
        let config = EngineConfig::default();
        let params = RawQuery {
            days: Some(30),
            limit: Some(1000),
            ..Default::default()
        };
        assert!(validate(QueryType::SessionDuration, &params, &config).is_empty());
    }

    #[test]
    fn test_all_violations_are_collected() {
        let config = EngineConfig::default();
        let params = RawQuery {
            days: Some(400),
            limit: Some(100_000),
            min_steps: Some(0),
            max_steps: Some(100),
        };
        let errors = validate(QueryType::UserJourneys, &params, &config);
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_min_steps_greater_than_max_steps_rejected() {
        let config = EngineConfig::default();
        let params = RawQuery {
            min_steps: Some(8),
            max_steps: Some(4),
            ..Default::default()
        };
        let errors = validate(QueryType::UserJourneys, &params, &config);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_absent_params_are_not_violations() {
        let config = EngineConfig::default();
        let errors = validate(QueryType::UserJourneys, &RawQuery::default(), &config);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_per_type_limit_ceilings_differ() {
        let config = EngineConfig::default();
        let params = RawQuery {
            limit: Some(8000),
            ..Default::default()
        };
        // 8000 fits under session-duration's 10k ceiling but not journeys' 5k.
        assert!(validate(QueryType::SessionDuration, &params, &config).is_empty());
        assert_eq!(validate(QueryType::UserJourneys, &params, &config).len(), 1);
    }

    #[test]
    fn test_trends_ceiling_is_max_data_points() {
        let config = EngineConfig::default();
        let params = RawQuery {
            limit: Some(91),
            ..Default::default()
        };
        assert_eq!(validate(QueryType::Trends, &params, &config).len(), 1);
        assert_eq!(optimize(QueryType::Trends, 91, &config).limit, 90);
    }

    #[test]
    fn test_optimize_clamps_and_attaches_plan() {
        let config = EngineConfig::default();
        let plan = optimize(QueryType::UserJourneys, 50_000, &config);
        assert_eq!(plan.limit, 5_000);
        assert_eq!(plan.timeout_ms, 30_000);
        assert_eq!(plan.batch_size, 1000);

        let plan = optimize(QueryType::SessionDuration, 100, &config);
        assert_eq!(plan.limit, 100);
    }
}

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use stampede_metrics::{MetricKind, MetricValues, MetricsSnapshot, Registry};

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSpec {
    pub expression: String,
    /// Stop the run as soon as a periodic evaluation fails.
    pub abort_on_fail: bool,
    /// Periodic evaluations before this offset never abort.
    pub delay_abort_eval: Option<Duration>,
}

impl ThresholdSpec {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            abort_on_fail: false,
            delay_abort_eval: None,
        }
    }

    #[must_use]
    pub fn abort_on_fail(mut self, delay: Option<Duration>) -> Self {
        self.abort_on_fail = true;
        self.delay_abort_eval = delay;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    pub metric: String,
    pub thresholds: Vec<ThresholdSpec>,
}

impl ThresholdSet {
    pub fn new<I, S>(metric: impl Into<String>, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metric: metric.into(),
            thresholds: expressions.into_iter().map(ThresholdSpec::new).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdOp {
    Lt,
    Lte,
    Gt,
    Gte,
    Eq,
}

impl ThresholdOp {
    fn compare(self, left: f64, right: f64) -> bool {
        match self {
            Self::Lt => left < right,
            Self::Lte => left <= right,
            Self::Gt => left > right,
            Self::Gte => left >= right,
            Self::Eq => left == right,
        }
    }
}

impl fmt::Display for ThresholdOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::Eq => "==",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdAgg {
    Count,
    Avg,
    Min,
    Max,
    P(f64),
}

impl ThresholdAgg {
    fn applies_to(self, kind: MetricKind) -> bool {
        match kind {
            MetricKind::Counter => matches!(self, Self::Count),
            MetricKind::Trend => true,
        }
    }
}

impl fmt::Display for ThresholdAgg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Avg => f.write_str("avg"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::P(p) => write!(f, "p({p})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdExpr {
    pub agg: ThresholdAgg,
    pub op: ThresholdOp,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThresholdError {
    #[error("invalid threshold `{expression}`: {reason}")]
    Syntax { expression: String, reason: String },

    #[error("threshold `{expression}` refers to unknown metric `{metric}`")]
    UnknownMetric { metric: String, expression: String },

    #[error("threshold `{expression}` does not apply to {kind} metric `{metric}`")]
    Unsupported {
        metric: String,
        kind: MetricKind,
        expression: String,
    },
}

/// Parses `<agg> <op> <number>`; whitespace anywhere is ignored.
pub fn parse_threshold_expr(raw: &str) -> Result<ThresholdExpr, ThresholdError> {
    let syntax = |reason: &str| ThresholdError::Syntax {
        expression: raw.to_string(),
        reason: reason.to_string(),
    };

    let s: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if s.is_empty() {
        return Err(syntax("empty threshold"));
    }

    let ops = [
        ("<=", ThresholdOp::Lte),
        (">=", ThresholdOp::Gte),
        ("==", ThresholdOp::Eq),
        ("<", ThresholdOp::Lt),
        (">", ThresholdOp::Gt),
    ];
    let (op_pos, op_len, op) = ops
        .iter()
        .find_map(|(tok, op)| s.find(tok).map(|pos| (pos, tok.len(), *op)))
        .ok_or_else(|| syntax("missing operator"))?;

    let (left, right_with_op) = s.split_at(op_pos);
    let right = &right_with_op[op_len..];
    if left.is_empty() {
        return Err(syntax("missing aggregation"));
    }
    if right.is_empty() {
        return Err(syntax("missing value"));
    }

    let agg = if left.eq_ignore_ascii_case("avg") {
        ThresholdAgg::Avg
    } else if left.eq_ignore_ascii_case("min") {
        ThresholdAgg::Min
    } else if left.eq_ignore_ascii_case("max") {
        ThresholdAgg::Max
    } else if left.eq_ignore_ascii_case("count") {
        ThresholdAgg::Count
    } else if let Some(inner) = left.strip_prefix("p(").and_then(|v| v.strip_suffix(')')) {
        let p: f64 = inner.parse().map_err(|_| syntax("invalid percentile"))?;
        if !(0.0..=100.0).contains(&p) {
            return Err(syntax("percentile out of range 0..=100"));
        }
        ThresholdAgg::P(p)
    } else {
        return Err(syntax(&format!("unknown aggregation `{left}`")));
    };

    let value: f64 = right.parse().map_err(|_| syntax("invalid numeric value"))?;
    if !value.is_finite() {
        return Err(syntax("value must be finite"));
    }

    Ok(ThresholdExpr { agg, op, value })
}

/// Threshold bound to a declared metric.
#[derive(Debug, Clone)]
pub struct Threshold {
    metric: Arc<str>,
    kind: MetricKind,
    expression: String,
    expr: ThresholdExpr,
    abort_on_fail: bool,
    delay_abort_eval: Duration,
}

impl Threshold {
    pub fn metric(&self) -> &str {
        &self.metric
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    pub fn expr(&self) -> ThresholdExpr {
        self.expr
    }

    pub fn abort_on_fail(&self) -> bool {
        self.abort_on_fail
    }

    /// Whether a failure observed `elapsed` into the run may abort it.
    pub fn may_abort_at(&self, elapsed: Duration) -> bool {
        self.abort_on_fail && elapsed >= self.delay_abort_eval
    }

    fn observed(&self, snapshot: &MetricsSnapshot) -> Option<f64> {
        let summary = snapshot.get(&self.metric)?;
        match (&summary.values, self.expr.agg) {
            (MetricValues::Counter(c), ThresholdAgg::Count) => Some(c.total),
            (MetricValues::Trend(t), ThresholdAgg::Count) => Some(t.count() as f64),
            (MetricValues::Trend(t), ThresholdAgg::Avg) => t.avg(),
            (MetricValues::Trend(t), ThresholdAgg::Min) => t.min(),
            (MetricValues::Trend(t), ThresholdAgg::Max) => t.max(),
            (MetricValues::Trend(t), ThresholdAgg::P(p)) => t.percentile(p),
            (MetricValues::Counter(_), _) => None,
        }
    }

    /// Undefined statistics (no samples) fail.
    pub fn evaluate(&self, snapshot: &MetricsSnapshot) -> ThresholdOutcome {
        let observed = self.observed(snapshot);
        let passed = observed.is_some_and(|v| self.expr.op.compare(v, self.expr.value));
        ThresholdOutcome {
            metric: self.metric.clone(),
            expression: self.expression.clone(),
            observed,
            limit: self.expr.value,
            passed,
        }
    }
}

/// Parses every expression and binds it to a declared metric of a compatible kind.
pub fn compile_thresholds(
    sets: &[ThresholdSet],
    registry: &Registry,
) -> Result<Vec<Threshold>, ThresholdError> {
    let mut out = Vec::new();

    for set in sets {
        for spec in &set.thresholds {
            let expr = parse_threshold_expr(&spec.expression)?;
            let kind =
                registry
                    .kind_of(&set.metric)
                    .ok_or_else(|| ThresholdError::UnknownMetric {
                        metric: set.metric.clone(),
                        expression: spec.expression.clone(),
                    })?;
            if !expr.agg.applies_to(kind) {
                return Err(ThresholdError::Unsupported {
                    metric: set.metric.clone(),
                    kind,
                    expression: spec.expression.clone(),
                });
            }

            out.push(Threshold {
                metric: Arc::from(set.metric.as_str()),
                kind,
                expression: spec.expression.trim().to_string(),
                expr,
                abort_on_fail: spec.abort_on_fail,
                delay_abort_eval: spec.delay_abort_eval.unwrap_or(Duration::ZERO),
            });
        }
    }

    Ok(out)
}

pub fn evaluate_thresholds(
    thresholds: &[Threshold],
    snapshot: &MetricsSnapshot,
) -> Vec<ThresholdOutcome> {
    thresholds.iter().map(|t| t.evaluate(snapshot)).collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdOutcome {
    pub metric: Arc<str>,
    pub expression: String,
    pub observed: Option<f64>,
    pub limit: f64,
    pub passed: bool,
}

impl ThresholdOutcome {
    /// `observed - limit`, or `None` when the statistic was undefined.
    #[must_use]
    pub fn margin(&self) -> Option<f64> {
        self.observed.map(|v| v - self.limit)
    }
}

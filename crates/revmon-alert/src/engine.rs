use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use revmon_common::types::{AlertRule, AlertScope, Severity};
use revmon_metrics::{MetricsError, MetricsProvider};
use serde_json::{json, Map, Value};

use crate::params::{RuleSpec, WindowParams};
use crate::window::{ObservedWindows, RuleWindows};
use crate::Evaluation;

/// `numerator / denominator`, or 0 when the denominator is not positive or
/// either operand is not finite.
///
/// # Examples
///
/// ```
/// use revmon_alert::safe_ratio;
///
/// assert_eq!(safe_ratio(5.0, 100.0), 0.05);
/// assert_eq!(safe_ratio(5.0, 0.0), 0.0);
/// assert_eq!(safe_ratio(f64::NAN, 3.0), 0.0);
/// ```
pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if !numerator.is_finite() || !denominator.is_finite() || denominator <= 0.0 {
        return 0.0;
    }
    let ratio = numerator / denominator;
    if ratio.is_finite() {
        ratio
    } else {
        0.0
    }
}

/// RFC 3339 with millisecond precision and a `Z` suffix.
pub fn iso_millis(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Identity of the rule being evaluated, shared by every rule algorithm to
/// build its context snapshot.
pub struct RuleContext<'a> {
    pub rule: &'a AlertRule,
    pub scope: AlertScope,
    pub now: DateTime<Utc>,
}

impl RuleContext<'_> {
    /// Scope, rule identity and evaluation time.
    pub fn base(&self) -> Map<String, Value> {
        let mut ctx = Map::new();
        ctx.insert("tenant_id".into(), json!(self.scope.tenant_id));
        ctx.insert("content_type".into(), json!(self.scope.content_type));
        ctx.insert("content_key".into(), json!(self.scope.content_key));
        ctx.insert("rule_id".into(), json!(self.rule.id));
        ctx.insert("rule_name".into(), json!(self.rule.name));
        ctx.insert("rule_type".into(), json!(self.rule.rule_type.as_str()));
        ctx.insert("evaluated_at_utc".into(), json!(iso_millis(self.now)));
        ctx
    }

    /// [`Self::base`] plus both windows.
    pub fn windowed(&self, windows: &RuleWindows) -> Map<String, Value> {
        let mut ctx = self.base();
        ctx.insert("current_window".into(), json!(windows.current));
        ctx.insert("baseline_window".into(), json!(windows.baseline));
        ctx
    }
}

/// Evaluates rules against a metrics backend.
#[derive(Clone)]
pub struct RuleEngine {
    provider: Arc<dyn MetricsProvider>,
}

impl RuleEngine {
    pub fn new(provider: Arc<dyn MetricsProvider>) -> Self {
        Self { provider }
    }

    /// Evaluates `rule` as of `now`. Only provider I/O failures are errors;
    /// unknown rule types and unsupported scopes produce a non-triggering
    /// evaluation.
    pub async fn evaluate(
        &self,
        rule: &AlertRule,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, MetricsError> {
        let ctx = RuleContext {
            rule,
            scope: rule.scope.normalized(),
            now,
        };

        let evaluation = match RuleSpec::parse(&rule.rule_type, &rule.params) {
            RuleSpec::ConversionDrop(p) => {
                let observed = self.observe(&ctx, p.window).await?;
                p.evaluate(&ctx, &observed)
            }
            RuleSpec::RevenueDrop(p) => {
                let observed = self.observe(&ctx, p.window).await?;
                p.evaluate(&ctx, &observed)
            }
            RuleSpec::RefundSpike(p) => {
                let observed = self.observe(&ctx, p.window).await?;
                p.evaluate(&ctx, &observed)
            }
            RuleSpec::TrafficSpike(p) => {
                let observed = self.observe(&ctx, p.window).await?;
                p.evaluate(&ctx, &observed)
            }
            RuleSpec::DataFreshness(p) => {
                let snapshot = self.provider.freshness_snapshot(&ctx.scope).await?;
                p.evaluate(&ctx, &snapshot)
            }
            RuleSpec::Unsupported(name) => {
                tracing::warn!(rule_id = %rule.id, rule_type = %name, "Unsupported rule type");
                Evaluation::new(false, Severity::Info, "unsupported_rule_type", ctx.base())
            }
        };

        tracing::debug!(
            rule_id = %rule.id,
            triggered = evaluation.triggered,
            reason = %evaluation.reason,
            "Evaluated alert rule"
        );
        Ok(evaluation)
    }

    async fn observe(
        &self,
        ctx: &RuleContext<'_>,
        window: WindowParams,
    ) -> Result<ObservedWindows, MetricsError> {
        let windows =
            RuleWindows::ending_yesterday(ctx.now, window.lookback_days, window.baseline_days);
        let span = windows.span();
        let rows = self
            .provider
            .daily_metrics(&ctx.scope, span.start, span.end)
            .await?;
        Ok(ObservedWindows::from_rows(windows, &rows))
    }
}

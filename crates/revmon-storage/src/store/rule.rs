use chrono::Utc;
use revmon_common::types::{non_empty, AlertRule, AlertRuleType, AlertScope};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
};
use serde_json::{Map, Value};

use crate::entities::alert_rule::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::AlertStore;
use crate::{AlertRuleInput, RuleFilter};

/// Parses a stored params column; anything other than a JSON object reads as
/// an empty map.
pub(crate) fn parse_params(raw: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

pub(crate) fn scope_of(m: &alert_rule::Model) -> AlertScope {
    AlertScope {
        tenant_id: m.tenant_id.clone(),
        content_type: m.content_type.clone(),
        content_key: m.content_key.clone(),
    }
}

pub(crate) fn to_rule(m: alert_rule::Model) -> Result<AlertRule> {
    let scope = scope_of(&m);
    Ok(AlertRule {
        params: parse_params(&m.params_json)?,
        rule_type: AlertRuleType::from(m.rule_type),
        id: m.id,
        name: m.name,
        enabled: m.enabled,
        scope,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    })
}

struct ValidatedRule {
    name: String,
    rule_type: String,
    scope: AlertScope,
    params_json: String,
}

fn validate(input: &AlertRuleInput) -> Result<ValidatedRule> {
    let name = non_empty(Some(&input.name))
        .ok_or_else(|| StorageError::Invalid("name is required".to_string()))?;
    if !input.rule_type.is_known() {
        return Err(StorageError::Invalid(format!(
            "rule_type is invalid: {}",
            input.rule_type
        )));
    }
    Ok(ValidatedRule {
        name,
        rule_type: input.rule_type.as_str().to_string(),
        scope: input.scope.normalized_for_storage(),
        params_json: serde_json::to_string(&input.params)?,
    })
}

impl AlertStore {
    pub async fn list_alert_rules(&self, filter: &RuleFilter) -> Result<Vec<AlertRule>> {
        let mut q = Entity::find();
        if filter.enabled_only {
            q = q.filter(Column::Enabled.eq(true));
        }
        if let Some(id) = non_empty(filter.rule_id.as_deref()) {
            q = q.filter(Column::Id.eq(id));
        }
        q.order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .all(self.db())
            .await?
            .into_iter()
            .map(to_rule)
            .collect()
    }

    pub async fn get_alert_rule(&self, id: &str) -> Result<Option<AlertRule>> {
        Entity::find_by_id(id.trim().to_string())
            .one(self.db())
            .await?
            .map(to_rule)
            .transpose()
    }

    pub async fn insert_alert_rule(&self, input: &AlertRuleInput) -> Result<AlertRule> {
        let v = validate(input)?;
        let now = Utc::now().fixed_offset();
        let am = alert_rule::ActiveModel {
            id: Set(revmon_common::id::next_id()),
            name: Set(v.name),
            enabled: Set(input.enabled),
            rule_type: Set(v.rule_type),
            tenant_id: Set(v.scope.tenant_id),
            content_type: Set(v.scope.content_type),
            content_key: Set(v.scope.content_key),
            params_json: Set(v.params_json),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = am.insert(self.db()).await?;
        tracing::info!(rule_id = %model.id, rule_type = %model.rule_type, "Created alert rule");
        to_rule(model)
    }

    pub async fn replace_alert_rule(
        &self,
        id: &str,
        input: &AlertRuleInput,
    ) -> Result<Option<AlertRule>> {
        let v = validate(input)?;
        let Some(existing) = Entity::find_by_id(id.trim().to_string())
            .one(self.db())
            .await?
        else {
            return Ok(None);
        };

        let mut am: alert_rule::ActiveModel = existing.into();
        am.name = Set(v.name);
        am.enabled = Set(input.enabled);
        am.rule_type = Set(v.rule_type);
        am.tenant_id = Set(v.scope.tenant_id);
        am.content_type = Set(v.scope.content_type);
        am.content_key = Set(v.scope.content_key);
        am.params_json = Set(v.params_json);
        am.updated_at = Set(Utc::now().fixed_offset());
        let model = am.update(self.db()).await?;
        to_rule(model).map(Some)
    }
}

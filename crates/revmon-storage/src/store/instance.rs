use chrono::Utc;
use revmon_common::types::{
    non_empty, AlertInstance, AlertInstanceWithRule, AlertRuleType, InstanceStatus, Severity,
};
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde_json::Value;

use crate::entities::alert_instance::{self, Column, Entity};
use crate::entities::alert_rule::{self, Column as RuleCol};
use crate::error::{Result, StorageError};
use crate::store::rule::{parse_params, scope_of};
use crate::store::AlertStore;
use crate::{InsertOutcome, InstanceFilter, NewAlertInstance};

fn parse_status(raw: &str) -> Result<InstanceStatus> {
    raw.parse().map_err(|_| StorageError::UnexpectedValue {
        column: "status",
        value: raw.to_string(),
    })
}

fn parse_severity(raw: &str) -> Result<Severity> {
    raw.parse().map_err(|_| StorageError::UnexpectedValue {
        column: "severity",
        value: raw.to_string(),
    })
}

fn to_instance(m: alert_instance::Model, rule: &alert_rule::Model) -> Result<AlertInstance> {
    Ok(AlertInstance {
        status: parse_status(&m.status)?,
        severity: parse_severity(&m.severity)?,
        context_json: serde_json::from_str(&m.context_json)?,
        rule_name: rule.name.clone(),
        rule_type: AlertRuleType::from(rule.rule_type.as_str()),
        id: m.id,
        rule_id: m.rule_id,
        fired_at: m.fired_at.with_timezone(&Utc),
        fingerprint: m.fingerprint,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl AlertStore {
    pub async fn insert_alert_instance(&self, input: &NewAlertInstance) -> Result<InsertOutcome> {
        let fingerprint = non_empty(Some(&input.fingerprint))
            .ok_or_else(|| StorageError::Invalid("fingerprint is required".to_string()))?;
        let rule_id = non_empty(Some(&input.rule_id))
            .ok_or_else(|| StorageError::Invalid("rule_id is required".to_string()))?;
        let tenant_id = non_empty(input.context_json.get("tenant_id").and_then(Value::as_str));

        let id = revmon_common::id::next_id();
        let am = alert_instance::ActiveModel {
            id: Set(id.clone()),
            rule_id: Set(rule_id),
            status: Set(input.status.as_str().to_string()),
            severity: Set(input.severity.to_string()),
            fired_at: Set(input.fired_at.fixed_offset()),
            context_json: Set(serde_json::to_string(&input.context_json)?),
            fingerprint: Set(fingerprint),
            tenant_id: Set(tenant_id),
            created_at: Set(Utc::now().fixed_offset()),
        };

        let written = Entity::insert(am)
            .on_conflict(
                OnConflict::column(Column::Fingerprint)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.db())
            .await?;

        if written == 0 {
            tracing::debug!(fingerprint = %input.fingerprint, "Alert instance already recorded");
            return Ok(InsertOutcome {
                inserted: false,
                id: None,
            });
        }
        Ok(InsertOutcome {
            inserted: true,
            id: Some(id),
        })
    }

    pub async fn list_alert_instances(
        &self,
        filter: &InstanceFilter,
    ) -> Result<Vec<AlertInstance>> {
        let mut q = Entity::find().find_also_related(alert_rule::Entity);
        if let Some(status) = filter.status {
            q = q.filter(Column::Status.eq(status.as_str()));
        }
        if let Some(severity) = filter.severity {
            q = q.filter(Column::Severity.eq(severity.to_string()));
        }
        if let Some(tenant) = non_empty(filter.tenant_id.as_deref()) {
            q = q.filter(Column::TenantId.eq(tenant));
        }
        if let Some(rule_type) = &filter.rule_type {
            q = q.filter(RuleCol::RuleType.eq(rule_type.as_str()));
        }

        let rows = q
            .order_by_desc(Column::FiredAt)
            .order_by_desc(Column::Id)
            .limit(filter.effective_limit())
            .all(self.db())
            .await?;

        rows.into_iter()
            .filter_map(|(inst, rule)| rule.map(|rule| to_instance(inst, &rule)))
            .collect()
    }

    async fn find_instance(
        &self,
        id: &str,
    ) -> Result<Option<(alert_instance::Model, alert_rule::Model)>> {
        let row = Entity::find_by_id(id.trim().to_string())
            .find_also_related(alert_rule::Entity)
            .one(self.db())
            .await?;
        Ok(row.and_then(|(inst, rule)| rule.map(|rule| (inst, rule))))
    }

    pub async fn set_alert_instance_status(
        &self,
        id: &str,
        status: InstanceStatus,
    ) -> Result<Option<AlertInstance>> {
        let Some((inst, rule)) = self.find_instance(id).await? else {
            return Ok(None);
        };

        let current = parse_status(&inst.status)?;
        if !current.can_transition_to(status) {
            return Err(StorageError::InvalidTransition {
                from: current,
                to: status,
            });
        }
        if current == status {
            return to_instance(inst, &rule).map(Some);
        }

        let mut am: alert_instance::ActiveModel = inst.into();
        am.status = Set(status.as_str().to_string());
        let updated = am.update(self.db()).await?;
        tracing::info!(
            instance_id = %updated.id,
            status = %status,
            "Updated alert instance status"
        );
        to_instance(updated, &rule).map(Some)
    }

    pub async fn get_alert_instance_with_rule(
        &self,
        id: &str,
    ) -> Result<Option<AlertInstanceWithRule>> {
        let Some((inst, rule)) = self.find_instance(id).await? else {
            return Ok(None);
        };
        let scope = scope_of(&rule);
        let params = parse_params(&rule.params_json)?;
        Ok(Some(AlertInstanceWithRule {
            instance: to_instance(inst, &rule)?,
            scope,
            params,
        }))
    }
}

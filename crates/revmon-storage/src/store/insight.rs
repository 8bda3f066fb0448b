use chrono::Utc;
use revmon_common::types::AlertAiInsight;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};

use crate::entities::alert_ai_insight::{self, Column, Entity};
use crate::error::{Result, StorageError};
use crate::store::AlertStore;
use crate::NewAlertInsight;

fn to_insight(m: alert_ai_insight::Model) -> Result<AlertAiInsight> {
    Ok(AlertAiInsight {
        actions_json: serde_json::from_str(&m.actions_json)?,
        alert_instance_id: m.alert_instance_id,
        model: m.model,
        prompt_hash: m.prompt_hash,
        insight_md: m.insight_md,
        created_at: m.created_at.with_timezone(&Utc),
    })
}

impl AlertStore {
    pub async fn get_alert_insight(
        &self,
        alert_instance_id: &str,
    ) -> Result<Option<AlertAiInsight>> {
        Entity::find()
            .filter(Column::AlertInstanceId.eq(alert_instance_id.trim()))
            .one(self.db())
            .await?
            .map(to_insight)
            .transpose()
    }

    pub async fn upsert_alert_insight(&self, input: &NewAlertInsight) -> Result<AlertAiInsight> {
        let now = Utc::now().fixed_offset();
        let am = alert_ai_insight::ActiveModel {
            id: Set(revmon_common::id::next_id()),
            alert_instance_id: Set(input.alert_instance_id.clone()),
            model: Set(input.model.clone()),
            prompt_hash: Set(input.prompt_hash.clone()),
            insight_md: Set(input.insight_md.clone()),
            actions_json: Set(serde_json::to_string(&input.actions_json)?),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // 每个告警实例只保留一条解读，重新生成时覆盖
        Entity::insert(am)
            .on_conflict(
                OnConflict::column(Column::AlertInstanceId)
                    .update_columns([
                        Column::Model,
                        Column::PromptHash,
                        Column::InsightMd,
                        Column::ActionsJson,
                        Column::CreatedAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db())
            .await?;

        self.get_alert_insight(&input.alert_instance_id)
            .await?
            .ok_or(StorageError::InsertReadback {
                entity: "alert_ai_insight",
            })
    }
}

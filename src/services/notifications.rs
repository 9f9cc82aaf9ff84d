use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::entities::{notification, user, NotificationType, UserRole};
use crate::errors::ServiceError;

/// Input for a single in-app notification.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct BroadcastRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub order_id: Option<Uuid>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
    pub is_read: bool,
    pub read_at: Option<chrono::DateTime<Utc>>,
    pub created_at: chrono::DateTime<Utc>,
}

impl From<notification::Model> for NotificationResponse {
    fn from(model: notification::Model) -> Self {
        Self {
            id: model.id,
            notification_type: model.notification_type,
            title: model.title,
            message: model.message,
            order_id: model.order_id,
            metadata: model.metadata,
            is_read: model.is_read,
            read_at: model.read_at,
            created_at: model.created_at,
        }
    }
}

/// In-app notification inbox for user accounts.
#[derive(Clone)]
pub struct InAppNotificationService {
    db: Arc<DatabaseConnection>,
}

impl InAppNotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id))]
    pub async fn create(&self, input: NewNotification) -> Result<notification::Model, ServiceError> {
        let model = notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(input.user_id),
            notification_type: Set(input.notification_type),
            title: Set(input.title),
            message: Set(input.message),
            order_id: Set(input.order_id),
            metadata: Set(input.metadata),
            is_read: Set(false),
            read_at: Set(None),
            created_at: Set(Utc::now()),
        };
        model.insert(&*self.db).await.map_err(|e| {
            error!(error = %e, "Failed to create notification");
            ServiceError::DatabaseError(e)
        })
    }

    /// Newest first. Returns the page and the total number of matches.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        unread_only: bool,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<notification::Model>, u64), ServiceError> {
        let mut query = notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .order_by_desc(notification::Column::CreatedAt);
        if unread_only {
            query = query.filter(notification::Column::IsRead.eq(false));
        }
        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(notification::Entity::find()
            .filter(notification::Column::UserId.eq(user_id))
            .filter(notification::Column::IsRead.eq(false))
            .count(&*self.db)
            .await?)
    }

    async fn owned(&self, user_id: Uuid, id: Uuid) -> Result<notification::Model, ServiceError> {
        notification::Entity::find_by_id(id)
            .filter(notification::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("notification {}", id)))
    }

    /// Flips the read flag; `read_at` is set on read and cleared on unread.
    pub async fn set_read(
        &self,
        user_id: Uuid,
        id: Uuid,
        read: bool,
    ) -> Result<notification::Model, ServiceError> {
        let existing = self.owned(user_id, id).await?;
        if existing.is_read == read {
            return Ok(existing);
        }
        let mut active = existing.into_active_model();
        active.is_read = Set(read);
        active.read_at = Set(if read { Some(Utc::now()) } else { None });
        Ok(active.update(&*self.db).await?)
    }

    pub async fn delete(&self, user_id: Uuid, id: Uuid) -> Result<(), ServiceError> {
        let existing = self.owned(user_id, id).await?;
        notification::Entity::delete_by_id(existing.id)
            .exec(&*self.db)
            .await?;
        Ok(())
    }

    /// One bulk insert of an admin broadcast for every active customer account.
    ///
    /// Returns the recipient user ids.
    #[instrument(skip(self, request))]
    pub async fn broadcast(&self, request: &BroadcastRequest) -> Result<Vec<Uuid>, ServiceError> {
        request.validate()?;

        let recipients: Vec<Uuid> = user::Entity::find()
            .filter(user::Column::Role.eq(UserRole::Customer))
            .filter(user::Column::IsActive.eq(true))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();

        if recipients.is_empty() {
            info!("Broadcast has no recipients");
            return Ok(recipients);
        }

        let now = Utc::now();
        let rows = recipients.iter().map(|user_id| notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(*user_id),
            notification_type: Set(NotificationType::AdminBroadcast),
            title: Set(request.title.clone()),
            message: Set(request.message.clone()),
            order_id: Set(None),
            metadata: Set(None),
            is_read: Set(false),
            read_at: Set(None),
            created_at: Set(now),
        });

        notification::Entity::insert_many(rows)
            .exec(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to insert broadcast notifications");
                ServiceError::DatabaseError(e)
            })?;

        info!(recipients = recipients.len(), "Broadcast notifications created");
        Ok(recipients)
    }
}

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, EntityTrait,
    IntoActiveModel, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use super::Actor;
use crate::entities::{customer, customer_measurement};
use crate::errors::ServiceError;

/// Measurements are a flat map of name to number or text.
pub fn validate_measurements(value: &serde_json::Value) -> Result<(), ServiceError> {
    let map = value
        .as_object()
        .ok_or_else(|| ServiceError::ValidationError("measurements must be an object".into()))?;
    for (key, v) in map {
        if key.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "measurement names must not be empty".into(),
            ));
        }
        if !(v.is_number() || v.is_string()) {
            return Err(ServiceError::ValidationError(format!(
                "measurement '{}' must be a number or text",
                key
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct CreateCustomerRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 5, max = 32))]
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 500))]
    pub address: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UpdateMeasurementsRequest {
    #[schema(value_type = Object)]
    pub measurements: serde_json::Value,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerResponse {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
    pub address: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub measurements: Option<serde_json::Value>,
    pub total_orders: i32,
    pub total_spent: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<customer::Model> for CustomerResponse {
    fn from(c: customer::Model) -> Self {
        Self {
            id: c.id,
            user_id: c.user_id,
            name: c.name,
            phone: c.phone,
            email: c.email,
            address: c.address,
            measurements: c.measurements,
            total_orders: c.total_orders,
            total_spent: c.total_spent,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MeasurementSnapshot {
    pub id: Uuid,
    #[schema(value_type = Object)]
    pub measurements: serde_json::Value,
    pub recorded_by: Option<Uuid>,
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl From<customer_measurement::Model> for MeasurementSnapshot {
    fn from(m: customer_measurement::Model) -> Self {
        Self {
            id: m.id,
            measurements: m.measurements,
            recorded_by: m.recorded_by,
            notes: m.notes,
            recorded_at: m.created_at,
        }
    }
}

/// Inserts a customer row on any connection, including an open transaction.
pub(crate) async fn insert_customer<C: ConnectionTrait>(
    db: &C,
    request: &CreateCustomerRequest,
    user_id: Option<Uuid>,
) -> Result<customer::Model, ServiceError> {
    let now = Utc::now();
    customer::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        name: Set(request.name.trim().to_string()),
        phone: Set(request.phone.trim().to_string()),
        email: Set(request.email.clone()),
        address: Set(request.address.clone()),
        measurements: Set(request.measurements.clone()),
        total_orders: Set(0),
        total_spent: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await
    .map_err(|e| ServiceError::from_write(e, "customer"))
}

#[derive(Clone)]
pub struct CustomerService {
    db: Arc<DatabaseConnection>,
}

impl CustomerService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, request, actor))]
    pub async fn create_customer(
        &self,
        request: CreateCustomerRequest,
        actor: &Actor,
    ) -> Result<CustomerResponse, ServiceError> {
        request.validate()?;
        if let Some(measurements) = &request.measurements {
            validate_measurements(measurements)?;
        }

        let txn = self.db.begin().await?;
        let created = insert_customer(&txn, &request, None).await;
        let created = match created {
            Ok(c) => c,
            Err(e) => {
                let _ = txn.rollback().await;
                return Err(e);
            }
        };
        if let Some(measurements) = &request.measurements {
            if let Err(e) = record_snapshot(&txn, created.id, measurements.clone(), None, actor).await
            {
                let _ = txn.rollback().await;
                return Err(e);
            }
        }
        txn.commit().await?;

        info!(customer_id = %created.id, "Customer created");
        Ok(created.into())
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<CustomerResponse, ServiceError> {
        Ok(self.find(id).await?.into())
    }

    async fn find(&self, id: Uuid) -> Result<customer::Model, ServiceError> {
        customer::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(|e| {
                error!(error = %e, customer_id = %id, "Failed to fetch customer");
                ServiceError::DatabaseError(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("customer {}", id)))
    }

    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<customer::Model>, ServiceError> {
        Ok(customer::Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?)
    }

    /// Newest first, optionally filtered by name, phone or email.
    pub async fn list_customers(
        &self,
        search: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<CustomerResponse>, u64), ServiceError> {
        let mut query = customer::Entity::find().order_by_desc(customer::Column::CreatedAt);
        if let Some(term) = search.map(str::trim).filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(customer::Column::Name.contains(term))
                    .add(customer::Column::Phone.contains(term))
                    .add(customer::Column::Email.contains(term)),
            );
        }
        let paginator = query.paginate(&*self.db, per_page.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows.into_iter().map(CustomerResponse::from).collect(), total))
    }

    /// Replaces the measurement profile and appends a history snapshot.
    #[instrument(skip(self, request, actor), fields(customer_id = %customer_id))]
    pub async fn update_measurements(
        &self,
        customer_id: Uuid,
        request: UpdateMeasurementsRequest,
        actor: &Actor,
    ) -> Result<CustomerResponse, ServiceError> {
        request.validate()?;
        validate_measurements(&request.measurements)?;

        let txn = self.db.begin().await?;
        let result = async {
            let existing = customer::Entity::find_by_id(customer_id)
                .one(&txn)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("customer {}", customer_id)))?;
            let mut active = existing.into_active_model();
            active.measurements = Set(Some(request.measurements.clone()));
            let updated = active.update(&txn).await?;
            record_snapshot(
                &txn,
                customer_id,
                request.measurements.clone(),
                request.notes.clone(),
                actor,
            )
            .await?;
            Ok::<_, ServiceError>(updated)
        }
        .await;

        match result {
            Ok(updated) => {
                txn.commit().await?;
                info!(customer_id = %customer_id, "Measurements updated");
                Ok(updated.into())
            }
            Err(e) => {
                let _ = txn.rollback().await;
                Err(e)
            }
        }
    }

    /// Snapshots newest first.
    pub async fn measurement_history(
        &self,
        customer_id: Uuid,
    ) -> Result<Vec<MeasurementSnapshot>, ServiceError> {
        self.find(customer_id).await?;
        Ok(customer_measurement::Entity::find()
            .filter(customer_measurement::Column::CustomerId.eq(customer_id))
            .order_by_desc(customer_measurement::Column::CreatedAt)
            .all(&*self.db)
            .await?
            .into_iter()
            .map(MeasurementSnapshot::from)
            .collect())
    }
}

async fn record_snapshot<C: ConnectionTrait>(
    db: &C,
    customer_id: Uuid,
    measurements: serde_json::Value,
    notes: Option<String>,
    actor: &Actor,
) -> Result<(), ServiceError> {
    customer_measurement::ActiveModel {
        id: Set(Uuid::new_v4()),
        customer_id: Set(customer_id),
        measurements: Set(measurements),
        recorded_by: Set(actor.id),
        notes: Set(notes),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;
    Ok(())
}

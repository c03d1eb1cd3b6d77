// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Notification Repository
//!
//! Per-recipient notification rows in the `notifications` table.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;
use uuid::Uuid;

use crate::domain::notification::{Notification, NotificationKind};
use crate::domain::repository::{NotificationRepository, RepositoryError};

pub struct PostgresNotificationRepository {
    pool: PgPool,
}

impl PostgresNotificationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn notification_from_row(row: &sqlx::postgres::PgRow) -> Result<Notification, RepositoryError> {
    let kind: String = row.get("kind");
    let kind = NotificationKind::from_str(&kind)
        .ok_or_else(|| RepositoryError::Serialization(format!("unknown notification kind {kind:?}")))?;
    Ok(Notification {
        id: row.get("id"),
        user_id: row.get("user_id"),
        kind,
        title: row.get("title"),
        body: row.get("body"),
        payload: row.get("payload"),
        read: row.get("is_read"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl NotificationRepository for PostgresNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, title, body, payload, is_read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(&notification.payload)
        .bind(notification.read)
        .bind(notification.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to insert notification: {}", e)))?;
        Ok(())
    }

    async fn list_unread(&self, user_id: Uuid) -> Result<Vec<Notification>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, kind, title, body, payload, is_read, created_at
            FROM notifications
            WHERE user_id = $1 AND is_read = FALSE
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("notification {id}")));
        }
        Ok(())
    }
}

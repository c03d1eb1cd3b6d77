// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL User Repository
//!
//! The core only needs recipient resolution: active admin accounts.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::repository::{RepositoryError, UserRepository};
use crate::domain::user::{User, UserRole};

pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn list_active_admins(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, email, display_name, role, active
            FROM users
            WHERE role = 'admin' AND active = TRUE
            ORDER BY email ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let role: String = row.get("role");
                User {
                    id: row.get("id"),
                    email: row.get("email"),
                    display_name: row.get("display_name"),
                    role: UserRole::from_str(&role),
                    active: row.get("active"),
                }
            })
            .collect())
    }
}

//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `SubscriptionStore` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use academy_core::domain::{ActivatedSubscription, UserSubscription, Voucher};
use academy_core::ports::{PortError, PortResult, SubscriptionStore};
use academy_core::sheet::format_time_utc;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, SqlitePool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `SubscriptionStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

fn db_error(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct VoucherRecord {
    code: String,
    duration_days: i64,
    is_used: bool,
}

#[derive(FromRow)]
struct UserRecord {
    user_id: String,
    subscription_end: String,
    created_at: String,
}
impl UserRecord {
    fn to_domain(self) -> UserSubscription {
        UserSubscription {
            user_id: self.user_id,
            subscription_end: self.subscription_end,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `SubscriptionStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl SubscriptionStore for DbAdapter {
    async fn insert_vouchers(&self, vouchers: &[Voucher]) -> PortResult<Vec<String>> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut inserted = Vec::with_capacity(vouchers.len());
        for v in vouchers {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO vouchers (code, duration_days, is_used, used_by, used_at, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&v.code)
            .bind(i64::from(v.duration_days))
            .bind(v.is_used)
            .bind(&v.used_by)
            .bind(&v.used_at)
            .bind(&v.created_at)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
            if result.rows_affected() == 1 {
                inserted.push(v.code.clone());
            }
        }
        tx.commit().await.map_err(db_error)?;
        Ok(inserted)
    }

    /// Runs in one transaction. The `is_used = 0` guard on the update makes a
    /// concurrent second activation of the same code fail with `Conflict`.
    async fn activate_voucher(
        &self,
        user_id: &str,
        code: &str,
        now: DateTime<Utc>,
    ) -> PortResult<ActivatedSubscription> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let voucher: VoucherRecord =
            sqlx::query_as("SELECT code, duration_days, is_used FROM vouchers WHERE code = ?")
                .bind(code)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error)?
                .ok_or_else(|| PortError::NotFound("code not found".to_string()))?;

        if voucher.is_used {
            return Err(PortError::Conflict("code already used".to_string()));
        }

        let now_text = format_time_utc(now);
        let claimed = sqlx::query("UPDATE vouchers SET is_used = 1, used_by = ?, used_at = ? WHERE code = ? AND is_used = 0")
            .bind(user_id)
            .bind(&now_text)
            .bind(&voucher.code)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if claimed.rows_affected() == 0 {
            return Err(PortError::Conflict("code already used".to_string()));
        }

        let end = now + Duration::days(voucher.duration_days);
        sqlx::query(
            "INSERT INTO users (user_id, subscription_end, created_at) VALUES (?, ?, ?)
             ON CONFLICT(user_id) DO UPDATE SET subscription_end = excluded.subscription_end",
        )
        .bind(user_id)
        .bind(format_time_utc(end))
        .bind(&now_text)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;

        Ok(ActivatedSubscription {
            user_id: user_id.to_string(),
            subscription_end: end,
        })
    }

    async fn get_subscription(&self, user_id: &str) -> PortResult<Option<UserSubscription>> {
        let record: Option<UserRecord> =
            sqlx::query_as("SELECT user_id, subscription_end, created_at FROM users WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        Ok(record.map(UserRecord::to_domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use academy_core::subscription;
    use chrono::TimeZone;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn adapter() -> DbAdapter {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let db = DbAdapter::new(pool);
        db.run_migrations().await.unwrap();
        db
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn second_activation_is_rejected() {
        let db = adapter().await;
        let codes = subscription::generate_vouchers(&db, 2, 30, now()).await.unwrap();

        let sub = subscription::activate_voucher(&db, "user-1", &codes[0], now()).await.unwrap();
        assert_eq!(sub.subscription_end, now() + Duration::days(30));

        let again = subscription::activate_voucher(&db, "user-2", &codes[0], now()).await;
        assert_eq!(again, Err(PortError::Conflict("code already used".to_string())));

        let missing = subscription::activate_voucher(&db, "user-1", "ZZZZZZZZZZZZ", now()).await;
        assert_eq!(missing, Err(PortError::NotFound("code not found".to_string())));
    }

    #[tokio::test]
    async fn activation_extends_existing_user() {
        let db = adapter().await;
        let codes = subscription::generate_vouchers(&db, 2, 10, now()).await.unwrap();
        subscription::activate_voucher(&db, "user-1", &codes[0], now()).await.unwrap();

        let later = now() + Duration::days(20);
        subscription::activate_voucher(&db, "user-1", &codes[1], later).await.unwrap();

        let stored = db.get_subscription("user-1").await.unwrap().unwrap();
        assert_eq!(stored.subscription_end, format_time_utc(later + Duration::days(10)));
        assert_eq!(stored.created_at, format_time_utc(now()));
        assert!(subscription::is_premium(&db, "user-1", later).await.unwrap());
        assert!(!subscription::is_premium(&db, "nobody", later).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_codes_are_ignored() {
        let db = adapter().await;
        let voucher = Voucher {
            code: "ABCDEFGHJKLM".to_string(),
            duration_days: 30,
            is_used: false,
            used_by: None,
            used_at: None,
            created_at: format_time_utc(now()),
        };
        let stored = db.insert_vouchers(&[voucher.clone(), voucher]).await.unwrap();
        assert_eq!(stored, vec!["ABCDEFGHJKLM".to_string()]);
    }
}

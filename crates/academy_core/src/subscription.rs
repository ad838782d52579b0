//! crates/academy_core/src/subscription.rs
//!
//! Voucher issuing and the premium check built on top of the `SubscriptionStore` port.

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{info, warn};

use crate::domain::{ActivatedSubscription, Voucher};
use crate::ports::{PortError, PortResult, SubscriptionStore};
use crate::sheet;

/// Upper-case letters and digits without the easily confused `I`, `O`, `0`, `1`.
pub const VOUCHER_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const VOUCHER_CODE_LEN: usize = 12;
pub const MAX_VOUCHERS_PER_BATCH: u32 = 1000;
pub const MAX_VOUCHER_DAYS: u32 = 3650;
const GENERATION_ROUNDS: usize = 5;

pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..VOUCHER_CODE_LEN)
        .map(|_| VOUCHER_ALPHABET[rng.random_range(0..VOUCHER_ALPHABET.len())] as char)
        .collect()
}

/// Codes are matched case-insensitively and without surrounding whitespace.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Creates `count` fresh vouchers worth `duration_days` each and returns the
/// codes that were actually stored.
pub async fn generate_vouchers(
    store: &dyn SubscriptionStore,
    count: u32,
    duration_days: u32,
    now: DateTime<Utc>,
) -> PortResult<Vec<String>> {
    generate_with(store, count, duration_days, now, random_code).await
}

async fn generate_with(
    store: &dyn SubscriptionStore,
    count: u32,
    duration_days: u32,
    now: DateTime<Utc>,
    mut next_code: impl FnMut() -> String,
) -> PortResult<Vec<String>> {
    if count == 0 || count > MAX_VOUCHERS_PER_BATCH {
        return Err(PortError::InvalidInput(format!(
            "count must be between 1 and {}",
            MAX_VOUCHERS_PER_BATCH
        )));
    }
    if duration_days == 0 || duration_days > MAX_VOUCHER_DAYS {
        return Err(PortError::InvalidInput(format!(
            "duration_days must be between 1 and {}",
            MAX_VOUCHER_DAYS
        )));
    }

    let created_at = sheet::format_time_utc(now);
    let wanted = count as usize;
    let mut codes = Vec::with_capacity(wanted);
    // Colliding codes are skipped by the store and drawn again.
    for _ in 0..GENERATION_ROUNDS {
        let vouchers: Vec<Voucher> = (codes.len()..wanted)
            .map(|_| Voucher {
                code: next_code(),
                duration_days,
                is_used: false,
                used_by: None,
                used_at: None,
                created_at: created_at.clone(),
            })
            .collect();
        codes.extend(store.insert_vouchers(&vouchers).await?);
        if codes.len() == wanted {
            break;
        }
    }

    if codes.len() < wanted {
        warn!(requested = count, stored = codes.len(), "voucher codes kept colliding");
    }
    info!(requested = count, stored = codes.len(), duration_days, "vouchers generated");
    Ok(codes)
}

pub async fn activate_voucher(
    store: &dyn SubscriptionStore,
    user_id: &str,
    code: &str,
    now: DateTime<Utc>,
) -> PortResult<ActivatedSubscription> {
    let user_id = user_id.trim();
    let code = normalize_code(code);
    if user_id.is_empty() || code.is_empty() {
        return Err(PortError::InvalidInput("user_id and code are required".to_string()));
    }
    let activated = store.activate_voucher(user_id, &code, now).await?;
    info!(user_id, until = %activated.subscription_end, "voucher activated");
    Ok(activated)
}

/// True only for a stored subscription whose end parses and lies after `now`.
pub async fn is_premium(store: &dyn SubscriptionStore, user_id: &str, now: DateTime<Utc>) -> PortResult<bool> {
    let Some(sub) = store.get_subscription(user_id.trim()).await? else {
        return Ok(false);
    };
    Ok(sheet::parse_time_utc(&sub.subscription_end).is_some_and(|end| end > now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserSubscription;
    use crate::testing::MemorySubscriptions;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn codes_use_the_restricted_alphabet() {
        for _ in 0..50 {
            let code = random_code();
            assert_eq!(code.len(), VOUCHER_CODE_LEN);
            assert!(code.bytes().all(|b| VOUCHER_ALPHABET.contains(&b)));
        }
    }

    #[tokio::test]
    async fn voucher_activates_exactly_once() {
        let store = MemorySubscriptions::default();
        let codes = generate_vouchers(&store, 3, 30, now()).await.unwrap();
        assert_eq!(codes.len(), 3);

        let code = codes[0].to_lowercase();
        let sub = activate_voucher(&store, "u1", &code, now()).await.unwrap();
        assert_eq!(sub.subscription_end, now() + Duration::days(30));

        let again = activate_voucher(&store, "u2", &codes[0], now()).await;
        assert!(matches!(again, Err(PortError::Conflict(_))));

        let unknown = activate_voucher(&store, "u1", "NOPE", now()).await;
        assert!(matches!(unknown, Err(PortError::NotFound(_))));
    }

    #[tokio::test]
    async fn colliding_codes_are_drawn_again() {
        let store = MemorySubscriptions::default();
        generate_with(&store, 1, 30, now(), || "TAKENCODE234".to_string())
            .await
            .unwrap();

        let mut draws = vec!["FRESHCODE567", "TAKENCODE234", "TAKENCODE234"];
        let codes = generate_with(&store, 2, 30, now(), || draws.pop().unwrap_or("NEVER").to_string())
            .await
            .unwrap();
        assert_eq!(codes, vec!["FRESHCODE567".to_string(), "NEVER".to_string()]);
    }

    #[tokio::test]
    async fn codes_that_never_store_are_not_returned() {
        let store = MemorySubscriptions::default();
        generate_with(&store, 1, 30, now(), || "TAKENCODE234".to_string())
            .await
            .unwrap();
        let codes = generate_with(&store, 3, 30, now(), || "TAKENCODE234".to_string())
            .await
            .unwrap();
        assert!(codes.is_empty());
    }

    #[tokio::test]
    async fn premium_check_fails_closed() {
        let store = MemorySubscriptions::default();
        assert!(!is_premium(&store, "ghost", now()).await.unwrap());

        let codes = generate_vouchers(&store, 1, 7, now()).await.unwrap();
        activate_voucher(&store, "u1", &codes[0], now()).await.unwrap();
        assert!(is_premium(&store, "u1", now()).await.unwrap());
        assert!(!is_premium(&store, "u1", now() + Duration::days(8)).await.unwrap());

        store.put_subscription(UserSubscription {
            user_id: "u2".into(),
            subscription_end: "someday".into(),
            created_at: "2026-01-01T00:00:00+00:00".into(),
        });
        assert!(!is_premium(&store, "u2", now()).await.unwrap());
    }

    #[tokio::test]
    async fn batch_limits_are_enforced() {
        let store = MemorySubscriptions::default();
        assert!(generate_vouchers(&store, 0, 30, now()).await.is_err());
        assert!(generate_vouchers(&store, 1001, 30, now()).await.is_err());
        assert!(generate_vouchers(&store, 1, 0, now()).await.is_err());
    }
}

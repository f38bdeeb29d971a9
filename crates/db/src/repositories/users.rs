use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use gigboard_core::domain::user::{User, UserId};

use super::{JoinOutcome, LeaveOutcome, RepositoryError, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn ensure_user(
        &self,
        id: UserId,
        username: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<User, RepositoryError> {
        sqlx::query(
            "INSERT INTO users (
                id,
                username,
                permanent_grant,
                subscription_until,
                credited_posts,
                referral_count,
                created_at
             ) VALUES (?, ?, 0, NULL, 0, 0, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = COALESCE(excluded.username, users.username)",
        )
        .bind(id.0)
        .bind(username)
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT
                id,
                username,
                permanent_grant,
                subscription_until,
                credited_posts,
                referral_count,
                created_at
             FROM users
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_one(&self.pool)
        .await?;

        user_from_row(row)
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                username,
                permanent_grant,
                subscription_until,
                credited_posts,
                referral_count,
                created_at
             FROM users
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                username,
                permanent_grant,
                subscription_until,
                credited_posts,
                referral_count,
                created_at
             FROM users
             WHERE username = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        row.map(user_from_row).transpose()
    }

    async fn set_permanent_grant(
        &self,
        id: UserId,
        granted: bool,
    ) -> Result<bool, RepositoryError> {
        let affected = sqlx::query("UPDATE users SET permanent_grant = ? WHERE id = ?")
            .bind(granted)
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }

    async fn set_subscription_until(
        &self,
        id: UserId,
        until: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let affected = sqlx::query("UPDATE users SET subscription_until = ? WHERE id = ?")
            .bind(until.to_rfc3339())
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }

    async fn add_credits(&self, id: UserId, amount: u32) -> Result<bool, RepositoryError> {
        let affected =
            sqlx::query("UPDATE users SET credited_posts = credited_posts + ? WHERE id = ?")
                .bind(i64::from(amount))
                .bind(id.0)
                .execute(&self.pool)
                .await?
                .rows_affected();

        Ok(affected > 0)
    }

    async fn record_member_join(
        &self,
        inviter: UserId,
        member: UserId,
        bonus_every: u32,
        now: DateTime<Utc>,
    ) -> Result<JoinOutcome, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match join_in_tx(&mut conn, inviter, member, bonus_every, now).await {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    async fn record_member_leave(
        &self,
        member: UserId,
        bonus_every: u32,
    ) -> Result<LeaveOutcome, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match leave_in_tx(&mut conn, member, bonus_every).await {
            Ok(outcome) => {
                sqlx::query("COMMIT").execute(&mut *conn).await?;
                Ok(outcome)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    async fn count_users(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users").fetch_one(&self.pool).await?;
        parse_count("count", row.try_get("count")?)
    }

    async fn count_active_subscriptions(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM users
             WHERE subscription_until IS NOT NULL AND subscription_until > ?",
        )
        .bind(now.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;
        parse_count("count", row.try_get("count")?)
    }

    async fn count_permanent_grantees(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM users WHERE permanent_grant = 1")
            .fetch_one(&self.pool)
            .await?;
        parse_count("count", row.try_get("count")?)
    }
}

async fn join_in_tx(
    conn: &mut sqlx::SqliteConnection,
    inviter: UserId,
    member: UserId,
    bonus_every: u32,
    now: DateTime<Utc>,
) -> Result<JoinOutcome, RepositoryError> {
    // Inviters can earn referrals before their first direct interaction.
    sqlx::query(
        "INSERT INTO users (
            id,
            username,
            permanent_grant,
            subscription_until,
            credited_posts,
            referral_count,
            created_at
         ) VALUES (?, NULL, 0, NULL, 0, 0, ?)
         ON CONFLICT(id) DO NOTHING",
    )
    .bind(inviter.0)
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await?;

    let attributed = sqlx::query(
        "INSERT INTO referral_edges (member_id, inviter_id, created_at)
         VALUES (?, ?, ?)
         ON CONFLICT(member_id) DO NOTHING",
    )
    .bind(member.0)
    .bind(inviter.0)
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await?
    .rows_affected();

    if attributed == 0 {
        let row = sqlx::query("SELECT referral_count FROM users WHERE id = ?")
            .bind(inviter.0)
            .fetch_one(&mut *conn)
            .await?;
        let referral_count = parse_u32("referral_count", row.try_get("referral_count")?)?;
        return Ok(JoinOutcome { counted: false, referral_count, bonus_granted: false });
    }

    let row = sqlx::query(
        "UPDATE users SET referral_count = referral_count + 1
         WHERE id = ?
         RETURNING referral_count",
    )
    .bind(inviter.0)
    .fetch_one(&mut *conn)
    .await?;
    let referral_count = parse_u32("referral_count", row.try_get("referral_count")?)?;

    let bonus_granted = bonus_every > 0 && referral_count % bonus_every == 0;
    if bonus_granted {
        sqlx::query("UPDATE users SET credited_posts = credited_posts + 1 WHERE id = ?")
            .bind(inviter.0)
            .execute(&mut *conn)
            .await?;
    }

    Ok(JoinOutcome { counted: true, referral_count, bonus_granted })
}

async fn leave_in_tx(
    conn: &mut sqlx::SqliteConnection,
    member: UserId,
    bonus_every: u32,
) -> Result<LeaveOutcome, RepositoryError> {
    let edge = sqlx::query("DELETE FROM referral_edges WHERE member_id = ? RETURNING inviter_id")
        .bind(member.0)
        .fetch_optional(&mut *conn)
        .await?;

    let Some(edge_row) = edge else {
        return Ok(LeaveOutcome { inviter: None, referral_count: 0, bonus_revoked: false });
    };
    let inviter = UserId(edge_row.try_get("inviter_id")?);

    let updated = sqlx::query(
        "UPDATE users SET referral_count = referral_count - 1
         WHERE id = ? AND referral_count > 0
         RETURNING referral_count",
    )
    .bind(inviter.0)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(count_row) = updated else {
        return Ok(LeaveOutcome { inviter: Some(inviter), referral_count: 0, bonus_revoked: false });
    };
    let referral_count = parse_u32("referral_count", count_row.try_get("referral_count")?)?;

    // Revocation is best-effort: a credit already spent on a publish is
    // never clawed back and the balance never goes negative.
    let left_boundary = bonus_every > 0 && (referral_count + 1) % bonus_every == 0;
    let bonus_revoked = if left_boundary {
        sqlx::query(
            "UPDATE users SET credited_posts = credited_posts - 1
             WHERE id = ? AND credited_posts > 0",
        )
        .bind(inviter.0)
        .execute(&mut *conn)
        .await?
        .rows_affected()
            > 0
    } else {
        false
    };

    Ok(LeaveOutcome { inviter: Some(inviter), referral_count, bonus_revoked })
}

fn user_from_row(row: SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.try_get("id")?),
        username: row.try_get("username")?,
        permanent_grant: row.try_get("permanent_grant")?,
        subscription_until: parse_optional_timestamp(
            "subscription_until",
            row.try_get("subscription_until")?,
        )?,
        credited_posts: parse_u32("credited_posts", row.try_get("credited_posts")?)?,
        referral_count: parse_u32("referral_count", row.try_get("referral_count")?)?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_u32(column: &str, value: i64) -> Result<u32, RepositoryError> {
    u32::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u32): {value}"
        ))
    })
}

fn parse_count(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!("invalid value for `{column}` (expected count): {value}"))
    })
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

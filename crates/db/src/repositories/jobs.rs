use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use gigboard_core::domain::job::{ChannelMessageId, Job, JobId};
use gigboard_core::domain::payload::JobPayload;
use gigboard_core::domain::user::UserId;
use gigboard_core::entitlement::Consumption;

use super::{CommitOutcome, JobRepository, NewJob, RepositoryError};
use crate::DbPool;

pub struct SqlJobRepository {
    pool: DbPool,
}

impl SqlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl JobRepository for SqlJobRepository {
    async fn find_by_id(&self, id: JobId) -> Result<Option<Job>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, user_id, channel_message_id, payload_json, created_at
             FROM jobs
             WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }

    async fn list_for_owner(&self, owner: UserId) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, user_id, channel_message_id, payload_json, created_at
             FROM jobs
             WHERE user_id = ?
             ORDER BY id DESC",
        )
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(job_from_row).collect()
    }

    async fn count_for_owner(&self, owner: UserId) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM jobs WHERE user_id = ?")
            .bind(owner.0)
            .fetch_one(&self.pool)
            .await?;
        parse_count("count", row.try_get("count")?)
    }

    async fn count_all(&self) -> Result<u64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM jobs").fetch_one(&self.pool).await?;
        parse_count("count", row.try_get("count")?)
    }

    async fn has_duplicate_since(
        &self,
        owner: UserId,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS count FROM jobs
             WHERE user_id = ? AND payload_fingerprint = ? AND created_at > ?",
        )
        .bind(owner.0)
        .bind(fingerprint)
        .bind(since.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.try_get::<i64, _>("count")? > 0)
    }

    async fn commit_published(
        &self,
        job: NewJob,
        consumption: Consumption,
        dedup_since: DateTime<Utc>,
    ) -> Result<CommitOutcome, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match commit_in_tx(&mut conn, job, consumption, dedup_since).await {
            Ok(outcome) => {
                match outcome {
                    CommitOutcome::Committed(_) => {
                        sqlx::query("COMMIT").execute(&mut *conn).await?;
                    }
                    CommitOutcome::EntitlementGone | CommitOutcome::DuplicatePayload => {
                        let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                    }
                }
                Ok(outcome)
            }
            Err(error) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(error)
            }
        }
    }

    async fn update_payload(
        &self,
        id: JobId,
        payload: &JobPayload,
        fingerprint: &str,
    ) -> Result<Option<Job>, RepositoryError> {
        let payload_json = encode_payload(payload)?;

        let row = sqlx::query(
            "UPDATE jobs SET payload_json = ?, payload_fingerprint = ?
             WHERE id = ?
             RETURNING id, user_id, channel_message_id, payload_json, created_at",
        )
        .bind(payload_json)
        .bind(fingerprint)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(job_from_row).transpose()
    }

    async fn delete(&self, id: JobId) -> Result<bool, RepositoryError> {
        let affected = sqlx::query("DELETE FROM jobs WHERE id = ?")
            .bind(id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();

        Ok(affected > 0)
    }
}

async fn commit_in_tx(
    conn: &mut sqlx::SqliteConnection,
    job: NewJob,
    consumption: Consumption,
    dedup_since: DateTime<Utc>,
) -> Result<CommitOutcome, RepositoryError> {
    let duplicates = sqlx::query(
        "SELECT COUNT(*) AS count FROM jobs
         WHERE user_id = ? AND payload_fingerprint = ? AND created_at > ?",
    )
    .bind(job.owner.0)
    .bind(&job.fingerprint)
    .bind(dedup_since.to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;
    if duplicates.try_get::<i64, _>("count")? > 0 {
        return Ok(CommitOutcome::DuplicatePayload);
    }

    // Entitlement state may have shifted between the read-only evaluation
    // and this commit. Re-verify whatever the decision was based on and
    // bail out rather than publish on stale grounds.
    match consumption {
        Consumption::None => {}
        Consumption::Credit => {
            let affected = sqlx::query(
                "UPDATE users SET credited_posts = credited_posts - 1
                 WHERE id = ? AND credited_posts > 0",
            )
            .bind(job.owner.0)
            .execute(&mut *conn)
            .await?
            .rows_affected();
            if affected == 0 {
                return Ok(CommitOutcome::EntitlementGone);
            }
        }
        Consumption::FirstPost => {
            let row = sqlx::query("SELECT COUNT(*) AS count FROM jobs WHERE user_id = ?")
                .bind(job.owner.0)
                .fetch_one(&mut *conn)
                .await?;
            if row.try_get::<i64, _>("count")? > 0 {
                return Ok(CommitOutcome::EntitlementGone);
            }
        }
    }

    let inserted = sqlx::query(
        "INSERT INTO jobs (user_id, channel_message_id, payload_json, payload_fingerprint, created_at)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id",
    )
    .bind(job.owner.0)
    .bind(job.channel_message_id.0)
    .bind(encode_payload(&job.payload)?)
    .bind(&job.fingerprint)
    .bind(job.created_at.to_rfc3339())
    .fetch_one(&mut *conn)
    .await?;

    Ok(CommitOutcome::Committed(Job {
        id: JobId(inserted.try_get("id")?),
        owner: job.owner,
        channel_message_id: job.channel_message_id,
        payload: job.payload,
        created_at: job.created_at,
    }))
}

fn job_from_row(row: SqliteRow) -> Result<Job, RepositoryError> {
    let payload_json: String = row.try_get("payload_json")?;
    let payload: JobPayload = serde_json::from_str(&payload_json).map_err(|error| {
        RepositoryError::Decode(format!("invalid job payload json: {error}"))
    })?;

    Ok(Job {
        id: JobId(row.try_get("id")?),
        owner: UserId(row.try_get("user_id")?),
        channel_message_id: ChannelMessageId(row.try_get("channel_message_id")?),
        payload,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn encode_payload(payload: &JobPayload) -> Result<String, RepositoryError> {
    serde_json::to_string(payload)
        .map_err(|error| RepositoryError::Decode(format!("encode job payload: {error}")))
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

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};

    use gigboard_core::domain::job::{ChannelMessageId, JobId};
    use gigboard_core::domain::payload::JobPayload;
    use gigboard_core::domain::user::UserId;
    use gigboard_core::entitlement::Consumption;
    use gigboard_core::fingerprint::submission_fingerprint;

    use super::SqlJobRepository;
    use crate::migrations;
    use crate::repositories::{
        CommitOutcome, JobRepository, NewJob, SqlUserRepository, UserRepository,
    };
    use crate::{connect_with_settings, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_payload(title: &str) -> JobPayload {
        JobPayload {
            address: "12 Harbor Lane".into(),
            title: title.into(),
            payment: "25/hr".into(),
            contact: "+49 151 1234567".into(),
            note: None,
        }
    }

    fn new_job(owner: UserId, message: i64, title: &str, created_at: DateTime<Utc>) -> NewJob {
        let payload = sample_payload(title);
        let fingerprint = submission_fingerprint(owner, &payload);
        NewJob {
            owner,
            channel_message_id: ChannelMessageId(message),
            payload,
            fingerprint,
            created_at,
        }
    }

    async fn seed_user(pool: &DbPool, id: UserId) {
        SqlUserRepository::new(pool.clone())
            .ensure_user(id, None, Utc::now())
            .await
            .expect("seed user");
    }

    #[tokio::test]
    async fn committed_jobs_round_trip_and_list_newest_first() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_001);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let first = repo
            .commit_published(new_job(owner, 900, "Window cleaning", now), Consumption::None, now)
            .await
            .expect("commit first");
        let CommitOutcome::Committed(first) = first else {
            panic!("expected committed outcome, got {first:?}");
        };

        let second = repo
            .commit_published(new_job(owner, 901, "Gutter repair", now), Consumption::None, now)
            .await
            .expect("commit second");
        let CommitOutcome::Committed(second) = second else {
            panic!("expected committed outcome, got {second:?}");
        };

        let fetched = repo.find_by_id(first.id).await.expect("find").expect("exists");
        assert_eq!(fetched.payload.title, "Window cleaning");
        assert_eq!(fetched.channel_message_id, ChannelMessageId(900));

        let listing = repo.list_for_owner(owner).await.expect("list");
        assert_eq!(
            listing.iter().map(|job| job.id).collect::<Vec<_>>(),
            vec![second.id, first.id],
            "listings are newest first"
        );
        assert_eq!(repo.count_for_owner(owner).await.expect("count"), 2);

        pool.close().await;
    }

    #[tokio::test]
    async fn credit_consumption_decrements_exactly_once() {
        let pool = setup_pool().await;
        let users = SqlUserRepository::new(pool.clone());
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_010);

        seed_user(&pool, owner).await;
        users.add_credits(owner, 1).await.expect("credit");

        let now = Utc::now();
        let outcome = repo
            .commit_published(new_job(owner, 910, "Dog walking", now), Consumption::Credit, now)
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let user = users.find_by_id(owner).await.expect("find").expect("exists");
        assert_eq!(user.credited_posts, 0);

        // The credit is gone, so a second consuming commit must refuse and
        // leave no row behind.
        let outcome = repo
            .commit_published(new_job(owner, 911, "Cat sitting", now), Consumption::Credit, now)
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::EntitlementGone));
        assert_eq!(repo.count_for_owner(owner).await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn first_post_commit_requires_zero_prior_rows() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_020);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let outcome = repo
            .commit_published(new_job(owner, 920, "Fence painting", now), Consumption::FirstPost, now)
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let outcome = repo
            .commit_published(new_job(owner, 921, "Hedge trimming", now), Consumption::FirstPost, now)
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::EntitlementGone));
        assert_eq!(repo.count_for_owner(owner).await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn identical_payload_inside_the_window_is_rejected() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_030);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let window_start = now - Duration::seconds(60);

        let outcome = repo
            .commit_published(
                new_job(owner, 930, "Moving help", now),
                Consumption::None,
                window_start,
            )
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let outcome = repo
            .commit_published(
                new_job(owner, 931, "Moving help", now),
                Consumption::None,
                window_start,
            )
            .await
            .expect("duplicate commit");
        assert!(matches!(outcome, CommitOutcome::DuplicatePayload));
        assert_eq!(repo.count_for_owner(owner).await.expect("count"), 1);

        pool.close().await;
    }

    #[tokio::test]
    async fn window_expiry_allows_an_identical_repost() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_040);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let outcome = repo
            .commit_published(
                new_job(owner, 940, "Weekly errands", now - Duration::seconds(600)),
                Consumption::None,
                now - Duration::seconds(660),
            )
            .await
            .expect("commit old");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        let payload = sample_payload("Weekly errands");
        let fingerprint = submission_fingerprint(owner, &payload);
        assert!(
            !repo
                .has_duplicate_since(owner, &fingerprint, now - Duration::seconds(60))
                .await
                .expect("probe"),
            "a 10 minute old row is outside a 60 second window"
        );

        let outcome = repo
            .commit_published(
                new_job(owner, 941, "Weekly errands", now),
                Consumption::None,
                now - Duration::seconds(60),
            )
            .await
            .expect("repost");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        pool.close().await;
    }

    #[tokio::test]
    async fn update_payload_rewrites_content_in_place() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_050);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let outcome = repo
            .commit_published(new_job(owner, 950, "Tutoring", now), Consumption::None, now)
            .await
            .expect("commit");
        let CommitOutcome::Committed(job) = outcome else {
            panic!("expected committed outcome, got {outcome:?}");
        };

        let mut revised = job.payload.clone();
        revised.payment = "30/hr".into();
        let fingerprint = submission_fingerprint(owner, &revised);

        let updated = repo
            .update_payload(job.id, &revised, &fingerprint)
            .await
            .expect("update")
            .expect("job exists");
        assert_eq!(updated.id, job.id);
        assert_eq!(updated.channel_message_id, job.channel_message_id);
        assert_eq!(updated.payload.payment, "30/hr");

        assert!(
            repo.has_duplicate_since(owner, &fingerprint, now - Duration::seconds(60))
                .await
                .expect("probe"),
            "the stored fingerprint follows the payload"
        );

        let missing = repo
            .update_payload(JobId(999_999_999), &revised, &fingerprint)
            .await
            .expect("update missing");
        assert!(missing.is_none());

        pool.close().await;
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_060);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let outcome = repo
            .commit_published(new_job(owner, 960, "Snow shoveling", now), Consumption::None, now)
            .await
            .expect("commit");
        let CommitOutcome::Committed(job) = outcome else {
            panic!("expected committed outcome, got {outcome:?}");
        };

        assert!(repo.delete(job.id).await.expect("delete"));
        assert!(repo.find_by_id(job.id).await.expect("find").is_none());
        assert!(!repo.delete(job.id).await.expect("second delete"));

        pool.close().await;
    }

    #[tokio::test]
    async fn deleting_an_owner_cascades_to_their_jobs() {
        let pool = setup_pool().await;
        let repo = SqlJobRepository::new(pool.clone());
        let owner = UserId(202_070);
        seed_user(&pool, owner).await;

        let now = Utc::now();
        let outcome = repo
            .commit_published(new_job(owner, 970, "Leaf raking", now), Consumption::None, now)
            .await
            .expect("commit");
        assert!(matches!(outcome, CommitOutcome::Committed(_)));

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(owner.0)
            .execute(&pool)
            .await
            .expect("delete owner");

        assert_eq!(repo.count_for_owner(owner).await.expect("count"), 0);

        pool.close().await;
    }
}

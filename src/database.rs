use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlx::SqliteExecutor;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::create_timestamp;
use crate::model::{ExecutionResult, POINTS_PER_SOLVE, SolveRecord};

const DATABASE_NAME: &str = "judgebox.sqlite3";

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRecord {
    pub id: i64,
    pub user_id: String,
    pub language: String,
    pub code: String,
    pub stdin: String,
    pub stdout: String,
    pub stderr: String,
    pub returncode: i64,
    pub outcome: String,
    pub created_time: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct SolutionRecord {
    pub user_id: String,
    pub challenge_id: u32,
    pub code: String,
    pub language: String,
    pub is_correct: bool,
    pub updated_time: String,
}

#[derive(sqlx::FromRow, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub points: i64,
    pub solved: i64,
    pub programs_executed: i64,
}

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "judgebox").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(0) // Allow pool to shrink when idle
        .connect(&db_url)
        .await?;

    // Execute PRAGMA statements first (these cannot be run inside a transaction)
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    let mut tx = db_pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id            INTEGER  PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT     NOT NULL,
            language      TEXT     NOT NULL,
            code          TEXT     NOT NULL,
            stdin         TEXT     NOT NULL DEFAULT '',
            stdout        TEXT     NOT NULL DEFAULT '',
            stderr        TEXT     NOT NULL DEFAULT '',
            returncode    INTEGER  NOT NULL,
            outcome       TEXT     NOT NULL,
            created_time  TEXT     NOT NULL
        );",
        "CREATE INDEX IF NOT EXISTS idx_submissions_user ON submissions(user_id);",
        r"
        CREATE TABLE IF NOT EXISTS solutions (
            user_id       TEXT     NOT NULL,
            challenge_id  INTEGER  NOT NULL,
            code          TEXT     NOT NULL,
            language      TEXT     NOT NULL,
            is_correct    INTEGER  NOT NULL,
            updated_time  TEXT     NOT NULL,
            PRIMARY KEY (user_id, challenge_id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS awards (
            user_id       TEXT     NOT NULL,
            challenge_id  INTEGER  NOT NULL,
            awarded_time  TEXT     NOT NULL,
            PRIMARY KEY (user_id, challenge_id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS profiles (
            user_id       TEXT     PRIMARY KEY,
            points        INTEGER  NOT NULL DEFAULT 0
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // Remove WAL and SHM files (ignore errors as they might not exist)
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Stores one single-run invocation and returns the stored record
pub async fn save_submission(
    pool: &SqlitePool,
    user_id: &str,
    language: &str,
    code: &str,
    stdin: &str,
    result: &ExecutionResult,
) -> sqlx::Result<SubmissionRecord> {
    let now = create_timestamp();

    sqlx::query_as::<_, SubmissionRecord>(
        r#"
        INSERT INTO submissions (user_id, language, code, stdin, stdout, stderr, returncode, outcome, created_time)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, user_id, language, code, stdin, stdout, stderr, returncode, outcome, created_time
        "#,
    )
    .bind(user_id)
    .bind(language)
    .bind(code)
    .bind(stdin)
    .bind(&result.stdout)
    .bind(&result.stderr)
    .bind(result.exit_code)
    .bind(result.outcome.as_str())
    .bind(now)
    .fetch_one(pool)
    .await
}

/// Records a graded solution and awards points for a first correct solve
///
/// The solution row is upserted (latest attempt wins). When `all_passed`,
/// the `awards` primary key decides whether this is the first correct solve
/// of (user, challenge); only then is the profile incremented. Both happen
/// in one transaction, so concurrent duplicate submissions award once.
pub async fn record_solution(
    pool: &SqlitePool,
    user_id: &str,
    challenge_id: u32,
    code: &str,
    language: &str,
    all_passed: bool,
) -> sqlx::Result<(SolutionRecord, SolveRecord)> {
    let now = create_timestamp();
    let mut tx = pool.begin().await?;

    let solution = sqlx::query_as::<_, SolutionRecord>(
        r#"
        INSERT INTO solutions (user_id, challenge_id, code, language, is_correct, updated_time)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT (user_id, challenge_id) DO UPDATE SET
            code = excluded.code,
            language = excluded.language,
            is_correct = excluded.is_correct,
            updated_time = excluded.updated_time
        RETURNING user_id, challenge_id, code, language, is_correct, updated_time
        "#,
    )
    .bind(user_id)
    .bind(challenge_id)
    .bind(code)
    .bind(language)
    .bind(all_passed)
    .bind(&now)
    .fetch_one(tx.as_mut())
    .await?;

    let first_correct_solve = if all_passed {
        sqlx::query(
            "INSERT OR IGNORE INTO awards (user_id, challenge_id, awarded_time) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(challenge_id)
        .bind(&now)
        .execute(tx.as_mut())
        .await?
        .rows_affected()
            == 1
    } else {
        false
    };

    if first_correct_solve {
        sqlx::query(
            r#"
            INSERT INTO profiles (user_id, points) VALUES (?, ?)
            ON CONFLICT (user_id) DO UPDATE SET points = points + excluded.points
            "#,
        )
        .bind(user_id)
        .bind(POINTS_PER_SOLVE)
        .execute(tx.as_mut())
        .await?;
    }

    let points = fetch_points(tx.as_mut(), user_id).await?;

    tx.commit().await?;

    if first_correct_solve {
        log::info!("Awarded {POINTS_PER_SOLVE} point to {user_id} for challenge {challenge_id}");
    }

    Ok((
        solution,
        SolveRecord {
            first_correct_solve,
            points,
        },
    ))
}

/// Points of `user_id`, 0 when no profile exists yet
pub async fn fetch_points<'e, E>(executor: E, user_id: &str) -> sqlx::Result<i64>
where
    E: SqliteExecutor<'e>,
{
    let points = sqlx::query_scalar::<_, i64>("SELECT points FROM profiles WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(executor)
        .await?;
    Ok(points.unwrap_or(0))
}

pub async fn fetch_leaderboard(pool: &SqlitePool) -> sqlx::Result<Vec<LeaderboardEntry>> {
    sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT p.user_id, p.points,
               (SELECT COUNT(*) FROM awards a WHERE a.user_id = p.user_id) AS solved,
               (SELECT COUNT(*) FROM submissions s WHERE s.user_id = p.user_id) AS programs_executed
        FROM profiles p
        ORDER BY p.points DESC, p.user_id
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn fetch_user_solutions(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<SolutionRecord>> {
    sqlx::query_as::<_, SolutionRecord>(
        r#"
        SELECT user_id, challenge_id, code, language, is_correct, updated_time
        FROM solutions
        WHERE user_id = ?
        ORDER BY challenge_id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn fetch_submissions(
    pool: &SqlitePool,
    user_id: &str,
) -> sqlx::Result<Vec<SubmissionRecord>> {
    sqlx::query_as::<_, SubmissionRecord>(
        r#"
        SELECT id, user_id, language, code, stdin, stdout, stderr, returncode, outcome, created_time
        FROM submissions
        WHERE user_id = ?
        ORDER BY id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

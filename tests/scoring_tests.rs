use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePool;
use tempfile::TempDir;

use judgebox::database as db;
use judgebox::model::{ExecutionResult, SolveRecord};

async fn test_db() -> (SqlitePool, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = db::init_db(dir.path().join("scores.sqlite3")).await.unwrap();
    (pool, dir)
}

#[tokio::test]
async fn test_first_correct_solve_awards_points_once() {
    let (pool, _dir) = test_db().await;

    let (solution, record) = db::record_solution(&pool, "alice", 1, "print(5)", "python", true)
        .await
        .unwrap();
    assert!(solution.is_correct);
    assert_eq!(
        record,
        SolveRecord {
            first_correct_solve: true,
            points: 1,
        }
    );

    let (_, record) = db::record_solution(&pool, "alice", 1, "print(5)", "python", true)
        .await
        .unwrap();
    assert_eq!(
        record,
        SolveRecord {
            first_correct_solve: false,
            points: 1,
        }
    );
    assert_eq!(db::fetch_points(&pool, "alice").await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_attempts_do_not_score() {
    let (pool, _dir) = test_db().await;

    let (solution, record) = db::record_solution(&pool, "bob", 2, "wrong", "cpp", false)
        .await
        .unwrap();
    assert!(!solution.is_correct);
    assert!(!record.first_correct_solve);
    assert_eq!(record.points, 0);

    // A later correct attempt is still the first correct solve
    let (solution, record) = db::record_solution(&pool, "bob", 2, "right", "cpp", true)
        .await
        .unwrap();
    assert_eq!(solution.code, "right");
    assert!(record.first_correct_solve);

    // A regression overwrites the stored solution but keeps the points
    let (solution, record) = db::record_solution(&pool, "bob", 2, "worse", "cpp", false)
        .await
        .unwrap();
    assert!(!solution.is_correct);
    assert_eq!(record.points, 1);

    let solutions = db::fetch_user_solutions(&pool, "bob").await.unwrap();
    assert_eq!(solutions.len(), 1);
    assert_eq!(solutions[0].code, "worse");
}

#[tokio::test]
async fn test_concurrent_duplicate_solves_award_once() {
    let (pool, _dir) = test_db().await;

    let attempts = (0..8).map(|_| {
        let pool = pool.clone();
        tokio::spawn(
            async move { db::record_solution(&pool, "carol", 3, "ok", "python", true).await },
        )
    });
    let mut firsts = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        let (_, record) = attempt.await.unwrap().unwrap();
        if record.first_correct_solve {
            firsts += 1;
        }
    }

    assert_eq!(firsts, 1);
    assert_eq!(db::fetch_points(&pool, "carol").await.unwrap(), 1);
}

#[tokio::test]
async fn test_points_accumulate_across_challenges() {
    let (pool, _dir) = test_db().await;

    for challenge_id in [1, 2, 3] {
        db::record_solution(&pool, "dave", challenge_id, "ok", "java", true)
            .await
            .unwrap();
    }
    db::record_solution(&pool, "erin", 1, "ok", "java", true)
        .await
        .unwrap();
    db::save_submission(
        &pool,
        "erin",
        "python",
        "print(1)",
        "",
        &ExecutionResult::completed("1\n".to_string(), String::new(), 0),
    )
    .await
    .unwrap();

    let leaderboard = db::fetch_leaderboard(&pool).await.unwrap();
    let summary: Vec<(&str, i64, i64, i64)> = leaderboard
        .iter()
        .map(|e| (e.user_id.as_str(), e.points, e.solved, e.programs_executed))
        .collect();
    assert_eq!(summary, vec![("dave", 3, 3, 0), ("erin", 1, 1, 1)]);
}

#[tokio::test]
async fn test_submissions_keep_every_outcome() {
    let (pool, _dir) = test_db().await;

    let timed_out = ExecutionResult::timed_out("partial".to_string(), "too slow".to_string());
    let stored = db::save_submission(&pool, "frank", "python", "while True: pass", "", &timed_out)
        .await
        .unwrap();
    assert_eq!(stored.outcome, "timed_out");
    assert_eq!(stored.returncode, -1);
    assert_eq!(stored.stdout, "partial");

    let submissions = db::fetch_submissions(&pool, "frank").await.unwrap();
    assert_eq!(submissions, vec![stored]);
    assert!(db::fetch_submissions(&pool, "nobody").await.unwrap().is_empty());
}

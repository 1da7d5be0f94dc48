mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{
    body_json, create_test_app, create_test_profile, setup_test_db, StalledModelClient,
    OTHER_USER, USER,
};
use liftcoach::generation::GenerationError;
use liftcoach::models::SessionStatus;

fn squat_set() -> serde_json::Value {
    json!({ "type": "strength", "reps": 5, "loadKg": 100 })
}

fn split_squat_set() -> serde_json::Value {
    json!({ "type": "strength", "reps": 10, "loadKg": 20 })
}

#[tokio::test]
async fn test_generate_requires_user_header() {
    let pool = setup_test_db();
    let app = create_test_app(pool);

    let response = app
        .request(
            Method::POST,
            "/api/sessions/generate",
            None,
            Some(common::strength_request()),
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(app.model.calls(), 0);
}

#[tokio::test]
async fn test_generate_persists_generated_session() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));

    let response = app
        .post("/api/sessions/generate", common::strength_request())
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let session = body_json(response).await;
    assert_eq!(session["status"], "generated");
    assert_eq!(session["modality"], "strength");
    assert_eq!(session["focus"], "legs");
    assert_eq!(session["exercises"].as_array().unwrap().len(), 2);
    assert_eq!(session["exercises"][0]["name"], "Back Squat");
    assert_eq!(session["exercises"][1]["reps"], json!([8, 10]));

    let stored = app
        .session_repo
        .find_by_id(session["id"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SessionStatus::Generated);
    assert_eq!(stored.user_id, USER);
    assert_eq!(app.model.calls(), 1);
}

#[tokio::test]
async fn test_generate_rejects_invalid_request_before_calling_model() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);

    let response = app
        .post(
            "/api/sessions/generate",
            json!({ "modality": "strength", "focus": "running", "sessionLengthMin": 45 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "validation");

    let response = app
        .post(
            "/api/sessions/generate",
            json!({ "modality": "strength", "sessionLengthMin": 5 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.model.calls(), 0);
}

#[tokio::test]
async fn test_generate_without_profile_is_not_found() {
    let pool = setup_test_db();
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));

    let response = app
        .post("/api/sessions/generate", common::strength_request())
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(app.model.calls(), 0);
}

#[tokio::test]
async fn test_generate_schema_violation_is_not_retried() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(json!({
        "exercises": [{ "type": "strength", "section": "working", "sets": 3, "reps": 5 }],
        "reasons": null
    })
    .to_string()));
    app.model.push(Ok(common::strength_plan()));

    let response = app
        .post("/api/sessions/generate", common::strength_request())
        .await;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["kind"], "schema_violation");
    assert!(!body["violations"].as_array().unwrap().is_empty());
    assert_eq!(app.model.calls(), 1);
}

#[tokio::test]
async fn test_generate_retries_transport_errors_then_fails() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    for _ in 0..3 {
        app.model
            .push(Err(GenerationError::transport("connection reset")));
    }

    let response = app
        .post("/api/sessions/generate", common::strength_request())
        .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["kind"], "transport");
    assert_eq!(app.model.calls(), 3);
    assert!(app.session_repo.find_by_user(USER).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_generate_recovers_after_malformed_payload() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok("Sure! Here is your workout".to_string()));
    app.model.push(Ok(common::strength_plan()));

    let response = app
        .post("/api/sessions/generate", common::strength_request())
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(app.model.calls(), 2);
}

#[tokio::test]
async fn test_full_session_run() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    let response = app.post(&format!("/api/sessions/{}/start", id), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let runner = body_json(response).await;
    assert_eq!(runner["status"], "in_progress");
    assert_eq!(runner["phase"], "in_exercise");
    assert_eq!(runner["exerciseIndex"], 0);
    assert_eq!(runner["setIndex"], 0);
    assert_eq!(runner["currentExercise"]["name"], "Back Squat");

    // set 1, then let the rest run out
    let response = app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["set"]["setNumber"], 1);
    assert_eq!(body["runner"]["phase"], "rest_pending");
    assert_eq!(body["runner"]["restTimer"]["active"], true);
    assert_eq!(body["runner"]["restTimer"]["remaining"], 120);

    app.timers.advance(120);
    let runner = body_json(app.get(&format!("/api/sessions/{}/runner", id)).await).await;
    assert_eq!(runner["phase"], "in_exercise");
    assert_eq!(runner["setIndex"], 1);
    assert_eq!(runner["restTimer"]["active"], false);

    // set 2, then skip the rest
    app.post(&format!("/api/sessions/{}/sets", id), squat_set())
        .await;
    let runner = body_json(
        app.post(&format!("/api/sessions/{}/rest/skip", id), json!({}))
            .await,
    )
    .await;
    assert_eq!(runner["phase"], "in_exercise");
    assert_eq!(runner["setIndex"], 2);

    let body = body_json(app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await).await;
    assert_eq!(body["runner"]["phase"], "exercise_rpe_pending");

    let body = body_json(
        app.post(
            &format!("/api/sessions/{}/exercises/complete", id),
            json!({ "rpe": 9 }),
        )
        .await,
    )
    .await;
    assert_eq!(body["runner"]["phase"], "in_exercise");
    assert_eq!(body["runner"]["exerciseIndex"], 1);
    assert!(body.get("nextSessionAdjustment").is_none());

    for _ in 0..2 {
        let response = app
            .post(&format!("/api/sessions/{}/sets", id), split_squat_set())
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .post(
            &format!("/api/sessions/{}/exercises/complete", id),
            json!({ "rpe": 10, "notes": "grindy" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["runner"]["phase"], "completed");
    assert_eq!(body["runner"]["summary"]["exercisesCompleted"], 2);
    assert_eq!(body["runner"]["summary"]["totalSets"], 5);
    assert_eq!(body["runner"]["summary"]["totalVolume"], 1900.0);
    assert_eq!(body["nextSessionAdjustment"]["adjustment"], -0.05);
    assert_eq!(body["nextSessionAdjustment"]["rule"], "strength-rpe");

    // finished runners are dropped once stored
    assert!(app.runners.is_empty());
    let stored = app.session_repo.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Completed);
    assert_eq!(stored.logged_sets.len(), 5);
    assert_eq!(stored.exercise_completions.len(), 2);
    assert_eq!(stored.exercise_completions[1].notes.as_deref(), Some("grindy"));
}

#[tokio::test]
async fn test_completed_session_cannot_restart() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;
    for _ in 0..2 {
        let response = app
            .post(&format!("/api/sessions/{}/exercises/skip", id), json!({}))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.post(&format!("/api/sessions/{}/start", id), json!({})).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let runner = body_json(app.get(&format!("/api/sessions/{}/runner", id)).await).await;
    assert_eq!(runner["phase"], "completed");
    assert_eq!(runner["summary"]["exercisesSkipped"], 2);
}

#[tokio::test]
async fn test_log_set_rejects_bad_input() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    // not started yet
    let response = app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    let response = app
        .post(
            &format!("/api/sessions/{}/sets", id),
            json!({ "type": "cardio", "durationMin": 20, "intensity": "easy" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/sessions/{}/sets", id),
            json!({ "type": "strength", "reps": -1, "loadKg": 100 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(
            &format!("/api/sessions/{}/exercises/complete", id),
            json!({ "rpe": 11 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let runner = body_json(app.get(&format!("/api/sessions/{}/runner", id)).await).await;
    assert_eq!(runner["loggedSets"], 0);
    assert_eq!(runner["phase"], "in_exercise");
}

#[tokio::test]
async fn test_skip_set_records_skipped_set() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    let response = app
        .post(&format!("/api/sessions/{}/sets/skip", id), json!({}))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["set"]["skipped"], true);
    assert_eq!(body["set"]["setNumber"], 1);
    assert_eq!(body["runner"]["phase"], "rest_pending");

    let stored = app.session_repo.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.logged_sets.len(), 1);
    assert!(stored.logged_sets[0].skipped);
}

#[tokio::test]
async fn test_swap_replaces_exercise_and_keeps_other_sets() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;
    app.post(&format!("/api/sessions/{}/sets", id), squat_set())
        .await;

    app.model.push(Ok(common::replacement_plan("Walking Lunge")));
    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 1 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let replacement = body_json(response).await;
    assert_eq!(replacement["name"], "Walking Lunge");
    assert_eq!(replacement["type"], "strength");

    let session = body_json(app.get(&format!("/api/sessions/{}", id)).await).await;
    assert_eq!(session["exercises"][0]["name"], "Back Squat");
    assert_eq!(session["exercises"][1]["name"], "Walking Lunge");
    assert_eq!(session["loggedSets"].as_array().unwrap().len(), 1);
    assert_eq!(session["loggedSets"][0]["exerciseIndex"], 0);

    // the replacement prompt names every exercise already in the plan
    let requests = app.model.requests();
    let prompt = &requests.last().unwrap().user_prompt;
    assert!(prompt.contains("Back Squat"));
    assert!(prompt.contains("Bulgarian Split Squat"));

    let stored = app.session_repo.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.exercises[1].name, "Walking Lunge");
}

#[tokio::test]
async fn test_swap_rejects_duplicate_name() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    app.model.push(Ok(common::replacement_plan("back squat")));
    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 1 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let session = body_json(app.get(&format!("/api/sessions/{}", id)).await).await;
    assert_eq!(session["exercises"][1]["name"], "Bulgarian Split Squat");
}

#[tokio::test]
async fn test_swap_failure_leaves_plan_unchanged() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    for _ in 0..3 {
        app.model.push(Err(GenerationError::timeout("model timed out")));
    }
    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 0 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json(response).await["kind"], "timeout");

    let session = body_json(app.get(&format!("/api/sessions/{}", id)).await).await;
    assert_eq!(session["exercises"][0]["name"], "Back Squat");

    // the slot is free again after a failed swap
    app.model.push(Ok(common::replacement_plan("Front Squat")));
    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 0 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_abandoned_swap_frees_the_slot() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    // client gives up while the model is still thinking
    let stalled = app.router_with_model(Arc::new(StalledModelClient));
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("/api/sessions/{}/swap", id))
        .header(liftcoach::middleware::USER_ID_HEADER, USER)
        .header("content-type", "application/json")
        .body(Body::from(json!({ "exerciseIndex": 1 }).to_string()))
        .unwrap();
    let abandoned =
        tokio::time::timeout(Duration::from_millis(50), stalled.oneshot(request)).await;
    assert!(abandoned.is_err());

    app.model.push(Ok(common::replacement_plan("Walking Lunge")));
    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 1 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["name"], "Walking Lunge");
}

#[tokio::test]
async fn test_rest_end_starts_next_set_without_polling() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;
    app.post(&format!("/api/sessions/{}/sets", id), squat_set())
        .await;

    // the 120 s rest runs out and the lifter takes 40 s before logging
    app.clock.advance(chrono::Duration::seconds(120));
    app.timers.advance(120);
    app.clock.advance(chrono::Duration::seconds(40));
    let body = body_json(app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await).await;
    assert_eq!(body["set"]["setNumber"], 2);
    assert_eq!(body["set"]["restTakenSec"], 120);

    let started: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["set"]["startedAt"].clone()).unwrap();
    let completed: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["set"]["completedAt"].clone()).unwrap();
    assert_eq!((completed - started).num_seconds(), 40);
}

#[tokio::test]
async fn test_swap_out_of_range_index() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    let response = app
        .post(
            &format!("/api/sessions/{}/swap", id),
            json!({ "exerciseIndex": 7 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.model.calls(), 1);
}

#[tokio::test]
async fn test_cancel_keeps_logged_sets_and_is_idempotent() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;
    app.post(&format!("/api/sessions/{}/sets", id), squat_set())
        .await;

    let response = app.post(&format!("/api/sessions/{}/cancel", id), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let runner = body_json(response).await;
    assert_eq!(runner["phase"], "cancelled");
    assert_eq!(runner["restTimer"]["active"], false);
    assert_eq!(app.timers.active(), 0);

    let response = app.post(&format!("/api/sessions/{}/cancel", id), json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app.session_repo.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Cancelled);
    assert_eq!(stored.logged_sets.len(), 1);

    let response = app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_feedback_only_after_session_ends() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    let feedback = json!({
        "sessionRPE": 7,
        "difficulty": "too_hard",
        "soreness": ["quads"],
        "skipReason": "busy",
        "skipNotes": "meeting ran long"
    });
    let response = app
        .post(&format!("/api/sessions/{}/feedback", id), feedback.clone())
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    app.post(&format!("/api/sessions/{}/cancel", id), json!({}))
        .await;

    let response = app
        .post(
            &format!("/api/sessions/{}/feedback", id),
            json!({ "sessionRPE": 12 }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .post(&format!("/api/sessions/{}/feedback", id), feedback)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["feedback"]["sessionRPE"], 7);
    assert_eq!(session["feedback"]["skipReason"], "busy");

    let stored = app.session_repo.find_by_id(&id).await.unwrap().unwrap();
    assert_eq!(stored.feedback.unwrap().soreness, vec!["quads".to_string()]);
}

#[tokio::test]
async fn test_sessions_are_private_to_their_owner() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool);
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/sessions/{}", id),
            Some(OTHER_USER),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::POST,
            &format!("/api/sessions/{}/start", id),
            Some(OTHER_USER),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.get("/api/sessions/does-not-exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_runner_resumes_from_stored_progress() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool.clone());
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;
    app.post(&format!("/api/sessions/{}/sets", id), squat_set())
        .await;

    // a fresh app has no runners in memory
    let restarted = create_test_app(pool);
    let runner = body_json(restarted.get(&format!("/api/sessions/{}/runner", id)).await).await;
    assert_eq!(runner["status"], "in_progress");
    assert_eq!(runner["phase"], "in_exercise");
    assert_eq!(runner["exerciseIndex"], 0);
    assert_eq!(runner["setIndex"], 1);
    assert_eq!(runner["loggedSets"], 1);
}

#[tokio::test]
async fn test_failed_save_keeps_in_memory_progress() {
    let pool = setup_test_db();
    create_test_profile(&pool, USER).await;
    let app = create_test_app(pool.clone());
    app.model.push(Ok(common::strength_plan()));
    let id = app.generate_session(common::strength_request()).await;
    app.post(&format!("/api/sessions/{}/start", id), json!({}))
        .await;

    pool.get()
        .unwrap()
        .execute_batch("DROP TABLE sessions")
        .unwrap();

    let response = app.post(&format!("/api/sessions/{}/sets", id), squat_set()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["kind"], "persistence");

    let runner = body_json(app.get(&format!("/api/sessions/{}/runner", id)).await).await;
    assert_eq!(runner["loggedSets"], 1);
    assert_eq!(runner["phase"], "rest_pending");
}

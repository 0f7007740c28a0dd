//! The two authenticated HTTP control planes (§4.H, §4.I).

pub mod auth;
pub mod dto;
pub mod external;
pub mod internal;
pub mod state;

pub use auth::BearerToken;
pub use state::AppState;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init_in_memory;
    use crate::repository::{AuditLog, JobRepository, OutboundQueueRepository, ProfileRepository};
    use crate::services::{NoopRestart, TaskMutationService};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_state() -> AppState {
        let pool = init_in_memory().unwrap();
        let jobs = JobRepository::new(pool.clone());
        let audit = AuditLog::new(pool.clone());
        AppState {
            jobs: jobs.clone(),
            outbound: OutboundQueueRepository::new(pool.clone()),
            audit: audit.clone(),
            profile: ProfileRepository::new(pool),
            mutations: Arc::new(TaskMutationService::new(jobs, audit)),
            restart: Arc::new(NoopRestart),
            started_at: 0,
            version: "test",
        }
    }

    #[tokio::test]
    async fn external_health_does_not_require_auth_bypass_but_responds() {
        let state = test_state();
        let token = BearerToken::new("secret".to_string());
        let app = external::router(state, token);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/external/health")
                    .header("Authorization", "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn external_jobs_without_token_is_unauthorized() {
        // P8: every request lacking a valid bearer token returns 401.
        let state = test_state();
        let token = BearerToken::new("secret".to_string());
        let app = external::router(state, token);

        let response = app
            .oneshot(Request::builder().uri("/external/jobs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn external_jobs_with_wrong_token_is_unauthorized() {
        let state = test_state();
        let token = BearerToken::new("secret".to_string());
        let app = external::router(state, token);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/external/jobs")
                    .header("Authorization", "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn patching_system_reserved_job_is_forbidden() {
        // Scenario 5 / P6: PATCH on a system-reserved job is forbidden
        // regardless of body.
        let state = test_state();
        let now = crate::now_millis();
        let job = crate::database::models::Job {
            id: "heartbeat".to_string(),
            job_type: "heartbeat".to_string(),
            schedule_type: crate::database::models::ScheduleType::Recurring,
            status: crate::database::models::JobStatus::Idle,
            profile_id: None,
            model_ref: None,
            payload: None,
            run_at: None,
            cadence_minutes: Some(60),
            last_run_at: None,
            next_run_at: Some(now),
            terminal_state: None,
            terminal_reason: None,
            lock_token: None,
            lock_expires_at: None,
            managed_by: crate::database::models::ManagedBy::System,
            created_at: now,
            updated_at: now,
        };
        state.jobs.upsert(&job).unwrap();

        let token = BearerToken::new("secret".to_string());
        let app = external::router(state, token);

        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/external/jobs/heartbeat")
                    .header("Authorization", "Bearer secret")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use serde::Serialize;

use crate::commands::CommandResult;
use mendflow_core::config::{AppConfig, LoadOptions};
use mendflow_core::domain::actor::{AppUser, BranchId, Role, UserId};
use mendflow_core::domain::attachment::PrefixUrlResolver;
use mendflow_core::domain::request::{RequestCategory, RequestStatus};
use mendflow_db::repositories::{
    SqlAttachmentStore, SqlEstimateStore, SqlNotificationStore, SqlRequestStore, SqlUserStore,
    UserStore,
};
use mendflow_db::{connect_with_settings, migrations};
use mendflow_engine::{EstimateSubmission, EstimateVerdict, NewRequest, WorkflowService};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum SmokeStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct SmokeCheck {
    name: &'static str,
    status: SmokeStatus,
    elapsed_ms: u64,
    message: String,
}

#[derive(Debug, Serialize)]
struct SmokeReport {
    command: &'static str,
    status: SmokeStatus,
    summary: String,
    total_elapsed_ms: u64,
    checks: Vec<SmokeCheck>,
}

pub fn run() -> CommandResult {
    let started = Instant::now();
    let mut checks = Vec::new();

    let config = match timed_check(|| AppConfig::load(LoadOptions::default())) {
        Ok((elapsed_ms, config)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Pass,
                elapsed_ms,
                message: "configuration loaded and validated".to_string(),
            });
            config
        }
        Err((elapsed_ms, error)) => {
            checks.push(SmokeCheck {
                name: "config_validation",
                status: SmokeStatus::Fail,
                elapsed_ms,
                message: error.to_string(),
            });
            checks.push(skipped("push_readiness"));
            checks.push(skipped("db_connectivity"));
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let push_started = Instant::now();
    checks.push(if config.push.enabled {
        match config.push.webhook_url.as_deref() {
            Some(url) if url.starts_with("http://") || url.starts_with("https://") => SmokeCheck {
                name: "push_readiness",
                status: SmokeStatus::Pass,
                elapsed_ms: push_started.elapsed().as_millis() as u64,
                message: format!("webhook `{url}` is ready for the relay"),
            },
            Some(url) => SmokeCheck {
                name: "push_readiness",
                status: SmokeStatus::Fail,
                elapsed_ms: push_started.elapsed().as_millis() as u64,
                message: format!("webhook url `{url}` must use http or https"),
            },
            None => SmokeCheck {
                name: "push_readiness",
                status: SmokeStatus::Fail,
                elapsed_ms: push_started.elapsed().as_millis() as u64,
                message: "push enabled without a webhook url".to_string(),
            },
        }
    } else {
        SmokeCheck {
            name: "push_readiness",
            status: SmokeStatus::Pass,
            elapsed_ms: push_started.elapsed().as_millis() as u64,
            message: "push disabled; relay will use the noop transport".to_string(),
        }
    });

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: 0,
                message: format!("failed to initialize async runtime: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let db_started = Instant::now();
    let db_result = runtime.block_on(async {
        connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
    });

    let pool = match db_result {
        Ok(pool) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Pass,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("connected using `{}`", config.database.url),
            });
            pool
        }
        Err(error) => {
            checks.push(SmokeCheck {
                name: "db_connectivity",
                status: SmokeStatus::Fail,
                elapsed_ms: db_started.elapsed().as_millis() as u64,
                message: format!("failed to connect: {error}"),
            });
            checks.push(skipped("migration_visibility"));
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    };

    let migration_started = Instant::now();
    let migration_result = runtime.block_on(async { migrations::run_pending(&pool).await });
    runtime.block_on(async {
        pool.close().await;
    });

    match migration_result {
        Ok(()) => checks.push(SmokeCheck {
            name: "migration_visibility",
            status: SmokeStatus::Pass,
            elapsed_ms: migration_started.elapsed().as_millis() as u64,
            message: "migrations are visible and executable".to_string(),
        }),
        Err(error) => {
            checks.push(SmokeCheck {
                name: "migration_visibility",
                status: SmokeStatus::Fail,
                elapsed_ms: migration_started.elapsed().as_millis() as u64,
                message: format!("migration execution failed: {error}"),
            });
            checks.push(skipped("workflow_lifecycle"));
            return finalize_report(checks, started.elapsed().as_millis() as u64);
        }
    }

    let lifecycle_started = Instant::now();
    match runtime.block_on(run_lifecycle_probe()) {
        Ok(message) => checks.push(SmokeCheck {
            name: "workflow_lifecycle",
            status: SmokeStatus::Pass,
            elapsed_ms: lifecycle_started.elapsed().as_millis() as u64,
            message,
        }),
        Err(error) => checks.push(SmokeCheck {
            name: "workflow_lifecycle",
            status: SmokeStatus::Fail,
            elapsed_ms: lifecycle_started.elapsed().as_millis() as u64,
            message: format!("lifecycle probe failed: {error:#}"),
        }),
    }

    finalize_report(checks, started.elapsed().as_millis() as u64)
}

/// Walks one request through the full journey on a scratch in-memory
/// database. The operator's configured database is never touched.
async fn run_lifecycle_probe() -> anyhow::Result<String> {
    let pool = connect_with_settings("sqlite::memory:", 1, 30)
        .await
        .context("failed to open the scratch database")?;
    migrations::run_pending(&pool).await.context("failed to migrate the scratch database")?;

    let users = SqlUserStore::new(pool.clone());
    for (id, role, branch) in [
        ("smoke-branch", Role::Branch, Some("br-smoke")),
        ("smoke-hq", Role::Hq, None),
        ("smoke-vendor", Role::Vendor, None),
    ] {
        let user = AppUser {
            id: UserId(id.to_string()),
            display_name: id.to_string(),
            role,
            branch_id: branch.map(|value| BranchId(value.to_string())),
            phone: None,
            created_at: Utc::now(),
        };
        users.save(&user).await.context("failed to seed a probe user")?;
    }

    let service = WorkflowService::new(
        Arc::new(SqlRequestStore::new(pool.clone())),
        Arc::new(SqlEstimateStore::new(pool.clone())),
        Arc::new(SqlAttachmentStore::new(pool.clone())),
        Arc::new(SqlNotificationStore::new(pool.clone())),
        Arc::new(SqlUserStore::new(pool.clone())),
        Arc::new(PrefixUrlResolver::new("https://smoke.invalid/files")),
    );

    let branch = UserId("smoke-branch".to_string());
    let hq = UserId("smoke-hq".to_string());
    let vendor = UserId("smoke-vendor".to_string());

    let request_id = service
        .create_request(NewRequest {
            requester_id: branch.clone(),
            title: "Smoke probe".to_string(),
            description: "Corridor light flickering".to_string(),
            category: RequestCategory::Electrical,
            submit_now: true,
        })
        .await
        .context("create_request failed")?;

    service.assign_vendor(&request_id, &hq, &vendor).await.context("assign_vendor failed")?;

    let attempt = service
        .submit_estimate(
            &request_id,
            &vendor,
            EstimateSubmission {
                amount: "1,250.00".to_string(),
                comment: "Replace the ballast".to_string(),
                work_start: NaiveDate::from_ymd_opt(2026, 3, 2)
                    .context("probe work_start date out of range")?,
                work_end: NaiveDate::from_ymd_opt(2026, 3, 3)
                    .context("probe work_end date out of range")?,
                worker: None,
            },
        )
        .await
        .context("submit_estimate failed")?;

    service
        .decide_estimate(&request_id, attempt.attempt_no, &hq, EstimateVerdict::Approve, None)
        .await
        .context("decide_estimate failed")?;

    let completed = service
        .complete_work(&request_id, &vendor, "Ballast replaced", &["smoke/after.jpg".to_string()])
        .await
        .context("complete_work failed")?;
    if completed.status != RequestStatus::Completed {
        anyhow::bail!("request ended as {:?} instead of Completed", completed.status);
    }

    let inbox = service.inbox(&vendor, false).await.context("vendor inbox read failed")?;
    if inbox.is_empty() {
        anyhow::bail!("vendor inbox stayed empty across the journey");
    }

    pool.close().await;
    Ok(format!(
        "request `{}` completed with {} vendor notifications",
        request_id.0,
        inbox.len()
    ))
}

fn timed_check<T, E>(check: impl FnOnce() -> Result<T, E>) -> Result<(u64, T), (u64, E)> {
    let started = Instant::now();
    match check() {
        Ok(value) => Ok((started.elapsed().as_millis() as u64, value)),
        Err(error) => Err((started.elapsed().as_millis() as u64, error)),
    }
}

fn skipped(name: &'static str) -> SmokeCheck {
    SmokeCheck {
        name,
        status: SmokeStatus::Skipped,
        elapsed_ms: 0,
        message: "skipped due previous failure".to_string(),
    }
}

fn finalize_report(checks: Vec<SmokeCheck>, total_elapsed_ms: u64) -> CommandResult {
    let passed = checks.iter().filter(|check| check.status == SmokeStatus::Pass).count();
    let total = checks.len();
    let failed = checks.iter().any(|check| check.status == SmokeStatus::Fail);

    let report = SmokeReport {
        command: "smoke",
        status: if failed { SmokeStatus::Fail } else { SmokeStatus::Pass },
        summary: format!("smoke: {passed}/{total} checks passed in {total_elapsed_ms}ms"),
        total_elapsed_ms,
        checks,
    };

    let human = report.summary.clone();
    let machine = serde_json::to_string(&report).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"smoke\",\"status\":\"fail\",\"summary\":\"serialization failed\",\"error\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    });

    CommandResult { exit_code: if failed { 6 } else { 0 }, output: format!("{human}\n{machine}") }
}

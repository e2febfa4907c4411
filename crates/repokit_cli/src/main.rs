//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `repokit_core` wiring end to end: open a store, run one
//!   unit-of-work business operation, print a paged listing as JSON.
//!
//! Usage: `repokit [DB_PATH]`. Without a path an in-memory store is used.
//! Set `REPOKIT_LOG_DIR` (absolute path) to enable file logging.

use log::info;
use repokit_core::service::teacher_service::{
    CreateStudentItem, CreateTeacherRequest, TeacherService,
};
use repokit_core::{core_version, default_log_level, init_logging, share, SqliteSession, UnitOfWork};
use std::error::Error;
use std::process::ExitCode;

const LOG_DIR_ENV: &str = "REPOKIT_LOG_DIR";

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("repokit: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        init_logging(default_log_level(), &log_dir)?;
    }

    let session = match std::env::args().nth(1) {
        Some(path) => SqliteSession::open(path)?,
        None => SqliteSession::open_in_memory()?,
    };
    let mut service = TeacherService::new(UnitOfWork::new(share(session)));

    let teacher_id = service
        .create_teacher_with_students_wrapped(&CreateTeacherRequest {
            teacher_name: "Wang Fang".to_string(),
            age: 38,
            course_name: "Mathematics".to_string(),
            students: vec![student("Li Lei", 13, "8A"), student("Han Meimei", 13, "8A")],
        })
        .await?;
    service
        .update_teacher_and_add_students(teacher_id, &[student("Zhang Wei", 12, "7B")])
        .await?;

    let page = service.list_teachers(0, 10).await?;
    info!(
        "event=cli_run module=cli status=ok teacher_id={} total_count={}",
        teacher_id,
        page.total_count()
    );

    println!("repokit_core version={}", core_version());
    println!("{}", serde_json::to_string_pretty(&page)?);

    service.dispose().await?;
    Ok(())
}

fn student(name: &str, age: u32, class_name: &str) -> CreateStudentItem {
    CreateStudentItem {
        student_name: name.to_string(),
        age,
        class_name: class_name.to_string(),
    }
}

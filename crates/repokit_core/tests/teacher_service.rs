use async_trait::async_trait;
use repokit_core::model::school::{Student, Teacher};
use repokit_core::service::teacher_service::{
    CreateStudentItem, CreateTeacherRequest, ServiceError, TeacherService,
};
use repokit_core::session::{EngineResult, Mutation, TransactionHandle};
use repokit_core::{
    share, EngineError, KeyValue, QueryRepository, RepoError, Repository, Session, SqliteSession,
    UnitOfWork,
};
use serde_json::Value;
use std::path::Path;

/// SQLite session whose native rollback always fails.
struct RollbackRefusingSession {
    inner: SqliteSession,
}

#[async_trait]
impl Session for RollbackRefusingSession {
    async fn find(&mut self, kind: &'static str, key: &KeyValue) -> EngineResult<Option<Value>> {
        self.inner.find(kind, key).await
    }

    async fn scan(&mut self, kind: &'static str) -> EngineResult<Vec<Value>> {
        self.inner.scan(kind).await
    }

    async fn next_sequence(&mut self, kind: &'static str) -> EngineResult<i64> {
        self.inner.next_sequence(kind).await
    }

    fn stage(&mut self, mutation: Mutation) {
        self.inner.stage(mutation);
    }

    fn has_staged_changes(&self) -> bool {
        self.inner.has_staged_changes()
    }

    async fn flush(&mut self) -> EngineResult<usize> {
        self.inner.flush().await
    }

    async fn begin_transaction(&mut self) -> EngineResult<TransactionHandle> {
        self.inner.begin_transaction().await
    }

    async fn commit_transaction(&mut self, handle: TransactionHandle) -> EngineResult<()> {
        self.inner.commit_transaction(handle).await
    }

    async fn rollback_transaction(&mut self, _handle: TransactionHandle) -> EngineResult<()> {
        Err(EngineError::Transaction("rollback refused".to_string()))
    }

    fn abandon_transaction(&mut self, handle: TransactionHandle) {
        self.inner.abandon_transaction(handle);
    }
}

fn service_at(path: &Path) -> TeacherService<SqliteSession> {
    TeacherService::new(UnitOfWork::new(share(SqliteSession::open(path).unwrap())))
}

fn student(name: &str, age: u32) -> CreateStudentItem {
    CreateStudentItem {
        student_name: name.to_string(),
        age,
        class_name: "7A".to_string(),
    }
}

fn request(name: &str, students: Vec<CreateStudentItem>) -> CreateTeacherRequest {
    CreateTeacherRequest {
        teacher_name: name.to_string(),
        age: 42,
        course_name: "Physics".to_string(),
        students,
    }
}

async fn stored_counts(path: &Path) -> (u64, u64) {
    let repo = Repository::new(share(SqliteSession::open(path).unwrap()));
    (
        repo.count_all::<Teacher>().await.unwrap(),
        repo.count_all::<Student>().await.unwrap(),
    )
}

#[tokio::test]
async fn explicit_create_commits_teacher_and_students() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("explicit.db");
    let mut service = service_at(&path);

    let teacher_id = service
        .create_teacher_with_students_explicit(&request(
            "Zhao",
            vec![student("Xiao Ming", 12), student("Xiao Hong", 13)],
        ))
        .await
        .unwrap();

    assert!(!service.unit_of_work().has_active_transaction());
    assert_eq!(stored_counts(&path).await, (1, 2));

    let teacher = service.teacher_with_students(teacher_id).await.unwrap().unwrap();
    assert_eq!(teacher.name, "Zhao");
    let names: Vec<_> = teacher.students.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Xiao Ming", "Xiao Hong"]);
    assert!(teacher.students.iter().all(|s| s.teacher_id == teacher_id));
}

#[tokio::test]
async fn wrapped_create_commits_without_students() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wrapped.db");
    let mut service = service_at(&path);

    let teacher_id = service
        .create_teacher_with_students_wrapped(&request("  Qin  ", Vec::new()))
        .await
        .unwrap();

    assert_eq!(stored_counts(&path).await, (1, 0));
    let teacher = service.teacher_with_students(teacher_id).await.unwrap().unwrap();
    assert_eq!(teacher.name, "Qin");
    assert!(teacher.students.is_empty());
}

#[tokio::test]
async fn invalid_request_never_opens_a_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("invalid.db");
    let mut service = service_at(&path);

    let err = service
        .create_teacher_with_students_wrapped(&request("Li", vec![student(" ", 10)]))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));
    assert!(!service.unit_of_work().has_active_transaction());
    assert_eq!(stored_counts(&path).await, (0, 0));
}

#[tokio::test]
async fn entity_validation_failure_rolls_back_everything() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entity_invalid.db");
    let mut service = service_at(&path);

    let err = service
        .create_teacher_with_students_explicit(&request(
            "Deng",
            vec![student("Fine", 11), student("Ancient", 200)],
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Repo(RepoError::Validation(_))));
    assert!(!service.unit_of_work().has_active_transaction());
    assert_eq!(stored_counts(&path).await, (0, 0));
}

#[tokio::test]
async fn explicit_create_reports_a_failed_rollback() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refused_rollback.db");
    let session = RollbackRefusingSession {
        inner: SqliteSession::open(&path).unwrap(),
    };
    let mut service = TeacherService::new(UnitOfWork::new(share(session)));

    let err = service
        .create_teacher_with_students_explicit(&request("Su", vec![student("Ancient", 200)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Repo(RepoError::Engine(EngineError::Transaction(_)))
    ));
    assert!(service.unit_of_work().has_active_transaction());

    drop(service);
    assert_eq!(stored_counts(&path).await, (0, 0));
}

#[tokio::test]
async fn update_and_add_students_share_one_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("update.db");
    let mut service = service_at(&path);
    let teacher_id = service
        .create_teacher_with_students_wrapped(&request("Lin", vec![student("First", 12)]))
        .await
        .unwrap();

    service
        .update_teacher_and_add_students(teacher_id, &[student("Second", 12), student("Third", 13)])
        .await
        .unwrap();

    assert!(!service.unit_of_work().has_active_transaction());
    assert_eq!(stored_counts(&path).await, (1, 3));
    let teacher = service_at(&path)
        .teacher_with_students(teacher_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(teacher.course_name, "Physics (Updated)");
    assert!(teacher.updated_at.is_some());
    assert_eq!(teacher.students.len(), 3);
}

#[tokio::test]
async fn missing_teacher_rolls_back_the_update() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.db");
    let mut service = service_at(&path);

    let err = service
        .update_teacher_and_add_students(99, &[student("Nobody", 12)])
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::TeacherNotFound(99)));
    assert!(!service.unit_of_work().has_active_transaction());
    assert_eq!(stored_counts(&path).await, (0, 0));

    let err = service.add_students(99, &[student("Nobody", 12)]).await.unwrap_err();
    assert!(matches!(err, ServiceError::TeacherNotFound(99)));
}

#[tokio::test]
async fn add_students_opens_its_own_transaction_when_none_is_active() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("add_students.db");
    let mut service = service_at(&path);
    let teacher_id = service
        .create_teacher_with_students_wrapped(&request("Tang", Vec::new()))
        .await
        .unwrap();

    assert_eq!(service.add_students(teacher_id, &[]).await.unwrap(), 0);
    let added = service
        .add_students(teacher_id, &[student("A", 10), student("B", 11)])
        .await
        .unwrap();
    assert_eq!(added, 2);
    assert_eq!(stored_counts(&path).await, (1, 2));
}

#[tokio::test]
async fn list_teachers_pages_by_name_with_student_counts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("list.db");
    let mut service = service_at(&path);
    for (name, students) in [("Chen", 0), ("Adams", 2), ("Bai", 1)] {
        let items = (0..students)
            .map(|index| student(&format!("{name}-{index}"), 12))
            .collect();
        service
            .create_teacher_with_students_wrapped(&request(name, items))
            .await
            .unwrap();
    }

    let first = service.list_teachers(0, 2).await.unwrap();
    assert_eq!(first.total_count(), 3);
    assert!(first.has_next_page());
    let rows: Vec<_> = first
        .items()
        .iter()
        .map(|row| (row.name.as_str(), row.student_count))
        .collect();
    assert_eq!(rows, vec![("Adams", 2), ("Bai", 1)]);

    let second = service.list_teachers(1, 2).await.unwrap();
    assert_eq!(second.items().len(), 1);
    assert_eq!(second.items()[0].name, "Chen");
    assert_eq!(second.items()[0].student_count, 0);

    service.dispose().await.unwrap();
    assert!(service.unit_of_work().is_disposed());
}

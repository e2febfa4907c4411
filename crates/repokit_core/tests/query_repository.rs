use repokit_core::model::school::{ClassRoom, Student, Teacher};
use repokit_core::{
    share, IncludeSpec, Query, QueryRepository, RepoError, Repository, RepositoryOptions,
    SqliteSession, WriteRepository,
};
use tokio_util::sync::CancellationToken;

fn setup() -> Repository<SqliteSession> {
    Repository::new(share(SqliteSession::open_in_memory().unwrap()))
}

async fn seed_teachers(repo: &Repository<SqliteSession>, rows: &[(&str, u32)]) -> Vec<i64> {
    let mut ids = Vec::new();
    for (name, age) in rows {
        let mut teacher = Teacher::new(*name, *age, "History");
        repo.add(&mut teacher).await.unwrap();
        ids.push(teacher.id);
    }
    ids
}

fn names(teachers: &[Teacher]) -> Vec<&str> {
    teachers.iter().map(|teacher| teacher.name.as_str()).collect()
}

#[tokio::test]
async fn added_entity_is_returned_by_id() {
    let repo = setup();
    let mut teacher = Teacher::new("Sun Li", 45, "Chemistry");
    teacher.email = Some("sun.li@example.edu".to_string());

    assert_eq!(repo.add(&mut teacher).await.unwrap(), 1);
    assert_eq!(teacher.id, 1);

    let loaded: Teacher = repo.get_by_id(&teacher.id).await.unwrap().unwrap();
    assert_eq!(loaded, teacher);
}

#[tokio::test]
async fn missing_id_is_none_not_error() {
    let repo = setup();
    let loaded = repo.get_by_id::<Teacher>(&42).await.unwrap();
    assert!(loaded.is_none());
}

#[tokio::test]
async fn paging_counts_filtered_rows_before_the_window() {
    let repo = setup();
    seed_teachers(
        &repo,
        &[("A", 30), ("B", 31), ("C", 32), ("D", 33), ("E", 34), ("F", 60)],
    )
    .await;
    let young = || Query::<Teacher>::new().filter(|teacher| teacher.age < 50);

    let first = repo.get_paged(0, 2, young()).await.unwrap();
    assert_eq!(first.total_count(), 5);
    assert_eq!(names(first.items()), vec!["A", "B"]);
    assert!(!first.has_previous_page());
    assert!(first.has_next_page());
    assert_eq!(first.total_pages(), 3);

    let last = repo.get_paged(2, 2, young()).await.unwrap();
    assert_eq!(last.total_count(), 5);
    assert_eq!(names(last.items()), vec!["E"]);
    assert!(!last.has_next_page());

    let past_end = repo.get_paged(9, 2, young()).await.unwrap();
    assert!(past_end.items().is_empty());
    assert_eq!(past_end.total_count(), 5);
}

#[tokio::test]
async fn paging_without_ordering_uses_key_order() {
    let repo = setup();
    seed_teachers(&repo, &[("Zed", 30), ("Amy", 31), ("Max", 32)]).await;

    let by_key = repo.get_paged(0, 3, Query::new()).await.unwrap();
    assert_eq!(names(by_key.items()), vec!["Zed", "Amy", "Max"]);

    let by_name = repo
        .get_paged(0, 3, Query::new().order_by(|teacher: &Teacher| teacher.name.clone()))
        .await
        .unwrap();
    assert_eq!(names(by_name.items()), vec!["Amy", "Max", "Zed"]);
}

#[tokio::test]
async fn zero_page_size_is_rejected() {
    let repo = setup();
    let err = repo
        .get_paged::<Teacher>(0, 0, Query::new())
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::InvalidArgument(_)));
}

#[tokio::test]
async fn count_all_matches_get_all() {
    let repo = setup();
    seed_teachers(&repo, &[("A", 30), ("B", 41), ("C", 52)]).await;

    let all: Vec<Teacher> = repo.get_all().await.unwrap();
    assert_eq!(repo.count_all::<Teacher>().await.unwrap(), all.len() as u64);
    assert_eq!(
        repo.count(Query::<Teacher>::new().filter(|teacher| teacher.age > 40))
            .await
            .unwrap(),
        2
    );
    assert!(repo.exists(|teacher: &Teacher| teacher.name == "B").await.unwrap());
    assert!(!repo.exists(|teacher: &Teacher| teacher.name == "Q").await.unwrap());
}

#[tokio::test]
async fn lists_and_first_match_follow_filters() {
    let repo = setup();
    seed_teachers(&repo, &[("A", 30), ("B", 41), ("C", 52)]).await;

    let older = repo.get_list(|teacher: &Teacher| teacher.age > 35).await.unwrap();
    assert_eq!(names(&older), vec!["B", "C"]);

    let none = repo.get_list(|teacher: &Teacher| teacher.age > 99).await.unwrap();
    assert!(none.is_empty());

    let first = repo
        .get_first_or_default(|teacher: &Teacher| teacher.age > 35)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "B");

    let windowed = repo
        .fetch(
            Query::<Teacher>::new()
                .order_by_desc(|teacher| teacher.age)
                .skip(1)
                .take(1),
        )
        .await
        .unwrap();
    assert_eq!(names(&windowed), vec!["B"]);

    let composed = repo
        .query::<Teacher>()
        .filter(|teacher| teacher.age > 35)
        .filter(|teacher| teacher.name != "C");
    assert_eq!(names(&repo.fetch(composed).await.unwrap()), vec!["B"]);
}

#[tokio::test]
async fn includes_load_relations_only_when_requested() {
    let repo = setup();
    let ids = seed_teachers(&repo, &[("Zhou", 50), ("Wu", 33)]).await;
    let mut students = vec![
        Student::new("S1", 10, "5A", ids[0]),
        Student::new("S2", 10, "5A", ids[0]),
        Student::new("S3", 11, "6B", ids[1]),
    ];
    repo.add_range(&mut students).await.unwrap();

    let plain = repo
        .get_first_or_default(|teacher: &Teacher| teacher.name == "Zhou")
        .await
        .unwrap()
        .unwrap();
    assert!(plain.students.is_empty());

    let loaded = repo
        .get_first_or_default_with(
            |teacher: &Teacher| teacher.name == "Zhou",
            IncludeSpec::new().with(Teacher::students_include()),
        )
        .await
        .unwrap()
        .unwrap();
    let student_names: Vec<_> = loaded.students.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(student_names, vec!["S1", "S2"]);

    let with_teacher = repo
        .get_list_with(
            |student: &Student| student.class_name == "6B",
            IncludeSpec::new().with(Student::teacher_include()),
        )
        .await
        .unwrap();
    assert_eq!(with_teacher.len(), 1);
    assert_eq!(with_teacher[0].teacher.as_ref().unwrap().name, "Wu");
}

#[tokio::test]
async fn include_with_no_match_is_none() {
    let repo = setup();
    let found = repo
        .get_first_or_default_with(
            |class: &ClassRoom| class.grade == 9,
            IncludeSpec::new()
                .with(ClassRoom::teacher_include())
                .with(ClassRoom::students_include()),
        )
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn optional_foreign_keys_group_only_linked_children() {
    let repo = setup();
    let ids = seed_teachers(&repo, &[("Gao", 44)]).await;
    let mut class = ClassRoom::new("9C", 9, ids[0]);
    repo.add(&mut class).await.unwrap();

    let mut linked = Student::new("Linked", 14, "9C", ids[0]);
    linked.class_id = Some(class.id);
    let mut unlinked = Student::new("Unlinked", 14, "9C", ids[0]);
    repo.add(&mut linked).await.unwrap();
    repo.add(&mut unlinked).await.unwrap();

    let class = repo
        .fetch_first(
            Query::<ClassRoom>::new()
                .include(ClassRoom::students_include())
                .include(ClassRoom::teacher_include()),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(class.students.len(), 1);
    assert_eq!(class.students[0].name, "Linked");
    assert_eq!(class.teacher.unwrap().name, "Gao");
}

#[tokio::test]
async fn cancelled_token_stops_reads_before_io() {
    let token = CancellationToken::new();
    let repo = Repository::with_options(
        share(SqliteSession::open_in_memory().unwrap()),
        RepositoryOptions {
            auto_flush: true,
            cancel_token: Some(token.clone()),
        },
    );
    seed_teachers(&repo, &[("A", 30)]).await;

    token.cancel();
    let err = repo.get_all::<Teacher>().await.unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
    let err = repo.count_all::<Teacher>().await.unwrap_err();
    assert!(matches!(err, RepoError::Cancelled));
}

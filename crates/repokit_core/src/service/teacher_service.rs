//! Teacher/student use cases over one unit of work.
//!
//! # Responsibility
//! - Create a teacher with students atomically, either with explicit
//!   begin/commit/rollback or through `execute_in_transaction`.
//! - Compose nested steps that share the caller's transaction.
//! - Provide eager-loaded lookups and paged listings.
//!
//! # Invariants
//! - Requests are validated before any transaction is opened.
//! - Nested steps never open their own transaction when one is active.

use crate::model::now_epoch_ms;
use crate::model::paged::PagedResult;
use crate::model::school::{Student, Teacher};
use crate::repo::{
    IncludeSpec, Query, QueryRepository, RepoError, Repository, WriteRepository,
};
use crate::session::Session;
use crate::uow::UnitOfWork;
use futures::FutureExt;
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("teacher not found: {0}")]
    TeacherNotFound(i64),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// One student to create for a teacher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentItem {
    pub student_name: String,
    pub age: u32,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTeacherRequest {
    pub teacher_name: String,
    pub age: u32,
    pub course_name: String,
    #[serde(default)]
    pub students: Vec<CreateStudentItem>,
}

/// Listing row for paged teacher views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSummary {
    pub id: i64,
    pub name: String,
    pub course_name: String,
    pub student_count: usize,
}

impl From<Teacher> for TeacherSummary {
    fn from(teacher: Teacher) -> Self {
        Self {
            id: teacher.id,
            student_count: teacher.students.len(),
            name: teacher.name,
            course_name: teacher.course_name,
        }
    }
}

pub struct TeacherService<S: Session> {
    uow: UnitOfWork<S>,
}

impl<S: Session> TeacherService<S> {
    pub fn new(uow: UnitOfWork<S>) -> Self {
        Self { uow }
    }

    pub fn unit_of_work(&self) -> &UnitOfWork<S> {
        &self.uow
    }

    pub fn unit_of_work_mut(&mut self) -> &mut UnitOfWork<S> {
        &mut self.uow
    }

    /// Creates a teacher and its students with an explicit transaction.
    ///
    /// Rolls back on any failure, including a failed commit.
    pub async fn create_teacher_with_students_explicit(
        &mut self,
        request: &CreateTeacherRequest,
    ) -> ServiceResult<i64> {
        validate_request(request)?;

        self.uow.begin_transaction().await?;
        let staged = stage_teacher_with_students(self.uow.repository(), request).await;
        let outcome = match staged {
            Ok(teacher_id) => self
                .uow
                .commit()
                .await
                .map(|_| teacher_id)
                .map_err(ServiceError::from),
            Err(err) => Err(err),
        };
        if outcome.is_err() {
            self.uow.rollback().await?;
        }

        if let Ok(teacher_id) = outcome {
            info!(
                "event=teacher_create module=service status=ok mode=explicit teacher_id={} students={}",
                teacher_id,
                request.students.len()
            );
        }
        outcome
    }

    /// Same as the explicit variant, expressed through
    /// `execute_in_transaction`.
    pub async fn create_teacher_with_students_wrapped(
        &mut self,
        request: &CreateTeacherRequest,
    ) -> ServiceResult<i64> {
        validate_request(request)?;

        let owned = request.clone();
        let teacher_id = self
            .uow
            .execute_in_transaction(move |uow| {
                async move { stage_teacher_with_students(uow.repository(), &owned).await }.boxed()
            })
            .await?;

        info!(
            "event=teacher_create module=service status=ok mode=wrapped teacher_id={} students={}",
            teacher_id,
            request.students.len()
        );
        Ok(teacher_id)
    }

    /// Marks the teacher's course as updated and adds students in one
    /// transaction. The student step is itself transactional and joins the
    /// outer transaction instead of opening a second one.
    pub async fn update_teacher_and_add_students(
        &mut self,
        teacher_id: i64,
        new_students: &[CreateStudentItem],
    ) -> ServiceResult<()> {
        validate_students(new_students)?;

        let new_students = new_students.to_vec();
        self.uow
            .execute_in_transaction(move |uow| {
                async move {
                    let mut teacher = uow
                        .repository()
                        .get_first_or_default(move |teacher: &Teacher| teacher.id == teacher_id)
                        .await?
                        .ok_or(ServiceError::TeacherNotFound(teacher_id))?;
                    teacher.updated_at = Some(now_epoch_ms());
                    teacher.course_name = format!("{} (Updated)", teacher.course_name);
                    uow.repository().update(&teacher).await?;

                    Self::add_students_in(uow, teacher_id, &new_students).await?;
                    Ok::<(), ServiceError>(())
                }
                .boxed()
            })
            .await
    }

    /// Adds students to an existing teacher; joins an active transaction if
    /// there is one. Returns the number of students staged.
    pub async fn add_students(
        &mut self,
        teacher_id: i64,
        students: &[CreateStudentItem],
    ) -> ServiceResult<usize> {
        validate_students(students)?;
        Self::add_students_in(&mut self.uow, teacher_id, students).await
    }

    /// Teacher with `students` eager-loaded.
    pub async fn teacher_with_students(&self, teacher_id: i64) -> ServiceResult<Option<Teacher>> {
        let teacher = self
            .uow
            .repository()
            .get_first_or_default_with(
                move |teacher: &Teacher| teacher.id == teacher_id,
                IncludeSpec::new().with(Teacher::students_include()),
            )
            .await?;
        Ok(teacher)
    }

    /// Teachers ordered by name, one page at a time.
    pub async fn list_teachers(
        &self,
        page_index: u32,
        page_size: u32,
    ) -> ServiceResult<PagedResult<TeacherSummary>> {
        let query = Query::new()
            .order_by(|teacher: &Teacher| teacher.name.clone())
            .include(Teacher::students_include());
        let page = self
            .uow
            .repository()
            .get_paged(page_index, page_size, query)
            .await?;
        Ok(page.map(TeacherSummary::from))
    }

    /// Rolls back anything left open and retires the unit of work.
    pub async fn dispose(&mut self) -> ServiceResult<()> {
        Ok(self.uow.dispose().await?)
    }

    async fn add_students_in(
        uow: &mut UnitOfWork<S>,
        teacher_id: i64,
        students: &[CreateStudentItem],
    ) -> ServiceResult<usize> {
        if students.is_empty() {
            return Ok(0);
        }

        let students = students.to_vec();
        uow.execute_in_transaction(move |uow| {
            async move {
                let repository = uow.repository();
                if repository.get_by_id::<Teacher>(&teacher_id).await?.is_none() {
                    return Err(ServiceError::TeacherNotFound(teacher_id));
                }
                let mut rows: Vec<Student> = students
                    .iter()
                    .map(|item| student_from(item, teacher_id))
                    .collect();
                repository.add_range(&mut rows).await?;
                Ok::<usize, ServiceError>(rows.len())
            }
            .boxed()
        })
        .await
    }
}

async fn stage_teacher_with_students<S: Session>(
    repository: &Repository<S>,
    request: &CreateTeacherRequest,
) -> ServiceResult<i64> {
    let mut teacher = Teacher::new(
        request.teacher_name.trim(),
        request.age,
        request.course_name.clone(),
    );
    repository.add(&mut teacher).await?;

    if !request.students.is_empty() {
        let mut students: Vec<Student> = request
            .students
            .iter()
            .map(|item| student_from(item, teacher.id))
            .collect();
        repository.add_range(&mut students).await?;
    }
    Ok(teacher.id)
}

fn student_from(item: &CreateStudentItem, teacher_id: i64) -> Student {
    Student::new(
        item.student_name.trim(),
        item.age,
        item.class_name.clone(),
        teacher_id,
    )
}

fn validate_request(request: &CreateTeacherRequest) -> ServiceResult<()> {
    if request.teacher_name.trim().is_empty() {
        return Err(ServiceError::Validation(
            "teacher_name cannot be blank".to_string(),
        ));
    }
    validate_students(&request.students)
}

fn validate_students(students: &[CreateStudentItem]) -> ServiceResult<()> {
    match students
        .iter()
        .position(|item| item.student_name.trim().is_empty())
    {
        Some(index) => Err(ServiceError::Validation(format!(
            "student_name at index {index} cannot be blank"
        ))),
        None => Ok(()),
    }
}

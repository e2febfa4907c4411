//! Sample school domain used by the teacher service and integration tests.
//!
//! # Responsibility
//! - Provide concrete entities with integer, engine-assigned identities.
//! - Declare the relations that include specs can eager-load.
//!
//! # Invariants
//! - Navigation fields are `#[serde(skip)]`; they are never persisted and are
//!   empty unless requested through an include spec.
//! - Names are non-blank and at most 80 characters.

use super::entity::{Entity, EntityValidationError};
use super::now_epoch_ms;
use crate::repo::include::{BelongsTo, HasMany};
use serde::{Deserialize, Serialize};

const MAX_NAME_CHARS: usize = 80;
const MAX_AGE: u32 = 150;

/// Teacher record. Owns many students through `Student::teacher_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Teacher {
    /// Engine-assigned when left at `0` before the first add.
    pub id: i64,
    pub name: String,
    pub age: u32,
    pub course_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    /// Unix epoch milliseconds of the last business update.
    pub updated_at: Option<i64>,
    /// Filled by the `teacher_students` include only.
    #[serde(skip)]
    pub students: Vec<Student>,
}

impl Teacher {
    pub fn new(name: impl Into<String>, age: u32, course_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            age,
            course_name: course_name.into(),
            phone: None,
            email: None,
            created_at: now_epoch_ms(),
            updated_at: None,
            students: Vec::new(),
        }
    }

    /// Eager-loads `students` through `Student::teacher_id`.
    pub fn students_include() -> HasMany<Teacher, Student> {
        HasMany::new(
            "teacher_students",
            |student| Some(student.teacher_id),
            |teacher, students| teacher.students = students,
        )
    }
}

impl Entity for Teacher {
    type Key = i64;

    const KIND: &'static str = "teachers";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        validate_name(Self::KIND, "name", &self.name)?;
        validate_age(Self::KIND, self.age)
    }
}

/// Student record. Belongs to one teacher and optionally one class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub age: u32,
    pub class_name: String,
    pub teacher_id: i64,
    pub class_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    /// Filled by the `student_teacher` include only.
    #[serde(skip)]
    pub teacher: Option<Box<Teacher>>,
}

impl Student {
    pub fn new(
        name: impl Into<String>,
        age: u32,
        class_name: impl Into<String>,
        teacher_id: i64,
    ) -> Self {
        Self {
            id: 0,
            name: name.into(),
            age,
            class_name: class_name.into(),
            teacher_id,
            class_id: None,
            created_at: now_epoch_ms(),
            updated_at: None,
            teacher: None,
        }
    }

    pub fn teacher_include() -> BelongsTo<Student, Teacher> {
        BelongsTo::new(
            "student_teacher",
            |student| Some(student.teacher_id),
            |student, teacher| student.teacher = teacher.map(Box::new),
        )
    }
}

impl Entity for Student {
    type Key = i64;

    const KIND: &'static str = "students";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        validate_name(Self::KIND, "name", &self.name)?;
        validate_age(Self::KIND, self.age)?;
        if self.teacher_id <= 0 {
            return Err(EntityValidationError::new(
                Self::KIND,
                "teacher_id must reference a saved teacher",
            ));
        }
        Ok(())
    }
}

/// Class record. Taught by one teacher, attended by many students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRoom {
    pub id: i64,
    pub name: String,
    /// School grade, 1..=12.
    pub grade: u8,
    pub teacher_id: i64,
    pub created_at: i64,
    pub updated_at: Option<i64>,
    #[serde(skip)]
    pub teacher: Option<Box<Teacher>>,
    #[serde(skip)]
    pub students: Vec<Student>,
}

impl ClassRoom {
    pub fn new(name: impl Into<String>, grade: u8, teacher_id: i64) -> Self {
        Self {
            id: 0,
            name: name.into(),
            grade,
            teacher_id,
            created_at: now_epoch_ms(),
            updated_at: None,
            teacher: None,
            students: Vec::new(),
        }
    }

    pub fn teacher_include() -> BelongsTo<ClassRoom, Teacher> {
        BelongsTo::new(
            "class_teacher",
            |class| Some(class.teacher_id),
            |class, teacher| class.teacher = teacher.map(Box::new),
        )
    }

    /// Eager-loads `students` through `Student::class_id`.
    pub fn students_include() -> HasMany<ClassRoom, Student> {
        HasMany::new(
            "class_students",
            |student| student.class_id,
            |class, students| class.students = students,
        )
    }
}

impl Entity for ClassRoom {
    type Key = i64;

    const KIND: &'static str = "classes";

    fn id(&self) -> &i64 {
        &self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = id;
    }

    fn validate(&self) -> Result<(), EntityValidationError> {
        validate_name(Self::KIND, "name", &self.name)?;
        if !(1..=12).contains(&self.grade) {
            return Err(EntityValidationError::new(
                Self::KIND,
                format!("grade must be within 1..=12, got {}", self.grade),
            ));
        }
        Ok(())
    }
}

fn validate_name(
    kind: &'static str,
    field: &str,
    value: &str,
) -> Result<(), EntityValidationError> {
    if value.trim().is_empty() {
        return Err(EntityValidationError::new(
            kind,
            format!("{field} cannot be blank"),
        ));
    }
    if value.chars().count() > MAX_NAME_CHARS {
        return Err(EntityValidationError::new(
            kind,
            format!("{field} exceeds {MAX_NAME_CHARS} characters"),
        ));
    }
    Ok(())
}

fn validate_age(kind: &'static str, age: u32) -> Result<(), EntityValidationError> {
    if age > MAX_AGE {
        return Err(EntityValidationError::new(
            kind,
            format!("age {age} is out of range"),
        ));
    }
    Ok(())
}

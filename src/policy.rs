// src/policy.rs
//
// Authorization decisions as pure functions of (role, actor, ownership).
// Handlers fetch whatever ownership facts a decision needs and call in;
// nothing here touches the database or the transport.

/// User role, parsed from the JWT `role` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    /// Unknown strings fall back to Student, the least-privileged role.
    pub fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            "teacher" => Role::Teacher,
            _ => Role::Student,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// Who owns a quiz. A quiz either hangs off a lesson (owned by the
/// course instructor) or stands alone (owned by its creating instructor).
/// Carrying this as a tagged value keeps the nullable-lesson branching
/// out of every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizOwner {
    Standalone { instructor_id: i64 },
    Lesson { course_instructor_id: i64 },
}

impl QuizOwner {
    pub fn instructor_id(&self) -> i64 {
        match *self {
            QuizOwner::Standalone { instructor_id } => instructor_id,
            QuizOwner::Lesson {
                course_instructor_id,
            } => course_instructor_id,
        }
    }
}

/// Access facts for starting an attempt.
#[derive(Debug, Clone, Copy)]
pub enum QuizAccess {
    Standalone {
        instructor_id: i64,
    },
    Lesson {
        course_instructor_id: i64,
        course_is_free: bool,
        enrolled: bool,
    },
}

/// May `user_id` mutate (edit/delete) the quiz, its questions or choices?
pub fn can_manage_quiz(role: Role, user_id: i64, owner: &QuizOwner) -> bool {
    role.is_admin() || owner.instructor_id() == user_id
}

/// May `user_id` grade answers or read statistics for the quiz?
/// Same ownership rule as management.
pub fn can_review_quiz(role: Role, user_id: i64, owner: &QuizOwner) -> bool {
    can_manage_quiz(role, user_id, owner)
}

/// May `user_id` start an attempt?
///
/// Lesson quizzes gate on enrollment unless the course is free or the
/// caller owns it. Standalone quizzes are open to any signed-in user,
/// matching the legacy behavior (a deliberate decision, see DESIGN.md).
pub fn can_start_attempt(role: Role, user_id: i64, access: &QuizAccess) -> bool {
    match *access {
        QuizAccess::Standalone { .. } => true,
        QuizAccess::Lesson {
            course_instructor_id,
            course_is_free,
            enrolled,
        } => {
            role.is_admin()
                || course_instructor_id == user_id
                || course_is_free
                || enrolled
        }
    }
}

/// May `user_id` see full answer keys (is_correct flags, explanations)?
pub fn can_view_answer_key(role: Role, user_id: i64, owner: &QuizOwner) -> bool {
    can_manage_quiz(role, user_id, owner)
}

/// May `user_id` mutate (edit/delete) a course owned by `instructor_id`?
pub fn can_manage_course(role: Role, user_id: i64, instructor_id: i64) -> bool {
    role.is_admin() || instructor_id == user_id
}

/// May `user_id` remove a comment authored by `author_id`?
pub fn can_remove_comment(role: Role, user_id: i64, author_id: i64) -> bool {
    role.is_admin() || author_id == user_id
}

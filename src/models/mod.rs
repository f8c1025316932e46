pub mod course;
pub mod enrollment;
pub mod envelope;

pub use course::{Course, CourseRow, NewCourseRequest};
pub use enrollment::{
    Enrollment, MoveEnrollmentRequest, NewEnrollmentRequest, ScheduledCourse, ScheduledCourseRow,
    Slot, MAX_PERIOD, MAX_TERM,
};
pub use envelope::Envelope;

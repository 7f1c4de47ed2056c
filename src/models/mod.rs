//! Data models for the classroom sync backend.
//!
//! Request structs use camelCase to match the JSON API.

mod assignment;
mod classroom;
mod meta;
mod student;
mod submission;
mod teacher;

pub use assignment::*;
pub use classroom::*;
pub use meta::*;
pub use student::*;
pub use submission::*;
pub use teacher::*;

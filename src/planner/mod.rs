pub mod extract;
pub mod fallback;
pub mod parser;
pub mod prompt;
pub mod validator;

pub use parser::{ActionDefaults, PlanParser};
pub use validator::{optimize, validate, ValidationIssue};

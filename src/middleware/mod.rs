pub mod viewer;

pub use viewer::{identify_caller, TOKEN_HEADER, USER_HEADER};

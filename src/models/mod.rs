pub mod approver;
pub mod payment;
pub mod request;
pub mod response;
pub mod user;

pub use approver::*;
pub use payment::*;
pub use request::*;
pub use response::*;
pub use user::*;

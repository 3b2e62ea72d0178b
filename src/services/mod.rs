pub mod access;
pub mod lifecycle;
pub mod notifier;
pub mod payments;
pub mod policy;
pub mod projection;
pub mod quote;
pub mod snapshot;
pub mod store;
pub mod token;
pub mod users;
pub mod validation;

pub use access::Caller;
pub use lifecycle::Action;
pub use notifier::{HttpNotifier, LogNotifier, Notifier};
pub use payments::{PaymentService, Paging};
pub use policy::{PolicyService, PolicyUpdate};
pub use projection::Perspective;
pub use quote::{QuoteService, QuoteSource, StaticQuotes};
pub use store::Store;
pub use token::TokenCipher;
pub use users::UserDirectory;

pub mod authenticator;
pub mod user;

pub use authenticator::{Authenticator, AuthenticatorKind};
pub use user::User;

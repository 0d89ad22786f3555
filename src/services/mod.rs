pub mod authenticator;
pub mod email;
pub mod totp;

pub use authenticator::{AuthenticatorService, Enrollment, TotpChallenge};
pub use email::EmailService;
pub use totp::TotpService;

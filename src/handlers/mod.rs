pub mod authenticator;
pub mod enroll;
pub mod health;

pub use authenticator::{
    delete_authenticator, delete_device, get_authenticator, list_authenticators,
    regenerate_recovery_codes,
};
pub use enroll::{begin_enrollment, enroll};
pub use health::health_check;

pub mod login_event;
pub mod user;

pub use login_event::{GeoPoint, LoginEvent};
pub use user::{Principal, Role, User};

pub mod message;
pub mod user;

pub use message::{Message, Role};
pub use user::User;

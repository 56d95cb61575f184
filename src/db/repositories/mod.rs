pub mod users;

pub use users::{UserStore, UsersRepository};

pub mod rest;

pub use rest::{router, AppState, RestApi};

pub mod user_models;

pub mod agent;
pub mod errors;
pub mod models;
pub mod providers;
pub mod settings;
pub mod token_counter;
pub mod tools;

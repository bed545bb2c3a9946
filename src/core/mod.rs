pub mod provision;
pub mod server;
pub mod settings;

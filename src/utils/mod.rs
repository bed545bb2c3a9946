pub mod executor;
pub mod logger;
pub mod password;
pub mod paths;
pub mod secrets;

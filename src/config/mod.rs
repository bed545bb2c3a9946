pub mod defaults;
pub mod format;

pub mod format;
pub mod keyed_mutex;
pub mod validation;

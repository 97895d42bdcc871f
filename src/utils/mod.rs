pub mod num;
pub mod text;

pub use num::{safe_round, MISSING};
pub use text::sanitize_filename;

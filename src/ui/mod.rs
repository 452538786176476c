pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{banner, error, info, section, status, success, warn};
pub use table::{TableBuilder, counts_table};
pub use theme::{theme, Theme};

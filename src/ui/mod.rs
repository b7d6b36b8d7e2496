pub mod icons;
pub mod output;
pub mod spinner;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, error, header, info, muted, section, success, summary_row, warn, human_bytes};
pub use spinner::Spinner;
pub use table::{TableBuilder, render_result, render_table, stats_table};
pub use theme::{theme, Theme};

pub mod range;

pub use range::{resolve_date_range, DateRange};

//! Request-side helpers: profiles, target validation and time budgets

pub mod profiles;
pub mod target_parser;
pub mod timing;

pub use profiles::{ProfileCatalog, ProfileOverrides, ScanProfile, DEFAULT_PROFILE};
pub use target_parser::{check_size, estimate_host_count, validate, TargetSpec, TargetToken};
pub use timing::BudgetPlanner;

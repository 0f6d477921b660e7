//! Query model and context aggregation.
//!
//! A [`Query`] is classified into a [`QueryType`]; the [`ContextAggregator`]
//! maps the type to a base document set, applies opt-ins for restricted
//! categories, and fits the result into the configured budget.

mod aggregator;
mod query;
mod truncate;

pub use aggregator::{CHARS_PER_TOKEN, ContextAggregator, ContextPackage, PackagedDocument};
pub use query::{ContextMode, Query, QueryOverrides, QueryType, classify};
pub use truncate::{MIN_CUT_CHARS, TRUNCATION_MARKER};

//! Parameter-specific SQL handlers.
//!
//! Each handler produces a condition over the columns of a single
//! `search_index` row. The caller supplies the correlated subquery that
//! binds the row to a resource and parameter name.

mod composite;
mod date;
mod number;
mod quantity;
mod reference;
mod string;
mod token;
mod uri;

pub use composite::CompositeHandler;
pub use date::DateHandler;
pub use number::NumberHandler;
pub use quantity::QuantityHandler;
pub use reference::ReferenceHandler;
pub use string::StringHandler;
pub use token::TokenHandler;
pub use uri::UriHandler;

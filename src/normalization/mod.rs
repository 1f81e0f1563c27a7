pub mod keywords;
pub mod names;
pub mod region;

pub use keywords::{KeywordRule, KeywordRules};
pub use names::{resolve, resolve_exact, NameKey, Named, Resolution};
pub use region::region_for;

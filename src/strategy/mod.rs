//! Strategy Search (C6): the six strategy families that turn a trade
//! graph and a set of live quotes into `ArbOpportunity` candidates.

pub mod curated;
pub mod search;

pub use curated::{AssetClassSchedule, CuratedTables};
pub use search::StrategySearch;

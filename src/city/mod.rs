//! City layer - resources, the tribe ledger, recipes and outposts

pub mod drops;
pub mod outpost;
pub mod recipe;
pub mod resource;
pub mod stockpile;

pub use drops::ResourceDrops;
pub use outpost::{LeaderDirective, Outpost, OutpostRuntime, OutpostStatus};
pub use recipe::{Recipe, RecipeCatalog, Station};
pub use resource::ResourceKind;
pub use stockpile::Stockpile;

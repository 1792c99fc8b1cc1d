pub mod loader;
pub mod normalize;
pub mod split;
pub mod table;

pub use loader::*;
pub use normalize::*;
pub use split::*;
pub use table::*;

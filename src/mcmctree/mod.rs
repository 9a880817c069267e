pub mod annotations;
pub mod reader;

pub use annotations::CredibilityInterval;
pub use reader::{
    parse_figtree, read_mcmctree, read_mcmctree_file, McmcTreeOutput, NodeAge, NodeAgeTable,
    ReaderOptions,
};

mod model;
mod project;
mod timezone;

pub use model::{
    CONFIG_FILE, CollectionConfig, Config, DRAFTS_DIR, DefaultScope, FrontMatterDefault, POSTS,
    TocConfig,
};
pub(crate) use model::extension_of;
pub use project::resolve_site_root;
pub use timezone::parse_timezone;

//! Entity loaders.

mod single_id;

pub use single_id::SingleIdEntityLoader;

pub mod fs_cms;
pub mod in_memory_cms;

pub use fs_cms::FsCms;
pub use in_memory_cms::InMemoryCms;

use std::alloc::Layout;

use thiserror::Error;

/// Errors reported by fallible tree operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The global allocator could not provide memory for a new node.
    #[error("failed to allocate tree node ({size} bytes, align {align})")]
    Alloc { size: usize, align: usize },
}

impl Error {
    pub(crate) fn alloc(layout: Layout) -> Self {
        Error::Alloc {
            size: layout.size(),
            align: layout.align(),
        }
    }

    /// Returns the layout of the failed allocation, if any.
    pub fn layout(&self) -> Option<Layout> {
        match *self {
            Error::Alloc { size, align } => Layout::from_size_align(size, align).ok(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

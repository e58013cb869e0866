//! File actions module.
//!
//! This module provides functionality for:
//! - Atomic hardlink installation over an existing target file
//! - Reserving a free temporary name next to the target
//! - Detecting paths that already share an inode
//!
//! ```no_run
//! use relink::actions::link::atomic_link;
//! use std::path::Path;
//!
//! atomic_link(Path::new("/srv/source/a.iso"), Path::new("/srv/target/a.iso")).unwrap();
//! ```

pub mod link;

// Re-export commonly used types
pub use link::{atomic_link, safe_temp_path, same_inode, LinkError, LinkStep};

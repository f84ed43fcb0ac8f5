//! Name matching for directory-level change events.
//!
//! OS watch APIs report changes per directory, so a batch can mention any
//! entry next to the target. Only an entry whose file name equals the
//! target's counts as a change to the target.

use std::ffi::OsStr;
use std::path::Path;

/// True if any changed entry in the batch has the target's file name.
pub fn batch_touches_target<'a, I>(target_name: &OsStr, changed: I) -> bool
where
    I: IntoIterator<Item = &'a Path>,
{
    changed
        .into_iter()
        .any(|entry| entry.file_name() == Some(target_name))
}

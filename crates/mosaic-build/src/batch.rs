//! Size-bounded batching of command-line items
//!
//! Tools such as `ar` receive their inputs on the command line, which has a
//! length limit. [`split_for_size`] cuts an ordered input list into contiguous
//! groups that each fit.

use crate::error::{BuildError, BuildResult};
use std::path::{Path, PathBuf};

/// Something with a size on a command line
pub trait SizedItem {
    /// Length counted against the limit
    fn size(&self) -> usize;

    /// Name used in error messages
    fn label(&self) -> String;
}

impl SizedItem for String {
    fn size(&self) -> usize {
        self.len()
    }

    fn label(&self) -> String {
        self.clone()
    }
}

impl SizedItem for &str {
    fn size(&self) -> usize {
        self.len()
    }

    fn label(&self) -> String {
        self.to_string()
    }
}

impl SizedItem for PathBuf {
    fn size(&self) -> usize {
        self.as_os_str().len()
    }

    fn label(&self) -> String {
        self.display().to_string()
    }
}

impl SizedItem for &Path {
    fn size(&self) -> usize {
        self.as_os_str().len()
    }

    fn label(&self) -> String {
        self.display().to_string()
    }
}

/// Split `items` into contiguous, order-preserving groups under `max_size`
///
/// Items in one group are separated by one unit (a space), which counts
/// toward the limit. An item that alone exceeds `max_size` is an error.
pub fn split_for_size<T: SizedItem>(
    items: impl IntoIterator<Item = T>,
    max_size: usize,
) -> BuildResult<Vec<Vec<T>>> {
    let mut groups = Vec::new();
    let mut current = Vec::new();
    let mut current_size = 0;

    for item in items {
        let size = item.size();
        if size > max_size {
            return Err(BuildError::ItemTooLarge {
                item: item.label(),
                size,
                max: max_size,
            });
        }

        if current_size + size > max_size {
            groups.push(std::mem::take(&mut current));
            current_size = 0;
        }

        current_size += size + 1;
        current.push(item);
    }

    if !current.is_empty() {
        groups.push(current);
    }

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        let groups = split_for_size(Vec::<String>::new(), 10).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn test_separator_counts() {
        let groups = split_for_size(["12345", "1234"], 10).unwrap();
        assert_eq!(groups, vec![vec!["12345", "1234"]]);

        let groups = split_for_size(["12345", "12345"], 10).unwrap();
        assert_eq!(groups, vec![vec!["12345"], vec!["12345"]]);
    }

    #[test]
    fn test_error_names_item() {
        let err = split_for_size([PathBuf::from("obj/too_long.o")], 4).unwrap_err();
        match err {
            BuildError::ItemTooLarge { item, size, max } => {
                assert_eq!(item, "obj/too_long.o");
                assert_eq!(size, 14);
                assert_eq!(max, 4);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}

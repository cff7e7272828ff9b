//! End-to-end tests through the public tree API.
//!
//! Each file covers one scenario against a real store: in memory where the
//! file adds nothing, memory-mapped where persistence is the point.

#![cfg(test)]

mod helpers;

mod test_allocation_failure;
mod test_corrupt_file;
mod test_depth;
mod test_duplicate_key;
mod test_layout_mismatch;
mod test_parent_links;
mod test_random_inserts;

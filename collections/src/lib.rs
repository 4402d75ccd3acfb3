//! Generic, domain-agnostic data structures shared by the policy index.
//!
//! This crate knows nothing about zones, IP addresses or DNS names: it
//! provides an arena-backed Patricia tree over fixed-width binary keys
//! (`radix`), an arena-backed trie over arbitrary label sequences (`trie`),
//! and a small fixed-width bit vector (`bits`). Domain semantics live in
//! the `rpz` crate, which is the only consumer of this one.

pub mod bits;
pub mod radix;
pub mod trie;

//! Inventory export consumption.
//!
//! The inventory bucket holds dated export directories, each with a
//! `manifest.json` enumerating gzip-compressed CSV data-file parts. This
//! module resolves the most recent completed manifest and streams each
//! part's rows in order.

pub mod manifest;
pub mod rows;

pub use manifest::{Manifest, ManifestFile, ManifestResolver};
pub use rows::{InventoryPartReader, InventoryRow, fetch_part};

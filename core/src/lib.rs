//! Core library for the doze sleep tracker.
//!
//! Everything that does not touch HTTP lives here: the record model and its
//! validation rules, the field normalizer and CSV import pipeline, the
//! dashboard statistics, and the SQLite data layer.

pub mod csv_import;
pub mod db;
pub mod models;
pub mod normalize;
pub mod stats;

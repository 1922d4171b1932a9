//! Pure competition rules: lifting order, rankings and records.

pub mod order;
pub mod records;

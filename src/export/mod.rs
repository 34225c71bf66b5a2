//! Export of aggregated matches.

pub mod csv;

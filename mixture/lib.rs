#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod config;
pub mod data;
pub mod filter;
pub mod fit;
pub mod gaussian;
pub mod kde;
pub mod kde_mixture;
pub mod model;
pub mod output;
pub mod parametric;
pub mod params;
pub mod prob_mat;

#[cfg(test)]
pub(crate) mod test_fixtures;

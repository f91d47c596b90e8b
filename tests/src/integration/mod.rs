//! Multi-validator tests over the in-memory adapters.

pub mod cluster;

#[cfg(test)]
mod boundaries;
#[cfg(test)]
mod scenarios;

//! Database query modules for the LTI outcomes service

pub mod counters;
pub mod entries;
pub mod journals;
pub mod roles;

#[cfg(test)]
pub mod test_fixtures;

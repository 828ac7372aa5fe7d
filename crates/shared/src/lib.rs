//! Wire types shared between the analysis client and its tooling.

pub mod domain;
pub mod error;
pub mod protocol;

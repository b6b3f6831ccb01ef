//! Report rendering. `batch` is the machine-parsable format from spec §6;
//! `text` is a human-readable non-interactive summary (the interactive
//! restart prompt itself stays out of scope).

pub mod batch;
pub mod text;

//! Crate-wide error type.
//!
//! Packing never fails; everything that can (configuration checks, clustering on empty input,
//! buffer size mismatches, image I/O) reports through [`anyhow`], with context attached at the
//! call site.

pub use anyhow::{Context, Error};

/// Convenient wrapper around `std::Result`.
pub type Result<T> = anyhow::Result<T>;

/// Render the error with its chain of causes, one per line.
pub fn display(error: &Error) -> String {
  let mut msg = "Error:\n".to_string();
  error
    .chain()
    .enumerate()
    .for_each(|(index, cause)| msg.push_str(&format!("└> {} - {}\n", index, cause)));
  msg
}

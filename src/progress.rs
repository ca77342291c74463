//! Cooperative checkpoints.
//!
//! Long loops (packing attempts, k-means iterations, projection chunks) call
//! [`Checkpoint::checkpoint`] at fixed intervals. The host can report progress there,
//! yield to its own scheduler, or ask the loop to stop by returning [`Command::Cancel`].
//! Nothing here depends on a particular runtime: [`Unobserved`] is a no-op checkpoint, any
//! `FnMut(Progress) -> Command` is one, and [`CancelToken`] can be shared across threads.

use std::sync::{
  Arc, atomic::{AtomicBool, Ordering}
};

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Progress {
  Packing {
    /// Placed area over island area, `[0, 1]` up to overshoot of the sampled fit test.
    fill: f32,
    /// Attempts that did not place a shape.
    failed_attempts: u64,
    attempts_used: u64,
  },
  Clustering { iteration: u32, max_iter: u32 },
  Projecting { done: usize, total: usize },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Command {
  Continue,
  Cancel,
}

pub trait Checkpoint {
  fn checkpoint(&mut self, progress: Progress) -> Command;
}

/// Checkpoint that never cancels and reports nowhere.
#[derive(Debug, Copy, Clone, Default)]
pub struct Unobserved;

impl Checkpoint for Unobserved {
  fn checkpoint(&mut self, _: Progress) -> Command {
    Command::Continue
  }
}

impl<F> Checkpoint for F where F: FnMut(Progress) -> Command {
  fn checkpoint(&mut self, progress: Progress) -> Command {
    self(progress)
  }
}

/// Shared cancellation flag; clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}

impl Checkpoint for CancelToken {
  fn checkpoint(&mut self, _: Progress) -> Command {
    if self.is_cancelled() { Command::Cancel } else { Command::Continue }
  }
}

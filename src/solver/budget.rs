//! Distribution of one cluster's attempt budget over its islands.
//!
//! Every planned scheme walks the islands in order (largest first) and clamps each quota to
//! what is left, so the quotas never sum to more than the budget. The adaptive scheme plans
//! nothing: it hands out quotas while packing and stops once the budget is spent.

use {
  super::packer::Strategy,
  crate::geometry::shapes::named_enum,
};

/// Smallest quota a planned scheme hands out while budget remains.
pub const MIN_ALLOCATION: u64 = 500;

/// Flat base of the `fixed` scheme.
pub const FIXED_BASE: u64 = 1000;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BudgetScheme {
  /// Even split of what is left, capped by 1.5× the island's area share.
  FairShare,
  /// Area share of the total.
  Proportional,
  /// Area share where islands of 500 px or more count double.
  Weighted,
  /// 1000 per island plus an area share of the rest.
  Fixed,
  /// Share proportional to the square root of the area.
  Exponential,
  /// No plan; see [`AdaptiveBudget`].
  Adaptive,
}

named_enum!(BudgetScheme {
  FairShare => "fairshare",
  Proportional => "proportional",
  Weighted => "weighted",
  Fixed => "fixed",
  Exponential => "exponential",
  Adaptive => "adaptive",
});

/// How the adaptive scheme's consecutive-failure threshold depends on island size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ThresholdMode {
  Fixed,
  /// ×1.67 / ×1.33 / ×1 / ×0.5 / ×0.33 at ≥1000 / ≥500 / ≥100 / ≥20 / <20 px.
  Scaled,
}

named_enum!(ThresholdMode {
  Fixed => "fixed",
  Scaled => "scaled",
});

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetPolicy {
  pub scheme: BudgetScheme,
  /// Consecutive failures before the adaptive scheme abandons an island.
  pub adaptive_threshold: u64,
  pub threshold_mode: ThresholdMode,
}

impl Default for BudgetPolicy {
  fn default() -> Self {
    Self {
      scheme: BudgetScheme::FairShare,
      adaptive_threshold: 300,
      threshold_mode: ThresholdMode::Fixed,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Allocation {
  /// One quota per island, in island order. A zero quota skips the island.
  Planned(Vec<u64>),
  Adaptive(AdaptiveBudget),
}

impl BudgetPolicy {
  pub fn new(scheme: BudgetScheme) -> Self {
    Self { scheme, ..Self::default() }
  }

  pub fn with_adaptive_threshold(mut self, threshold: u64, mode: ThresholdMode) -> Self {
    self.adaptive_threshold = threshold;
    self.threshold_mode = mode;
    self
  }

  /// Budget plan for islands of the given areas, ordered as they will be packed.
  pub fn allocate(&self, total: u64, areas: &[usize]) -> Allocation {
    let cluster_area = areas.iter().sum::<usize>();
    match self.scheme {
      BudgetScheme::Adaptive => Allocation::Adaptive(AdaptiveBudget {
        total,
        remaining: total,
        cluster_area,
        base_threshold: self.adaptive_threshold,
        mode: self.threshold_mode,
      }),
      scheme => Allocation::Planned(plan(scheme, total, areas)),
    }
  }
}

fn plan(scheme: BudgetScheme, total: u64, areas: &[usize]) -> Vec<u64> {
  let n = areas.len();
  let cluster_area = areas.iter().sum::<usize>().max(1) as f64;
  let weight = |a: usize| if a >= 500 { 2.0 * a as f64 } else { a as f64 };
  let weighted_area = areas.iter().map(|&a| weight(a)).sum::<f64>().max(1.0);
  let root_area = areas.iter().map(|&a| (a as f64).sqrt()).sum::<f64>().max(1.0);
  let fixed_rest = total - (FIXED_BASE * n as u64).min(total);
  let share = |of: u64, part: f64, whole: f64| (of as f64 * part / whole).floor() as u64;

  let mut remaining = total;
  areas.iter().enumerate().map(|(i, &a)| {
    let wanted = match scheme {
      BudgetScheme::FairShare => {
        let even = remaining / (n - i) as u64;
        let capped = share(total, 1.5 * a as f64, cluster_area);
        even.min(capped).max(MIN_ALLOCATION)
      }
      BudgetScheme::Proportional => share(total, a as f64, cluster_area).max(MIN_ALLOCATION),
      BudgetScheme::Weighted => share(total, weight(a), weighted_area).max(MIN_ALLOCATION),
      BudgetScheme::Fixed => FIXED_BASE + share(fixed_rest, a as f64, cluster_area),
      BudgetScheme::Exponential => share(total, (a as f64).sqrt(), root_area).max(MIN_ALLOCATION),
      BudgetScheme::Adaptive => 0,
    };
    let granted = wanted.min(remaining);
    remaining -= granted;
    granted
  }).collect()
}

/// Running budget of the adaptive scheme.
///
/// Quotas are handed out island by island from what is left; the caller reports what each
/// island actually used with [`AdaptiveBudget::consume`].
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveBudget {
  total: u64,
  remaining: u64,
  cluster_area: usize,
  base_threshold: u64,
  mode: ThresholdMode,
}

impl AdaptiveBudget {
  pub fn remaining(&self) -> u64 {
    self.remaining
  }

  pub fn is_exhausted(&self) -> bool {
    self.remaining == 0
  }

  /// Consecutive failures after which an island of `area` pixels is abandoned.
  pub fn threshold(&self, area: usize) -> u64 {
    let base = self.base_threshold as f64;
    let scaled = match (self.mode, area) {
      (ThresholdMode::Fixed, _) => base,
      (ThresholdMode::Scaled, a) if a >= 1000 => base * 1.67,
      (ThresholdMode::Scaled, a) if a >= 500 => base * 1.33,
      (ThresholdMode::Scaled, a) if a >= 100 => base,
      (ThresholdMode::Scaled, a) if a >= 20 => base * 0.5,
      (ThresholdMode::Scaled, _) => base * 0.33,
    };
    (scaled.floor() as u64).max(1)
  }

  /// Attempt cap for the next island, `None` once the budget is spent.
  pub fn quota(&self, area: usize, strategy: Strategy) -> Option<u64> {
    if self.is_exhausted() {
      return None;
    }
    let wanted = match strategy {
      Strategy::PixelFill => 0,
      Strategy::MicroPack => (area as u64 * 30).min(3000),
      Strategy::FullPack => {
        let share = area as f64 / self.cluster_area.max(1) as f64;
        (share * self.total as f64 * 2.0).floor() as u64
      }
    };
    Some(wanted.min(self.remaining))
  }

  pub fn consume(&mut self, used: u64) {
    self.remaining = self.remaining.saturating_sub(used);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn planned(scheme: BudgetScheme, total: u64, areas: &[usize]) -> Vec<u64> {
    match BudgetPolicy::new(scheme).allocate(total, areas) {
      Allocation::Planned(quotas) => quotas,
      Allocation::Adaptive(_) => panic!("{scheme} should plan ahead"),
    }
  }

  #[test] fn fairshare_floor_and_clamp() {
    let quotas = planned(BudgetScheme::FairShare, 1000, &[800, 100, 100]);
    assert_eq!(quotas, vec![500, 500, 0]);
    assert!(quotas.iter().filter(|&&q| q > 0).all(|&q| q >= MIN_ALLOCATION));
    assert!(quotas.iter().sum::<u64>() <= 1000);
  }

  #[test] fn fairshare_even_split() {
    let quotas = planned(BudgetScheme::FairShare, 10_000, &[3000, 3000, 3000, 1000]);
    assert_eq!(quotas, vec![2500, 2500, 2500, 1500]);
  }

  #[test] fn proportional_and_weighted() {
    assert_eq!(planned(BudgetScheme::Proportional, 10_000, &[6000, 3000, 1000]), vec![6000, 3000, 1000]);
    assert_eq!(planned(BudgetScheme::Proportional, 10_000, &[9900, 50, 50]), vec![9900, 100, 0]);
    // 1000 counts as 2000 out of 2400
    assert_eq!(planned(BudgetScheme::Weighted, 12_000, &[1000, 200, 200]), vec![10_000, 1000, 1000]);
  }

  #[test] fn fixed_base_plus_share() {
    assert_eq!(planned(BudgetScheme::Fixed, 5000, &[300, 100]), vec![3250, 1750]);
    assert_eq!(planned(BudgetScheme::Fixed, 1500, &[300, 100]), vec![1000, 500]);
  }

  #[test] fn exponential_compresses_shares() {
    let quotas = planned(BudgetScheme::Exponential, 10_000, &[900, 100]);
    assert_eq!(quotas, vec![7500, 2500]);
    let linear = planned(BudgetScheme::Proportional, 10_000, &[900, 100]);
    assert!(quotas[1] > linear[1]);
  }

  #[test] fn planned_never_exceeds_total() {
    let areas = [5000, 1200, 640, 300, 90, 45, 20, 19, 3, 1];
    for scheme in [
      BudgetScheme::FairShare, BudgetScheme::Proportional, BudgetScheme::Weighted,
      BudgetScheme::Fixed, BudgetScheme::Exponential,
    ] {
      for total in [0, 499, 500, 2_000, 10_000, 123_457] {
        let quotas = planned(scheme, total, &areas);
        assert_eq!(quotas.len(), areas.len());
        assert!(quotas.iter().sum::<u64>() <= total, "{scheme} over budget at {total}");
      }
    }
  }

  #[test] fn adaptive_quotas() {
    let policy = BudgetPolicy::new(BudgetScheme::Adaptive)
      .with_adaptive_threshold(300, ThresholdMode::Scaled);
    let Allocation::Adaptive(mut budget) = policy.allocate(10_000, &[2000, 1500, 900, 600]) else {
      panic!("adaptive scheme does not plan")
    };
    assert_eq!(budget.threshold(4000), 501);
    assert_eq!(budget.threshold(600), 399);
    assert_eq!(budget.threshold(150), 300);
    assert_eq!(budget.threshold(50), 150);
    assert_eq!(budget.threshold(5), 99);

    assert_eq!(budget.quota(2000, Strategy::FullPack), Some(8_000));
    budget.consume(8_000);
    assert_eq!(budget.quota(900, Strategy::FullPack), Some(2_000));
    assert_eq!(budget.quota(80, Strategy::MicroPack), Some(2_000));
    assert_eq!(budget.quota(10, Strategy::PixelFill), Some(0));
    budget.consume(5_000);
    assert!(budget.is_exhausted());
    assert_eq!(budget.quota(80, Strategy::MicroPack), None);
  }

  #[test] fn scheme_names() -> anyhow::Result<()> {
    assert_eq!("fairshare".parse::<BudgetScheme>()?, BudgetScheme::FairShare);
    assert_eq!(BudgetScheme::Exponential.to_string(), "exponential");
    assert_eq!("scaled".parse::<ThresholdMode>()?, ThresholdMode::Scaled);
    Ok(())
  }
}

use core::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Region;

/// When a rule runs relative to the pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePhase {
    /// Before replenishment; no tokens are attached.
    Pre,
    /// After the pull; the issued tokens are attached.
    Post,
}

/// What a rule gets to look at.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// The region being allocated from.
    pub region: &'a Region,
    /// Number of tokens requested.
    pub size: u64,
    /// Whether this is a pre- or post-processing run.
    pub phase: RulePhase,
    /// The tokens just issued, for [`RulePhase::Post`] runs.
    pub tokens: Option<&'a [String]>,
}

/// Reasons a rule refuses an allocation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RuleError {
    /// The region is switched off.
    #[error("region {region} is inactive")]
    Inactive {
        /// Machine name of the region.
        region: String,
    },
    /// The region only hands out tokens in pairs.
    #[error("request size {size} is odd")]
    OddRequest {
        /// The rejected size.
        size: u64,
    },
    /// The request is larger than the region allows at once.
    #[error("request size {size} exceeds the threshold of {max}")]
    ThresholdExceeded {
        /// The rejected size.
        size: u64,
        /// The configured threshold.
        max: u64,
    },
    /// A caller-supplied rule failed.
    #[error("rule {rule} failed: {reason}")]
    Custom {
        /// Name of the failing rule.
        rule: String,
        /// Why it failed.
        reason: String,
    },
}

/// A single pre- or post-processing step attached to a region.
///
/// Closures taking a [`RuleContext`] are rules too, named `"custom"`:
///
/// ```
/// use tokenpool::{Region, Rule, RuleChain, RuleContext, RuleError, RulePhase, StoreKind};
///
/// let region = Region::new("serials", StoreKind::LineFile, "/tmp/numbers", 100);
/// let chain = RuleChain::new().with(|ctx: &RuleContext<'_>| {
///     if ctx.size > 10 {
///         return Err(RuleError::Custom {
///             rule: "small-batches".into(),
///             reason: "at most 10 tokens at once".into(),
///         });
///     }
///     Ok(())
/// });
///
/// let ctx = |size| RuleContext { region: &region, size, phase: RulePhase::Pre, tokens: None };
/// assert!(chain.execute(&ctx(10)).is_ok());
/// assert!(chain.execute(&ctx(11)).is_err());
/// ```
pub trait Rule: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Accepts or refuses the allocation described by `ctx`.
    fn execute(&self, ctx: &RuleContext<'_>) -> Result<(), RuleError>;
}

impl<F> Rule for F
where
    F: Fn(&RuleContext<'_>) -> Result<(), RuleError> + Send + Sync,
{
    fn name(&self) -> &str {
        "custom"
    }

    fn execute(&self, ctx: &RuleContext<'_>) -> Result<(), RuleError> {
        self(ctx)
    }
}

/// The built-in rules, in the form they are configured on a [`Region`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum RuleSpec {
    /// Refuse allocation from an inactive region.
    Active,
    /// Refuse odd request sizes.
    NoOddRequests,
    /// Refuse requests larger than `max`.
    RequestThreshold {
        /// Largest accepted request.
        max: u64,
    },
}

impl Rule for RuleSpec {
    fn name(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::NoOddRequests => "no_odd_requests",
            Self::RequestThreshold { .. } => "request_threshold",
        }
    }

    fn execute(&self, ctx: &RuleContext<'_>) -> Result<(), RuleError> {
        match *self {
            Self::Active if !ctx.region.active => Err(RuleError::Inactive {
                region: ctx.region.machine_name.clone(),
            }),
            Self::NoOddRequests if ctx.size % 2 == 1 => {
                Err(RuleError::OddRequest { size: ctx.size })
            }
            Self::RequestThreshold { max } if ctx.size > max => {
                Err(RuleError::ThresholdExceeded {
                    size: ctx.size,
                    max,
                })
            }
            _ => Ok(()),
        }
    }
}

/// The rules a region runs before and after each allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Run before replenishment, in order.
    #[serde(default)]
    pub pre: Vec<RuleSpec>,
    /// Run after the pull, in order.
    #[serde(default)]
    pub post: Vec<RuleSpec>,
}

/// An ordered list of rules that stops at the first failure.
#[derive(Clone, Default)]
pub struct RuleChain {
    rules: Vec<Arc<dyn Rule>>,
}

impl RuleChain {
    /// An empty chain, which accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// A chain running the given built-in rules in order.
    pub fn from_specs(specs: &[RuleSpec]) -> Self {
        specs.iter().fold(Self::new(), |chain, spec| chain.with(*spec))
    }

    /// Appends `rule` to the end of the chain.
    pub fn with<R: Rule + 'static>(mut self, rule: R) -> Self {
        self.rules.push(Arc::new(rule));
        self
    }

    /// Appends `rule` to the end of the chain in place.
    pub fn push<R: Rule + 'static>(&mut self, rule: R) {
        self.rules.push(Arc::new(rule));
    }

    /// Number of rules in the chain.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// `true` if the chain has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Runs every rule in order, returning the first failure.
    pub fn execute(&self, ctx: &RuleContext<'_>) -> Result<(), RuleError> {
        for rule in &self.rules {
            if let Err(e) = rule.execute(ctx) {
                #[cfg(feature = "tracing")]
                tracing::debug!(rule = rule.name(), phase = ?ctx.phase, error = %e, "rule refused allocation");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RuleChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|rule| rule.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn region() -> Region {
        Region::new("serials", StoreKind::LineFile, "/tmp/numbers", 100)
    }

    fn pre(region: &Region, size: u64) -> RuleContext<'_> {
        RuleContext {
            region,
            size,
            phase: RulePhase::Pre,
            tokens: None,
        }
    }

    #[test]
    fn active_rule_refuses_inactive_region() {
        let mut region = region();
        assert_eq!(RuleSpec::Active.execute(&pre(&region, 1)), Ok(()));
        region.active = false;
        assert_eq!(
            RuleSpec::Active.execute(&pre(&region, 1)),
            Err(RuleError::Inactive {
                region: "serials".into()
            })
        );
    }

    #[test]
    fn odd_and_threshold_rules() {
        let region = region();
        assert!(RuleSpec::NoOddRequests.execute(&pre(&region, 4)).is_ok());
        assert_eq!(
            RuleSpec::NoOddRequests.execute(&pre(&region, 5)),
            Err(RuleError::OddRequest { size: 5 })
        );

        let threshold = RuleSpec::RequestThreshold { max: 10 };
        assert!(threshold.execute(&pre(&region, 10)).is_ok());
        assert_eq!(
            threshold.execute(&pre(&region, 11)),
            Err(RuleError::ThresholdExceeded { size: 11, max: 10 })
        );
    }

    #[test]
    fn chain_short_circuits_on_first_failure() {
        let region = region();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let chain = RuleChain::from_specs(&[RuleSpec::NoOddRequests]).with(
            move |_: &RuleContext<'_>| {
                counted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            },
        );

        assert!(chain.execute(&pre(&region, 3)).is_err());
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert!(chain.execute(&pre(&region, 2)).is_ok());
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn rule_specs_use_tagged_json() {
        let set: RuleSet = serde_json::from_str(
            r#"{"pre":[{"rule":"active"},{"rule":"request_threshold","max":50}]}"#,
        )
        .unwrap();
        assert_eq!(
            set.pre,
            [RuleSpec::Active, RuleSpec::RequestThreshold { max: 50 }]
        );
        assert!(set.post.is_empty());
    }
}

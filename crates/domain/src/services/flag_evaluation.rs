//! Rollout strategy evaluation.

use shared::crypto::{rollout_seed, stable_bucket};

use super::eligibility::flag_is_eligible;
use crate::models::{EvaluationContext, FeatureFlag, Rollout, RolloutStrategy};

/// Percentage bucket (0..100) of an identity for a flag.
///
/// SHA-1 of `"<flag_key>:<identity>"`, leading 32 bits big-endian, mod 100.
pub fn rollout_bucket(flag_key: &str, identity: &str) -> u32 {
    stable_bucket(&rollout_seed(flag_key, identity))
}

/// Whether the rollout admits `context`. `fallback` is returned for
/// strategies this build does not know.
pub fn rollout_admits(
    flag_key: &str,
    rollout: &Rollout,
    context: &EvaluationContext,
    fallback: bool,
) -> bool {
    match &rollout.strategy {
        RolloutStrategy::All => true,
        RolloutStrategy::Percentage => {
            let percentage = rollout.percentage.unwrap_or(0.0);
            let bucket = rollout_bucket(flag_key, context.rollout_identity());
            f64::from(bucket) < percentage
        }
        RolloutStrategy::Roles => match (&context.role, &rollout.roles) {
            (Some(role), Some(roles)) => roles.iter().any(|r| r == role),
            _ => false,
        },
        RolloutStrategy::Branches => match (&context.branch_id, &rollout.branches) {
            (Some(branch), Some(branches)) => branch.is_in(branches),
            _ => false,
        },
        RolloutStrategy::Other(strategy) => {
            tracing::debug!(flag = flag_key, strategy = %strategy, "Unknown rollout strategy, using raw toggle");
            fallback
        }
    }
}

/// Evaluates a resolved flag for a context.
pub fn evaluate_flag(flag: &FeatureFlag, context: &EvaluationContext) -> bool {
    if !flag_is_eligible(flag) {
        return false;
    }
    rollout_admits(&flag.key, &flag.rollout, context, flag.enabled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityId;

    fn flag(key: &str, enabled: bool, rollout: Rollout) -> FeatureFlag {
        let mut flag = FeatureFlag::empty(key);
        flag.enabled = enabled;
        flag.rollout = rollout;
        flag
    }

    #[test]
    fn test_pinned_buckets() {
        assert_eq!(rollout_bucket("call_center_console", "user-1"), 18);
        assert_eq!(rollout_bucket("call_center_console", "user-2"), 13);
        assert_eq!(rollout_bucket("beta_checkout", "user-1"), 99);
        assert_eq!(rollout_bucket("beta_checkout", "session-abc"), 6);
        assert_eq!(rollout_bucket("beta_checkout", "global"), 53);
        assert_eq!(rollout_bucket("beta_checkout", "tenant-42"), 96);
        assert_eq!(rollout_bucket("new_menu", "user-7"), 6);
    }

    #[test]
    fn test_disabled_flag_is_false_for_every_strategy() {
        let ctx = EvaluationContext::new()
            .with_user("user-1")
            .with_role("admin")
            .with_branch(7);
        for rollout in [
            Rollout::all(),
            Rollout::percentage(100.0),
            Rollout::roles(["admin"]),
            Rollout::branches([7]),
        ] {
            assert!(!evaluate_flag(&flag("f", false, rollout), &ctx));
        }
    }

    #[test]
    fn test_all_strategy() {
        assert!(evaluate_flag(&flag("f", true, Rollout::all()), &EvaluationContext::new()));
    }

    #[test]
    fn test_percentage_uses_identity_precedence() {
        let beta = flag("beta_checkout", true, Rollout::percentage(60.0));

        // user-1 -> 99
        let ctx = EvaluationContext::new()
            .with_user("user-1")
            .with_session("session-abc")
            .with_tenant("tenant-42");
        assert!(!evaluate_flag(&beta, &ctx));

        // session-abc -> 6
        let ctx = EvaluationContext::new()
            .with_session("session-abc")
            .with_tenant("tenant-42");
        assert!(evaluate_flag(&beta, &ctx));

        // tenant-42 -> 96
        let ctx = EvaluationContext::new().with_tenant("tenant-42");
        assert!(!evaluate_flag(&beta, &ctx));

        // global -> 53
        assert!(evaluate_flag(&beta, &EvaluationContext::new()));
        let empty_user = EvaluationContext::new().with_user("");
        assert!(evaluate_flag(&beta, &empty_user));
    }

    #[test]
    fn test_percentage_bounds() {
        let ctx = EvaluationContext::new().with_user("user-7");
        assert!(!evaluate_flag(&flag("new_menu", true, Rollout::percentage(0.0)), &ctx));
        assert!(evaluate_flag(&flag("new_menu", true, Rollout::percentage(100.0)), &ctx));
        assert!(!evaluate_flag(&flag("new_menu", true, Rollout::percentage(6.0)), &ctx));
        assert!(evaluate_flag(&flag("new_menu", true, Rollout::percentage(6.5)), &ctx));
    }

    #[test]
    fn test_percentage_distribution_and_stability() {
        let beta = flag("beta_checkout", true, Rollout::percentage(25.0));
        let contexts: Vec<EvaluationContext> = (0..1000)
            .map(|i| EvaluationContext::new().with_user(format!("user-{}", i)))
            .collect();

        let first: Vec<bool> = contexts.iter().map(|c| evaluate_flag(&beta, c)).collect();
        let second: Vec<bool> = contexts.iter().map(|c| evaluate_flag(&beta, c)).collect();

        assert_eq!(first, second);
        assert_eq!(first.iter().filter(|on| **on).count(), 246);
    }

    #[test]
    fn test_roles_strategy() {
        let console = flag("console", true, Rollout::roles(["manager", "admin"]));
        assert!(evaluate_flag(&console, &EvaluationContext::new().with_role("admin")));
        assert!(!evaluate_flag(&console, &EvaluationContext::new().with_role("cashier")));
        assert!(!evaluate_flag(&console, &EvaluationContext::new()));
    }

    #[test]
    fn test_branches_strategy_compares_number_and_string() {
        let pilot = flag("pilot", true, Rollout::branches([EntityId::from(7), EntityId::from("hq")]));
        assert!(evaluate_flag(&pilot, &EvaluationContext::new().with_branch("7")));
        assert!(evaluate_flag(&pilot, &EvaluationContext::new().with_branch(7)));
        assert!(evaluate_flag(&pilot, &EvaluationContext::new().with_branch("hq")));
        assert!(!evaluate_flag(&pilot, &EvaluationContext::new().with_branch(8)));
        assert!(!evaluate_flag(&pilot, &EvaluationContext::new()));
    }

    #[test]
    fn test_unknown_strategy_falls_back_to_enabled() {
        let rollout = Rollout {
            strategy: RolloutStrategy::Other("cohort".into()),
            ..Default::default()
        };
        assert!(evaluate_flag(&flag("f", true, rollout.clone()), &EvaluationContext::new()));
        assert!(!evaluate_flag(&flag("f", false, rollout), &EvaluationContext::new()));
    }
}

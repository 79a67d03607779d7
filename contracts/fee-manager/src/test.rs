#![cfg(test)]
use super::*;
use soroban_sdk::{testutils::Address as _, testutils::Ledger as _, Address, Env};

// ============================================================
// Test Helpers
// ============================================================

/// Returns (client, admin, escrow_addr)
fn setup(env: &Env) -> (FeeManagerContractClient<'_>, Address, Address) {
    let admin = Address::generate(env);
    let escrow = Address::generate(env);
    let id = env.register_contract(None, FeeManagerContract);
    let c = FeeManagerContractClient::new(env, &id);
    c.initialize(&admin, &escrow);
    (c, admin, escrow)
}

const PERIOD: u64 = 30 * 24 * 3600;

// ============================================================
// Initialization
// ============================================================

#[test]
fn test_initialize_seeds_plan_table() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);

    let free = c.get_plan(&SubscriptionTier::Free).unwrap();
    assert_eq!(free.fee_bps, 350);
    assert_eq!(free.max_deals_per_period, 3);
    assert!(!free.api_access);

    let enterprise = c.get_plan(&SubscriptionTier::Enterprise).unwrap();
    assert_eq!(enterprise.fee_bps, 150);
    assert_eq!(enterprise.max_deals_per_period, -1);
    assert_eq!(enterprise.max_volume_per_period, -1);
    assert!(enterprise.bulk_payouts);
}

#[test]
#[should_panic(expected = "already initialized")]
fn test_initialize_twice() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, escrow) = setup(&env);
    c.initialize(&admin, &escrow);
}

// ============================================================
// compute_fee()
// ============================================================

#[test]
fn test_compute_fee_per_tier() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);

    assert_eq!(c.compute_fee(&SubscriptionTier::Free, &10_000), 350);
    assert_eq!(c.compute_fee(&SubscriptionTier::Starter, &10_000), 250);
    assert_eq!(c.compute_fee(&SubscriptionTier::Professional, &10_000), 200);
    assert_eq!(c.compute_fee(&SubscriptionTier::Enterprise, &10_000), 150);
}

#[test]
fn test_compute_fee_truncates_toward_zero() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);

    // 99 * 200 / 10_000 = 1.98 -> 1
    assert_eq!(c.compute_fee(&SubscriptionTier::Professional, &99), 1);
    // below one minor unit of fee
    assert_eq!(c.compute_fee(&SubscriptionTier::Professional, &49), 0);
    assert_eq!(c.compute_fee(&SubscriptionTier::Starter, &0), 0);
}

#[test]
fn test_compute_fee_never_exceeds_amount() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);

    for amount in [1i128, 7, 100, 39_999, 1_000_000_000] {
        let fee = c.compute_fee(&SubscriptionTier::Free, &amount);
        assert!(fee >= 0 && fee <= amount);
    }
}

#[test]
#[should_panic(expected = "invalid amount")]
fn test_compute_fee_rejects_negative_amount() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);
    c.compute_fee(&SubscriptionTier::Free, &-1);
}

// ============================================================
// Tier Assignment
// ============================================================

#[test]
fn test_unknown_account_defaults_to_free() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);
    let brand = Address::generate(&env);

    assert_eq!(c.fee_bps_for(&brand), 350);
    let usage = c.get_usage(&brand);
    assert!(matches!(usage.tier, SubscriptionTier::Free));
    assert_eq!(usage.deals_created, 0);
}

#[test]
fn test_set_tier_changes_fee_rate() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, _) = setup(&env);
    let brand = Address::generate(&env);

    c.set_tier(&admin, &brand, &SubscriptionTier::Starter);
    assert_eq!(c.fee_bps_for(&brand), 250);

    c.set_tier(&admin, &brand, &SubscriptionTier::Enterprise);
    assert_eq!(c.fee_bps_for(&brand), 150);
}

#[test]
#[should_panic(expected = "unauthorized")]
fn test_set_tier_by_stranger() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);
    let stranger = Address::generate(&env);
    c.set_tier(&stranger, &Address::generate(&env), &SubscriptionTier::Starter);
}

#[test]
fn test_upgrade_preserves_period_counters() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, escrow) = setup(&env);
    let brand = Address::generate(&env);

    c.record_deal_created(&escrow, &brand);
    c.record_deal_created(&escrow, &brand);
    c.record_volume(&escrow, &brand, &100_000);

    c.set_tier(&admin, &brand, &SubscriptionTier::Professional);

    let usage = c.get_usage(&brand);
    assert_eq!(usage.deals_created, 2, "deals_created must survive upgrade");
    assert_eq!(usage.volume_processed, 100_000);
}

// ============================================================
// can_perform()
// ============================================================

#[test]
fn test_gate_allows_within_limits() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);
    let brand = Address::generate(&env);

    let d = c.can_perform(&brand, &GateAction::CreateDeal);
    assert!(d.allowed);
    assert_eq!(d.required_tier, MaybeTier::None);
}

#[test]
fn test_gate_denies_over_deal_cap_and_suggests_minimal_tier() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, _, escrow) = setup(&env);
    let brand = Address::generate(&env);

    for _ in 0..3 {
        c.record_deal_created(&escrow, &brand);
    }

    let d = c.can_perform(&brand, &GateAction::CreateDeal);
    assert!(!d.allowed);
    assert_eq!(d.required_tier, MaybeTier::Some(SubscriptionTier::Starter));
}

#[test]
fn test_gate_feature_flags_suggest_upgrades() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, _) = setup(&env);
    let brand = Address::generate(&env);

    let d = c.can_perform(&brand, &GateAction::UseApi);
    assert!(!d.allowed);
    assert_eq!(d.required_tier, MaybeTier::Some(SubscriptionTier::Professional));

    c.set_tier(&admin, &brand, &SubscriptionTier::Professional);
    assert!(c.can_perform(&brand, &GateAction::UseApi).allowed);

    let d = c.can_perform(&brand, &GateAction::BulkPayout);
    assert!(!d.allowed);
    assert_eq!(d.required_tier, MaybeTier::Some(SubscriptionTier::Enterprise));
}

#[test]
fn test_gate_is_monotonic_across_upgrade() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, escrow) = setup(&env);
    let brand = Address::generate(&env);

    // Exhaust the Free deal allowance, then follow the suggested upgrade:
    // the same action with the same usage must now be allowed.
    for _ in 0..3 {
        c.record_deal_created(&escrow, &brand);
    }
    let denied = c.can_perform(&brand, &GateAction::CreateDeal);
    assert!(!denied.allowed);
    let suggested = match denied.required_tier {
        MaybeTier::Some(tier) => tier,
        MaybeTier::None => panic!("expected an upgrade suggestion"),
    };

    c.set_tier(&admin, &brand, &suggested);
    assert!(c.can_perform(&brand, &GateAction::CreateDeal).allowed);

    // Any strictly higher tier must also allow it.
    c.set_tier(&admin, &brand, &SubscriptionTier::Enterprise);
    assert!(c.can_perform(&brand, &GateAction::CreateDeal).allowed);
}

#[test]
fn test_unlimited_plan_always_permits() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, escrow) = setup(&env);
    let brand = Address::generate(&env);
    c.set_tier(&admin, &brand, &SubscriptionTier::Enterprise);

    for _ in 0..20 {
        c.record_deal_created(&escrow, &brand);
    }
    c.record_volume(&escrow, &brand, &1_000_000_000);

    assert!(c.can_perform(&brand, &GateAction::CreateDeal).allowed);
    assert!(c.can_perform(&brand, &GateAction::ProcessPayment).allowed);
}

// ============================================================
// Usage Recording
// ============================================================

#[test]
#[should_panic(expected = "unauthorized")]
fn test_record_deal_created_by_non_escrow() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, ..) = setup(&env);
    let stranger = Address::generate(&env);
    c.record_deal_created(&stranger, &Address::generate(&env));
}

#[test]
#[should_panic(expected = "deal limit exceeded")]
fn test_record_deal_created_over_cap() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, _, escrow) = setup(&env);
    let brand = Address::generate(&env);

    for _ in 0..4 {
        c.record_deal_created(&escrow, &brand);
    }
}

#[test]
#[should_panic(expected = "volume limit exceeded")]
fn test_record_volume_over_cap() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, _, escrow) = setup(&env);
    let brand = Address::generate(&env);

    // First record is allowed (counter below cap), second is blocked.
    c.record_volume(&escrow, &brand, &500_000);
    c.record_volume(&escrow, &brand, &1);
}

#[test]
#[should_panic(expected = "invalid amount")]
fn test_record_volume_rejects_non_positive() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, _, escrow) = setup(&env);
    c.record_volume(&escrow, &Address::generate(&env), &0);
}

#[test]
fn test_counters_reset_at_period_boundary() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, _, escrow) = setup(&env);
    let brand = Address::generate(&env);

    for _ in 0..3 {
        c.record_deal_created(&escrow, &brand);
    }
    assert!(!c.can_perform(&brand, &GateAction::CreateDeal).allowed);

    env.ledger()
        .set_timestamp(env.ledger().timestamp() + PERIOD + 1);

    assert!(c.can_perform(&brand, &GateAction::CreateDeal).allowed);
    let usage = c.get_usage(&brand);
    assert_eq!(usage.deals_created, 0);
    assert_eq!(usage.volume_processed, 0);

    // And recording works again after the rollover.
    c.record_deal_created(&escrow, &brand);
    assert_eq!(c.get_usage(&brand).deals_created, 1);
}

#[test]
fn test_rollover_preserves_tier() {
    let env = Env::default();
    env.mock_all_auths();
    let (c, admin, _) = setup(&env);
    let brand = Address::generate(&env);

    c.set_tier(&admin, &brand, &SubscriptionTier::Professional);
    env.ledger()
        .set_timestamp(env.ledger().timestamp() + PERIOD * 2);

    assert_eq!(c.fee_bps_for(&brand), 200);
}

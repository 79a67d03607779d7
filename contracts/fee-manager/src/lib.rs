//! BrandBridge - Fee Manager (Soroban)
//! Subscription tiers, platform fee rates and usage gating for brand accounts on Stellar.

#![no_std]
use soroban_sdk::{contract, contractimpl, contracttype, symbol_short, Address, Env};

// ============================================================
// Data Types
// ============================================================

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubscriptionTier {
    Free,
    Starter,
    Professional,
    Enterprise,
}

#[contracttype]
#[derive(Clone)]
pub struct PlanConfig {
    pub tier: SubscriptionTier,
    pub fee_bps: u32,
    pub max_deals_per_period: i32, // -1 = unlimited
    pub max_volume_per_period: i128, // minor units, -1 = unlimited
    pub api_access: bool,
    pub bulk_payouts: bool,
}

#[contracttype]
#[derive(Clone)]
pub struct AccountUsage {
    pub account: Address,
    pub tier: SubscriptionTier,
    pub period_start: u64,
    pub period_end: u64,
    pub deals_created: u32,
    pub volume_processed: i128,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum GateAction {
    CreateDeal,
    ProcessPayment,
    UseApi,
    BulkPayout,
}

/// XDR cannot represent an option of a user-defined type, so the empty slot
/// is an explicit variant.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MaybeTier {
    None,
    Some(SubscriptionTier),
}

/// Gate verdict. When denied, `required_tier` names the cheapest tier that
/// would permit the action with the same usage counters.
#[contracttype]
#[derive(Clone)]
pub struct GateDecision {
    pub allowed: bool,
    pub required_tier: MaybeTier,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    PendingAdmin,
    EscrowContract,
    Plan(SubscriptionTier),
    Usage(Address),
}

// ============================================================
// Contract
// ============================================================

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

const BASIS_POINTS: i128 = 10_000;
const PERIOD_SECS: u64 = 30 * 24 * 3600;

const TIER_ORDER: [SubscriptionTier; 4] = [
    SubscriptionTier::Free,
    SubscriptionTier::Starter,
    SubscriptionTier::Professional,
    SubscriptionTier::Enterprise,
];

#[contract]
pub struct FeeManagerContract;

#[contractimpl]
impl FeeManagerContract {
    pub fn initialize(env: Env, admin: Address, escrow: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        if env.storage().instance().has(&DataKey::Admin) {
            panic!("already initialized");
        }
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&DataKey::EscrowContract, &escrow);

        Self::_init_plans(&env);
    }

    /// Assign a paid tier to a brand account. Counters for the running period
    /// are preserved so an upgrade cannot reset already-consumed allowances.
    pub fn set_tier(env: Env, admin: Address, account: Address, tier: SubscriptionTier) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);

        let mut usage = Self::_current_usage(&env, &account);
        usage.tier = tier.clone();
        Self::_store_usage(&env, &usage);

        env.events().publish(
            (symbol_short!("plan"), symbol_short!("tier_set")),
            (account, tier),
        );
    }

    /// Pure fee computation on minor units: integer truncation, never rounds
    /// up, so repeated releases cannot accumulate fractional-cent drift.
    pub fn compute_fee(env: Env, tier: SubscriptionTier, amount: i128) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        if amount < 0 {
            panic!("invalid amount");
        }
        let plan = Self::_plan(&env, &tier);
        amount * plan.fee_bps as i128 / BASIS_POINTS
    }

    /// Fee rate for the account's current tier, in basis points.
    /// Accounts without an assigned plan are on the Free tier.
    pub fn fee_bps_for(env: Env, account: Address) -> u32 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let usage = Self::_current_usage(&env, &account);
        Self::_plan(&env, &usage.tier).fee_bps
    }

    /// Read-only gate check. Denials never block reads; mutation of the
    /// counters happens only through the record_* entry points.
    pub fn can_perform(env: Env, account: Address, action: GateAction) -> GateDecision {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let usage = Self::_current_usage(&env, &account);
        let plan = Self::_plan(&env, &usage.tier);

        if Self::_permits(&plan, &usage, &action) {
            return GateDecision {
                allowed: true,
                required_tier: MaybeTier::None,
            };
        }

        // Plans are monotonic, so the first permitting tier in ascending
        // order is the minimal upgrade suggestion.
        for tier in TIER_ORDER.iter() {
            let candidate = Self::_plan(&env, tier);
            if Self::_permits(&candidate, &usage, &action) {
                return GateDecision {
                    allowed: false,
                    required_tier: MaybeTier::Some(tier.clone()),
                };
            }
        }

        GateDecision {
            allowed: false,
            required_tier: MaybeTier::None,
        }
    }

    /// Count a deal creation against the account's period allowance.
    /// Callable only by the escrow contract.
    pub fn record_deal_created(env: Env, caller: Address, account: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_require_escrow(&env, &caller);

        let mut usage = Self::_current_usage(&env, &account);
        let plan = Self::_plan(&env, &usage.tier);
        if !Self::_permits(&plan, &usage, &GateAction::CreateDeal) {
            panic!("deal limit exceeded");
        }

        usage.deals_created += 1;
        Self::_store_usage(&env, &usage);

        env.events().publish(
            (symbol_short!("usage"), symbol_short!("deal")),
            (account, usage.deals_created),
        );
    }

    /// Count processed transaction volume against the period allowance.
    /// Callable only by the escrow contract.
    pub fn record_volume(env: Env, caller: Address, account: Address, amount: i128) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_require_escrow(&env, &caller);
        if amount <= 0 {
            panic!("invalid amount");
        }

        let mut usage = Self::_current_usage(&env, &account);
        let plan = Self::_plan(&env, &usage.tier);
        if !Self::_permits(&plan, &usage, &GateAction::ProcessPayment) {
            panic!("volume limit exceeded");
        }

        usage.volume_processed += amount;
        Self::_store_usage(&env, &usage);

        env.events().publish(
            (symbol_short!("usage"), symbol_short!("volume")),
            (account, usage.volume_processed),
        );
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn get_plan(env: Env, tier: SubscriptionTier) -> Option<PlanConfig> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage().persistent().get(&DataKey::Plan(tier))
    }

    pub fn get_usage(env: Env, account: Address) -> AccountUsage {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_current_usage(&env, &account)
    }

    pub fn propose_admin(env: Env, current_admin: Address, new_admin: Address) {
        bridge_common_admin::propose_admin(
            &env,
            &DataKey::Admin,
            &DataKey::PendingAdmin,
            current_admin,
            new_admin,
        );
    }

    pub fn accept_admin(env: Env, new_admin: Address) {
        bridge_common_admin::accept_admin(&env, &DataKey::Admin, &DataKey::PendingAdmin, new_admin);
    }

    // ============================================================
    // Internal Helpers
    // ============================================================

    fn _init_plans(env: &Env) {
        let plans = [
            (SubscriptionTier::Free, 350u32, 3i32, 500_000i128, false, false),
            (SubscriptionTier::Starter, 250u32, 15i32, 5_000_000i128, false, false),
            (SubscriptionTier::Professional, 200u32, 75i32, 50_000_000i128, true, false),
            (SubscriptionTier::Enterprise, 150u32, -1i32, -1i128, true, true),
        ];

        for (tier, fee_bps, max_deals, max_volume, api, bulk) in plans {
            let plan = PlanConfig {
                tier: tier.clone(),
                fee_bps,
                max_deals_per_period: max_deals,
                max_volume_per_period: max_volume,
                api_access: api,
                bulk_payouts: bulk,
            };
            let _ttl_key = DataKey::Plan(tier);
            env.storage().persistent().set(&_ttl_key, &plan);
            env.storage().persistent().extend_ttl(
                &_ttl_key,
                PERSISTENT_LIFETIME_THRESHOLD,
                PERSISTENT_BUMP_AMOUNT,
            );
        }
    }

    fn _plan(env: &Env, tier: &SubscriptionTier) -> PlanConfig {
        env.storage()
            .persistent()
            .get(&DataKey::Plan(tier.clone()))
            .expect("plan not found")
    }

    /// Load the account's usage record with lazy period rollover applied.
    /// Unknown accounts start a fresh Free-tier period.
    fn _current_usage(env: &Env, account: &Address) -> AccountUsage {
        let now = env.ledger().timestamp();
        let mut usage: AccountUsage = env
            .storage()
            .persistent()
            .get(&DataKey::Usage(account.clone()))
            .unwrap_or(AccountUsage {
                account: account.clone(),
                tier: SubscriptionTier::Free,
                period_start: now,
                period_end: now + PERIOD_SECS,
                deals_created: 0,
                volume_processed: 0,
            });

        if now >= usage.period_end {
            usage.period_start = now;
            usage.period_end = now + PERIOD_SECS;
            usage.deals_created = 0;
            usage.volume_processed = 0;
        }
        usage
    }

    fn _store_usage(env: &Env, usage: &AccountUsage) {
        let _ttl_key = DataKey::Usage(usage.account.clone());
        env.storage().persistent().set(&_ttl_key, usage);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _permits(plan: &PlanConfig, usage: &AccountUsage, action: &GateAction) -> bool {
        match action {
            GateAction::CreateDeal => {
                plan.max_deals_per_period < 0
                    || usage.deals_created < plan.max_deals_per_period as u32
            }
            GateAction::ProcessPayment => {
                plan.max_volume_per_period < 0
                    || usage.volume_processed < plan.max_volume_per_period
            }
            GateAction::UseApi => plan.api_access,
            GateAction::BulkPayout => plan.bulk_payouts,
        }
    }

    fn _require_escrow(env: &Env, caller: &Address) {
        caller.require_auth();
        let escrow: Address = env
            .storage()
            .instance()
            .get(&DataKey::EscrowContract)
            .expect("not initialized");
        if *caller != escrow {
            panic!("unauthorized");
        }
    }
}

mod test;

//! BrandBridge - Payout Ledger (Soroban)
//! Append-only record of escrow fund releases with a per-milestone idempotency guard.

#![no_std]
use soroban_sdk::{contract, contractimpl, contracttype, symbol_short, Address, Env, Vec};

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PayoutStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Canceled,
}

#[contracttype]
#[derive(Clone)]
pub struct Payout {
    pub payout_id: u64,
    pub deal_id: u64,
    pub milestone_index: Option<u32>,
    pub recipient: Address,
    pub amount: i128,
    pub fee_amount: i128,
    pub status: PayoutStatus,
    pub created_at: u64,
    pub processed_at: Option<u64>,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    PendingAdmin,
    EscrowContract,
    PayoutCounter,
    Payout(u64),
    MilestoneRef(u64, u32),
    DealPayouts(u64),
}

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

#[contract]
pub struct PayoutLedgerContract;

#[contractimpl]
impl PayoutLedgerContract {
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
        env.storage().instance().set(&DataKey::PayoutCounter, &0u64);
    }

    /// Record a completed escrow release. Callable only by the escrow
    /// contract, in the same transaction as the token transfer, so a recorded
    /// payout and the fund movement commit or fail together.
    ///
    /// `(deal_id, milestone_index)` is the idempotency key: a milestone can be
    /// booked at most once, no matter how often release is retried.
    pub fn record_release(
        env: Env,
        caller: Address,
        deal_id: u64,
        milestone_index: Option<u32>,
        recipient: Address,
        amount: i128,
        fee_amount: i128,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_require_escrow(&env, &caller);

        if amount <= 0 || fee_amount < 0 {
            panic!("invalid amount");
        }

        if let Some(index) = milestone_index {
            let ref_key = DataKey::MilestoneRef(deal_id, index);
            if env.storage().persistent().has(&ref_key) {
                panic!("payout already recorded");
            }
        }

        let now = env.ledger().timestamp();
        let payout_id = Self::_next_id(&env);
        let payout = Payout {
            payout_id,
            deal_id,
            milestone_index,
            recipient: recipient.clone(),
            amount,
            fee_amount,
            status: PayoutStatus::Completed,
            created_at: now,
            processed_at: Some(now),
        };
        Self::_store_payout(&env, &payout);

        if let Some(index) = milestone_index {
            let ref_key = DataKey::MilestoneRef(deal_id, index);
            env.storage().persistent().set(&ref_key, &payout_id);
            env.storage().persistent().extend_ttl(
                &ref_key,
                PERSISTENT_LIFETIME_THRESHOLD,
                PERSISTENT_BUMP_AMOUNT,
            );
        }
        Self::_index_for_deal(&env, deal_id, payout_id);

        env.events().publish(
            (symbol_short!("payout"), symbol_short!("released")),
            (payout_id, deal_id, recipient, amount),
        );

        payout_id
    }

    /// Open a manual payout instruction (e.g. an operator-driven bulk payout)
    /// that settles outside the escrow flow. Starts Pending and is advanced
    /// through `reconcile` as the external transfer progresses.
    pub fn open_payout(
        env: Env,
        admin: Address,
        deal_id: u64,
        recipient: Address,
        amount: i128,
        fee_amount: i128,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);

        if amount <= 0 || fee_amount < 0 {
            panic!("invalid amount");
        }

        let payout_id = Self::_next_id(&env);
        let payout = Payout {
            payout_id,
            deal_id,
            milestone_index: None,
            recipient,
            amount,
            fee_amount,
            status: PayoutStatus::Pending,
            created_at: env.ledger().timestamp(),
            processed_at: None,
        };
        Self::_store_payout(&env, &payout);
        Self::_index_for_deal(&env, deal_id, payout_id);

        env.events().publish(
            (symbol_short!("payout"), symbol_short!("opened")),
            (payout_id, deal_id),
        );

        payout_id
    }

    /// Reconcile a non-final payout against the external processor's status.
    /// Completed records are append-only and refuse any further change.
    pub fn reconcile(env: Env, admin: Address, payout_id: u64, status: PayoutStatus) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);

        let mut payout: Payout = env
            .storage()
            .persistent()
            .get(&DataKey::Payout(payout_id))
            .expect("payout not found");

        let legal = match (&payout.status, &status) {
            (PayoutStatus::Pending, PayoutStatus::Processing)
            | (PayoutStatus::Pending, PayoutStatus::Canceled)
            | (PayoutStatus::Processing, PayoutStatus::Completed)
            | (PayoutStatus::Processing, PayoutStatus::Failed) => true,
            _ => false,
        };
        if !legal {
            panic!("illegal payout status change");
        }

        if status == PayoutStatus::Completed {
            payout.processed_at = Some(env.ledger().timestamp());
        }
        payout.status = status.clone();
        Self::_store_payout(&env, &payout);

        env.events().publish(
            (symbol_short!("payout"), symbol_short!("reconcile")),
            (payout_id, status),
        );
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn get_payout(env: Env, payout_id: u64) -> Option<Payout> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage().persistent().get(&DataKey::Payout(payout_id))
    }

    pub fn get_payout_count(env: Env) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .instance()
            .get(&DataKey::PayoutCounter)
            .unwrap_or(0)
    }

    pub fn list_deal_payouts(env: Env, deal_id: u64) -> Vec<u64> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::DealPayouts(deal_id))
            .unwrap_or(Vec::new(&env))
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

    fn _next_id(env: &Env) -> u64 {
        let counter: u64 = env
            .storage()
            .instance()
            .get(&DataKey::PayoutCounter)
            .unwrap_or(0);
        let id = counter + 1;
        env.storage().instance().set(&DataKey::PayoutCounter, &id);
        id
    }

    fn _store_payout(env: &Env, payout: &Payout) {
        let _ttl_key = DataKey::Payout(payout.payout_id);
        env.storage().persistent().set(&_ttl_key, payout);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _index_for_deal(env: &Env, deal_id: u64, payout_id: u64) {
        let key = DataKey::DealPayouts(deal_id);
        let mut ids: Vec<u64> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(Vec::new(env));
        ids.push_back(payout_id);
        env.storage().persistent().set(&key, &ids);
        env.storage().persistent().extend_ttl(
            &key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
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

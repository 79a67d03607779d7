//! BrandBridge - Deal Escrow (Soroban)
//! Milestone-based escrow between brands and creators on Stellar: a brand funds
//! a deal, the contract holds the money, and each approved milestone releases
//! its amount to the creator net of the platform fee.

#![no_std]
use soroban_sdk::{
    contract, contractimpl, contracttype, symbol_short, token, Address, Env, IntoVal, String,
    Symbol, Val, Vec,
};

// ============================================================
// Data Types
// ============================================================

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DealStatus {
    Draft,
    Funded,
    Released,
    Disputed,
    Refunded,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MilestoneStatus {
    Pending,
    Submitted,
    Approved,
    Released,
    Disputed,
}

/// Work handed in by the creator: a description plus exactly one payload
/// (uploaded file hash, external URL, or inline text).
#[contracttype]
#[derive(Clone)]
pub struct Deliverable {
    pub description: String,
    pub file_hash: String,
    pub external_url: String,
    pub text_body: String,
}

/// XDR cannot represent an option of a user-defined type, so the empty slot
/// is an explicit variant.
#[contracttype]
#[derive(Clone)]
pub enum MaybeDeliverable {
    None,
    Some(Deliverable),
}

#[contracttype]
#[derive(Clone)]
pub struct Milestone {
    pub title: String,
    pub amount: i128,
    pub status: MilestoneStatus,
    pub due_date: Option<u64>,
    pub deliverable: MaybeDeliverable,
    pub feedback: String,
    pub revision_rounds: u32,
    pub submitted_at: Option<u64>,
    pub approved_at: Option<u64>,
    pub released_at: Option<u64>,
}

#[contracttype]
#[derive(Clone)]
pub struct MilestoneSpec {
    pub title: String,
    pub amount: i128,
    pub due_date: Option<u64>,
}

#[contracttype]
#[derive(Clone)]
pub struct Deal {
    pub deal_id: u64,
    pub brand: Address,
    pub creator: Address,
    pub amount_total: i128,
    pub released_total: i128,
    pub fee_bps: u32,
    pub status: DealStatus,
    pub milestones: Vec<Milestone>,
    pub response_window: u64,
    pub created_at: u64,
    pub accepted_at: Option<u64>,
    pub funded_at: Option<u64>,
    pub completed_at: Option<u64>,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    PendingAdmin,
    TokenAddress,
    TreasuryAddress,
    FeeManager,
    PayoutLedger,
    DisputeDesk,
    RevisionLimit,
    DefaultWindow,
    DealCounter,
    Deal(u64),
    BrandDeals(Address),
    CreatorDeals(Address),
}

// ============================================================
// Contract
// ============================================================

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

const BASIS_POINTS: i128 = 10_000;
const DEFAULT_RESPONSE_WINDOW: u64 = 5 * 24 * 3600; // brand response window before auto-release
const DEFAULT_REVISION_LIMIT: u32 = 3;

#[contract]
pub struct DealEscrowContract;

#[contractimpl]
impl DealEscrowContract {
    pub fn initialize(
        env: Env,
        admin: Address,
        token: Address,
        treasury: Address,
        fee_manager: Address,
        payout_ledger: Address,
    ) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        if env.storage().instance().has(&DataKey::Admin) {
            panic!("already initialized");
        }
        admin.require_auth();
        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::TokenAddress, &token);
        env.storage()
            .instance()
            .set(&DataKey::TreasuryAddress, &treasury);
        env.storage()
            .instance()
            .set(&DataKey::FeeManager, &fee_manager);
        env.storage()
            .instance()
            .set(&DataKey::PayoutLedger, &payout_ledger);
        env.storage()
            .instance()
            .set(&DataKey::RevisionLimit, &DEFAULT_REVISION_LIMIT);
        env.storage()
            .instance()
            .set(&DataKey::DefaultWindow, &DEFAULT_RESPONSE_WINDOW);
        env.storage().instance().set(&DataKey::DealCounter, &0u64);
    }

    /// Register the dispute desk contract allowed to divert and settle
    /// contested milestones. Set after deployment because the two contracts
    /// reference each other.
    pub fn set_dispute_desk(env: Env, admin: Address, dispute_desk: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);
        env.storage()
            .instance()
            .set(&DataKey::DisputeDesk, &dispute_desk);
    }

    pub fn set_revision_limit(env: Env, admin: Address, limit: u32) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);
        if limit == 0 {
            panic!("invalid limit");
        }
        env.storage().instance().set(&DataKey::RevisionLimit, &limit);
    }

    pub fn set_default_window(env: Env, admin: Address, window_secs: u64) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);
        if window_secs == 0 {
            panic!("invalid window");
        }
        env.storage()
            .instance()
            .set(&DataKey::DefaultWindow, &window_secs);
    }

    // ============================================================
    // Deal Lifecycle
    // ============================================================

    /// Create a deal in Draft. Counts against the brand's plan allowance and
    /// snapshots the brand's fee rate for the life of the deal. The deal total
    /// is the sum of the milestone amounts; milestone amounts never change
    /// after creation.
    pub fn create_deal(
        env: Env,
        brand: Address,
        creator: Address,
        specs: Vec<MilestoneSpec>,
        response_window: u64,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        brand.require_auth();

        if brand == creator {
            panic!("brand and creator must differ");
        }
        if specs.is_empty() {
            panic!("at least one milestone required");
        }

        let mut amount_total: i128 = 0;
        let mut milestones: Vec<Milestone> = Vec::new(&env);
        for spec in specs.iter() {
            if spec.amount <= 0 {
                panic!("invalid amount");
            }
            amount_total += spec.amount;
            milestones.push_back(Milestone {
                title: spec.title.clone(),
                amount: spec.amount,
                status: MilestoneStatus::Pending,
                due_date: spec.due_date,
                deliverable: MaybeDeliverable::None,
                feedback: String::from_str(&env, ""),
                revision_rounds: 0,
                submitted_at: None,
                approved_at: None,
                released_at: None,
            });
        }

        // Gate through the fee manager: traps when the brand is over its
        // plan's deal allowance for the period.
        Self::_record_deal_created(&env, &brand);
        let fee_bps = Self::_fee_bps_for(&env, &brand);

        let window = if response_window == 0 {
            env.storage()
                .instance()
                .get(&DataKey::DefaultWindow)
                .unwrap_or(DEFAULT_RESPONSE_WINDOW)
        } else {
            response_window
        };

        let counter: u64 = env
            .storage()
            .instance()
            .get(&DataKey::DealCounter)
            .unwrap_or(0);
        let deal_id = counter + 1;

        let deal = Deal {
            deal_id,
            brand: brand.clone(),
            creator: creator.clone(),
            amount_total,
            released_total: 0,
            fee_bps,
            status: DealStatus::Draft,
            milestones,
            response_window: window,
            created_at: env.ledger().timestamp(),
            accepted_at: None,
            funded_at: None,
            completed_at: None,
        };

        Self::_store_deal(&env, &deal);
        env.storage().instance().set(&DataKey::DealCounter, &deal_id);
        Self::_index_deal(&env, DataKey::BrandDeals(brand.clone()), deal_id);
        Self::_index_deal(&env, DataKey::CreatorDeals(creator), deal_id);

        env.events().publish(
            (symbol_short!("deal"), symbol_short!("created")),
            (deal_id, brand, amount_total),
        );

        deal_id
    }

    /// Creator consent. Funding is blocked until the creator has accepted.
    pub fn accept_deal(env: Env, creator: Address, deal_id: u64) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        creator.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if creator != deal.creator {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Draft {
            panic!("deal not in draft");
        }
        if deal.accepted_at.is_some() {
            panic!("already accepted");
        }

        deal.accepted_at = Some(env.ledger().timestamp());
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("deal"), symbol_short!("accepted")),
            deal_id,
        );
    }

    /// Move the full deal amount from the brand into escrow. User-initiated;
    /// a failed transfer traps and leaves the deal in Draft, never retried
    /// here. Counts the total against the brand's volume allowance.
    pub fn fund_deal(env: Env, brand: Address, deal_id: u64) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        brand.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if brand != deal.brand {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Draft {
            panic!("deal not in draft");
        }
        if deal.accepted_at.is_none() {
            panic!("deal not accepted");
        }

        let token_addr: Address = env
            .storage()
            .instance()
            .get(&DataKey::TokenAddress)
            .unwrap();
        token::Client::new(&env, &token_addr).transfer(
            &brand,
            &env.current_contract_address(),
            &deal.amount_total,
        );

        Self::_record_volume(&env, &brand, deal.amount_total);

        deal.status = DealStatus::Funded;
        deal.funded_at = Some(env.ledger().timestamp());
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("deal"), symbol_short!("funded")),
            (deal_id, deal.amount_total),
        );
    }

    /// Cancel a deal that has seen no milestone work. Held funds go back to
    /// the brand and the deal is archived as Refunded; records are never
    /// deleted.
    pub fn cancel_deal(env: Env, party: Address, deal_id: u64, reason: String) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        party.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if party != deal.brand && party != deal.creator {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Draft && deal.status != DealStatus::Funded {
            panic!("deal not cancelable");
        }
        for milestone in deal.milestones.iter() {
            if milestone.status != MilestoneStatus::Pending {
                panic!("milestone work in progress");
            }
        }

        if deal.status == DealStatus::Funded {
            let token_addr: Address = env
                .storage()
                .instance()
                .get(&DataKey::TokenAddress)
                .unwrap();
            token::Client::new(&env, &token_addr).transfer(
                &env.current_contract_address(),
                &deal.brand,
                &deal.amount_total,
            );
        }

        deal.status = DealStatus::Refunded;
        deal.completed_at = Some(env.ledger().timestamp());
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("deal"), symbol_short!("canceled")),
            (deal_id, party, reason),
        );
    }

    // ============================================================
    // Milestone Lifecycle
    // ============================================================

    /// Creator hands in work for a milestone. Requires the deal to be funded
    /// and a well-formed deliverable.
    pub fn submit_milestone(
        env: Env,
        creator: Address,
        deal_id: u64,
        index: u32,
        deliverable: Deliverable,
    ) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        creator.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if creator != deal.creator {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Funded {
            panic!("deal not funded");
        }

        let mut milestone = Self::_milestone(&deal, index);
        if milestone.status != MilestoneStatus::Pending {
            panic!("milestone not pending");
        }
        Self::_validate_deliverable(&deliverable);

        milestone.deliverable = MaybeDeliverable::Some(deliverable);
        milestone.status = MilestoneStatus::Submitted;
        milestone.submitted_at = Some(env.ledger().timestamp());
        deal.milestones.set(index, milestone);
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("submit")),
            (deal_id, index),
        );
    }

    /// Brand approval. Approval and release happen in one transaction: fee is
    /// computed from the deal's snapshotted rate, the net amount moves to the
    /// creator, the fee to the treasury, and the payout is booked in the
    /// ledger. A milestone can be released exactly once.
    pub fn approve_milestone(env: Env, brand: Address, deal_id: u64, index: u32, feedback: String) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        brand.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if brand != deal.brand {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Funded {
            panic!("deal not funded");
        }

        let mut milestone = Self::_milestone(&deal, index);
        Self::_require_submitted(&milestone);

        milestone.status = MilestoneStatus::Approved;
        milestone.approved_at = Some(env.ledger().timestamp());
        milestone.feedback = feedback;
        deal.milestones.set(index, milestone);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("approved")),
            (deal_id, index),
        );

        Self::_release_milestone(&env, &mut deal, index);
        Self::_store_deal(&env, &deal);
    }

    /// Brand sends the work back for another round. The deliverable is
    /// cleared and the creator resubmits; past the revision cap the parties
    /// must go through the dispute desk instead.
    pub fn request_revision(env: Env, brand: Address, deal_id: u64, index: u32, feedback: String) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        brand.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if brand != deal.brand {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Funded {
            panic!("deal not funded");
        }

        let mut milestone = Self::_milestone(&deal, index);
        Self::_require_submitted(&milestone);
        Self::_consume_revision_round(&env, &mut milestone);

        milestone.feedback = feedback;
        milestone.deliverable = MaybeDeliverable::None;
        milestone.submitted_at = None;
        milestone.status = MilestoneStatus::Pending;
        deal.milestones.set(index, milestone);
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("revision")),
            (deal_id, index),
        );
    }

    /// Brand rejects the submission outright. The milestone returns to
    /// Pending with the rejection reason on record; a party that considers
    /// the rejection final escalates through the dispute desk.
    pub fn reject_milestone(env: Env, brand: Address, deal_id: u64, index: u32, reason: String) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        brand.require_auth();

        let mut deal = Self::_load_deal(&env, deal_id);
        if brand != deal.brand {
            panic!("unauthorized");
        }
        if deal.status != DealStatus::Funded {
            panic!("deal not funded");
        }

        let mut milestone = Self::_milestone(&deal, index);
        Self::_require_submitted(&milestone);
        Self::_consume_revision_round(&env, &mut milestone);

        milestone.feedback = reason;
        milestone.deliverable = MaybeDeliverable::None;
        milestone.submitted_at = None;
        milestone.status = MilestoneStatus::Pending;
        deal.milestones.set(index, milestone);
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("rejected")),
            (deal_id, index),
        );
    }

    /// Auto-release tick: anyone may call this for a submitted milestone the
    /// brand has ignored past the response window. The state check and the
    /// release commit in one transaction, so a tick can never double-apply
    /// against a concurrent brand decision.
    pub fn force_release(env: Env, deal_id: u64, index: u32) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);

        let mut deal = Self::_load_deal(&env, deal_id);
        if deal.status != DealStatus::Funded {
            panic!("deal not funded");
        }

        let mut milestone = Self::_milestone(&deal, index);
        Self::_require_submitted(&milestone);

        let submitted_at = milestone.submitted_at.expect("milestone not submitted");
        if env.ledger().timestamp() < submitted_at + deal.response_window {
            panic!("response window not elapsed");
        }

        milestone.status = MilestoneStatus::Approved;
        milestone.approved_at = Some(env.ledger().timestamp());
        deal.milestones.set(index, milestone);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("autorel")),
            (deal_id, index),
        );

        Self::_release_milestone(&env, &mut deal, index);
        Self::_store_deal(&env, &deal);
    }

    // ============================================================
    // Dispute Hooks (dispute desk only)
    // ============================================================

    /// Divert a contested milestone. Only Submitted or Approved work can be
    /// disputed; released funds are beyond recall on-chain.
    pub fn mark_disputed(env: Env, caller: Address, deal_id: u64, index: u32) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_require_dispute_desk(&env, &caller);

        let mut deal = Self::_load_deal(&env, deal_id);
        let mut milestone = Self::_milestone(&deal, index);
        if milestone.status != MilestoneStatus::Submitted
            && milestone.status != MilestoneStatus::Approved
        {
            panic!("milestone not disputable");
        }

        milestone.status = MilestoneStatus::Disputed;
        deal.milestones.set(index, milestone);
        deal.status = DealStatus::Disputed;
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("deal"), symbol_short!("disputed")),
            (deal_id, index),
        );
    }

    /// Apply an arbitration outcome to a disputed milestone. Either the
    /// milestone reopens for rework, or its full amount is allocated between
    /// a creator release (net of fee) and a brand refund.
    pub fn settle_dispute(
        env: Env,
        caller: Address,
        deal_id: u64,
        index: u32,
        release_amount: i128,
        refund_amount: i128,
        reopen: bool,
    ) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        Self::_require_dispute_desk(&env, &caller);

        let mut deal = Self::_load_deal(&env, deal_id);
        let mut milestone = Self::_milestone(&deal, index);
        if milestone.status != MilestoneStatus::Disputed {
            panic!("milestone not disputed");
        }

        if reopen {
            if release_amount != 0 || refund_amount != 0 {
                panic!("invalid settlement");
            }
            milestone.deliverable = MaybeDeliverable::None;
            milestone.submitted_at = None;
            milestone.status = MilestoneStatus::Pending;
            deal.milestones.set(index, milestone);
            deal.status = DealStatus::Funded;
            Self::_store_deal(&env, &deal);

            env.events().publish(
                (symbol_short!("mstone"), symbol_short!("settled")),
                (deal_id, index),
            );
            return;
        }

        if release_amount < 0
            || refund_amount < 0
            || release_amount + refund_amount != milestone.amount
        {
            panic!("invalid settlement");
        }

        let token_addr: Address = env
            .storage()
            .instance()
            .get(&DataKey::TokenAddress)
            .unwrap();
        let token_client = token::Client::new(&env, &token_addr);

        if release_amount > 0 {
            let fee = release_amount * deal.fee_bps as i128 / BASIS_POINTS;
            let net = release_amount - fee;
            token_client.transfer(&env.current_contract_address(), &deal.creator, &net);
            if fee > 0 {
                let treasury: Address = env
                    .storage()
                    .instance()
                    .get(&DataKey::TreasuryAddress)
                    .unwrap();
                token_client.transfer(&env.current_contract_address(), &treasury, &fee);
            }
            Self::_record_payout(&env, deal_id, index, &deal.creator, net, fee);
            deal.released_total += release_amount;
        }
        if refund_amount > 0 {
            token_client.transfer(&env.current_contract_address(), &deal.brand, &refund_amount);
        }

        milestone.status = MilestoneStatus::Released;
        milestone.released_at = Some(env.ledger().timestamp());
        deal.milestones.set(index, milestone);

        if Self::_all_released(&deal) {
            deal.completed_at = Some(env.ledger().timestamp());
            deal.status = if deal.released_total > 0 {
                DealStatus::Released
            } else {
                DealStatus::Refunded
            };
        } else {
            deal.status = DealStatus::Funded;
        }
        Self::_store_deal(&env, &deal);

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("settled")),
            (deal_id, index, release_amount, refund_amount),
        );
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn get_deal(env: Env, deal_id: u64) -> Option<Deal> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage().persistent().get(&DataKey::Deal(deal_id))
    }

    pub fn get_milestone(env: Env, deal_id: u64, index: u32) -> Option<Milestone> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let deal: Option<Deal> = env.storage().persistent().get(&DataKey::Deal(deal_id));
        deal.and_then(|d| d.milestones.get(index))
    }

    pub fn get_deal_count(env: Env) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .instance()
            .get(&DataKey::DealCounter)
            .unwrap_or(0)
    }

    pub fn is_participant(env: Env, deal_id: u64, who: Address) -> bool {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        match env
            .storage()
            .persistent()
            .get::<DataKey, Deal>(&DataKey::Deal(deal_id))
        {
            Some(deal) => who == deal.brand || who == deal.creator,
            None => false,
        }
    }

    /// Whether a released milestone is still inside its contestation window
    /// (the deal's response window, counted from release). The dispute desk
    /// consults this before accepting a review-only contest of a release.
    pub fn is_contestable(env: Env, deal_id: u64, index: u32) -> bool {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let deal: Deal = match env.storage().persistent().get(&DataKey::Deal(deal_id)) {
            Some(deal) => deal,
            None => return false,
        };
        let milestone = match deal.milestones.get(index) {
            Some(milestone) => milestone,
            None => return false,
        };
        match (milestone.status, milestone.released_at) {
            (MilestoneStatus::Released, Some(released_at)) => {
                env.ledger().timestamp() <= released_at + deal.response_window
            }
            _ => false,
        }
    }

    pub fn milestone_amount(env: Env, deal_id: u64, index: u32) -> i128 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        let deal = Self::_load_deal(&env, deal_id);
        Self::_milestone(&deal, index).amount
    }

    pub fn list_brand_deals(env: Env, brand: Address) -> Vec<u64> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::BrandDeals(brand))
            .unwrap_or(Vec::new(&env))
    }

    pub fn list_creator_deals(env: Env, creator: Address) -> Vec<u64> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::CreatorDeals(creator))
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

    fn _load_deal(env: &Env, deal_id: u64) -> Deal {
        env.storage()
            .persistent()
            .get(&DataKey::Deal(deal_id))
            .expect("deal not found")
    }

    fn _store_deal(env: &Env, deal: &Deal) {
        let _ttl_key = DataKey::Deal(deal.deal_id);
        env.storage().persistent().set(&_ttl_key, deal);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _index_deal(env: &Env, key: DataKey, deal_id: u64) {
        let mut ids: Vec<u64> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(Vec::new(env));
        ids.push_back(deal_id);
        env.storage().persistent().set(&key, &ids);
        env.storage().persistent().extend_ttl(
            &key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _milestone(deal: &Deal, index: u32) -> Milestone {
        deal.milestones
            .get(index)
            .unwrap_or_else(|| panic!("milestone not found"))
    }

    /// Shared guard for the three brand verdicts and force_release. Names the
    /// blocking state so a double release is distinguishable from plain
    /// out-of-order calls.
    fn _require_submitted(milestone: &Milestone) {
        if milestone.status == MilestoneStatus::Released {
            panic!("already released");
        }
        if milestone.status != MilestoneStatus::Submitted {
            panic!("milestone not submitted");
        }
    }

    fn _consume_revision_round(env: &Env, milestone: &mut Milestone) {
        let limit: u32 = env
            .storage()
            .instance()
            .get(&DataKey::RevisionLimit)
            .unwrap_or(DEFAULT_REVISION_LIMIT);
        if milestone.revision_rounds >= limit {
            panic!("revision limit reached");
        }
        milestone.revision_rounds += 1;
    }

    fn _validate_deliverable(deliverable: &Deliverable) {
        if deliverable.description.len() == 0 {
            panic!("deliverable description required");
        }
        let mut payloads = 0u32;
        if deliverable.file_hash.len() > 0 {
            payloads += 1;
        }
        if deliverable.external_url.len() > 0 {
            payloads += 1;
        }
        if deliverable.text_body.len() > 0 {
            payloads += 1;
        }
        if payloads == 0 {
            panic!("deliverable payload required");
        }
        if payloads > 1 {
            panic!("multiple deliverable payloads");
        }
    }

    /// Move the milestone amount out of escrow: net to the creator, fee to
    /// the treasury, payout booked in the ledger. Completes the deal when
    /// this was the last open milestone. Caller persists the deal.
    fn _release_milestone(env: &Env, deal: &mut Deal, index: u32) {
        let mut milestone = Self::_milestone(deal, index);

        let fee = milestone.amount * deal.fee_bps as i128 / BASIS_POINTS;
        let net = milestone.amount - fee;

        let token_addr: Address = env
            .storage()
            .instance()
            .get(&DataKey::TokenAddress)
            .unwrap();
        let token_client = token::Client::new(env, &token_addr);
        token_client.transfer(&env.current_contract_address(), &deal.creator, &net);
        if fee > 0 {
            let treasury: Address = env
                .storage()
                .instance()
                .get(&DataKey::TreasuryAddress)
                .unwrap();
            token_client.transfer(&env.current_contract_address(), &treasury, &fee);
        }

        let payout_id = Self::_record_payout(env, deal.deal_id, index, &deal.creator, net, fee);

        milestone.status = MilestoneStatus::Released;
        milestone.released_at = Some(env.ledger().timestamp());
        let released = milestone.amount;
        deal.milestones.set(index, milestone);
        deal.released_total += released;

        env.events().publish(
            (symbol_short!("mstone"), symbol_short!("released")),
            (deal.deal_id, index, net, payout_id),
        );

        if Self::_all_released(deal) {
            deal.status = DealStatus::Released;
            deal.completed_at = Some(env.ledger().timestamp());
            env.events().publish(
                (symbol_short!("deal"), symbol_short!("released")),
                deal.deal_id,
            );
        }
    }

    fn _all_released(deal: &Deal) -> bool {
        for milestone in deal.milestones.iter() {
            if milestone.status != MilestoneStatus::Released {
                return false;
            }
        }
        true
    }

    fn _record_deal_created(env: &Env, brand: &Address) {
        let fee_manager: Address = env
            .storage()
            .instance()
            .get(&DataKey::FeeManager)
            .unwrap();
        env.invoke_contract::<()>(
            &fee_manager,
            &Symbol::new(env, "record_deal_created"),
            Vec::<Val>::from_array(
                env,
                [
                    env.current_contract_address().into_val(env),
                    brand.into_val(env),
                ],
            ),
        );
    }

    fn _record_volume(env: &Env, brand: &Address, amount: i128) {
        let fee_manager: Address = env
            .storage()
            .instance()
            .get(&DataKey::FeeManager)
            .unwrap();
        env.invoke_contract::<()>(
            &fee_manager,
            &Symbol::new(env, "record_volume"),
            Vec::<Val>::from_array(
                env,
                [
                    env.current_contract_address().into_val(env),
                    brand.into_val(env),
                    amount.into_val(env),
                ],
            ),
        );
    }

    fn _fee_bps_for(env: &Env, brand: &Address) -> u32 {
        let fee_manager: Address = env
            .storage()
            .instance()
            .get(&DataKey::FeeManager)
            .unwrap();
        env.invoke_contract::<u32>(
            &fee_manager,
            &Symbol::new(env, "fee_bps_for"),
            Vec::<Val>::from_array(env, [brand.into_val(env)]),
        )
    }

    fn _record_payout(
        env: &Env,
        deal_id: u64,
        index: u32,
        recipient: &Address,
        amount: i128,
        fee: i128,
    ) -> u64 {
        let payout_ledger: Address = env
            .storage()
            .instance()
            .get(&DataKey::PayoutLedger)
            .unwrap();
        env.invoke_contract::<u64>(
            &payout_ledger,
            &Symbol::new(env, "record_release"),
            Vec::<Val>::from_array(
                env,
                [
                    env.current_contract_address().into_val(env),
                    deal_id.into_val(env),
                    Some(index).into_val(env),
                    recipient.into_val(env),
                    amount.into_val(env),
                    fee.into_val(env),
                ],
            ),
        )
    }

    fn _require_dispute_desk(env: &Env, caller: &Address) {
        caller.require_auth();
        let desk: Address = env
            .storage()
            .instance()
            .get(&DataKey::DisputeDesk)
            .expect("dispute desk not set");
        if *caller != desk {
            panic!("unauthorized");
        }
    }
}

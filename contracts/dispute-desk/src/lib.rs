//! BrandBridge - Dispute Desk (Soroban)
//! Filing and arbitration of contested milestones. The desk owns the dispute
//! records and the arbitrator pool; fund movement stays in the escrow, which
//! only this contract may instruct.

#![no_std]
use soroban_sdk::{
    contract, contractimpl, contracttype, symbol_short, Address, Env, IntoVal, String, Symbol,
    Val, Vec,
};

// ============================================================
// Data Types
// ============================================================

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisputeStatus {
    Open,
    UnderReview,
    Resolved,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisputeOutcome {
    Pending,
    FullRelease,
    PartialRelease,
    ReturnToPending,
    Refund,
}

/// Settlement disputes divert escrowed funds; review disputes contest an
/// already-released milestone and carry an advisory verdict only.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DisputeKind {
    Settlement,
    Review,
}

#[contracttype]
#[derive(Clone)]
pub struct Dispute {
    pub dispute_id: u64,
    pub deal_id: u64,
    pub milestone_index: u32,
    pub raised_by: Address,
    pub reason: String,
    pub evidence_hash: String,
    pub kind: DisputeKind,
    pub status: DisputeStatus,
    pub outcome: DisputeOutcome,
    pub release_amount: i128,
    pub resolution_notes: String,
    pub filed_at: u64,
    pub resolved_at: Option<u64>,
    pub arbitrator: Option<Address>,
}

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    Admin,
    PendingAdmin,
    EscrowContract,
    DisputeCounter,
    Dispute(u64),
    MilestoneDispute(u64, u32),
    DealDisputes(u64),
    Arbitrator(Address),
}

const INSTANCE_LIFETIME_THRESHOLD: u32 = 17_280;
const INSTANCE_BUMP_AMOUNT: u32 = 86_400;
const PERSISTENT_LIFETIME_THRESHOLD: u32 = 120_960;
const PERSISTENT_BUMP_AMOUNT: u32 = 1_051_200;

#[contract]
pub struct DisputeDeskContract;

#[contractimpl]
impl DisputeDeskContract {
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
        env.storage()
            .instance()
            .set(&DataKey::DisputeCounter, &0u64);
    }

    // ============================================================
    // Arbitrator Pool
    // ============================================================

    pub fn authorize_arbitrator(env: Env, admin: Address, arbitrator: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);
        env.storage()
            .persistent()
            .set(&DataKey::Arbitrator(arbitrator.clone()), &true);
        env.storage().persistent().extend_ttl(
            &DataKey::Arbitrator(arbitrator),
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    /// Revocation stops new assignments; disputes already under review keep
    /// their arbitrator.
    pub fn revoke_arbitrator(env: Env, admin: Address, arbitrator: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);
        env.storage()
            .persistent()
            .remove(&DataKey::Arbitrator(arbitrator));
    }

    pub fn is_arbitrator(env: Env, who: Address) -> bool {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::Arbitrator(who))
            .unwrap_or(false)
    }

    // ============================================================
    // Dispute Lifecycle
    // ============================================================

    /// File a dispute over a submitted or approved milestone. Either deal
    /// party may file; the escrow diverts the milestone and the deal in the
    /// same transaction, so a dispute record never exists without the freeze.
    pub fn open_dispute(
        env: Env,
        party: Address,
        deal_id: u64,
        milestone_index: u32,
        reason: String,
        evidence_hash: String,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        party.require_auth();

        if reason.len() == 0 {
            panic!("reason required");
        }
        if !Self::_is_participant(&env, deal_id, &party) {
            panic!("not a deal participant");
        }

        let ref_key = DataKey::MilestoneDispute(deal_id, milestone_index);
        if env.storage().persistent().has(&ref_key) {
            panic!("dispute already open");
        }

        Self::_mark_disputed(&env, deal_id, milestone_index);

        Self::_file(
            &env,
            party,
            deal_id,
            milestone_index,
            reason,
            evidence_hash,
            DisputeKind::Settlement,
        )
    }

    /// Contest a milestone that has already been released, while it is still
    /// inside the escrow's contestation window. On-ledger record only: the
    /// released funds stay moved and the verdict is advisory, so the escrow
    /// is not diverted and the deal keeps going.
    pub fn contest_release(
        env: Env,
        party: Address,
        deal_id: u64,
        milestone_index: u32,
        reason: String,
        evidence_hash: String,
    ) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        party.require_auth();

        if reason.len() == 0 {
            panic!("reason required");
        }
        if !Self::_is_participant(&env, deal_id, &party) {
            panic!("not a deal participant");
        }

        let ref_key = DataKey::MilestoneDispute(deal_id, milestone_index);
        if env.storage().persistent().has(&ref_key) {
            panic!("dispute already open");
        }

        if !Self::_is_contestable(&env, deal_id, milestone_index) {
            panic!("release not contestable");
        }

        Self::_file(
            &env,
            party,
            deal_id,
            milestone_index,
            reason,
            evidence_hash,
            DisputeKind::Review,
        )
    }

    pub fn assign_arbitrator(env: Env, admin: Address, dispute_id: u64, arbitrator: Address) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        bridge_common_admin::require_admin(&env, &DataKey::Admin, &admin);

        let authorized: bool = env
            .storage()
            .persistent()
            .get(&DataKey::Arbitrator(arbitrator.clone()))
            .unwrap_or(false);
        if !authorized {
            panic!("not an arbitrator");
        }

        let mut dispute = Self::_load_dispute(&env, dispute_id);
        if dispute.status != DisputeStatus::Open {
            panic!("dispute not open");
        }

        dispute.arbitrator = Some(arbitrator.clone());
        dispute.status = DisputeStatus::UnderReview;
        Self::_store_dispute(&env, &dispute);

        env.events().publish(
            (symbol_short!("dispute"), symbol_short!("assigned")),
            (dispute_id, arbitrator),
        );
    }

    /// Apply the arbitrator's verdict. The outcome maps onto the escrow's
    /// settlement primitives and the dispute closes exactly once; disputes
    /// never time out on their own.
    pub fn resolve_dispute(
        env: Env,
        arbitrator: Address,
        dispute_id: u64,
        outcome: DisputeOutcome,
        release_amount: i128,
        notes: String,
    ) {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        arbitrator.require_auth();

        let mut dispute = Self::_load_dispute(&env, dispute_id);
        if dispute.status == DisputeStatus::Resolved {
            panic!("already resolved");
        }
        if dispute.status != DisputeStatus::UnderReview {
            panic!("no arbitrator assigned");
        }
        if dispute.arbitrator != Some(arbitrator.clone()) {
            panic!("unauthorized");
        }

        let release = if dispute.kind == DisputeKind::Review {
            // Advisory verdict on a past release: the release either stands or
            // is found wrongful, but no funds move either way.
            match &outcome {
                DisputeOutcome::FullRelease | DisputeOutcome::Refund => {}
                _ => panic!("invalid outcome"),
            }
            if release_amount != 0 {
                panic!("invalid release amount");
            }
            0
        } else {
            // `release_amount` is meaningful only for a partial release; any
            // other outcome derives its split from the milestone amount alone.
            let amount = Self::_milestone_amount(&env, dispute.deal_id, dispute.milestone_index);
            let (release, refund, reopen) = match &outcome {
                DisputeOutcome::Pending => panic!("invalid outcome"),
                DisputeOutcome::FullRelease => (amount, 0, false),
                DisputeOutcome::PartialRelease => {
                    if release_amount <= 0 || release_amount >= amount {
                        panic!("invalid release amount");
                    }
                    (release_amount, amount - release_amount, false)
                }
                DisputeOutcome::ReturnToPending => (0, 0, true),
                DisputeOutcome::Refund => (0, amount, false),
            };

            Self::_settle(&env, dispute.deal_id, dispute.milestone_index, release, refund, reopen);
            release
        };

        dispute.status = DisputeStatus::Resolved;
        dispute.outcome = outcome.clone();
        dispute.release_amount = release;
        dispute.resolution_notes = notes;
        dispute.resolved_at = Some(env.ledger().timestamp());
        Self::_store_dispute(&env, &dispute);

        // A reopened milestone may be contested again later.
        env.storage()
            .persistent()
            .remove(&DataKey::MilestoneDispute(
                dispute.deal_id,
                dispute.milestone_index,
            ));

        env.events().publish(
            (symbol_short!("dispute"), symbol_short!("resolved")),
            (dispute_id, outcome, release),
        );
    }

    // ============================================================
    // Read-Only Functions
    // ============================================================

    pub fn get_dispute(env: Env, dispute_id: u64) -> Option<Dispute> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::Dispute(dispute_id))
    }

    pub fn get_dispute_count(env: Env) -> u64 {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .instance()
            .get(&DataKey::DisputeCounter)
            .unwrap_or(0)
    }

    pub fn list_deal_disputes(env: Env, deal_id: u64) -> Vec<u64> {
        env.storage()
            .instance()
            .extend_ttl(INSTANCE_LIFETIME_THRESHOLD, INSTANCE_BUMP_AMOUNT);
        env.storage()
            .persistent()
            .get(&DataKey::DealDisputes(deal_id))
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

    /// Book the dispute record, the per-milestone guard and the deal index.
    /// Caller has already authenticated the party and run the kind-specific
    /// checks.
    fn _file(
        env: &Env,
        party: Address,
        deal_id: u64,
        milestone_index: u32,
        reason: String,
        evidence_hash: String,
        kind: DisputeKind,
    ) -> u64 {
        let counter: u64 = env
            .storage()
            .instance()
            .get(&DataKey::DisputeCounter)
            .unwrap_or(0);
        let dispute_id = counter + 1;

        let dispute = Dispute {
            dispute_id,
            deal_id,
            milestone_index,
            raised_by: party.clone(),
            reason,
            evidence_hash,
            kind,
            status: DisputeStatus::Open,
            outcome: DisputeOutcome::Pending,
            release_amount: 0,
            resolution_notes: String::from_str(env, ""),
            filed_at: env.ledger().timestamp(),
            resolved_at: None,
            arbitrator: None,
        };
        Self::_store_dispute(env, &dispute);
        env.storage()
            .instance()
            .set(&DataKey::DisputeCounter, &dispute_id);

        let ref_key = DataKey::MilestoneDispute(deal_id, milestone_index);
        env.storage().persistent().set(&ref_key, &dispute_id);
        env.storage().persistent().extend_ttl(
            &ref_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
        Self::_index_for_deal(env, deal_id, dispute_id);

        env.events().publish(
            (symbol_short!("dispute"), symbol_short!("opened")),
            (dispute_id, deal_id, milestone_index, party),
        );

        dispute_id
    }

    fn _load_dispute(env: &Env, dispute_id: u64) -> Dispute {
        env.storage()
            .persistent()
            .get(&DataKey::Dispute(dispute_id))
            .expect("dispute not found")
    }

    fn _store_dispute(env: &Env, dispute: &Dispute) {
        let _ttl_key = DataKey::Dispute(dispute.dispute_id);
        env.storage().persistent().set(&_ttl_key, dispute);
        env.storage().persistent().extend_ttl(
            &_ttl_key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _index_for_deal(env: &Env, deal_id: u64, dispute_id: u64) {
        let key = DataKey::DealDisputes(deal_id);
        let mut ids: Vec<u64> = env
            .storage()
            .persistent()
            .get(&key)
            .unwrap_or(Vec::new(env));
        ids.push_back(dispute_id);
        env.storage().persistent().set(&key, &ids);
        env.storage().persistent().extend_ttl(
            &key,
            PERSISTENT_LIFETIME_THRESHOLD,
            PERSISTENT_BUMP_AMOUNT,
        );
    }

    fn _escrow(env: &Env) -> Address {
        env.storage()
            .instance()
            .get(&DataKey::EscrowContract)
            .expect("not initialized")
    }

    fn _is_participant(env: &Env, deal_id: u64, who: &Address) -> bool {
        env.invoke_contract::<bool>(
            &Self::_escrow(env),
            &Symbol::new(env, "is_participant"),
            Vec::<Val>::from_array(env, [deal_id.into_val(env), who.into_val(env)]),
        )
    }

    fn _is_contestable(env: &Env, deal_id: u64, index: u32) -> bool {
        env.invoke_contract::<bool>(
            &Self::_escrow(env),
            &Symbol::new(env, "is_contestable"),
            Vec::<Val>::from_array(env, [deal_id.into_val(env), index.into_val(env)]),
        )
    }

    fn _milestone_amount(env: &Env, deal_id: u64, index: u32) -> i128 {
        env.invoke_contract::<i128>(
            &Self::_escrow(env),
            &Symbol::new(env, "milestone_amount"),
            Vec::<Val>::from_array(env, [deal_id.into_val(env), index.into_val(env)]),
        )
    }

    fn _mark_disputed(env: &Env, deal_id: u64, index: u32) {
        env.invoke_contract::<()>(
            &Self::_escrow(env),
            &Symbol::new(env, "mark_disputed"),
            Vec::<Val>::from_array(
                env,
                [
                    env.current_contract_address().into_val(env),
                    deal_id.into_val(env),
                    index.into_val(env),
                ],
            ),
        );
    }

    fn _settle(env: &Env, deal_id: u64, index: u32, release: i128, refund: i128, reopen: bool) {
        env.invoke_contract::<()>(
            &Self::_escrow(env),
            &Symbol::new(env, "settle_dispute"),
            Vec::<Val>::from_array(
                env,
                [
                    env.current_contract_address().into_val(env),
                    deal_id.into_val(env),
                    index.into_val(env),
                    release.into_val(env),
                    refund.into_val(env),
                    reopen.into_val(env),
                ],
            ),
        );
    }
}

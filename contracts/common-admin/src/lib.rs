//! BrandBridge - Common Admin (Soroban)
//! Shared admin guard and two-step admin rotation used by every BrandBridge contract.

#![no_std]
use soroban_sdk::{Address, Env, IntoVal, TryFromVal, Val};

/// Authenticate `caller` and check it against the stored admin address.
pub fn require_admin<K>(env: &Env, admin_key: &K, caller: &Address)
where
    K: IntoVal<Env, Val> + TryFromVal<Env, Val> + Clone,
{
    caller.require_auth();
    let stored: Address = env
        .storage()
        .instance()
        .get(admin_key)
        .expect("not initialized");
    if *caller != stored {
        panic!("unauthorized");
    }
}

/// First half of the rotation: the current admin nominates a successor.
pub fn propose_admin<K>(
    env: &Env,
    admin_key: &K,
    pending_key: &K,
    current_admin: Address,
    new_admin: Address,
) where
    K: IntoVal<Env, Val> + TryFromVal<Env, Val> + Clone,
{
    require_admin(env, admin_key, &current_admin);
    env.storage().instance().set(pending_key, &new_admin);
}

/// Second half: the nominee accepts, proving control of the new address.
pub fn accept_admin<K>(env: &Env, admin_key: &K, pending_key: &K, new_admin: Address)
where
    K: IntoVal<Env, Val> + TryFromVal<Env, Val> + Clone,
{
    new_admin.require_auth();
    let pending: Address = env
        .storage()
        .instance()
        .get(pending_key)
        .expect("no pending admin");
    if new_admin != pending {
        panic!("not pending admin");
    }
    env.storage().instance().set(admin_key, &new_admin);
    env.storage().instance().remove(pending_key);
}

//! Decide who gets disconnected
//!
//! Connected sessions minus the users the oracle still approves. Anything
//! other than an explicit "allowed" schedules an eviction.

use crate::mgmt::ConnectedSession;
use crate::oracle::AccessOracle;
use std::collections::HashMap;
use tracing::debug;

/// Sessions whose users are no longer allowed on the VPN
///
/// The oracle is asked exactly once per connected username. The result is
/// always a subset of `connected`.
pub fn reconcile<O>(
    connected: &HashMap<String, ConnectedSession>,
    oracle: &O,
) -> HashMap<String, ConnectedSession>
where
    O: AccessOracle + ?Sized,
{
    connected
        .iter()
        .filter(|(username, _)| {
            let allowed = oracle.is_allowed(username);
            debug!("{} allowed={}", username, allowed);
            !allowed
        })
        .map(|(username, session)| (username.clone(), session.clone()))
        .collect()
}

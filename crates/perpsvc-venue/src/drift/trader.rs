//! Drift order placement and user-account checks.

use super::gateway::DynDriftGateway;
use super::markets::market_index;
use super::params::DriftOrderParams;
use super::pda::user_account_pda;
use crate::error::{ClientError, ClientResult};
use perpsvc_core::{Price, ValidatedOrder};
use perpsvc_ledger::Pubkey;
use perpsvc_telemetry::Metrics;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct DriftPlaced {
    pub signature: String,
    pub params: DriftOrderParams,
}

pub struct DriftTrader {
    gateway: DynDriftGateway,
}

impl DriftTrader {
    pub fn new(gateway: DynDriftGateway) -> Self {
        Self { gateway }
    }

    /// `reference` prices market orders (the venue mid).
    pub async fn place_order(
        &self,
        authority: &Pubkey,
        sub_account: u16,
        order: &ValidatedOrder,
        reference: Option<Price>,
    ) -> ClientResult<DriftPlaced> {
        let index = market_index(&order.symbol)
            .ok_or_else(|| ClientError::UnknownMarket(order.symbol.clone()))?;
        let params = DriftOrderParams::from_order(order, index, reference)?;

        match self.gateway.place_order(authority, sub_account, &params).await {
            Ok(signature) => {
                Metrics::order("drift", true);
                info!(
                    %authority,
                    sub_account,
                    market_index = index,
                    base = params.base_asset_amount,
                    %signature,
                    "Drift order placed"
                );
                Ok(DriftPlaced { signature, params })
            }
            Err(e) => {
                let venue = e.to_venue_error();
                Metrics::order("drift", false);
                Metrics::venue_error("drift", venue.kind.code());
                warn!(%authority, sub_account, error = %e, kind = %venue.kind, "Drift order failed");
                Err(e)
            }
        }
    }

    /// Address of the user account, once the gateway can load it.
    pub async fn init_user(&self, authority: &Pubkey, sub_account: u16) -> ClientResult<Pubkey> {
        let pda = user_account_pda(authority, sub_account);
        if !self.gateway.user_exists(authority, sub_account).await? {
            return Err(ClientError::Rejected(format!(
                "Drift user {pda} not initialized for subaccount {sub_account}"
            )));
        }
        info!(%authority, sub_account, user_account = %pda, "Drift user account verified");
        Ok(pda)
    }
}

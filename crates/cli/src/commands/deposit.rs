use anyhow::Result;
use rust_decimal::Decimal;
use std::sync::Arc;
use vault_keeper::PositionService;
use vault_keeper_core::{AppConfig, NewPosition, VaultAddress};
use vault_keeper_data::PgStore;

pub struct DepositArgs {
    pub user: String,
    pub pair: String,
    pub vault: String,
    pub principal: Decimal,
    pub strategy_id: Option<i32>,
}

/// Inserts a pending_entry position; the entry job picks it up on its next
/// pass.
pub async fn record_deposit(config: AppConfig, args: DepositArgs) -> Result<()> {
    let vault_address = VaultAddress::parse(&args.vault)?;
    let store = PgStore::connect(&config.database.url, config.database.max_connections).await?;
    let service = PositionService::new(Arc::new(store));

    let position = service
        .deposit(NewPosition {
            user_id: args.user,
            pair_id: args.pair,
            vault_address,
            strategy_id: args.strategy_id.unwrap_or(config.strategy.default_strategy_id),
            principal: args.principal,
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&position)?);
    Ok(())
}

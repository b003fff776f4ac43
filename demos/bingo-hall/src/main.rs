use std::sync::Arc;

use bingohall::prelude::*;

// ---------------------------------------------------------------------------
// Dev authentication
// ---------------------------------------------------------------------------

/// Trusts the token outright: `id:name[:xp[:admin]]`. Local play only.
struct DevAuth;

impl Authenticator for DevAuth {
    async fn authenticate(&self, token: &str) -> Result<UserContext, SessionError> {
        parse_token(token)
    }
}

fn parse_token(token: &str) -> Result<UserContext, SessionError> {
    let mut parts = token.split(':');
    let id: u64 = parts
        .next()
        .and_then(|id| id.parse().ok())
        .ok_or_else(|| SessionError::AuthFailed("token must start with a numeric id".into()))?;
    let name = parts
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| SessionError::AuthFailed("token needs a name".into()))?;
    let xp: u32 = match parts.next() {
        Some(xp) => xp
            .parse()
            .map_err(|_| SessionError::AuthFailed("xp must be a number".into()))?,
        None => 0,
    };
    let mut user = UserContext::new(UserId(id), name, xp);
    if parts.next() == Some(ADMIN_ROLE) {
        user = user.with_role(ADMIN_ROLE);
    }
    Ok(user)
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Users 1 to 10 start with this many of each currency on a fresh wallet.
const STARTING_BALANCE: u64 = 1_000;

async fn fresh_wallet() -> Result<MemoryWallet, HallError> {
    let wallet = MemoryWallet::new();
    for id in 1..=10 {
        for currency in [Currency::Coins, Currency::Stars] {
            wallet
                .deposit(UserId(id), currency, Amount(STARTING_BALANCE))
                .await
                .map_err(|e| HallError::Config(format!("could not seed wallet: {e}")))?;
        }
    }
    Ok(wallet)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    bingohall::init_tracing("info,bingohall=debug");

    let config = match std::env::args().nth(1) {
        Some(path) => HallConfig::from_json_file(path)?,
        None => HallConfig::default(),
    };

    let restored = match &config.snapshot_path {
        Some(path) => HallSnapshot::load(path)?,
        None => None,
    };
    let mut builder = HallServerBuilder::new().config(config.clone());
    let wallet = match restored {
        Some(snapshot) => {
            tracing::info!(rooms = snapshot.store.rooms.len(), "restoring snapshot");
            builder = builder.store(Arc::new(RoomStore::from_snapshot(snapshot.store)));
            MemoryWallet::from_snapshot(snapshot.wallet, Arc::new(SystemClock))
        }
        None => fresh_wallet().await?,
    };

    let server = builder.build(DevAuth, Arc::new(wallet)).await?;
    tracing::info!(addr = %server.local_addr()?, "bingo hall listening");
    let gateway = server.gateway().clone();

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    if let Some(path) = &config.snapshot_path {
        let manager = gateway.manager();
        HallSnapshot::capture(manager.store(), manager.wallet())
            .await
            .save(path)?;
    }
    Ok(())
}

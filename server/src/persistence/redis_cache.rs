//! Redis-backed position cache.
//!
//! Keys: `game:<id>:fen` and `game:<id>:turn`. A multiplexed connection is
//! created per operation; any failure surfaces as `Err` and callers treat it
//! as a cache miss.

use anyhow::Result;
use redis::AsyncCommands;
use shared::Color;

use super::PositionCache;

pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn open(url: &str) -> Result<Self> {
        // Connections are lazy; an unreachable cache does not block startup.
        let client = redis::Client::open(url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait::async_trait]
impl PositionCache for RedisCache {
    async fn put_position(&self, game_id: &str, fen: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(format!("game:{game_id}:fen"), fen).await?;
        Ok(())
    }

    async fn put_turn(&self, game_id: &str, turn: Color) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn
            .set(format!("game:{game_id}:turn"), turn.to_string())
            .await?;
        Ok(())
    }

    async fn get_position(&self, game_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let fen: Option<String> = conn.get(format!("game:{game_id}:fen")).await?;
        Ok(fen)
    }
}

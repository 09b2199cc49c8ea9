use redis::{aio::MultiplexedConnection, AsyncCommands, Client, RedisResult};

/// Shared handle to the snapshot Redis instance.
#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(RedisClient { conn })
    }

    pub async fn get_bytes(&self, key: &str) -> RedisResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        conn.get(key).await
    }

    pub async fn set_bytes(&self, key: &str, value: &[u8]) -> RedisResult<()> {
        let mut conn = self.conn.clone();
        conn.set(key, value).await
    }
}
